//! Booking-detail extraction from free text
//!
//! Pulls the attendee name, email, and target date/time out of the
//! user's message. Date/time extraction runs as an ordered chain of
//! strategies: a model-backed extractor first, then a pattern fallback
//! for messages like "March 14th at 2:30 PM".

use crate::error::Result;
use crate::providers::{CompletionProvider, Message, ToolSchema};

use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::{Arc, OnceLock};

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+\.[a-zA-Z0-9-.]+)").expect("valid email regex")
    })
}

fn name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Name follows "for", ending at a parenthesis, comma, or the
        // "on"/"at" clause that introduces the date
        Regex::new(r"(?i)\bfor\s+([^(,]+?)\s*(?:\(|,|\bon\b|\bat\b|$)")
            .expect("valid name regex")
    })
}

fn month_day_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(January|February|March|April|May|June|July|August|September|October|November|December)\s+(\d{1,2})(?:st|nd|rd|th)?\b",
        )
        .expect("valid month-day regex")
    })
}

fn clock_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // No trailing boundary: digit to letter is not a word boundary, so
    // "2:30pm" would never match with one
    RE.get_or_init(|| Regex::new(r"\b(\d{1,2}):(\d{2})").expect("valid clock regex"))
}

/// Attendee email found in the message, if any
pub fn extract_email(message: &str) -> Option<String> {
    email_regex()
        .captures(message)
        .map(|c| c[1].to_string())
}

/// Attendee name found in the message, if any
pub fn extract_name(message: &str) -> Option<String> {
    name_regex()
        .captures(message)
        .map(|c| c[1].trim().to_string())
        .filter(|name| !name.is_empty())
}

/// A fully resolved booking target: calendar date plus wall-clock time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateTimeTarget {
    /// YYYY-MM-DD
    pub date: String,
    /// HH:MM:SS, 24-hour
    pub time: String,
}

/// One strategy for resolving a date/time target from free text
///
/// Strategies are tried in order; the first to produce a complete
/// target wins. A strategy that finds only a date or only a time
/// reports nothing.
#[async_trait]
pub trait DateTimeExtractor: Send + Sync {
    async fn extract(&self, message: &str) -> Option<DateTimeTarget>;
}

/// Model-backed extractor using a dedicated extraction tool call
pub struct LlmDateTimeExtractor {
    provider: Arc<dyn CompletionProvider>,
}

impl LlmDateTimeExtractor {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self { provider }
    }

    fn extraction_schema() -> ToolSchema {
        ToolSchema::new(
            "extract_datetime",
            "Extract date and time information from text",
            json!({
                "type": "object",
                "properties": {
                    "date": {
                        "type": "string",
                        "description": "The extracted date in ISO format (YYYY-MM-DD)"
                    },
                    "start_time": {
                        "type": "string",
                        "description": "The extracted start time in 24-hour format (HH:MM), or null if not present"
                    },
                    "end_time": {
                        "type": "string",
                        "description": "The extracted end time in 24-hour format (HH:MM), or null if not present"
                    },
                    "is_specific": {
                        "type": "boolean",
                        "description": "Whether the date/time is specific or approximate"
                    }
                },
                "required": ["date", "is_specific"]
            }),
        )
    }

    async fn try_extract(&self, message: &str) -> Result<Option<DateTimeTarget>> {
        let messages = vec![
            Message::system(
                "You are a helpful assistant that extracts date and time information from text. \
                 Extract the date, start time, and end time if present. Return ISO format dates \
                 and 24-hour times. If no specific date is mentioned, assume today's date. If no \
                 specific time is mentioned, return null for times.",
            ),
            Message::user(format!("Parse the following date/time: {}", message)),
        ];

        // Low temperature keeps extraction deterministic
        let response = self
            .provider
            .complete(&messages, &[Self::extraction_schema()], 0.1)
            .await?;

        for call in &response.tool_calls {
            if call.name != "extract_datetime" {
                continue;
            }
            let date = call.arguments.get("date").and_then(Value::as_str);
            let start_time = call.arguments.get("start_time").and_then(Value::as_str);
            if let (Some(date), Some(start_time)) = (date, start_time) {
                return Ok(Some(DateTimeTarget {
                    date: date.to_string(),
                    time: format!("{}:00", start_time),
                }));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl DateTimeExtractor for LlmDateTimeExtractor {
    async fn extract(&self, message: &str) -> Option<DateTimeTarget> {
        match self.try_extract(message).await {
            Ok(target) => target,
            Err(e) => {
                tracing::error!("Model-backed date extraction failed: {}", e);
                None
            }
        }
    }
}

/// Pattern fallback for "<Month> <day>" plus "HH:MM [am/pm]" phrasings
///
/// The year is not part of the phrasing, so the caller supplies the
/// current year in the reference timezone.
pub struct PatternDateTimeExtractor {
    year: i32,
}

impl PatternDateTimeExtractor {
    pub fn new(year: i32) -> Self {
        Self { year }
    }

    fn month_number(name: &str) -> Option<u32> {
        let month = match name.to_ascii_lowercase().as_str() {
            "january" => 1,
            "february" => 2,
            "march" => 3,
            "april" => 4,
            "may" => 5,
            "june" => 6,
            "july" => 7,
            "august" => 8,
            "september" => 9,
            "october" => 10,
            "november" => 11,
            "december" => 12,
            _ => return None,
        };
        Some(month)
    }

    fn extract_date(&self, message: &str) -> Option<String> {
        let captures = month_day_regex().captures(message)?;
        let month = Self::month_number(&captures[1])?;
        let day: u32 = captures[2].parse().ok()?;
        // Rejects impossible days like February 31st
        let date = NaiveDate::from_ymd_opt(self.year, month, day)?;
        Some(date.format("%Y-%m-%d").to_string())
    }

    fn extract_time(message: &str) -> Option<String> {
        let captures = clock_regex().captures(message)?;
        let mut hour: u32 = captures[1].parse().ok()?;
        let minute: u32 = captures[2].parse().ok()?;
        if hour > 23 || minute > 59 {
            return None;
        }
        if message.to_lowercase().contains("pm") && hour < 12 {
            hour += 12;
        }
        Some(format!("{:02}:{:02}:00", hour, minute))
    }
}

#[async_trait]
impl DateTimeExtractor for PatternDateTimeExtractor {
    async fn extract(&self, message: &str) -> Option<DateTimeTarget> {
        let date = self.extract_date(message)?;
        let time = Self::extract_time(message)?;
        tracing::info!("Pattern-extracted target: {} at {}", date, time);
        Some(DateTimeTarget { date, time })
    }
}
