//! Automatic booking after an availability check
//!
//! When the model answered a booking-flavored message by checking
//! availability, this engine tries to complete the booking in the same
//! turn: it extracts the attendee and target date/time from the user's
//! message, matches a returned slot, and books it. Every stage aborts
//! gracefully back to the normal conversational reply except the final
//! booking call, whose provider failure is surfaced.

pub mod extract;

use crate::calcom::{BookingRequest, CalendarProvider};
use crate::error::Result;
use crate::functions::parse_datetime;

use chrono::FixedOffset;
use serde_json::Value;
use std::sync::Arc;

pub use extract::{
    extract_email, extract_name, DateTimeExtractor, DateTimeTarget, LlmDateTimeExtractor,
    PatternDateTimeExtractor,
};

/// Words that mark a message as a booking request
pub const BOOKING_KEYWORDS: [&str; 5] = ["book", "schedule", "appointment", "meeting", "reserve"];

/// True when the message reads like a booking request
pub fn is_booking_request(message: &str) -> bool {
    let lowered = message.to_lowercase();
    BOOKING_KEYWORDS.iter().any(|kw| lowered.contains(kw))
}

/// Outcome of a completed automatic booking
#[derive(Debug, Clone)]
pub struct AutoBookOutcome {
    pub booking_uid: String,
    pub name: String,
    pub date: String,
    pub time: String,
}

impl AutoBookOutcome {
    /// User-facing confirmation line that replaces the assistant reply
    pub fn confirmation(&self) -> String {
        format!(
            "Appointment booked successfully for {} on {} at {}. Booking ID: {}",
            self.name, self.date, self.time, self.booking_uid
        )
    }
}

/// The auto-booking engine
pub struct AutoBooker {
    calendar: Arc<dyn CalendarProvider>,
    extractors: Vec<Arc<dyn DateTimeExtractor>>,
    offset: FixedOffset,
}

impl AutoBooker {
    /// Create an engine with the given extractor chain
    ///
    /// Extractors run in order; the first complete date/time target
    /// wins.
    pub fn new(
        calendar: Arc<dyn CalendarProvider>,
        extractors: Vec<Arc<dyn DateTimeExtractor>>,
        offset: FixedOffset,
    ) -> Self {
        Self {
            calendar,
            extractors,
            offset,
        }
    }

    async fn resolve_target(&self, message: &str) -> Option<DateTimeTarget> {
        for extractor in &self.extractors {
            if let Some(target) = extractor.extract(message).await {
                return Some(target);
            }
        }
        None
    }

    /// Try to complete a booking from the availability result
    ///
    /// `slots_result` is the JSON produced by the get_available_slots
    /// handler. Returns `Ok(None)` whenever any detail is missing or no
    /// slot matches; only a provider failure on the final booking call
    /// is an error.
    pub async fn run(&self, message: &str, slots_result: &Value) -> Result<Option<AutoBookOutcome>> {
        let slots = match slots_result.get("slots").and_then(Value::as_array) {
            Some(slots) if !slots.is_empty() => slots,
            _ => return Ok(None),
        };
        let Some(event_type_id) = slots_result.get("event_type_id").and_then(Value::as_i64) else {
            return Ok(None);
        };

        let Some(name) = extract_name(message) else {
            tracing::debug!("Auto-booking skipped: no attendee name in message");
            return Ok(None);
        };
        let Some(email) = extract_email(message) else {
            tracing::debug!("Auto-booking skipped: no attendee email in message");
            return Ok(None);
        };

        let Some(target) = self.resolve_target(message).await else {
            tracing::info!("Auto-booking skipped: no date/time target extracted");
            return Ok(None);
        };
        tracing::info!("Auto-booking target: {} at {}", target.date, target.time);

        // Exact match first: same date, requested time prefix of the
        // slot start. Falls back to the first slot on the target date.
        let exact = slots.iter().find(|slot| {
            slot.get("date").and_then(Value::as_str) == Some(target.date.as_str())
                && slot
                    .get("start")
                    .and_then(Value::as_str)
                    .is_some_and(|s| s.contains(&target.time))
        });
        let matched = exact.or_else(|| {
            slots
                .iter()
                .find(|slot| slot.get("date").and_then(Value::as_str) == Some(target.date.as_str()))
        });
        let Some(slot) = matched else {
            tracing::warn!(
                "Auto-booking skipped: no slot on {} at {}",
                target.date,
                target.time
            );
            return Ok(None);
        };

        let (Some(start_str), Some(end_str)) = (
            slot.get("start").and_then(Value::as_str),
            slot.get("end").and_then(Value::as_str),
        ) else {
            return Ok(None);
        };
        let (Ok(start), Ok(end)) = (
            parse_datetime(start_str, self.offset),
            parse_datetime(end_str, self.offset),
        ) else {
            tracing::warn!("Auto-booking skipped: unparseable slot interval");
            return Ok(None);
        };

        tracing::info!(
            "Auto-booking appointment for {} on {} at {}",
            name,
            target.date,
            target.time
        );
        let booking = self
            .calendar
            .book(&BookingRequest {
                event_type_id,
                start,
                end,
                name: name.clone(),
                email,
                title: Some(format!("Appointment with {}", name)),
                description: Some(format!("Scheduled appointment for {}", name)),
                timezone: None,
                language: None,
            })
            .await?;

        Ok(Some(AutoBookOutcome {
            booking_uid: booking.uid,
            name,
            date: target.date,
            time: target.time,
        }))
    }
}
