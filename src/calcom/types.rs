//! Value types returned by the calendar provider
//!
//! These are plain data carriers owned by whichever caller requested
//! them; nothing here is cached across requests.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// A bookable meeting template with a fixed duration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventType {
    pub id: i64,
    #[serde(default)]
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Duration in minutes
    pub length: u32,
    #[serde(default)]
    pub hidden: bool,
}

/// A concrete bookable time interval for an event type
///
/// Half-open interval; `end` is always `start + length` computed from
/// the event type, never taken from the provider's own end field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl Slot {
    /// Calendar date of the slot start, as YYYY-MM-DD
    pub fn date_string(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }
}

/// An event attendee
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attendee {
    pub email: String,
    pub name: String,
    #[serde(default, alias = "timeZone")]
    pub timezone: Option<String>,
}

/// A confirmed or pending reservation
///
/// `uid` is the opaque external identifier used in cancel/reschedule
/// operations; the numeric `id` is internal to the provider. `status`
/// is deliberately an open string since the provider may introduce new
/// values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    #[serde(default)]
    pub id: i64,
    pub uid: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(alias = "startTime")]
    pub start_time: DateTime<FixedOffset>,
    #[serde(alias = "endTime")]
    pub end_time: DateTime<FixedOffset>,
    pub status: String,
    #[serde(default)]
    pub attendees: Vec<Attendee>,
    #[serde(default, alias = "eventTypeId")]
    pub event_type_id: Option<i64>,
}

impl Booking {
    /// True if the given email belongs to one of the attendees
    /// (case-insensitive)
    pub fn has_attendee(&self, email: &str) -> bool {
        self.attendees
            .iter()
            .any(|a| a.email.eq_ignore_ascii_case(email))
    }
}
