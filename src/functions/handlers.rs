//! The calendar operations exposed to the model
//!
//! Six handlers covering the full scheduling surface: discovery
//! (get_event_types, get_available_slots) and lifecycle (book_event,
//! list_events, cancel_event, reschedule_event). Handlers validate the
//! model-supplied arguments, call the calendar provider, and shape the
//! result as the JSON the model reads back.

use crate::calcom::{BookingRequest, CalendarProvider, EventType, Slot};
use crate::config::ChatConfig;
use crate::error::{CalbotError, Result};
use crate::functions::{
    optional_i64, optional_str, parse_datetime, required_str, FunctionHandler, FunctionRegistry,
};
use crate::providers::ToolSchema;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate};
use serde_json::{json, Value};
use std::sync::Arc;

/// Build the standard registry with all six calendar operations
pub fn standard_registry(
    calendar: Arc<dyn CalendarProvider>,
    chat: ChatConfig,
) -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    registry.register(Arc::new(GetEventTypes {
        calendar: Arc::clone(&calendar),
    }));
    registry.register(Arc::new(GetAvailableSlots {
        calendar: Arc::clone(&calendar),
        chat: chat.clone(),
    }));
    registry.register(Arc::new(BookEvent {
        calendar: Arc::clone(&calendar),
        chat: chat.clone(),
    }));
    registry.register(Arc::new(ListEvents {
        calendar: Arc::clone(&calendar),
        chat: chat.clone(),
    }));
    registry.register(Arc::new(CancelEvent {
        calendar: Arc::clone(&calendar),
    }));
    registry.register(Arc::new(RescheduleEvent { calendar, chat }));
    registry
}

/// Pick the event type whose duration best fits the request
///
/// Exact duration wins; otherwise the smallest absolute difference,
/// with ties broken by listing order.
fn select_event_type(event_types: &[EventType], duration: u32) -> Result<&EventType> {
    let mut best: Option<&EventType> = None;
    for et in event_types {
        let diff = (i64::from(et.length) - i64::from(duration)).abs();
        let better = match best {
            None => true,
            Some(b) => diff < (i64::from(b.length) - i64::from(duration)).abs(),
        };
        if better {
            best = Some(et);
        }
    }
    best.ok_or_else(|| CalbotError::Validation("No event types available".to_string()).into())
}

fn event_type_name(event_types: &[EventType], id: i64) -> String {
    event_types
        .iter()
        .find(|et| et.id == id)
        .map(|et| et.title.clone())
        .unwrap_or_else(|| format!("Event Type {}", id))
}

fn slot_json(slot: &Slot) -> Value {
    json!({
        "start": slot.start.to_rfc3339(),
        "end": slot.end.to_rfc3339(),
        "date": slot.date_string(),
    })
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| CalbotError::Validation(format!("Invalid date: {}", value)).into())
}

fn day_start(date: NaiveDate, offset: FixedOffset) -> Result<DateTime<FixedOffset>> {
    date.and_hms_opt(0, 0, 0)
        .and_then(|dt| dt.and_local_timezone(offset).single())
        .ok_or_else(|| CalbotError::Validation(format!("Invalid date: {}", date)).into())
}

/// List the bookable event types
pub struct GetEventTypes {
    pub calendar: Arc<dyn CalendarProvider>,
}

#[async_trait]
impl FunctionHandler for GetEventTypes {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "get_event_types",
            "Get available event types for booking",
            json!({"type": "object", "properties": {}, "required": []}),
        )
    }

    async fn execute(&self, _args: &Value) -> Result<Value> {
        let event_types = self.calendar.list_event_types().await?;
        Ok(json!({
            "event_types": event_types.iter().map(|et| json!({
                "id": et.id,
                "title": et.title,
                "description": et.description,
                "length": et.length,
            })).collect::<Vec<_>>(),
            "total": event_types.len(),
        }))
    }
}

/// Find open slots in a window starting at the requested date
pub struct GetAvailableSlots {
    pub calendar: Arc<dyn CalendarProvider>,
    pub chat: ChatConfig,
}

#[async_trait]
impl FunctionHandler for GetAvailableSlots {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "get_available_slots",
            "Get available time slots for booking a meeting",
            json!({
                "type": "object",
                "properties": {
                    "date": {
                        "type": "string",
                        "description": "The date to check for available slots (YYYY-MM-DD)"
                    },
                    "event_type_id": {
                        "type": "integer",
                        "description": "The event type ID (optional, will use default if not provided)"
                    },
                    "duration": {
                        "type": "integer",
                        "description": "The desired meeting duration in minutes (optional, default is 30)"
                    },
                    "timezone": {
                        "type": "string",
                        "description": "The timezone for the slots (optional)"
                    }
                },
                "required": ["date"]
            }),
        )
    }

    async fn execute(&self, args: &Value) -> Result<Value> {
        let date_str = required_str(args, "date", "Date is required")?;
        let duration = optional_i64(args, "duration")
            .and_then(|d| u32::try_from(d).ok())
            .unwrap_or(self.chat.default_duration_minutes);
        let timezone = optional_str(args, "timezone").unwrap_or(&self.chat.timezone);

        let event_types = self.calendar.list_event_types().await?;
        let event_type_id = match optional_i64(args, "event_type_id") {
            Some(id) => id,
            None => {
                let selected = select_event_type(&event_types, duration)?;
                tracing::info!(
                    "Selected event type {} with duration {} minutes",
                    selected.id,
                    selected.length
                );
                selected.id
            }
        };

        let date = parse_date(date_str)?;
        let offset = self.chat.reference_offset();
        let start = day_start(date, offset)?;
        let end = start + Duration::days(7);

        tracing::debug!(
            "Checking available slots: date={}, event_type_id={}, duration={}, timezone={}",
            date_str,
            event_type_id,
            duration,
            timezone
        );

        let slots = self
            .calendar
            .available_slots(event_type_id, start, end, timezone)
            .await?;
        let name = event_type_name(&event_types, event_type_id);

        if slots.is_empty() {
            // Probe a later window so the model can offer alternatives
            let alt_start = day_start(date + Duration::days(1), offset)?;
            let alt_end = alt_start + Duration::days(14);
            let alternatives = self
                .calendar
                .available_slots(event_type_id, alt_start, alt_end, timezone)
                .await?;

            return Ok(json!({
                "slots": [],
                "message": format!("No available slots found for {} on {}.", name, date_str),
                "alternative_slots": alternatives
                    .iter()
                    .take(10)
                    .map(slot_json)
                    .collect::<Vec<_>>(),
                "event_type_id": event_type_id,
                "event_type_name": name,
            }));
        }

        Ok(json!({
            "slots": slots.iter().map(slot_json).collect::<Vec<_>>(),
            "event_type_id": event_type_id,
            "event_type_name": name,
        }))
    }
}

/// Book a new event
pub struct BookEvent {
    pub calendar: Arc<dyn CalendarProvider>,
    pub chat: ChatConfig,
}

#[async_trait]
impl FunctionHandler for BookEvent {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "book_event",
            "Book a new event",
            json!({
                "type": "object",
                "properties": {
                    "event_type_id": {
                        "type": "integer",
                        "description": "The event type ID (optional, will use default if not provided)"
                    },
                    "start_time": {
                        "type": "string",
                        "description": "The start time of the event (ISO format)"
                    },
                    "end_time": {
                        "type": "string",
                        "description": "The end time of the event (ISO format)"
                    },
                    "duration": {
                        "type": "integer",
                        "description": "The duration of the meeting in minutes (optional, calculated from start and end times if not provided)"
                    },
                    "name": {
                        "type": "string",
                        "description": "The name of the attendee"
                    },
                    "email": {
                        "type": "string",
                        "description": "The email of the attendee"
                    },
                    "title": {
                        "type": "string",
                        "description": "The title of the event"
                    },
                    "description": {
                        "type": "string",
                        "description": "The description of the event"
                    },
                    "timezone": {
                        "type": "string",
                        "description": "The timezone for the event (optional)"
                    },
                    "language": {
                        "type": "string",
                        "description": "The language for the event (optional, default is en)"
                    }
                },
                "required": ["start_time", "end_time", "name", "email"]
            }),
        )
    }

    async fn execute(&self, args: &Value) -> Result<Value> {
        let start_str = required_str(args, "start_time", "Start time is required")?;
        let end_str = required_str(args, "end_time", "End time is required")?;
        let name = required_str(args, "name", "Name is required")?;
        let email = required_str(args, "email", "Email is required")?;

        let offset = self.chat.reference_offset();
        let start = parse_datetime(start_str, offset)?;
        let end = parse_datetime(end_str, offset)?;
        if end <= start {
            return Err(
                CalbotError::Validation("End time must be after start time".to_string()).into(),
            );
        }

        let event_type_id = match optional_i64(args, "event_type_id") {
            Some(id) => id,
            None => {
                let duration = u32::try_from((end - start).num_minutes())
                    .ok()
                    .filter(|d| *d > 0)
                    .unwrap_or(self.chat.default_duration_minutes);
                let event_types = self.calendar.list_event_types().await?;
                let selected = select_event_type(&event_types, duration)?;
                tracing::info!(
                    "Selected event type {} with duration {} minutes",
                    selected.id,
                    selected.length
                );
                selected.id
            }
        };

        let request = BookingRequest {
            event_type_id,
            start,
            end,
            name: name.to_string(),
            email: email.to_string(),
            title: optional_str(args, "title").map(String::from),
            description: optional_str(args, "description").map(String::from),
            timezone: Some(
                optional_str(args, "timezone")
                    .unwrap_or(&self.chat.timezone)
                    .to_string(),
            ),
            language: Some(
                optional_str(args, "language")
                    .unwrap_or(&self.chat.language)
                    .to_string(),
            ),
        };

        let booking = self.calendar.book(&request).await?;
        tracing::debug!("Booking successful: booking_id={}", booking.uid);

        Ok(json!({
            "booking_id": booking.uid,
            "title": booking.title,
            "start_time": booking.start_time.to_rfc3339(),
            "end_time": booking.end_time.to_rfc3339(),
            "status": booking.status,
            "attendees": booking.attendees.iter().map(|a| json!({
                "email": a.email,
                "name": a.name,
            })).collect::<Vec<_>>(),
        }))
    }
}

/// List a user's events
pub struct ListEvents {
    pub calendar: Arc<dyn CalendarProvider>,
    pub chat: ChatConfig,
}

#[async_trait]
impl FunctionHandler for ListEvents {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "list_events",
            "List events for a user",
            json!({
                "type": "object",
                "properties": {
                    "email": {
                        "type": "string",
                        "description": "The email of the user"
                    },
                    "start_date": {
                        "type": "string",
                        "description": "The start date for filtering events (YYYY-MM-DD)"
                    },
                    "end_date": {
                        "type": "string",
                        "description": "The end date for filtering events (YYYY-MM-DD)"
                    },
                    "status": {
                        "type": "string",
                        "description": "The status of the events to filter (ACCEPTED, PENDING, CANCELLED, etc.)"
                    }
                },
                "required": ["email"]
            }),
        )
    }

    async fn execute(&self, args: &Value) -> Result<Value> {
        let email = required_str(args, "email", "Email is required")?;
        let status = optional_str(args, "status");
        let offset = self.chat.reference_offset();

        // Caller-supplied dates win; otherwise default to the current week
        let (start, end) = match (optional_str(args, "start_date"), optional_str(args, "end_date"))
        {
            (Some(s), Some(e)) => {
                let start = day_start(parse_date(s)?, offset)?;
                let end = day_start(parse_date(e)?, offset)? + Duration::days(1)
                    - Duration::seconds(1);
                (start, end)
            }
            _ => {
                let today = self.chat.now().date_naive();
                let monday =
                    today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
                let start = day_start(monday, offset)?;
                let end = start + Duration::days(7) - Duration::seconds(1);
                (start, end)
            }
        };

        tracing::debug!("Listing events: email={}, window {} to {}", email, start, end);

        let bookings = self
            .calendar
            .list_bookings(Some(email), Some(start), Some(end), status)
            .await?;

        Ok(json!({
            "events": bookings.iter().map(|b| json!({
                "id": b.uid,
                "title": b.title,
                "start_time": b.start_time.to_rfc3339(),
                "end_time": b.end_time.to_rfc3339(),
                "status": b.status,
                "attendees": b.attendees.iter().map(|a| json!({
                    "email": a.email,
                    "name": a.name,
                })).collect::<Vec<_>>(),
            })).collect::<Vec<_>>(),
            "total": bookings.len(),
        }))
    }
}

/// Cancel an event by booking id
pub struct CancelEvent {
    pub calendar: Arc<dyn CalendarProvider>,
}

#[async_trait]
impl FunctionHandler for CancelEvent {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "cancel_event",
            "Cancel an event",
            json!({
                "type": "object",
                "properties": {
                    "booking_id": {
                        "type": "string",
                        "description": "The booking ID"
                    },
                    "reason": {
                        "type": "string",
                        "description": "The reason for cancellation"
                    }
                },
                "required": ["booking_id"]
            }),
        )
    }

    async fn execute(&self, args: &Value) -> Result<Value> {
        let booking_id = required_str(args, "booking_id", "Booking ID is required")?;
        let reason = optional_str(args, "reason");

        self.calendar.cancel(booking_id, reason).await?;

        Ok(json!({
            "success": true,
            "booking_id": booking_id,
            "status": "CANCELLED",
        }))
    }
}

/// Reschedule an event to a new interval
pub struct RescheduleEvent {
    pub calendar: Arc<dyn CalendarProvider>,
    pub chat: ChatConfig,
}

#[async_trait]
impl FunctionHandler for RescheduleEvent {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "reschedule_event",
            "Reschedule an event",
            json!({
                "type": "object",
                "properties": {
                    "booking_id": {
                        "type": "string",
                        "description": "The booking ID"
                    },
                    "start_time": {
                        "type": "string",
                        "description": "The new start time of the event (ISO format)"
                    },
                    "end_time": {
                        "type": "string",
                        "description": "The new end time of the event (ISO format)"
                    },
                    "reason": {
                        "type": "string",
                        "description": "The reason for rescheduling"
                    }
                },
                "required": ["booking_id", "start_time", "end_time"]
            }),
        )
    }

    async fn execute(&self, args: &Value) -> Result<Value> {
        let booking_id = required_str(args, "booking_id", "Booking ID is required")?;
        let start_str = required_str(args, "start_time", "Start time is required")?;
        let end_str = required_str(args, "end_time", "End time is required")?;
        let reason = optional_str(args, "reason");

        let offset = self.chat.reference_offset();
        let start = parse_datetime(start_str, offset)?;
        let end = parse_datetime(end_str, offset)?;

        let booking = self
            .calendar
            .reschedule(booking_id, start, end, reason)
            .await?;

        Ok(json!({
            "success": true,
            "booking_id": booking.uid,
            "title": booking.title,
            "start_time": booking.start_time.to_rfc3339(),
            "end_time": booking.end_time.to_rfc3339(),
            "status": booking.status,
        }))
    }
}
