//! Cal.com API client
//!
//! Implements the `CalendarProvider` capability over the Cal.com v1
//! REST API. The API key travels as a query parameter. Slot listing
//! fails soft (empty list) on transport or parse errors; booking
//! retries exactly once with an alternate location strategy on the
//! known "no users available" error class.

use crate::calcom::types::{Attendee, Booking, EventType, Slot};
use crate::config::CalComConfig;
use crate::error::{CalbotError, Result};

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset};
use reqwest::{Client, Method};
use serde_json::{json, Value};
use std::time::Duration;

/// Parameters for booking an event
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub event_type_id: i64,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub name: String,
    pub email: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub timezone: Option<String>,
    pub language: Option<String>,
}

/// Calendar provider capability
///
/// The scheduling backend as the rest of the service sees it. Slots and
/// bookings are value objects owned by the caller.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// List all event types
    async fn list_event_types(&self) -> Result<Vec<EventType>>;

    /// List available slots for an event type in a window
    ///
    /// Returns an empty list on any transport/parse error (logged, not
    /// raised); callers treat empty as "provider reported no slots".
    async fn available_slots(
        &self,
        event_type_id: i64,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
        timezone: &str,
    ) -> Result<Vec<Slot>>;

    /// Book an event
    async fn book(&self, request: &BookingRequest) -> Result<Booking>;

    /// List bookings, optionally filtered by attendee email, window and status
    async fn list_bookings(
        &self,
        email: Option<&str>,
        start: Option<DateTime<FixedOffset>>,
        end: Option<DateTime<FixedOffset>>,
        status: Option<&str>,
    ) -> Result<Vec<Booking>>;

    /// Cancel a booking by its external uid
    async fn cancel(&self, booking_uid: &str, reason: Option<&str>) -> Result<()>;

    /// Reschedule a booking to a new interval
    async fn reschedule(
        &self,
        booking_uid: &str,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
        reason: Option<&str>,
    ) -> Result<Booking>;

    /// Fetch a single booking by its external uid
    async fn get_booking(&self, booking_uid: &str) -> Result<Booking>;
}

/// Cal.com REST client
pub struct CalComClient {
    client: Client,
    config: CalComConfig,
}

impl CalComClient {
    /// Create a new Cal.com client
    ///
    /// # Errors
    ///
    /// Returns `CalbotError::CalendarApi` if HTTP client initialization
    /// fails.
    pub fn new(config: CalComConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent("calbot/0.2.0")
            .build()
            .map_err(|e| CalbotError::CalendarApi {
                message: format!("Failed to create HTTP client: {}", e),
                status: None,
                details: None,
            })?;

        tracing::info!("Initialized Cal.com client: api_base={}", config.api_base);

        Ok(Self { client, config })
    }

    /// Make a request to the Cal.com API
    ///
    /// 404 responses become `NotFound`; other non-success statuses
    /// become `CalendarApi` carrying the upstream status and body.
    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = format!("{}/{}", self.config.api_base, endpoint);
        let mut query: Vec<(&str, String)> = vec![("apiKey", self.config.api_key.clone())];
        query.extend_from_slice(params);

        let mut builder = self.client.request(method, &url).query(&query);
        if let Some(data) = body {
            builder = builder.json(data);
        }

        let response = builder.send().await.map_err(|e| CalbotError::CalendarApi {
            message: format!("Cal.com API request error: {}", e),
            status: None,
            details: Some(e.to_string()),
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(CalbotError::NotFound(format!("Cal.com resource: {}", endpoint)).into());
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::error!("Cal.com API error {}: {}", status, text);
            return Err(CalbotError::CalendarApi {
                message: format!("Cal.com API error: {}", status.as_u16()),
                status: Some(status.as_u16()),
                details: Some(text),
            }
            .into());
        }

        response.json().await.map_err(|e| {
            CalbotError::CalendarApi {
                message: format!("Failed to parse Cal.com response: {}", e),
                status: None,
                details: None,
            }
            .into()
        })
    }

    /// Parse a booking out of a Cal.com response that may wrap the
    /// booking in a `booking` field or return it bare. An unparseable
    /// success degrades to a minimal booking echoing the request.
    fn parse_booking_response(&self, response: Value, request: &BookingRequest) -> Booking {
        let candidate = if response.get("booking").is_some() {
            response["booking"].clone()
        } else {
            response.clone()
        };

        match serde_json::from_value::<Booking>(candidate) {
            Ok(booking) => booking,
            Err(e) => {
                tracing::warn!("Unexpected booking response format ({}), using fallback", e);
                Booking {
                    id: response.get("id").and_then(Value::as_i64).unwrap_or(0),
                    uid: response
                        .get("uid")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown")
                        .to_string(),
                    title: request
                        .title
                        .clone()
                        .unwrap_or_else(|| format!("Meeting with {}", request.name)),
                    description: request.description.clone(),
                    start_time: request.start,
                    end_time: request.end,
                    status: "ACCEPTED".to_string(),
                    attendees: vec![Attendee {
                        email: request.email.clone(),
                        name: request.name.clone(),
                        timezone: request.timezone.clone(),
                    }],
                    event_type_id: Some(request.event_type_id),
                }
            }
        }
    }

    fn booking_body(&self, request: &BookingRequest, location: &str) -> Value {
        json!({
            "eventTypeId": request.event_type_id,
            "start": request.start.to_rfc3339(),
            "end": request.end.to_rfc3339(),
            "responses": {
                "name": request.name,
                "email": request.email,
                "location": {"value": location, "optionValue": ""}
            },
            "timeZone": request.timezone.as_deref().unwrap_or("America/Los_Angeles"),
            "language": request.language.as_deref().unwrap_or("en"),
            "title": request
                .title
                .clone()
                .unwrap_or_else(|| format!("Meeting with {}", request.name)),
            "description": request.description,
            "metadata": {}
        })
    }
}

#[async_trait]
impl CalendarProvider for CalComClient {
    async fn list_event_types(&self) -> Result<Vec<EventType>> {
        let response = self
            .request(Method::GET, "event-types", &[], None)
            .await?;
        let raw = response
            .get("event_types")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut event_types = Vec::with_capacity(raw.len());
        for entry in raw {
            match serde_json::from_value::<EventType>(entry) {
                Ok(et) => event_types.push(et),
                Err(e) => tracing::warn!("Skipping unparseable event type: {}", e),
            }
        }
        Ok(event_types)
    }

    async fn available_slots(
        &self,
        event_type_id: i64,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
        timezone: &str,
    ) -> Result<Vec<Slot>> {
        tracing::debug!(
            "Getting available slots for event type {} from {} to {}",
            event_type_id,
            start,
            end
        );

        // Duration comes from the event type, never the provider's end field
        let event_types = match self.list_event_types().await {
            Ok(types) => types,
            Err(e) => {
                tracing::error!("Error listing event types for slots: {}", e);
                return Ok(Vec::new());
            }
        };
        let Some(event_type) = event_types.iter().find(|et| et.id == event_type_id) else {
            tracing::warn!("Event type {} not found", event_type_id);
            return Ok(Vec::new());
        };
        let duration = ChronoDuration::minutes(i64::from(event_type.length));

        let params = [
            ("eventTypeId", event_type_id.to_string()),
            ("startTime", start.to_rfc3339()),
            ("endTime", end.to_rfc3339()),
            ("timeZone", timezone.to_string()),
        ];

        let response = match self.request(Method::GET, "slots", &params, None).await {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("Error getting available slots: {}", e);
                return Ok(Vec::new());
            }
        };

        let mut slots = Vec::new();
        let Some(by_date) = response.get("slots").and_then(Value::as_object) else {
            tracing::error!("Unexpected slots response format");
            return Ok(Vec::new());
        };

        for (date, entries) in by_date {
            let Some(entries) = entries.as_array() else {
                tracing::warn!("Unexpected slot list format for date {}", date);
                continue;
            };
            for entry in entries {
                let Some(time) = entry.get("time").and_then(Value::as_str) else {
                    tracing::warn!("Unexpected slot entry format: {}", entry);
                    continue;
                };
                match DateTime::parse_from_rfc3339(time) {
                    Ok(slot_start) => slots.push(Slot {
                        start: slot_start,
                        end: slot_start + duration,
                    }),
                    Err(e) => tracing::error!("Error parsing slot time {}: {}", time, e),
                }
            }
        }

        slots.sort_by_key(|s| s.start);
        tracing::info!(
            "Found {} available slots for event type {}",
            slots.len(),
            event_type_id
        );
        Ok(slots)
    }

    async fn book(&self, request: &BookingRequest) -> Result<Booking> {
        let body = self.booking_body(request, "inPerson");
        tracing::debug!(
            "Booking event: event_type_id={}, start={}, email={}",
            request.event_type_id,
            request.start,
            request.email
        );

        match self.request(Method::POST, "bookings", &[], Some(&body)).await {
            Ok(response) => Ok(self.parse_booking_response(response, request)),
            Err(e) => {
                let retryable = e
                    .downcast_ref::<CalbotError>()
                    .and_then(CalbotError::details)
                    .map(|d| d.contains("no_available_users_found_error"))
                    .unwrap_or(false);
                if !retryable {
                    return Err(e);
                }

                tracing::info!("Retrying booking with phone location strategy");
                let retry_body = self.booking_body(request, "userPhone");
                let response = self
                    .request(Method::POST, "bookings", &[], Some(&retry_body))
                    .await?;
                Ok(self.parse_booking_response(response, request))
            }
        }
    }

    async fn list_bookings(
        &self,
        email: Option<&str>,
        start: Option<DateTime<FixedOffset>>,
        end: Option<DateTime<FixedOffset>>,
        status: Option<&str>,
    ) -> Result<Vec<Booking>> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(email) = email {
            params.push(("email", email.to_string()));
        }
        if let Some(start) = start {
            params.push(("startDate", start.to_rfc3339()));
        }
        if let Some(end) = end {
            params.push(("endDate", end.to_rfc3339()));
        }
        if let Some(status) = status {
            params.push(("status", status.to_string()));
        }

        let response = self.request(Method::GET, "bookings", &params, None).await?;
        let raw = response
            .get("bookings")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        // Partial-failure policy: a listing succeeds with fewer entries
        // rather than failing the whole request; skipped entries are logged.
        let mut bookings = Vec::with_capacity(raw.len());
        for entry in raw {
            match serde_json::from_value::<Booking>(entry) {
                Ok(booking) => bookings.push(booking),
                Err(e) => tracing::warn!("Skipping unparseable booking entry: {}", e),
            }
        }

        if let Some(email) = email {
            bookings.retain(|b| b.has_attendee(email));
        }
        Ok(bookings)
    }

    async fn cancel(&self, booking_uid: &str, reason: Option<&str>) -> Result<()> {
        let body = reason
            .map(|r| json!({"reason": r}))
            .unwrap_or_else(|| json!({}));
        self.request(
            Method::DELETE,
            &format!("bookings/{}", booking_uid),
            &[],
            Some(&body),
        )
        .await?;
        Ok(())
    }

    async fn reschedule(
        &self,
        booking_uid: &str,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
        reason: Option<&str>,
    ) -> Result<Booking> {
        let mut body = json!({
            "start": start.to_rfc3339(),
            "end": end.to_rfc3339(),
        });
        if let Some(reason) = reason {
            body["reason"] = json!(reason);
        }

        let response = self
            .request(
                Method::PATCH,
                &format!("bookings/{}", booking_uid),
                &[],
                Some(&body),
            )
            .await?;

        let candidate = response.get("booking").cloned().unwrap_or(response);
        serde_json::from_value::<Booking>(candidate).map_err(|e| {
            CalbotError::CalendarApi {
                message: format!("Failed to parse rescheduled booking: {}", e),
                status: None,
                details: None,
            }
            .into()
        })
    }

    async fn get_booking(&self, booking_uid: &str) -> Result<Booking> {
        let response = self
            .request(Method::GET, &format!("bookings/{}", booking_uid), &[], None)
            .await?;
        let candidate = response.get("booking").cloned().unwrap_or(response);
        serde_json::from_value::<Booking>(candidate).map_err(|e| {
            CalbotError::CalendarApi {
                message: format!("Failed to parse booking: {}", e),
                status: None,
                details: None,
            }
            .into()
        })
    }
}
