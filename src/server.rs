//! HTTP surface
//!
//! Axum router exposing the conversational endpoint plus direct
//! calendar routes that bypass the model. Request-level failures are
//! rendered as the structured error payload with the matching HTTP
//! status; function-call failures inside a chat turn never surface
//! here.

use crate::calcom::{BookingRequest, CalComClient, CalendarProvider};
use crate::chat::{ChatReply, ChatService};
use crate::config::Config;
use crate::error::{CalbotError, ErrorBody, Result};
use crate::functions::parse_datetime;
use crate::providers::{CompletionProvider, OpenAiProvider};

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{Duration, NaiveDate};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
}

/// Boundary error wrapper rendering the structured payload
pub struct ApiError(anyhow::Error);

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody::from_error(&self.0);
        let status =
            StatusCode::from_u16(body.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        tracing::error!("Request failed ({}): {}", body.status, body.message);
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Build the application router
pub fn router(chat: Arc<ChatService>) -> Router {
    let state = AppState { chat };
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/chat/message", post(chat_message))
        .route("/api/calcom/event-types", get(event_types))
        .route("/api/calcom/slots", get(slots))
        .route("/api/calcom/bookings", post(book).get(list_events))
        .route(
            "/api/calcom/bookings/:booking_id",
            delete(cancel).patch(reschedule),
        )
        .with_state(state)
}

/// Construct providers from config and serve until shutdown
pub async fn run(config: Config) -> Result<()> {
    let completion: Arc<dyn CompletionProvider> =
        Arc::new(OpenAiProvider::new(config.openai.clone())?);
    let calendar: Arc<dyn CalendarProvider> = Arc::new(CalComClient::new(config.calcom.clone())?);
    let chat = Arc::new(ChatService::new(completion, calendar, config.clone()));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);
    axum::serve(listener, router(chat)).await?;
    Ok(())
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "Welcome to the Calbot scheduling API",
        "version": VERSION,
    }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let config = state.chat.config();
    let openai = !config.openai.api_key.is_empty();
    let calcom = !config.calcom.api_key.is_empty();
    let healthy = openai && calcom;

    Json(json!({
        "status": if healthy { "healthy" } else { "degraded" },
        "version": VERSION,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "checks": {
            "api_keys": {
                "status": if healthy { "available" } else { "missing" },
                "openai": openai,
                "calcom": calcom,
            }
        }
    }))
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

async fn chat_message(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Json<ChatReply>> {
    if request.message.trim().is_empty() {
        return Err(CalbotError::Validation("Message must not be empty".to_string()).into());
    }
    tracing::info!(
        "Chat message received: session_id={:?}, user_id={:?}",
        request.session_id,
        request.user_id
    );
    let reply = state
        .chat
        .process_message(&request.message, request.session_id.as_deref())
        .await?;
    Ok(Json(reply))
}

async fn event_types(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let event_types = state.chat.calendar().list_event_types().await?;
    Ok(Json(serde_json::to_value(event_types)?))
}

#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    pub event_type_id: i64,
    pub date: String,
}

async fn slots(
    State(state): State<AppState>,
    Query(query): Query<SlotsQuery>,
) -> ApiResult<Json<Value>> {
    let date = NaiveDate::parse_from_str(&query.date, "%Y-%m-%d").map_err(|_| {
        CalbotError::Validation(format!(
            "Invalid date format: {}. Expected format: YYYY-MM-DD",
            query.date
        ))
    })?;
    let chat = &state.chat.config().chat;
    let offset = chat.reference_offset();
    let start = date
        .and_hms_opt(0, 0, 0)
        .and_then(|dt| dt.and_local_timezone(offset).single())
        .ok_or_else(|| CalbotError::Validation(format!("Invalid date: {}", query.date)))?;
    let end = start + Duration::days(1) - Duration::seconds(1);

    let slots = state
        .chat
        .calendar()
        .available_slots(query.event_type_id, start, end, &chat.timezone)
        .await?;

    Ok(Json(Value::Array(
        slots
            .iter()
            .map(|slot| {
                json!({
                    "start": slot.start.to_rfc3339(),
                    "end": slot.end.to_rfc3339(),
                })
            })
            .collect(),
    )))
}

#[derive(Debug, Deserialize)]
pub struct AttendeePayload {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub timezone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BookPayload {
    pub event_type_id: i64,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub attendees: Vec<AttendeePayload>,
}

async fn book(
    State(state): State<AppState>,
    Json(payload): Json<BookPayload>,
) -> ApiResult<Json<Value>> {
    let Some(attendee) = payload.attendees.first() else {
        return Err(CalbotError::Validation("At least one attendee is required".to_string()).into());
    };

    let offset = state.chat.config().chat.reference_offset();
    let start = parse_datetime(&payload.start_time, offset)?;
    let end = parse_datetime(&payload.end_time, offset)?;

    let booking = state
        .chat
        .calendar()
        .book(&BookingRequest {
            event_type_id: payload.event_type_id,
            start,
            end,
            name: attendee.name.clone(),
            email: attendee.email.clone(),
            title: payload.title.clone(),
            description: payload.description.clone(),
            timezone: attendee.timezone.clone(),
            language: None,
        })
        .await?;

    Ok(Json(json!({
        "booking_id": booking.uid,
        "event_title": booking.title,
        "start_time": booking.start_time.to_rfc3339(),
        "end_time": booking.end_time.to_rfc3339(),
        "status": booking.status,
        "attendees": booking.attendees,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ListEventsQuery {
    pub user_email: String,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

async fn list_events(
    State(state): State<AppState>,
    Query(payload): Query<ListEventsQuery>,
) -> ApiResult<Json<Value>> {
    let offset = state.chat.config().chat.reference_offset();
    let parse_day = |value: &str| -> ApiResult<chrono::DateTime<chrono::FixedOffset>> {
        let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map_err(|_| CalbotError::Validation(format!("Invalid date: {}", value)))?;
        date.and_hms_opt(0, 0, 0)
            .and_then(|dt| dt.and_local_timezone(offset).single())
            .ok_or_else(|| CalbotError::Validation(format!("Invalid date: {}", value)).into())
    };
    let start = payload.start_date.as_deref().map(parse_day).transpose()?;
    let end = payload.end_date.as_deref().map(parse_day).transpose()?;

    let bookings = state
        .chat
        .calendar()
        .list_bookings(
            Some(&payload.user_email),
            start,
            end,
            payload.status.as_deref(),
        )
        .await?;

    // Enrich each listing entry; an entry that fails to resolve is
    // skipped rather than failing the listing
    let mut events = Vec::with_capacity(bookings.len());
    for booking in &bookings {
        match state.chat.calendar().get_booking(&booking.uid).await {
            Ok(detail) => events.push(json!({
                "id": detail.uid,
                "title": detail.title,
                "description": detail.description,
                "start_time": detail.start_time.to_rfc3339(),
                "end_time": detail.end_time.to_rfc3339(),
                "status": detail.status,
                "attendees": detail.attendees,
            })),
            Err(e) => {
                tracing::warn!("Skipping booking {} in listing: {}", booking.uid, e);
            }
        }
    }

    Ok(Json(json!({
        "events": events,
        "total": events.len(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct CancelQuery {
    #[serde(default)]
    pub reason: Option<String>,
}

async fn cancel(
    State(state): State<AppState>,
    Path(booking_id): Path<String>,
    Query(query): Query<CancelQuery>,
) -> ApiResult<Json<Value>> {
    // Existence check first so unknown ids get a clean 404
    state
        .chat
        .calendar()
        .get_booking(&booking_id)
        .await
        .map_err(|_| CalbotError::NotFound(format!("Booking with ID {} not found", booking_id)))?;

    state
        .chat
        .calendar()
        .cancel(&booking_id, query.reason.as_deref())
        .await?;

    Ok(Json(json!({
        "success": true,
        "booking_id": booking_id,
        "status": "CANCELLED",
    })))
}

#[derive(Debug, Deserialize)]
pub struct ReschedulePayload {
    pub new_start_time: String,
    pub new_end_time: String,
    #[serde(default)]
    pub reason: Option<String>,
}

async fn reschedule(
    State(state): State<AppState>,
    Path(booking_id): Path<String>,
    Json(payload): Json<ReschedulePayload>,
) -> ApiResult<Json<Value>> {
    state
        .chat
        .calendar()
        .get_booking(&booking_id)
        .await
        .map_err(|_| CalbotError::NotFound(format!("Booking with ID {} not found", booking_id)))?;

    let offset = state.chat.config().chat.reference_offset();
    let start = parse_datetime(&payload.new_start_time, offset)?;
    let end = parse_datetime(&payload.new_end_time, offset)?;

    let booking = state
        .chat
        .calendar()
        .reschedule(&booking_id, start, end, payload.reason.as_deref())
        .await?;

    Ok(Json(json!({
        "success": true,
        "booking_id": booking.uid,
        "event_title": booking.title,
        "start_time": booking.start_time.to_rfc3339(),
        "end_time": booking.end_time.to_rfc3339(),
        "status": booking.status,
    })))
}
