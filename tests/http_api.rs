//! HTTP surface tests
//!
//! Drives the axum router directly with tower's oneshot, with the
//! calendar API mocked behind wiremock where a route reaches upstream.

use calbot::calcom::{CalComClient, CalendarProvider};
use calbot::chat::ChatService;
use calbot::config::Config;
use calbot::providers::{CompletionProvider, OpenAiProvider};
use calbot::server::router;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn app_with(config: Config) -> Router {
    let completion: Arc<dyn CompletionProvider> =
        Arc::new(OpenAiProvider::new(config.openai.clone()).unwrap());
    let calendar: Arc<dyn CalendarProvider> =
        Arc::new(CalComClient::new(config.calcom.clone()).unwrap());
    router(Arc::new(ChatService::new(completion, calendar, config)))
}

fn configured(calcom_uri: Option<&str>) -> Config {
    let mut config = Config::default();
    config.openai.api_key = "sk-test".to_string();
    config.calcom.api_key = "cal-test".to_string();
    if let Some(uri) = calcom_uri {
        config.calcom.api_base = uri.to_string();
    }
    config
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn root_reports_name_and_version() {
    let app = app_with(configured(None));
    let response = app
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["message"].as_str().unwrap().contains("Calbot"));
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn health_is_healthy_with_both_keys() {
    let app = app_with(configured(None));
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["api_keys"]["openai"], true);
}

#[tokio::test]
async fn health_degrades_without_calendar_key() {
    let mut config = configured(None);
    config.calcom.api_key = String::new();
    let app = app_with(config);
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["checks"]["api_keys"]["calcom"], false);
}

#[tokio::test]
async fn empty_chat_message_is_rejected() {
    let app = app_with(configured(None));
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/chat/message",
            json!({"message": "   "}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "validation_error");
    assert_eq!(body["status"], 400);
}

#[tokio::test]
async fn event_types_route_returns_provider_list() {
    let calcom = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/event-types"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "event_types": [
                {"id": 1, "slug": "quick", "title": "Quick Chat", "length": 15}
            ]
        })))
        .mount(&calcom)
        .await;

    let app = app_with(configured(Some(&calcom.uri())));
    let response = app
        .oneshot(
            Request::get("/api/calcom/event-types")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["title"], "Quick Chat");
}

#[tokio::test]
async fn slots_route_rejects_bad_date() {
    let app = app_with(configured(None));
    let response = app
        .oneshot(
            Request::get("/api/calcom/slots?event_type_id=2&date=14-03-2025")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "validation_error");
    assert!(body["message"].as_str().unwrap().contains("Invalid date"));
}

#[tokio::test]
async fn booking_route_requires_an_attendee() {
    let app = app_with(configured(None));
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/calcom/bookings",
            json!({
                "event_type_id": 2,
                "start_time": "2025-03-14T14:30:00-07:00",
                "end_time": "2025-03-14T15:00:00-07:00",
                "attendees": []
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("At least one attendee is required"));
}

#[tokio::test]
async fn listing_bookings_enriches_each_entry() {
    let calcom = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bookings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "bookings": [
                {
                    "id": 1,
                    "uid": "bk-1",
                    "title": "Standup",
                    "startTime": "2025-03-14T10:00:00-07:00",
                    "endTime": "2025-03-14T10:30:00-07:00",
                    "status": "ACCEPTED",
                    "attendees": [
                        {"name": "Jane Doe", "email": "jane@example.com", "timeZone": "America/Los_Angeles"}
                    ]
                }
            ]
        })))
        .mount(&calcom)
        .await;
    Mock::given(method("GET"))
        .and(path("/bookings/bk-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "booking": {
                "id": 1,
                "uid": "bk-1",
                "title": "Standup",
                "description": "Daily sync",
                "startTime": "2025-03-14T10:00:00-07:00",
                "endTime": "2025-03-14T10:30:00-07:00",
                "status": "ACCEPTED",
                "attendees": [
                    {"name": "Jane Doe", "email": "jane@example.com", "timeZone": "America/Los_Angeles"}
                ]
            }
        })))
        .mount(&calcom)
        .await;

    let app = app_with(configured(Some(&calcom.uri())));
    let response = app
        .oneshot(
            Request::get("/api/calcom/bookings?user_email=jane@example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["events"][0]["id"], "bk-1");
    assert_eq!(body["events"][0]["description"], "Daily sync");
}

#[tokio::test]
async fn cancelling_unknown_booking_is_404() {
    let calcom = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bookings/nope"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&calcom)
        .await;

    let app = app_with(configured(Some(&calcom.uri())));
    let response = app
        .oneshot(
            Request::delete("/api/calcom/bookings/nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["code"], "not_found");
    assert!(body["message"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn cancel_happy_path_round_trips() {
    let calcom = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bookings/bk-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "booking": {
                "id": 1,
                "uid": "bk-1",
                "title": "Standup",
                "startTime": "2025-03-14T10:00:00-07:00",
                "endTime": "2025-03-14T10:30:00-07:00",
                "status": "ACCEPTED",
                "attendees": []
            }
        })))
        .mount(&calcom)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/bookings/bk-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "cancelled"})))
        .mount(&calcom)
        .await;

    let app = app_with(configured(Some(&calcom.uri())));
    let response = app
        .oneshot(
            Request::delete("/api/calcom/bookings/bk-1?reason=conflict")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "CANCELLED");
}
