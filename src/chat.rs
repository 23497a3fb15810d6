//! Conversation orchestration
//!
//! One user message drives a single completion pass: history plus the
//! advertised function schemas go to the model, any tool calls it
//! issues are dispatched against the calendar, and the results land
//! back in history. When the model answered a booking-flavored message
//! with an availability check, the auto-booking engine gets a chance to
//! finish the job in the same turn.

use crate::autobook::{
    is_booking_request, AutoBooker, LlmDateTimeExtractor, PatternDateTimeExtractor,
};
use crate::calcom::CalendarProvider;
use crate::config::Config;
use crate::error::Result;
use crate::functions::{handlers::standard_registry, FunctionRegistry};
use crate::providers::CompletionProvider;
use crate::session::{system_prompt, SessionStore, Turn};

use chrono::Datelike;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Reply for one processed message
#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    /// Assistant text or the first function result, JSON-encoded
    pub response: String,
    /// Session id the caller should echo on the next message
    pub session_id: String,
    /// True when the model issued function calls this turn
    pub requires_action: bool,
    /// First function call of the turn, when one was issued
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_details: Option<Value>,
}

const FALLBACK_RESPONSE: &str = "I'll check your scheduled events.";

/// The conversational scheduling service
pub struct ChatService {
    completion: Arc<dyn CompletionProvider>,
    calendar: Arc<dyn CalendarProvider>,
    registry: FunctionRegistry,
    sessions: SessionStore,
    config: Config,
}

impl ChatService {
    pub fn new(
        completion: Arc<dyn CompletionProvider>,
        calendar: Arc<dyn CalendarProvider>,
        config: Config,
    ) -> Self {
        let registry = standard_registry(Arc::clone(&calendar), config.chat.clone());
        Self {
            completion,
            calendar,
            registry,
            sessions: SessionStore::new(),
            config,
        }
    }

    /// Process one user message within its session
    ///
    /// # Errors
    ///
    /// Fails on completion-provider errors and on a provider failure
    /// during the final auto-booking call. Function-call failures stay
    /// in-band and do not fail the turn.
    pub async fn process_message(
        &self,
        message: &str,
        session_id: Option<&str>,
    ) -> Result<ChatReply> {
        let prompt = system_prompt(&self.config.chat);
        let (session_id, session) = self.sessions.get_or_create(session_id, &prompt).await;

        // Hold the session lock for the whole turn so concurrent
        // messages against one session serialize
        let mut session = session.lock().await;
        session.push(Turn::User {
            content: message.to_string(),
        });

        let completion = self
            .completion
            .complete(
                &session.to_messages(),
                &self.registry.schemas(),
                self.config.openai.temperature,
            )
            .await?;

        let assistant_text = completion.assistant_text.clone();
        let tool_calls = completion.tool_calls;
        session.push(Turn::Assistant {
            content: if assistant_text.is_empty() {
                None
            } else {
                Some(assistant_text.clone())
            },
            tool_calls: tool_calls.clone(),
        });

        let mut first_result: Option<Value> = None;
        for call in &tool_calls {
            let result = self.registry.dispatch(call).await;
            session.push(Turn::ToolResult {
                name: call.name.clone(),
                tool_call_id: call.id.clone(),
                content: result.to_string(),
            });
            if first_result.is_none() {
                first_result = Some(result);
            }
        }

        let mut reply = ChatReply {
            response: match &first_result {
                Some(result) => result.to_string(),
                None if assistant_text.is_empty() => FALLBACK_RESPONSE.to_string(),
                None => assistant_text,
            },
            session_id,
            requires_action: !tool_calls.is_empty(),
            action_details: tool_calls
                .first()
                .map(|call| json!({"name": call.name, "arguments": call.arguments})),
        };

        // Availability check on a booking request: try to finish the
        // booking in this turn
        let availability = tool_calls
            .first()
            .filter(|call| call.name == "get_available_slots")
            .and_then(|_| first_result.as_ref());
        if let Some(slots_result) = availability {
            if is_booking_request(message) {
                tracing::info!("Auto-booking triggered for session {}", reply.session_id);
                if let Some(outcome) = self.auto_booker().run(message, slots_result).await? {
                    reply.response = outcome.confirmation();
                    reply.requires_action = false;
                    reply.action_details = None;
                }
            }
        }

        Ok(reply)
    }

    /// Build the auto-booking engine for one turn
    ///
    /// Constructed per turn so the pattern extractor sees the current
    /// year in the reference timezone.
    fn auto_booker(&self) -> AutoBooker {
        let chat = &self.config.chat;
        AutoBooker::new(
            Arc::clone(&self.calendar),
            vec![
                Arc::new(LlmDateTimeExtractor::new(Arc::clone(&self.completion))),
                Arc::new(PatternDateTimeExtractor::new(chat.now().year())),
            ],
            chat.reference_offset(),
        )
    }

    /// The calendar provider, for the direct HTTP routes
    pub fn calendar(&self) -> &Arc<dyn CalendarProvider> {
        &self.calendar
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calcom::{Booking, BookingRequest, EventType, Slot};
    use crate::error::CalbotError;
    use crate::providers::{CompletionResponse, Message, ToolCall, ToolSchema};
    use async_trait::async_trait;
    use chrono::{DateTime, FixedOffset};
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    /// Completion double that replays scripted responses in order
    struct ScriptedCompletion {
        responses: StdMutex<Vec<CompletionResponse>>,
        seen_messages: StdMutex<Vec<usize>>,
    }

    impl ScriptedCompletion {
        fn new(responses: Vec<CompletionResponse>) -> Self {
            Self {
                responses: StdMutex::new(responses),
                seen_messages: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedCompletion {
        async fn complete(
            &self,
            messages: &[Message],
            _tools: &[ToolSchema],
            _temperature: f32,
        ) -> Result<CompletionResponse> {
            self.seen_messages.lock().unwrap().push(messages.len());
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(CalbotError::CompletionApi {
                    message: "script exhausted".to_string(),
                    details: None,
                }
                .into());
            }
            Ok(responses.remove(0))
        }
    }

    struct StubCalendar {
        slots: Vec<Slot>,
    }

    #[async_trait]
    impl CalendarProvider for StubCalendar {
        async fn list_event_types(&self) -> Result<Vec<EventType>> {
            Ok(vec![EventType {
                id: 2,
                slug: "standard".to_string(),
                title: "Standard Meeting".to_string(),
                description: None,
                length: 30,
                hidden: false,
            }])
        }

        async fn available_slots(
            &self,
            _event_type_id: i64,
            _start: DateTime<FixedOffset>,
            _end: DateTime<FixedOffset>,
            _timezone: &str,
        ) -> Result<Vec<Slot>> {
            Ok(self.slots.clone())
        }

        async fn book(&self, request: &BookingRequest) -> Result<Booking> {
            Ok(Booking {
                id: 1,
                uid: "uid-book".to_string(),
                title: request.title.clone().unwrap_or_default(),
                description: None,
                start_time: request.start,
                end_time: request.end,
                status: "ACCEPTED".to_string(),
                attendees: Vec::new(),
                event_type_id: Some(request.event_type_id),
            })
        }

        async fn list_bookings(
            &self,
            _email: Option<&str>,
            _start: Option<DateTime<FixedOffset>>,
            _end: Option<DateTime<FixedOffset>>,
            _status: Option<&str>,
        ) -> Result<Vec<Booking>> {
            Ok(Vec::new())
        }

        async fn cancel(&self, _booking_uid: &str, _reason: Option<&str>) -> Result<()> {
            Ok(())
        }

        async fn reschedule(
            &self,
            _booking_uid: &str,
            _start: DateTime<FixedOffset>,
            _end: DateTime<FixedOffset>,
            _reason: Option<&str>,
        ) -> Result<Booking> {
            Err(CalbotError::NotFound("unused".to_string()).into())
        }

        async fn get_booking(&self, _booking_uid: &str) -> Result<Booking> {
            Err(CalbotError::NotFound("unused".to_string()).into())
        }
    }

    fn slot(start: &str, end: &str) -> Slot {
        Slot {
            start: DateTime::parse_from_rfc3339(start).unwrap(),
            end: DateTime::parse_from_rfc3339(end).unwrap(),
        }
    }

    fn service(
        responses: Vec<CompletionResponse>,
        slots: Vec<Slot>,
    ) -> (ChatService, Arc<ScriptedCompletion>) {
        let completion = Arc::new(ScriptedCompletion::new(responses));
        let calendar = Arc::new(StubCalendar { slots });
        let service = ChatService::new(
            Arc::clone(&completion) as Arc<dyn CompletionProvider>,
            calendar,
            Config::default(),
        );
        (service, completion)
    }

    fn slots_call() -> ToolCall {
        ToolCall {
            id: "call_1".to_string(),
            name: "get_available_slots".to_string(),
            arguments: json!({"date": "2025-03-14"}),
        }
    }

    #[tokio::test]
    async fn test_plain_text_reply() {
        let (service, _) = service(vec![CompletionResponse::text("Hello! How can I help?")], vec![]);
        let reply = service.process_message("hi", None).await.unwrap();
        assert_eq!(reply.response, "Hello! How can I help?");
        assert!(!reply.requires_action);
        assert!(reply.action_details.is_none());
    }

    #[tokio::test]
    async fn test_empty_text_gets_fallback() {
        let (service, _) = service(vec![CompletionResponse::text("")], vec![]);
        let reply = service.process_message("hi", None).await.unwrap();
        assert_eq!(reply.response, FALLBACK_RESPONSE);
    }

    #[tokio::test]
    async fn test_function_call_result_becomes_response() {
        let (service, _) = service(
            vec![CompletionResponse::with_tool_calls("", vec![ToolCall {
                id: "call_1".to_string(),
                name: "get_event_types".to_string(),
                arguments: json!({}),
            }])],
            vec![],
        );
        let reply = service.process_message("what meetings exist?", None).await.unwrap();
        assert!(reply.requires_action);
        assert_eq!(reply.action_details.as_ref().unwrap()["name"], "get_event_types");
        let parsed: Value = serde_json::from_str(&reply.response).unwrap();
        assert_eq!(parsed["total"], 1);
    }

    #[tokio::test]
    async fn test_history_grows_across_turns() {
        let (service, completion) = service(
            vec![
                CompletionResponse::text("Hello!"),
                CompletionResponse::text("Again!"),
            ],
            vec![],
        );
        let first = service.process_message("hi", None).await.unwrap();
        service
            .process_message("hi again", Some(&first.session_id))
            .await
            .unwrap();

        let seen = completion.seen_messages.lock().unwrap();
        // system + user, then system + user + assistant + user
        assert_eq!(*seen, vec![2, 4]);
    }

    #[tokio::test]
    async fn test_auto_booking_end_to_end() {
        // First completion: the availability check. Second: the
        // extraction call issued by the model-backed extractor.
        let (service, _) = service(
            vec![
                CompletionResponse::with_tool_calls("", vec![slots_call()]),
                CompletionResponse::with_tool_calls(
                    "",
                    vec![ToolCall {
                        id: "call_2".to_string(),
                        name: "extract_datetime".to_string(),
                        arguments: json!({
                            "date": "2025-03-14",
                            "start_time": "14:30",
                            "is_specific": true
                        }),
                    }],
                ),
            ],
            vec![slot(
                "2025-03-14T14:30:00-07:00",
                "2025-03-14T15:00:00-07:00",
            )],
        );

        let reply = service
            .process_message(
                "Book a meeting for Jane Doe (jane@example.com) on March 14th at 2:30 PM",
                None,
            )
            .await
            .unwrap();

        assert!(reply
            .response
            .contains("Appointment booked successfully for Jane Doe on 2025-03-14 at 14:30:00"));
        assert!(reply.response.contains("uid-book"));
        assert!(!reply.requires_action);
        assert!(reply.action_details.is_none());
    }

    #[tokio::test]
    async fn test_no_keyword_means_no_auto_booking() {
        let (service, _) = service(
            vec![CompletionResponse::with_tool_calls("", vec![slots_call()])],
            vec![slot(
                "2025-03-14T14:30:00-07:00",
                "2025-03-14T15:00:00-07:00",
            )],
        );

        // "availability" carries no booking keyword
        let reply = service
            .process_message(
                "what availability is there for Jane Doe (jane@example.com) on March 14th at 2:30?",
                None,
            )
            .await
            .unwrap();

        assert!(reply.requires_action);
        let parsed: Value = serde_json::from_str(&reply.response).unwrap();
        assert_eq!(parsed["slots"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_extraction_keeps_conversational_reply() {
        // Extraction completion fails, pattern fallback finds no date;
        // the turn still succeeds with requires_action set
        let (service, _) = service(
            vec![CompletionResponse::with_tool_calls("", vec![slots_call()])],
            vec![slot(
                "2025-03-14T14:30:00-07:00",
                "2025-03-14T15:00:00-07:00",
            )],
        );

        let reply = service
            .process_message("Book a slot for Jane Doe (jane@example.com) soon", None)
            .await
            .unwrap();

        assert!(reply.requires_action);
        assert!(reply.action_details.is_some());
    }

    #[tokio::test]
    async fn test_unknown_function_error_is_in_band() {
        let (service, _) = service(
            vec![CompletionResponse::with_tool_calls("", vec![ToolCall {
                id: "call_1".to_string(),
                name: "launch_rocket".to_string(),
                arguments: json!({}),
            }])],
            vec![],
        );
        let reply = service.process_message("do it", None).await.unwrap();
        let parsed: Value = serde_json::from_str(&reply.response).unwrap();
        assert!(parsed["error"].as_str().unwrap().contains("launch_rocket"));
    }

    #[tokio::test]
    async fn test_completion_failure_fails_the_turn() {
        let (service, _) = service(vec![], vec![]);
        assert!(service.process_message("hi", None).await.is_err());
    }
}
