//! Base completion-provider trait and common message types
//!
//! Defines the internal message representation used for conversation
//! history and the `CompletionProvider` trait that LLM backends
//! implement. Messages carry an optional name (for tool-result turns)
//! and optional structured tool calls.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Message structure for conversation
///
/// Represents one message exchanged with the completion provider.
/// Messages can come from the user, assistant, system, or be tool
/// results fed back to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender (user, assistant, system, tool)
    pub role: String,
    /// Content of the message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Originating function name (tool result messages)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tool calls issued by the assistant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Tool call this result corresponds to (tool result messages)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    /// Creates a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.into()),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Creates a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: Some(content.into()),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Creates a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: Some(content.into()),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Creates a new tool result message
    ///
    /// `name` is the function that produced the result and
    /// `tool_call_id` ties it back to the originating call.
    pub fn tool_result(
        name: impl Into<String>,
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content.into()),
            name: Some(name.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    /// Creates an assistant message carrying tool calls
    pub fn assistant_with_tools(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: "assistant".to_string(),
            content,
            name: None,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }
}

/// A structured function call issued by the model
///
/// Produced only by the completion adapter from model output; tests may
/// construct these directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned identifier for this call
    pub id: String,
    /// Name of the registered operation
    pub name: String,
    /// Arguments as a JSON object mapping parameter name to value
    pub arguments: serde_json::Value,
}

/// Tool schema advertised to the model
///
/// Follows the OpenAI function-calling format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Operation name
    pub name: String,
    /// Description of what the operation does
    pub description: String,
    /// JSON schema for the operation's parameters
    pub parameters: serde_json::Value,
}

impl ToolSchema {
    /// Create a new tool schema
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Normalized completion result
///
/// One assistant text (possibly empty) plus zero or more structured
/// tool calls.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Assistant text content
    pub assistant_text: String,
    /// Structured tool calls, in the order the model issued them
    pub tool_calls: Vec<ToolCall>,
}

impl CompletionResponse {
    /// Create a text-only completion result
    pub fn text(assistant_text: impl Into<String>) -> Self {
        Self {
            assistant_text: assistant_text.into(),
            tool_calls: Vec::new(),
        }
    }

    /// Create a completion result with tool calls
    pub fn with_tool_calls(assistant_text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            assistant_text: assistant_text.into(),
            tool_calls,
        }
    }
}

/// Trait for chat-completion backends
///
/// Implementations convert the internal message/tool representation
/// to their wire format and surface one normalized completion result.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Completes a conversation with the given history and tool schemas
    ///
    /// # Errors
    ///
    /// Returns `CalbotError::CompletionApi` if the API call fails or
    /// the response cannot be parsed.
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        temperature: f32,
    ) -> Result<CompletionResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_user() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, "user");
        assert_eq!(msg.content, Some("Hello".to_string()));
        assert!(msg.tool_calls.is_none());
        assert!(msg.name.is_none());
    }

    #[test]
    fn test_message_system() {
        let msg = Message::system("You are a scheduling assistant");
        assert_eq!(msg.role, "system");
    }

    #[test]
    fn test_message_tool_result_carries_name_and_id() {
        let msg = Message::tool_result("get_available_slots", "call_1", "{\"slots\":[]}");
        assert_eq!(msg.role, "tool");
        assert_eq!(msg.name, Some("get_available_slots".to_string()));
        assert_eq!(msg.tool_call_id, Some("call_1".to_string()));
    }

    #[test]
    fn test_message_assistant_with_tools() {
        let call = ToolCall {
            id: "call_1".to_string(),
            name: "get_event_types".to_string(),
            arguments: serde_json::json!({}),
        };
        let msg = Message::assistant_with_tools(None, vec![call]);
        assert_eq!(msg.role, "assistant");
        assert!(msg.content.is_none());
        assert_eq!(msg.tool_calls.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_message_serialization_skips_empty_fields() {
        let msg = Message::user("Test");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"role\":\"user\""));
        assert!(!json.contains("tool_calls"));
        assert!(!json.contains("\"name\""));
    }

    #[test]
    fn test_tool_schema_new() {
        let schema = ToolSchema::new(
            "book_event",
            "Book a new event",
            serde_json::json!({"type": "object", "properties": {}}),
        );
        assert_eq!(schema.name, "book_event");
        assert!(schema.parameters.is_object());
    }

    #[test]
    fn test_completion_response_text() {
        let response = CompletionResponse::text("Hi!");
        assert_eq!(response.assistant_text, "Hi!");
        assert!(response.tool_calls.is_empty());
    }

    #[test]
    fn test_completion_response_with_tool_calls() {
        let call = ToolCall {
            id: "call_1".to_string(),
            name: "cancel_event".to_string(),
            arguments: serde_json::json!({"booking_id": "abc"}),
        };
        let response = CompletionResponse::with_tool_calls("", vec![call]);
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "cancel_event");
    }
}
