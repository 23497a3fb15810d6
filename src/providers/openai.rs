//! OpenAI provider implementation
//!
//! Implements `CompletionProvider` against the OpenAI chat completions
//! API with function-calling support. Internal messages and tool
//! schemas are converted to the wire format and the first choice is
//! normalized back into a `CompletionResponse`.

use crate::config::OpenAiConfig;
use crate::error::{CalbotError, Result};
use crate::providers::{CompletionProvider, CompletionResponse, Message, ToolCall, ToolSchema};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// OpenAI chat completions provider
pub struct OpenAiProvider {
    client: Client,
    config: OpenAiConfig,
}

/// Request body for POST /chat/completions
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
}

/// Message in OpenAI wire format
#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

/// Tool definition in OpenAI wire format
#[derive(Debug, Serialize)]
struct WireTool {
    r#type: String,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

/// Tool call in OpenAI wire format (arguments arrive as a JSON string)
#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(default = "default_tool_type")]
    r#type: String,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn default_tool_type() -> String {
    "function".to_string()
}

/// Response body from POST /chat/completions
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: WireMessage,
}

impl OpenAiProvider {
    /// Create a new OpenAI provider
    ///
    /// # Errors
    ///
    /// Returns `CalbotError::CompletionApi` if HTTP client
    /// initialization fails.
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent("calbot/0.2.0")
            .build()
            .map_err(|e| CalbotError::CompletionApi {
                message: format!("Failed to create HTTP client: {}", e),
                details: None,
            })?;

        tracing::info!(
            "Initialized OpenAI provider: api_base={}, model={}",
            config.api_base,
            config.model
        );

        Ok(Self { client, config })
    }

    /// Convert internal messages to the wire format
    fn convert_messages(&self, messages: &[Message]) -> Vec<WireMessage> {
        messages
            .iter()
            .map(|m| WireMessage {
                role: m.role.clone(),
                content: m.content.clone(),
                name: m.name.clone(),
                tool_call_id: m.tool_call_id.clone(),
                tool_calls: m.tool_calls.as_ref().map(|calls| {
                    calls
                        .iter()
                        .map(|tc| WireToolCall {
                            id: tc.id.clone(),
                            r#type: "function".to_string(),
                            function: WireFunctionCall {
                                name: tc.name.clone(),
                                arguments: tc.arguments.to_string(),
                            },
                        })
                        .collect()
                }),
            })
            .collect()
    }

    /// Convert internal tool schemas to the wire format
    fn convert_tools(&self, tools: &[ToolSchema]) -> Vec<WireTool> {
        tools
            .iter()
            .map(|t| WireTool {
                r#type: "function".to_string(),
                function: WireFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    /// Normalize the first choice into a CompletionResponse
    ///
    /// Tool call arguments arrive as a JSON string; unparseable
    /// arguments degrade to an empty object rather than failing the
    /// whole completion.
    fn parse_choice(&self, message: WireMessage) -> CompletionResponse {
        let tool_calls: Vec<ToolCall> = message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .filter(|tc| tc.r#type == "function")
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: serde_json::from_str(&tc.function.arguments).unwrap_or_else(|e| {
                    tracing::warn!("Unparseable tool call arguments: {}", e);
                    serde_json::Value::Object(serde_json::Map::new())
                }),
            })
            .collect();

        CompletionResponse {
            assistant_text: message.content.unwrap_or_default(),
            tool_calls,
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        temperature: f32,
    ) -> Result<CompletionResponse> {
        let wire_tools = self.convert_tools(tools);
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: self.convert_messages(messages),
            temperature,
            tool_choice: if wire_tools.is_empty() {
                None
            } else {
                Some("auto".to_string())
            },
            tools: wire_tools,
        };

        let url = format!("{}/chat/completions", self.config.api_base);
        tracing::debug!("Requesting completion: model={}", self.config.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| CalbotError::CompletionApi {
                message: format!("OpenAI request failed: {}", e),
                details: None,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("OpenAI returned error {}: {}", status, body);
            return Err(CalbotError::CompletionApi {
                message: format!("OpenAI API error: {}", status),
                details: Some(body),
            }
            .into());
        }

        let completion: ChatCompletionResponse =
            response.json().await.map_err(|e| CalbotError::CompletionApi {
                message: format!("Failed to parse OpenAI response: {}", e),
                details: None,
            })?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| CalbotError::CompletionApi {
                message: "OpenAI response contained no choices".to_string(),
                details: None,
            })?;

        Ok(self.parse_choice(choice.message))
    }
}
