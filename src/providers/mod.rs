//! Completion provider abstraction and implementations
//!
//! The `base` module holds the internal message/tool representation and
//! the `CompletionProvider` trait; `openai` implements it against the
//! OpenAI chat completions API.

pub mod base;
pub mod openai;

pub use base::{CompletionProvider, CompletionResponse, Message, ToolCall, ToolSchema};
pub use openai::OpenAiProvider;
