//! Calbot - Conversational scheduling assistant
//!
//! This library provides the core functionality for the Calbot
//! scheduling service: a chat loop driven by LLM function calling,
//! a calendar provider abstraction over the Cal.com API, session
//! management, and the automatic booking engine.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `chat`: Conversation orchestration and the per-turn pipeline
//! - `providers`: Completion provider abstraction and the OpenAI implementation
//! - `calcom`: Calendar provider abstraction and the Cal.com client
//! - `functions`: The function dispatch table exposed to the model
//! - `autobook`: Automatic booking after an availability check
//! - `session`: Multi-turn session state
//! - `server`: HTTP surface
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases

pub mod autobook;
pub mod calcom;
pub mod chat;
pub mod config;
pub mod error;
pub mod functions;
pub mod providers;
pub mod server;
pub mod session;

pub use chat::{ChatReply, ChatService};
pub use config::Config;
pub use error::{CalbotError, ErrorBody, Result};
