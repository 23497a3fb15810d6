//! Session state for multi-turn conversations
//!
//! Conversation history is an append-only sequence of turns, keyed by
//! session id. The store hands out one async mutex per session so two
//! requests against the same session serialize instead of interleaving
//! their history writes; distinct sessions stay concurrent.

use crate::config::ChatConfig;
use crate::providers::{Message, ToolCall};

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// One turn of conversation history
#[derive(Debug, Clone)]
pub enum Turn {
    /// Instruction seed, exactly one per session, always first
    System { content: String },
    /// Free-text user message
    User { content: String },
    /// Assistant reply, possibly carrying tool calls
    Assistant {
        content: Option<String>,
        tool_calls: Vec<ToolCall>,
    },
    /// Result of executing one tool call, fed back to the model
    ToolResult {
        name: String,
        tool_call_id: String,
        content: String,
    },
}

impl Turn {
    /// Convert this turn to the provider message representation
    pub fn to_message(&self) -> Message {
        match self {
            Turn::System { content } => Message::system(content.clone()),
            Turn::User { content } => Message::user(content.clone()),
            Turn::Assistant {
                content,
                tool_calls,
            } => {
                if tool_calls.is_empty() {
                    Message::assistant(content.clone().unwrap_or_default())
                } else {
                    Message::assistant_with_tools(content.clone(), tool_calls.clone())
                }
            }
            Turn::ToolResult {
                name,
                tool_call_id,
                content,
            } => Message::tool_result(name.clone(), tool_call_id.clone(), content.clone()),
        }
    }
}

/// Append-only conversation history for one session
#[derive(Debug)]
pub struct Session {
    turns: Vec<Turn>,
}

impl Session {
    /// Create a session seeded with the system turn
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::System {
                content: system_prompt.into(),
            }],
        }
    }

    /// Append a turn
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// All turns, oldest first
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// History in provider message form
    pub fn to_messages(&self) -> Vec<Message> {
        self.turns.iter().map(Turn::to_message).collect()
    }
}

/// In-memory store of chat sessions
///
/// The outer `RwLock` guards the session map; each session carries its
/// own `Mutex` held for the duration of one message's processing.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
}

impl SessionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Look up a session, creating it (seeded with the given system
    /// prompt) if unknown
    ///
    /// A missing id mints a fresh UUID. An unknown caller-supplied id is
    /// accepted and seeded the same way, so retries after a server
    /// restart still work.
    pub async fn get_or_create(
        &self,
        session_id: Option<&str>,
        system_prompt: &str,
    ) -> (String, Arc<Mutex<Session>>) {
        let id = match session_id {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        };

        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(&id) {
                return (id, Arc::clone(session));
            }
        }

        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(Session::new(system_prompt))));
        (id, Arc::clone(session))
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the instruction seed for a new session
///
/// Renders "today" in the configured reference timezone so the model
/// resolves relative dates consistently.
pub fn system_prompt(chat: &ChatConfig) -> String {
    let today = chat.now().format("%A, %B %d, %Y");
    format!(
        "Scheduling Assistant - Today is {today} ({timezone})\n\
         \n\
         Your primary function is to help users manage their calendar by booking, \
         listing, canceling, and rescheduling events.\n\
         \n\
         Booking workflow:\n\
         - Check availability with get_available_slots when a user requests a meeting\n\
         - If the slot is available, immediately book it with book_event\n\
         - Don't request information the user has already provided (date, time, name, email, reason)\n\
         - Complete the booking in a single step when possible\n\
         \n\
         For listing events: request email if not provided, then show all scheduled events.\n\
         For cancellations: request email if needed, locate the event, then cancel it.\n\
         For rescheduling: request email if needed, locate the event, ask for new time if needed, \
         then reschedule.\n\
         \n\
         Always prioritize efficiency and minimize back-and-forth with users.",
        today = today,
        timezone = chat.timezone,
    )
}
