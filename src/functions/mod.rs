//! Function dispatch for model-issued calls
//!
//! Each calendar operation the model may invoke is a `FunctionHandler`
//! with a schema (advertised to the model) and an async executor. The
//! registry owns the handlers in a fixed order and turns handler
//! failures into in-band `{"error": ...}` results so one bad call never
//! aborts the conversation turn.

pub mod handlers;

use crate::error::{CalbotError, Result};
use crate::providers::{ToolCall, ToolSchema};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// One callable operation exposed to the model
#[async_trait]
pub trait FunctionHandler: Send + Sync {
    /// Schema advertised to the completion provider
    fn schema(&self) -> ToolSchema;

    /// Execute the operation with the model-supplied arguments
    async fn execute(&self, args: &Value) -> Result<Value>;
}

/// Registry of function handlers
///
/// Preserves registration order for schema advertisement and resolves
/// handlers by name at dispatch time.
pub struct FunctionRegistry {
    order: Vec<String>,
    handlers: HashMap<String, Arc<dyn FunctionHandler>>,
}

impl FunctionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            handlers: HashMap::new(),
        }
    }

    /// Register a handler; a duplicate name replaces the earlier one
    pub fn register(&mut self, handler: Arc<dyn FunctionHandler>) {
        let name = handler.schema().name;
        if self.handlers.insert(name.clone(), handler).is_none() {
            self.order.push(name);
        }
    }

    /// Schemas in registration order
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.order
            .iter()
            .filter_map(|name| self.handlers.get(name))
            .map(|h| h.schema())
            .collect()
    }

    /// Look up a handler by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn FunctionHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Execute one model-issued call
    ///
    /// Unknown names and handler failures come back as `{"error": ...}`
    /// values; the conversation turn itself never fails here.
    pub async fn dispatch(&self, call: &ToolCall) -> Value {
        let Some(handler) = self.get(&call.name) else {
            tracing::warn!("Model called unknown function: {}", call.name);
            return json!({"error": format!("Unknown function: {}", call.name)});
        };

        match handler.execute(&call.arguments).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Error processing function call {}: {}", call.name, e);
                json!({"error": e.to_string()})
            }
        }
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Fetch a required string argument
pub(crate) fn required_str<'a>(args: &'a Value, key: &str, message: &str) -> Result<&'a str> {
    match args.get(key).and_then(Value::as_str) {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(CalbotError::Validation(message.to_string()).into()),
    }
}

pub(crate) fn optional_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

pub(crate) fn optional_i64(args: &Value, key: &str) -> Option<i64> {
    args.get(key).and_then(Value::as_i64)
}

/// Parse an ISO-8601 timestamp, attaching the reference offset when the
/// model omitted one
pub(crate) fn parse_datetime(value: &str, offset: FixedOffset) -> Result<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt);
    }
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M"))
        .map_err(|_| CalbotError::Validation(format!("Invalid ISO timestamp: {}", value)))?;
    offset
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| CalbotError::Validation(format!("Ambiguous timestamp: {}", value)).into())
}
