use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};
use uuid::Uuid;

use super::base::ToolCallDelta;
use crate::models::tool::{Tool, ToolCall};

lazy_static! {
    static ref FUNCTION_NAME: Regex = Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();
}

/// Notable moments while a tool call is being streamed
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCallEvent {
    Started { id: String, name: String },
    ArgumentsDelta { id: String, delta: String },
}

#[derive(Debug)]
struct PendingCall {
    index: u32,
    id: String,
    name: String,
    arguments: String,
    started: bool,
}

/// Reassembles tool calls from streamed fragments. A fragment carrying an id
/// belongs to the call with that id; one without an id continues the latest
/// call at its index.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    pending: Vec<PendingCall>,
}

impl ToolCallAccumulator {
    /// Fold in one fragment and report what became visible because of it.
    /// A call is announced once its name is known; argument text seen before
    /// that is released together with the announcement.
    pub fn push(&mut self, delta: ToolCallDelta) -> Vec<ToolCallEvent> {
        let id = delta.id.filter(|id| !id.is_empty());
        let existing = match &id {
            Some(id) => self.pending.iter().position(|call| &call.id == id).or_else(|| {
                // An id-less head at this index is still waiting for its id
                self.pending
                    .iter()
                    .rposition(|call| call.index == delta.index && call.id.is_empty())
            }),
            None => self.pending.iter().rposition(|call| call.index == delta.index),
        };
        let position = match existing {
            Some(position) => position,
            None => {
                self.pending.push(PendingCall {
                    index: delta.index,
                    id: String::new(),
                    name: String::new(),
                    arguments: String::new(),
                    started: false,
                });
                self.pending.len() - 1
            }
        };
        let call = &mut self.pending[position];
        let mut events = Vec::new();

        if !call.started {
            if let Some(id) = id {
                call.id = id;
            }
            if let Some(name) = delta.name {
                call.name.push_str(&name);
            }
        }

        let fragment = delta.arguments.unwrap_or_default();
        call.arguments.push_str(&fragment);

        if !call.started && !call.name.is_empty() {
            if call.id.is_empty() {
                call.id = generate_tool_call_id();
            }
            call.started = true;
            events.push(ToolCallEvent::Started {
                id: call.id.clone(),
                name: call.name.clone(),
            });
            if !call.arguments.is_empty() {
                events.push(ToolCallEvent::ArgumentsDelta {
                    id: call.id.clone(),
                    delta: call.arguments.clone(),
                });
            }
        } else if call.started && !fragment.is_empty() {
            events.push(ToolCallEvent::ArgumentsDelta {
                id: call.id.clone(),
                delta: fragment,
            });
        }

        events
    }

    /// The completed calls in index order. Fragments that never received a
    /// name cannot be dispatched and are dropped.
    pub fn finish(mut self) -> Vec<ToolCall> {
        self.pending.sort_by_key(|call| call.index);
        self.pending
            .into_iter()
            .filter(|call| call.started)
            .map(|call| ToolCall::new(call.id, call.name, call.arguments))
            .collect()
    }
}

pub fn generate_tool_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}

/// Convert internal Tool format to OpenAI's API tool specification
pub fn tools_to_openai_spec(tools: &[Tool]) -> Result<Vec<Value>> {
    let mut tool_names = std::collections::HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(anyhow!("Duplicate tool name: {}", tool.name));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.input_schema,
            }
        }));
    }

    Ok(result)
}

pub fn is_valid_function_name(name: &str) -> bool {
    FUNCTION_NAME.is_match(name)
}

#[derive(Debug, thiserror::Error)]
#[error("Context length exceeded. Message: {0}")]
pub struct ContextLengthExceededError(String);

pub fn check_openai_context_length_error(error: &Value) -> Option<ContextLengthExceededError> {
    let code = error.get("code")?.as_str()?;
    if code == "context_length_exceeded" || code == "string_above_max_length" {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error")
            .to_string();
        Some(ContextLengthExceededError(message))
    } else {
        None
    }
}
