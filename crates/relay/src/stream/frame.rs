use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::providers::base::{FinishReason, Usage};
use crate::providers::utils::ToolCallEvent;

fn is_false(value: &bool) -> bool {
    !*value
}

/// One event of the data stream protocol. Each frame is complete on its own
/// and is written out as soon as it is produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Frame {
    #[serde(rename_all = "camelCase")]
    Start { message_id: String },

    #[serde(rename_all = "camelCase")]
    TextDelta { text_delta: String },

    #[serde(rename_all = "camelCase")]
    ToolCallStart {
        tool_call_id: String,
        tool_name: String,
    },

    #[serde(rename_all = "camelCase")]
    ToolCallDelta {
        tool_call_id: String,
        args_text_delta: String,
    },

    /// The outcome of running a tool. A failed call carries `{"error": ...}`
    /// as its result and sets `isError`.
    #[serde(rename_all = "camelCase")]
    ToolCallResult {
        tool_call_id: String,
        tool_name: String,
        args: Value,
        result: Value,
        #[serde(default, skip_serializing_if = "is_false")]
        is_error: bool,
    },

    #[serde(rename_all = "camelCase")]
    Finish {
        message_id: String,
        finish_reason: FinishReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },

    Error { error: String },
}

impl From<ToolCallEvent> for Frame {
    fn from(event: ToolCallEvent) -> Self {
        match event {
            ToolCallEvent::Started { id, name } => Frame::ToolCallStart {
                tool_call_id: id,
                tool_name: name,
            },
            ToolCallEvent::ArgumentsDelta { id, delta } => Frame::ToolCallDelta {
                tool_call_id: id,
                args_text_delta: delta,
            },
        }
    }
}
