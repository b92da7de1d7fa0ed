use bytes::Bytes;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

use super::frame::Frame;

/// Wire format of a streamed turn, chosen by the client per request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Protocol {
    /// Every frame as a `data: <json>` server-sent event
    #[default]
    Data,
    /// Only the generated text, unframed
    Text,
}

impl Protocol {
    /// Serialize one frame, or `None` when the protocol has no representation
    /// for it.
    pub fn encode(&self, frame: &Frame) -> Option<Bytes> {
        match self {
            Protocol::Data => match serde_json::to_string(frame) {
                Ok(json) => Some(Bytes::from(format!("data: {}\n\n", json))),
                Err(e) => {
                    tracing::error!(error = %e, "failed to serialize frame");
                    None
                }
            },
            Protocol::Text => match frame {
                Frame::TextDelta { text_delta } => Some(Bytes::from(text_delta.clone())),
                _ => None,
            },
        }
    }
}
