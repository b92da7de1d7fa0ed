use async_stream::stream;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::frame::Frame;
use super::protocol::Protocol;
use crate::models::message::ProviderMessage;
use crate::providers::base::{FinishReason, Provider, Usage};
use crate::providers::utils::ToolCallAccumulator;
use crate::tools::ToolRegistry;

/// How many provider calls one turn may make before it is cut short
pub const DEFAULT_MAX_STEPS: usize = 5;

/// Drives a provider through one assistant turn, running requested tools
/// and feeding their results back until the model stops asking for them.
#[derive(Clone)]
pub struct Translator {
    provider: Arc<dyn Provider>,
    registry: Arc<ToolRegistry>,
    max_steps: usize,
}

impl Translator {
    pub fn new(provider: Arc<dyn Provider>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            registry,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    /// The frames of one turn. Always opens with `start` and ends with exactly
    /// one `finish` or `error`. Nothing is requested from the provider until
    /// the stream is polled, and dropping the stream closes any open
    /// provider connection.
    pub fn frames(&self, messages: Vec<ProviderMessage>) -> BoxStream<'static, Frame> {
        let provider = Arc::clone(&self.provider);
        let registry = Arc::clone(&self.registry);
        let max_steps = self.max_steps;

        Box::pin(stream! {
            let message_id = Uuid::new_v4().to_string();
            yield Frame::Start { message_id: message_id.clone() };

            let tools = registry.tools();
            let mut messages = messages;
            let mut usage = Usage::default();
            let mut step = 0;

            loop {
                step += 1;

                let mut chunks = match provider.stream(&messages, &tools).await {
                    Ok(chunks) => chunks,
                    Err(e) => {
                        error!(error = %e, step, "provider request failed");
                        yield Frame::Error { error: e.to_string() };
                        return;
                    }
                };

                let mut text = String::new();
                let mut calls = ToolCallAccumulator::default();
                let mut finish_reason = None;
                let mut step_usage = None;

                while let Some(chunk) = chunks.next().await {
                    let chunk = match chunk {
                        Ok(chunk) => chunk,
                        Err(e) => {
                            error!(error = %e, step, "provider stream failed");
                            yield Frame::Error { error: e.to_string() };
                            return;
                        }
                    };

                    if let Some(delta) = chunk.text {
                        text.push_str(&delta);
                        yield Frame::TextDelta { text_delta: delta };
                    }
                    for delta in chunk.tool_calls {
                        for event in calls.push(delta) {
                            yield Frame::from(event);
                        }
                    }
                    if chunk.finish_reason.is_some() {
                        finish_reason = chunk.finish_reason;
                    }
                    if chunk.usage.is_some() {
                        step_usage = chunk.usage;
                    }
                }
                // The provider is done with this step; release the connection
                // before any tool runs.
                drop(chunks);

                if let Some(step_usage) = step_usage {
                    usage.add(&step_usage);
                }

                let tool_calls = calls.finish();
                if tool_calls.is_empty() {
                    yield finish(message_id, finish_reason.unwrap_or_default(), usage);
                    return;
                }

                let mut results = Vec::with_capacity(tool_calls.len());
                for call in &tool_calls {
                    let args = call
                        .parsed_arguments()
                        .unwrap_or_else(|_| Value::String(call.arguments.clone()));

                    let (result, is_error) = match registry.dispatch(call).await {
                        Ok(output) => (output, false),
                        Err(e) => {
                            warn!(tool = %call.name, id = %call.id, error = %e, "tool call failed");
                            (json!({"error": e.to_string()}), true)
                        }
                    };

                    results.push(ProviderMessage::tool_result(&call.id, result.to_string()));
                    yield Frame::ToolCallResult {
                        tool_call_id: call.id.clone(),
                        tool_name: call.name.clone(),
                        args,
                        result,
                        is_error,
                    };
                }

                messages.push(ProviderMessage::assistant_tool_calls(
                    Some(text),
                    tool_calls.into_iter().map(Into::into).collect(),
                ));
                messages.extend(results);

                if step >= max_steps {
                    warn!(max_steps, "step limit reached with tool calls pending");
                    yield finish(message_id, FinishReason::ToolCalls, usage);
                    return;
                }
                debug!(step, "continuing turn with tool results");
            }
        })
    }

    /// The encoded bytes of one turn in the given protocol
    pub fn translate(
        &self,
        messages: Vec<ProviderMessage>,
        protocol: Protocol,
    ) -> impl Stream<Item = Bytes> + Send + 'static {
        self.frames(messages)
            .filter_map(move |frame| futures::future::ready(protocol.encode(&frame)))
    }
}

fn finish(message_id: String, finish_reason: FinishReason, usage: Usage) -> Frame {
    Frame::Finish {
        message_id,
        finish_reason,
        usage: if usage.is_empty() { None } else { Some(usage) },
    }
}
