use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

use super::utils::ToolCallAccumulator;
use crate::models::message::ProviderMessage;
use crate::models::tool::Tool;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }

    /// Fold another step's usage into this one. A count stays unknown only
    /// while no step has reported it.
    pub fn add(&mut self, other: &Usage) {
        fn sum(a: Option<i32>, b: Option<i32>) -> Option<i32> {
            match (a, b) {
                (Some(a), Some(b)) => Some(a + b),
                (a, b) => a.or(b),
            }
        }
        self.input_tokens = sum(self.input_tokens, other.input_tokens);
        self.output_tokens = sum(self.output_tokens, other.output_tokens);
        self.total_tokens = sum(self.total_tokens, other.total_tokens);
    }

    pub fn is_empty(&self) -> bool {
        self.input_tokens.is_none() && self.output_tokens.is_none() && self.total_tokens.is_none()
    }
}

/// Why the model stopped, in the vocabulary of the data stream protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum FinishReason {
    #[default]
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
    Error,
    Other,
}

impl FinishReason {
    pub fn from_openai(reason: &str) -> Self {
        match reason {
            "stop" => FinishReason::Stop,
            "length" => FinishReason::Length,
            "content_filter" => FinishReason::ContentFilter,
            "tool_calls" | "function_call" => FinishReason::ToolCalls,
            _ => FinishReason::Other,
        }
    }

    pub fn from_gemini(reason: &str) -> Self {
        match reason {
            "STOP" => FinishReason::Stop,
            "MAX_TOKENS" => FinishReason::Length,
            "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" => {
                FinishReason::ContentFilter
            }
            "MALFORMED_FUNCTION_CALL" => FinishReason::Error,
            _ => FinishReason::Other,
        }
    }
}

/// A fragment of a tool call. Fragments sharing an `index` belong to the same
/// call; `id` and `name` usually arrive on the first one only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallDelta {
    pub index: u32,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

/// One incremental unit of provider output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderChunk {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCallDelta>,
    pub finish_reason: Option<FinishReason>,
    /// Usage reported so far for this completion
    pub usage: Option<Usage>,
}

impl ProviderChunk {
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn tool_call(delta: ToolCallDelta) -> Self {
        Self {
            tool_calls: vec![delta],
            ..Default::default()
        }
    }

    pub fn finish(reason: FinishReason) -> Self {
        Self {
            finish_reason: Some(reason),
            ..Default::default()
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }
}

pub type ChunkStream = BoxStream<'static, Result<ProviderChunk>>;

/// A finished, non-streamed completion
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub message: ProviderMessage,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

/// Base trait for LLM providers (OpenAI-compatible gateways, Gemini)
#[async_trait]
pub trait Provider: Send + Sync {
    /// Open a streaming completion. The returned stream owns the underlying
    /// connection; dropping it closes the request.
    async fn stream(&self, messages: &[ProviderMessage], tools: &[Tool]) -> Result<ChunkStream>;

    /// Generate the next message in one piece
    async fn complete(&self, messages: &[ProviderMessage], tools: &[Tool]) -> Result<Completion> {
        let mut chunks = self.stream(messages, tools).await?;

        let mut text = String::new();
        let mut calls = ToolCallAccumulator::default();
        let mut finish_reason = None;
        let mut usage = None;

        while let Some(chunk) = chunks.try_next().await? {
            if let Some(delta) = chunk.text {
                text.push_str(&delta);
            }
            for delta in chunk.tool_calls {
                calls.push(delta);
            }
            finish_reason = chunk.finish_reason.or(finish_reason);
            usage = chunk.usage.or(usage);
        }

        let tool_calls = calls.finish();
        let message = if tool_calls.is_empty() {
            ProviderMessage::assistant(text)
        } else {
            ProviderMessage::assistant_tool_calls(
                Some(text),
                tool_calls.into_iter().map(Into::into).collect(),
            )
        };

        Ok(Completion {
            message,
            finish_reason: finish_reason.unwrap_or_default(),
            usage: usage.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::MockProvider;
    use serde_json::json;

    #[test]
    fn test_usage_creation() {
        let usage = Usage::new(Some(10), Some(20), Some(30));
        assert_eq!(usage.input_tokens, Some(10));
        assert_eq!(usage.output_tokens, Some(20));
        assert_eq!(usage.total_tokens, Some(30));
    }

    #[test]
    fn test_usage_serialization() -> Result<()> {
        let usage = Usage::new(Some(10), Some(20), None);
        let json_value = serde_json::to_value(&usage)?;
        assert_eq!(json_value, json!({"inputTokens": 10, "outputTokens": 20}));

        let deserialized: Usage = serde_json::from_value(json_value)?;
        assert_eq!(deserialized, usage);
        Ok(())
    }

    #[test]
    fn test_usage_add() {
        let mut usage = Usage::default();
        assert!(usage.is_empty());

        usage.add(&Usage::new(Some(10), Some(5), None));
        usage.add(&Usage::new(Some(12), Some(7), Some(19)));
        assert_eq!(usage, Usage::new(Some(22), Some(12), Some(19)));
    }

    #[test]
    fn test_finish_reason_mapping() {
        assert_eq!(FinishReason::from_openai("tool_calls"), FinishReason::ToolCalls);
        assert_eq!(FinishReason::from_openai("length"), FinishReason::Length);
        assert_eq!(FinishReason::from_gemini("MAX_TOKENS"), FinishReason::Length);
        assert_eq!(FinishReason::from_gemini("SAFETY"), FinishReason::ContentFilter);
        assert_eq!(FinishReason::from_gemini("LANGUAGE"), FinishReason::Other);
        assert_eq!(FinishReason::ContentFilter.to_string(), "content-filter");
        assert_eq!(serde_json::to_value(FinishReason::ToolCalls).unwrap(), json!("tool-calls"));
    }

    #[tokio::test]
    async fn test_complete_collects_stream() -> Result<()> {
        let provider = MockProvider::with_chunks(vec![
            ProviderChunk::text("Hello "),
            ProviderChunk::text("there"),
            ProviderChunk::finish(FinishReason::Stop).with_usage(Usage::new(Some(3), Some(2), Some(5))),
        ]);

        let completion = provider
            .complete(&[ProviderMessage::user("Hi")], &[])
            .await?;

        assert_eq!(completion.message, ProviderMessage::assistant("Hello there"));
        assert_eq!(completion.finish_reason, FinishReason::Stop);
        assert_eq!(completion.usage.total_tokens, Some(5));
        Ok(())
    }

    #[tokio::test]
    async fn test_complete_assembles_tool_calls() -> Result<()> {
        let provider = MockProvider::with_chunks(vec![
            ProviderChunk::tool_call(ToolCallDelta {
                index: 0,
                id: Some("call_1".to_string()),
                name: Some("get_current_weather".to_string()),
                arguments: Some("{\"latitude\":".to_string()),
            }),
            ProviderChunk::tool_call(ToolCallDelta {
                index: 0,
                arguments: Some("1.5}".to_string()),
                ..Default::default()
            }),
            ProviderChunk::finish(FinishReason::ToolCalls),
        ]);

        let completion = provider
            .complete(&[ProviderMessage::user("Weather?")], &[])
            .await?;

        assert_eq!(completion.finish_reason, FinishReason::ToolCalls);
        assert_eq!(completion.message.content, None);
        let call = &completion.message.tool_calls[0];
        assert_eq!(call.id, "call_1");
        assert_eq!(call.function.name, "get_current_weather");
        assert_eq!(call.function.arguments, "{\"latitude\":1.5}");
        Ok(())
    }
}
