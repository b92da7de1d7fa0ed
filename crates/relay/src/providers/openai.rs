use anyhow::{anyhow, bail, Result};
use async_stream::try_stream;
use async_trait::async_trait;
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::{Stream, StreamExt};
use reqwest::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;

use super::base::{ChunkStream, FinishReason, Provider, ProviderChunk, ToolCallDelta, Usage};
use super::configs::OpenAiProviderConfig;
use super::utils::{check_openai_context_length_error, tools_to_openai_spec};
use crate::models::message::ProviderMessage;
use crate::models::tool::Tool;

/// The Vercel AI gateway, which speaks the OpenAI chat completions API
pub const OPENAI_HOST: &str = "https://ai-gateway.vercel.sh";
pub const OPENAI_MODEL: &str = "openai/gpt-4o";

pub struct OpenAiProvider {
    client: Client,
    config: OpenAiProviderConfig,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<StreamUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCall {
    #[serde(default)]
    index: u32,
    id: Option<String>,
    function: Option<StreamFunction>,
}

#[derive(Debug, Deserialize)]
struct StreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamUsage {
    prompt_tokens: Option<i32>,
    completion_tokens: Option<i32>,
    total_tokens: Option<i32>,
}

impl From<StreamUsage> for Usage {
    fn from(usage: StreamUsage) -> Self {
        let total_tokens = usage
            .total_tokens
            .or(match (usage.prompt_tokens, usage.completion_tokens) {
                (Some(input), Some(output)) => Some(input + output),
                _ => None,
            });
        Usage::new(usage.prompt_tokens, usage.completion_tokens, total_tokens)
    }
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            bail!("OpenAI API key is required");
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    fn payload(&self, messages: &[ProviderMessage], tools: &[Tool]) -> Result<Value> {
        let mut payload = Map::new();
        payload.insert("model".to_string(), json!(self.config.model));
        payload.insert("messages".to_string(), serde_json::to_value(messages)?);
        payload.insert("stream".to_string(), json!(true));
        payload.insert("stream_options".to_string(), json!({"include_usage": true}));

        // Add optional parameters
        if !tools.is_empty() {
            payload.insert("tools".to_string(), json!(tools_to_openai_spec(tools)?));
        }
        if let Some(temp) = self.config.temperature {
            payload.insert("temperature".to_string(), json!(temp));
        }
        if let Some(tokens) = self.config.max_tokens {
            payload.insert("max_tokens".to_string(), json!(tokens));
        }

        Ok(Value::Object(payload))
    }

    async fn post(&self, payload: Value) -> Result<reqwest::Response> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.host.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        // Raise specific error if context length is exceeded
        if let Ok(error) = serde_json::from_str::<Value>(&body) {
            if let Some(err) = error.get("error").and_then(check_openai_context_length_error) {
                return Err(err.into());
            }
        }

        if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 {
            Err(anyhow!("Server error: {}", status))
        } else {
            Err(anyhow!("Request failed: {}\nResponse: {}", status, body))
        }
    }
}

fn parse_chunk(data: &str) -> Result<ProviderChunk> {
    let value: Value = serde_json::from_str(data)
        .map_err(|e| anyhow!("Malformed stream chunk ({}): {}", e, data))?;

    if let Some(error) = value.get("error") {
        if let Some(err) = check_openai_context_length_error(error) {
            return Err(err.into());
        }
        bail!("OpenAI API error: {}", error);
    }

    let chunk: StreamChunk = serde_json::from_value(value)?;
    let mut result = ProviderChunk {
        usage: chunk.usage.map(Usage::from),
        ..Default::default()
    };

    // Only one choice is ever requested
    if let Some(choice) = chunk.choices.into_iter().next() {
        result.finish_reason = choice.finish_reason.as_deref().map(FinishReason::from_openai);
        if let Some(delta) = choice.delta {
            result.text = delta.content.filter(|text| !text.is_empty());
            result.tool_calls = delta
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|call| {
                    let (name, arguments) = match call.function {
                        Some(function) => (function.name, function.arguments),
                        None => (None, None),
                    };
                    ToolCallDelta {
                        index: call.index,
                        id: call.id,
                        name,
                        arguments,
                    }
                })
                .collect();
        }
    }

    Ok(result)
}

fn provider_chunks<S, E>(events: S) -> impl Stream<Item = Result<ProviderChunk>>
where
    S: Stream<Item = std::result::Result<Event, EventStreamError<E>>>,
    E: std::error::Error + Send + Sync + 'static,
{
    try_stream! {
        futures::pin_mut!(events);
        while let Some(event) = events.next().await {
            let event = event?;
            if event.data == "[DONE]" {
                break;
            }
            let chunk = parse_chunk(&event.data)?;
            yield chunk;
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn stream(&self, messages: &[ProviderMessage], tools: &[Tool]) -> Result<ChunkStream> {
        let payload = self.payload(messages, tools)?;
        let response = self.post(payload).await?;

        tracing::debug!(model = %self.config.model, "opened chat completion stream");
        Ok(Box::pin(provider_chunks(response.bytes_stream().eventsource())))
    }
}
