use anyhow::{anyhow, bail, Result};
use async_stream::try_stream;
use async_trait::async_trait;
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::{Stream, StreamExt};
use reqwest::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::time::Duration;

use super::base::{ChunkStream, FinishReason, Provider, ProviderChunk, ToolCallDelta, Usage};
use super::configs::GeminiProviderConfig;
use super::utils::generate_tool_call_id;
use crate::models::message::ProviderMessage;
use crate::models::role::Role;
use crate::models::tool::Tool;

pub const GEMINI_HOST: &str = "https://generativelanguage.googleapis.com";
pub const GEMINI_MODEL: &str = "gemini-2.0-flash-exp";

pub struct GeminiProvider {
    client: Client,
    config: GeminiProviderConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CandidatePart {
    text: Option<String>,
    function_call: Option<FunctionCallPart>,
}

#[derive(Debug, Deserialize)]
struct FunctionCallPart {
    name: String,
    #[serde(default)]
    args: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<i32>,
    candidates_token_count: Option<i32>,
    total_token_count: Option<i32>,
}

impl From<UsageMetadata> for Usage {
    fn from(usage: UsageMetadata) -> Self {
        Usage::new(
            usage.prompt_token_count,
            usage.candidates_token_count,
            usage.total_token_count,
        )
    }
}

impl GeminiProvider {
    pub fn new(config: GeminiProviderConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            bail!("Gemini API key is required");
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(600))
            .build()?;

        Ok(Self { client, config })
    }

    fn system_instruction(&self, messages: &[ProviderMessage]) -> Option<Value> {
        let texts: Vec<&str> = self
            .config
            .system_instruction
            .as_deref()
            .into_iter()
            .chain(
                messages
                    .iter()
                    .filter(|message| message.role == Role::System)
                    .map(|message| message.text()),
            )
            .filter(|text| !text.trim().is_empty())
            .collect();

        if texts.is_empty() {
            None
        } else {
            Some(json!({"parts": [{"text": texts.join("\n\n")}]}))
        }
    }

    fn payload(&self, messages: &[ProviderMessage], tools: &[Tool]) -> Value {
        let mut payload = Map::new();
        payload.insert("contents".to_string(), Value::Array(messages_to_contents(messages)));

        if let Some(instruction) = self.system_instruction(messages) {
            payload.insert("systemInstruction".to_string(), instruction);
        }
        if !tools.is_empty() {
            payload.insert("tools".to_string(), tools_to_gemini_spec(tools));
        }

        let mut generation_config = Map::new();
        if let Some(temperature) = self.config.temperature {
            generation_config.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(top_p) = self.config.top_p {
            generation_config.insert("topP".to_string(), json!(top_p));
        }
        if let Some(top_k) = self.config.top_k {
            generation_config.insert("topK".to_string(), json!(top_k));
        }
        if let Some(max_output_tokens) = self.config.max_output_tokens {
            generation_config.insert("maxOutputTokens".to_string(), json!(max_output_tokens));
        }
        if !generation_config.is_empty() {
            payload.insert("generationConfig".to_string(), Value::Object(generation_config));
        }

        Value::Object(payload)
    }

    async fn post(&self, payload: Value) -> Result<reqwest::Response> {
        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.config.host.trim_end_matches('/'),
            self.config.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 {
            Err(anyhow!("Server error: {}", status))
        } else {
            Err(anyhow!("Request failed: {}\nResponse: {}", status, body))
        }
    }
}

/// Convert provider messages to Gemini `contents`. System text travels in
/// `systemInstruction` instead; consecutive tool results are merged into one
/// user turn of `functionResponse` parts, which is how Gemini expects a batch
/// of parallel calls to be answered.
pub fn messages_to_contents(messages: &[ProviderMessage]) -> Vec<Value> {
    let mut contents: Vec<Value> = Vec::new();
    let mut call_names: HashMap<&str, &str> = HashMap::new();
    let mut previous_was_tool = false;

    for message in messages {
        match message.role {
            Role::System => {}
            Role::User => {
                if !message.text().is_empty() {
                    contents.push(json!({"role": "user", "parts": [{"text": message.text()}]}));
                }
            }
            Role::Assistant => {
                let mut parts = Vec::new();
                if !message.text().is_empty() {
                    parts.push(json!({"text": message.text()}));
                }
                for call in &message.tool_calls {
                    call_names.insert(&call.id, &call.function.name);
                    let args = if call.function.arguments.trim().is_empty() {
                        json!({})
                    } else {
                        serde_json::from_str(&call.function.arguments).unwrap_or_else(|_| json!({}))
                    };
                    parts.push(json!({
                        "functionCall": {"name": call.function.name, "args": args}
                    }));
                }
                if !parts.is_empty() {
                    contents.push(json!({"role": "model", "parts": parts}));
                }
            }
            Role::Tool => {
                let id = message.tool_call_id.as_deref().unwrap_or_default();
                let name = call_names.get(id).copied().unwrap_or(id);
                let response = match serde_json::from_str::<Value>(message.text()) {
                    Ok(Value::Object(object)) => Value::Object(object),
                    Ok(other) => json!({"content": other}),
                    Err(_) => json!({"content": message.text()}),
                };
                let part = json!({"functionResponse": {"name": name, "response": response}});

                let merged = previous_was_tool
                    && contents
                        .last_mut()
                        .and_then(|content| content.get_mut("parts"))
                        .and_then(Value::as_array_mut)
                        .map(|parts| parts.push(part.clone()))
                        .is_some();
                if !merged {
                    contents.push(json!({"role": "user", "parts": [part]}));
                }
            }
        }
        previous_was_tool = message.role == Role::Tool;
    }

    contents
}

pub fn tools_to_gemini_spec(tools: &[Tool]) -> Value {
    let declarations: Vec<Value> = tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.input_schema,
            })
        })
        .collect();

    json!([{"functionDeclarations": declarations}])
}

fn parse_chunk(data: &str, next_call_index: &mut u32) -> Result<ProviderChunk> {
    let value: Value = serde_json::from_str(data)
        .map_err(|e| anyhow!("Malformed stream chunk ({}): {}", e, data))?;

    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        bail!("Gemini API error: {}", message);
    }

    let chunk: StreamChunk = serde_json::from_value(value)?;
    let mut result = ProviderChunk {
        usage: chunk.usage_metadata.map(Usage::from),
        ..Default::default()
    };

    if let Some(candidate) = chunk.candidates.into_iter().next() {
        result.finish_reason = candidate.finish_reason.as_deref().map(FinishReason::from_gemini);

        let mut text = String::new();
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(delta) = part.text {
                text.push_str(&delta);
            }
            // Gemini sends each call whole, so it becomes a single fragment
            if let Some(call) = part.function_call {
                let arguments = call.args.unwrap_or_else(|| json!({}));
                result.tool_calls.push(ToolCallDelta {
                    index: *next_call_index,
                    id: Some(generate_tool_call_id()),
                    name: Some(call.name),
                    arguments: Some(arguments.to_string()),
                });
                *next_call_index += 1;
            }
        }
        if !text.is_empty() {
            result.text = Some(text);
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
        let mut next_call_index = 0;
        while let Some(event) = events.next().await {
            let event = event?;
            let chunk = parse_chunk(&event.data, &mut next_call_index)?;
            yield chunk;
        }
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    async fn stream(&self, messages: &[ProviderMessage], tools: &[Tool]) -> Result<ChunkStream> {
        let payload = self.payload(messages, tools);
        let response = self.post(payload).await?;

        tracing::debug!(model = %self.config.model, "opened gemini stream");
        Ok(Box::pin(provider_chunks(response.bytes_stream().eventsource())))
    }
}
