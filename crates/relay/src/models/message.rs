use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::role::Role;
use super::tool::ToolCall;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolInvocationState {
    PartialCall,
    Call,
    Result,
}

/// A tool call made in an earlier assistant turn, as the interface tracks it.
/// Once the tool has run the interface attaches the output in `result`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    pub state: ToolInvocationState,
    pub tool_call_id: String,
    pub tool_name: String,
    #[serde(default = "empty_args")]
    pub args: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

fn empty_args() -> Value {
    Value::Object(Default::default())
}

impl ToolInvocation {
    pub fn call<I: Into<String>, N: Into<String>>(tool_call_id: I, tool_name: N, args: Value) -> Self {
        Self {
            state: ToolInvocationState::Call,
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            args,
            result: None,
        }
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.state = ToolInvocationState::Result;
        self.result = Some(result);
        self
    }
}

/// One part of a multi-part client message. Only text parts carry content the
/// provider sees; the remaining kinds are accepted and dropped.
///
/// Decoding never fails: a part without a `type` counts as text when it has a
/// string `text` field, and anything else unreadable becomes `Unknown`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessagePart {
    Text {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    Reasoning,
    File,
    SourceUrl,
    StepStart,
    ToolInvocation,
    #[serde(other)]
    Unknown,
}

impl ClientMessagePart {
    pub fn text<S: Into<String>>(text: S) -> Self {
        ClientMessagePart::Text {
            text: Some(text.into()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ClientMessagePart::Text { text } => text.as_deref(),
            _ => None,
        }
    }

    fn from_value(value: &Value) -> Self {
        let text = value.get("text").and_then(Value::as_str).map(str::to_string);
        match value.get("type").and_then(Value::as_str) {
            Some("text") => ClientMessagePart::Text { text },
            Some("reasoning") => ClientMessagePart::Reasoning,
            Some("file") => ClientMessagePart::File,
            Some("source-url") => ClientMessagePart::SourceUrl,
            Some("step-start") => ClientMessagePart::StepStart,
            Some("tool-invocation") => ClientMessagePart::ToolInvocation,
            Some(_) => ClientMessagePart::Unknown,
            None if text.is_some() => ClientMessagePart::Text { text },
            None => ClientMessagePart::Unknown,
        }
    }
}

impl<'de> Deserialize<'de> for ClientMessagePart {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(ClientMessagePart::from_value(&value))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// A single conversation turn as sent by the useChat interface
pub struct ClientMessage {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parts: Option<Vec<ClientMessagePart>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_invocations: Option<Vec<ToolInvocation>>,
}

impl ClientMessage {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            content: None,
            parts: None,
            tool_invocations: None,
        }
    }

    pub fn user() -> Self {
        Self::new(Role::User)
    }

    pub fn assistant() -> Self {
        Self::new(Role::Assistant)
    }

    pub fn with_content<S: Into<String>>(mut self, content: S) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_part(mut self, part: ClientMessagePart) -> Self {
        self.parts.get_or_insert_with(Vec::new).push(part);
        self
    }

    pub fn with_tool_invocation(mut self, invocation: ToolInvocation) -> Self {
        self.tool_invocations
            .get_or_insert_with(Vec::new)
            .push(invocation);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// A tool call in the openai chat completion shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionCall,
}

impl From<ToolCall> for ProviderToolCall {
    fn from(call: ToolCall) -> Self {
        Self {
            id: call.id,
            kind: "function".to_string(),
            function: FunctionCall {
                name: call.name,
                arguments: call.arguments,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A message in the flat role/content shape sent to a completion provider
pub struct ProviderMessage {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ProviderToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ProviderMessage {
    pub fn new<S: Into<String>>(role: Role, content: S) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user<S: Into<String>>(content: S) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// An assistant turn that requested tools. Any text streamed alongside the
    /// calls is kept so the provider sees its own preamble on the next step.
    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ProviderToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.filter(|text| !text.is_empty()),
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool_result<I: Into<String>, S: Into<String>>(tool_call_id: I, content: S) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_message_deserializes_use_chat_payload() {
        let message: ClientMessage = serde_json::from_value(json!({
            "id": "msg-1",
            "role": "assistant",
            "content": "",
            "parts": [
                {"type": "step-start"},
                {"type": "text", "text": "Checking"},
                {"type": "tool-invocation", "toolInvocation": {"state": "result"}},
                {"type": "file", "mimeType": "image/png", "data": "AAAA"},
                {"type": "some-future-part", "payload": 1}
            ],
            "toolInvocations": [{
                "state": "result",
                "toolCallId": "call_1",
                "toolName": "get_current_weather",
                "args": {"latitude": 1.0, "longitude": 2.0},
                "result": {"current": {"temperature_2m": 20.1}}
            }]
        }))
        .unwrap();

        let parts = message.parts.as_ref().unwrap();
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[0], ClientMessagePart::StepStart);
        assert_eq!(parts[1].as_text(), Some("Checking"));
        assert_eq!(parts[2], ClientMessagePart::ToolInvocation);
        assert_eq!(parts[3], ClientMessagePart::File);
        assert_eq!(parts[4], ClientMessagePart::Unknown);

        let invocation = &message.tool_invocations.as_ref().unwrap()[0];
        assert_eq!(invocation.state, ToolInvocationState::Result);
        assert_eq!(invocation.tool_call_id, "call_1");
        assert!(invocation.result.is_some());
    }

    #[test]
    fn test_text_part_without_text_is_accepted() {
        let part: ClientMessagePart = serde_json::from_value(json!({"type": "text"})).unwrap();
        assert_eq!(part.as_text(), None);
    }

    #[test]
    fn test_untyped_parts_never_fail() {
        let message: ClientMessage = serde_json::from_value(json!({
            "role": "user",
            "parts": [{"text": "hi"}, {"url": "https://example.com/img.png"}, null]
        }))
        .unwrap();

        let parts = message.parts.unwrap();
        assert_eq!(parts[0], ClientMessagePart::text("hi"));
        assert_eq!(parts[1], ClientMessagePart::Unknown);
        assert_eq!(parts[2], ClientMessagePart::Unknown);
    }

    #[test]
    fn test_null_result_reads_as_pending() {
        let invocation: ToolInvocation = serde_json::from_value(json!({
            "state": "call",
            "toolCallId": "call_1",
            "toolName": "get_current_weather",
            "result": null
        }))
        .unwrap();
        assert_eq!(invocation.result, None);
        assert_eq!(invocation.args, json!({}));
    }

    #[test]
    fn test_provider_message_serialization() {
        let plain = serde_json::to_value(ProviderMessage::user("Hello")).unwrap();
        assert_eq!(plain, json!({"role": "user", "content": "Hello"}));

        let call = ProviderToolCall::from(ToolCall::new("call_1", "echo", "{}"));
        let assistant =
            serde_json::to_value(ProviderMessage::assistant_tool_calls(Some(String::new()), vec![call]))
                .unwrap();
        assert_eq!(
            assistant,
            json!({
                "role": "assistant",
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "echo", "arguments": "{}"}
                }]
            })
        );

        let result = serde_json::to_value(ProviderMessage::tool_result("call_1", "42")).unwrap();
        assert_eq!(
            result,
            json!({"role": "tool", "content": "42", "tool_call_id": "call_1"})
        );
    }
}
