use crate::models::message::{
    ClientMessage, FunctionCall, ProviderMessage, ProviderToolCall, ToolInvocation,
};

/// Convert the useChat message history into the flat message list a
/// completion provider consumes.
///
/// Each client message is read in priority order: a non-empty `content`
/// wins, then the text of its `parts`, then its `toolInvocations`. A message
/// carrying none of these still produces a turn with empty content, so the
/// output never loses a position in the conversation.
pub fn normalize(messages: &[ClientMessage]) -> Vec<ProviderMessage> {
    let mut normalized = Vec::with_capacity(messages.len());

    for message in messages {
        if let Some(content) = message.content.as_deref().filter(|c| !c.is_empty()) {
            normalized.push(ProviderMessage::new(message.role, content));
        } else if let Some(parts) = &message.parts {
            let text: Vec<&str> = parts.iter().filter_map(|part| part.as_text()).collect();
            normalized.push(ProviderMessage::new(message.role, text.join(" ")));
        } else if let Some(invocations) = &message.tool_invocations {
            normalized.extend(invocation_messages(invocations));
        } else {
            normalized.push(ProviderMessage::new(message.role, ""));
        }
    }

    normalized
}

/// One assistant message carrying every call, followed by a tool message for
/// each invocation that already has a result.
fn invocation_messages(invocations: &[ToolInvocation]) -> Vec<ProviderMessage> {
    let tool_calls = invocations
        .iter()
        .map(|invocation| ProviderToolCall {
            id: invocation.tool_call_id.clone(),
            kind: "function".to_string(),
            function: FunctionCall {
                name: invocation.tool_name.clone(),
                arguments: invocation.args.to_string(),
            },
        })
        .collect();

    let mut output = vec![ProviderMessage::assistant_tool_calls(None, tool_calls)];
    output.extend(invocations.iter().filter_map(|invocation| {
        invocation.result.as_ref().map(|result| {
            ProviderMessage::tool_result(invocation.tool_call_id.clone(), result.to_string())
        })
    }));
    output
}
