use anyhow::Result;
use futures::StreamExt;
use relay::{
    models::message::{ClientMessage, ClientMessagePart},
    normalize::normalize,
    providers::{
        configs::{OpenAiProviderConfig, ProviderConfig},
        factory::get_provider,
    },
    stream::{Frame, Protocol, Translator},
    tools::ToolRegistry,
};
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sse(events: &[Value]) -> ResponseTemplate {
    let mut body: String = events
        .iter()
        .map(|event| format!("data: {}\n\n", event))
        .collect();
    body.push_str("data: [DONE]\n\n");
    ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
}

fn tool_call_step(latitude: f64) -> ResponseTemplate {
    sse(&[
        json!({"choices": [{"index": 0, "delta": {"role": "assistant", "tool_calls": [{
            "index": 0, "id": "call_weather", "type": "function",
            "function": {"name": "get_current_weather", "arguments": ""}
        }]}}]}),
        json!({"choices": [{"index": 0, "delta": {"tool_calls": [{
            "index": 0,
            "function": {"arguments": format!("{{\"latitude\":{},\"longitude\":2.35}}", latitude)}
        }]}}]}),
        json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "tool_calls"}]}),
    ])
}

/// Wire an OpenAI-compatible gateway mock and a weather mock into a translator
async fn setup(first_step: ResponseTemplate) -> Result<(MockServer, Translator)> {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(first_step)
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("\"tool_call_id\":\"call_weather\""))
        .respond_with(sse(&[
            json!({"choices": [{"index": 0, "delta": {"content": "It is 21.5°C in Paris."}}]}),
            json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}],
                   "usage": {"prompt_tokens": 40, "completion_tokens": 9, "total_tokens": 49}}),
        ]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .and(query_param("latitude", "48.85"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "current": {"time": "2024-10-01T12:00", "temperature_2m": 21.5}
        })))
        .mount(&server)
        .await;

    let provider = get_provider(ProviderConfig::OpenAi(OpenAiProviderConfig {
        host: server.uri(),
        api_key: "test-key".to_string(),
        model: "openai/gpt-4o".to_string(),
        temperature: None,
        max_tokens: None,
    }))?;
    let registry = Arc::new(ToolRegistry::with_default_tools(&server.uri())?);

    Ok((server, Translator::new(provider, registry)))
}

fn history() -> Vec<ClientMessage> {
    vec![ClientMessage::user()
        .with_content("")
        .with_part(ClientMessagePart::text("Weather"))
        .with_part(ClientMessagePart::text("in Paris?"))]
}

#[tokio::test]
async fn test_weather_turn_end_to_end() -> Result<()> {
    let (_server, translator) = setup(tool_call_step(48.85)).await?;

    let frames: Vec<Frame> = translator.frames(normalize(&history())).collect().await;

    let types: Vec<String> = frames
        .iter()
        .map(|frame| serde_json::to_value(frame).unwrap()["type"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        types,
        vec![
            "start",
            "tool-call-start",
            "tool-call-delta",
            "tool-call-result",
            "text-delta",
            "finish"
        ]
    );

    match &frames[3] {
        Frame::ToolCallResult {
            tool_call_id,
            args,
            result,
            is_error,
            ..
        } => {
            assert_eq!(tool_call_id, "call_weather");
            assert_eq!(args, &json!({"latitude": 48.85, "longitude": 2.35}));
            assert_eq!(result["current"]["temperature_2m"], 21.5);
            assert!(!is_error);
        }
        other => panic!("Expected tool-call-result, got {:?}", other),
    }

    match &frames[5] {
        Frame::Finish { usage, .. } => {
            assert_eq!(usage.as_ref().and_then(|u| u.total_tokens), Some(49))
        }
        other => panic!("Expected finish, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_out_of_range_coordinates_fail_the_tool_not_the_turn() -> Result<()> {
    let (server, translator) = setup(tool_call_step(999.0)).await?;

    let frames: Vec<Frame> = translator.frames(normalize(&history())).collect().await;

    let failure = frames
        .iter()
        .find_map(|frame| match frame {
            Frame::ToolCallResult {
                result, is_error, ..
            } => Some((result.clone(), *is_error)),
            _ => None,
        })
        .unwrap();
    assert!(failure.1);
    assert!(failure.0["error"]
        .as_str()
        .unwrap()
        .contains("latitude must be in range"));
    assert!(matches!(frames.last(), Some(Frame::Finish { .. })));

    // Rejected locally, the weather service never saw the request
    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.url.path() != "/v1/forecast"));
    Ok(())
}

#[tokio::test]
async fn test_text_protocol_end_to_end() -> Result<()> {
    let (_server, translator) = setup(tool_call_step(48.85)).await?;

    let chunks: Vec<bytes::Bytes> = translator
        .translate(normalize(&history()), Protocol::Text)
        .collect()
        .await;

    let text: Vec<u8> = chunks.concat();
    assert_eq!(String::from_utf8(text)?, "It is 21.5°C in Paris.");
    Ok(())
}
