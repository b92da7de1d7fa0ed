use crate::sse::SseResponse;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use relay::{
    models::message::ClientMessage,
    normalize::normalize,
    providers::factory::ProviderType,
    stream::Protocol,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Deserialize)]
struct ChatRequest {
    messages: Vec<ClientMessage>,
}

#[derive(Debug, Deserialize)]
struct ProtocolQuery {
    #[serde(default)]
    protocol: Protocol,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn stream_chat(
    state: &AppState,
    provider_type: ProviderType,
    protocol: Protocol,
    request: ChatRequest,
) -> Response {
    let Some(translator) = state.translator(provider_type) else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: format!("The {} provider is not configured", provider_type),
            }),
        )
            .into_response();
    };

    let messages = normalize(&request.messages);
    info!(
        provider = %provider_type,
        %protocol,
        messages = messages.len(),
        "starting chat turn"
    );

    SseResponse::new(translator.translate(messages, protocol)).into_response()
}

async fn handler(
    State(state): State<AppState>,
    Query(query): Query<ProtocolQuery>,
    Json(request): Json<ChatRequest>,
) -> Response {
    stream_chat(&state, ProviderType::OpenAi, query.protocol, request)
}

async fn gemini_handler(
    State(state): State<AppState>,
    Query(query): Query<ProtocolQuery>,
    Json(request): Json<ChatRequest>,
) -> Response {
    stream_chat(&state, ProviderType::Gemini, query.protocol, request)
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(handler))
        .route("/api/chat/gemini", post(gemini_handler))
        .with_state(state)
}
