use crate::state::AppState;
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use relay::models::message::ProviderMessage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
struct AskRequest {
    prompt: String,
}

#[derive(Debug, Serialize)]
struct AskResponse {
    response: String,
}

// simple ask an AI for a response, non streaming
async fn ask_handler(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, StatusCode> {
    let provider = state
        .openai
        .or(state.gemini)
        .ok_or(StatusCode::SERVICE_UNAVAILABLE)?;

    let messages = vec![ProviderMessage::user(request.prompt)];
    let completion = provider.complete(&messages, &[]).await.map_err(|e| {
        tracing::error!("Failed to complete prompt: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(AskResponse {
        response: completion.message.text().trim().to_string(),
    }))
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/ask", post(ask_handler))
        .with_state(state)
}
