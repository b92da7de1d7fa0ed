use relay::providers::base::Provider;
use relay::providers::mock::MockProvider;
use relay::tools::ToolRegistry;
use std::sync::Arc;

use crate::state::AppState;

pub fn state_with(openai: Option<Arc<MockProvider>>, gemini: Option<Arc<MockProvider>>) -> AppState {
    AppState {
        openai: openai.map(|provider| provider as Arc<dyn Provider>),
        gemini: gemini.map(|provider| provider as Arc<dyn Provider>),
        tools: Arc::new(ToolRegistry::new()),
        max_steps: 5,
    }
}
