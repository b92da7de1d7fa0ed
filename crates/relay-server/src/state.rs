use anyhow::Result;
use relay::providers::{
    base::Provider,
    configs::ProviderConfig,
    factory::{self, ProviderType},
};
use relay::stream::Translator;
use relay::tools::ToolRegistry;
use std::sync::Arc;
use tracing::info;

use crate::configuration::Settings;

/// Shared application state. Providers are built once at startup and shared
/// by every request; the tool registry is read-only.
#[derive(Clone)]
pub struct AppState {
    pub openai: Option<Arc<dyn Provider>>,
    pub gemini: Option<Arc<dyn Provider>>,
    pub tools: Arc<ToolRegistry>,
    pub max_steps: usize,
}

impl AppState {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let tools = Arc::new(ToolRegistry::with_default_tools(&settings.weather.host)?);

        Ok(Self {
            openai: build_provider(settings.openai_config().map(ProviderConfig::OpenAi))?,
            gemini: build_provider(settings.gemini_config().map(ProviderConfig::Gemini))?,
            tools,
            max_steps: settings.chat.max_steps,
        })
    }

    pub fn provider(&self, provider_type: ProviderType) -> Option<Arc<dyn Provider>> {
        match provider_type {
            ProviderType::OpenAi => self.openai.clone(),
            ProviderType::Gemini => self.gemini.clone(),
        }
    }

    /// A translator for one turn against the given provider
    pub fn translator(&self, provider_type: ProviderType) -> Option<Translator> {
        self.provider(provider_type).map(|provider| {
            Translator::new(provider, Arc::clone(&self.tools)).with_max_steps(self.max_steps)
        })
    }
}

fn build_provider(config: Option<ProviderConfig>) -> Result<Option<Arc<dyn Provider>>> {
    let Some(config) = config else {
        return Ok(None);
    };

    let provider_type = ProviderType::from(&config);
    let provider = factory::get_provider(config)?;
    info!(provider = %provider_type, "provider configured");
    Ok(Some(provider))
}
