use super::{
    base::Provider, configs::ProviderConfig, gemini::GeminiProvider, openai::OpenAiProvider,
};
use anyhow::Result;
use std::sync::Arc;
use strum_macros::{Display, EnumIter};

#[derive(EnumIter, Display, Debug, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
pub enum ProviderType {
    OpenAi,
    Gemini,
}

impl From<&ProviderConfig> for ProviderType {
    fn from(config: &ProviderConfig) -> Self {
        match config {
            ProviderConfig::OpenAi(_) => ProviderType::OpenAi,
            ProviderConfig::Gemini(_) => ProviderType::Gemini,
        }
    }
}

pub fn get_provider(config: ProviderConfig) -> Result<Arc<dyn Provider>> {
    match config {
        ProviderConfig::OpenAi(openai_config) => Ok(Arc::new(OpenAiProvider::new(openai_config)?)),
        ProviderConfig::Gemini(gemini_config) => Ok(Arc::new(GeminiProvider::new(gemini_config)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::configs::{GeminiProviderConfig, OpenAiProviderConfig};
    use strum::IntoEnumIterator;

    fn openai_config(api_key: &str) -> ProviderConfig {
        ProviderConfig::OpenAi(OpenAiProviderConfig {
            host: "http://localhost".to_string(),
            api_key: api_key.to_string(),
            model: "openai/gpt-4o".to_string(),
            temperature: None,
            max_tokens: None,
        })
    }

    fn gemini_config(api_key: &str) -> ProviderConfig {
        ProviderConfig::Gemini(GeminiProviderConfig {
            host: "http://localhost".to_string(),
            api_key: api_key.to_string(),
            model: "gemini-2.0-flash-exp".to_string(),
            temperature: None,
            top_p: None,
            top_k: None,
            max_output_tokens: None,
            system_instruction: None,
        })
    }

    #[test]
    fn test_provider_type_names() {
        let names: Vec<String> = ProviderType::iter().map(|t| t.to_string()).collect();
        assert_eq!(names, vec!["openai", "gemini"]);
        assert_eq!(ProviderType::from(&gemini_config("k")), ProviderType::Gemini);
    }

    #[test]
    fn test_get_provider() {
        assert!(get_provider(openai_config("key")).is_ok());
        assert!(get_provider(gemini_config("key")).is_ok());
    }

    #[test]
    fn test_missing_credentials_fail_at_construction() {
        let err = get_provider(openai_config("")).err().unwrap();
        assert!(err.to_string().contains("API key"));

        let err = get_provider(gemini_config("  ")).err().unwrap();
        assert!(err.to_string().contains("API key"));
    }
}
