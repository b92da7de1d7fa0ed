use crate::error::{to_env_var, ConfigError};
use config::{Config, Environment, File};
use relay::providers::{
    configs::{GeminiProviderConfig, OpenAiProviderConfig},
    gemini, openai,
};
use relay::stream::translator::DEFAULT_MAX_STEPS;
use relay::tools::weather::OPEN_METEO_HOST;
use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};

/// Read when `RELAY_OPENAI__API_KEY` is unset; the token Vercel issues to
/// deployments, accepted by its AI gateway.
const OPENAI_KEY_FALLBACK: &str = "VERCEL_OIDC_TOKEN";
const GEMINI_KEY_FALLBACK: &str = "GEMINI_API_KEY";

#[derive(Debug, Default, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

#[derive(Debug, Deserialize)]
pub struct OpenAiSettings {
    #[serde(default = "default_openai_host")]
    pub host: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_openai_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct GeminiSettings {
    #[serde(default = "default_gemini_host")]
    pub host: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_gemini_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub top_k: Option<i32>,
    #[serde(default)]
    pub max_output_tokens: Option<i32>,
    #[serde(default)]
    pub system_instruction: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WeatherSettings {
    #[serde(default = "default_weather_host")]
    pub host: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatSettings {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub openai: OpenAiSettings,
    pub gemini: GeminiSettings,
    pub weather: WeatherSettings,
    pub chat: ChatSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        // Start with default configuration
        let config = Config::builder()
            // Server defaults
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            // Provider defaults
            .set_default("openai.host", default_openai_host())?
            .set_default("openai.model", default_openai_model())?
            .set_default("gemini.host", default_gemini_host())?
            .set_default("gemini.model", default_gemini_model())?
            .set_default("gemini.temperature", 0.7)?
            .set_default("gemini.top_p", 0.95)?
            .set_default("gemini.top_k", 40)?
            .set_default("gemini.max_output_tokens", 8192)?
            .set_default("weather.host", default_weather_host())?
            .set_default("chat.max_steps", default_max_steps() as i64)?
            // An optional relay.toml next to the binary
            .add_source(File::with_name("relay").required(false))
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix("RELAY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut settings: Self = match config.try_deserialize() {
            Ok(settings) => settings,
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);
                return Err(match &err {
                    config::ConfigError::NotFound(field) => ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    },
                    _ => ConfigError::Other(err),
                });
            }
        };

        settings.openai.api_key = present(settings.openai.api_key.take())
            .or_else(|| present(std::env::var(OPENAI_KEY_FALLBACK).ok()));
        settings.gemini.api_key = present(settings.gemini.api_key.take())
            .or_else(|| present(std::env::var(GEMINI_KEY_FALLBACK).ok()));

        if settings.openai.api_key.is_none() && settings.gemini.api_key.is_none() {
            return Err(ConfigError::MissingEnvVar {
                env_var: to_env_var("openai.api_key"),
            });
        }

        Ok(settings)
    }

    /// The OpenAI-compatible provider, when a key for it is configured
    pub fn openai_config(&self) -> Option<OpenAiProviderConfig> {
        let openai = &self.openai;
        openai.api_key.as_ref().map(|api_key| OpenAiProviderConfig {
            host: openai.host.clone(),
            api_key: api_key.clone(),
            model: openai.model.clone(),
            temperature: openai.temperature,
            max_tokens: openai.max_tokens,
        })
    }

    pub fn gemini_config(&self) -> Option<GeminiProviderConfig> {
        let gemini = &self.gemini;
        gemini.api_key.as_ref().map(|api_key| GeminiProviderConfig {
            host: gemini.host.clone(),
            api_key: api_key.clone(),
            model: gemini.model.clone(),
            temperature: gemini.temperature,
            top_p: gemini.top_p,
            top_k: gemini.top_k,
            max_output_tokens: gemini.max_output_tokens,
            system_instruction: gemini.system_instruction.clone(),
        })
    }
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_openai_host() -> String {
    openai::OPENAI_HOST.to_string()
}

fn default_openai_model() -> String {
    openai::OPENAI_MODEL.to_string()
}

fn default_gemini_host() -> String {
    gemini::GEMINI_HOST.to_string()
}

fn default_gemini_model() -> String {
    gemini::GEMINI_MODEL.to_string()
}

fn default_weather_host() -> String {
    OPEN_METEO_HOST.to_string()
}

fn default_max_steps() -> usize {
    DEFAULT_MAX_STEPS
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clean_env() {
        for (key, _) in env::vars() {
            if key.starts_with("RELAY_") {
                env::remove_var(&key);
            }
        }
        env::remove_var(OPENAI_KEY_FALLBACK);
        env::remove_var(GEMINI_KEY_FALLBACK);
    }

    #[test]
    #[serial]
    fn test_default_settings() {
        clean_env();
        env::set_var("RELAY_OPENAI__API_KEY", "test-key");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.chat.max_steps, 5);
        assert_eq!(settings.weather.host, "https://api.open-meteo.com");

        let openai = settings.openai_config().unwrap();
        assert_eq!(openai.host, "https://ai-gateway.vercel.sh");
        assert_eq!(openai.api_key, "test-key");
        assert_eq!(openai.model, "openai/gpt-4o");
        assert_eq!(openai.temperature, None);
        assert_eq!(openai.max_tokens, None);

        // No Gemini key, so that route stays unavailable
        assert!(settings.gemini_config().is_none());
        assert_eq!(settings.gemini.temperature, Some(0.7));
        assert_eq!(settings.gemini.top_p, Some(0.95));
        assert_eq!(settings.gemini.top_k, Some(40));
        assert_eq!(settings.gemini.max_output_tokens, Some(8192));

        clean_env();
    }

    #[test]
    #[serial]
    fn test_environment_override() {
        clean_env();
        env::set_var("RELAY_SERVER__PORT", "8080");
        env::set_var("RELAY_GEMINI__API_KEY", "gemini-key");
        env::set_var("RELAY_GEMINI__MODEL", "gemini-1.5-pro");
        env::set_var("RELAY_GEMINI__TEMPERATURE", "0.2");
        env::set_var("RELAY_CHAT__MAX_STEPS", "2");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.chat.max_steps, 2);
        assert!(settings.openai_config().is_none());

        let gemini = settings.gemini_config().unwrap();
        assert_eq!(gemini.api_key, "gemini-key");
        assert_eq!(gemini.model, "gemini-1.5-pro");
        assert_eq!(gemini.temperature, Some(0.2));
        assert_eq!(gemini.top_k, Some(40));

        clean_env();
    }

    #[test]
    #[serial]
    fn test_credential_fallbacks() {
        clean_env();
        env::set_var(OPENAI_KEY_FALLBACK, "oidc-token");
        env::set_var(GEMINI_KEY_FALLBACK, "gemini-key");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.openai_config().unwrap().api_key, "oidc-token");
        assert_eq!(settings.gemini_config().unwrap().api_key, "gemini-key");

        // The relay's own variable wins over the fallback
        env::set_var("RELAY_OPENAI__API_KEY", "explicit");
        let settings = Settings::new().unwrap();
        assert_eq!(settings.openai_config().unwrap().api_key, "explicit");

        clean_env();
    }

    #[test]
    #[serial]
    fn test_missing_credentials() {
        clean_env();
        env::set_var("RELAY_OPENAI__API_KEY", "  ");

        match Settings::new() {
            Err(ConfigError::MissingEnvVar { env_var }) => {
                assert_eq!(env_var, "RELAY_OPENAI__API_KEY")
            }
            other => panic!("Expected MissingEnvVar, got {:?}", other),
        }

        clean_env();
    }

    #[test]
    fn test_socket_addr_conversion() {
        let server_settings = ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 3000,
        };
        let addr = server_settings.socket_addr().unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:3000");

        let server_settings = ServerSettings {
            host: "not a host".to_string(),
            port: 3000,
        };
        assert!(server_settings.socket_addr().is_err());
    }
}
