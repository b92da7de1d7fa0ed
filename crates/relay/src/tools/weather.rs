use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::ToolHandler;
use crate::errors::{ToolError, ToolResult};
use crate::models::tool::Tool;

pub const OPEN_METEO_HOST: &str = "https://api.open-meteo.com";

/// Current conditions lookup backed by the Open-Meteo forecast API
pub struct WeatherTool {
    client: Client,
    host: String,
    tool: Tool,
}

impl WeatherTool {
    pub fn new<S: Into<String>>(host: S) -> Result<Self> {
        let tool = Tool::new(
            "get_current_weather",
            "Get the current weather at a location",
            json!({
                "type": "object",
                "properties": {
                    "latitude": {
                        "type": "number",
                        "description": "The latitude of the location"
                    },
                    "longitude": {
                        "type": "number",
                        "description": "The longitude of the location"
                    }
                },
                "required": ["latitude", "longitude"]
            }),
        );

        Ok(Self {
            client: Client::builder().build()?,
            host: host.into(),
            tool,
        })
    }

    fn coordinate(arguments: &Value, name: &str, limit: f64) -> ToolResult<f64> {
        let value = arguments
            .get(name)
            .and_then(Value::as_f64)
            .ok_or_else(|| ToolError::InvalidParameters(format!("{} must be a number", name)))?;

        if !value.is_finite() || value.abs() > limit {
            return Err(ToolError::InvalidParameters(format!(
                "{} must be in range of -{} to {}. Given: {}",
                name, limit, limit, value
            )));
        }
        Ok(value)
    }

    async fn get_current_weather(&self, latitude: f64, longitude: f64) -> ToolResult<Value> {
        let url = format!("{}/v1/forecast", self.host.trim_end_matches('/'));

        let response = self
            .client
            .get(&url)
            .query(&[
                ("latitude", latitude.to_string()),
                ("longitude", longitude.to_string()),
                ("current", "temperature_2m".to_string()),
                ("hourly", "temperature_2m".to_string()),
                ("daily", "sunrise,sunset".to_string()),
                ("timezone", "auto".to_string()),
            ])
            .send()
            .await
            .map_err(|e| ToolError::ExecutionError(format!("Weather request failed: {}", e)))?;

        let status = response.status();
        let body: Value = response.json().await.map_err(|e| {
            ToolError::ExecutionError(format!("Weather service returned invalid JSON: {}", e))
        })?;

        // The forecast API reports rejected input as {"error": true, "reason": "..."}
        if !status.is_success() || body.get("error").and_then(Value::as_bool) == Some(true) {
            let reason = body
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or("unknown reason");
            return Err(ToolError::ExecutionError(format!(
                "Weather service rejected the request ({}): {}",
                status, reason
            )));
        }

        Ok(body)
    }
}

#[async_trait]
impl ToolHandler for WeatherTool {
    fn tool(&self) -> &Tool {
        &self.tool
    }

    async fn call(&self, arguments: Value) -> ToolResult<Value> {
        let latitude = Self::coordinate(&arguments, "latitude", 90.0)?;
        let longitude = Self::coordinate(&arguments, "longitude", 180.0)?;
        self.get_current_weather(latitude, longitude).await
    }
}
