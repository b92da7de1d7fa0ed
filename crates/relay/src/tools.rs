use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::errors::{ToolError, ToolResult};
use crate::models::tool::{Tool, ToolCall};
use crate::providers::utils::is_valid_function_name;

pub mod weather;

pub use weather::WeatherTool;

/// A single callable tool: the schema the model sees and the code that runs it
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// The definition exposed to the provider
    fn tool(&self) -> &Tool;

    /// Run the tool. Bad input and upstream failures come back as a
    /// [`ToolError`] so the caller can report them without ending the turn.
    async fn call(&self, arguments: Value) -> ToolResult<Value>;
}

/// The fixed set of tools the relay offers to every provider call.
/// Read-only once built and shared between requests.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    handlers: Vec<Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry served by the relay: just the weather lookup today
    pub fn with_default_tools(weather_host: &str) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(WeatherTool::new(weather_host)?)?;
        Ok(registry)
    }

    pub fn register<H: ToolHandler + 'static>(&mut self, handler: H) -> Result<()> {
        let name = &handler.tool().name;
        if !is_valid_function_name(name) {
            bail!("Tool name '{}' must match [a-zA-Z0-9_-]+", name);
        }
        if self.get(name).is_some() {
            bail!("Duplicate tool name: {}", name);
        }
        self.handlers.push(Arc::new(handler));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn ToolHandler> {
        self.handlers
            .iter()
            .find(|handler| handler.tool().name == name)
            .map(|handler| handler.as_ref())
    }

    /// Definitions in registration order
    pub fn tools(&self) -> Vec<Tool> {
        self.handlers
            .iter()
            .map(|handler| handler.tool().clone())
            .collect()
    }

    /// Resolve and run a call requested by the model
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult<Value> {
        if !is_valid_function_name(&call.name) {
            return Err(ToolError::ToolNotFound(format!(
                "The provided function name '{}' had invalid characters, it must match this regex [a-zA-Z0-9_-]+",
                call.name
            )));
        }

        let handler = self
            .get(&call.name)
            .ok_or_else(|| ToolError::ToolNotFound(call.name.clone()))?;

        let arguments = call.parsed_arguments().map_err(|e| {
            ToolError::InvalidParameters(format!(
                "Could not interpret tool use parameters for id {}: {}",
                call.id, e
            ))
        })?;

        tracing::debug!(tool = %call.name, id = %call.id, "dispatching tool call");
        handler.call(arguments).await
    }
}
