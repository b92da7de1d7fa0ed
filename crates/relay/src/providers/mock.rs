use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::Mutex;

use crate::models::message::ProviderMessage;
use crate::models::tool::Tool;
use crate::providers::base::{ChunkStream, FinishReason, Provider, ProviderChunk};

/// What the mock answers for one call to `stream`
pub enum MockResponse {
    /// The stream opens and yields these items in order
    Chunks(Vec<Result<ProviderChunk>>),
    /// The request itself fails before any chunk
    Fail(String),
}

/// A mock provider that replays pre-configured responses for testing,
/// one per call, and records the messages each call received
pub struct MockProvider {
    responses: Arc<Mutex<Vec<MockResponse>>>,
    requests: Arc<Mutex<Vec<Vec<ProviderMessage>>>>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of responses
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A provider whose single response succeeds with these chunks
    pub fn with_chunks(chunks: Vec<ProviderChunk>) -> Self {
        Self::new(vec![MockResponse::Chunks(
            chunks.into_iter().map(Ok).collect(),
        )])
    }

    /// A provider whose single response streams these text deltas
    pub fn text(parts: &[&str]) -> Self {
        Self::with_chunks(parts.iter().map(|part| ProviderChunk::text(*part)).collect())
    }

    /// The message lists received so far, one entry per call
    pub fn requests(&self) -> Vec<Vec<ProviderMessage>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn stream(&self, messages: &[ProviderMessage], _tools: &[Tool]) -> Result<ChunkStream> {
        self.requests.lock().unwrap().push(messages.to_vec());

        let mut responses = self.responses.lock().unwrap();
        let response = if responses.is_empty() {
            // Finish immediately if no more pre-configured responses
            MockResponse::Chunks(vec![Ok(ProviderChunk::finish(FinishReason::Stop))])
        } else {
            responses.remove(0)
        };

        match response {
            MockResponse::Chunks(chunks) => Ok(Box::pin(futures::stream::iter(chunks))),
            MockResponse::Fail(reason) => Err(anyhow!(reason)),
        }
    }
}
