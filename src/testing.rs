use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;

use crate::ai::client::{GeminiClient, GeminiConfig, ModelClient, ModelRequest, RetryPolicy};
use crate::error::ModelError;

/// Gemini client pointed at a mock server, with retries disabled.
pub fn test_gemini_client(base_url: &str) -> GeminiClient {
    GeminiClient::new(GeminiConfig {
        base_url: base_url.to_string(),
        model: "gemini-test".to_string(),
        retry: RetryPolicy::disabled(),
        ..GeminiConfig::new("test-key")
    })
}

#[derive(Default)]
struct StubState {
    responses: VecDeque<Result<Value, ModelError>>,
    requests: Vec<ModelRequest>,
}

/// Scripted model client. Replies are consumed in order; every request is
/// recorded. Clones share the same script and log.
#[derive(Clone, Default)]
pub struct StubModelClient {
    state: Arc<Mutex<StubState>>,
    delay: Option<Duration>,
}

impl StubModelClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond_with(self, output: Value) -> Self {
        self.lock().responses.push_back(Ok(output));
        self
    }

    pub fn fail_with(self, error: ModelError) -> Self {
        self.lock().responses.push_back(Err(error));
        self
    }

    /// Delays every reply, for exercising timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.lock().requests.len()
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.lock().requests.clone()
    }

    fn lock(&self) -> MutexGuard<'_, StubState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ModelClient for StubModelClient {
    fn generate(
        &self,
        request: ModelRequest,
    ) -> impl Future<Output = Result<Value, ModelError>> + Send {
        async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let mut state = self.lock();
            state.requests.push(request);
            state
                .responses
                .pop_front()
                .unwrap_or_else(|| Err(ModelError::Malformed("no stub response configured".into())))
        }
    }
}
