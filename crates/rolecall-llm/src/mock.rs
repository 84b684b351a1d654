//! Mock oracle for deterministic testing.
//!
//! Returns pre-configured responses without making any HTTP calls.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::provider::*;
use rolecall_core::{Message, Result, RolecallError, ToolCall};

/// A mock oracle that returns queued responses in order.
///
/// # Example
/// ```
/// use rolecall_llm::mock::MockProvider;
/// let provider = MockProvider::new("test")
///     .with_response("{\"Programming Language\": [], \"Experience Level\": [], \"Operating System\": []}");
/// ```
pub struct MockProvider {
    responses: Arc<Mutex<Vec<MockResponse>>>,
    /// Track all requests received (for assertions in tests).
    pub requests: Arc<Mutex<Vec<LlmRequest>>>,
    name: String,
}

/// A pre-configured response from the mock provider.
#[derive(Clone, Default)]
pub struct MockResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub stop_reason: Option<StopReason>,
    /// If set, the provider returns this error instead.
    pub error: Option<MockError>,
}

/// Errors the mock can be told to produce.
#[derive(Clone, Debug)]
pub enum MockError {
    Unavailable(String),
    RateLimited(u64),
}

impl MockResponse {
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Default::default()
        }
    }

    pub fn error(msg: &str) -> Self {
        Self {
            error: Some(MockError::Unavailable(msg.to_string())),
            ..Default::default()
        }
    }
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(vec![])),
            requests: Arc::new(Mutex::new(vec![])),
            name: name.into(),
        }
    }

    /// Queue a plain text response.
    pub fn with_response(self, text: &str) -> Self {
        self.responses.lock().push(MockResponse::text(text));
        self
    }

    /// Queue a function-call response carrying `args` verbatim.
    pub fn with_tool_call(self, name: &str, args: &str) -> Self {
        self.responses.lock().push(MockResponse {
            tool_calls: vec![ToolCall {
                id: format!("call_{}", uuid::Uuid::new_v4()),
                tool_name: name.to_string(),
                arguments: args.to_string(),
            }],
            stop_reason: Some(StopReason::ToolUse),
            ..Default::default()
        });
        self
    }

    /// Queue an `OracleUnavailable` error.
    pub fn with_error(self, error: &str) -> Self {
        self.responses.lock().push(MockResponse::error(error));
        self
    }

    /// Queue a rate-limit error.
    pub fn with_rate_limit(self, retry_after_secs: u64) -> Self {
        self.responses.lock().push(MockResponse {
            error: Some(MockError::RateLimited(retry_after_secs)),
            ..Default::default()
        });
        self
    }

    /// Queue a fully custom response.
    pub fn with_mock_response(self, resp: MockResponse) -> Self {
        self.responses.lock().push(resp);
        self
    }

    /// Queue a response through a shared reference.
    pub fn queue_response(&self, resp: MockResponse) {
        self.responses.lock().push(resp);
    }

    /// Get all requests that were made to this provider.
    pub fn recorded_requests(&self) -> Arc<Mutex<Vec<LlmRequest>>> {
        Arc::clone(&self.requests)
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().len()
    }

    /// Pop the next queued response, or a placeholder when the queue is empty.
    fn next_response(&self) -> MockResponse {
        let mut responses = self.responses.lock();
        if responses.is_empty() {
            MockResponse::text("(mock: no more queued responses)")
        } else {
            responses.remove(0)
        }
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        self.requests.lock().push(request.clone());
        let mock = self.next_response();

        match mock.error {
            Some(MockError::Unavailable(msg)) => return Err(RolecallError::OracleUnavailable(msg)),
            Some(MockError::RateLimited(secs)) => {
                return Err(RolecallError::RateLimited {
                    retry_after_secs: secs,
                });
            }
            None => {}
        }

        let has_tool_calls = !mock.tool_calls.is_empty();
        let mut message = Message::assistant(mock.text);
        message.tool_calls = mock.tool_calls;

        Ok(LlmResponse {
            message,
            usage: Usage {
                input_tokens: 100,
                output_tokens: 50,
            },
            has_tool_calls,
            stop_reason: mock.stop_reason.unwrap_or(StopReason::EndTurn),
        })
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
