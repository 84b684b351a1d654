use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::provider::{LlmProvider, LlmRequest, LlmResponse};
use rolecall_core::{Result, RolecallError};

// ── Circuit Breaker ────────────────────────────────────────────

/// Number of consecutive failed calls before opening the circuit.
const CIRCUIT_FAILURE_THRESHOLD: u32 = 5;
/// How long the circuit stays open before allowing a probe request.
const CIRCUIT_OPEN_DURATION: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitState {
    /// Normal operation, requests flow through.
    Closed,
    /// Oracle is failing; reject requests immediately.
    Open { since: Instant },
    /// Allow a single probe request to test if the oracle recovered.
    HalfOpen,
}

#[derive(Debug)]
struct CircuitBreaker {
    state: CircuitState,
    consecutive_failures: u32,
    threshold: u32,
    open_for: Duration,
}

impl CircuitBreaker {
    fn new(threshold: u32, open_for: Duration) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            threshold,
            open_for,
        }
    }

    fn allow_request(&mut self) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open { since } => {
                if since.elapsed() >= self.open_for {
                    self.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
            // Already probing
            CircuitState::HalfOpen => false,
        }
    }

    fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.state = CircuitState::Closed;
    }

    fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.threshold || self.state == CircuitState::HalfOpen {
            self.state = CircuitState::Open {
                since: Instant::now(),
            };
        }
    }

    fn is_open(&self) -> bool {
        matches!(self.state, CircuitState::Open { .. })
    }
}

/// Retry tunables for transient oracle failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base delay for exponential backoff (doubles each retry).
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(800),
        }
    }
}

/// Check if an error is transient and worth retrying.
fn is_retryable(err: &RolecallError) -> bool {
    match err {
        RolecallError::RateLimited { .. } => true,
        RolecallError::OracleUnavailable(msg) => {
            msg.starts_with("HTTP 429")
                || msg.starts_with("HTTP 500")
                || msg.starts_with("HTTP 502")
                || msg.starts_with("HTTP 503")
                || msg.starts_with("HTTP 504")
                || msg.starts_with("HTTP 529")
                || msg.contains("timed out")
                || msg.contains("connection reset")
                || msg.contains("connection closed")
                || msg.contains("error sending request")
                || msg.contains("overloaded")
        }
        _ => false,
    }
}

/// Extract retry-after hint from a RateLimited error (in seconds).
fn retry_after_hint(err: &RolecallError) -> Option<u64> {
    if let RolecallError::RateLimited { retry_after_secs } = err {
        Some(*retry_after_secs)
    } else {
        None
    }
}

/// The oracle as the rest of the bot sees it: one provider, a default
/// model, bounded retries, and a circuit breaker shared by all sessions.
#[derive(Clone)]
pub struct OracleClient {
    provider: Arc<dyn LlmProvider>,
    model: String,
    max_tokens: u32,
    retry: RetryPolicy,
    breaker: Arc<Mutex<CircuitBreaker>>,
}

impl OracleClient {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>, max_tokens: u32) -> Self {
        let model = model.into();
        info!(provider = provider.name(), model = %model, "oracle client ready");
        Self {
            provider,
            model,
            max_tokens,
            retry: RetryPolicy::default(),
            breaker: Arc::new(Mutex::new(CircuitBreaker::new(
                CIRCUIT_FAILURE_THRESHOLD,
                CIRCUIT_OPEN_DURATION,
            ))),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Override the circuit breaker tunables.
    pub fn with_circuit(self, threshold: u32, open_for: Duration) -> Self {
        *self.breaker.lock() = CircuitBreaker::new(threshold.max(1), open_for);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Start a request for the configured model.
    pub fn request(&self, temperature: f32) -> LlmRequest {
        LlmRequest::new(self.model.clone(), self.max_tokens, temperature)
    }

    pub fn is_circuit_open(&self) -> bool {
        self.breaker.lock().is_open()
    }

    /// Complete a request, retrying transient failures with backoff.
    ///
    /// Exhausted retries and an open circuit surface as
    /// [`RolecallError::OracleUnavailable`] (or the last rate-limit error).
    pub async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        if !self.breaker.lock().allow_request() {
            warn!(
                provider = self.provider.name(),
                "circuit breaker is OPEN — rejecting oracle request"
            );
            return Err(RolecallError::OracleUnavailable(
                "oracle circuit breaker is open".into(),
            ));
        }

        match self.complete_with_retry(request).await {
            Ok(resp) => {
                self.breaker.lock().record_success();
                Ok(resp)
            }
            Err(e) => {
                // Unparseable bodies mean the oracle answered; don't trip on them.
                if matches!(e, RolecallError::MalformedOracleReply(_)) {
                    self.breaker.lock().record_success();
                } else {
                    self.record_failure();
                }
                Err(e)
            }
        }
    }

    fn record_failure(&self) {
        let mut cb = self.breaker.lock();
        let was_open = cb.is_open();
        cb.record_failure();
        if !was_open && cb.is_open() {
            warn!(
                provider = self.provider.name(),
                failures = cb.consecutive_failures,
                "circuit breaker OPEN — oracle disabled for {}s",
                cb.open_for.as_secs()
            );
        }
    }

    async fn complete_with_retry(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let max = self.retry.max_retries;
        let mut attempt = 0u32;

        loop {
            match self.provider.complete(request).await {
                Ok(resp) => return Ok(resp),
                Err(e) if is_retryable(&e) && attempt < max => {
                    let base_ms = self.retry.base_delay.as_millis() as u64;
                    let delay = retry_after_hint(&e)
                        .map(|s| s.saturating_mul(1000))
                        .unwrap_or(base_ms.saturating_mul(2u64.saturating_pow(attempt)));
                    warn!(
                        provider = self.provider.name(),
                        attempt = attempt + 1,
                        max = max,
                        delay_ms = delay,
                        error = %e,
                        "retrying oracle request after transient error"
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Probe the oracle endpoint.
    pub async fn health_check(&self) -> Result<()> {
        self.provider.health_check().await
    }
}
