//! # rolecall-llm
//!
//! Abstraction over the oracle: a single request → structured-response
//! capability behind [`LlmProvider`], an OpenAI-compatible implementation,
//! and [`OracleClient`] which adds bounded retries and a circuit breaker.

pub mod client;
pub mod mock;
pub mod openai;
pub mod provider;

pub use client::{OracleClient, RetryPolicy};
pub use mock::MockProvider;
pub use provider::{LlmProvider, LlmRequest, LlmResponse, StopReason, Usage};
