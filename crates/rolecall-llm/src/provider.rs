use async_trait::async_trait;
use rolecall_core::{Message, Result, Tool};
use serde::{Deserialize, Serialize};

/// A request to the oracle.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub model: String,
    /// Conversation history, oldest first.
    pub messages: Vec<Message>,
    /// Functions the oracle may call.
    pub tools: Vec<Tool>,
    /// Force a call to the named function.
    pub tool_choice: Option<String>,
    /// System prompt (sent as the leading system message).
    pub system: Option<String>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    pub temperature: f32,
}

impl LlmRequest {
    pub fn new(model: impl Into<String>, max_tokens: u32, temperature: f32) -> Self {
        Self {
            model: model.into(),
            messages: vec![],
            tools: vec![],
            tool_choice: None,
            system: None,
            max_tokens,
            temperature,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    /// Offer a single function and require the oracle to call it.
    pub fn with_forced_tool(mut self, tool: Tool) -> Self {
        self.tool_choice = Some(tool.name.clone());
        self.tools = vec![tool];
        self
    }
}

/// A complete response from the oracle.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub message: Message,
    pub usage: Usage,
    pub has_tool_calls: bool,
    pub stop_reason: StopReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    ContentFilter,
}

/// Token usage statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Trait implemented by each oracle backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Human-readable name, e.g. "openai".
    fn name(&self) -> &str;

    /// Send a non-streaming request.
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse>;

    /// Check if the backend is reachable.
    async fn health_check(&self) -> Result<()>;
}
