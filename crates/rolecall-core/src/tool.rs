use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A function the oracle may be asked to call with structured arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    /// Human-readable description for the LLM.
    pub description: String,
    /// JSON Schema of the parameters object.
    pub parameters: Value,
}

/// A function call returned by the oracle.
///
/// `arguments` is kept as the raw string the oracle produced so that strict
/// parsing happens in one place, downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub tool_name: String,
    pub arguments: String,
}
