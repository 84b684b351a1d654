use async_trait::async_trait;
use rolecall_core::{Message, Result, RolecallError, Speaker, ToolCall};
use std::time::Duration;
use tracing::{debug, warn};

use crate::provider::*;

/// OpenAI-compatible chat-completions provider (OpenAI, vLLM, llama.cpp,
/// LM Studio, etc.). Posts to the configured endpoint URL as-is.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    provider_name: String,
}

impl OpenAiProvider {
    pub fn new(api_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RolecallError::OracleUnavailable(format!("http client: {e}")))?;
        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key,
            provider_name: "openai".into(),
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.provider_name = name.into();
        self
    }

    /// Build the JSON body for a chat-completions request.
    pub fn build_body(request: &LlmRequest) -> serde_json::Value {
        let mut messages = Vec::new();

        if let Some(ref system) = request.system {
            messages.push(serde_json::json!({
                "role": "system",
                "content": system,
            }));
        }

        for msg in &request.messages {
            let role = match msg.speaker {
                Speaker::System => "system",
                Speaker::User => "user",
                Speaker::Assistant => "assistant",
            };
            messages.push(serde_json::json!({
                "role": role,
                "content": msg.content,
            }));
        }

        let mut body = serde_json::json!({
            "model": &request.model,
            "temperature": effective_temperature(&request.model, request.temperature),
            "messages": messages,
        });

        // Newer OpenAI models (o1, o3, gpt-5, …) require max_completion_tokens
        if uses_max_completion_tokens(&request.model) {
            body["max_completion_tokens"] = serde_json::json!(request.max_tokens);
        } else {
            body["max_tokens"] = serde_json::json!(request.max_tokens);
        }

        if !request.tools.is_empty() {
            let tools: Vec<serde_json::Value> = request
                .tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = serde_json::json!(tools);
        }

        if let Some(ref name) = request.tool_choice {
            body["tool_choice"] = serde_json::json!({
                "type": "function",
                "function": { "name": name },
            });
        }

        body
    }

    /// Parse a chat-completions response body.
    pub fn parse_response(data: &serde_json::Value) -> Result<LlmResponse> {
        let choice = data["choices"].get(0).ok_or_else(|| {
            RolecallError::MalformedOracleReply("response has no choices".into())
        })?;

        let content = choice["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();

        let mut tool_calls: Vec<ToolCall> = choice["message"]["tool_calls"]
            .as_array()
            .map(|calls| {
                calls
                    .iter()
                    .filter_map(|c| {
                        Some(ToolCall {
                            id: c["id"].as_str().unwrap_or_default().to_string(),
                            tool_name: c["function"]["name"].as_str()?.to_string(),
                            arguments: c["function"]["arguments"].as_str()?.to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        // Legacy `function_call` shape still returned by some servers.
        if tool_calls.is_empty()
            && let Some(name) = choice["message"]["function_call"]["name"].as_str()
            && let Some(args) = choice["message"]["function_call"]["arguments"].as_str()
        {
            tool_calls.push(ToolCall {
                id: String::new(),
                tool_name: name.to_string(),
                arguments: args.to_string(),
            });
        }

        let has_tool_calls = !tool_calls.is_empty();

        let mut message = Message::assistant(content);
        message.tool_calls = tool_calls;

        let finish_reason = choice["finish_reason"].as_str().unwrap_or("");
        if finish_reason == "length" {
            warn!("oracle reply truncated (finish_reason=length); consider raising oracle.max_tokens");
        }

        let usage_data = &data["usage"];
        let usage = Usage {
            input_tokens: usage_data["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: usage_data["completion_tokens"].as_u64().unwrap_or(0) as u32,
        };

        Ok(LlmResponse {
            message,
            usage,
            has_tool_calls,
            stop_reason: match finish_reason {
                "length" => StopReason::MaxTokens,
                "content_filter" => StopReason::ContentFilter,
                _ if has_tool_calls => StopReason::ToolUse,
                _ => StopReason::EndTurn,
            },
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let body = Self::build_body(request);

        let mut req = self.client.post(&self.api_url).json(&body);
        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                RolecallError::OracleUnavailable(format!("request timed out: {e}"))
            } else {
                RolecallError::OracleUnavailable(e.to_string())
            }
        })?;

        let status = resp.status();
        if status.as_u16() == 429 {
            let retry_after_secs = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(1);
            return Err(RolecallError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(RolecallError::OracleUnavailable(format!(
                "HTTP {}: {text}",
                status.as_u16()
            )));
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| RolecallError::MalformedOracleReply(format!("response body: {e}")))?;

        let response = Self::parse_response(&data)?;
        debug!(
            model = %request.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            tool_calls = response.has_tool_calls,
            "oracle response received"
        );
        Ok(response)
    }

    async fn health_check(&self) -> Result<()> {
        let request = LlmRequest::new(String::new(), 1, 0.0)
            .with_messages(vec![Message::user("ping")]);
        let body = Self::build_body(&request);

        let mut req = self.client.post(&self.api_url).json(&body);
        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }
        let resp = req
            .send()
            .await
            .map_err(|e| RolecallError::OracleUnavailable(e.to_string()))?;
        // Any HTTP answer other than auth failure or 5xx means the endpoint is up.
        let status = resp.status();
        if status.is_server_error() || status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(RolecallError::OracleUnavailable(format!(
                "HTTP {}",
                status.as_u16()
            )));
        }
        Ok(())
    }
}

/// gpt-5 family models only accept the default temperature.
pub fn effective_temperature(model: &str, requested: f32) -> f32 {
    let m = model.to_lowercase();
    if m.contains("gpt-5") || m.contains("gpt5") {
        1.0
    } else {
        requested
    }
}

fn uses_max_completion_tokens(model: &str) -> bool {
    let m = model.to_lowercase();
    m.starts_with("o1")
        || m.starts_with("o3")
        || m.starts_with("o4")
        || m.contains("gpt-5")
        || m.contains("gpt5")
}
