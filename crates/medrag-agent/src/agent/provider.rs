//! LLM provider normalization (§4.10, §9 Design Notes: "LLM provider
//! variance"). Every provider, regardless of its own wire shape, is
//! normalized to [`ProviderResponse`] before the Agent Controller's loop
//! inspects it, so a second provider could be added later without
//! touching the loop.

use async_trait::async_trait;
use medrag_core::error::{MedRagError, Result};
use medrag_core::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::tools::ToolSpec;

/// LLM request default timeout (§5).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One call the model asked to make.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// One message in the running turn history (§3: Agent Turn State).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self { role: Role::System, content: Some(text.into()), tool_calls: Vec::new(), tool_call_id: None }
    }
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, content: Some(text.into()), tool_calls: Vec::new(), tool_call_id: None }
    }
    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: Some(text.into()), tool_calls: Vec::new(), tool_call_id: None }
    }
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// A normalized content block, the shape every provider response is
/// reduced to (§9).
#[derive(Debug, Clone)]
pub enum ContentBlock {
    Text(String),
    ToolUse(ToolCall),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
}

/// `{stop_reason, content: [{text?|tool_use?}]}` (§4.10, §9).
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub stop_reason: StopReason,
    pub content: Vec<ContentBlock>,
}

impl ProviderResponse {
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text(t) => Some(t.as_str()),
                ContentBlock::ToolUse(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse(call) => Some(call.clone()),
                ContentBlock::Text(_) => None,
            })
            .collect()
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, messages: &[Message], tools: &[ToolSpec], temperature: f32) -> Result<ProviderResponse>;
}

/// OpenAI-compatible chat-completions client with function/tool calling
/// (§6): `model, messages, temperature, tools?, tool_choice?`.
pub struct OpenAiCompatibleProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    retry: RetryPolicy,
}

impl OpenAiCompatibleProvider {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, model: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .expect("reqwest client builds with a static timeout");
        Self {
            http,
            base_url: base_url.into(),
            api_key,
            model: model.into(),
            retry: RetryPolicy::new(3, Duration::from_secs(2), medrag_core::retry::GiveUp::Fail),
        }
    }

    fn to_wire_messages(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|m| {
                let mut wire = serde_json::json!({ "role": role_str(m.role) });
                if let Some(content) = &m.content {
                    wire["content"] = serde_json::json!(content);
                }
                if !m.tool_calls.is_empty() {
                    wire["tool_calls"] = serde_json::json!(m
                        .tool_calls
                        .iter()
                        .map(|c| serde_json::json!({
                            "id": c.id,
                            "type": "function",
                            "function": { "name": c.name, "arguments": c.arguments.to_string() }
                        }))
                        .collect::<Vec<_>>());
                }
                if let Some(id) = &m.tool_call_id {
                    wire["tool_call_id"] = serde_json::json!(id);
                }
                wire
            })
            .collect()
    }

    fn to_wire_tools(tools: &[ToolSpec]) -> Vec<Value> {
        tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.input_schema,
                    }
                })
            })
            .collect()
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn complete(&self, messages: &[Message], tools: &[ToolSpec], temperature: f32) -> Result<ProviderResponse> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "messages": Self::to_wire_messages(messages),
            "temperature": temperature,
            "tools": Self::to_wire_tools(tools),
        });

        let response = self
            .retry
            .run(|| async {
                let mut request = self.http.post(&url).json(&body);
                if let Some(key) = &self.api_key {
                    request = request.bearer_auth(key);
                }
                let response = request.send().await?;
                if !response.status().is_success() {
                    return Err(MedRagError::DependencyUnavailable(format!(
                        "LLM provider returned {}",
                        response.status()
                    )));
                }
                response.json::<Value>().await.map_err(MedRagError::from)
            })
            .await?;

        normalize_openai_response(&response)
    }
}

fn normalize_openai_response(raw: &Value) -> Result<ProviderResponse> {
    let choice = raw["choices"].get(0).ok_or_else(|| {
        MedRagError::DependencyUnavailable("LLM response had no choices".to_string())
    })?;
    let message = &choice["message"];

    let mut content = Vec::new();
    if let Some(text) = message["content"].as_str() {
        if !text.is_empty() {
            content.push(ContentBlock::Text(text.to_string()));
        }
    }

    let mut stop_reason = StopReason::EndTurn;
    if let Some(tool_calls) = message["tool_calls"].as_array() {
        for call in tool_calls {
            let id = call["id"].as_str().unwrap_or_default().to_string();
            let name = call["function"]["name"].as_str().unwrap_or_default().to_string();
            let arguments_str = call["function"]["arguments"].as_str().unwrap_or("{}");
            let arguments: Value = serde_json::from_str(arguments_str).unwrap_or(Value::Null);
            content.push(ContentBlock::ToolUse(ToolCall { id, name, arguments }));
            stop_reason = StopReason::ToolUse;
        }
    }

    Ok(ProviderResponse { stop_reason, content })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_a_terminal_text_response() {
        let raw = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "patient has diabetes" } }]
        });
        let response = normalize_openai_response(&raw).unwrap();
        assert_eq!(response.stop_reason, StopReason::EndTurn);
        assert_eq!(response.text(), "patient has diabetes");
    }

    #[test]
    fn normalizes_a_tool_call_response() {
        let raw = serde_json::json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "tool_calls": [{
                        "id": "call_1",
                        "function": { "name": "search_medical_images", "arguments": "{\"query\":\"pneumonia\"}" }
                    }]
                }
            }]
        });
        let response = normalize_openai_response(&raw).unwrap();
        assert_eq!(response.stop_reason, StopReason::ToolUse);
        let calls = response.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "search_medical_images");
        assert_eq!(calls[0].arguments["query"], "pneumonia");
    }
}
