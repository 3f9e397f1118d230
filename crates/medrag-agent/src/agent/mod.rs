//! Agent Controller (§4.10): drives the LLM/tool loop.

pub mod provider;
pub mod trace;

use std::sync::Arc;

use tracing::info;

use crate::tools::{ToolContext, ToolRegistry};
use provider::{LlmProvider, Message, Role, StopReason};
use trace::ToolTrace;

/// §4.10 step 5.
pub const MAX_ITERATIONS: u32 = 10;
const TEMPERATURE: f32 = 0.0;

const SYSTEM_PROMPT: &str = "You are a clinical retrieval assistant. Use the available tools to \
search FHIR documents, the medical knowledge graph, and radiology images before answering. Ground \
every clinical claim in a tool observation; say so plainly when a search found nothing relevant.";

/// What one call to [`AgentController::run_turn`] produces.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TurnResult {
    pub reply: String,
    pub trace: Vec<ToolTrace>,
    pub reached_iteration_cap: bool,
}

/// Drives one user turn against the configured [`LlmProvider`] and
/// [`ToolRegistry`] (§4.10). Stateless itself — the running message list
/// lives in the caller's [`crate::session::Session`].
pub struct AgentController {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
}

impl AgentController {
    pub fn new(provider: Arc<dyn LlmProvider>, tools: Arc<ToolRegistry>) -> Self {
        Self { provider, tools }
    }

    /// Runs one user turn to completion: memory recall, LLM invocation,
    /// tool-call execution, looped until a terminal assistant message or
    /// the iteration cap (§4.10).
    pub async fn run_turn(&self, ctx: &ToolContext, history: &mut Vec<Message>, user_message: &str) -> TurnResult {
        if history.is_empty() {
            history.push(Message::system(SYSTEM_PROMPT));
        }

        let prompt = self.with_recalled_memory(ctx, user_message).await;
        history.push(Message::user(prompt));

        let catalog = self.tools.catalog();
        let mut trace = Vec::new();

        for iteration in 1..=MAX_ITERATIONS {
            let response = match self.provider.complete(history, &catalog, TEMPERATURE).await {
                Ok(response) => response,
                Err(err) => {
                    let reply = format!("the assistant model is unavailable: {err}");
                    history.push(Message::assistant(reply.clone()));
                    return TurnResult { reply, trace, reached_iteration_cap: false };
                }
            };

            match response.stop_reason {
                StopReason::EndTurn => {
                    let reply = response.text();
                    history.push(Message::assistant(reply.clone()));
                    return TurnResult { reply, trace, reached_iteration_cap: false };
                }
                StopReason::ToolUse => {
                    let calls = response.tool_calls();
                    history.push(Message {
                        role: Role::Assistant,
                        content: if response.text().is_empty() { None } else { Some(response.text()) },
                        tool_calls: calls.clone(),
                        tool_call_id: None,
                    });

                    for call in &calls {
                        info!(iteration, tool = %call.name, "dispatching tool call");
                        let result = self.tools.dispatch(&call.name, call.arguments.clone(), ctx).await;
                        trace.push(ToolTrace::new(iteration, call.name.clone(), call.arguments.clone(), &result));
                        history.push(Message::tool_result(call.id.clone(), result.to_string()));
                    }
                }
            }
        }

        let reply = "Reached maximum iterations".to_string();
        history.push(Message::assistant(reply.clone()));
        TurnResult { reply, trace, reached_iteration_cap: true }
    }

    /// §4.10 step 1: recall top-3 memory items above the similarity
    /// threshold and prepend a `[RECALLED MEMORY]` block.
    async fn with_recalled_memory(&self, ctx: &ToolContext, user_message: &str) -> String {
        let query_vector = ctx.embeddings.embed_query(user_message).await;
        let hits = ctx.memory.recall_for_turn(&ctx.session_id, &query_vector);
        if hits.is_empty() {
            return user_message.to_string();
        }
        let block = hits.iter().map(|h| format!("- {}", h.text)).collect::<Vec<_>>().join("\n");
        format!("[RECALLED MEMORY]\n{block}\n[/RECALLED MEMORY]\n\n{user_message}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolRegistry;
    use async_trait::async_trait;
    use medrag_core::embeddings::Embeddings;
    use medrag_core::error::{MedRagError, Result};
    use medrag_core::memory::VectorMemory;
    use medrag_core::store::DataStore;
    use provider::{ContentBlock, ProviderResponse, ToolCall};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedProvider {
        calls: AtomicU32,
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn complete(
            &self,
            _messages: &[Message],
            _tools: &[crate::tools::ToolSpec],
            _temperature: f32,
        ) -> Result<ProviderResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                Ok(ProviderResponse {
                    stop_reason: StopReason::ToolUse,
                    content: vec![ContentBlock::ToolUse(ToolCall {
                        id: "call_1".to_string(),
                        name: "get_memory_stats".to_string(),
                        arguments: serde_json::json!({}),
                    })],
                })
            } else {
                Ok(ProviderResponse {
                    stop_reason: StopReason::EndTurn,
                    content: vec![ContentBlock::Text("here is the answer".to_string())],
                })
            }
        }
    }

    struct LoopingProvider;

    #[async_trait]
    impl LlmProvider for LoopingProvider {
        async fn complete(
            &self,
            _messages: &[Message],
            _tools: &[crate::tools::ToolSpec],
            _temperature: f32,
        ) -> Result<ProviderResponse> {
            Ok(ProviderResponse {
                stop_reason: StopReason::ToolUse,
                content: vec![ContentBlock::ToolUse(ToolCall {
                    id: "call_x".to_string(),
                    name: "get_memory_stats".to_string(),
                    arguments: serde_json::json!({}),
                })],
            })
        }
    }

    fn test_ctx() -> ToolContext {
        ToolContext {
            store: Arc::new(DataStore::open_in_memory().unwrap()),
            embeddings: Arc::new(Embeddings::new("http://127.0.0.1:0")),
            fhir: None,
            memory: Arc::new(VectorMemory::default()),
            session_id: "s1".to_string(),
            patient_id: None,
        }
    }

    #[tokio::test]
    async fn executes_a_tool_call_then_returns_the_terminal_message() {
        let controller = AgentController::new(
            Arc::new(ScriptedProvider { calls: AtomicU32::new(0) }),
            Arc::new(ToolRegistry::with_default_tools()),
        );
        let ctx = test_ctx();
        let mut history = Vec::new();

        let result = controller.run_turn(&ctx, &mut history, "what do you remember?").await;

        assert_eq!(result.reply, "here is the answer");
        assert!(!result.reached_iteration_cap);
        assert_eq!(result.trace.len(), 1);
        assert_eq!(result.trace[0].name, "get_memory_stats");
    }

    #[tokio::test]
    async fn stops_at_the_iteration_cap() {
        let controller = AgentController::new(Arc::new(LoopingProvider), Arc::new(ToolRegistry::with_default_tools()));
        let ctx = test_ctx();
        let mut history = Vec::new();

        let result = controller.run_turn(&ctx, &mut history, "keep going forever").await;

        assert_eq!(result.reply, "Reached maximum iterations");
        assert!(result.reached_iteration_cap);
        assert_eq!(result.trace.len(), MAX_ITERATIONS as usize);
    }

    struct FailingProvider;

    #[async_trait]
    impl LlmProvider for FailingProvider {
        async fn complete(
            &self,
            _messages: &[Message],
            _tools: &[crate::tools::ToolSpec],
            _temperature: f32,
        ) -> Result<ProviderResponse> {
            Err(MedRagError::DependencyUnavailable("llm down".to_string()))
        }
    }

    #[tokio::test]
    async fn surfaces_a_provider_failure_as_a_terminal_message_rather_than_panicking() {
        let controller = AgentController::new(Arc::new(FailingProvider), Arc::new(ToolRegistry::with_default_tools()));
        let ctx = test_ctx();
        let mut history = Vec::new();

        let result = controller.run_turn(&ctx, &mut history, "hello").await;

        assert!(result.reply.contains("unavailable"));
        assert!(result.trace.is_empty());
    }
}
