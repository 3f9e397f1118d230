//! Tool Registry (§4.9).
//!
//! A central registry mapping a stable tool name to a JSON input schema and
//! a handler — a discriminated catalog, not dynamic attribute lookup (§9
//! Design Notes: "Polymorphic tools"). Every handler returns the same
//! envelope shape regardless of what it does, so the Agent Controller never
//! has to special-case a tool by name.

pub mod memory;
pub mod retrieval;
pub mod visualization;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use medrag_core::fhir::FhirAdapter;
use medrag_core::memory::VectorMemory;
use medrag_core::store::DataStore;
use medrag_core::{embeddings::Embeddings, MedRagError};
use serde_json::{json, Value};

/// Everything a tool handler needs, threaded explicitly on every call
/// rather than reached for through a process-global (§9: "Session state").
#[derive(Clone)]
pub struct ToolContext {
    pub store: Arc<DataStore>,
    pub embeddings: Arc<Embeddings>,
    pub fhir: Option<Arc<FhirAdapter>>,
    pub memory: Arc<VectorMemory>,
    pub session_id: String,
    pub patient_id: Option<String>,
}

/// A tool in the catalog: stable name, description, and JSON input schema
/// for the LLM's tool-calling API (§6), plus the handler that serves it.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn input_schema(&self) -> Value;
    /// Always returns the stable envelope (§4.9); never propagates an
    /// error across the tool-dispatch boundary (§7).
    async fn call(&self, ctx: &ToolContext, input: Value) -> Value;
}

/// `{status, data?, error?, search_mode?, fallback_reason?}` (§4.9, §7).
pub fn ok(data: Value) -> Value {
    json!({ "status": "ok", "data": data })
}

pub fn ok_with_mode(data: Value, search_mode: Option<&str>, fallback_reason: Option<&str>) -> Value {
    let mut envelope = json!({ "status": "ok", "data": data });
    if let Some(mode) = search_mode {
        envelope["search_mode"] = json!(mode);
    }
    if let Some(reason) = fallback_reason {
        envelope["fallback_reason"] = json!(reason);
    }
    envelope
}

pub fn fail(err: &MedRagError) -> Value {
    json!({ "status": "fail", "error": err.to_string() })
}

pub fn fail_str(msg: impl Into<String>) -> Value {
    json!({ "status": "fail", "error": msg.into() })
}

/// What the Agent Controller hands the LLM provider as `tools` (§6).
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Read-only after initialization (§5). Construct once with
/// [`ToolRegistry::with_default_tools`] and share behind an `Arc`.
pub struct ToolRegistry {
    tools: HashMap<&'static str, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name(), tool);
    }

    /// The full catalog (§4.9): 13 retrieval tools, 5 visualization tools,
    /// 3 memory tools.
    pub fn with_default_tools() -> Self {
        let mut registry = Self::new();
        retrieval::register_all(&mut registry);
        visualization::register_all(&mut registry);
        memory::register_all(&mut registry);
        registry
    }

    pub fn catalog(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self
            .tools
            .values()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.input_schema(),
            })
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Dispatch by name (§4.9, §9: "central registry maps name -> schema +
    /// handler"). An unknown tool name is itself reported through the
    /// envelope rather than panicking, since it can only arrive from an
    /// LLM hallucinating a tool call.
    pub async fn dispatch(&self, name: &str, input: Value, ctx: &ToolContext) -> Value {
        match self.tools.get(name) {
            Some(tool) => tool.call(ctx, input).await,
            None => fail_str(format!("unknown tool: {name}")),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::with_default_tools()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_has_all_twentyone_tools() {
        let registry = ToolRegistry::with_default_tools();
        assert_eq!(registry.len(), 21);
    }

    #[tokio::test]
    async fn dispatching_an_unknown_tool_fails_through_the_envelope_not_a_panic() {
        let registry = ToolRegistry::with_default_tools();
        let ctx = ToolContext {
            store: Arc::new(DataStore::open_in_memory().unwrap()),
            embeddings: Arc::new(Embeddings::new("http://127.0.0.1:0")),
            fhir: None,
            memory: Arc::new(VectorMemory::default()),
            session_id: "s1".to_string(),
            patient_id: None,
        };
        let result = registry.dispatch("does_not_exist", json!({}), &ctx).await;
        assert_eq!(result["status"], "fail");
    }
}
