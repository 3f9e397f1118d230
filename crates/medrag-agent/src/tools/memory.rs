//! Session-scoped vector memory tools (§4.9, §4.11).

use async_trait::async_trait;
use medrag_core::memory::DEFAULT_RECALL_TOP_K;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ok, Tool, ToolContext, ToolRegistry};

pub fn register_all(registry: &mut ToolRegistry) {
    registry.register(std::sync::Arc::new(RememberInformation));
    registry.register(std::sync::Arc::new(RecallInformation));
    registry.register(std::sync::Arc::new(GetMemoryStats));
}

fn bad_input(err: serde_json::Error) -> Value {
    super::fail_str(format!("invalid tool input: {err}"))
}

struct RememberInformation;

#[derive(Deserialize)]
struct RememberInformationArgs {
    text: String,
}

#[async_trait]
impl Tool for RememberInformation {
    fn name(&self) -> &'static str {
        "remember_information"
    }
    fn description(&self) -> &'static str {
        "Store a fact in this session's semantic memory for later recall (§4.11)."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "text": {"type": "string"} },
            "required": ["text"]
        })
    }
    async fn call(&self, ctx: &ToolContext, input: Value) -> Value {
        let args: RememberInformationArgs = match serde_json::from_value(input) {
            Ok(a) => a,
            Err(e) => return bad_input(e),
        };
        let embedding = ctx.embeddings.embed_text(&args.text).await;
        ctx.memory.remember(&ctx.session_id, args.text.clone(), embedding);
        ok(json!({ "remembered": args.text }))
    }
}

struct RecallInformation;

#[derive(Deserialize)]
struct RecallInformationArgs {
    query: String,
    top_k: Option<usize>,
}

#[async_trait]
impl Tool for RecallInformation {
    fn name(&self) -> &'static str {
        "recall_information"
    }
    fn description(&self) -> &'static str {
        "Recall the most similar remembered facts in this session (§4.11)."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "top_k": {"type": "integer", "default": DEFAULT_RECALL_TOP_K}
            },
            "required": ["query"]
        })
    }
    async fn call(&self, ctx: &ToolContext, input: Value) -> Value {
        let args: RecallInformationArgs = match serde_json::from_value(input) {
            Ok(a) => a,
            Err(e) => return bad_input(e),
        };
        let query_vector = ctx.embeddings.embed_query(&args.query).await;
        let hits = ctx.memory.recall(&ctx.session_id, &query_vector, args.top_k.unwrap_or(DEFAULT_RECALL_TOP_K));
        ok(json!({ "hits": hits }))
    }
}

struct GetMemoryStats;

#[async_trait]
impl Tool for GetMemoryStats {
    fn name(&self) -> &'static str {
        "get_memory_stats"
    }
    fn description(&self) -> &'static str {
        "Item count, capacity, and age range of this session's memory (§4.11)."
    }
    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }
    async fn call(&self, ctx: &ToolContext, _input: Value) -> Value {
        ok(json!(ctx.memory.stats(&ctx.session_id)))
    }
}
