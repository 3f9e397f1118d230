//! Tool-call tracing for the Agent Controller (§4.10).

use serde::Serialize;
use serde_json::Value;

const MAX_RESULT_CHARS: usize = 500;

/// One tool invocation within a turn: `{iteration, name, input,
/// truncated_result}` (§4.10).
#[derive(Debug, Clone, Serialize)]
pub struct ToolTrace {
    pub iteration: u32,
    pub name: String,
    pub input: Value,
    pub truncated_result: String,
}

impl ToolTrace {
    pub fn new(iteration: u32, name: impl Into<String>, input: Value, result: &Value) -> Self {
        let rendered = result.to_string();
        let truncated_result = if rendered.chars().count() > MAX_RESULT_CHARS {
            let mut truncated: String = rendered.chars().take(MAX_RESULT_CHARS).collect();
            truncated.push('…');
            truncated
        } else {
            rendered
        };
        Self { iteration, name: name.into(), input, truncated_result }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_long_results_at_five_hundred_chars() {
        let huge = serde_json::json!({ "data": "x".repeat(1000) });
        let trace = ToolTrace::new(1, "search_fhir_documents", serde_json::json!({}), &huge);
        assert!(trace.truncated_result.chars().count() <= 501);
        assert!(trace.truncated_result.ends_with('…'));
    }

    #[test]
    fn leaves_short_results_untouched() {
        let small = serde_json::json!({ "status": "ok" });
        let trace = ToolTrace::new(1, "get_memory_stats", serde_json::json!({}), &small);
        assert_eq!(trace.truncated_result, small.to_string());
    }
}
