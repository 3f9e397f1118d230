//! Visualization tools (§4.9).
//!
//! These return structured chart-ready data — labels, series, points, or a
//! node/edge list — rather than rendered pixels; plotting is a front-end
//! concern out of this core's scope (SPEC_FULL §4.9).

use async_trait::async_trait;
use medrag_core::models::EntityType;
use medrag_core::retrieval::{hybrid, kg_search};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{fail, ok, Tool, ToolContext, ToolRegistry};

pub fn register_all(registry: &mut ToolRegistry) {
    registry.register(std::sync::Arc::new(PlotSymptomFrequency));
    registry.register(std::sync::Arc::new(PlotEntityDistribution));
    registry.register(std::sync::Arc::new(PlotPatientTimeline));
    registry.register(std::sync::Arc::new(PlotEntityNetwork));
    registry.register(std::sync::Arc::new(VisualizeGraphragResults));
}

fn bad_input(err: serde_json::Error) -> Value {
    super::fail_str(format!("invalid tool input: {err}"))
}

struct PlotSymptomFrequency;

#[derive(Deserialize)]
struct PlotSymptomFrequencyArgs {
    limit: Option<usize>,
}

#[async_trait]
impl Tool for PlotSymptomFrequency {
    fn name(&self) -> &'static str {
        "plot_symptom_frequency"
    }
    fn description(&self) -> &'static str {
        "Bar-chart data: SYMPTOM entities ranked by how many relationship edges reference them."
    }
    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": { "limit": {"type": "integer", "default": 10} } })
    }
    async fn call(&self, ctx: &ToolContext, input: Value) -> Value {
        let args: PlotSymptomFrequencyArgs = match serde_json::from_value(input) {
            Ok(a) => a,
            Err(e) => return bad_input(e),
        };
        let limit = args.limit.unwrap_or(10);
        let symptoms = match ctx.store.entities_by_type(EntityType::Symptom, limit.max(50)) {
            Ok(s) => s,
            Err(e) => return fail(&e),
        };

        let mut points: Vec<(String, usize)> = Vec::new();
        for symptom in &symptoms {
            let count = match ctx.store.relationships_of(symptom.id) {
                Ok(edges) => edges.len(),
                Err(e) => return fail(&e),
            };
            points.push((symptom.text.clone(), count));
        }
        points.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        points.truncate(limit);

        ok(json!({
            "chart": "bar",
            "labels": points.iter().map(|p| p.0.clone()).collect::<Vec<_>>(),
            "series": [{ "name": "mentions", "values": points.iter().map(|p| p.1).collect::<Vec<_>>() }]
        }))
    }
}

struct PlotEntityDistribution;

#[async_trait]
impl Tool for PlotEntityDistribution {
    fn name(&self) -> &'static str {
        "plot_entity_distribution"
    }
    fn description(&self) -> &'static str {
        "Pie/bar-chart data: entity counts per type across the whole knowledge graph."
    }
    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }
    async fn call(&self, ctx: &ToolContext, _input: Value) -> Value {
        match kg_search::entity_statistics(&ctx.store) {
            Ok(stats) => ok(json!({
                "chart": "pie",
                "labels": stats.entities_by_type.iter().map(|(t, _)| t.clone()).collect::<Vec<_>>(),
                "series": [{ "name": "count", "values": stats.entities_by_type.iter().map(|(_, c)| *c).collect::<Vec<_>>() }]
            })),
            Err(e) => fail(&e),
        }
    }
}

struct PlotPatientTimeline;

#[derive(Deserialize)]
struct PlotPatientTimelineArgs {
    patient_id: String,
}

#[async_trait]
impl Tool for PlotPatientTimeline {
    fn name(&self) -> &'static str {
        "plot_patient_timeline"
    }
    fn description(&self) -> &'static str {
        "Timeline points for one patient: documents and radiology images ordered by date."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "patient_id": {"type": "string"} },
            "required": ["patient_id"]
        })
    }
    async fn call(&self, ctx: &ToolContext, input: Value) -> Value {
        let args: PlotPatientTimelineArgs = match serde_json::from_value(input) {
            Ok(a) => a,
            Err(e) => return bad_input(e),
        };

        let images = match ctx.store.list_images(Some(&args.patient_id), None) {
            Ok(images) => images,
            Err(e) => return fail(&e),
        };

        let mut points: Vec<Value> = images
            .into_iter()
            .map(|image| {
                json!({
                    "kind": "image",
                    "label": format!("{} ({})", image.study_id, image.view_position),
                    "at": image.created_at,
                })
            })
            .collect();
        points.sort_by(|a, b| a["at"].as_str().cmp(&b["at"].as_str()));

        ok(json!({ "chart": "timeline", "points": points }))
    }
}

struct PlotEntityNetwork;

#[derive(Deserialize)]
struct PlotEntityNetworkArgs {
    entity_id: Option<i64>,
    entity: Option<String>,
    depth: Option<u32>,
}

#[async_trait]
impl Tool for PlotEntityNetwork {
    fn name(&self) -> &'static str {
        "plot_entity_network"
    }
    fn description(&self) -> &'static str {
        "Node/edge graph data around one entity, for a network visualization (§4.5 traversal)."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "entity_id": {"type": "integer"},
                "entity": {"type": "string"},
                "depth": {"type": "integer", "default": 1, "maximum": 2}
            }
        })
    }
    async fn call(&self, ctx: &ToolContext, input: Value) -> Value {
        let args: PlotEntityNetworkArgs = match serde_json::from_value(input) {
            Ok(a) => a,
            Err(e) => return bad_input(e),
        };

        let entity_id = if let Some(id) = args.entity_id {
            id
        } else if let Some(text) = &args.entity {
            match kg_search::search(&ctx.store, &ctx.embeddings, text, 1).await {
                Ok(hits) if !hits.is_empty() => hits[0].entity.id,
                Ok(_) => return super::fail_str(format!("no entity matching {text}")),
                Err(e) => return fail(&e),
            }
        } else {
            return super::fail_str("one of entity_id or entity is required");
        };

        let subgraph = match kg_search::traverse(&ctx.store, entity_id, args.depth.unwrap_or(1).min(2)) {
            Ok(s) => s,
            Err(e) => return fail(&e),
        };

        let nodes: Vec<Value> = subgraph
            .nodes
            .iter()
            .map(|e| json!({ "id": e.id, "label": e.text, "type": e.entity_type.as_str() }))
            .collect();
        let edges: Vec<Value> = subgraph
            .edges
            .iter()
            .map(|e| json!({ "source": e.source_entity_id, "target": e.target_entity_id, "label": e.relationship_type }))
            .collect();

        ok(json!({ "chart": "network", "root": subgraph.root.id, "nodes": nodes, "edges": edges }))
    }
}

struct VisualizeGraphragResults;

#[derive(Deserialize)]
struct VisualizeGraphragResultsArgs {
    query: String,
    top_k: Option<usize>,
}

#[async_trait]
impl Tool for VisualizeGraphragResults {
    fn name(&self) -> &'static str {
        "visualize_graphrag_results"
    }
    fn description(&self) -> &'static str {
        "Hybrid search results joined with the one-hop neighborhood of any matched entities, as combined chart data."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "top_k": {"type": "integer", "default": hybrid::DEFAULT_TOP_K}
            },
            "required": ["query"]
        })
    }
    async fn call(&self, ctx: &ToolContext, input: Value) -> Value {
        let args: VisualizeGraphragResultsArgs = match serde_json::from_value(input) {
            Ok(a) => a,
            Err(e) => return bad_input(e),
        };
        let top_k = args.top_k.unwrap_or(hybrid::DEFAULT_TOP_K);

        let fused = match hybrid::hybrid_search(&ctx.store, &ctx.embeddings, &args.query, top_k).await {
            Ok(result) => result.fused,
            Err(e) => return fail(&e),
        };

        let mut nodes: Vec<Value> = Vec::new();
        let mut edges: Vec<Value> = Vec::new();
        for result in &fused {
            if !result.sources.contains(&medrag_core::fusion::Source::Kg) {
                continue;
            }
            let Ok(entity_id) = result.id.parse::<i64>() else { continue };
            let Ok(subgraph) = kg_search::traverse(&ctx.store, entity_id, 1) else { continue };
            for node in &subgraph.nodes {
                nodes.push(json!({ "id": node.id, "label": node.text, "type": node.entity_type.as_str() }));
            }
            for edge in &subgraph.edges {
                edges.push(json!({ "source": edge.source_entity_id, "target": edge.target_entity_id, "label": edge.relationship_type }));
            }
        }

        ok(json!({ "chart": "graphrag", "results": fused, "nodes": nodes, "edges": edges }))
    }
}
