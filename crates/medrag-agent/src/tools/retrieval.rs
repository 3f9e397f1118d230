//! Retrieval tools (§4.9): the 13 tools wrapping the three retrieval
//! services, hybrid fusion, and the knowledge-graph/imaging read paths in
//! [`medrag_core::store`].

use async_trait::async_trait;
use medrag_core::fhir::ResourceKind;
use medrag_core::retrieval::{
    fhir_search, hybrid, image_search, kg_search, DocumentSearchFilters, ImageQuery,
    ImageSearchFilters,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{fail, ok, ok_with_mode, Tool, ToolContext, ToolRegistry};

pub fn register_all(registry: &mut ToolRegistry) {
    registry.register(std::sync::Arc::new(SearchFhirDocuments));
    registry.register(std::sync::Arc::new(SearchKnowledgeGraph));
    registry.register(std::sync::Arc::new(HybridSearch));
    registry.register(std::sync::Arc::new(GetDocumentDetails));
    registry.register(std::sync::Arc::new(SearchMedicalImages));
    registry.register(std::sync::Arc::new(GetPatientImagingStudies));
    registry.register(std::sync::Arc::new(GetImagingStudyDetails));
    registry.register(std::sync::Arc::new(GetRadiologyReports));
    registry.register(std::sync::Arc::new(SearchPatientsWithImaging));
    registry.register(std::sync::Arc::new(GetEncounterImaging));
    registry.register(std::sync::Arc::new(ListRadiologyQueries));
    registry.register(std::sync::Arc::new(GetEntityStatistics));
    registry.register(std::sync::Arc::new(GetEntityRelationships));
}

fn bad_input(err: serde_json::Error) -> Value {
    super::fail_str(format!("invalid tool input: {err}"))
}

struct SearchFhirDocuments;

#[derive(Deserialize)]
struct SearchFhirDocumentsArgs {
    query: String,
    top_k: Option<usize>,
    patient_id: Option<String>,
}

#[async_trait]
impl Tool for SearchFhirDocuments {
    fn name(&self) -> &'static str {
        "search_fhir_documents"
    }
    fn description(&self) -> &'static str {
        "Dense/lexical search over FHIR clinical documents (§4.4)."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "top_k": {"type": "integer", "default": fhir_search::DEFAULT_TOP_K},
                "patient_id": {"type": "string"}
            },
            "required": ["query"]
        })
    }
    async fn call(&self, ctx: &ToolContext, input: Value) -> Value {
        let args: SearchFhirDocumentsArgs = match serde_json::from_value(input) {
            Ok(a) => a,
            Err(e) => return bad_input(e),
        };
        let filters = DocumentSearchFilters { patient_id: args.patient_id.as_deref() };
        match fhir_search::search(
            &ctx.store,
            &ctx.embeddings,
            &args.query,
            args.top_k.unwrap_or(fhir_search::DEFAULT_TOP_K),
            filters,
        )
        .await
        {
            Ok(result) => ok_with_mode(
                json!({ "hits": result.hits }),
                Some(result.search_mode.as_str()),
                result.fallback_reason.as_deref(),
            ),
            Err(e) => fail(&e),
        }
    }
}

struct SearchKnowledgeGraph;

#[derive(Deserialize)]
struct SearchKnowledgeGraphArgs {
    query: String,
    limit: Option<usize>,
}

#[async_trait]
impl Tool for SearchKnowledgeGraph {
    fn name(&self) -> &'static str {
        "search_knowledge_graph"
    }
    fn description(&self) -> &'static str {
        "Search knowledge-graph entities (conditions, symptoms, medications, anatomy, procedures) by text (§4.5)."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "limit": {"type": "integer", "default": kg_search::DEFAULT_LIMIT}
            },
            "required": ["query"]
        })
    }
    async fn call(&self, ctx: &ToolContext, input: Value) -> Value {
        let args: SearchKnowledgeGraphArgs = match serde_json::from_value(input) {
            Ok(a) => a,
            Err(e) => return bad_input(e),
        };
        match kg_search::search(&ctx.store, &ctx.embeddings, &args.query, args.limit.unwrap_or(kg_search::DEFAULT_LIMIT)).await {
            Ok(hits) => ok(json!({ "entities": hits })),
            Err(e) => fail(&e),
        }
    }
}

struct HybridSearch;

#[derive(Deserialize)]
struct HybridSearchArgs {
    query: String,
    top_k: Option<usize>,
}

#[async_trait]
impl Tool for HybridSearch {
    fn name(&self) -> &'static str {
        "hybrid_search"
    }
    fn description(&self) -> &'static str {
        "Reciprocal-rank fusion of FHIR document search and knowledge-graph search (§4.7)."
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
        let args: HybridSearchArgs = match serde_json::from_value(input) {
            Ok(a) => a,
            Err(e) => return bad_input(e),
        };
        match hybrid::hybrid_search(&ctx.store, &ctx.embeddings, &args.query, args.top_k.unwrap_or(hybrid::DEFAULT_TOP_K)).await {
            Ok(result) => ok(json!({ "results": result.fused })),
            Err(e) => fail(&e),
        }
    }
}

struct GetDocumentDetails;

#[derive(Deserialize)]
struct GetDocumentDetailsArgs {
    document_id: String,
}

#[async_trait]
impl Tool for GetDocumentDetails {
    fn name(&self) -> &'static str {
        "get_document_details"
    }
    fn description(&self) -> &'static str {
        "Fetch one FHIR clinical document by id."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "document_id": {"type": "string"} },
            "required": ["document_id"]
        })
    }
    async fn call(&self, ctx: &ToolContext, input: Value) -> Value {
        let args: GetDocumentDetailsArgs = match serde_json::from_value(input) {
            Ok(a) => a,
            Err(e) => return bad_input(e),
        };
        match ctx.store.get_document(&args.document_id) {
            Ok(Some(document)) => ok(json!({ "document": document })),
            Ok(None) => super::fail_str(format!("no document with id {}", args.document_id)),
            Err(e) => fail(&e),
        }
    }
}

struct SearchMedicalImages;

#[derive(Deserialize)]
struct SearchMedicalImagesArgs {
    query: String,
    top_k: Option<usize>,
    patient_id: Option<String>,
    view_position: Option<String>,
}

#[async_trait]
impl Tool for SearchMedicalImages {
    fn name(&self) -> &'static str {
        "search_medical_images"
    }
    fn description(&self) -> &'static str {
        "Dense-vector similarity search over radiology images (§4.6)."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "top_k": {"type": "integer", "default": image_search::DEFAULT_TOP_K},
                "patient_id": {"type": "string"},
                "view_position": {"type": "string"}
            },
            "required": ["query"]
        })
    }
    async fn call(&self, ctx: &ToolContext, input: Value) -> Value {
        let args: SearchMedicalImagesArgs = match serde_json::from_value(input) {
            Ok(a) => a,
            Err(e) => return bad_input(e),
        };
        let filters = ImageSearchFilters {
            subject_id: args.patient_id.as_deref(),
            view_position: args.view_position.as_deref(),
        };
        match image_search::search(
            &ctx.store,
            &ctx.embeddings,
            ImageQuery::Text(&args.query),
            args.top_k.unwrap_or(image_search::DEFAULT_TOP_K),
            filters,
        )
        .await
        {
            Ok(hits) => ok(json!({ "images": hits })),
            Err(e) => fail(&e),
        }
    }
}

struct GetPatientImagingStudies;

#[derive(Deserialize)]
struct GetPatientImagingStudiesArgs {
    subject_id: String,
}

#[async_trait]
impl Tool for GetPatientImagingStudies {
    fn name(&self) -> &'static str {
        "get_patient_imaging_studies"
    }
    fn description(&self) -> &'static str {
        "List every radiology image on file for one patient's MIMIC subject id."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "subject_id": {"type": "string"} },
            "required": ["subject_id"]
        })
    }
    async fn call(&self, ctx: &ToolContext, input: Value) -> Value {
        let args: GetPatientImagingStudiesArgs = match serde_json::from_value(input) {
            Ok(a) => a,
            Err(e) => return bad_input(e),
        };
        match ctx.store.list_images(Some(&args.subject_id), None) {
            Ok(images) => ok(json!({ "images": images })),
            Err(e) => fail(&e),
        }
    }
}

struct GetImagingStudyDetails;

#[derive(Deserialize)]
struct GetImagingStudyDetailsArgs {
    study_id: String,
}

#[async_trait]
impl Tool for GetImagingStudyDetails {
    fn name(&self) -> &'static str {
        "get_imaging_study_details"
    }
    fn description(&self) -> &'static str {
        "List every image belonging to one radiology study id."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "study_id": {"type": "string"} },
            "required": ["study_id"]
        })
    }
    async fn call(&self, ctx: &ToolContext, input: Value) -> Value {
        let args: GetImagingStudyDetailsArgs = match serde_json::from_value(input) {
            Ok(a) => a,
            Err(e) => return bad_input(e),
        };
        match ctx.store.list_images(None, Some(&args.study_id)) {
            Ok(images) if images.is_empty() => {
                super::fail_str(format!("no images for study {}", args.study_id))
            }
            Ok(images) => ok(json!({ "images": images })),
            Err(e) => fail(&e),
        }
    }
}

struct GetRadiologyReports;

#[derive(Deserialize)]
struct GetRadiologyReportsArgs {
    patient_id: Option<String>,
    limit: Option<usize>,
}

#[async_trait]
impl Tool for GetRadiologyReports {
    fn name(&self) -> &'static str {
        "get_radiology_reports"
    }
    fn description(&self) -> &'static str {
        "FHIR DiagnosticReport documents, the radiology report half of the document store."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "patient_id": {"type": "string"},
                "limit": {"type": "integer", "default": 10}
            }
        })
    }
    async fn call(&self, ctx: &ToolContext, input: Value) -> Value {
        let args: GetRadiologyReportsArgs = match serde_json::from_value(input) {
            Ok(a) => a,
            Err(e) => return bad_input(e),
        };
        match ctx.store.documents_by_resource_kind(
            ResourceKind::DiagnosticReport.as_str(),
            args.patient_id.as_deref(),
            args.limit.unwrap_or(10),
        ) {
            Ok(documents) => ok(json!({ "reports": documents })),
            Err(e) => fail(&e),
        }
    }
}

struct SearchPatientsWithImaging;

#[derive(Deserialize)]
struct SearchPatientsWithImagingArgs {
    query: Option<String>,
}

#[async_trait]
impl Tool for SearchPatientsWithImaging {
    fn name(&self) -> &'static str {
        "search_patients_with_imaging"
    }
    fn description(&self) -> &'static str {
        "List mapped patients that have at least one radiology image, optionally filtered by name."
    }
    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": { "query": {"type": "string"} } })
    }
    async fn call(&self, ctx: &ToolContext, input: Value) -> Value {
        let args: SearchPatientsWithImagingArgs = match serde_json::from_value(input) {
            Ok(a) => a,
            Err(e) => return bad_input(e),
        };
        match ctx.store.patients_with_imaging(args.query.as_deref()) {
            Ok(patients) => ok(json!({ "patients": patients })),
            Err(e) => fail(&e),
        }
    }
}

struct GetEncounterImaging;

#[derive(Deserialize)]
struct GetEncounterImagingArgs {
    encounter_id: String,
}

#[async_trait]
impl Tool for GetEncounterImaging {
    fn name(&self) -> &'static str {
        "get_encounter_imaging"
    }
    fn description(&self) -> &'static str {
        "Images attached to a FHIR encounter, resolved through the encounter's ImagingStudy resources."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "encounter_id": {"type": "string"} },
            "required": ["encounter_id"]
        })
    }
    async fn call(&self, ctx: &ToolContext, input: Value) -> Value {
        let args: GetEncounterImagingArgs = match serde_json::from_value(input) {
            Ok(a) => a,
            Err(e) => return bad_input(e),
        };
        let Some(fhir) = &ctx.fhir else {
            return super::fail_str("FHIR adapter not configured");
        };
        let studies = match fhir
            .search(ResourceKind::ImagingStudy, &[("encounter", &args.encounter_id)])
            .await
        {
            Ok(studies) => studies,
            Err(e) => return fail(&e),
        };
        let mut images = Vec::new();
        for study in &studies {
            let Some(id) = study["id"].as_str() else { continue };
            match ctx.store.images_by_fhir_resource_id(id) {
                Ok(hits) => images.extend(hits),
                Err(e) => return fail(&e),
            }
        }
        ok(json!({ "images": images }))
    }
}

struct ListRadiologyQueries;

#[async_trait]
impl Tool for ListRadiologyQueries {
    fn name(&self) -> &'static str {
        "list_radiology_queries"
    }
    fn description(&self) -> &'static str {
        "Example natural-language queries this assistant can answer about radiology imaging."
    }
    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }
    async fn call(&self, _ctx: &ToolContext, _input: Value) -> Value {
        ok(json!({
            "queries": [
                "Show me chest X-rays of pneumonia",
                "What imaging studies does this patient have?",
                "Find patients with prior cardiomegaly imaging",
                "Get the radiology report for the most recent study",
                "What view positions are available for this study?",
            ]
        }))
    }
}

struct GetEntityStatistics;

#[async_trait]
impl Tool for GetEntityStatistics {
    fn name(&self) -> &'static str {
        "get_entity_statistics"
    }
    fn description(&self) -> &'static str {
        "Per-type entity counts and total relationship count in the knowledge graph (§4.5)."
    }
    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }
    async fn call(&self, ctx: &ToolContext, _input: Value) -> Value {
        match kg_search::entity_statistics(&ctx.store) {
            Ok(stats) => ok(json!(stats)),
            Err(e) => fail(&e),
        }
    }
}

struct GetEntityRelationships;

#[derive(Deserialize)]
struct GetEntityRelationshipsArgs {
    entity_id: Option<i64>,
    entity: Option<String>,
    depth: Option<u32>,
}

#[async_trait]
impl Tool for GetEntityRelationships {
    fn name(&self) -> &'static str {
        "get_entity_relationships"
    }
    fn description(&self) -> &'static str {
        "Outgoing/incoming relationship edges of one entity, by id or by text (§4.5)."
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
        let args: GetEntityRelationshipsArgs = match serde_json::from_value(input) {
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

        let relationships = match kg_search::relationships_of(&ctx.store, entity_id) {
            Ok(r) => r,
            Err(e) => return fail(&e),
        };
        let subgraph = match kg_search::traverse(&ctx.store, entity_id, args.depth.unwrap_or(1).min(2)) {
            Ok(s) => s,
            Err(e) => return fail(&e),
        };
        ok(json!({ "relationships": relationships, "subgraph": subgraph }))
    }
}
