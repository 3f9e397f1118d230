//! FHIR R4 Adapter (§4.3).
//!
//! A thin REST client over a pooled `reqwest::Client`, mirroring the
//! demo/mock downgrade shape in [`crate::embeddings::client`]: rather than
//! retrying forever, an unreachable base URL at construction time flips a
//! sticky `demo_mode` flag and every mutating call becomes a no-op
//! returning a synthetic id.

mod encounter;

pub use encounter::{match_encounter, Encounter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{MedRagError, Result};
use crate::retry::RetryPolicy;

/// FHIR R4 resource kinds this adapter reads or writes (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Patient,
    Encounter,
    ImagingStudy,
    DiagnosticReport,
    DocumentReference,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Patient => "Patient",
            ResourceKind::Encounter => "Encounter",
            ResourceKind::ImagingStudy => "ImagingStudy",
            ResourceKind::DiagnosticReport => "DiagnosticReport",
            ResourceKind::DocumentReference => "DocumentReference",
        }
    }
}

/// Inputs to [`FhirAdapter::build_imaging_study`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagingStudyData {
    pub id: String,
    pub patient_id: String,
    pub encounter_id: Option<String>,
    pub study_datetime: DateTime<Utc>,
    pub modality: String,
    pub description: String,
}

pub struct FhirAdapter {
    http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
    demo_mode: std::sync::atomic::AtomicBool,
}

impl FhirAdapter {
    /// Construct against `base_url`, probing reachability once. An
    /// unreachable server at construction enters demo mode immediately
    /// rather than failing startup — FHIR materialization is an optional
    /// enrichment, not a hard dependency of the retrieval path.
    pub async fn connect(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let http = reqwest::Client::new();
        let reachable = http
            .get(format!("{}/metadata", base_url.trim_end_matches('/')))
            .send()
            .await
            .map(|r| r.status().is_success() || r.status().is_client_error())
            .unwrap_or(false);

        if !reachable {
            tracing::warn!(base_url, "FHIR server unreachable at construction, entering demo mode");
        }

        Self {
            http,
            base_url,
            retry: RetryPolicy::fhir(),
            demo_mode: std::sync::atomic::AtomicBool::new(!reachable),
        }
    }

    /// Construct directly in demo mode, for tests and offline CLI use.
    pub fn demo(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            retry: RetryPolicy::fhir(),
            demo_mode: std::sync::atomic::AtomicBool::new(true),
        }
    }

    pub fn demo_mode(&self) -> bool {
        self.demo_mode.load(std::sync::atomic::Ordering::Relaxed)
    }

    fn enter_demo_mode(&self, reason: &str) {
        tracing::warn!(reason, "FHIR dependency unavailable, entering demo mode");
        self.demo_mode.store(true, std::sync::atomic::Ordering::Relaxed);
    }

    /// `get(id)` — fetch one resource by id, or `None` if absent.
    pub async fn get(&self, kind: ResourceKind, id: &str) -> Result<Option<Value>> {
        if self.demo_mode() {
            return Ok(None);
        }
        let url = format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            kind.as_str(),
            id
        );
        let result = self
            .retry
            .run(|| async {
                let response = self.http.get(&url).send().await?;
                if response.status() == reqwest::StatusCode::NOT_FOUND {
                    return Ok(None);
                }
                if !response.status().is_success() {
                    return Err(MedRagError::DependencyUnavailable(format!(
                        "FHIR server returned {}",
                        response.status()
                    )));
                }
                Ok(Some(response.json::<Value>().await?))
            })
            .await;

        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                self.enter_demo_mode(&err.to_string());
                Ok(None)
            }
        }
    }

    /// Search resources with structured params, e.g. `patient=123`.
    pub async fn search(&self, kind: ResourceKind, params: &[(&str, &str)]) -> Result<Vec<Value>> {
        if self.demo_mode() {
            return Ok(Vec::new());
        }
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), kind.as_str());
        let result = self
            .retry
            .run(|| async {
                let response = self.http.get(&url).query(params).send().await?;
                if !response.status().is_success() {
                    return Err(MedRagError::DependencyUnavailable(format!(
                        "FHIR server returned {}",
                        response.status()
                    )));
                }
                let bundle: Value = response.json().await?;
                Ok(bundle["entry"]
                    .as_array()
                    .map(|entries| entries.iter().map(|e| e["resource"].clone()).collect())
                    .unwrap_or_default())
            })
            .await;

        match result {
            Ok(resources) => Ok(resources),
            Err(err) => {
                self.enter_demo_mode(&err.to_string());
                Ok(Vec::new())
            }
        }
    }

    /// `put(resource)` — idempotent create-or-replace by client-assigned
    /// id (§4.3, §6). In demo mode returns the id unchanged without an
    /// HTTP call, so ingestion can proceed against a missing FHIR server.
    pub async fn put(&self, kind: ResourceKind, id: &str, resource: &Value) -> Result<String> {
        if self.demo_mode() {
            return Ok(id.to_string());
        }
        let url = format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            kind.as_str(),
            id
        );
        let result = self
            .retry
            .run(|| async {
                let response = self.http.put(&url).json(resource).send().await?;
                if !response.status().is_success() {
                    return Err(MedRagError::DependencyUnavailable(format!(
                        "FHIR server returned {}",
                        response.status()
                    )));
                }
                Ok(())
            })
            .await;

        match result {
            Ok(()) => Ok(id.to_string()),
            Err(err) => {
                self.enter_demo_mode(&err.to_string());
                Ok(id.to_string())
            }
        }
    }

    /// Assemble a minimal `ImagingStudy` referencing Patient and,
    /// when known, Encounter (§4.3).
    pub fn build_imaging_study(&self, data: &ImagingStudyData) -> Value {
        let mut resource = json!({
            "resourceType": "ImagingStudy",
            "id": data.id,
            "status": "available",
            "subject": { "reference": format!("Patient/{}", data.patient_id) },
            "started": data.study_datetime.to_rfc3339(),
            "modality": [{ "code": data.modality }],
            "description": data.description,
        });
        if let Some(encounter_id) = &data.encounter_id {
            resource["encounter"] = json!({ "reference": format!("Encounter/{encounter_id}") });
        }
        resource
    }

    /// `build_imaging_study` + `put`, skipping recreation of an existing
    /// ImagingStudy by id (idempotent, §4.8 phase 5).
    pub async fn materialize_imaging_study(&self, data: &ImagingStudyData) -> Result<String> {
        if self.get(ResourceKind::ImagingStudy, &data.id).await?.is_some() {
            return Ok(data.id.clone());
        }
        let resource = self.build_imaging_study(data);
        self.put(ResourceKind::ImagingStudy, &data.id, &resource).await
    }

    /// Fetch and parse the Encounters for a patient, for encounter
    /// matching (§4.3).
    pub async fn encounters_for_patient(&self, patient_id: &str) -> Result<Vec<Encounter>> {
        let resources = self
            .search(ResourceKind::Encounter, &[("patient", patient_id)])
            .await?;
        Ok(resources.iter().filter_map(Encounter::from_fhir).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_adapter_put_is_a_noop_returning_the_same_id() {
        let adapter = FhirAdapter::demo("http://example.invalid");
        assert!(adapter.demo_mode());
    }

    #[tokio::test]
    async fn demo_adapter_get_returns_none() {
        let adapter = FhirAdapter::demo("http://example.invalid");
        let resource = adapter.get(ResourceKind::Patient, "1").await.unwrap();
        assert!(resource.is_none());
    }

    #[tokio::test]
    async fn demo_adapter_put_returns_requested_id_without_network() {
        let adapter = FhirAdapter::demo("http://example.invalid");
        let data = ImagingStudyData {
            id: "study-1".to_string(),
            patient_id: "patient-1".to_string(),
            encounter_id: None,
            study_datetime: Utc::now(),
            modality: "CR".to_string(),
            description: "Chest X-ray".to_string(),
        };
        let id = adapter.materialize_imaging_study(&data).await.unwrap();
        assert_eq!(id, "study-1");
    }

    #[test]
    fn build_imaging_study_includes_encounter_when_known() {
        let adapter = FhirAdapter::demo("http://example.invalid");
        let data = ImagingStudyData {
            id: "study-1".to_string(),
            patient_id: "patient-1".to_string(),
            encounter_id: Some("encounter-1".to_string()),
            study_datetime: Utc::now(),
            modality: "CR".to_string(),
            description: "Chest X-ray PA view".to_string(),
        };
        let resource = adapter.build_imaging_study(&data);
        assert_eq!(resource["encounter"]["reference"], "Encounter/encounter-1");
    }
}
