//! Encounter window matching (§4.3) — the one nontrivial FHIR algorithm.

use chrono::{DateTime, Utc};
use serde_json::Value;

/// A FHIR `Encounter`, reduced to the fields encounter matching needs.
#[derive(Debug, Clone)]
pub struct Encounter {
    pub id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Encounter {
    pub fn from_fhir(resource: &Value) -> Option<Self> {
        let id = resource["id"].as_str()?.to_string();
        let start = resource["period"]["start"]
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc))?;
        let end = resource["period"]["end"]
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or(start);
        Some(Self { id, start, end })
    }

    fn midpoint(&self) -> DateTime<Utc> {
        self.start + (self.end - self.start) / 2
    }
}

/// Given `study_datetime` and a list of a patient's encounters, find the
/// one whose `[start, end]` interval intersects
/// `[study_datetime - window_hours, study_datetime + window_hours]`.
/// Ties break on smallest absolute midpoint distance to `study_datetime`,
/// then lowest lexicographic id (§4.3).
pub fn match_encounter(
    encounters: &[Encounter],
    study_datetime: DateTime<Utc>,
    window_hours: i64,
) -> Option<String> {
    let window = chrono::Duration::hours(window_hours);
    let window_start = study_datetime - window;
    let window_end = study_datetime + window;

    let mut candidates: Vec<&Encounter> = encounters
        .iter()
        .filter(|e| e.start <= window_end && e.end >= window_start)
        .collect();

    candidates.sort_by(|a, b| {
        let distance_a = (a.midpoint() - study_datetime).num_seconds().abs();
        let distance_b = (b.midpoint() - study_datetime).num_seconds().abs();
        distance_a.cmp(&distance_b).then_with(|| a.id.cmp(&b.id))
    });

    candidates.first().map(|e| e.id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encounter(id: &str, midpoint_hours_after: i64) -> Encounter {
        let study = DateTime::parse_from_rfc3339("2020-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let midpoint = study + chrono::Duration::hours(midpoint_hours_after);
        Encounter {
            id: id.to_string(),
            start: midpoint - chrono::Duration::minutes(30),
            end: midpoint + chrono::Duration::minutes(30),
        }
    }

    #[test]
    fn chooses_the_encounter_within_the_24_hour_window() {
        let study_datetime = DateTime::parse_from_rfc3339("2020-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let encounters = vec![encounter("e-12h", 12), encounter("e-30h", 30)];

        let matched = match_encounter(&encounters, study_datetime, 24);
        assert_eq!(matched, Some("e-12h".to_string()));
    }

    #[test]
    fn returns_none_when_no_encounter_falls_in_window() {
        let study_datetime = DateTime::parse_from_rfc3339("2020-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let encounters = vec![encounter("e-25h", 25)];

        let matched = match_encounter(&encounters, study_datetime, 24);
        assert_eq!(matched, None);
    }

    #[test]
    fn ties_break_on_lowest_lexicographic_id() {
        let study_datetime = DateTime::parse_from_rfc3339("2020-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let encounters = vec![encounter("z-encounter", 5), encounter("a-encounter", 5)];

        let matched = match_encounter(&encounters, study_datetime, 24);
        assert_eq!(matched, Some("a-encounter".to_string()));
    }
}
