//! DICOM header reading, abstracted behind [`MetadataReader`] (§4.8, §9
//! Design Notes): the default implementation parses the minimal explicit-VR
//! tag set this pipeline needs; tests inject a [`FixtureMetadataReader`]
//! instead of shipping real DICOM fixtures.

use std::path::Path;

use crate::error::{MedRagError, Result};

/// The subset of a DICOM header this pipeline actually needs (§4.8 phase 3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DicomMetadata {
    pub view_position: String,
    pub modality: String,
    pub study_date: Option<String>,
}

impl Default for DicomMetadata {
    fn default() -> Self {
        Self {
            view_position: "UNKNOWN".to_string(),
            modality: "CR".to_string(),
            study_date: None,
        }
    }
}

/// Abstracts DICOM header reading so the pipeline can be tested without a
/// real DICOM file on disk.
pub trait MetadataReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<DicomMetadata>;
}

const TAG_STUDY_DATE: (u16, u16) = (0x0008, 0x0020);
const TAG_MODALITY: (u16, u16) = (0x0008, 0x0060);
const TAG_VIEW_POSITION: (u16, u16) = (0x0018, 0x5101);
const TAG_PIXEL_DATA: (u16, u16) = (0x7FE0, 0x0010);
const DICOM_PREAMBLE_LEN: usize = 132;

/// Parses the minimal explicit-VR little-endian tag set this pipeline
/// needs directly out of the file bytes, stopping before pixel data —
/// equivalent in intent to the original's `pydicom.dcmread(...,
/// stop_before_pixels=True)`, without a DICOM crate dependency (none
/// exists in this project's ecosystem).
pub struct DefaultMetadataReader;

impl MetadataReader for DefaultMetadataReader {
    fn read(&self, path: &Path) -> Result<DicomMetadata> {
        let bytes = std::fs::read(path)?;
        parse_minimal_tags(&bytes)
    }
}

fn parse_minimal_tags(bytes: &[u8]) -> Result<DicomMetadata> {
    if bytes.len() < DICOM_PREAMBLE_LEN || &bytes[128..132] != b"DICM" {
        return Err(MedRagError::DataError("not a DICOM file (missing DICM magic)".into()));
    }

    let mut metadata = DicomMetadata::default();
    let mut offset = DICOM_PREAMBLE_LEN;

    while offset + 8 <= bytes.len() {
        let group = u16::from_le_bytes([bytes[offset], bytes[offset + 1]]);
        let element = u16::from_le_bytes([bytes[offset + 2], bytes[offset + 3]]);
        let vr = &bytes[offset + 4..offset + 6];
        let vr_str = std::str::from_utf8(vr).unwrap_or("");

        let (value_len, header_len): (usize, usize) = if matches!(
            vr_str,
            "OB" | "OW" | "OF" | "SQ" | "UT" | "UN"
        ) {
            if offset + 12 > bytes.len() {
                break;
            }
            let len = u32::from_le_bytes([
                bytes[offset + 8],
                bytes[offset + 9],
                bytes[offset + 10],
                bytes[offset + 11],
            ]) as usize;
            (len, 12)
        } else {
            let len = u16::from_le_bytes([bytes[offset + 6], bytes[offset + 7]]) as usize;
            (len, 8)
        };

        if (group, element) == TAG_PIXEL_DATA {
            break;
        }

        let value_start = offset + header_len;
        let value_end = value_start.saturating_add(value_len);
        if value_end > bytes.len() {
            break;
        }
        let raw_value = &bytes[value_start..value_end];
        let text_value = String::from_utf8_lossy(raw_value).trim().trim_end_matches('\0').to_string();

        match (group, element) {
            TAG_STUDY_DATE if !text_value.is_empty() => metadata.study_date = Some(text_value),
            TAG_MODALITY if !text_value.is_empty() => metadata.modality = text_value,
            TAG_VIEW_POSITION if !text_value.is_empty() => metadata.view_position = text_value,
            _ => {}
        }

        offset = value_end;
    }

    Ok(metadata)
}

/// A deterministic in-memory reader for tests, keyed by path. Exported
/// (not `#[cfg(test)]`-gated) so the workspace's end-to-end test crate can
/// drive the pipeline without real DICOM fixtures on disk.
pub struct FixtureMetadataReader {
    pub fixtures: std::collections::HashMap<std::path::PathBuf, DicomMetadata>,
}

impl MetadataReader for FixtureMetadataReader {
    fn read(&self, path: &Path) -> Result<DicomMetadata> {
        self.fixtures
            .get(path)
            .cloned()
            .ok_or_else(|| MedRagError::DataError(format!("no fixture registered for {path:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_dicom_bytes(view_position: &str, modality: &str, study_date: &str) -> Vec<u8> {
        let mut bytes = vec![0u8; 128];
        bytes.extend_from_slice(b"DICM");

        fn push_element(bytes: &mut Vec<u8>, group: u16, element: u16, vr: &str, value: &str) {
            bytes.extend_from_slice(&group.to_le_bytes());
            bytes.extend_from_slice(&element.to_le_bytes());
            bytes.extend_from_slice(vr.as_bytes());
            let mut padded = value.as_bytes().to_vec();
            if padded.len() % 2 != 0 {
                padded.push(b' ');
            }
            bytes.extend_from_slice(&(padded.len() as u16).to_le_bytes());
            bytes.extend_from_slice(&padded);
        }

        push_element(&mut bytes, 0x0008, 0x0020, "DA", study_date);
        push_element(&mut bytes, 0x0008, 0x0060, "CS", modality);
        push_element(&mut bytes, 0x0018, 0x5101, "CS", view_position);
        bytes
    }

    #[test]
    fn parses_view_position_modality_and_study_date() {
        let bytes = minimal_dicom_bytes("PA", "CR", "20200101");
        let metadata = parse_minimal_tags(&bytes).unwrap();
        assert_eq!(metadata.view_position, "PA");
        assert_eq!(metadata.modality, "CR");
        assert_eq!(metadata.study_date, Some("20200101".to_string()));
    }

    #[test]
    fn rejects_files_missing_the_dicm_magic() {
        let err = parse_minimal_tags(b"not a dicom file").unwrap_err();
        assert_eq!(err.kind(), "data_error");
    }

    #[test]
    fn fixture_reader_returns_registered_metadata() {
        let mut fixtures = std::collections::HashMap::new();
        fixtures.insert(
            std::path::PathBuf::from("img_a.dcm"),
            DicomMetadata {
                view_position: "AP".to_string(),
                modality: "CR".to_string(),
                study_date: Some("20200101".to_string()),
            },
        );
        let reader = FixtureMetadataReader { fixtures };
        let metadata = reader.read(Path::new("img_a.dcm")).unwrap();
        assert_eq!(metadata.view_position, "AP");
    }
}
