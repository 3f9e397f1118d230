//! Ingestion phase 1: discovery (§4.8).
//!
//! Recursively walks the source root and yields `.dcm` files at or under
//! the MAX_FILE_SIZE_MB cap, parsing `{subject_id, study_id, image_id}`
//! from the canonical MIMIC-CXR path shape
//! `…/pXX/pXXXXXXXX/sXXXXXXXX/{image_id}.dcm`.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Files larger than this are counted and skipped rather than read (§4.8).
pub const MAX_FILE_SIZE_MB: u64 = 100;

#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub subject_id: String,
    pub study_id: String,
    pub image_id: String,
    pub file_path: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    pub files: Vec<DiscoveredFile>,
    pub skipped_large: usize,
}

/// Parse `{subject_id, study_id, image_id}` out of a MIMIC-CXR style path.
/// Falls back to `"unknown"` for either id when the expected `pXXXXXXXX`
/// folder (or its following `sXXXXXXXX` study folder) is absent, mirroring
/// the original script's behavior rather than rejecting the file outright.
pub fn parse_path_metadata(path: &Path) -> (String, String, String) {
    let components: Vec<&str> = path
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect();

    let mut subject_id = "unknown".to_string();
    let mut study_id = "unknown".to_string();

    for (i, part) in components.iter().enumerate() {
        if part.len() == 9 && part.starts_with('p') && part[1..].chars().all(|c| c.is_ascii_digit()) {
            subject_id = part.to_string();
            if let Some(next) = components.get(i + 1) {
                if next.starts_with('s') {
                    study_id = next.to_string();
                }
            }
            break;
        }
    }

    let image_id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string();

    (subject_id, study_id, image_id)
}

/// Walk `root` for `.dcm` files, honoring `limit` (if set) and the
/// [`MAX_FILE_SIZE_MB`] cap.
pub fn find_dicom_files(root: &Path, limit: Option<usize>) -> std::io::Result<DiscoveryReport> {
    let max_bytes = MAX_FILE_SIZE_MB * 1024 * 1024;
    let mut files = Vec::new();
    let mut skipped_large = 0;

    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("dcm") {
            continue;
        }
        if let Ok(metadata) = entry.metadata() {
            if metadata.len() > max_bytes {
                skipped_large += 1;
                continue;
            }
        }

        let (subject_id, study_id, image_id) = parse_path_metadata(path);
        files.push(DiscoveredFile {
            subject_id,
            study_id,
            image_id,
            file_path: path.to_path_buf(),
        });

        if let Some(limit) = limit {
            if files.len() >= limit {
                break;
            }
        }
    }

    Ok(DiscoveryReport { files, skipped_large })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_subject_and_study_from_canonical_path() {
        let path = Path::new("files/p10/p10000032/s50000001/img_a.dcm");
        let (subject, study, image) = parse_path_metadata(path);
        assert_eq!(subject, "p10000032");
        assert_eq!(study, "s50000001");
        assert_eq!(image, "img_a");
    }

    #[test]
    fn falls_back_to_unknown_when_path_shape_is_unexpected() {
        let path = Path::new("random/flat/img.dcm");
        let (subject, study, _) = parse_path_metadata(path);
        assert_eq!(subject, "unknown");
        assert_eq!(study, "unknown");
    }

    #[test]
    fn discovers_exactly_the_three_dicoms_in_the_scenario_fixture() {
        let dir = tempfile::tempdir().unwrap();
        for rel in [
            "files/p10/p10000032/s50000001/img_a.dcm",
            "files/p10/p10000032/s50000001/img_b.dcm",
            "files/p11/p11000100/s50000099/img_c.dcm",
        ] {
            let full = dir.path().join(rel);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(&full, b"fake dicom bytes").unwrap();
        }

        let report = find_dicom_files(dir.path(), None).unwrap();
        assert_eq!(report.files.len(), 3);
        let subjects: std::collections::HashSet<&str> =
            report.files.iter().map(|f| f.subject_id.as_str()).collect();
        assert_eq!(subjects, std::collections::HashSet::from(["p10000032", "p11000100"]));
    }
}
