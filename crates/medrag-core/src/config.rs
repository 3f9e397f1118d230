//! Configuration
//!
//! Loaded once at startup from the process environment, optionally layered
//! over a TOML file at `CONFIG_PATH` (§2.1, §6). Nothing downstream reads
//! `std::env` directly; every adapter takes a `&Config` or a narrower view
//! of one.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{MedRagError, Result};

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_var(key).unwrap_or_else(|| default.to_string())
}

/// Connection details for the IRIS FHIR-backed data store.
#[derive(Debug, Clone, Deserialize)]
pub struct IrisConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub namespace: String,
}

impl Default for IrisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1972,
            username: "_SYSTEM".to_string(),
            password: String::new(),
            namespace: "FHIR".to_string(),
        }
    }
}

/// Top-level process configuration. Construct with [`Config::load`].
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub iris: IrisConfig,
    pub fhir_base_url: String,
    pub embedding_url: String,
    pub llm_url: String,
    #[serde(default)]
    pub llm_api_key: Option<String>,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "medrag", "medrag")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./data"))
}

fn default_http_port() -> u16 {
    8787
}

impl Config {
    /// Load from the environment (`§6`), overriding defaults in file order:
    /// built-in defaults, then `CONFIG_PATH` if set and readable, then
    /// environment variables (which always win).
    ///
    /// Never panics: a missing `FHIR_BASE_URL`/`EMBEDDING_URL`/`LLM_URL`
    /// produces a `ConfigurationError`, not an `unwrap`.
    pub fn load() -> Result<Self> {
        let mut config = if let Some(path) = env_var("CONFIG_PATH") {
            let raw = std::fs::read_to_string(&path).map_err(|e| {
                MedRagError::ConfigurationError(format!("cannot read {path}: {e}"))
            })?;
            toml::from_str(&raw)
                .map_err(|e| MedRagError::ConfigurationError(format!("invalid {path}: {e}")))?
        } else {
            Self::from_env_only()?
        };

        if let Some(dir) = env_var("MEDRAG_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(port) = env_var("MEDRAG_HTTP_PORT") {
            config.http_port = port
                .parse()
                .map_err(|_| MedRagError::ConfigurationError(format!("MEDRAG_HTTP_PORT={port} is not a valid port")))?;
        }

        Ok(config)
    }

    fn from_env_only() -> Result<Self> {
        let require = |key: &str| -> Result<String> {
            env_var(key)
                .ok_or_else(|| MedRagError::ConfigurationError(format!("missing required {key}")))
        };

        Ok(Config {
            iris: IrisConfig {
                host: env_or("IRIS_HOST", "localhost"),
                port: env_var("IRIS_PORT")
                    .map(|p| p.parse())
                    .transpose()
                    .map_err(|_| MedRagError::ConfigurationError("IRIS_PORT is not a number".into()))?
                    .unwrap_or(1972),
                username: env_or("IRIS_USERNAME", "_SYSTEM"),
                password: env_or("IRIS_PASSWORD", ""),
                namespace: env_or("IRIS_NAMESPACE", "FHIR"),
            },
            fhir_base_url: require("FHIR_BASE_URL")?,
            embedding_url: require("EMBEDDING_URL")?,
            llm_url: require("LLM_URL")?,
            llm_api_key: env_var("LLM_API_KEY"),
            data_dir: default_data_dir(),
            http_port: default_http_port(),
        })
    }

    /// A configuration usable without any external dependency running, for
    /// demo mode and tests: in-memory store, no FHIR server, no LLM.
    pub fn demo(data_dir: PathBuf) -> Self {
        Config {
            iris: IrisConfig::default(),
            fhir_base_url: "http://localhost:0".to_string(),
            embedding_url: "http://localhost:0".to_string(),
            llm_url: "http://localhost:0".to_string(),
            llm_api_key: None,
            data_dir,
            http_port: default_http_port(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_config_has_no_required_dependency_fields_unset() {
        let cfg = Config::demo(PathBuf::from("/tmp/medrag-test"));
        assert_eq!(cfg.iris.namespace, "FHIR");
        assert_eq!(cfg.http_port, 8787);
    }
}
