//! Collection and environment configuration

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::errors::ApipulseError;
use crate::models::request::RequestDef;

/// Maximum collection/environment file size (1 MB) - prevents OOM from
/// malicious files. YAML/JSON parsers can expand memory 10-20x, so limit
/// input size.
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Which backend executes a collection by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// In-process sequential runner
    #[default]
    Native,
    /// Gherkin conversion + job queue + external worker pool
    Remote,
}

/// Where an API key credential is injected
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    #[default]
    Header,
    Query,
}

fn default_api_key_name() -> String {
    "X-API-Key".to_string()
}

/// Authentication configuration, shared by collections and environments.
///
/// Credential values may contain `{{variable}}` templates; they are resolved
/// against the run context before the header/param is built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "config", rename_all = "snake_case")]
pub enum AuthConfig {
    Bearer {
        #[serde(default)]
        token: String,
    },
    Basic {
        #[serde(default)]
        username: String,
        #[serde(default)]
        password: String,
    },
    ApiKey {
        /// Header or query parameter name
        #[serde(default = "default_api_key_name")]
        key: String,
        #[serde(default)]
        value: String,
        #[serde(default, rename = "in")]
        location: ApiKeyLocation,
    },
    /// No authentication; also the landing spot for unrecognized types
    #[serde(other)]
    None,
}

/// A named, ordered group of requests sharing base configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Base URL prepended to relative request paths
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_config: Option<AuthConfig>,

    /// Collection-level variables; rows may be raw values or `{value: ...}`
    /// records
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub variables: IndexMap<String, JsonValue>,

    /// Headers applied to every request unless overridden
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub default_headers: IndexMap<String, String>,

    #[serde(default)]
    pub default_engine: EngineKind,
}

/// A named override set applied on top of a collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Overrides the collection base_url when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Overrides the collection auth_config when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_config: Option<AuthConfig>,

    /// Lowest-precedence variable source (see context precedence)
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub variables: IndexMap<String, JsonValue>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub default_headers: IndexMap<String, String>,

    /// At most one default environment per collection; enforced by the caller
    #[serde(default)]
    pub is_default: bool,
}

/// On-disk collection document: the collection settings plus its requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionFile {
    #[serde(flatten)]
    pub collection: CollectionConfig,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requests: Vec<RequestDef>,
}

fn read_sized(path: &Path) -> Result<String, ApipulseError> {
    let metadata = fs::metadata(path).map_err(ApipulseError::Io)?;

    let file_size = metadata.len();
    if file_size > MAX_CONFIG_FILE_SIZE {
        return Err(ApipulseError::Argument(format!(
            "File too large: {} bytes (max {} bytes)",
            file_size, MAX_CONFIG_FILE_SIZE
        )));
    }

    fs::read_to_string(path).map_err(ApipulseError::Io)
}

fn parse_by_extension<T: serde::de::DeserializeOwned>(
    path: &Path,
    content: &str,
    what: &str,
) -> Result<T, ApipulseError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "json" => serde_json::from_str(content)
            .map_err(|e| ApipulseError::Argument(format!("Failed to parse JSON {}: {}", what, e))),
        "yaml" | "yml" => serde_yaml::from_str(content)
            .map_err(|e| ApipulseError::Argument(format!("Failed to parse YAML {}: {}", what, e))),
        _ => {
            // Try JSON first, then YAML
            serde_json::from_str(content).or_else(|_| {
                serde_yaml::from_str(content).map_err(|e| {
                    ApipulseError::Argument(format!("Failed to parse {}: {}", what, e))
                })
            })
        }
    }
}

/// Load a collection document from a JSON or YAML file.
///
/// File size is checked before parsing; see [`validate_collection`] for the
/// structural checks applied afterwards.
pub fn load_collection(path: &Path) -> Result<CollectionFile, ApipulseError> {
    let content = read_sized(path)?;
    let file: CollectionFile = parse_by_extension(path, &content, "collection")?;
    validate_collection(&file)?;
    Ok(file)
}

/// Load an environment override file (JSON or YAML).
pub fn load_environment(path: &Path) -> Result<EnvironmentConfig, ApipulseError> {
    let content = read_sized(path)?;
    parse_by_extension(path, &content, "environment")
}

/// Validate basic collection structure.
pub fn validate_collection(file: &CollectionFile) -> Result<(), ApipulseError> {
    if file.collection.name.is_empty() {
        return Err(ApipulseError::Argument(
            "Collection must have a name".to_string(),
        ));
    }

    for (i, request) in file.requests.iter().enumerate() {
        if request.name.is_empty() {
            return Err(ApipulseError::Argument(format!(
                "Request {} must have a name",
                i + 1
            )));
        }
        if request.url_path.is_empty() {
            return Err(ApipulseError::Argument(format!(
                "Request {} ({}) must have a url_path",
                i + 1,
                request.name
            )));
        }
    }

    Ok(())
}
