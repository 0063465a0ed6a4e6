//! Request definitions: the executable unit of a collection

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::models::assertion::AssertionSpec;

fn default_method() -> String {
    "GET".to_string()
}

/// A single API request definition within a collection.
///
/// `url_path` may be absolute (`https://...`) or relative to the collection /
/// environment base URL. String fields may contain `{{variable}}` templates
/// which are resolved at execution time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestDef {
    /// Optional stable identifier, used for subset selection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Display name, also used as the scenario name in feature output
    pub name: String,

    /// Free-form description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// HTTP method (GET, POST, PUT, PATCH, DELETE, ...)
    #[serde(default = "default_method")]
    pub method: String,

    /// URL path, relative to base_url unless absolute
    pub url_path: String,

    /// Request headers (merged over collection/environment defaults)
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub headers: IndexMap<String, String>,

    /// Query parameters
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub query_params: IndexMap<String, String>,

    /// Request body
    #[serde(default, skip_serializing_if = "RequestBody::is_none")]
    pub body: RequestBody,

    /// Assertions to run against the response
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assertions: Vec<AssertionSpec>,

    /// Variables to extract from the response for chaining
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variable_extractions: Vec<VariableExtraction>,

    /// Per-request timeout in milliseconds (overrides the engine default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Execution order within the collection (requests run sorted by this)
    #[serde(default)]
    pub order_index: i64,

    /// Folder grouping, used for tagging in feature output
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub folder_path: String,
}

/// Typed request body.
///
/// Serialized as `{type, content}` so collection files stay explicit about
/// how the content is sent on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum RequestBody {
    /// No body
    #[default]
    None,
    /// JSON value, sent as `application/json`
    Json(JsonValue),
    /// Form fields, sent url-encoded
    Form(IndexMap<String, JsonValue>),
    /// Raw text, sent as-is
    Raw(String),
    /// GraphQL query + variables, wrapped as JSON
    Graphql(GraphqlBody),
}

impl RequestBody {
    pub fn is_none(&self) -> bool {
        matches!(self, RequestBody::None)
            // A json body with null content carries nothing either
            || matches!(self, RequestBody::Json(JsonValue::Null))
    }
}

/// GraphQL body payload
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GraphqlBody {
    #[serde(default)]
    pub query: String,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub variables: IndexMap<String, JsonValue>,
}

/// Where an extracted variable is read from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionSource {
    /// JSONPath into the parsed response body
    #[default]
    Jsonpath,
    /// Response header value (case-insensitive name)
    Header,
    /// Entire response body text
    Body,
    /// Numeric response status code
    Status,
    /// First capture group of a regex over the body (whole match if no group)
    Regex,
}

/// A variable extraction rule, applied after assertions.
///
/// Any lookup failure silently yields `default` so one missing value never
/// aborts a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableExtraction {
    /// Name the value is stored under in the run context
    pub name: String,

    #[serde(default)]
    pub source: ExtractionSource,

    /// JSONPath, header name, or regex pattern depending on source
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,

    /// Fallback value when the lookup misses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_minimal_deserialize() {
        let req: RequestDef = serde_yaml::from_str("name: Ping\nurl_path: /ping\n").unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.url_path, "/ping");
        assert!(req.body.is_none());
        assert!(req.assertions.is_empty());
    }

    #[test]
    fn test_body_json_tagged() {
        let body: RequestBody =
            serde_json::from_str(r#"{"type": "json", "content": {"a": 1}}"#).unwrap();
        match body {
            RequestBody::Json(v) => assert_eq!(v["a"], 1),
            other => panic!("expected json body, got {:?}", other),
        }
    }

    #[test]
    fn test_body_null_json_is_none() {
        let body: RequestBody = serde_json::from_str(r#"{"type": "json", "content": null}"#).unwrap();
        assert!(body.is_none());
    }

    #[test]
    fn test_extraction_defaults() {
        let ext: VariableExtraction = serde_yaml::from_str("name: user_id\n").unwrap();
        assert_eq!(ext.source, ExtractionSource::Jsonpath);
        assert_eq!(ext.path, "");
        assert!(ext.default.is_none());
    }
}
