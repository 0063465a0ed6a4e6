//! Assertion specifications
//!
//! Assertions are declared as `{type, config}` pairs. The known types form a
//! tagged enum so handler dispatch is checked at compile time; anything else
//! still deserializes (as [`UnknownCheck`]) and fails at evaluation instead
//! of poisoning the whole collection load.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// One assertion attached to a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionSpec {
    /// Optional display name carried into the result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(flatten)]
    pub check: CheckSpec,
}

impl AssertionSpec {
    /// Bare spec with no display name, mostly for construction in code.
    pub fn of(check: Check) -> Self {
        AssertionSpec {
            name: None,
            check: CheckSpec::Known(check),
        }
    }

    /// The `type` tag as written, including unknown kinds.
    pub fn kind(&self) -> &str {
        match &self.check {
            CheckSpec::Known(check) => check.kind(),
            CheckSpec::Unknown(unknown) => &unknown.kind,
        }
    }
}

/// A known check, or whatever the file actually said.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CheckSpec {
    Known(Check),
    Unknown(UnknownCheck),
}

/// The supported assertion types with their configs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "config", rename_all = "snake_case")]
pub enum Check {
    Status(StatusCheck),
    Jsonpath(JsonpathCheck),
    Header(HeaderCheck),
    Timing(TimingCheck),
    Schema(SchemaCheck),
    BodyContains(BodyContainsCheck),
    BodyEquals(BodyEqualsCheck),
}

impl Check {
    pub fn kind(&self) -> &'static str {
        match self {
            Check::Status(_) => "status",
            Check::Jsonpath(_) => "jsonpath",
            Check::Header(_) => "header",
            Check::Timing(_) => "timing",
            Check::Schema(_) => "schema",
            Check::BodyContains(_) => "body_contains",
            Check::BodyEquals(_) => "body_equals",
        }
    }
}

/// Catch-all for unrecognized assertion types. Evaluation fails these as
/// data rather than erroring the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnknownCheck {
    #[serde(default, rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<JsonValue>,
}

/// Status-code comparison operator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusOp {
    #[default]
    Equals,
    /// Membership in a list of codes
    In,
    /// Inclusive `[min, max]` range
    Range,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusCheck {
    #[serde(default)]
    pub operator: StatusOp,

    /// Scalar code for equals, list for in, `[min, max]` pair for range
    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub expected: JsonValue,
}

/// General comparison operator shared by jsonpath and header checks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Exists,
    NotExists,
    #[default]
    Equals,
    NotEquals,
    /// Substring of the stringified actual value
    Contains,
    NotContains,
    /// Numeric coercion; coercion failure fails the assertion
    GreaterThan,
    LessThan,
    /// Regex search on the stringified actual value
    Matches,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonpathCheck {
    /// JSONPath into the parsed response body, e.g. `$.data.items[0].id`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,

    #[serde(default)]
    pub operator: CompareOp,

    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub expected: JsonValue,
}

fn default_header_op() -> CompareOp {
    CompareOp::Exists
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderCheck {
    /// Header name, matched case-insensitively
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default = "default_header_op")]
    pub operator: CompareOp,

    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub expected: JsonValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingCheck {
    /// Passes iff elapsed milliseconds <= max_ms
    #[serde(default)]
    pub max_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaCheck {
    /// Inline JSON Schema the response body must satisfy
    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub schema: JsonValue,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyContainsCheck {
    #[serde(default)]
    pub expected: String,

    #[serde(default = "default_true")]
    pub case_sensitive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyEqualsCheck {
    #[serde(default)]
    pub expected: String,

    /// Strip all whitespace from both sides before comparing
    #[serde(default)]
    pub ignore_whitespace: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_assertion_parses() {
        let spec: AssertionSpec =
            serde_json::from_str(r#"{"type": "status", "config": {"expected": 200}}"#).unwrap();
        assert_eq!(spec.kind(), "status");
        match &spec.check {
            CheckSpec::Known(Check::Status(cfg)) => {
                assert_eq!(cfg.operator, StatusOp::Equals);
                assert_eq!(cfg.expected, serde_json::json!(200));
            }
            other => panic!("expected status check, got {:?}", other),
        }
    }

    #[test]
    fn test_jsonpath_defaults() {
        let spec: AssertionSpec = serde_yaml::from_str(
            "type: jsonpath\nconfig:\n  path: $.id\n  expected: 7\n",
        )
        .unwrap();
        match &spec.check {
            CheckSpec::Known(Check::Jsonpath(cfg)) => {
                assert_eq!(cfg.operator, CompareOp::Equals);
                assert_eq!(cfg.path, "$.id");
            }
            other => panic!("expected jsonpath check, got {:?}", other),
        }
    }

    #[test]
    fn test_header_defaults_to_exists() {
        let spec: AssertionSpec = serde_yaml::from_str(
            "type: header\nconfig:\n  name: Content-Type\n",
        )
        .unwrap();
        match &spec.check {
            CheckSpec::Known(Check::Header(cfg)) => assert_eq!(cfg.operator, CompareOp::Exists),
            other => panic!("expected header check, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_still_parses() {
        let spec: AssertionSpec =
            serde_json::from_str(r#"{"type": "xml_dtd", "config": {"whatever": 1}}"#).unwrap();
        assert_eq!(spec.kind(), "xml_dtd");
        assert!(matches!(spec.check, CheckSpec::Unknown(_)));
    }

    #[test]
    fn test_named_assertion_round_trip() {
        let spec = AssertionSpec {
            name: Some("ok".into()),
            check: CheckSpec::Known(Check::Timing(TimingCheck { max_ms: 500 })),
        };
        let json = serde_json::to_string(&spec).unwrap();
        let back: AssertionSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name.as_deref(), Some("ok"));
        assert_eq!(back.kind(), "timing");
    }
}
