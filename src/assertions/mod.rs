//! Assertion evaluation over HTTP responses
//!
//! Every check produces an [`AssertionResult`]; evaluation never returns
//! `Err`. Non-JSON bodies, invalid paths, bad regexes and unknown assertion
//! types all land as `passed = false` with an explanatory message.
//!
//! String values inside a check's config are template-resolved against the
//! run context first, so chained values from earlier requests can drive
//! expectations. A config value that is exactly one `{{placeholder}}` keeps
//! the looked-up JSON type instead of stringifying, which keeps numeric
//! status expectations numeric.

use jsonpath_rust::JsonPath;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;

use crate::client::HttpResponse;
use crate::models::{
    AssertionResult, AssertionSpec, BodyContainsCheck, BodyEqualsCheck, Check, CheckSpec,
    CompareOp, ExtractionSource, HeaderCheck, JsonpathCheck, SchemaCheck, StatusCheck, StatusOp,
    TimingCheck, VariableExtraction,
};
use crate::template::{self, VarContext};

static WHOLE_PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{\{([^}]+)\}\}$").unwrap());

/// Run every assertion against the response, in order.
pub fn run_all(
    assertions: &[AssertionSpec],
    response: &HttpResponse,
    context: &VarContext,
) -> Vec<AssertionResult> {
    assertions
        .iter()
        .map(|spec| run_one(spec, response, context))
        .collect()
}

/// Evaluate a single assertion.
pub fn run_one(
    spec: &AssertionSpec,
    response: &HttpResponse,
    context: &VarContext,
) -> AssertionResult {
    let result = match &spec.check {
        CheckSpec::Known(check) => match check {
            Check::Status(c) => assert_status(c, response, context),
            Check::Jsonpath(c) => assert_jsonpath(c, response, context),
            Check::Header(c) => assert_header(c, response, context),
            Check::Timing(c) => assert_timing(c, response),
            Check::Schema(c) => assert_schema(c, response),
            Check::BodyContains(c) => assert_body_contains(c, response, context),
            Check::BodyEquals(c) => assert_body_equals(c, response, context),
        },
        CheckSpec::Unknown(unknown) => AssertionResult::fail(
            &unknown.kind,
            format!("Unknown assertion type: {}", unknown.kind),
        ),
    };
    result.with_name(spec.name.as_deref())
}

fn assert_status(check: &StatusCheck, response: &HttpResponse, ctx: &VarContext) -> AssertionResult {
    let expected = resolve_config_value(&check.expected, ctx);
    let actual = response.status_code;

    let passed = match check.operator {
        StatusOp::Equals => status_matches(&expected, actual),
        StatusOp::In => match &expected {
            JsonValue::Array(items) => items.iter().any(|v| status_matches(v, actual)),
            single => status_matches(single, actual),
        },
        StatusOp::Range => match &expected {
            JsonValue::Array(items) if items.len() == 2 => {
                match (items[0].as_u64(), items[1].as_u64()) {
                    (Some(min), Some(max)) => {
                        min <= u64::from(actual) && u64::from(actual) <= max
                    }
                    _ => false,
                }
            }
            _ => false,
        },
    };

    let message = format!(
        "Status {} {} {}",
        actual,
        if passed { "==" } else { "!=" },
        render(&expected)
    );
    finish("status", passed, message)
        .with_expected(expected)
        .with_actual(actual)
}

fn status_matches(expected: &JsonValue, actual: u16) -> bool {
    expected.as_u64() == Some(u64::from(actual))
}

fn assert_jsonpath(
    check: &JsonpathCheck,
    response: &HttpResponse,
    ctx: &VarContext,
) -> AssertionResult {
    let path = template::resolve(&check.path, ctx);
    let expected = resolve_config_value(&check.expected, ctx);

    let body = match response.json() {
        Ok(body) => body,
        Err(_) => return AssertionResult::fail("jsonpath", "Response is not valid JSON"),
    };

    let matches: Vec<JsonValue> = match body.query(&path) {
        Ok(nodes) => nodes.into_iter().cloned().collect(),
        Err(e) => {
            return AssertionResult::fail("jsonpath", format!("Invalid JSONPath: {}", e));
        }
    };

    let found = !matches.is_empty();
    let actual = matches.into_iter().next().unwrap_or(JsonValue::Null);

    let (passed, message) = match check.operator {
        CompareOp::Exists => (
            found,
            format!(
                "Path {} {}",
                path,
                if found { "exists" } else { "does not exist" }
            ),
        ),
        CompareOp::NotExists => (
            !found,
            format!(
                "Path {} {}",
                path,
                if found { "exists" } else { "does not exist" }
            ),
        ),
        CompareOp::Equals => (
            json_eq(&actual, &expected),
            format!("{} = {}", path, render(&actual)),
        ),
        CompareOp::NotEquals => (
            !json_eq(&actual, &expected),
            format!(
                "{} != {} (actual: {})",
                path,
                render(&expected),
                render(&actual)
            ),
        ),
        CompareOp::Contains => (
            !actual.is_null() && render(&actual).contains(&render(&expected)),
            format!("{} contains '{}'", path, render(&expected)),
        ),
        CompareOp::NotContains => (
            actual.is_null() || !render(&actual).contains(&render(&expected)),
            format!("{} does not contain '{}'", path, render(&expected)),
        ),
        CompareOp::GreaterThan => (
            numeric_pair(&actual, &expected).map_or(false, |(a, e)| a > e),
            format!(
                "{} > {} (actual: {})",
                path,
                render(&expected),
                render(&actual)
            ),
        ),
        CompareOp::LessThan => (
            numeric_pair(&actual, &expected).map_or(false, |(a, e)| a < e),
            format!(
                "{} < {} (actual: {})",
                path,
                render(&expected),
                render(&actual)
            ),
        ),
        CompareOp::Matches => {
            let passed = !actual.is_null()
                && Regex::new(&render(&expected))
                    .map(|re| re.is_match(&render(&actual)))
                    .unwrap_or(false);
            (passed, format!("{} matches '{}'", path, render(&expected)))
        }
    };

    finish("jsonpath", passed, message)
        .with_expected(expected)
        .with_actual(actual)
}

fn assert_header(check: &HeaderCheck, response: &HttpResponse, ctx: &VarContext) -> AssertionResult {
    let name = template::resolve(&check.name, ctx).to_lowercase();
    let expected = resolve_config_value(&check.expected, ctx);
    let expected_text = render(&expected);
    let actual = response.header(&name).map(str::to_string);

    let (passed, message) = match check.operator {
        CompareOp::Exists => (
            actual.is_some(),
            format!(
                "Header '{}' {}",
                name,
                if actual.is_some() { "exists" } else { "does not exist" }
            ),
        ),
        CompareOp::NotExists => (
            actual.is_none(),
            format!(
                "Header '{}' {}",
                name,
                if actual.is_none() { "does not exist" } else { "exists" }
            ),
        ),
        CompareOp::Contains => (
            actual
                .as_deref()
                .map(|a| a.contains(&expected_text))
                .unwrap_or(false),
            format!("Header '{}' contains '{}'", name, expected_text),
        ),
        CompareOp::Matches => (
            actual
                .as_deref()
                .map(|a| {
                    Regex::new(&expected_text)
                        .map(|re| re.is_match(a))
                        .unwrap_or(false)
                })
                .unwrap_or(false),
            format!("Header '{}' matches '{}'", name, expected_text),
        ),
        // equals and every remaining operator compare verbatim
        _ => (
            actual.as_deref() == Some(expected_text.as_str()),
            format!("Header '{}' = '{}'", name, actual.as_deref().unwrap_or("")),
        ),
    };

    finish("header", passed, message)
        .with_expected(expected)
        .with_actual(actual.map(JsonValue::String).unwrap_or(JsonValue::Null))
}

fn assert_timing(check: &TimingCheck, response: &HttpResponse) -> AssertionResult {
    let actual = response.elapsed_ms;
    let passed = actual <= check.max_ms;
    let message = format!(
        "Response time {}ms {} {}ms",
        actual,
        if passed { "<=" } else { ">" },
        check.max_ms
    );
    finish("timing", passed, message)
        .with_expected(format!("<= {}ms", check.max_ms))
        .with_actual(format!("{}ms", actual))
}

fn assert_schema(check: &SchemaCheck, response: &HttpResponse) -> AssertionResult {
    let body = match response.json() {
        Ok(body) => body,
        Err(_) => return AssertionResult::fail("schema", "Response is not valid JSON"),
    };

    let validator = match jsonschema::validator_for(&check.schema) {
        Ok(validator) => validator,
        Err(e) => return AssertionResult::fail("schema", format!("Invalid schema: {}", e)),
    };

    match validator.validate(&body) {
        Ok(()) => AssertionResult::pass("schema", "Response matches schema"),
        Err(e) => AssertionResult::fail("schema", format!("Schema validation failed: {}", e)),
    }
}

fn assert_body_contains(
    check: &BodyContainsCheck,
    response: &HttpResponse,
    ctx: &VarContext,
) -> AssertionResult {
    let expected = template::resolve(&check.expected, ctx);
    let passed = if check.case_sensitive {
        response.body.contains(&expected)
    } else {
        response.body.to_lowercase().contains(&expected.to_lowercase())
    };
    let message = format!(
        "Body {} '{}'",
        if passed { "contains" } else { "does not contain" },
        expected
    );
    finish("body_contains", passed, message).with_expected(expected)
}

fn assert_body_equals(
    check: &BodyEqualsCheck,
    response: &HttpResponse,
    ctx: &VarContext,
) -> AssertionResult {
    let expected = template::resolve(&check.expected, ctx);
    let passed = if check.ignore_whitespace {
        strip_whitespace(&response.body) == strip_whitespace(&expected)
    } else {
        response.body == expected
    };
    let message = format!(
        "Body {} expected",
        if passed { "equals" } else { "does not equal" }
    );
    finish("body_equals", passed, message)
        .with_expected(truncate(&expected))
        .with_actual(truncate(&response.body))
}

/// Pull one variable out of a response.
///
/// Any lookup failure (non-JSON body, missing path, bad regex) silently
/// yields the configured default.
pub fn extract_variable(
    extraction: &VariableExtraction,
    response: &HttpResponse,
) -> (String, JsonValue) {
    let extracted = match extraction.source {
        ExtractionSource::Jsonpath => match response.json() {
            Ok(body) => match body.query(&extraction.path) {
                Ok(matches) => matches.first().map(|v| (*v).clone()),
                Err(_) => None,
            },
            Err(_) => None,
        },
        ExtractionSource::Header => response
            .header(&extraction.path)
            .map(|v| JsonValue::String(v.to_string())),
        ExtractionSource::Body => Some(JsonValue::String(response.body.clone())),
        ExtractionSource::Status => Some(JsonValue::from(response.status_code)),
        ExtractionSource::Regex => Regex::new(&extraction.path).ok().and_then(|re| {
            re.captures(&response.body).and_then(|caps| {
                let group = if caps.len() > 1 { caps.get(1) } else { caps.get(0) };
                group.map(|m| JsonValue::String(m.as_str().to_string()))
            })
        }),
    };

    let value = extracted
        .or_else(|| extraction.default.clone())
        .unwrap_or(JsonValue::Null);
    (extraction.name.clone(), value)
}

fn finish(kind: &str, passed: bool, message: String) -> AssertionResult {
    if passed {
        AssertionResult::pass(kind, message)
    } else {
        AssertionResult::fail(kind, message)
    }
}

/// Strings render bare, everything else as compact JSON.
fn render(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_eq(a: &JsonValue, b: &JsonValue) -> bool {
    if a.is_number() && b.is_number() {
        return a.as_f64() == b.as_f64();
    }
    a == b
}

fn numeric_pair(actual: &JsonValue, expected: &JsonValue) -> Option<(f64, f64)> {
    Some((coerce_f64(actual)?, coerce_f64(expected)?))
}

fn coerce_f64(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

fn truncate(text: &str) -> String {
    if text.chars().count() > 100 {
        let head: String = text.chars().take(100).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// Config values resolve against the run context; a value that is exactly
/// one placeholder keeps the context value's JSON type.
fn resolve_config_value(value: &JsonValue, ctx: &VarContext) -> JsonValue {
    match value {
        JsonValue::String(s) => {
            if let Some(caps) = WHOLE_PLACEHOLDER_RE.captures(s) {
                if let Some(found) = template::lookup(ctx, caps[1].trim()) {
                    if !found.is_null() {
                        return found.clone();
                    }
                }
            }
            JsonValue::String(template::resolve(s, ctx))
        }
        JsonValue::Array(items) => {
            JsonValue::Array(items.iter().map(|v| resolve_config_value(v, ctx)).collect())
        }
        JsonValue::Object(map) => JsonValue::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_config_value(v, ctx)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use serde_json::json;

    fn response(status: u16, body: &str) -> HttpResponse {
        let mut headers = IndexMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        HttpResponse {
            status_code: status,
            headers,
            body: body.to_string(),
            elapsed_ms: 120,
            size_bytes: body.len(),
            ..Default::default()
        }
    }

    fn spec(raw: serde_json::Value) -> AssertionSpec {
        serde_json::from_value(raw).unwrap()
    }

    fn ctx() -> VarContext {
        VarContext::new()
    }

    #[test]
    fn test_status_equals() {
        let passing = spec(json!({"type": "status", "config": {"expected": 200}}));
        let result = run_one(&passing, &response(200, "{}"), &ctx());
        assert!(result.passed);
        assert_eq!(result.message, "Status 200 == 200");

        let failing = spec(json!({"type": "status", "config": {"expected": 404}}));
        let result = run_one(&failing, &response(200, "{}"), &ctx());
        assert!(!result.passed);
        assert_eq!(result.message, "Status 200 != 404");
    }

    #[test]
    fn test_status_in_and_range() {
        let member = spec(json!({
            "type": "status",
            "config": {"operator": "in", "expected": [200, 201, 204]}
        }));
        assert!(run_one(&member, &response(201, ""), &ctx()).passed);
        assert!(!run_one(&member, &response(500, ""), &ctx()).passed);

        let range = spec(json!({
            "type": "status",
            "config": {"operator": "range", "expected": [200, 299]}
        }));
        assert!(run_one(&range, &response(299, ""), &ctx()).passed);
        assert!(!run_one(&range, &response(300, ""), &ctx()).passed);

        // malformed range never passes
        let bad = spec(json!({
            "type": "status",
            "config": {"operator": "range", "expected": [200]}
        }));
        assert!(!run_one(&bad, &response(200, ""), &ctx()).passed);
    }

    #[test]
    fn test_jsonpath_equals() {
        let body = r#"{"user": {"id": 42, "name": "ada"}}"#;
        let s = spec(json!({
            "type": "jsonpath",
            "config": {"path": "$.user.id", "operator": "equals", "expected": 42}
        }));
        let result = run_one(&s, &response(200, body), &ctx());
        assert!(result.passed);
        assert_eq!(result.message, "$.user.id = 42");
        assert_eq!(result.actual, json!(42));
    }

    #[test]
    fn test_jsonpath_non_json_body_fails_cleanly() {
        let s = spec(json!({
            "type": "jsonpath",
            "config": {"path": "$.id", "operator": "exists"}
        }));
        let result = run_one(&s, &response(200, "<html>nope</html>"), &ctx());
        assert!(!result.passed);
        assert_eq!(result.message, "Response is not valid JSON");
    }

    #[test]
    fn test_jsonpath_exists_and_not_exists() {
        let body = r#"{"items": [1, 2]}"#;
        let exists = spec(json!({
            "type": "jsonpath",
            "config": {"path": "$.items", "operator": "exists"}
        }));
        assert!(run_one(&exists, &response(200, body), &ctx()).passed);

        let missing = spec(json!({
            "type": "jsonpath",
            "config": {"path": "$.absent", "operator": "not_exists"}
        }));
        assert!(run_one(&missing, &response(200, body), &ctx()).passed);
    }

    #[test]
    fn test_jsonpath_numeric_coercion() {
        let body = r#"{"count": "15"}"#;
        let gt = spec(json!({
            "type": "jsonpath",
            "config": {"path": "$.count", "operator": "greater_than", "expected": 10}
        }));
        assert!(run_one(&gt, &response(200, body), &ctx()).passed);

        let not_numeric = spec(json!({
            "type": "jsonpath",
            "config": {"path": "$.count", "operator": "less_than", "expected": "abc"}
        }));
        assert!(!run_one(&not_numeric, &response(200, body), &ctx()).passed);
    }

    #[test]
    fn test_header_checks() {
        let exists = spec(json!({
            "type": "header",
            "config": {"name": "content-type"}
        }));
        let result = run_one(&exists, &response(200, "{}"), &ctx());
        assert!(result.passed);
        assert_eq!(result.message, "Header 'content-type' exists");

        let equals = spec(json!({
            "type": "header",
            "config": {"name": "Content-Type", "operator": "equals", "expected": "application/json"}
        }));
        assert!(run_one(&equals, &response(200, "{}"), &ctx()).passed);

        let missing = spec(json!({
            "type": "header",
            "config": {"name": "x-request-id"}
        }));
        assert!(!run_one(&missing, &response(200, "{}"), &ctx()).passed);
    }

    #[test]
    fn test_timing_boundary() {
        // fixture elapsed_ms is 120
        let at_limit = spec(json!({"type": "timing", "config": {"max_ms": 120}}));
        let result = run_one(&at_limit, &response(200, ""), &ctx());
        assert!(result.passed);
        assert_eq!(result.message, "Response time 120ms <= 120ms");

        let too_slow = spec(json!({"type": "timing", "config": {"max_ms": 100}}));
        let result = run_one(&too_slow, &response(200, ""), &ctx());
        assert!(!result.passed);
        assert_eq!(result.message, "Response time 120ms > 100ms");
    }

    #[test]
    fn test_schema_validation() {
        let schema = json!({
            "type": "object",
            "properties": {"id": {"type": "integer"}},
            "required": ["id"]
        });
        let valid = spec(json!({"type": "schema", "config": {"schema": schema}}));
        let result = run_one(&valid, &response(200, r#"{"id": 7}"#), &ctx());
        assert!(result.passed);
        assert_eq!(result.message, "Response matches schema");

        let result = run_one(&valid, &response(200, r#"{"id": "seven"}"#), &ctx());
        assert!(!result.passed);
        assert!(result.message.starts_with("Schema validation failed:"));
    }

    #[test]
    fn test_body_checks() {
        let contains = spec(json!({
            "type": "body_contains",
            "config": {"expected": "WORLD", "case_sensitive": false}
        }));
        assert!(run_one(&contains, &response(200, "hello world"), &ctx()).passed);

        let equals = spec(json!({
            "type": "body_equals",
            "config": {"expected": "{ \"a\": 1 }", "ignore_whitespace": true}
        }));
        assert!(run_one(&equals, &response(200, "{\"a\":1}"), &ctx()).passed);
    }

    #[test]
    fn test_unknown_type_fails_with_message() {
        let s = spec(json!({"type": "xpath", "config": {"path": "//id"}}));
        let result = run_one(&s, &response(200, "{}"), &ctx());
        assert!(!result.passed);
        assert_eq!(result.message, "Unknown assertion type: xpath");
        assert_eq!(result.kind, "xpath");
    }

    #[test]
    fn test_expected_resolves_from_context() {
        let mut context = VarContext::new();
        context.insert("want".to_string(), json!(201));

        let s = spec(json!({
            "type": "status",
            "config": {"expected": "{{want}}"}
        }));
        let result = run_one(&s, &response(201, ""), &context);
        assert!(result.passed, "whole-placeholder expected keeps numeric type");
    }

    #[test]
    fn test_run_all_keeps_order() {
        let specs = vec![
            spec(json!({"type": "status", "config": {"expected": 200}})),
            spec(json!({"type": "timing", "config": {"max_ms": 1}})),
        ];
        let results = run_all(&specs, &response(200, "{}"), &ctx());
        assert_eq!(results.len(), 2);
        assert!(results[0].passed);
        assert!(!results[1].passed);
    }

    #[test]
    fn test_extract_jsonpath_with_default() {
        let extraction: VariableExtraction = serde_json::from_value(json!({
            "name": "user_id",
            "source": "jsonpath",
            "path": "$.user.id"
        }))
        .unwrap();
        let (name, value) = extract_variable(&extraction, &response(200, r#"{"user":{"id":9}}"#));
        assert_eq!(name, "user_id");
        assert_eq!(value, json!(9));

        let with_default: VariableExtraction = serde_json::from_value(json!({
            "name": "user_id",
            "source": "jsonpath",
            "path": "$.missing",
            "default": "anonymous"
        }))
        .unwrap();
        let (_, value) = extract_variable(&with_default, &response(200, "{}"));
        assert_eq!(value, json!("anonymous"));
    }

    #[test]
    fn test_extract_regex_and_status() {
        let regex: VariableExtraction = serde_json::from_value(json!({
            "name": "token",
            "source": "regex",
            "path": "token=(\\w+)"
        }))
        .unwrap();
        let (_, value) = extract_variable(&regex, &response(200, "ok token=abc123 done"));
        assert_eq!(value, json!("abc123"));

        let status: VariableExtraction = serde_json::from_value(json!({
            "name": "code",
            "source": "status"
        }))
        .unwrap();
        let (_, value) = extract_variable(&status, &response(418, ""));
        assert_eq!(value, json!(418));
    }
}
