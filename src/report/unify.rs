//! Lifting scenario results into native execution results
//!
//! Remote runs report scenarios, not requests. Scenarios are matched back to
//! the submitted requests by name, falling back to position, so both engines
//! produce the same result shape.

use std::collections::HashMap;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;

use super::{HttpCapture, ScenarioResult, StepRecord};
use crate::models::{
    AssertionResult, CollectionConfig, ExecutionResult, RequestBody, RequestDef, ResponseInfo,
    RunStatus,
};

static STATUS_STEP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)status\s+(\d{3})").unwrap());

/// Convert scenario results into execution results.
pub fn unify(
    scenarios: &[ScenarioResult],
    requests: &[RequestDef],
    collection: &CollectionConfig,
) -> Vec<ExecutionResult> {
    let by_name: HashMap<&str, &RequestDef> =
        requests.iter().map(|r| (r.name.as_str(), r)).collect();

    scenarios
        .iter()
        .enumerate()
        .map(|(index, scenario)| {
            let request = by_name
                .get(scenario.name.as_str())
                .copied()
                .or_else(|| requests.get(index));

            let status = if scenario.passed {
                RunStatus::Passed
            } else {
                RunStatus::Failed
            };
            let mut result = ExecutionResult::new(status, index);
            result.request_name = Some(scenario.name.clone());
            result.request_id = request.and_then(|r| r.id.clone());
            result.tags = scenario.tags.clone();

            for step in &scenario.steps {
                result.assertion_results.push(step_assertion(step));
            }

            match &scenario.capture {
                Some(capture) => {
                    result.resolved_url = capture_url(&capture.request);
                    result.resolved_method = capture
                        .request
                        .get("method")
                        .and_then(JsonValue::as_str)
                        .map(str::to_uppercase);
                    result.resolved_headers = capture.request.get("headers").map(flatten_headers);
                    result.resolved_body = match capture.request.get("body") {
                        None | Some(JsonValue::Null) => None,
                        Some(body) => Some(render_body(body)),
                    };
                    result.response =
                        Some(response_from_capture(capture, &scenario.steps, scenario.duration_ms));
                }
                // no capture: fall back to the submitted definition, templates unresolved
                None => {
                    if let Some(request) = request {
                        result.resolved_url = Some(definition_url(request, collection));
                        result.resolved_method = Some(request.method.to_uppercase());
                        let headers = definition_headers(request, collection);
                        if !headers.is_empty() {
                            result.resolved_headers = Some(headers);
                        }
                        result.resolved_body = definition_body(&request.body);
                    }
                }
            }

            result
        })
        .collect()
}

fn step_assertion(step: &StepRecord) -> AssertionResult {
    let label = format!("{} {}", step.keyword, step.name).trim().to_string();
    let message = step
        .error_message
        .clone()
        .unwrap_or_else(|| format!("Step {}", step.status));

    let assertion = if step.status == "passed" {
        AssertionResult::pass("step", message)
    } else {
        AssertionResult::fail("step", message)
    };
    assertion.with_name(Some(&label))
}

fn response_from_capture(
    capture: &HttpCapture,
    steps: &[StepRecord],
    scenario_duration_ms: u64,
) -> ResponseInfo {
    let response = &capture.response;

    let status_code = response
        .get("status")
        .and_then(coerce_status)
        .or_else(|| fallback_status(steps))
        .unwrap_or(0);
    let headers = response
        .get("headers")
        .map(flatten_headers)
        .unwrap_or_default();
    let body = match response.get("body") {
        None | Some(JsonValue::Null) => String::new(),
        Some(body) => render_body(body),
    };
    let elapsed_ms = response
        .get("time")
        .and_then(JsonValue::as_u64)
        .unwrap_or(scenario_duration_ms);

    ResponseInfo {
        status_code,
        headers,
        size_bytes: body.len(),
        body,
        elapsed_ms,
    }
}

fn definition_url(request: &RequestDef, collection: &CollectionConfig) -> String {
    let path = &request.url_path;
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.clone();
    }
    match collection.base_url.as_deref().filter(|base| !base.is_empty()) {
        Some(base) => format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        ),
        None => path.clone(),
    }
}

fn definition_headers(
    request: &RequestDef,
    collection: &CollectionConfig,
) -> IndexMap<String, String> {
    let mut headers = collection.default_headers.clone();
    for (name, value) in &request.headers {
        headers.insert(name.clone(), value.clone());
    }
    headers
}

fn definition_body(body: &RequestBody) -> Option<String> {
    match body {
        RequestBody::None => None,
        RequestBody::Json(value) if value.is_null() => None,
        RequestBody::Json(value) => Some(value.to_string()),
        RequestBody::Form(fields) => Some(
            fields
                .iter()
                .map(|(k, v)| format!("{}={}", k, render_body(v)))
                .collect::<Vec<_>>()
                .join("&"),
        ),
        RequestBody::Raw(text) if text.is_empty() => None,
        RequestBody::Raw(text) => Some(text.clone()),
        RequestBody::Graphql(graphql) => Some(
            serde_json::json!({
                "query": graphql.query,
                "variables": graphql.variables,
            })
            .to_string(),
        ),
    }
}

fn capture_url(request: &JsonValue) -> Option<String> {
    if let Some(url) = request.get("url").and_then(JsonValue::as_str) {
        return Some(url.to_string());
    }
    let base = request.get("urlBase").and_then(JsonValue::as_str);
    let uri = request.get("uri").and_then(JsonValue::as_str);
    match (base, uri) {
        (Some(base), Some(uri)) => Some(format!(
            "{}/{}",
            base.trim_end_matches('/'),
            uri.trim_start_matches('/')
        )),
        (Some(base), None) => Some(base.to_string()),
        (None, Some(uri)) => Some(uri.to_string()),
        (None, None) => None,
    }
}

/// Header values arrive as single-element lists; first value wins.
fn flatten_headers(value: &JsonValue) -> IndexMap<String, String> {
    let mut headers = IndexMap::new();
    let Some(map) = value.as_object() else {
        return headers;
    };
    for (name, value) in map {
        let rendered = match value {
            JsonValue::Array(values) => values.first().map(render_body).unwrap_or_default(),
            other => render_body(other),
        };
        headers.insert(name.clone(), rendered);
    }
    headers
}

fn render_body(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn coerce_status(value: &JsonValue) -> Option<u16> {
    match value {
        JsonValue::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Best-effort status from `Then status NNN` step text when the capture
/// carries none.
fn fallback_status(steps: &[StepRecord]) -> Option<u16> {
    for step in steps {
        if let Some(caps) = STATUS_STEP_RE.captures(&step.name) {
            if let Ok(code) = caps[1].parse() {
                return Some(code);
            }
        }
    }
    None
}
