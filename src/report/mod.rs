//! Cucumber JSON report handling
//!
//! The remote worker publishes a Cucumber-format report plus an optional
//! side list of HTTP captures. This module turns that pair into scenario
//! results; [`unify`] then lifts those into the same execution results the
//! native engine produces.

pub mod unify;

pub use unify::unify;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::gherkin::CAPTURE_SCENARIO_NAME;

/// One request/response pair recorded by the capture steps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpCapture {
    #[serde(rename = "scenarioName", default)]
    pub scenario_name: String,

    #[serde(default)]
    pub request: JsonValue,

    #[serde(default)]
    pub response: JsonValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub keyword: String,
    pub name: String,
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ns: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub passed: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    pub steps: Vec<StepRecord>,

    pub duration_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture: Option<HttpCapture>,
}

/// Parse a Cucumber JSON report into scenario results.
///
/// Background elements and the synthesized capture scenario are dropped.
/// Captures are matched to scenarios by name.
pub fn parse_report(report: &JsonValue, http_captures: &[JsonValue]) -> Vec<ScenarioResult> {
    let mut captures: HashMap<String, HttpCapture> = HashMap::new();
    for raw in http_captures {
        if let Ok(capture) = serde_json::from_value::<HttpCapture>(raw.clone()) {
            if !capture.scenario_name.is_empty() {
                captures.insert(capture.scenario_name.clone(), capture);
            }
        }
    }

    let mut scenarios = Vec::new();
    let JsonValue::Array(features) = report else {
        return scenarios;
    };

    for feature in features {
        let Some(elements) = feature.get("elements").and_then(JsonValue::as_array) else {
            continue;
        };
        for element in elements {
            if element.get("type").and_then(JsonValue::as_str) != Some("scenario") {
                continue;
            }
            let name = element
                .get("name")
                .and_then(JsonValue::as_str)
                .unwrap_or_default()
                .to_string();
            if name == CAPTURE_SCENARIO_NAME {
                continue;
            }

            let tags = element
                .get("tags")
                .and_then(JsonValue::as_array)
                .map(|tags| {
                    tags.iter()
                        .filter_map(|tag| tag.get("name").and_then(JsonValue::as_str))
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();

            let mut steps = Vec::new();
            let mut passed = true;
            let mut error: Option<String> = None;
            let mut duration_ns: u64 = 0;

            if let Some(raw_steps) = element.get("steps").and_then(JsonValue::as_array) {
                for raw_step in raw_steps {
                    let result = raw_step.get("result");
                    let status = result
                        .and_then(|r| r.get("status"))
                        .and_then(JsonValue::as_str)
                        .unwrap_or("unknown")
                        .to_string();
                    let step_duration =
                        result.and_then(|r| r.get("duration")).and_then(JsonValue::as_u64);
                    let error_message = result
                        .and_then(|r| r.get("error_message"))
                        .and_then(JsonValue::as_str)
                        .map(str::to_string);

                    duration_ns += step_duration.unwrap_or(0);
                    if status != "passed" {
                        passed = false;
                        // the first failing step's message describes the scenario
                        if error.is_none() {
                            error = error_message.clone();
                        }
                    }

                    steps.push(StepRecord {
                        keyword: raw_step
                            .get("keyword")
                            .and_then(JsonValue::as_str)
                            .unwrap_or_default()
                            .trim()
                            .to_string(),
                        name: raw_step
                            .get("name")
                            .and_then(JsonValue::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        status,
                        duration_ns: step_duration,
                        error_message,
                    });
                }
            }

            scenarios.push(ScenarioResult {
                capture: captures.get(&name).cloned(),
                name,
                passed,
                tags,
                steps,
                duration_ms: duration_ns / 1_000_000,
                error,
            });
        }
    }

    scenarios
}
