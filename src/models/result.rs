//! Unified run results
//!
//! Both backends produce these types: the native engine directly, the remote
//! path through the report unifier. Downstream consumers never need to know
//! which engine ran the collection.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Terminal status of one executed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Response obtained, every assertion passed (zero assertions passes)
    Passed,
    /// Response obtained, at least one assertion failed
    Failed,
    /// Never executed because an earlier request tripped stop_on_failure
    Skipped,
    /// Transport or internal failure; no usable response
    Error,
}

/// Classification of a request-level error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Request exceeded its deadline
    Timeout,
    /// Could not reach the server
    Connection,
    /// Any other transport failure
    Request,
    /// Internal failure while preparing or finishing the request
    Execution,
    /// Reported by the remote worker pool
    Remote,
}

/// Error details attached to a result with status `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionError {
    pub message: String,
    pub kind: ErrorKind,
}

/// Response data captured for a result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseInfo {
    pub status_code: u16,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub headers: IndexMap<String, String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,

    #[serde(default)]
    pub size_bytes: usize,

    #[serde(default)]
    pub elapsed_ms: u64,
}

/// Outcome of one assertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionResult {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub passed: bool,

    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub expected: JsonValue,

    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub actual: JsonValue,

    pub message: String,
}

impl AssertionResult {
    pub fn pass(kind: &str, message: impl Into<String>) -> Self {
        AssertionResult {
            kind: kind.to_string(),
            name: None,
            passed: true,
            expected: JsonValue::Null,
            actual: JsonValue::Null,
            message: message.into(),
        }
    }

    pub fn fail(kind: &str, message: impl Into<String>) -> Self {
        AssertionResult {
            kind: kind.to_string(),
            name: None,
            passed: false,
            expected: JsonValue::Null,
            actual: JsonValue::Null,
            message: message.into(),
        }
    }

    pub fn with_name(mut self, name: Option<&str>) -> Self {
        self.name = name.map(|n| n.to_string());
        self
    }

    pub fn with_expected(mut self, expected: impl Into<JsonValue>) -> Self {
        self.expected = expected.into();
        self
    }

    pub fn with_actual(mut self, actual: impl Into<JsonValue>) -> Self {
        self.actual = actual.into();
        self
    }
}

/// Result of executing a single request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_name: Option<String>,

    pub status: RunStatus,

    /// Fully resolved URL actually requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_method: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_headers: Option<IndexMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_body: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseInfo>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assertion_results: Vec<AssertionResult>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub extracted_variables: IndexMap<String, JsonValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Position in the run, dense and strictly increasing
    #[serde(default)]
    pub execution_order: usize,

    /// Scenario tags, populated only by the remote backend
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl ExecutionResult {
    /// Empty result scaffold; callers fill in what they know.
    pub fn new(status: RunStatus, execution_order: usize) -> Self {
        ExecutionResult {
            request_id: None,
            request_name: None,
            status,
            resolved_url: None,
            resolved_method: None,
            resolved_headers: None,
            resolved_body: None,
            response: None,
            assertion_results: Vec::new(),
            extracted_variables: IndexMap::new(),
            error: None,
            started_at: None,
            finished_at: None,
            execution_order,
            tags: Vec::new(),
        }
    }

    pub fn duration_ms(&self) -> Option<u64> {
        if let Some(response) = &self.response {
            return Some(response.elapsed_ms);
        }
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds().max(0) as u64),
            _ => None,
        }
    }

    pub fn all_assertions_passed(&self) -> bool {
        self.assertion_results.iter().all(|r| r.passed)
    }
}

/// Aggregated counts for a finished run, the shape consumers report on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errored: usize,
    pub total_assertions: usize,
    pub passed_assertions: usize,
    pub failed_assertions: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub all_passed: bool,
}

/// Result of executing a collection: ordered per-request results plus run
/// timing. Counts are derived, never stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionResult {
    pub results: Vec<ExecutionResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl CollectionResult {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn passed(&self) -> usize {
        self.count(RunStatus::Passed)
    }

    pub fn failed(&self) -> usize {
        self.count(RunStatus::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(RunStatus::Skipped)
    }

    pub fn errored(&self) -> usize {
        self.count(RunStatus::Error)
    }

    fn count(&self, status: RunStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.status == RunStatus::Passed)
    }

    pub fn total_assertions(&self) -> usize {
        self.results.iter().map(|r| r.assertion_results.len()).sum()
    }

    pub fn passed_assertions(&self) -> usize {
        self.results
            .iter()
            .map(|r| r.assertion_results.iter().filter(|a| a.passed).count())
            .sum()
    }

    pub fn failed_assertions(&self) -> usize {
        self.total_assertions() - self.passed_assertions()
    }

    pub fn duration_ms(&self) -> Option<u64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds().max(0) as u64),
            _ => None,
        }
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            total: self.total(),
            passed: self.passed(),
            failed: self.failed(),
            skipped: self.skipped(),
            errored: self.errored(),
            total_assertions: self.total_assertions(),
            passed_assertions: self.passed_assertions(),
            failed_assertions: self.failed_assertions(),
            duration_ms: self.duration_ms(),
            all_passed: self.all_passed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_with(status: RunStatus, assertions: Vec<AssertionResult>) -> ExecutionResult {
        let mut r = ExecutionResult::new(status, 0);
        r.assertion_results = assertions;
        r
    }

    #[test]
    fn test_summary_counts() {
        let mut collection = CollectionResult::default();
        collection.results.push(result_with(
            RunStatus::Passed,
            vec![AssertionResult::pass("status", "Status 200 == 200")],
        ));
        collection.results.push(result_with(
            RunStatus::Failed,
            vec![
                AssertionResult::pass("status", "Status 200 == 200"),
                AssertionResult::fail("jsonpath", "$.id = null"),
            ],
        ));
        collection.results.push(result_with(RunStatus::Skipped, vec![]));

        let summary = collection.summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.errored, 0);
        assert_eq!(summary.total_assertions, 3);
        assert_eq!(summary.passed_assertions, 2);
        assert_eq!(summary.failed_assertions, 1);
        assert!(!summary.all_passed);
    }

    #[test]
    fn test_all_passed_empty_run() {
        let collection = CollectionResult::default();
        assert!(collection.all_passed());
    }

    #[test]
    fn test_duration_prefers_response_timing() {
        let mut r = ExecutionResult::new(RunStatus::Passed, 0);
        r.response = Some(ResponseInfo {
            elapsed_ms: 42,
            ..Default::default()
        });
        assert_eq!(r.duration_ms(), Some(42));
    }
}
