//! Native sequential execution engine
//!
//! Drives resolver, client and assertions across a collection. Requests run
//! strictly in `order_index` order; variables extracted from one response
//! are visible to every later request in the same run (forward-only
//! chaining). A failure never aborts the run except through
//! `stop_on_failure`, which marks the remainder as skipped.

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use indexmap::IndexMap;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, info, warn};

use crate::assertions;
use crate::client::{HttpClient, SendBody, DEFAULT_TIMEOUT_SECS};
use crate::errors::Result;
use crate::models::{
    ApiKeyLocation, AssertionResult, AuthConfig, CollectionConfig, CollectionResult,
    EnvironmentConfig, ErrorKind, ExecutionError, ExecutionResult, RequestBody, RequestDef,
    ResponseInfo, RunStatus,
};
use crate::template::{self, VarContext};

/// Message attached to requests skipped after a `stop_on_failure` trigger
pub const SKIPPED_MESSAGE: &str = "Skipped due to previous failure";

/// Streaming hooks fired during a run.
///
/// Observational only: implementations must not affect control flow or
/// ordering. All methods default to no-ops.
pub trait RunObserver: Send + Sync {
    fn on_request_start(&self, _request: &RequestDef, _execution_order: usize) {}

    fn on_request_complete(&self, _result: &ExecutionResult) {}

    fn on_assertion(&self, _request: &RequestDef, _result: &AssertionResult) {}

    fn on_variable_extracted(&self, _request: &RequestDef, _name: &str, _value: &JsonValue) {}
}

/// Sequential test runner over a shared HTTP client.
pub struct TestEngine {
    client: HttpClient,
    observer: Option<Arc<dyn RunObserver>>,
}

impl TestEngine {
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Engine with a non-default per-request timeout; individual requests
    /// may still override it via `timeout_ms`.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Ok(TestEngine {
            client: HttpClient::new(timeout)?,
            observer: None,
        })
    }

    pub fn observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Execute a collection of requests in order.
    ///
    /// `request_id_subset` restricts the run to matching request ids;
    /// ordering still follows `order_index`.
    pub async fn execute_collection(
        &self,
        requests: &[RequestDef],
        collection: &CollectionConfig,
        environment: Option<&EnvironmentConfig>,
        runtime_variables: Option<&IndexMap<String, JsonValue>>,
        request_id_subset: Option<&[String]>,
        stop_on_failure: bool,
    ) -> CollectionResult {
        let started_at = Utc::now();

        let mut context = template::build_context(
            environment.map(|e| &e.variables),
            Some(&collection.variables),
            runtime_variables,
            None,
        );

        let mut selected: Vec<&RequestDef> = requests.iter().collect();
        if let Some(subset) = request_id_subset {
            selected.retain(|r| {
                r.id.as_deref()
                    .map(|id| subset.iter().any(|wanted| wanted == id))
                    .unwrap_or(false)
            });
        }
        selected.sort_by_key(|r| r.order_index);

        info!(
            collection = %collection.name,
            requests = selected.len(),
            stop_on_failure,
            "starting collection run"
        );

        let mut results = Vec::with_capacity(selected.len());

        for (order, request) in selected.iter().enumerate() {
            if let Some(observer) = &self.observer {
                observer.on_request_start(request, order);
            }

            let mut result = self
                .execute_single_request(request, collection, environment, &context)
                .await;
            result.execution_order = order;

            // chaining: later requests observe extracted values
            for (name, value) in &result.extracted_variables {
                context.insert(name.clone(), value.clone());
            }

            if let Some(observer) = &self.observer {
                observer.on_request_complete(&result);
            }

            let run_failed = matches!(result.status, RunStatus::Failed | RunStatus::Error);
            results.push(result);

            if stop_on_failure && run_failed {
                warn!(
                    request = %request.name,
                    remaining = selected.len() - order - 1,
                    "stopping run, marking remaining requests skipped"
                );
                for (skipped_order, remaining) in
                    selected.iter().enumerate().skip(order + 1)
                {
                    let mut skipped = ExecutionResult::new(RunStatus::Skipped, skipped_order);
                    skipped.request_id = remaining.id.clone();
                    skipped.request_name = Some(remaining.name.clone());
                    skipped.error = Some(ExecutionError {
                        message: SKIPPED_MESSAGE.to_string(),
                        kind: ErrorKind::Execution,
                    });
                    if let Some(observer) = &self.observer {
                        observer.on_request_complete(&skipped);
                    }
                    results.push(skipped);
                }
                break;
            }
        }

        let run = CollectionResult {
            results,
            started_at: Some(started_at),
            finished_at: Some(Utc::now()),
        };
        info!(
            total = run.total(),
            passed = run.passed(),
            failed = run.failed(),
            skipped = run.skipped(),
            errored = run.errored(),
            "collection run finished"
        );
        run
    }

    /// Execute one request against the given variable context.
    pub async fn execute_single_request(
        &self,
        request: &RequestDef,
        collection: &CollectionConfig,
        environment: Option<&EnvironmentConfig>,
        context: &VarContext,
    ) -> ExecutionResult {
        let mut result = ExecutionResult::new(RunStatus::Passed, 0);
        result.request_id = request.id.clone();
        result.request_name = Some(request.name.clone());
        result.started_at = Some(Utc::now());

        let url = self.resolve_url(request, collection, environment, context);
        let method = request.method.to_uppercase();

        let mut headers = merge_headers(request, collection, environment);
        let mut params = request.query_params.clone();

        let auth = environment
            .and_then(|e| e.auth_config.as_ref())
            .or(collection.auth_config.as_ref());
        if let Some(auth) = auth {
            apply_auth(auth, context, &mut headers, &mut params);
        }

        let headers = template::resolve_string_map(&headers, context);
        let params = template::resolve_string_map(&params, context);
        let body = resolve_body(&request.body, context);
        let timeout = request.timeout_ms.map(Duration::from_millis);

        result.resolved_url = Some(url.clone());
        result.resolved_method = Some(method.clone());
        result.resolved_headers = Some(headers.clone());
        result.resolved_body = body.display_text();

        debug!(name = %request.name, method = %method, url = %url, "executing request");

        let response = self
            .client
            .request(&method, &url, &headers, &params, body, timeout)
            .await;

        if let Some(failure) = &response.error {
            warn!(name = %request.name, error = %failure.message, "request transport failure");
            result.status = RunStatus::Error;
            result.error = Some(ExecutionError {
                message: failure.message.clone(),
                kind: failure.kind,
            });
            result.finished_at = Some(Utc::now());
            return result;
        }

        result.response = Some(ResponseInfo {
            status_code: response.status_code,
            headers: response.headers.clone(),
            body: response.body.clone(),
            size_bytes: response.size_bytes,
            elapsed_ms: response.elapsed_ms,
        });

        let assertion_results = assertions::run_all(&request.assertions, &response, context);
        if let Some(observer) = &self.observer {
            for assertion in &assertion_results {
                observer.on_assertion(request, assertion);
            }
        }
        // zero assertions counts as passed
        let all_passed = assertion_results.iter().all(|a| a.passed);
        result.status = if all_passed {
            RunStatus::Passed
        } else {
            RunStatus::Failed
        };
        result.assertion_results = assertion_results;

        for extraction in &request.variable_extractions {
            let (name, value) = assertions::extract_variable(extraction, &response);
            if let Some(observer) = &self.observer {
                observer.on_variable_extracted(request, &name, &value);
            }
            result.extracted_variables.insert(name, value);
        }

        result.finished_at = Some(Utc::now());
        result
    }

    fn resolve_url(
        &self,
        request: &RequestDef,
        collection: &CollectionConfig,
        environment: Option<&EnvironmentConfig>,
        context: &VarContext,
    ) -> String {
        let path = template::resolve(&request.url_path, context);
        if path.starts_with("http://") || path.starts_with("https://") {
            return path;
        }

        let base = environment
            .and_then(|e| e.base_url.as_deref())
            .or(collection.base_url.as_deref())
            .unwrap_or("");
        let base = template::resolve(base, context);

        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Header layering: collection defaults, then environment overrides, then
/// the request's own headers. Later layers win on key collision.
fn merge_headers(
    request: &RequestDef,
    collection: &CollectionConfig,
    environment: Option<&EnvironmentConfig>,
) -> IndexMap<String, String> {
    let mut headers = IndexMap::new();
    for (name, value) in &collection.default_headers {
        headers.insert(name.clone(), value.clone());
    }
    if let Some(env) = environment {
        for (name, value) in &env.default_headers {
            headers.insert(name.clone(), value.clone());
        }
    }
    for (name, value) in &request.headers {
        headers.insert(name.clone(), value.clone());
    }
    headers
}

fn apply_auth(
    auth: &AuthConfig,
    context: &VarContext,
    headers: &mut IndexMap<String, String>,
    params: &mut IndexMap<String, String>,
) {
    match auth {
        AuthConfig::Bearer { token } => {
            let token = template::resolve(token, context);
            headers.insert("Authorization".to_string(), format!("Bearer {}", token));
        }
        AuthConfig::Basic { username, password } => {
            let username = template::resolve(username, context);
            let password = template::resolve(password, context);
            let encoded = STANDARD.encode(format!("{}:{}", username, password));
            headers.insert("Authorization".to_string(), format!("Basic {}", encoded));
        }
        AuthConfig::ApiKey {
            key,
            value,
            location,
        } => {
            let key = template::resolve(key, context);
            let value = template::resolve(value, context);
            match location {
                ApiKeyLocation::Header => {
                    headers.insert(key, value);
                }
                ApiKeyLocation::Query => {
                    params.insert(key, value);
                }
            }
        }
        AuthConfig::None => {}
    }
}

fn resolve_body(body: &RequestBody, context: &VarContext) -> SendBody {
    match body {
        RequestBody::None => SendBody::None,
        RequestBody::Json(value) => {
            if value.is_null() {
                SendBody::None
            } else {
                SendBody::Json(template::resolve_value(value, context))
            }
        }
        RequestBody::Form(fields) => {
            let mut form = IndexMap::new();
            for (name, value) in fields {
                let name = template::resolve(name, context);
                let value = match value {
                    JsonValue::String(s) => template::resolve(s, context),
                    other => template::resolve_value(other, context).to_string(),
                };
                form.insert(name, value);
            }
            SendBody::Form(form)
        }
        RequestBody::Raw(text) => SendBody::Raw(template::resolve(text, context)),
        RequestBody::Graphql(graphql) => {
            let query = template::resolve(&graphql.query, context);
            let variables = template::resolve_value_map(&graphql.variables, context);
            SendBody::Json(json!({ "query": query, "variables": variables }))
        }
    }
}
