//! Remote execution backend
//!
//! Converts a collection to feature text, submits it to the job queue, waits
//! for the worker pool to publish a result, and lifts the report back into
//! the execution results the native engine produces. Worker failures and
//! result timeouts surface as error results for every submitted request, so
//! callers see one shape regardless of how the run ended.

use chrono::Utc;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use crate::errors::Result;
use crate::gherkin;
use crate::models::{
    CollectionConfig, CollectionResult, EnvironmentConfig, ErrorKind, ExecutionError,
    ExecutionResult, RequestDef, RunStatus,
};
use crate::queue::{Broker, JobQueue, JobSpec, JobStatus, RedisBroker};
use crate::report;
use crate::template;

pub struct RemoteEngine<B> {
    queue: JobQueue<B>,
}

impl RemoteEngine<RedisBroker> {
    pub fn connect(redis_url: &str) -> Self {
        RemoteEngine::new(JobQueue::new(RedisBroker::new(redis_url)))
    }
}

impl<B: Broker> RemoteEngine<B> {
    pub fn new(queue: JobQueue<B>) -> Self {
        RemoteEngine { queue }
    }

    /// Run a collection through the worker pool.
    ///
    /// `stop_on_failure` has no remote equivalent: the worker always runs
    /// the whole feature.
    pub async fn execute_collection(
        &self,
        requests: &[RequestDef],
        collection: &CollectionConfig,
        environment: Option<&EnvironmentConfig>,
        runtime_variables: Option<&IndexMap<String, JsonValue>>,
        request_id_subset: Option<&[String]>,
    ) -> Result<CollectionResult> {
        let started_at = Utc::now();

        let effective = effective_collection(collection, environment);

        let mut selected: Vec<RequestDef> = requests.to_vec();
        if let Some(subset) = request_id_subset {
            selected.retain(|r| r.id.as_ref().map_or(false, |id| subset.contains(id)));
        }
        selected.sort_by_key(|r| r.order_index);

        let feature = gherkin::to_feature(&selected, &effective);
        let env_vars: IndexMap<String, JsonValue> = template::build_context(
            environment.map(|e| &e.variables),
            Some(&collection.variables),
            runtime_variables,
            None,
        )
        .into_iter()
        .collect();

        let mut config = serde_json::Map::new();
        if let Some(base_url) = &effective.base_url {
            config.insert("baseUrl".to_string(), JsonValue::String(base_url.clone()));
        }

        let job_id = self
            .queue
            .submit(JobSpec {
                feature,
                config: JsonValue::Object(config),
                env_vars,
                tags: Vec::new(),
                additional_files: IndexMap::new(),
            })
            .await?;
        info!(job_id = %job_id, requests = selected.len(), "Submitted remote run");

        let job_result = self.queue.wait_for_result(&job_id).await?;

        let mut collection_result = CollectionResult {
            results: Vec::new(),
            started_at: Some(started_at),
            finished_at: Some(Utc::now()),
        };

        match job_result.status {
            JobStatus::Complete => {
                let report_json = job_result.report.unwrap_or(JsonValue::Null);
                let scenarios = report::parse_report(&report_json, &job_result.http_captures);
                collection_result.results = report::unify(&scenarios, &selected, &effective);
                info!(
                    total = collection_result.results.len(),
                    passed = collection_result.passed(),
                    failed = collection_result.failed(),
                    "Remote run finished"
                );
            }
            status => {
                let kind = if status == JobStatus::Timeout {
                    ErrorKind::Timeout
                } else {
                    ErrorKind::Remote
                };
                let message = job_result
                    .error
                    .unwrap_or_else(|| format!("Remote job ended with status {}", status));
                warn!(job_id = %job_id, status = %status, message = %message, "Remote run failed");

                collection_result.results = selected
                    .iter()
                    .enumerate()
                    .map(|(index, request)| {
                        let mut result = ExecutionResult::new(RunStatus::Error, index);
                        result.request_id = request.id.clone();
                        result.request_name = Some(request.name.clone());
                        result.error = Some(ExecutionError {
                            message: message.clone(),
                            kind,
                        });
                        result
                    })
                    .collect();
            }
        }

        Ok(collection_result)
    }

    pub async fn queue_stats(&self) -> Result<crate::queue::QueueStats> {
        self.queue.stats().await
    }
}

/// Environment settings override their collection counterparts; headers
/// merge per key with the environment winning.
fn effective_collection(
    collection: &CollectionConfig,
    environment: Option<&EnvironmentConfig>,
) -> CollectionConfig {
    let mut effective = collection.clone();
    if let Some(env) = environment {
        if env.base_url.is_some() {
            effective.base_url = env.base_url.clone();
        }
        if env.auth_config.is_some() {
            effective.auth_config = env.auth_config.clone();
        }
        for (key, value) in &env.default_headers {
            effective
                .default_headers
                .insert(key.clone(), value.clone());
        }
    }
    effective
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{JobResult, MemoryBroker};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn requests() -> Vec<RequestDef> {
        vec![
            serde_json::from_value(json!({
                "id": "r1",
                "name": "Get user",
                "url_path": "/users/1",
                "assertions": [{"type": "status", "config": {"expected": 200}}]
            }))
            .unwrap(),
            serde_json::from_value(json!({
                "id": "r2",
                "name": "List users",
                "url_path": "/users"
            }))
            .unwrap(),
        ]
    }

    fn collection() -> CollectionConfig {
        CollectionConfig {
            name: "User API".to_string(),
            base_url: Some("https://api.example.com".to_string()),
            ..Default::default()
        }
    }

    fn engine_pair(
        timeout: Duration,
    ) -> (RemoteEngine<Arc<MemoryBroker>>, JobQueue<Arc<MemoryBroker>>) {
        let broker = Arc::new(MemoryBroker::new());
        let engine = RemoteEngine::new(
            JobQueue::new(broker.clone())
                .with_result_timeout(timeout)
                .with_poll_interval(Duration::from_millis(5)),
        );
        (engine, JobQueue::new(broker))
    }

    async fn run_fake_worker(worker: JobQueue<Arc<MemoryBroker>>) {
        loop {
            if let Some(job) = worker.take_job().await.unwrap() {
                worker.mark_running(&job.id).await.unwrap();

                let outline = gherkin::outline::parse(&job.feature);
                let elements: Vec<JsonValue> = outline
                    .scenarios
                    .iter()
                    .map(|scenario| {
                        json!({
                            "type": "scenario",
                            "name": scenario.name,
                            "steps": [
                                {"keyword": "When ", "name": "method get", "result": {"status": "passed", "duration": 3_000_000}},
                                {"keyword": "Then ", "name": "status 200", "result": {"status": "passed", "duration": 1_000_000}}
                            ]
                        })
                    })
                    .collect();

                let captures = vec![json!({
                    "scenarioName": "Get user",
                    "request": {"method": "get", "url": "https://api.example.com/users/1"},
                    "response": {"status": 200, "body": {"id": 1}, "time": 12}
                })];

                worker
                    .store_result(&JobResult {
                        job_id: job.id,
                        status: JobStatus::Complete,
                        started_at: Some(Utc::now()),
                        finished_at: Some(Utc::now()),
                        duration_ms: Some(40),
                        report: Some(json!([{ "elements": elements }])),
                        http_captures: captures,
                        error: None,
                    })
                    .await
                    .unwrap();
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    #[tokio::test]
    async fn test_remote_run_round_trip() {
        let (engine, worker) = engine_pair(Duration::from_secs(2));
        let worker_task = tokio::spawn(run_fake_worker(worker));

        let result = engine
            .execute_collection(&requests(), &collection(), None, None, None)
            .await
            .unwrap();
        worker_task.await.unwrap();

        // the capture scenario never becomes a result
        assert_eq!(result.results.len(), 2);
        assert!(result.all_passed());

        let get_user = &result.results[0];
        assert_eq!(get_user.request_name.as_deref(), Some("Get user"));
        assert_eq!(get_user.request_id.as_deref(), Some("r1"));
        assert_eq!(
            get_user.resolved_url.as_deref(),
            Some("https://api.example.com/users/1")
        );
        let response = get_user.response.as_ref().unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(response.elapsed_ms, 12);

        // no capture for this one: definition details stand in, url joined
        let list_users = &result.results[1];
        assert_eq!(
            list_users.resolved_url.as_deref(),
            Some("https://api.example.com/users")
        );
        assert!(list_users.response.is_none());
    }

    #[tokio::test]
    async fn test_remote_worker_error_marks_all_requests() {
        let (engine, worker) = engine_pair(Duration::from_secs(2));

        let worker_task = tokio::spawn(async move {
            loop {
                if let Some(job) = worker.take_job().await.unwrap() {
                    worker
                        .store_result(&JobResult {
                            job_id: job.id,
                            status: JobStatus::Error,
                            started_at: None,
                            finished_at: None,
                            duration_ms: None,
                            report: None,
                            http_captures: Vec::new(),
                            error: Some("Worker exited with code 1".to_string()),
                        })
                        .await
                        .unwrap();
                    return;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        });

        let result = engine
            .execute_collection(&requests(), &collection(), None, None, None)
            .await
            .unwrap();
        worker_task.await.unwrap();

        assert_eq!(result.results.len(), 2);
        assert_eq!(result.errored(), 2);
        let error = result.results[0].error.as_ref().unwrap();
        assert_eq!(error.kind, ErrorKind::Remote);
        assert_eq!(error.message, "Worker exited with code 1");
    }

    #[tokio::test]
    async fn test_remote_timeout_marks_all_requests() {
        let (engine, _worker) = engine_pair(Duration::from_millis(30));

        let result = engine
            .execute_collection(&requests(), &collection(), None, None, None)
            .await
            .unwrap();

        assert_eq!(result.errored(), 2);
        let error = result.results[0].error.as_ref().unwrap();
        assert_eq!(error.kind, ErrorKind::Timeout);
        assert!(error.message.contains("did not complete"));
    }

    #[test]
    fn test_effective_collection_overrides() {
        let mut collection = collection();
        collection
            .default_headers
            .insert("Accept".to_string(), "application/json".to_string());

        let mut env = EnvironmentConfig::default();
        env.base_url = Some("https://staging.example.com".to_string());
        env.default_headers
            .insert("X-Env".to_string(), "staging".to_string());

        let effective = effective_collection(&collection, Some(&env));

        assert_eq!(
            effective.base_url.as_deref(),
            Some("https://staging.example.com")
        );
        assert_eq!(effective.default_headers.len(), 2);
        assert_eq!(
            effective.default_headers.get("X-Env").map(String::as_str),
            Some("staging")
        );
    }
}
