//! CLI argument parsing and command dispatch

pub mod args;

pub use args::{Args, Command, ConvertArgs, EngineArg, InspectArgs, RunArgs};

use std::fs;
use std::time::Duration;

use clap::Parser;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::engine::TestEngine;
use crate::errors::{ApipulseError, Result};
use crate::gherkin::{self, ConvertOptions};
use crate::models::{
    load_collection, load_environment, CollectionFile, CollectionResult, EngineKind, RunStatus,
};
use crate::queue::{JobQueue, RedisBroker};
use crate::remote::RemoteEngine;
use crate::status::ExitStatus;

/// Parse arguments and run the selected command.
pub async fn run() -> ExitStatus {
    let args = Args::parse();
    match dispatch(args).await {
        Ok(status) => status,
        Err(err) => {
            eprintln!("apipulse: error: {}", err);
            ExitStatus::Error
        }
    }
}

async fn dispatch(args: Args) -> Result<ExitStatus> {
    match args.command {
        Command::Run(run) => run_collection(run).await,
        Command::Convert(convert) => convert_file(&convert),
        Command::Inspect(inspect) => inspect_feature(&inspect),
    }
}

async fn run_collection(args: RunArgs) -> Result<ExitStatus> {
    let file = load_collection(&args.collection)?;

    let environment = match &args.environment {
        Some(path) => Some(load_environment(path)?),
        None => None,
    };

    let runtime_vars = parse_vars(&args.vars)?;
    let runtime_vars = (!runtime_vars.is_empty()).then_some(runtime_vars);
    let subset = (!args.request_ids.is_empty()).then_some(args.request_ids.as_slice());

    let engine_kind = args
        .engine
        .map(EngineKind::from)
        .unwrap_or(file.collection.default_engine);

    let result = match engine_kind {
        EngineKind::Native => {
            let engine = match args.timeout {
                Some(secs) => TestEngine::with_timeout(Duration::from_secs(secs))?,
                None => TestEngine::new()?,
            };
            engine
                .execute_collection(
                    &file.requests,
                    &file.collection,
                    environment.as_ref(),
                    runtime_vars.as_ref(),
                    subset,
                    args.stop_on_failure,
                )
                .await
        }
        EngineKind::Remote => {
            let queue = JobQueue::new(RedisBroker::new(&args.redis_url))
                .with_result_timeout(Duration::from_secs(args.result_timeout));
            RemoteEngine::new(queue)
                .execute_collection(
                    &file.requests,
                    &file.collection,
                    environment.as_ref(),
                    runtime_vars.as_ref(),
                    subset,
                )
                .await?
        }
    };

    if args.json {
        let document = serde_json::json!({
            "summary": result.summary(),
            "results": result.results,
            "started_at": result.started_at,
            "finished_at": result.finished_at,
        });
        println!("{}", serde_json::to_string_pretty(&document)?);
    } else {
        print_summary(&result);
    }

    Ok(ExitStatus::from_run(result.all_passed()))
}

fn print_summary(result: &CollectionResult) {
    for item in &result.results {
        let name = item.request_name.as_deref().unwrap_or("(unnamed)");
        let marker = match item.status {
            RunStatus::Passed => "PASS",
            RunStatus::Failed => "FAIL",
            RunStatus::Skipped => "SKIP",
            RunStatus::Error => "ERROR",
        };
        match &item.response {
            Some(response) => println!(
                "{:<5} {} ({} in {}ms)",
                marker, name, response.status_code, response.elapsed_ms
            ),
            None => println!("{:<5} {}", marker, name),
        }
        for assertion in item.assertion_results.iter().filter(|a| !a.passed) {
            println!("      {}: {}", assertion.kind, assertion.message);
        }
        if let Some(error) = &item.error {
            println!("      error: {}", error.message);
        }
    }

    let summary = result.summary();
    println!();
    println!(
        "{} requests: {} passed, {} failed, {} skipped, {} errored",
        summary.total, summary.passed, summary.failed, summary.skipped, summary.errored
    );
    println!(
        "Assertions: {} passed, {} failed",
        summary.passed_assertions, summary.failed_assertions
    );
    if let Some(duration) = summary.duration_ms {
        println!("Duration: {}ms", duration);
    }
}

fn convert_file(args: &ConvertArgs) -> Result<ExitStatus> {
    let is_feature = args
        .input
        .extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("feature"));

    let rendered = if is_feature {
        let content = fs::read_to_string(&args.input)?;
        let (collection, requests) = gherkin::to_requests(&content);
        let file = CollectionFile {
            collection,
            requests,
        };
        serde_yaml::to_string(&file)?
    } else {
        let file = load_collection(&args.input)?;
        let options = ConvertOptions {
            feature_name: args.feature_name.clone(),
            include_background: !args.no_background,
            capture_http_details: !args.no_capture,
        };
        gherkin::to_feature_with(&file.requests, &file.collection, &options)
    };

    match &args.output {
        Some(path) => fs::write(path, rendered.as_bytes())?,
        None => print!("{}", rendered),
    }
    Ok(ExitStatus::Success)
}

fn inspect_feature(args: &InspectArgs) -> Result<ExitStatus> {
    let content = fs::read_to_string(&args.feature)?;
    let outline = gherkin::outline::parse(&content);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outline)?);
    } else {
        println!("Feature: {}", outline.name);
        if let Some(description) = &outline.description {
            for line in description.lines() {
                println!("  {}", line);
            }
        }
        if let Some(background) = &outline.background {
            println!("Background: {} steps", background.steps.len());
        }
        println!("Scenarios: {}", outline.scenarios.len());
        for scenario in &outline.scenarios {
            let kind = if scenario.is_outline { " (outline)" } else { "" };
            println!(
                "  line {:>4}  {}{}  [{} steps]",
                scenario.line_number,
                scenario.name,
                kind,
                scenario.steps.len()
            );
        }
        let tags = outline.all_tags();
        if !tags.is_empty() {
            println!("Tags: {}", tags.join(" "));
        }
    }

    let problems = outline.validate();
    if problems.is_empty() {
        return Ok(ExitStatus::Success);
    }
    for problem in &problems {
        eprintln!("problem: {}", problem);
    }
    Ok(ExitStatus::Error)
}

/// NAME=VALUE pairs; values that parse as JSON keep their type, everything
/// else is a string.
fn parse_vars(pairs: &[String]) -> Result<IndexMap<String, JsonValue>> {
    let mut vars = IndexMap::new();
    for pair in pairs {
        let Some((name, value)) = pair.split_once('=') else {
            return Err(ApipulseError::Argument(format!(
                "expected NAME=VALUE, got '{}'",
                pair
            )));
        };
        if name.is_empty() {
            return Err(ApipulseError::Argument(format!(
                "variable name missing in '{}'",
                pair
            )));
        }
        let parsed = serde_json::from_str(value)
            .unwrap_or_else(|_| JsonValue::String(value.to_string()));
        vars.insert(name.to_string(), parsed);
    }
    Ok(vars)
}
