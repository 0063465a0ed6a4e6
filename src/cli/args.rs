//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};

use crate::models::EngineKind;

/// apipulse - run API test collections natively or through a worker pool
#[derive(Parser, Debug)]
#[command(name = "apipulse", version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute a collection of requests
    Run(RunArgs),
    /// Convert a collection to a Gherkin feature, or a feature back to a
    /// collection
    Convert(ConvertArgs),
    /// Show the structure of a feature file and validate it
    Inspect(InspectArgs),
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Collection file (YAML or JSON)
    #[arg(value_name = "COLLECTION")]
    pub collection: PathBuf,

    /// Environment file whose settings override the collection's
    #[arg(short = 'e', long = "environment", value_name = "FILE")]
    pub environment: Option<PathBuf>,

    /// Execution backend; defaults to the collection's default_engine
    #[arg(long = "engine", value_name = "ENGINE", value_enum)]
    pub engine: Option<EngineArg>,

    /// Set a runtime variable (NAME=VALUE). JSON values keep their type.
    #[arg(long = "var", value_name = "NAME=VALUE")]
    pub vars: Vec<String>,

    /// Run only the requests with these ids
    #[arg(long = "request-id", value_name = "ID")]
    pub request_ids: Vec<String>,

    /// Stop at the first failed request and mark the rest skipped
    #[arg(long = "stop-on-failure", action = ArgAction::SetTrue)]
    pub stop_on_failure: bool,

    /// Per-request timeout in seconds (native engine)
    #[arg(long = "timeout", value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Redis endpoint for the remote engine
    #[arg(
        long = "redis-url",
        value_name = "URL",
        env = "REDIS_URL",
        default_value = "redis://127.0.0.1:6379"
    )]
    pub redis_url: String,

    /// How long to wait for the remote result, in seconds
    #[arg(long = "result-timeout", value_name = "SECONDS", default_value = "300")]
    pub result_timeout: u64,

    /// Print the full results as JSON instead of the text summary
    #[arg(long = "json", action = ArgAction::SetTrue)]
    pub json: bool,
}

#[derive(clap::Args, Debug)]
pub struct ConvertArgs {
    /// Collection file (YAML/JSON) to convert to a feature, or a .feature
    /// file to convert back to a collection
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output file (stdout when omitted)
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Feature name override
    #[arg(long = "feature-name", value_name = "NAME")]
    pub feature_name: Option<String>,

    /// Skip the shared Background section
    #[arg(long = "no-background", action = ArgAction::SetTrue)]
    pub no_background: bool,

    /// Skip the HTTP capture instrumentation steps
    #[arg(long = "no-capture", action = ArgAction::SetTrue)]
    pub no_capture: bool,
}

#[derive(clap::Args, Debug)]
pub struct InspectArgs {
    /// Feature file to inspect
    #[arg(value_name = "FEATURE")]
    pub feature: PathBuf,

    /// Print the outline as JSON
    #[arg(long = "json", action = ArgAction::SetTrue)]
    pub json: bool,
}

/// Execution backend choice.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum EngineArg {
    /// In-process sequential execution
    Native,
    /// Convert to Gherkin and offload to the worker pool
    Remote,
}

impl From<EngineArg> for EngineKind {
    fn from(arg: EngineArg) -> Self {
        match arg {
            EngineArg::Native => EngineKind::Native,
            EngineArg::Remote => EngineKind::Remote,
        }
    }
}
