//! Common test utilities for apipulse integration tests
//!
//! Provides:
//! - CLI invocation helpers built on `CARGO_BIN_EXE`
//! - Exit status mapping matching the binary
//! - Fixture file helpers backed by tempfile

use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

use tempfile::TempDir;

/// Exit status codes matching the apipulse binary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success = 0,
    Error = 1,
    AssertionFailed = 10,
}

impl From<i32> for ExitStatus {
    fn from(code: i32) -> Self {
        match code {
            0 => ExitStatus::Success,
            10 => ExitStatus::AssertionFailed,
            _ => ExitStatus::Error,
        }
    }
}

/// Result of running the apipulse CLI
#[derive(Debug)]
pub struct CliResponse {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// Exit status
    pub exit_status: ExitStatus,
    /// Raw exit code
    pub exit_code: i32,
}

impl CliResponse {
    /// Check if stdout contains a substring
    pub fn contains(&self, needle: &str) -> bool {
        self.stdout.contains(needle)
    }

    /// Parse stdout as a JSON document
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.stdout).unwrap_or_else(|e| {
            panic!("stdout is not valid JSON ({}): {}", e, self.stdout);
        })
    }
}

impl std::fmt::Display for CliResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.stdout)
    }
}

impl std::ops::Deref for CliResponse {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.stdout
    }
}

/// Run the apipulse CLI with the given arguments
///
/// # Arguments
/// * `args` - Command line arguments (excluding the program name)
///
/// # Returns
/// A `CliResponse` with stdout, stderr, and exit status
pub fn apipulse(args: &[&str]) -> CliResponse {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_apipulse"));
    cmd.args(args);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let output = cmd.output().expect("Failed to run apipulse");
    parse_output(output)
}

fn parse_output(output: Output) -> CliResponse {
    let exit_code = output.status.code().unwrap_or(-1);
    CliResponse {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_status: ExitStatus::from(exit_code),
        exit_code,
    }
}

/// Write a fixture file into a temp directory, returning its path
pub fn write_fixture(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).expect("Failed to write fixture");
    path
}

/// A minimal passing collection pointed at `base_url`
pub fn users_collection_yaml(base_url: &str) -> String {
    format!(
        r#"name: User API
base_url: {base_url}
variables:
  user_id: 1
requests:
  - name: Get user
    method: GET
    url_path: /users/{{{{user_id}}}}
    assertions:
      - type: status
        config:
          operator: equals
          expected: 200
      - type: jsonpath
        config:
          path: $.name
          operator: equals
          expected: ada
"#
    )
}
