//! apipulse library interface
//!
//! A dual-backend runner for API test collections: requests execute either
//! in-process over HTTP or as a Gherkin feature handed to an external worker
//! pool through a Redis job queue. Both paths produce the same result shape.
//!
//! # Module Organization
//!
//! - [`models`] - Collections, requests, assertions, and run results
//! - [`template`] - `{{variable}}` resolution and context building
//! - [`client`] - HTTP transport on top of reqwest
//! - [`assertions`] - Response checks and variable extraction
//! - [`engine`] - Native sequential execution
//! - [`gherkin`] - Feature text conversion and outline parsing
//! - [`queue`] - Redis-backed job queue for remote runs
//! - [`report`] - Cucumber report parsing and result unification
//! - [`remote`] - Remote execution backend tying the above together
//! - [`cli`] - Command-line interface

pub mod assertions;
pub mod cli;
pub mod client;
pub mod engine;
pub mod errors;
pub mod gherkin;
pub mod models;
pub mod queue;
pub mod remote;
pub mod report;
pub mod status;
pub mod template;

pub use errors::{ApipulseError, Result};
pub use status::ExitStatus;
