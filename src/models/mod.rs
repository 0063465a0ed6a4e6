//! Core data model: collections, requests, assertions, and run results
//!
//! # Why IndexMap?
//!
//! We use [`indexmap::IndexMap`] for headers, query parameters, and variable
//! maps to preserve insertion order. Header layering and variable precedence
//! are defined by merge order, not iteration order, but keeping the user's
//! order makes serialized output and request logs reproducible.

pub mod assertion;
pub mod collection;
pub mod request;
pub mod result;

pub use assertion::{
    AssertionSpec, BodyContainsCheck, BodyEqualsCheck, Check, CheckSpec, CompareOp, HeaderCheck,
    JsonpathCheck, SchemaCheck, StatusCheck, StatusOp, TimingCheck, UnknownCheck,
};
pub use collection::{
    load_collection, load_environment, validate_collection, ApiKeyLocation, AuthConfig,
    CollectionConfig, CollectionFile, EngineKind, EnvironmentConfig,
};
pub use request::{ExtractionSource, GraphqlBody, RequestBody, RequestDef, VariableExtraction};
pub use result::{
    AssertionResult, CollectionResult, ErrorKind, ExecutionError, ExecutionResult, ResponseInfo,
    RunStatus, RunSummary,
};
