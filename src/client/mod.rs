//! HTTP execution layer

pub mod http;

pub use http::{
    HttpClient, HttpResponse, SendBody, TransportError, DEFAULT_TIMEOUT_SECS,
    MAX_RESPONSE_BODY_SIZE,
};
