//! `upfetch` is a configurable async request helper over a pluggable transport.
//!
//! A request function created with [`up`] or [`UpFetch::new`] merges default
//! and per-call [`Options`], serializes params and body, executes through a
//! [`Transport`], retries per [`RetryPolicy`], and resolves to parsed data:
//! - [`UpFetch::fetch`] returns the parsed [`Payload`]
//! - [`UpFetch::fetch_with`] validates it against a [`StandardSchema`]
//! - [`UpFetch::fetch_json`] deserializes it with serde

mod body;
mod client;
mod error;
mod options;
mod params;
mod retry;
mod schema;
mod transport;
mod types;

pub use body::{is_jsonifiable, parse_payload, serialize_body, Body, Payload};
pub use client::{up, UpFetch};
pub use error::{
    is_response_error, is_validation_error, FetchError, ResponseError, TransportError,
    ValidationError,
};
pub use options::{
    BodySerializer, OnError, OnRequest, OnRetry, OnSuccess, Options, ParamsSerializer, RejectFn,
    ResponseParser,
};
pub use params::{serialize_params, Params};
pub use retry::{
    default_retry_when, Attempts, Delay, RetryContext, RetryOutcome, RetryPolicy, RetryWhen,
};
pub use schema::{schema_fn, FnSchema, Issue, PathSegment, SerdeSchema, StandardSchema};
pub use transport::{transport_fn, FnTransport, Transport};
pub use types::{Request, Response};

pub use tokio_util::sync::CancellationToken;

pub type Result<T> = std::result::Result<T, FetchError>;
