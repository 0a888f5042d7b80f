//! `restcall` is a typed, retry-capable REST request pipeline.
//!
//! A call is described declaratively (method, base URL, `{name}` path
//! template, path/query parameters, headers, body) and yields a
//! [`TypedResponse`] decoded into the caller's type:
//! - [`UrlBuilder`] / [`build_url`] resolve the final URL
//! - [`Encoding`] marshals bodies (JSON by default)
//! - [`BackoffPolicy`] paces retries
//! - [`Retry`] re-issues transient failures (5xx, 429, transport errors)
//! - [`RequestContext`] ties it together with before/after hooks and a
//!   [`CallContext`] governing the whole call

mod backoff;
mod client;
mod context;
mod encoding;
mod error;
mod options;
mod request;
mod response;
mod retry;
mod transport;
mod url_builder;

pub use backoff::{BackoffKind, BackoffPolicy};
pub use client::Client;
pub use context::{CallContext, CancelHandle};
pub use encoding::{DefaultEncoding, Encoding, JsonEncoding, DEFAULT_CONTENT_TYPE};
pub use error::{BoxError, RestCallError, SendError};
pub use options::ClientOptions;
pub use request::{AfterHook, BeforeHook, RequestContext, RequestModel, ResolvedRequest};
pub use response::TypedResponse;
pub use retry::{is_retryable_status, AttemptCounter, BodySupplier, Delivery, Retry, DRAIN_LIMIT};
pub use transport::{Transport, TransportFuture};
pub use url_builder::{build_url, substitute_path, PathParams, QueryParams, UrlBuilder};

pub use reqwest::{header, Method, StatusCode};
pub use url::Url;

pub type Result<T> = std::result::Result<T, RestCallError>;
