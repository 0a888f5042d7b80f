use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;
use reqwest::{
    header::{self, HeaderMap, HeaderName, HeaderValue},
    Method,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value as JsonValue;
use url::Url;

use crate::{
    encoding::decode_value, url_builder::build_url, BodySupplier, BoxError, CallContext,
    DefaultEncoding, Encoding, PathParams, QueryParams, RestCallError, Result, Retry, SendError,
    Transport, TypedResponse,
};

/// Declarative description of one logical call.
#[derive(Clone, Debug)]
pub struct RequestModel {
    pub method: Method,
    pub base_url: String,
    /// Path template with `{name}` placeholders.
    pub operation_path: String,
    pub path_params: PathParams,
    pub query_params: QueryParams,
    pub headers: HeaderMap,
    /// Body in the serde data model; marshaled once per call.
    pub body: Option<JsonValue>,
    /// Per-request codec; replaces the client and default encodings.
    pub encoding: Option<Arc<dyn Encoding>>,
    pub context: CallContext,
}

impl RequestModel {
    pub fn new(method: Method, base_url: impl Into<String>, operation_path: impl Into<String>) -> Self {
        Self {
            method,
            base_url: base_url.into(),
            operation_path: operation_path.into(),
            path_params: PathParams::new(),
            query_params: QueryParams::new(),
            headers: HeaderMap::new(),
            body: None,
            encoding: None,
            context: CallContext::new(),
        }
    }

    /// Resolves URL and body into a wire-ready request.
    pub fn resolve(&self, fallback: Option<&dyn Encoding>) -> Result<ResolvedRequest> {
        let url = build_url(
            &self.base_url,
            &self.operation_path,
            &self.path_params,
            &self.query_params,
        )?;
        let encoding = select_encoding(self.encoding.as_deref(), fallback);

        let mut headers = self.headers.clone();
        let body = match &self.body {
            Some(value) => {
                if !headers.contains_key(header::CONTENT_TYPE) {
                    let content_type = HeaderValue::from_str(encoding.content_type())
                        .map_err(|err| RestCallError::InvalidHeader(err.to_string()))?;
                    headers.insert(header::CONTENT_TYPE, content_type);
                }
                let content_type = header_str(&headers, &header::CONTENT_TYPE).unwrap_or_default();
                Some(Bytes::from(encoding.marshal(content_type, value)?))
            }
            None => None,
        };

        Ok(ResolvedRequest {
            method: self.method.clone(),
            url,
            headers,
            body: BodySupplier::new(body),
        })
    }
}

/// Concrete request with every placeholder substituted and the body marshaled.
#[derive(Clone, Debug)]
pub struct ResolvedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: BodySupplier,
}

impl ResolvedRequest {
    /// Fresh wire request; the body is re-supplied on every call.
    pub fn to_wire(&self) -> reqwest::Request {
        let mut wire = reqwest::Request::new(self.method.clone(), self.url.clone());
        *wire.headers_mut() = self.headers.clone();
        *wire.body_mut() = self.body.supply();
        wire
    }
}

/// Runs before dispatch; an error aborts the call before any network I/O.
pub type BeforeHook = Box<dyn FnOnce(&mut ResolvedRequest) -> std::result::Result<(), BoxError> + Send>;

/// Runs after decoding; an error is returned with the built response.
pub type AfterHook<T> =
    Box<dyn FnOnce(&mut TypedResponse<T>) -> std::result::Result<(), BoxError> + Send>;

/// One typed call: model, transport, retry configuration and hooks.
///
/// Created through [`Client::request`](crate::Client::request) or
/// [`Client::request_context`](crate::Client::request_context).
pub struct RequestContext<T> {
    transport: Arc<dyn Transport>,
    client_encoding: Option<Arc<dyn Encoding>>,
    model: RequestModel,
    retry: Retry,
    before: Option<BeforeHook>,
    after: Option<AfterHook<T>>,
    deferred: Option<RestCallError>,
    _target: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for RequestContext<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("model", &self.model)
            .field("retry", &self.retry)
            .field("before", &self.before.is_some())
            .field("after", &self.after.is_some())
            .finish()
    }
}

impl<T> RequestContext<T> {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        client_encoding: Option<Arc<dyn Encoding>>,
        retry: Retry,
        model: RequestModel,
    ) -> Self {
        Self {
            transport,
            client_encoding,
            model,
            retry,
            before: None,
            after: None,
            deferred: None,
            _target: PhantomData,
        }
    }

    pub fn model(&self) -> &RequestModel {
        &self.model
    }

    pub fn retry(&self) -> &Retry {
        &self.retry
    }

    /// Scopes the whole multi-attempt call to `context`.
    pub fn with_context(mut self, context: CallContext) -> Self {
        self.model.context = context;
        self
    }

    pub fn with_retry(mut self, retry: Retry) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_encoding(mut self, encoding: impl Encoding + 'static) -> Self {
        self.model.encoding = Some(Arc::new(encoding));
        self
    }

    pub fn when_before_send<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&mut ResolvedRequest) -> std::result::Result<(), BoxError> + Send + 'static,
    {
        self.before = Some(Box::new(hook));
        self
    }

    pub fn when_after_send<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&mut TypedResponse<T>) -> std::result::Result<(), BoxError> + Send + 'static,
    {
        self.after = Some(Box::new(hook));
        self
    }

    pub fn path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.model.path_params.insert(name.into(), value.into());
        self
    }

    pub fn query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.model.query_params.add(key, value);
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.model.headers.append(name, value);
            }
            (Err(err), _) => self.defer(RestCallError::InvalidHeader(format!("{name}: {err}"))),
            (_, Err(err)) => self.defer(RestCallError::InvalidHeader(format!("{name}: {err}"))),
        }
        self
    }

    /// Sets `Authorization: Bearer <token>`, keeping an existing scheme prefix.
    pub fn bearer_auth(self, token: &str) -> Self {
        let authorization = normalize_bearer_authorization(token);
        self.header(header::AUTHORIZATION.as_str(), &authorization)
    }

    /// Captures `body`; serialization errors surface from [`send`](Self::send).
    pub fn body<B: Serialize + ?Sized>(mut self, body: &B) -> Self {
        match serde_json::to_value(body) {
            Ok(value) => self.model.body = Some(value),
            Err(err) => self.defer(RestCallError::Encoding(format!("invalid request body: {err}"))),
        }
        self
    }

    fn defer(&mut self, err: RestCallError) {
        self.deferred.get_or_insert(err);
    }
}

impl<T> RequestContext<T>
where
    T: DeserializeOwned + Default,
{
    /// Resolves, dispatches with retries and decodes the response.
    pub async fn send(self) -> std::result::Result<TypedResponse<T>, SendError<T>> {
        let Self {
            transport,
            client_encoding,
            model,
            retry,
            before,
            after,
            deferred,
            ..
        } = self;

        if let Some(err) = deferred {
            return Err(err.into());
        }

        let mut request = model.resolve(client_encoding.as_deref())?;

        if let Some(hook) = before {
            if let Err(err) = hook(&mut request) {
                #[cfg(feature = "tracing")]
                tracing::debug!(error = %err, "before hook aborted request");
                return Err(RestCallError::Hook(err).into());
            }
        }

        let delivery = retry
            .execute(&*transport, &request, &model.context)
            .await?;
        let response = delivery.response;
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();

        let bytes = tokio::select! {
            biased;
            err = model.context.done() => return Err(err.into()),
            read = response.bytes() => read.map_err(RestCallError::Transport)?,
        };

        let data = if bytes.is_empty() {
            T::default()
        } else {
            let encoding = select_encoding(model.encoding.as_deref(), client_encoding.as_deref());
            let content_type = header_str(&headers, &header::CONTENT_TYPE);
            let decoded = encoding
                .unmarshal(content_type, &bytes)
                .and_then(decode_value::<T>);
            match decoded {
                Ok(data) => data,
                // Non-success bodies that do not fit `T` stay raw on the response.
                Err(_err) if !status.is_success() => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        status = status.as_u16(),
                        error = %_err,
                        "non-success body left undecoded"
                    );
                    T::default()
                }
                Err(err) => return Err(err.into()),
            }
        };

        let mut typed = TypedResponse::new(status, headers, url, delivery.attempts, bytes, data);

        if let Some(hook) = after {
            if let Err(source) = hook(&mut typed) {
                return Err(SendError::AfterHook {
                    response: typed,
                    source,
                });
            }
        }

        Ok(typed)
    }
}

fn select_encoding<'a>(
    request: Option<&'a dyn Encoding>,
    client: Option<&'a dyn Encoding>,
) -> &'a dyn Encoding {
    request.or(client).unwrap_or(&DefaultEncoding)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}
