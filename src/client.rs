use std::fmt;
use std::sync::Arc;

use reqwest::Method;

use crate::{
    ClientOptions, Encoding, RequestContext, RequestModel, RestCallError, Result, Retry, Transport,
};

/// Entry point for typed REST calls.
///
/// Cloning is cheap: clones share the transport, the encoding override and
/// the retry configuration.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    encoding: Option<Arc<dyn Encoding>>,
    retry: Retry,
    options: ClientOptions,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("encoding", &self.encoding)
            .field("retry", &self.retry)
            .field("options", &self.options)
            .finish()
    }
}

impl Client {
    /// Creates a client with default options.
    pub fn new() -> Result<Self> {
        Self::with_options(ClientOptions::default())
    }

    /// Creates a client whose `reqwest` transport and retry policy follow `options`.
    pub fn with_options(options: ClientOptions) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(options.timeout())
            .pool_max_idle_per_host(options.pool_max_idle_per_host)
            .build()
            .map_err(RestCallError::Transport)?;
        Ok(Self::from_parts(Arc::new(http), options))
    }

    /// Creates a client from `RESTCALL_*` environment variables.
    ///
    /// See [`ClientOptions::from_env`] for the recognized variables.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use restcall::Client;
    ///
    /// let client = Client::from_env().expect("invalid RESTCALL_* env vars");
    /// ```
    pub fn from_env() -> Result<Self> {
        Self::with_options(ClientOptions::from_env()?)
    }

    /// Wraps an existing transport, e.g. a preconfigured `reqwest::Client`.
    pub fn from_transport(transport: impl Transport) -> Self {
        Self::from_parts(Arc::new(transport), ClientOptions::default())
    }

    fn from_parts(transport: Arc<dyn Transport>, options: ClientOptions) -> Self {
        let retry = Retry::new(options.retry_policy()).with_attempt_timeout(options.attempt_timeout());
        Self {
            transport,
            encoding: None,
            retry,
            options,
        }
    }

    /// Replaces the default content-type driven encoding for every request.
    pub fn with_encoding(mut self, encoding: impl Encoding + 'static) -> Self {
        self.encoding = Some(Arc::new(encoding));
        self
    }

    /// Default retry configuration for requests created by this client.
    pub fn with_retry(mut self, retry: Retry) -> Self {
        self.retry = retry;
        self
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn retry(&self) -> &Retry {
        &self.retry
    }

    /// Wraps a declarative model into a typed call.
    pub fn request_context<T>(&self, model: RequestModel) -> RequestContext<T> {
        RequestContext::new(
            Arc::clone(&self.transport),
            self.encoding.clone(),
            self.retry.for_call(),
            model,
        )
    }

    /// Starts a typed call for `operation_path` relative to `base_url`.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use restcall::{Client, Method};
    /// use serde::Deserialize;
    ///
    /// #[derive(Debug, Default, Deserialize)]
    /// struct Account {
    ///     id: String,
    /// }
    ///
    /// # async fn run() -> restcall::Result<()> {
    /// let client = Client::new()?;
    /// let account = client
    ///     .request::<Account>(Method::GET, "http://localhost:8080", "/v1/accounts/{id}")
    ///     .path_param("id", "ad27e265")
    ///     .send()
    ///     .await?;
    /// println!("{} {:?}", account.status_text(), account.data);
    /// # Ok(())
    /// # }
    /// ```
    pub fn request<T>(
        &self,
        method: Method,
        base_url: impl Into<String>,
        operation_path: impl Into<String>,
    ) -> RequestContext<T> {
        self.request_context(RequestModel::new(method, base_url, operation_path))
    }

    pub fn get<T>(&self, base_url: impl Into<String>, operation_path: impl Into<String>) -> RequestContext<T> {
        self.request(Method::GET, base_url, operation_path)
    }

    pub fn post<T>(&self, base_url: impl Into<String>, operation_path: impl Into<String>) -> RequestContext<T> {
        self.request(Method::POST, base_url, operation_path)
    }

    pub fn put<T>(&self, base_url: impl Into<String>, operation_path: impl Into<String>) -> RequestContext<T> {
        self.request(Method::PUT, base_url, operation_path)
    }

    pub fn delete<T>(&self, base_url: impl Into<String>, operation_path: impl Into<String>) -> RequestContext<T> {
        self.request(Method::DELETE, base_url, operation_path)
    }
}
