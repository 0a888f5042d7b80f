use bytes::Bytes;
use reqwest::{header::HeaderMap, StatusCode};
use url::Url;

use crate::{RestCallError, Result};

/// Decoded response of a [`RequestContext`](crate::RequestContext) call.
#[derive(Clone, Debug)]
pub struct TypedResponse<T> {
    status: StatusCode,
    headers: HeaderMap,
    url: Url,
    attempts: usize,
    body: Bytes,
    /// Decoded payload; `T::default()` when the body was empty, or when a
    /// non-2xx body did not decode into `T`.
    pub data: T,
}

impl<T> TypedResponse<T> {
    pub(crate) fn new(
        status: StatusCode,
        headers: HeaderMap,
        url: Url,
        attempts: usize,
        body: Bytes,
        data: T,
    ) -> Self {
        Self {
            status,
            headers,
            url,
            attempts,
            body,
            data,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Status line text, e.g. `"404 Not Found"`.
    pub fn status_text(&self) -> String {
        match self.status.canonical_reason() {
            Some(reason) => format!("{} {reason}", self.status.as_u16()),
            None => self.status.as_u16().to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Final URL of the response, after redirects.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Attempts the call needed, the final one included.
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// Raw response body as received.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Raw body as text, lossily decoded.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn into_data(self) -> T {
        self.data
    }

    /// Turns a non-2xx response into [`RestCallError::Http`].
    pub fn error_for_status(self) -> Result<Self> {
        if self.status.is_success() {
            return Ok(self);
        }
        Err(RestCallError::Http {
            status: self.status.as_u16(),
            reason: self
                .status
                .canonical_reason()
                .unwrap_or("unknown status")
                .to_owned(),
        })
    }

    /// Maps the payload, keeping the response metadata.
    pub fn map<U, F>(self, f: F) -> TypedResponse<U>
    where
        F: FnOnce(T) -> U,
    {
        TypedResponse {
            status: self.status,
            headers: self.headers,
            url: self.url,
            attempts: self.attempts,
            body: self.body,
            data: f(self.data),
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use reqwest::{header::HeaderMap, StatusCode};

    use super::TypedResponse;
    use crate::RestCallError;

    fn response(status: u16) -> TypedResponse<Vec<u8>> {
        TypedResponse::new(
            StatusCode::from_u16(status).unwrap(),
            HeaderMap::new(),
            "http://h/v1".parse().unwrap(),
            1,
            Bytes::from_static(b"{\"error_message\":\"gone\"}"),
            Vec::new(),
        )
    }

    #[test]
    fn status_text_includes_reason() {
        assert_eq!(response(200).status_text(), "200 OK");
        assert_eq!(response(404).status_text(), "404 Not Found");
        assert_eq!(response(599).status_text(), "599");
    }

    #[test]
    fn error_for_status_keeps_success() {
        assert!(response(201).error_for_status().is_ok());
        match response(409).error_for_status() {
            Err(RestCallError::Http { status, reason }) => {
                assert_eq!(status, 409);
                assert_eq!(reason, "Conflict");
            }
            other => panic!("expected http error, got {other:?}"),
        }
    }

    #[test]
    fn map_keeps_metadata() {
        let mapped = response(202).map(|data| data.len());
        assert_eq!(mapped.status_code(), 202);
        assert_eq!(mapped.data, 0);
        assert_eq!(mapped.body_text(), r#"{"error_message":"gone"}"#);
    }
}
