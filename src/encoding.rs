//! Body codecs.
//!
//! Encodings translate between wire bytes and the serde data model
//! ([`serde_json::Value`]), which keeps them object-safe so a client or a
//! single request can swap in its own codec at runtime.

use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::{RestCallError, Result};

/// Content type assumed when a request does not set one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Marshals request bodies and unmarshals response bodies.
pub trait Encoding: Send + Sync + fmt::Debug {
    /// Content type sent when the request has no `Content-Type` header.
    fn content_type(&self) -> &str {
        DEFAULT_CONTENT_TYPE
    }

    fn marshal(&self, content_type: &str, value: &JsonValue) -> Result<Vec<u8>>;

    fn unmarshal(&self, content_type: Option<&str>, bytes: &[u8]) -> Result<JsonValue>;
}

/// Content-type driven codec used when no custom encoding is configured.
///
/// Handles every content type containing `json`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultEncoding;

impl Encoding for DefaultEncoding {
    fn marshal(&self, content_type: &str, value: &JsonValue) -> Result<Vec<u8>> {
        if !is_json(content_type) {
            return Err(RestCallError::UnsupportedEncoding {
                content_type: content_type.to_owned(),
            });
        }
        to_json_bytes(value)
    }

    fn unmarshal(&self, content_type: Option<&str>, bytes: &[u8]) -> Result<JsonValue> {
        let content_type = content_type.unwrap_or_default();
        if !is_json(content_type) {
            return Err(RestCallError::UnsupportedEncoding {
                content_type: content_type.to_owned(),
            });
        }
        from_json_bytes(bytes)
    }
}

/// JSON codec that ignores the negotiated content type.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonEncoding;

impl Encoding for JsonEncoding {
    fn marshal(&self, _content_type: &str, value: &JsonValue) -> Result<Vec<u8>> {
        to_json_bytes(value)
    }

    fn unmarshal(&self, _content_type: Option<&str>, bytes: &[u8]) -> Result<JsonValue> {
        from_json_bytes(bytes)
    }
}

pub(crate) fn decode_value<T: DeserializeOwned>(value: JsonValue) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|err| RestCallError::Encoding(format!("response does not match target type: {err}")))
}

fn is_json(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("json")
}

fn to_json_bytes(value: &JsonValue) -> Result<Vec<u8>> {
    serde_json::to_vec(value)
        .map_err(|err| RestCallError::Encoding(format!("invalid request body: {err}")))
}

fn from_json_bytes(bytes: &[u8]) -> Result<JsonValue> {
    serde_json::from_slice(bytes).map_err(|err| {
        RestCallError::Encoding(format!(
            "invalid response JSON: {err}; body: {}",
            String::from_utf8_lossy(bytes)
        ))
    })
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use super::{decode_value, DefaultEncoding, Encoding, JsonEncoding};
    use crate::RestCallError;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Account {
        id: String,
        country: String,
        #[serde(default)]
        names: Vec<String>,
    }

    #[test]
    fn default_encoding_round_trips_json_bodies() {
        let account = Account {
            id: "ad27e265".to_owned(),
            country: "GB".to_owned(),
            names: vec!["Samantha Holder".to_owned()],
        };
        let value = serde_json::to_value(&account).unwrap();
        let bytes = DefaultEncoding.marshal("application/json", &value).unwrap();
        let echoed = DefaultEncoding
            .unmarshal(Some("application/json; charset=utf-8"), &bytes)
            .unwrap();
        let decoded: Account = decode_value(echoed).unwrap();
        assert_eq!(decoded, account);
    }

    #[test]
    fn default_encoding_accepts_vendor_json_types() {
        let bytes = br#"{"data":{"id":"1"}}"#;
        let value = DefaultEncoding
            .unmarshal(Some("application/vnd.api+json"), bytes)
            .unwrap();
        assert_eq!(value, json!({"data": {"id": "1"}}));
    }

    #[test]
    fn default_encoding_rejects_other_content_types() {
        let err = DefaultEncoding
            .marshal("application/xml", &json!({"a": 1}))
            .expect_err("xml must be rejected");
        assert!(matches!(
            err,
            RestCallError::UnsupportedEncoding { ref content_type } if content_type == "application/xml"
        ));

        let err = DefaultEncoding
            .unmarshal(None, b"{}")
            .expect_err("missing content type must be rejected");
        assert!(matches!(err, RestCallError::UnsupportedEncoding { .. }));
    }

    #[test]
    fn json_encoding_ignores_content_type() {
        let value = JsonEncoding.unmarshal(Some("text/plain"), b"[1,2]").unwrap();
        assert_eq!(value, json!([1, 2]));
        assert_eq!(JsonEncoding.marshal("text/plain", &value).unwrap(), b"[1,2]");
    }

    #[test]
    fn malformed_body_is_an_encoding_error() {
        let err = JsonEncoding
            .unmarshal(Some("application/json"), b"{not json")
            .expect_err("must fail");
        assert!(matches!(err, RestCallError::Encoding(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn shape_mismatch_is_an_encoding_error() {
        let err = decode_value::<Account>(json!({"id": 5})).expect_err("must fail");
        assert!(matches!(err, RestCallError::Encoding(_)));
    }
}
