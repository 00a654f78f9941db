use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

use crate::{FetchError, Request, Response};

/// Request body before serialization.
#[derive(Clone, Debug, PartialEq)]
pub enum Body {
    /// JSON value. Objects and arrays are sent as JSON text, scalars as plain text.
    Json(Value),
    Text(String),
    Bytes(Bytes),
    /// URL-encoded form fields.
    Form(Vec<(String, String)>),
}

impl Body {
    /// Builds a JSON body from any serializable value.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, FetchError> {
        serde_json::to_value(value)
            .map(Self::Json)
            .map_err(|err| FetchError::Serialize(format!("invalid json body: {err}")))
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn form<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::Form(
            pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    /// Content type a transport would infer for this body, if any.
    pub(crate) fn implied_content_type(&self) -> Option<&'static str> {
        match self {
            body if is_jsonifiable(body) => Some("application/json"),
            Self::Text(_) => Some("text/plain;charset=UTF-8"),
            Self::Form(_) => Some("application/x-www-form-urlencoded"),
            _ => None,
        }
    }
}

impl From<Value> for Body {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<String> for Body {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Body {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<Vec<u8>> for Body {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value.into())
    }
}

impl From<Bytes> for Body {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

/// Returns `true` for bodies that are sent as JSON text: objects and arrays.
pub fn is_jsonifiable(body: &Body) -> bool {
    matches!(body, Body::Json(Value::Object(_) | Value::Array(_)))
}

/// Default body serializer.
pub fn serialize_body(body: &Body) -> Result<Bytes, FetchError> {
    match body {
        Body::Json(Value::String(text)) => Ok(Bytes::from(text.clone())),
        Body::Json(value) => serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|err| FetchError::Serialize(format!("invalid json body: {err}"))),
        Body::Text(text) => Ok(Bytes::from(text.clone())),
        Body::Bytes(bytes) => Ok(bytes.clone()),
        Body::Form(pairs) => serde_urlencoded::to_string(pairs)
            .map(Bytes::from)
            .map_err(|err| FetchError::Serialize(format!("invalid form body: {err}"))),
    }
}

/// Parsed response body.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Json(Value),
    Text(String),
    Bytes(Bytes),
    Empty,
}

impl Payload {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// JSON view of text-like payloads; `None` for binary data.
    pub fn to_json(&self) -> Option<Value> {
        match self {
            Self::Json(value) => Some(value.clone()),
            Self::Text(text) => Some(Value::String(text.clone())),
            Self::Empty => Some(Value::Null),
            Self::Bytes(_) => None,
        }
    }
}

/// Default response parser, driven by the response content type.
pub fn parse_payload(response: &Response, _request: &Request) -> Result<Payload, FetchError> {
    if response.body.is_empty() {
        return Ok(Payload::Empty);
    }

    let content_type = response.content_type();
    let media = content_type.as_deref().unwrap_or_default();

    if media.contains("json") {
        if let Ok(value) = serde_json::from_slice(&response.body) {
            return Ok(Payload::Json(value));
        }
        return Ok(text_or_bytes(&response.body));
    }

    if is_textual(media) || content_type.is_none() {
        return Ok(text_or_bytes(&response.body));
    }

    Ok(Payload::Bytes(response.body.clone()))
}

fn is_textual(media: &str) -> bool {
    media.starts_with("text/")
        || media.contains("xml")
        || media.contains("javascript")
        || media == "application/x-www-form-urlencoded"
}

fn text_or_bytes(body: &Bytes) -> Payload {
    match std::str::from_utf8(body) {
        Ok(text) => Payload::Text(text.to_owned()),
        Err(_) => Payload::Bytes(body.clone()),
    }
}
