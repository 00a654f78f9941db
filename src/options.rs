use std::{fmt, sync::Arc, time::Duration};

use bytes::Bytes;
use reqwest::{
    header::{self, HeaderMap, HeaderName, HeaderValue},
    Method,
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{
    body::{parse_payload, serialize_body},
    params::{resolve_url, serialize_params},
    Body, FetchError, Params, Payload, Request, Response, RetryContext, RetryPolicy,
};

pub type ParamsSerializer = Arc<dyn Fn(&Params) -> Result<String, FetchError> + Send + Sync>;
pub type BodySerializer = Arc<dyn Fn(&Body) -> Result<Bytes, FetchError> + Send + Sync>;
pub type ResponseParser =
    Arc<dyn Fn(&Response, &Request) -> Result<Payload, FetchError> + Send + Sync>;
pub type RejectFn = Arc<dyn Fn(&Response) -> bool + Send + Sync>;
pub type OnRequest = Arc<dyn Fn(&Request) + Send + Sync>;
pub type OnRetry = Arc<dyn Fn(&RetryContext<'_>) + Send + Sync>;
pub type OnSuccess = Arc<dyn Fn(&Payload, &Request) + Send + Sync>;
pub type OnError = Arc<dyn Fn(&FetchError, &Request) + Send + Sync>;

/// Request configuration, used both for client defaults and per-call
/// overrides.
///
/// Per-call values win over defaults. Headers and params merge by key; a
/// removed header or a `null` param drops the default with the same key.
#[derive(Clone, Default)]
pub struct Options {
    pub base_url: Option<String>,
    pub method: Option<Method>,
    /// Header entries in insertion order; `None` removes the header.
    pub headers: Vec<(String, Option<String>)>,
    pub params: Params,
    pub body: Option<Body>,
    /// Per-attempt timeout.
    pub timeout: Option<Duration>,
    pub retry: Option<RetryPolicy>,
    /// Cancels the transport call and any pending retry delay.
    pub signal: Option<CancellationToken>,
    pub serialize_params: Option<ParamsSerializer>,
    pub serialize_body: Option<BodySerializer>,
    pub parse_response: Option<ResponseParser>,
    pub parse_rejected: Option<ResponseParser>,
    /// Returns `true` when a response must fail the call.
    pub reject: Option<RejectFn>,
    pub on_request: Option<OnRequest>,
    pub on_retry: Option<OnRetry>,
    pub on_success: Option<OnSuccess>,
    pub on_error: Option<OnError>,
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: Vec<(&str, Option<&str>)> = self
            .headers
            .iter()
            .map(|(name, value)| {
                let value = if name.eq_ignore_ascii_case(header::AUTHORIZATION.as_str()) {
                    value.as_ref().map(|_| "<redacted>")
                } else {
                    value.as_deref()
                };
                (name.as_str(), value)
            })
            .collect();

        f.debug_struct("Options")
            .field("base_url", &self.base_url)
            .field("method", &self.method)
            .field("headers", &headers)
            .field("params", &self.params)
            .field("body", &self.body)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("signal", &self.signal.is_some())
            .finish_non_exhaustive()
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads defaults from the environment.
    ///
    /// Reads:
    /// - `UPFETCH_BASE_URL`, required
    /// - `UPFETCH_TIMEOUT_MS`, optional per-attempt timeout
    /// - `UPFETCH_RETRY_ATTEMPTS`, optional total attempts
    /// - `UPFETCH_RETRY_DELAY_MS`, optional fixed delay between attempts
    pub fn from_env() -> std::result::Result<Self, String> {
        let base_url = std::env::var("UPFETCH_BASE_URL")
            .map_err(|_| "missing UPFETCH_BASE_URL environment variable".to_owned())?;
        if base_url.trim().is_empty() {
            return Err("UPFETCH_BASE_URL is set but empty".to_owned());
        }

        let mut options = Self::new().base_url(base_url.trim());
        if let Some(ms) = env_u64("UPFETCH_TIMEOUT_MS")? {
            options = options.timeout(Duration::from_millis(ms));
        }

        let attempts = env_u64("UPFETCH_RETRY_ATTEMPTS")?;
        let delay = env_u64("UPFETCH_RETRY_DELAY_MS")?;
        if attempts.is_some() || delay.is_some() {
            let attempts = u32::try_from(attempts.unwrap_or(1))
                .map_err(|_| "UPFETCH_RETRY_ATTEMPTS is out of range".to_owned())?;
            let delay = Duration::from_millis(delay.unwrap_or(0));
            options = options.retry(RetryPolicy::new(attempts).delay(delay));
        }

        Ok(options)
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Sets a header, replacing any same-named entry in this layer.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        set_header(&mut self.headers, name.into(), Some(value.into()));
        self
    }

    /// Removes a header inherited from the defaults.
    pub fn remove_header(mut self, name: impl Into<String>) -> Self {
        set_header(&mut self.headers, name.into(), None);
        self
    }

    /// Sets `Authorization: Bearer <token>`.
    ///
    /// If the token already carries the `Bearer ` prefix it is kept as-is.
    pub fn bearer_auth(self, token: impl AsRef<str>) -> Self {
        let authorization = normalize_bearer_authorization(token.as_ref());
        self.header(header::AUTHORIZATION.as_str(), authorization)
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key, value);
        self
    }

    pub fn params(mut self, params: impl Into<Params>) -> Self {
        self.params = self.params.merged(&params.into());
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn serialize_params<F>(mut self, serialize: F) -> Self
    where
        F: Fn(&Params) -> Result<String, FetchError> + Send + Sync + 'static,
    {
        self.serialize_params = Some(Arc::new(serialize));
        self
    }

    pub fn serialize_body<F>(mut self, serialize: F) -> Self
    where
        F: Fn(&Body) -> Result<Bytes, FetchError> + Send + Sync + 'static,
    {
        self.serialize_body = Some(Arc::new(serialize));
        self
    }

    pub fn parse_response<F>(mut self, parse: F) -> Self
    where
        F: Fn(&Response, &Request) -> Result<Payload, FetchError> + Send + Sync + 'static,
    {
        self.parse_response = Some(Arc::new(parse));
        self
    }

    pub fn parse_rejected<F>(mut self, parse: F) -> Self
    where
        F: Fn(&Response, &Request) -> Result<Payload, FetchError> + Send + Sync + 'static,
    {
        self.parse_rejected = Some(Arc::new(parse));
        self
    }

    pub fn reject<F>(mut self, reject: F) -> Self
    where
        F: Fn(&Response) -> bool + Send + Sync + 'static,
    {
        self.reject = Some(Arc::new(reject));
        self
    }

    pub fn on_request<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Request) + Send + Sync + 'static,
    {
        self.on_request = Some(Arc::new(hook));
        self
    }

    pub fn on_retry<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RetryContext<'_>) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    pub fn on_success<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Payload, &Request) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(hook));
        self
    }

    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&FetchError, &Request) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(hook));
        self
    }

    /// Merges `defaults` with per-call `overrides` into effective options.
    pub(crate) fn resolve(defaults: Options, overrides: Options) -> Resolved {
        let mut headers = Vec::new();
        for (name, value) in defaults.headers.into_iter().chain(overrides.headers) {
            set_header(&mut headers, name, value);
        }
        let headers = headers
            .into_iter()
            .filter_map(|(name, value)| value.map(|value| (name, value)))
            .collect();

        Resolved {
            base_url: overrides.base_url.or(defaults.base_url),
            method: overrides
                .method
                .or(defaults.method)
                .unwrap_or(Method::GET),
            headers,
            default_params: defaults.params,
            call_params: overrides.params,
            body: overrides.body.or(defaults.body),
            timeout: overrides.timeout.or(defaults.timeout),
            retry: overrides.retry.or(defaults.retry).unwrap_or_default(),
            signal: overrides.signal.or(defaults.signal),
            serialize_params: overrides
                .serialize_params
                .or(defaults.serialize_params)
                .unwrap_or_else(|| Arc::new(serialize_params)),
            serialize_body: overrides
                .serialize_body
                .or(defaults.serialize_body)
                .unwrap_or_else(|| Arc::new(serialize_body)),
            parse_response: overrides
                .parse_response
                .or(defaults.parse_response)
                .unwrap_or_else(|| Arc::new(parse_payload)),
            parse_rejected: overrides
                .parse_rejected
                .or(defaults.parse_rejected)
                .unwrap_or_else(|| Arc::new(parse_payload)),
            reject: overrides
                .reject
                .or(defaults.reject)
                .unwrap_or_else(|| Arc::new(|response: &Response| !response.is_success())),
            on_request: overrides.on_request.or(defaults.on_request),
            on_retry: overrides.on_retry.or(defaults.on_retry),
            on_success: overrides.on_success.or(defaults.on_success),
            on_error: overrides.on_error.or(defaults.on_error),
        }
    }
}

/// Effective options for one call, with every fallback applied.
pub(crate) struct Resolved {
    pub base_url: Option<String>,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub default_params: Params,
    pub call_params: Params,
    pub body: Option<Body>,
    pub timeout: Option<Duration>,
    pub retry: RetryPolicy,
    pub signal: Option<CancellationToken>,
    pub serialize_params: ParamsSerializer,
    pub serialize_body: BodySerializer,
    pub parse_response: ResponseParser,
    pub parse_rejected: ResponseParser,
    pub reject: RejectFn,
    pub on_request: Option<OnRequest>,
    pub on_retry: Option<OnRetry>,
    pub on_success: Option<OnSuccess>,
    pub on_error: Option<OnError>,
}

impl Resolved {
    pub(crate) fn build_request(&self, input: &str) -> Result<Request, FetchError> {
        let url = resolve_url(
            self.base_url.as_deref(),
            input,
            &self.default_params,
            &self.call_params,
            self.serialize_params.as_ref(),
        )?;

        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| FetchError::InvalidHeader(format!("'{name}': {err}")))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|err| FetchError::InvalidHeader(format!("value for '{name}': {err}")))?;
            headers.insert(header_name, header_value);
        }

        let mut request = Request::new(self.method.clone(), url);
        let body = self
            .body
            .as_ref()
            .filter(|body| !matches!(body, Body::Json(Value::Null)));
        if let Some(body) = body {
            request.body = Some((self.serialize_body)(body)?);
            if let Some(content_type) = body.implied_content_type() {
                if !headers.contains_key(header::CONTENT_TYPE) {
                    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
                }
            }
        }
        request.headers = headers;

        Ok(request)
    }
}

fn set_header(headers: &mut Vec<(String, Option<String>)>, name: String, value: Option<String>) {
    match headers
        .iter_mut()
        .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
    {
        Some(entry) => *entry = (name, value),
        None => headers.push((name, value)),
    }
}

fn env_u64(name: &str) -> std::result::Result<Option<u64>, String> {
    match std::env::var(name) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| format!("{name} must be a non-negative integer, got '{raw}'")),
        Err(_) => Ok(None),
    }
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

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reqwest::{header, Method};
    use serde_json::json;

    use super::{normalize_bearer_authorization, Options};
    use crate::{Body, Params};

    #[test]
    fn normalize_bearer_adds_prefix_when_missing() {
        assert_eq!(
            normalize_bearer_authorization("abc123"),
            "Bearer abc123".to_owned()
        );
    }

    #[test]
    fn normalize_bearer_keeps_existing_prefix() {
        assert_eq!(
            normalize_bearer_authorization("bEaReR abc123"),
            "bEaReR abc123".to_owned()
        );
    }

    #[test]
    fn debug_redacts_authorization_value() {
        let options = Options::new().bearer_auth("secret-token");
        let debug = format!("{options:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn per_call_scalars_win_and_unset_fall_back() {
        let defaults = Options::new()
            .base_url("https://api.test")
            .method(Method::POST)
            .timeout(Duration::from_secs(5));
        let call = Options::new().method(Method::PUT);

        let resolved = Options::resolve(defaults, call);
        assert_eq!(resolved.method, Method::PUT);
        assert_eq!(resolved.base_url.as_deref(), Some("https://api.test"));
        assert_eq!(resolved.timeout, Some(Duration::from_secs(5)));

        let request = resolved.build_request("/x").expect("request");
        assert_eq!(resolved.retry.attempts.resolve(&request), 1);
    }

    #[test]
    fn headers_merge_case_insensitively() {
        let defaults = Options::new()
            .header("X-Client", "default")
            .header("Accept", "application/json")
            .header("X-Trace", "on");
        let call = Options::new()
            .header("x-client", "call")
            .remove_header("X-TRACE");

        let resolved = Options::resolve(defaults.base_url("https://api.test"), call);
        let request = resolved.build_request("/").expect("request");
        assert_eq!(request.header("x-client"), Some("call"));
        assert_eq!(request.header("accept"), Some("application/json"));
        assert_eq!(request.header("x-trace"), None);
    }

    #[test]
    fn json_body_gets_content_type_unless_set() {
        let resolved = Options::resolve(
            Options::new().base_url("https://api.test"),
            Options::new().body(json!({"name": "kit"})),
        );
        let request = resolved.build_request("/users").expect("request");
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(
            request.body.as_deref(),
            Some(br#"{"name":"kit"}"#.as_slice())
        );

        let resolved = Options::resolve(
            Options::new().base_url("https://api.test"),
            Options::new()
                .header(header::CONTENT_TYPE.as_str(), "application/vnd.api+json")
                .body(json!({"name": "kit"})),
        );
        let request = resolved.build_request("/users").expect("request");
        assert_eq!(
            request.header("content-type"),
            Some("application/vnd.api+json")
        );
    }

    #[test]
    fn null_json_body_sends_no_body() {
        let resolved = Options::resolve(
            Options::new().base_url("https://api.test"),
            Options::new().method(Method::POST).body(json!(null)),
        );
        let request = resolved.build_request("/users").expect("request");
        assert!(request.body.is_none());
        assert_eq!(request.header("content-type"), None);
    }

    #[test]
    fn custom_body_serializer_is_used() {
        let resolved = Options::resolve(
            Options::new()
                .base_url("https://api.test")
                .serialize_body(|_: &Body| Ok("custom".into())),
            Options::new().body(Body::text("ignored")),
        );
        let request = resolved.build_request("/").expect("request");
        assert_eq!(request.body.as_deref(), Some(b"custom".as_slice()));
    }

    #[test]
    fn params_builder_merges_by_key() {
        let options = Options::new()
            .param("a", 1)
            .params(Params::from([("a", json!(2)), ("b", json!("x"))]));
        assert_eq!(options.params.get("a"), Some(&json!(2)));
        assert_eq!(options.params.get("b"), Some(&json!("x")));
    }

    #[test]
    fn invalid_header_fails_before_send() {
        let resolved = Options::resolve(
            Options::new().base_url("https://api.test"),
            Options::new().header("bad header", "x"),
        );
        assert!(matches!(
            resolved.build_request("/"),
            Err(crate::FetchError::InvalidHeader(_))
        ));
    }
}
