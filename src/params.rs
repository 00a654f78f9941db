use reqwest::Url;
use serde_json::Value;

use crate::FetchError;

/// Ordered query parameters.
///
/// A `null` value marks a key as removed: it is never serialized and, in
/// per-call options, it drops a default parameter with the same key.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Params(Vec<(String, Value)>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key`, replacing an existing entry in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merges `overrides` on top of `self`, key by key.
    pub fn merged(&self, overrides: &Params) -> Params {
        let mut merged = self.clone();
        for (key, value) in overrides.iter() {
            merged.insert(key, value.clone());
        }
        merged
    }

    fn without_keys(&self, keys: &[String]) -> Params {
        Params(
            self.0
                .iter()
                .filter(|(key, _)| !keys.contains(key))
                .cloned()
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

impl<K: Into<String>, V: Into<Value>, const N: usize> From<[(K, V); N]> for Params {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl From<()> for Params {
    fn from(_: ()) -> Self {
        Self::default()
    }
}

/// Default params serializer: URL-encoded pairs without the leading `?`.
///
/// Strings are sent verbatim, other scalars via their display form, arrays
/// and objects as JSON text. `null` entries are skipped.
pub fn serialize_params(params: &Params) -> Result<String, FetchError> {
    let pairs: Vec<(&str, String)> = params
        .iter()
        .filter_map(|(key, value)| param_text(value).map(|text| (key, text)))
        .collect();
    serde_urlencoded::to_string(pairs)
        .map_err(|err| FetchError::Serialize(format!("invalid params: {err}")))
}

fn param_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

/// Resolves the final request URL from base, input and both params layers.
///
/// Absolute inputs ignore `base_url`. Default params whose key already appears
/// in the input's query are dropped; per-call params always apply.
pub(crate) fn resolve_url(
    base_url: Option<&str>,
    input: &str,
    default_params: &Params,
    call_params: &Params,
    serialize: &dyn Fn(&Params) -> Result<String, FetchError>,
) -> Result<Url, FetchError> {
    let input_keys = query_keys(input);
    let params = default_params
        .without_keys(&input_keys)
        .merged(call_params);
    let query = serialize(&params)?;

    let target = if is_absolute(input) {
        input.to_owned()
    } else {
        let base = base_url.ok_or_else(|| {
            FetchError::InvalidUrl(format!("relative input '{input}' requires a base url"))
        })?;
        join_base(base, input)
    };

    let (mut target, fragment) = match target.split_once('#') {
        Some((head, fragment)) => (head.to_owned(), Some(fragment.to_owned())),
        None => (target, None),
    };

    if !query.is_empty() {
        if !target.contains('?') {
            target.push('?');
        } else if !target.ends_with('?') && !target.ends_with('&') {
            target.push('&');
        }
        target.push_str(&query);
    }

    if let Some(fragment) = fragment {
        target.push('#');
        target.push_str(&fragment);
    }

    Url::parse(&target).map_err(|err| FetchError::InvalidUrl(format!("{target}: {err}")))
}

fn is_absolute(input: &str) -> bool {
    match input.split_once("://") {
        Some((scheme, _)) => {
            !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

fn join_base(base: &str, input: &str) -> String {
    let base = base.trim_end_matches('/');
    let input = input.trim_start_matches('/');
    if input.is_empty() {
        base.to_owned()
    } else if input.starts_with('?') {
        format!("{base}{input}")
    } else {
        format!("{base}/{input}")
    }
}

fn query_keys(input: &str) -> Vec<String> {
    let Some((_, query)) = input.split_once('?') else {
        return Vec::new();
    };
    let query = query.split('#').next().unwrap_or_default();
    serde_urlencoded::from_str::<Vec<(String, String)>>(query)
        .map(|pairs| pairs.into_iter().map(|(key, _)| key).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{resolve_url, serialize_params, Params};

    fn resolve(base: Option<&str>, input: &str, defaults: Params, call: Params) -> String {
        resolve_url(base, input, &defaults, &call, &serialize_params)
            .expect("url must resolve")
            .to_string()
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut params = Params::from([("a", 1), ("b", 2)]);
        params.insert("a", 3);
        let keys: Vec<&str> = params.iter().map(|(key, _)| key).collect();
        assert_eq!(keys, ["a", "b"]);
        assert_eq!(params.get("a"), Some(&json!(3)));
    }

    #[test]
    fn serializes_scalars_and_skips_null() {
        let params: Params = [
            ("a", json!(1)),
            ("b", json!("x y")),
            ("c", json!(true)),
            ("d", json!(null)),
            ("e", json!([1, 2])),
        ]
        .into();
        assert_eq!(
            serialize_params(&params).expect("serialize"),
            "a=1&b=x+y&c=true&e=%5B1%2C2%5D"
        );
    }

    #[test]
    fn single_param_becomes_query_string() {
        let url = resolve(
            Some("https://api.test"),
            "/todos",
            Params::new(),
            Params::from([("a", 1)]),
        );
        assert_eq!(url, "https://api.test/todos?a=1");
    }

    #[test]
    fn joins_base_with_single_slash() {
        assert_eq!(
            resolve(Some("https://api.test/v1/"), "/users", ().into(), ().into()),
            "https://api.test/v1/users"
        );
        assert_eq!(
            resolve(Some("https://api.test/v1"), "users", ().into(), ().into()),
            "https://api.test/v1/users"
        );
    }

    #[test]
    fn absolute_input_ignores_base() {
        assert_eq!(
            resolve(
                Some("https://api.test"),
                "https://other.test/x",
                ().into(),
                ().into()
            ),
            "https://other.test/x"
        );
    }

    #[test]
    fn input_query_shadows_default_params_only() {
        let url = resolve(
            Some("https://api.test"),
            "/search?page=2",
            Params::from([("page", 1), ("size", 10)]),
            Params::from([("q", "rust")]),
        );
        assert_eq!(url, "https://api.test/search?page=2&size=10&q=rust");
    }

    #[test]
    fn call_params_override_and_remove_defaults() {
        let url = resolve(
            Some("https://api.test"),
            "/items",
            Params::from([("sort", json!("asc")), ("debug", json!(1))]),
            Params::from([("sort", json!("desc")), ("debug", json!(null))]),
        );
        assert_eq!(url, "https://api.test/items?sort=desc");
    }

    #[test]
    fn params_go_before_fragment() {
        let url = resolve_url(
            Some("https://api.test"),
            "/docs#intro",
            &Params::new(),
            &Params::from([("a", 1)]),
            &serialize_params,
        )
        .expect("url must resolve");
        assert_eq!(url.as_str(), "https://api.test/docs?a=1#intro");
        assert_eq!(url.query(), Some("a=1"));
        assert_eq!(url.fragment(), Some("intro"));

        assert_eq!(
            resolve(
                Some("https://api.test"),
                "/docs?v=2#intro",
                ().into(),
                Params::from([("a", 1)])
            ),
            "https://api.test/docs?v=2&a=1#intro"
        );
    }

    #[test]
    fn relative_input_without_base_is_rejected() {
        let err = resolve_url(None, "/x", &Params::new(), &Params::new(), &serialize_params)
            .expect_err("must fail");
        assert!(matches!(err, crate::FetchError::InvalidUrl(_)));
    }
}
