//! Response validation contract.
//!
//! Any validator can plug into the pipeline by implementing
//! [`StandardSchema`]: one method that turns parsed data into a typed value or
//! a list of [`Issue`]s.

use std::{fmt, marker::PhantomData};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::Payload;

/// Segment of the path to the offending value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

/// Single validation problem.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<PathSegment>,
}

impl Issue {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: Vec::new(),
        }
    }

    pub fn at(mut self, segment: PathSegment) -> Self {
        self.path.push(segment);
        self
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            return f.write_str(&self.message);
        }
        let path: Vec<String> = self.path.iter().map(ToString::to_string).collect();
        write!(f, "{}: {}", path.join("."), self.message)
    }
}

/// Validator contract consumed by [`UpFetch::fetch_with`](crate::UpFetch::fetch_with).
pub trait StandardSchema: Send + Sync {
    type Output;

    fn validate(&self, data: &Payload) -> Result<Self::Output, Vec<Issue>>;
}

impl<S: StandardSchema + ?Sized> StandardSchema for &S {
    type Output = S::Output;

    fn validate(&self, data: &Payload) -> Result<Self::Output, Vec<Issue>> {
        (**self).validate(data)
    }
}

/// Schema that deserializes the payload into `T` with serde.
pub struct SerdeSchema<T>(PhantomData<fn() -> T>);

impl<T> SerdeSchema<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for SerdeSchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SerdeSchema<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SerdeSchema")
    }
}

impl<T: DeserializeOwned> StandardSchema for SerdeSchema<T> {
    type Output = T;

    fn validate(&self, data: &Payload) -> Result<T, Vec<Issue>> {
        let value = data
            .to_json()
            .ok_or_else(|| vec![Issue::new("expected json data, received binary body")])?;
        T::deserialize(&value).map_err(|err| vec![Issue::new(err.to_string())])
    }
}

/// Schema backed by a closure.
pub struct FnSchema<F>(F);

/// Wraps a closure as a [`StandardSchema`].
pub fn schema_fn<F, T>(validate: F) -> FnSchema<F>
where
    F: Fn(&Payload) -> Result<T, Vec<Issue>> + Send + Sync,
{
    FnSchema(validate)
}

impl<F, T> StandardSchema for FnSchema<F>
where
    F: Fn(&Payload) -> Result<T, Vec<Issue>> + Send + Sync,
{
    type Output = T;

    fn validate(&self, data: &Payload) -> Result<T, Vec<Issue>> {
        (self.0)(data)
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::{schema_fn, Issue, PathSegment, SerdeSchema, StandardSchema};
    use crate::Payload;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Todo {
        id: u64,
        title: String,
    }

    #[test]
    fn serde_schema_accepts_matching_json() {
        let todo = SerdeSchema::<Todo>::new()
            .validate(&Payload::Json(json!({"id": 1, "title": "write"})))
            .expect("valid");
        assert_eq!(
            todo,
            Todo {
                id: 1,
                title: "write".to_owned()
            }
        );
    }

    #[test]
    fn serde_schema_reports_mismatch_as_issue() {
        let issues = SerdeSchema::<Todo>::new()
            .validate(&Payload::Json(json!({"id": "one"})))
            .expect_err("invalid");
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("invalid type"));
    }

    #[test]
    fn serde_schema_rejects_binary() {
        let issues = SerdeSchema::<Todo>::new()
            .validate(&Payload::Bytes(vec![1u8].into()))
            .expect_err("invalid");
        assert!(issues[0].message.contains("binary"));
    }

    #[test]
    fn fn_schema_forwards_issues() {
        let schema = schema_fn(|data: &Payload| match data.as_text() {
            Some(text) if !text.is_empty() => Ok(text.len()),
            _ => Err(vec![Issue::new("required").at(PathSegment::Key("name".into()))]),
        });
        assert_eq!(schema.validate(&Payload::Text("abc".into())), Ok(3));
        let issues = schema.validate(&Payload::Empty).expect_err("invalid");
        assert_eq!(issues[0].to_string(), "name: required");
    }
}
