//! Environment variable substitution inside configuration values
//!
//! This is a literal segment-for-segment substitution, not a `${NAME}`
//! template syntax. A string value is split on `.` (or on `/` when it is an
//! `s3://` URI), every segment that names a set
//! environment variable is replaced by that variable's value, and the
//! segments are joined back with the same separator:
//!
//! - `"models.FOO_HOST.train"` with `FOO_HOST=example` becomes `"models.example.train"`
//! - `"s3://BUCKET/data"` with `BUCKET=my-bucket` becomes `"s3://my-bucket/data"`
//!
//! Other URIs are split on `.` like any value.

use crate::core::s3;
use serde_yaml::{Mapping, Value};

/// Look up a variable in the process environment
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Substitute environment variables into a single string value
pub fn substitute_str<F>(value: &str, env: &F) -> String
where
    F: Fn(&str) -> Option<String> + ?Sized,
{
    let separator = if s3::is_s3_uri(value) { "/" } else { "." };

    value
        .split(separator)
        .map(|segment| {
            if segment.is_empty() {
                return segment.to_string();
            }
            env(segment).unwrap_or_else(|| segment.to_string())
        })
        .collect::<Vec<_>>()
        .join(separator)
}

/// Substitute environment variables into every string scalar of a tree
///
/// Mapping keys and non-string scalars are left untouched.
pub fn substitute_tree<F>(value: &Value, env: &F) -> Value
where
    F: Fn(&str) -> Option<String> + ?Sized,
{
    match value {
        Value::String(s) => Value::String(substitute_str(s, env)),
        Value::Sequence(items) => {
            Value::Sequence(items.iter().map(|item| substitute_tree(item, env)).collect())
        }
        Value::Mapping(mapping) => {
            let mut updated = Mapping::with_capacity(mapping.len());
            for (key, item) in mapping {
                updated.insert(key.clone(), substitute_tree(item, env));
            }
            Value::Mapping(updated)
        }
        Value::Tagged(tagged) => {
            let mut tagged = tagged.clone();
            tagged.value = substitute_tree(&tagged.value, env);
            Value::Tagged(tagged)
        }
        other => other.clone(),
    }
}
