//! Configuration tree with dotted-path lookup

use crate::core::error::{ConfigError, ConfigResult};
use serde_yaml::{Mapping, Value};

/// A parsed configuration tree (mappings, sequences and scalars).
///
/// Lookups use dotted paths such as `"models.demo.train.instance_type"`.
/// A path resolves to nothing when any level is missing, when it walks
/// through a scalar or a sequence, or when the value found is `null` or an
/// empty mapping. Callers supply the default in those cases.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigDocument {
    root: Value,
}

impl ConfigDocument {
    /// Wrap an already parsed tree
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    /// Parse a document from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        Ok(Self::new(serde_yaml::from_str(yaml)?))
    }

    /// The root value of the tree
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Resolve a dotted path
    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup(&self.root, path)
    }

    /// Resolve a dotted path, falling back to `default`
    pub fn get_or<'a>(&'a self, path: &str, default: &'a Value) -> &'a Value {
        self.get(path).unwrap_or(default)
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    /// String value at `path`, or `default` when absent or not a string
    pub fn get_string_or(&self, path: &str, default: &str) -> String {
        self.get_str(path).unwrap_or(default).to_string()
    }

    /// Unsigned integer at `path`; numeric strings are accepted too
    pub fn get_u64(&self, path: &str) -> Option<u64> {
        match self.get(path)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get_u64_or(&self, path: &str, default: u64) -> u64 {
        self.get_u64(path).unwrap_or(default)
    }

    /// Boolean at `path`; the strings `"True"`/`"False"` (any case) are accepted too
    pub fn get_bool(&self, path: &str) -> Option<bool> {
        match self.get(path)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn get_mapping(&self, path: &str) -> Option<&Mapping> {
        self.get(path).and_then(Value::as_mapping)
    }

    pub fn get_sequence(&self, path: &str) -> Option<&Vec<Value>> {
        self.get(path).and_then(Value::as_sequence)
    }

    /// Sequence of strings at `path`; an absent path yields an empty list
    pub fn get_string_list(&self, path: &str) -> ConfigResult<Vec<String>> {
        let Some(items) = self.get(path) else {
            return Ok(Vec::new());
        };
        let Some(items) = items.as_sequence() else {
            return Err(ConfigError::InvalidValue {
                path: path.to_string(),
                reason: "expected a list of strings".to_string(),
            });
        };
        items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| ConfigError::InvalidValue {
                    path: path.to_string(),
                    reason: format!("expected a string, found {}", describe(item)),
                })
            })
            .collect()
    }

    /// Keys of the mapping at `path`, in document order
    pub fn keys(&self, path: &str) -> Vec<String> {
        self.get_mapping(path)
            .map(|mapping| {
                mapping
                    .keys()
                    .filter_map(|key| key.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Copy of the subtree at `path`; an absent path yields an empty document
    pub fn section(&self, path: &str) -> ConfigDocument {
        self.get(path)
            .cloned()
            .map(ConfigDocument::new)
            .unwrap_or_else(|| ConfigDocument::new(Value::Mapping(Mapping::new())))
    }

    /// Whether the document holds nothing usable
    pub fn is_empty(&self) -> bool {
        is_absent(&self.root)
    }

    /// Render the tree back to YAML
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self.root)
    }
}

/// Walk `path` through nested mappings of `root`
pub fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for key in path.split('.') {
        current = current.as_mapping()?.get(key)?;
    }
    if is_absent(current) {
        None
    } else {
        Some(current)
    }
}

/// `null` and `{}` count as absent
fn is_absent(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Mapping(mapping) => mapping.is_empty(),
        _ => false,
    }
}

/// Short description of a value's shape for error messages
pub fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
