//! Configuration loading: base document, model fragments, environment substitution

use crate::core::{
    document::{describe, ConfigDocument},
    error::{ConfigError, ConfigResult},
    placeholder::{process_env, substitute_tree},
};
use globset::GlobBuilder;
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Default location of the base document, relative to the root directory
pub const DEFAULT_BASE_PATH: &str = "framework/conf/conf.yaml";

/// Top-level key every document nests its configuration under
pub const ROOT_KEY: &str = "conf";

/// Per-model configuration section
pub const MODELS_KEY: &str = "models";

/// Pipeline topology section (per-model step lists and dependency chains)
pub const TOPOLOGY_KEY: &str = "sagemakerPipeline";

/// Key of the base document holding the fragment glob pattern
pub const FRAGMENT_PATTERN_KEY: &str = "modelConfigFilePath";

type EnvLookup = Box<dyn Fn(&str) -> Option<String>>;

/// Loads the base configuration and merges every model fragment into it
pub struct ConfigLoader {
    root: PathBuf,
    base_path: PathBuf,
    env: EnvLookup,
}

impl ConfigLoader {
    /// Create a loader for `base_path`, resolved against `root`
    pub fn new(root: impl Into<PathBuf>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            base_path: base_path.into(),
            env: Box::new(process_env),
        }
    }

    /// Replace the environment lookup used for placeholder substitution
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + 'static,
    {
        self.env = Box::new(lookup);
        self
    }

    /// Full path of the base document
    pub fn base_document_path(&self) -> PathBuf {
        if self.base_path.is_absolute() {
            self.base_path.clone()
        } else {
            self.root.join(&self.base_path)
        }
    }

    /// Load, merge and substitute the whole configuration
    ///
    /// The returned document is rooted at the `conf` section.
    pub fn load(&self) -> ConfigResult<ConfigDocument> {
        let base_file = self.base_document_path();
        let base = substitute_tree(&read_document(&base_file)?, self.env.as_ref());
        let mut conf = take_conf_section(base, &base_file)?;

        let pattern = conf
            .get(FRAGMENT_PATTERN_KEY)
            .and_then(Value::as_str)
            .map(str::to_string);

        match pattern {
            Some(pattern) => {
                for fragment_path in self.discover_fragments(&pattern, &base_file)? {
                    let fragment = read_document(&fragment_path)?;
                    let fragment_conf = take_conf_section(fragment, &fragment_path)?;
                    merge_fragment(&mut conf, &fragment_conf)?;
                    debug!("Merged configuration fragment {}", fragment_path.display());
                }
            }
            None => {
                warn!(
                    "No '{}' in {}; using the base document only",
                    FRAGMENT_PATTERN_KEY,
                    base_file.display()
                );
            }
        }

        let merged = substitute_tree(&Value::Mapping(conf), self.env.as_ref());
        Ok(ConfigDocument::new(merged))
    }

    /// Every file under the root matching `pattern`, except the base document
    ///
    /// Paths are returned in lexicographic order so that merging is deterministic.
    pub fn discover_fragments(&self, pattern: &str, base_file: &Path) -> ConfigResult<Vec<PathBuf>> {
        let relative_pattern = pattern.trim_start_matches("./").trim_start_matches('/');
        let matcher = GlobBuilder::new(relative_pattern)
            .literal_separator(true)
            .build()
            .map_err(|source| ConfigError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?
            .compile_matcher();

        let mut fragments = Vec::new();
        let walker = WalkDir::new(&self.root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));

        for entry in walker {
            let entry = entry.map_err(|source| ConfigError::DirectoryWalk {
                path: self.root.clone(),
                source,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            if entry.path() == base_file || relative == self.base_path {
                continue;
            }
            if matcher.is_match(relative) {
                fragments.push(entry.path().to_path_buf());
            }
        }

        fragments.sort();
        info!(
            "Discovered {} configuration fragment(s) matching '{}'",
            fragments.len(),
            pattern
        );
        Ok(fragments)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new(".", DEFAULT_BASE_PATH)
    }
}

/// Merge one fragment's `conf` section into the base `conf` section
///
/// For each model key, the fragment's keys overwrite the base model's keys
/// and keys absent from the fragment are kept (shallow merge). A fragment
/// carrying a topology section replaces the base topology wholesale.
pub fn merge_fragment(base: &mut Mapping, fragment: &Mapping) -> ConfigResult<()> {
    if let Some(fragment_models) = fragment.get(MODELS_KEY) {
        let fragment_models = match fragment_models {
            Value::Mapping(models) => models,
            Value::Null => return merge_topology(base, fragment),
            other => {
                return Err(ConfigError::InvalidValue {
                    path: MODELS_KEY.to_string(),
                    reason: format!("expected a mapping, found {}", describe(other)),
                })
            }
        };

        let base_models = models_mut(base)?;
        for (model_key, model_value) in fragment_models {
            let Value::Mapping(model_entries) = model_value else {
                return Err(ConfigError::InvalidValue {
                    path: format!("{}.{}", MODELS_KEY, key_label(model_key)),
                    reason: format!("expected a mapping, found {}", describe(model_value)),
                });
            };

            match base_models.get_mut(model_key) {
                Some(Value::Mapping(existing)) => {
                    for (key, value) in model_entries {
                        existing.insert(key.clone(), value.clone());
                    }
                }
                _ => {
                    base_models.insert(model_key.clone(), Value::Mapping(model_entries.clone()));
                }
            }
        }
    }

    merge_topology(base, fragment)
}

fn merge_topology(base: &mut Mapping, fragment: &Mapping) -> ConfigResult<()> {
    if let Some(topology) = fragment.get(TOPOLOGY_KEY) {
        if base.contains_key(TOPOLOGY_KEY) {
            debug!("Fragment replaces the existing '{}' section", TOPOLOGY_KEY);
        }
        base.insert(Value::String(TOPOLOGY_KEY.to_string()), topology.clone());
    }
    Ok(())
}

fn models_mut(base: &mut Mapping) -> ConfigResult<&mut Mapping> {
    let key = Value::String(MODELS_KEY.to_string());
    if !matches!(base.get(&key), Some(Value::Mapping(_))) {
        base.insert(key.clone(), Value::Mapping(Mapping::new()));
    }
    match base.get_mut(&key) {
        Some(Value::Mapping(models)) => Ok(models),
        _ => Err(ConfigError::InvalidValue {
            path: MODELS_KEY.to_string(),
            reason: "expected a mapping".to_string(),
        }),
    }
}

fn read_document(path: &Path) -> ConfigResult<Value> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlParse {
        path: path.to_path_buf(),
        source,
    })
}

fn take_conf_section(document: Value, path: &Path) -> ConfigResult<Mapping> {
    let missing = || ConfigError::MissingSection {
        path: path.to_path_buf(),
        section: ROOT_KEY.to_string(),
    };
    let Value::Mapping(mut document) = document else {
        return Err(missing());
    };
    match document.remove(ROOT_KEY) {
        Some(Value::Mapping(conf)) => Ok(conf),
        Some(Value::Null) => Ok(Mapping::new()),
        _ => Err(missing()),
    }
}

fn key_label(key: &Value) -> String {
    key.as_str()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{:?}", key))
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}
