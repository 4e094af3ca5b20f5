use super::error::SectionShapeError;
use super::paths::{GLOBAL_SECTION, OVERRIDES_SECTION};
use super::ConfigError;
use serde_yaml::{Mapping, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

/// Reads a YAML document as a mapping. A missing file or an empty document
/// yields an empty mapping.
pub fn load_document(path: &Path) -> Result<Mapping, ConfigError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(source) if source.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "config document not found; using empty mapping");
            return Ok(Mapping::new());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.display().to_string(),
                source,
            })
        }
    };
    parse_document(&raw, path)
}

pub fn parse_document(raw: &str, path: &Path) -> Result<Mapping, ConfigError> {
    if raw.trim().is_empty() {
        return Ok(Mapping::new());
    }
    let value: Value = serde_yaml::from_str(raw).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    match value {
        Value::Null => Ok(Mapping::new()),
        Value::Mapping(mapping) => Ok(mapping),
        _ => Err(ConfigError::Shape {
            path: path.display().to_string(),
            source: SectionShapeError {
                key: "<document root>".to_string(),
                expected: "a mapping",
            },
        }),
    }
}

/// Extracts the mapping stored under `key`.
///
/// An explicit `key: ~` yields an empty mapping. When `key` is absent the
/// whole document is returned instead; callers that share one document
/// between several flows rely on this fallback, so it is kept as is.
pub fn load_at_key(path: &Path, key: &str) -> Result<Mapping, ConfigError> {
    let document = load_document(path)?;
    match document.get(key) {
        None => {
            debug!(path = %path.display(), key, "key absent; falling back to whole document");
            Ok(document)
        }
        Some(Value::Null) => Ok(Mapping::new()),
        Some(Value::Mapping(section)) => Ok(section.clone()),
        Some(_) => Err(ConfigError::Shape {
            path: path.display().to_string(),
            source: SectionShapeError {
                key: key.to_string(),
                expected: "a mapping",
            },
        }),
    }
}

/// A flow-configuration mapping split into its reserved sections and the
/// flow's own settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowSection {
    pub global: Option<Mapping>,
    pub overrides: Option<Mapping>,
    pub settings: Mapping,
}

impl FlowSection {
    pub fn split(mapping: Mapping) -> Result<Self, SectionShapeError> {
        let mut section = FlowSection::default();
        for (key, value) in mapping {
            match key.as_str() {
                Some(GLOBAL_SECTION) => {
                    section.global = Some(section_mapping(GLOBAL_SECTION, value)?);
                }
                Some(OVERRIDES_SECTION) => {
                    section.overrides = Some(override_rules(value)?);
                }
                _ => {
                    section.settings.insert(key, value);
                }
            }
        }
        Ok(section)
    }

    /// Inverse of [`FlowSection::split`]: own settings first, then the
    /// reserved sections that are present.
    pub fn into_mapping(self) -> Mapping {
        let mut mapping = self.settings;
        if let Some(global) = self.global {
            mapping.insert(Value::from(GLOBAL_SECTION), Value::Mapping(global));
        }
        if let Some(overrides) = self.overrides {
            mapping.insert(Value::from(OVERRIDES_SECTION), Value::Mapping(overrides));
        }
        mapping
    }
}

fn section_mapping(key: &str, value: Value) -> Result<Mapping, SectionShapeError> {
    match value {
        Value::Null => Ok(Mapping::new()),
        Value::Mapping(mapping) => Ok(mapping),
        _ => Err(SectionShapeError {
            key: key.to_string(),
            expected: "a mapping",
        }),
    }
}

fn override_rules(value: Value) -> Result<Mapping, SectionShapeError> {
    let rules = section_mapping(OVERRIDES_SECTION, value)?;
    let mut normalized = Mapping::new();
    for (target, rule) in rules {
        let label = format!("{OVERRIDES_SECTION}.{}", key_label(&target));
        let rule = section_mapping(&label, rule)?;
        normalized.insert(target, Value::Mapping(rule));
    }
    Ok(normalized)
}

/// Renders a mapping key for logs and error messages.
pub fn key_label(key: &Value) -> String {
    match key {
        Value::String(value) => value.clone(),
        other => serde_yaml::to_string(other)
            .map(|rendered| rendered.trim_end().to_string())
            .unwrap_or_else(|_| "<unprintable>".to_string()),
    }
}
