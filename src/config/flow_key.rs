use super::paths::{module_config_file_name, DEFAULT_MODULE_CONFIG_STEM};
use crate::shared::ids::{validate_identifier_value, FlowName};
use std::path::{Component, Path, PathBuf};

/// A unit of executable logic that owns a module-local config document.
///
/// `identifier` is the dotted module path (`pkg.sub.module`); the document
/// lives in `dir` as `{config_stem}.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlowModule {
    identifier: String,
    dir: PathBuf,
    config_stem: String,
}

impl FlowModule {
    pub fn new(identifier: &str, dir: impl Into<PathBuf>) -> Result<Self, String> {
        validate_module_identifier(identifier)?;
        Ok(Self {
            identifier: identifier.to_string(),
            dir: dir.into(),
            config_stem: DEFAULT_MODULE_CONFIG_STEM.to_string(),
        })
    }

    /// Names a module after its source file relative to `cwd`, the way an
    /// import system would: `pkg/sub/flow.rs` becomes `pkg.sub.flow`.
    pub fn from_source_file(path: &Path, cwd: &Path) -> Result<Self, String> {
        let relative = path.strip_prefix(cwd).unwrap_or(path);
        let mut segments = Vec::new();
        if let Some(parent) = relative.parent() {
            for component in parent.components() {
                match component {
                    Component::Normal(segment) => segments.push(
                        segment
                            .to_str()
                            .ok_or_else(|| format!("non-utf8 path segment in {}", path.display()))?
                            .to_string(),
                    ),
                    Component::CurDir => {}
                    _ => {
                        return Err(format!(
                            "source file {} is not under {}",
                            path.display(),
                            cwd.display()
                        ))
                    }
                }
            }
        }
        let stem = relative
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| format!("source file {} has no file stem", path.display()))?;
        if stem != "mod" {
            segments.push(stem.to_string());
        }

        let dir = match path.parent() {
            Some(parent) if path.is_absolute() => parent.to_path_buf(),
            Some(parent) => cwd.join(parent),
            None => cwd.to_path_buf(),
        };
        Self::new(&segments.join("."), dir)
    }

    pub fn with_config_file(mut self, stem: impl Into<String>) -> Self {
        self.config_stem = stem.into();
        self
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Last segment of the dotted identifier.
    pub fn base_name(&self) -> &str {
        self.identifier
            .rsplit('.')
            .next()
            .unwrap_or(self.identifier.as_str())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config_document_path(&self) -> PathBuf {
        self.dir.join(module_config_file_name(&self.config_stem))
    }
}

fn validate_module_identifier(identifier: &str) -> Result<(), String> {
    if identifier.is_empty() {
        return Err("module identifier must be non-empty".to_string());
    }
    for segment in identifier.split('.') {
        validate_identifier_value("module identifier segment", segment)
            .map_err(|err| format!("invalid module identifier `{identifier}`: {err}"))?;
    }
    Ok(())
}

/// `{module_base_name}.{flow_name}`; locates a module's section in its
/// document and its entry in an inherited `overrides` mapping.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlowConfigKey(String);

impl FlowConfigKey {
    pub fn derive(module: &FlowModule, flow_name: &FlowName) -> Self {
        Self(format!("{}.{}", module.base_name(), flow_name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FlowConfigKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Derives the key from a dotted module path.
pub fn derive_key(module_path: &str, flow_name: &FlowName) -> FlowConfigKey {
    let base = module_path.rsplit('.').next().unwrap_or(module_path);
    FlowConfigKey(format!("{base}.{flow_name}"))
}
