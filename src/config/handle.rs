use super::flow_key::FlowConfigKey;
use super::merge::{MergeDecision, MergeLayer, ResolvedConfig};
use super::ConfigError;
use crate::run_tree::{RunStoreError, TempRoot};
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};

/// The resolved configuration handed to a run's own logic.
///
/// Reads see the merged view. [`FlowConfig::set`] changes only this handle;
/// the persisted record that descendants inherit stays as resolved. A root
/// run's handle also owns the run tree's temp root.
#[derive(Debug)]
pub struct FlowConfig {
    flow_key: FlowConfigKey,
    resolved: ResolvedConfig,
    values: Mapping,
    decisions: Vec<MergeDecision>,
    documents: Vec<PathBuf>,
    record_path: Option<PathBuf>,
    temp_root: Option<TempRoot>,
}

impl FlowConfig {
    pub fn new(
        flow_key: FlowConfigKey,
        resolved: ResolvedConfig,
        decisions: Vec<MergeDecision>,
        documents: Vec<PathBuf>,
    ) -> Self {
        Self {
            flow_key,
            values: resolved.values().clone(),
            resolved,
            decisions,
            documents,
            record_path: None,
            temp_root: None,
        }
    }

    pub(crate) fn with_record_path(mut self, record_path: Option<PathBuf>) -> Self {
        self.record_path = record_path;
        self
    }

    pub(crate) fn with_temp_root(mut self, temp_root: Option<TempRoot>) -> Self {
        self.temp_root = temp_root;
        self
    }

    pub fn flow_key(&self) -> &FlowConfigKey {
        &self.flow_key
    }

    pub fn resolved(&self) -> &ResolvedConfig {
        &self.resolved
    }

    pub fn values(&self) -> &Mapping {
        &self.values
    }

    pub fn documents(&self) -> &[PathBuf] {
        &self.documents
    }

    pub fn record_path(&self) -> Option<&Path> {
        self.record_path.as_deref()
    }

    pub fn temp_root(&self) -> Option<&Path> {
        self.temp_root.as_ref().map(TempRoot::path)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a Value) -> &'a Value {
        self.get(key).unwrap_or(default)
    }

    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        serde_yaml::from_value(value.clone())
            .map(Some)
            .map_err(|source| ConfigError::ValueType {
                flow_key: self.flow_key.to_string(),
                key: key.to_string(),
                source,
            })
    }

    /// Like [`FlowConfig::get_as`] but a missing or null value is a
    /// configuration error naming the documents that were consulted.
    pub fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T, ConfigError> {
        match self.get_as::<Option<T>>(key)?.flatten() {
            Some(value) => Ok(value),
            None => Err(ConfigError::MissingValue {
                flow_key: self.flow_key.to_string(),
                key: key.to_string(),
                documents: self.documents_label(),
            }),
        }
    }

    pub fn set(&mut self, key: impl Into<Value>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(key.into(), value.into())
    }

    /// Layer that last wrote `key` during the merge.
    pub fn source_of(&self, key: &str) -> Option<MergeLayer> {
        self.decisions
            .iter()
            .rev()
            .find(|decision| decision.key == key)
            .map(|decision| decision.layer)
    }

    pub fn decisions(&self) -> &[MergeDecision] {
        &self.decisions
    }

    /// Removes the run tree's temp root when this handle owns it. Descendant
    /// handles own nothing and close trivially.
    pub fn close(mut self) -> Result<(), RunStoreError> {
        match self.temp_root.take() {
            Some(temp_root) => temp_root.close(),
            None => Ok(()),
        }
    }

    fn documents_label(&self) -> String {
        if self.documents.is_empty() {
            return "none".to_string();
        }
        self.documents
            .iter()
            .map(|path| path.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Panics when `key` is absent; use [`FlowConfig::get`] or
/// [`FlowConfig::require`] when absence is expected.
impl std::ops::Index<&str> for FlowConfig {
    type Output = Value;

    fn index(&self, key: &str) -> &Value {
        match self.get(key) {
            Some(value) => value,
            None => panic!("`{key}` is not set in flow config `{}`", self.flow_key),
        }
    }
}

impl std::fmt::Display for FlowConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match serde_yaml::to_string(&self.values) {
            Ok(rendered) => f.write_str(rendered.trim_end()),
            Err(_) => write!(f, "<unprintable config for {}>", self.flow_key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::merge::{merge_with_decisions, AncestorPayload};
    use crate::config::{FlowModule, FlowSection};
    use crate::shared::ids::FlowName;

    fn handle(raw: &str) -> FlowConfig {
        let module = FlowModule::new("flows.buoys", "/srv/flows").expect("module");
        let key = FlowConfigKey::derive(&module, &FlowName::parse("WIS2-buoys").expect("flow"));
        let section = FlowSection::split(serde_yaml::from_str(raw).expect("yaml")).expect("split");
        let (resolved, decisions) =
            merge_with_decisions(section, &AncestorPayload::default(), &key);
        FlowConfig::new(
            key,
            resolved,
            decisions,
            vec![module.config_document_path()],
        )
    }

    #[test]
    fn set_changes_the_handle_but_not_the_resolved_record() {
        let mut config = handle("wigos_id: \"0-1\"\n");
        config.set("wigos_id", "0-2");
        assert_eq!(config.get("wigos_id"), Some(&Value::from("0-2")));
        assert_eq!(config.resolved().get("wigos_id"), Some(&Value::from("0-1")));
    }

    #[test]
    fn require_reports_flow_key_and_documents() {
        let config = handle("minio_path: ~\n");
        let err = config.require::<String>("minio_path").expect_err("null is missing");
        match err {
            ConfigError::MissingValue {
                flow_key,
                key,
                documents,
            } => {
                assert_eq!(flow_key, "buoys.WIS2-buoys");
                assert_eq!(key, "minio_path");
                assert!(documents.contains("config.yaml"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn get_as_reports_type_mismatches() {
        let config = handle("retries: many\n");
        let err = config.get_as::<u32>("retries").expect_err("not a number");
        assert!(matches!(err, ConfigError::ValueType { .. }));
        assert_eq!(config.get_as::<u32>("absent").expect("absent is fine"), None);
    }

    #[test]
    fn index_reads_the_merged_view() {
        let mut config = handle("wigos_id: \"0-1\"\n");
        assert_eq!(config["wigos_id"], Value::from("0-1"));
        config.set("wigos_id", "0-2");
        assert_eq!(config["wigos_id"], Value::from("0-2"));
    }

    #[test]
    #[should_panic(expected = "`minio_path` is not set in flow config `buoys.WIS2-buoys`")]
    fn index_panics_on_missing_key() {
        let config = handle("wigos_id: \"0-1\"\n");
        let _ = &config["minio_path"];
    }

    #[test]
    fn display_renders_yaml() {
        let config = handle("a: 1\n");
        assert_eq!(config.to_string(), "a: 1");
        assert_eq!(config.source_of("a"), Some(MergeLayer::Module));
    }
}
