use super::document::{load_at_key, FlowSection};
use super::error::{ResolveResultExt, ResolveStage};
use super::flow_key::{FlowConfigKey, FlowModule};
use super::handle::FlowConfig;
use super::merge::{merge_with_decisions, AncestorPayload};
use super::paths::{default_profile_document_path, PROFILE_DOCUMENT_ENV, TEMP_BASE_ENV};
use super::profile::{resolve_profile, ExecutionContext};
use super::{ConfigError, ResolveError};
use crate::run_tree::{init_run_tree, FsRunConfigStore, RunConfigStore, RunContext};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverOptions {
    /// Profile document consulted by root runs.
    pub profile_document: PathBuf,
    /// Directory under which root runs create their temp root.
    pub temp_base: PathBuf,
    /// Whether a root run exports its temp root to the process environment.
    pub publish_env: bool,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            profile_document: default_profile_document_path(),
            temp_base: std::env::temp_dir(),
            publish_env: true,
        }
    }
}

impl ResolverOptions {
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Some(path) = non_empty_env(PROFILE_DOCUMENT_ENV) {
            options.profile_document = path;
        }
        if let Some(path) = non_empty_env(TEMP_BASE_ENV) {
            options.temp_base = path;
        }
        options
    }
}

fn non_empty_env(name: &str) -> Option<PathBuf> {
    std::env::var_os(name)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    options: ResolverOptions,
}

impl ConfigResolver {
    pub fn new(options: ResolverOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    /// Resolves, persists and returns this run's configuration using the
    /// filesystem store, creating the run tree first when `context` is a root.
    pub fn lazy_load(
        &self,
        context: &mut RunContext,
        module: &FlowModule,
        execution: Option<&ExecutionContext>,
    ) -> Result<FlowConfig, ResolveError> {
        let flow_key = FlowConfigKey::derive(module, context.flow_name());
        let mut temp_root = init_run_tree(context, &self.options.temp_base)
            .during(ResolveStage::InitRunTree, flow_key.as_str())?;
        if self.options.publish_env {
            if let Some(temp_root) = &mut temp_root {
                temp_root.publish();
            }
        }

        let store = FsRunConfigStore::from_context(context);
        let config = self.resolve(context, module, execution, &store)?;
        Ok(config.with_temp_root(temp_root))
    }

    /// Resolves against any store. The caller owns the run tree's lifetime.
    pub fn resolve(
        &self,
        context: &RunContext,
        module: &FlowModule,
        execution: Option<&ExecutionContext>,
        store: &dyn RunConfigStore,
    ) -> Result<FlowConfig, ResolveError> {
        let flow_key = FlowConfigKey::derive(module, context.flow_name());
        let key = flow_key.as_str();
        let module_document = module.config_document_path();
        let mut documents = vec![module_document.clone()];

        let module_config = load_flow_section(&module_document, key)
            .during(ResolveStage::LoadModuleConfig, key)?;

        let ancestor = match context.parent_run_id() {
            None => {
                let from_env;
                let execution = match execution {
                    Some(execution) => execution,
                    None => {
                        from_env = ExecutionContext::from_env();
                        &from_env
                    }
                };
                let profile_document = &self.options.profile_document;
                let profile = resolve_profile(execution, profile_document)
                    .during(ResolveStage::ResolveProfile, key)?;
                let section = load_flow_section(profile_document, &profile)
                    .during(ResolveStage::ResolveProfile, key)?;
                documents.push(profile_document.clone());
                debug!(flow_key = key, profile = %profile, "root run inherits from profile");
                AncestorPayload::from_profile_section(section)
            }
            Some(parent_run_id) => {
                let parent = store
                    .load_ancestor(Some(parent_run_id))
                    .during(ResolveStage::LoadAncestor, key)?;
                if let Some(location) = store.record_location(parent_run_id) {
                    documents.push(location);
                }
                AncestorPayload::from_resolved(parent)
            }
        };

        store
            .claim_flow_key(&flow_key, module.identifier())
            .during(ResolveStage::ClaimFlowKey, key)?;

        let (resolved, decisions) = merge_with_decisions(module_config, &ancestor, &flow_key);
        store
            .persist(context.run_id(), &resolved)
            .during(ResolveStage::Persist, key)?;

        info!(
            flow_key = key,
            run_id = %context.run_id(),
            parent_run_id = ?context.parent_run_id().map(|id| id.as_str()),
            keys = resolved.values().len(),
            "resolved flow config"
        );
        let record_path = store.record_location(context.run_id());
        Ok(FlowConfig::new(flow_key, resolved, decisions, documents).with_record_path(record_path))
    }
}

/// Resolves with [`ResolverOptions::from_env`] and the filesystem store.
pub fn lazy_load_config(
    context: &mut RunContext,
    module: &FlowModule,
    execution: Option<&ExecutionContext>,
) -> Result<FlowConfig, ResolveError> {
    ConfigResolver::new(ResolverOptions::from_env()).lazy_load(context, module, execution)
}

fn load_flow_section(document: &Path, key: &str) -> Result<FlowSection, ConfigError> {
    let mapping = load_at_key(document, key)?;
    FlowSection::split(mapping).map_err(|source| ConfigError::Shape {
        path: document.display().to_string(),
        source,
    })
}
