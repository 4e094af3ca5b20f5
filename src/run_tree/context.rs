use crate::config::paths::TEMP_DIR_ENV;
use crate::shared::ids::{FlowName, RunId};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Identity issued by the scheduler; immutable for the run's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunIdentity {
    pub run_id: RunId,
    pub parent_run_id: Option<RunId>,
}

impl RunIdentity {
    pub fn root(run_id: RunId) -> Self {
        Self {
            run_id,
            parent_run_id: None,
        }
    }

    pub fn child_of(run_id: RunId, parent_run_id: RunId) -> Self {
        Self {
            run_id,
            parent_run_id: Some(parent_run_id),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_run_id.is_none()
    }
}

/// Everything this crate needs to know about the executing run, passed in
/// explicitly by the orchestration layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    identity: RunIdentity,
    flow_name: FlowName,
    temp_root: Option<PathBuf>,
}

impl RunContext {
    pub fn new(identity: RunIdentity, flow_name: FlowName) -> Self {
        Self {
            identity,
            flow_name,
            temp_root: None,
        }
    }

    /// Rebuilds the context in a descendant process from the inherited
    /// discovery variable.
    pub fn from_env(identity: RunIdentity, flow_name: FlowName) -> Self {
        let temp_root = std::env::var_os(TEMP_DIR_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        Self {
            identity,
            flow_name,
            temp_root,
        }
    }

    pub fn with_temp_root(mut self, temp_root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(temp_root.into());
        self
    }

    pub(crate) fn set_temp_root(&mut self, temp_root: PathBuf) {
        self.temp_root = Some(temp_root);
    }

    pub fn identity(&self) -> &RunIdentity {
        &self.identity
    }

    pub fn run_id(&self) -> &RunId {
        &self.identity.run_id
    }

    pub fn parent_run_id(&self) -> Option<&RunId> {
        self.identity.parent_run_id.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.identity.is_root()
    }

    pub fn flow_name(&self) -> &FlowName {
        &self.flow_name
    }

    pub fn temp_root(&self) -> Option<&Path> {
        self.temp_root.as_deref()
    }

    /// Context for a run spawned by this one, sharing the same tree.
    pub fn child(&self, run_id: RunId, flow_name: FlowName) -> Self {
        Self {
            identity: RunIdentity::child_of(run_id, self.identity.run_id.clone()),
            flow_name,
            temp_root: self.temp_root.clone(),
        }
    }

    /// Environment to hand a descendant process so it can find the tree.
    pub fn env_vars(&self) -> Vec<(&'static str, OsString)> {
        self.temp_root
            .iter()
            .map(|root| (TEMP_DIR_ENV, root.as_os_str().to_os_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_id(raw: &str) -> RunId {
        RunId::parse(raw).expect("run id")
    }

    #[test]
    fn child_context_links_parent_and_shares_temp_root() {
        let root = RunContext::new(
            RunIdentity::root(run_id("root-1")),
            FlowName::parse("main").expect("flow"),
        )
        .with_temp_root("/tmp/root-1.abc");
        let child = root.child(run_id("child-1"), FlowName::parse("sub").expect("flow"));

        assert!(root.is_root());
        assert!(!child.is_root());
        assert_eq!(child.parent_run_id(), Some(&run_id("root-1")));
        assert_eq!(child.temp_root(), Some(Path::new("/tmp/root-1.abc")));
        assert_eq!(child.env_vars().len(), 1);
    }

    #[test]
    fn env_vars_are_empty_without_a_temp_root() {
        let context = RunContext::new(
            RunIdentity::root(run_id("root-1")),
            FlowName::parse("main").expect("flow"),
        );
        assert!(context.env_vars().is_empty());
    }
}
