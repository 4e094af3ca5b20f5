use crate::run_tree::RunStoreError;

/// Coarse classification used by callers deciding how to report a failure.
/// None of these are transient, so nothing in this crate retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ConfigFormat,
    Configuration,
    AncestorConfigMissing,
    Persistence,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid yaml in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid config in {path}: {source}")]
    Shape {
        path: String,
        #[source]
        source: SectionShapeError,
    },
    #[error("failed to resolve profile from {document}: {reason}")]
    Profile { document: String, reason: String },
    #[error("`{key}` is required by `{flow_key}` but is missing after resolution (consulted: {documents})")]
    MissingValue {
        flow_key: String,
        key: String,
        documents: String,
    },
    #[error("`{key}` for `{flow_key}` has an unexpected type: {source}")]
    ValueType {
        flow_key: String,
        key: String,
        #[source]
        source: serde_yaml::Error,
    },
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfigError::Parse { .. } | ConfigError::Shape { .. } => ErrorKind::ConfigFormat,
            ConfigError::Read { .. }
            | ConfigError::Profile { .. }
            | ConfigError::MissingValue { .. }
            | ConfigError::ValueType { .. } => ErrorKind::Configuration,
        }
    }
}

/// A `global` or `overrides` section (or an override entry) that is not a mapping.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("`{key}` must be {expected}")]
pub struct SectionShapeError {
    pub key: String,
    pub expected: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStage {
    InitRunTree,
    ResolveProfile,
    LoadModuleConfig,
    LoadAncestor,
    ClaimFlowKey,
    Persist,
}

impl std::fmt::Display for ResolveStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveStage::InitRunTree => write!(f, "initializing the run tree"),
            ResolveStage::ResolveProfile => write!(f, "resolving the profile"),
            ResolveStage::LoadModuleConfig => write!(f, "loading module config"),
            ResolveStage::LoadAncestor => write!(f, "loading ancestor config"),
            ResolveStage::ClaimFlowKey => write!(f, "claiming the flow config key"),
            ResolveStage::Persist => write!(f, "persisting resolved config"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveFailure {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] RunStoreError),
}

impl ResolveFailure {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResolveFailure::Config(err) => err.kind(),
            ResolveFailure::Store(err) => err.kind(),
        }
    }
}

/// Failure of one run's configuration step, tagged with the flow key and the
/// stage that failed so an operator can find the document to fix.
#[derive(Debug, thiserror::Error)]
#[error("flow config `{flow_key}` failed while {stage}: {source}")]
pub struct ResolveError {
    pub flow_key: String,
    pub stage: ResolveStage,
    #[source]
    pub source: ResolveFailure,
}

impl ResolveError {
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

pub(crate) trait ResolveResultExt<T> {
    fn during(self, stage: ResolveStage, flow_key: &str) -> Result<T, ResolveError>;
}

impl<T, E> ResolveResultExt<T> for Result<T, E>
where
    E: Into<ResolveFailure>,
{
    fn during(self, stage: ResolveStage, flow_key: &str) -> Result<T, ResolveError> {
        self.map_err(|err| ResolveError {
            flow_key: flow_key.to_string(),
            stage,
            source: err.into(),
        })
    }
}
