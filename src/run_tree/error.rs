use crate::config::{ErrorKind, SectionShapeError};

#[derive(Debug, thiserror::Error)]
pub enum RunStoreError {
    #[error("run tree temp root is unknown; a root run must initialize it or `{env}` must be set")]
    TempRootUnknown { env: &'static str },
    #[error("failed to create run tree temp root under {path}: {source}")]
    CreateTempRoot {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to remove run tree temp root {path}: {source}")]
    RemoveTempRoot {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write config record {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode config record for run `{run_id}`: {source}")]
    Encode {
        run_id: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("config record for run `{run_id}` already exists at {path} with different content")]
    RecordConflict { run_id: String, path: String },
    #[error(
        "expected exactly one config record for parent run `{parent_run_id}` in {temp_root}, found {matches}"
    )]
    AncestorConfigMissing {
        parent_run_id: String,
        temp_root: String,
        matches: usize,
    },
    #[error("failed to read config record {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid yaml in config record {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid config record {path}: {source}")]
    Shape {
        path: String,
        #[source]
        source: SectionShapeError,
    },
    #[error(
        "flow config key `{flow_key}` is claimed by module `{claimed_by}`; module `{requested_by}` cannot reuse it in this run tree"
    )]
    FlowKeyCollision {
        flow_key: String,
        claimed_by: String,
        requested_by: String,
    },
}

impl RunStoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RunStoreError::AncestorConfigMissing { .. } | RunStoreError::Read { .. } => {
                ErrorKind::AncestorConfigMissing
            }
            RunStoreError::Parse { .. } | RunStoreError::Shape { .. } => ErrorKind::ConfigFormat,
            RunStoreError::FlowKeyCollision { .. } => ErrorKind::Configuration,
            RunStoreError::TempRootUnknown { .. }
            | RunStoreError::CreateTempRoot { .. }
            | RunStoreError::RemoveTempRoot { .. }
            | RunStoreError::Write { .. }
            | RunStoreError::Encode { .. }
            | RunStoreError::RecordConflict { .. } => ErrorKind::Persistence,
        }
    }
}
