use super::{RunContext, RunStoreError};
use crate::config::document::parse_document;
use crate::config::paths::{CONFIG_FILE_EXTENSION, TEMP_DIR_ENV};
use crate::config::{ConfigError, FlowConfigKey, ResolvedConfig};
use crate::shared::fs_atomic::atomic_write_file;
use crate::shared::ids::RunId;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const FLOW_KEY_CLAIMS_DIR: &str = ".flow-keys";

/// Hand-off medium between a run and its direct children.
///
/// Records are single-writer: a run persists its own record once, children
/// only read it. Callers must not start a child before its parent's
/// `persist` returned.
pub trait RunConfigStore {
    fn persist(&self, run_id: &RunId, config: &ResolvedConfig) -> Result<(), RunStoreError>;

    /// `None` is a root run and yields an empty config without touching the store.
    fn load_ancestor(&self, parent_run_id: Option<&RunId>) -> Result<ResolvedConfig, RunStoreError>;

    /// Binds `flow_key` to `module` for the whole run tree; a different
    /// module asking for the same key is a collision.
    fn claim_flow_key(&self, flow_key: &FlowConfigKey, module: &str) -> Result<(), RunStoreError>;

    fn record_location(&self, _run_id: &RunId) -> Option<PathBuf> {
        None
    }
}

/// Records as YAML files named `{run_id}.yaml` inside the run tree's temp root.
#[derive(Debug, Clone)]
pub struct FsRunConfigStore {
    temp_root: Option<PathBuf>,
}

impl FsRunConfigStore {
    pub fn new(temp_root: Option<PathBuf>) -> Self {
        Self { temp_root }
    }

    pub fn from_context(context: &RunContext) -> Self {
        Self::new(context.temp_root().map(Path::to_path_buf))
    }

    pub fn temp_root(&self) -> Option<&Path> {
        self.temp_root.as_deref()
    }

    fn require_temp_root(&self) -> Result<&Path, RunStoreError> {
        self.temp_root
            .as_deref()
            .ok_or(RunStoreError::TempRootUnknown { env: TEMP_DIR_ENV })
    }

    fn record_path(temp_root: &Path, run_id: &RunId) -> PathBuf {
        temp_root.join(format!("{run_id}.{CONFIG_FILE_EXTENSION}"))
    }

    /// Files whose name starts with `{run_id}.`; hidden temp and claim
    /// files never match because run ids cannot start with a dot.
    fn matching_records(temp_root: &Path, run_id: &RunId) -> Result<Vec<PathBuf>, RunStoreError> {
        let prefix = format!("{run_id}.");
        let entries = match fs::read_dir(temp_root) {
            Ok(entries) => entries,
            Err(source) if source.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(read_error(temp_root, source)),
        };

        let mut matches = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| read_error(temp_root, source))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let starts_with_prefix = entry
                .file_name()
                .to_str()
                .map(|name| name.starts_with(&prefix))
                .unwrap_or(false);
            if starts_with_prefix {
                matches.push(path);
            }
        }
        matches.sort();
        Ok(matches)
    }

    fn read_record(path: &Path) -> Result<ResolvedConfig, RunStoreError> {
        let raw = fs::read_to_string(path).map_err(|source| read_error(path, source))?;
        let document = parse_document(&raw, path).map_err(|err| match err {
            ConfigError::Parse { path, source } => RunStoreError::Parse { path, source },
            ConfigError::Shape { path, source } => RunStoreError::Shape { path, source },
            ConfigError::Read { path, source } => RunStoreError::Read { path, source },
            other => RunStoreError::Read {
                path: path.display().to_string(),
                source: std::io::Error::other(other.to_string()),
            },
        })?;
        ResolvedConfig::from_document(document).map_err(|source| RunStoreError::Shape {
            path: path.display().to_string(),
            source,
        })
    }
}

impl RunConfigStore for FsRunConfigStore {
    fn persist(&self, run_id: &RunId, config: &ResolvedConfig) -> Result<(), RunStoreError> {
        let temp_root = self.require_temp_root()?;
        let path = Self::record_path(temp_root, run_id);
        if path.exists() {
            let existing = Self::read_record(&path)?;
            if existing == *config {
                debug!(run_id = %run_id, path = %path.display(), "identical config record already persisted");
                return Ok(());
            }
            return Err(RunStoreError::RecordConflict {
                run_id: run_id.to_string(),
                path: path.display().to_string(),
            });
        }

        let body = serde_yaml::to_string(&config.to_document()).map_err(|source| {
            RunStoreError::Encode {
                run_id: run_id.to_string(),
                source,
            }
        })?;
        atomic_write_file(&path, body.as_bytes()).map_err(|source| RunStoreError::Write {
            path: path.display().to_string(),
            source,
        })?;
        info!(run_id = %run_id, path = %path.display(), "persisted resolved config");
        Ok(())
    }

    fn load_ancestor(&self, parent_run_id: Option<&RunId>) -> Result<ResolvedConfig, RunStoreError> {
        let Some(parent_run_id) = parent_run_id else {
            return Ok(ResolvedConfig::default());
        };
        let Some(temp_root) = self.temp_root.as_deref() else {
            return Err(RunStoreError::AncestorConfigMissing {
                parent_run_id: parent_run_id.to_string(),
                temp_root: format!("<unset {TEMP_DIR_ENV}>"),
                matches: 0,
            });
        };

        let matches = Self::matching_records(temp_root, parent_run_id)?;
        let [path] = matches.as_slice() else {
            return Err(RunStoreError::AncestorConfigMissing {
                parent_run_id: parent_run_id.to_string(),
                temp_root: temp_root.display().to_string(),
                matches: matches.len(),
            });
        };
        let config = Self::read_record(path)?;
        debug!(parent_run_id = %parent_run_id, path = %path.display(), "loaded ancestor config record");
        Ok(config)
    }

    fn claim_flow_key(&self, flow_key: &FlowConfigKey, module: &str) -> Result<(), RunStoreError> {
        let temp_root = self.require_temp_root()?;
        let claims_dir = temp_root.join(FLOW_KEY_CLAIMS_DIR);
        fs::create_dir_all(&claims_dir).map_err(|source| RunStoreError::Write {
            path: claims_dir.display().to_string(),
            source,
        })?;
        let path = claims_dir.join(hex_name(flow_key.as_str()));
        let write_error = |source| RunStoreError::Write {
            path: path.display().to_string(),
            source,
        };

        // The owner is written in full before the claim becomes visible;
        // `hard_link` publishes it atomically and refuses an existing claim.
        let mut staged = tempfile::NamedTempFile::new_in(&claims_dir).map_err(write_error)?;
        staged
            .write_all(module.as_bytes())
            .and_then(|()| staged.as_file().sync_all())
            .map_err(write_error)?;

        match fs::hard_link(staged.path(), &path) {
            Ok(()) => {
                debug!(%flow_key, module, "claimed flow config key");
                Ok(())
            }
            Err(source) if source.kind() == ErrorKind::AlreadyExists => {
                let claimed_by =
                    fs::read_to_string(&path).map_err(|source| read_error(&path, source))?;
                if claimed_by == module {
                    return Ok(());
                }
                Err(RunStoreError::FlowKeyCollision {
                    flow_key: flow_key.to_string(),
                    claimed_by,
                    requested_by: module.to_string(),
                })
            }
            Err(source) => Err(write_error(source)),
        }
    }

    fn record_location(&self, run_id: &RunId) -> Option<PathBuf> {
        self.temp_root
            .as_deref()
            .map(|temp_root| Self::record_path(temp_root, run_id))
    }
}

/// Flow keys may hold spaces and dots; hex keeps claim file names portable.
fn hex_name(raw: &str) -> String {
    raw.bytes().map(|byte| format!("{byte:02x}")).collect()
}

fn read_error(path: &Path, source: std::io::Error) -> RunStoreError {
    RunStoreError::Read {
        path: path.display().to_string(),
        source,
    }
}
