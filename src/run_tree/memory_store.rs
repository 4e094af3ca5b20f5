use super::store::RunConfigStore;
use super::RunStoreError;
use crate::config::{FlowConfigKey, ResolvedConfig};
use crate::shared::ids::RunId;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// In-process store for run trees whose runs share one address space.
/// Same contract as the filesystem store; share it behind an `Arc`.
#[derive(Debug, Default)]
pub struct MemoryRunConfigStore {
    records: Mutex<HashMap<RunId, ResolvedConfig>>,
    claims: Mutex<HashMap<FlowConfigKey, String>>,
}

impl MemoryRunConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|err| err.into_inner())
}

impl RunConfigStore for MemoryRunConfigStore {
    fn persist(&self, run_id: &RunId, config: &ResolvedConfig) -> Result<(), RunStoreError> {
        let mut records = lock(&self.records);
        match records.get(run_id) {
            Some(existing) if existing == config => Ok(()),
            Some(_) => Err(RunStoreError::RecordConflict {
                run_id: run_id.to_string(),
                path: "<memory>".to_string(),
            }),
            None => {
                records.insert(run_id.clone(), config.clone());
                debug!(run_id = %run_id, "persisted resolved config in memory");
                Ok(())
            }
        }
    }

    fn load_ancestor(&self, parent_run_id: Option<&RunId>) -> Result<ResolvedConfig, RunStoreError> {
        let Some(parent_run_id) = parent_run_id else {
            return Ok(ResolvedConfig::default());
        };
        lock(&self.records)
            .get(parent_run_id)
            .cloned()
            .ok_or_else(|| RunStoreError::AncestorConfigMissing {
                parent_run_id: parent_run_id.to_string(),
                temp_root: "<memory>".to_string(),
                matches: 0,
            })
    }

    fn claim_flow_key(&self, flow_key: &FlowConfigKey, module: &str) -> Result<(), RunStoreError> {
        let mut claims = lock(&self.claims);
        match claims.get(flow_key) {
            Some(claimed_by) if claimed_by == module => Ok(()),
            Some(claimed_by) => Err(RunStoreError::FlowKeyCollision {
                flow_key: flow_key.to_string(),
                claimed_by: claimed_by.clone(),
                requested_by: module.to_string(),
            }),
            None => {
                claims.insert(flow_key.clone(), module.to_string());
                Ok(())
            }
        }
    }
}
