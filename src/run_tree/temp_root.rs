use super::{RunContext, RunStoreError};
use crate::config::paths::TEMP_DIR_ENV;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// The directory shared by one run tree. Owned by the root run; dropping it
/// removes the directory and every record inside, and withdraws the
/// discovery variable if this handle published it.
#[derive(Debug)]
pub struct TempRoot {
    path: PathBuf,
    dir: Option<TempDir>,
    published: bool,
}

impl TempRoot {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Advertises the temp root through the process environment so
    /// descendant processes spawned from here inherit it.
    pub fn publish(&mut self) {
        std::env::set_var(TEMP_DIR_ENV, &self.path);
        self.published = true;
        debug!(path = %self.path.display(), env = TEMP_DIR_ENV, "published run tree temp root");
    }

    pub fn close(mut self) -> Result<(), RunStoreError> {
        self.withdraw();
        let path = self.path.display().to_string();
        let Some(dir) = self.dir.take() else {
            return Ok(());
        };
        match dir.close() {
            Ok(()) => {
                info!(path = %path, "removed run tree temp root");
                Ok(())
            }
            Err(source) => {
                warn!(path = %path, error = %source, "failed to remove run tree temp root");
                Err(RunStoreError::RemoveTempRoot { path, source })
            }
        }
    }

    /// Clears the discovery variable unless another tree has since replaced it.
    fn withdraw(&mut self) {
        if !std::mem::take(&mut self.published) {
            return;
        }
        if std::env::var_os(TEMP_DIR_ENV).as_deref() == Some(self.path.as_os_str()) {
            std::env::remove_var(TEMP_DIR_ENV);
            debug!(path = %self.path.display(), env = TEMP_DIR_ENV, "withdrew run tree temp root");
        }
    }
}

impl Drop for TempRoot {
    fn drop(&mut self) {
        self.withdraw();
    }
}

/// Creates a fresh temp root under `base` for a root run and records it in
/// `context`. Descendant runs get `None` and keep the tree they inherited.
pub fn init_run_tree(
    context: &mut RunContext,
    base: &Path,
) -> Result<Option<TempRoot>, RunStoreError> {
    if !context.is_root() {
        debug!(
            run_id = %context.run_id(),
            temp_root = ?context.temp_root(),
            "descendant run; reusing inherited run tree"
        );
        return Ok(None);
    }

    fs::create_dir_all(base).map_err(|source| RunStoreError::CreateTempRoot {
        path: base.display().to_string(),
        source,
    })?;
    let dir = tempfile::Builder::new()
        .prefix(&format!("{}.", context.run_id()))
        .tempdir_in(base)
        .map_err(|source| RunStoreError::CreateTempRoot {
            path: base.display().to_string(),
            source,
        })?;
    info!(run_id = %context.run_id(), path = %dir.path().display(), "created run tree temp root");
    context.set_temp_root(dir.path().to_path_buf());
    Ok(Some(TempRoot {
        path: dir.path().to_path_buf(),
        dir: Some(dir),
        published: false,
    }))
}
