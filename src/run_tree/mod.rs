pub mod context;
pub mod error;
pub mod memory_store;
pub mod store;
pub mod temp_root;

pub use context::{RunContext, RunIdentity};
pub use error::RunStoreError;
pub use memory_store::MemoryRunConfigStore;
pub use store::{FsRunConfigStore, RunConfigStore};
pub use temp_root::{init_run_tree, TempRoot};
