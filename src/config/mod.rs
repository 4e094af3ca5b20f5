pub mod document;
pub mod error;
pub mod flow_key;
pub mod handle;
pub mod load;
pub mod merge;
pub mod paths;
pub mod profile;

pub use document::{load_at_key, load_document, FlowSection};
pub use error::{
    ConfigError, ErrorKind, ResolveError, ResolveFailure, ResolveStage, SectionShapeError,
};
pub use flow_key::{derive_key, FlowConfigKey, FlowModule};
pub use handle::FlowConfig;
pub use load::{lazy_load_config, ConfigResolver, ResolverOptions};
pub use merge::{
    merge, merge_with_decisions, AncestorPayload, MergeDecision, MergeLayer, ResolvedConfig,
};
pub use paths::{
    DEFAULT_MODULE_CONFIG_STEM, DEFAULT_PROFILE_DOCUMENT, PROFILE_DOCUMENT_ENV, TEMP_BASE_ENV,
    TEMP_DIR_ENV,
};
pub use profile::{resolve_profile, ExecutionContext, API_URL_ENV, PROFILE_ENV};
