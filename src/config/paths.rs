use std::path::PathBuf;

pub const DEFAULT_PROFILE_DOCUMENT: &str = "config.yaml";
pub const DEFAULT_MODULE_CONFIG_STEM: &str = "config";
pub const CONFIG_FILE_EXTENSION: &str = "yaml";

/// Discovery variable advertising the run tree's temp root to descendant processes.
pub const TEMP_DIR_ENV: &str = "FLOWCONF_TEMP_DIR";
pub const PROFILE_DOCUMENT_ENV: &str = "FLOWCONF_PROFILE_DOCUMENT";
pub const TEMP_BASE_ENV: &str = "FLOWCONF_TEMP_BASE";

pub const GLOBAL_SECTION: &str = "global";
pub const OVERRIDES_SECTION: &str = "overrides";
pub const WORKSPACES_SECTION: &str = "workspaces";

pub const DEVELOPMENT_PROFILE: &str = "development";

pub fn module_config_file_name(stem: &str) -> String {
    format!("{stem}.{CONFIG_FILE_EXTENSION}")
}

pub fn default_profile_document_path() -> PathBuf {
    PathBuf::from(DEFAULT_PROFILE_DOCUMENT)
}
