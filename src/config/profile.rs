use super::document::load_at_key;
use super::paths::{DEVELOPMENT_PROFILE, WORKSPACES_SECTION};
use super::ConfigError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::Value;
use std::path::Path;
use tracing::info;

pub const PROFILE_ENV: &str = "FLOWCONF_PROFILE";
pub const API_URL_ENV: &str = "FLOWCONF_API_URL";

static DEVELOPMENT_PROFILE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^development-.*$").expect("development profile regex should compile"));

static WORKSPACE_ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^.*workspaces/([0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})",
    )
    .expect("workspace id regex should compile")
});

/// What the scheduler tells a root run about where it is executing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    pub profile_name: String,
    pub api_url: String,
}

impl ExecutionContext {
    pub fn new(profile_name: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            profile_name: profile_name.into(),
            api_url: api_url.into(),
        }
    }

    pub fn from_env() -> Self {
        Self {
            profile_name: std::env::var(PROFILE_ENV).unwrap_or_default(),
            api_url: std::env::var(API_URL_ENV).unwrap_or_default(),
        }
    }

    pub fn workspace_id(&self) -> Option<&str> {
        WORKSPACE_ID_PATTERN
            .captures(&self.api_url)
            .and_then(|captures| captures.get(1))
            .map(|id| id.as_str())
    }
}

pub fn resolve_profile(context: &ExecutionContext, document: &Path) -> Result<String, ConfigError> {
    if DEVELOPMENT_PROFILE_PATTERN.is_match(&context.profile_name) {
        info!(hint = %context.profile_name, "using development profile");
        return Ok(DEVELOPMENT_PROFILE.to_string());
    }

    let workspace_id = context.workspace_id().ok_or_else(|| ConfigError::Profile {
        document: document.display().to_string(),
        reason: format!(
            "api url `{}` does not contain a workspace id",
            context.api_url
        ),
    })?;
    let workspaces = load_at_key(document, WORKSPACES_SECTION)?;
    let profile = match workspaces.get(workspace_id) {
        Some(Value::String(profile)) => profile.clone(),
        Some(_) => {
            return Err(ConfigError::Profile {
                document: document.display().to_string(),
                reason: format!("profile for workspace `{workspace_id}` must be a string"),
            })
        }
        None => {
            return Err(ConfigError::Profile {
                document: document.display().to_string(),
                reason: format!("workspace `{workspace_id}` is not listed under `{WORKSPACES_SECTION}`"),
            })
        }
    };
    info!(workspace_id, profile = %profile, "resolved profile from workspace");
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_id_is_extracted_from_api_url() {
        let context = ExecutionContext::new(
            "prod",
            "https://api.example.com/api/accounts/1/workspaces/0b5c7d1e-1f2a-4c3b-9d8e-7f6a5b4c3d2e",
        );
        assert_eq!(
            context.workspace_id(),
            Some("0b5c7d1e-1f2a-4c3b-9d8e-7f6a5b4c3d2e")
        );
        assert_eq!(ExecutionContext::new("prod", "http://localhost:4200/api").workspace_id(), None);
    }

    #[test]
    fn development_hint_needs_a_suffix() {
        assert!(DEVELOPMENT_PROFILE_PATTERN.is_match("development-alice"));
        assert!(!DEVELOPMENT_PROFILE_PATTERN.is_match("development"));
        assert!(!DEVELOPMENT_PROFILE_PATTERN.is_match("my-development-box"));
    }
}
