use std::path::PathBuf;

use thiserror::Error;

use crate::plugin::platform::Platform;

/// Reasons a single plugin manifest is rejected during discovery.
///
/// These never reach the caller of a listing; the loader logs them and moves on.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid manifest: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("manifest field `{0}` must not be empty")]
    MissingField(&'static str),
}

/// Terminal failure of one launch request.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("plugin not found: {0}")]
    PluginNotFound(String),

    #[error("plugin {plugin} has no launch target for {platform}")]
    UnsupportedPlatform { plugin: String, platform: Platform },

    #[error("plugin {plugin} requires context `{key}`")]
    MissingContext { plugin: String, key: String },

    #[error("executable not found: {}", .0.display())]
    ExecutableNotFound(PathBuf),

    #[error("failed to start {}: {source}", .path.display())]
    SpawnFailure {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl LaunchError {
    /// Stable tag for the request/response boundary.
    pub fn code(&self) -> &'static str {
        match self {
            LaunchError::PluginNotFound(_) => "plugin_not_found",
            LaunchError::UnsupportedPlatform { .. } => "unsupported_platform",
            LaunchError::MissingContext { .. } => "missing_context",
            LaunchError::ExecutableNotFound(_) => "executable_not_found",
            LaunchError::SpawnFailure { .. } => "spawn_failure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_value() {
        let err = LaunchError::MissingContext {
            plugin: "git-tool".to_string(),
            key: "projectPath".to_string(),
        };
        assert_eq!(err.to_string(), "plugin git-tool requires context `projectPath`");
        assert_eq!(err.code(), "missing_context");

        let err = LaunchError::UnsupportedPlatform {
            plugin: "git-tool".to_string(),
            platform: Platform::Macos,
        };
        assert_eq!(err.to_string(), "plugin git-tool has no launch target for macos");
    }

    #[test]
    fn spawn_failure_keeps_system_error_text() {
        let err = LaunchError::SpawnFailure {
            path: PathBuf::from("/opt/tool"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.code(), "spawn_failure");
        assert!(err.to_string().ends_with("denied"));
    }
}
