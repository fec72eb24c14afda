use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::plugin::loader::{PluginRoot, PluginSource};
use crate::plugin::resolver::resolve_path;

const DEFAULTS: &str = include_str!("../config/default.toml");
const APP_NAME: &str = "devhub";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub plugins: PluginsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PluginsConfig {
    /// Empty means auto-detect.
    pub builtin_dir: String,
    /// Empty means `<user data dir>/plugins`.
    pub user_dir: String,
    pub cache_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub filter: String,
}

impl AppConfig {
    /// Load configuration with layering: defaults → user config.
    pub fn load() -> Result<Self> {
        let user = match config_dir().map(|dir| dir.join("config.toml")) {
            Some(path) if path.exists() => Some(
                fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?,
            ),
            _ => None,
        };

        Self::from_layers(DEFAULTS, user.as_deref())
    }

    /// Deep-merge `user` over `defaults`; keys absent from `user` keep their default.
    pub fn from_layers(defaults: &str, user: Option<&str>) -> Result<Self> {
        let mut merged: toml::Value = toml::from_str(defaults).context("parsing default config")?;
        if let Some(user) = user {
            let overlay: toml::Value = toml::from_str(user).context("parsing user config")?;
            merge(&mut merged, overlay);
        }

        Ok(merged.try_into()?)
    }

    pub fn cache_interval(&self) -> Duration {
        Duration::from_secs(self.plugins.cache_interval_secs)
    }

    /// Scan roots, built-in first so user plugins win on id collisions.
    pub fn plugin_roots(&self) -> Vec<PluginRoot> {
        let builtin = configured_dir(&self.plugins.builtin_dir).unwrap_or_else(default_builtin_dir);
        let user = configured_dir(&self.plugins.user_dir).unwrap_or_else(default_user_dir);

        vec![
            PluginRoot::new(builtin, PluginSource::Builtin),
            PluginRoot::new(user, PluginSource::User),
        ]
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            plugins: PluginsConfig {
                builtin_dir: String::new(),
                user_dir: String::new(),
                cache_interval_secs: 5,
            },
            logging: LoggingConfig {
                filter: format!("{APP_NAME}=info"),
            },
        }
    }
}

/// Directory for log files and other per-user state.
pub fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(std::env::temp_dir)
}

fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

fn merge(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Configured directories accept `~`, environment placeholders, and paths
/// relative to the config directory.
fn configured_dir(raw: &str) -> Option<PathBuf> {
    if raw.trim().is_empty() {
        return None;
    }

    let base = config_dir().unwrap_or_else(|| PathBuf::from("."));
    Some(resolve_path(raw, &base))
}

fn default_builtin_dir() -> PathBuf {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));

    if let Some(exe_dir) = exe_dir {
        let packaged = [
            exe_dir.join("plugins"),
            exe_dir.join("../Resources/plugins"),
        ];
        if let Some(dir) = packaged.into_iter().find(|dir| dir.is_dir()) {
            return dir;
        }
    }

    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("plugins")
}

fn default_user_dir() -> PathBuf {
    if let Some(project_dirs) = directories::ProjectDirs::from("", "", APP_NAME) {
        return project_dirs.data_dir().join("plugins");
    }

    if let Some(base_dirs) = directories::BaseDirs::new() {
        return base_dirs.home_dir().join(".devhub/plugins");
    }

    PathBuf::from(".devhub-plugins")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let config = AppConfig::from_layers(DEFAULTS, None).unwrap();
        assert_eq!(config.cache_interval(), Duration::from_secs(5));
        assert_eq!(config.logging.filter, "devhub=info");
        assert!(config.plugins.builtin_dir.is_empty());
    }

    #[test]
    fn user_layer_overrides_only_given_keys() {
        let user = r#"
[plugins]
user_dir = "/srv/devhub/plugins"
"#;
        let config = AppConfig::from_layers(DEFAULTS, Some(user)).unwrap();
        assert_eq!(config.plugins.user_dir, "/srv/devhub/plugins");
        assert_eq!(config.plugins.cache_interval_secs, 5);
        assert_eq!(config.logging.filter, "devhub=info");
    }

    #[test]
    fn invalid_user_layer_is_an_error() {
        let result = AppConfig::from_layers(DEFAULTS, Some("[plugins]\ncache_interval_secs = \"soon\""));
        assert!(result.is_err());
    }

    #[test]
    fn roots_are_builtin_then_user() {
        let mut config = AppConfig::default();
        config.plugins.builtin_dir = "/opt/devhub/plugins".to_string();
        config.plugins.user_dir = "/home/dev/.devhub/plugins".to_string();

        let roots = config.plugin_roots();
        assert_eq!(
            roots,
            vec![
                PluginRoot::new("/opt/devhub/plugins", PluginSource::Builtin),
                PluginRoot::new("/home/dev/.devhub/plugins", PluginSource::User),
            ]
        );
    }

    #[test]
    fn unset_dirs_fall_back_to_defaults() {
        let roots = AppConfig::default().plugin_roots();
        assert_eq!(roots.len(), 2);
        assert_eq!(roots[0].source, PluginSource::Builtin);
        assert!(roots[1].dir.ends_with("plugins"));
    }
}
