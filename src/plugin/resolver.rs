//! Turns a plugin's launch recipe into a concrete [`LaunchPlan`].
//!
//! Resolution is a straight line that stops at the first failure:
//! look the plugin up, pick the target for the host platform, check the
//! caller's context, then resolve paths and fill in arguments. Nothing
//! touches the filesystem until the context check has passed.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Serialize, Serializer};

use crate::error::LaunchError;
use crate::plugin::loader::PluginRecord;
use crate::plugin::platform::Platform;
use crate::plugin::registry::PluginRegistry;

/// Caller-supplied values for one launch, e.g. `projectPath`.
pub type Context = HashMap<String, String>;

static PERCENT_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%([^%\s]+)%").expect("valid percent variable regex"));
static DOLLAR_VAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").expect("valid dollar variable regex")
});
static CONTEXT_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z0-9_.-]+)\}").expect("valid context key regex"));

/// Source of the home directory and variables used by path templates.
pub trait Environment {
    fn home_dir(&self) -> Option<PathBuf>;
    fn var(&self, name: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl Environment for ProcessEnv {
    fn home_dir(&self) -> Option<PathBuf> {
        directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
    }

    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Fully resolved, ready-to-spawn command.
///
/// Paths serialize lossily: a non-UTF-8 byte becomes U+FFFD in the JSON
/// projection while the plan itself keeps the exact path for spawning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchPlan {
    pub plugin_id: String,
    #[serde(serialize_with = "lossy_path")]
    pub executable: PathBuf,
    pub args: Vec<String>,
    #[serde(serialize_with = "lossy_opt_path")]
    pub cwd: Option<PathBuf>,
    #[serde(serialize_with = "lossy_path")]
    pub plugin_dir: PathBuf,
}

impl LaunchPlan {
    /// `cwd` when the target set one, else the plugin's own directory.
    pub fn working_dir(&self) -> &Path {
        self.cwd.as_deref().unwrap_or(&self.plugin_dir)
    }
}

fn lossy_path<S: Serializer>(path: &Path, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&path.to_string_lossy())
}

fn lossy_opt_path<S: Serializer>(path: &Option<PathBuf>, serializer: S) -> Result<S::Ok, S::Error> {
    match path {
        Some(path) => serializer.serialize_some(&path.to_string_lossy()),
        None => serializer.serialize_none(),
    }
}

#[derive(Debug, Clone)]
pub struct LaunchResolver<E = ProcessEnv> {
    platform: Platform,
    env: E,
}

impl LaunchResolver {
    pub fn new(platform: Platform) -> Self {
        Self::with_env(platform, ProcessEnv)
    }
}

impl<E: Environment> LaunchResolver<E> {
    pub fn with_env(platform: Platform, env: E) -> Self {
        Self { platform, env }
    }

    /// Refresh the registry (honoring its cache interval) and resolve `plugin_id`.
    pub fn resolve(
        &self,
        registry: &PluginRegistry,
        plugin_id: &str,
        context: &Context,
    ) -> Result<LaunchPlan, LaunchError> {
        registry.refresh(false);
        let record = registry.get(plugin_id)?;
        self.resolve_record(&record, context)
    }

    pub fn resolve_record(
        &self,
        record: &PluginRecord,
        context: &Context,
    ) -> Result<LaunchPlan, LaunchError> {
        let manifest = &record.manifest;
        let unsupported = || LaunchError::UnsupportedPlatform {
            plugin: manifest.id.clone(),
            platform: self.platform,
        };

        let launch = manifest.launch.as_ref().ok_or_else(unsupported)?;
        let target = launch.target_for(self.platform).ok_or_else(unsupported)?;

        if let Some(key) = first_missing_key(&launch.required_context, context) {
            return Err(LaunchError::MissingContext {
                plugin: manifest.id.clone(),
                key: key.to_string(),
            });
        }

        let plan = LaunchPlan {
            plugin_id: manifest.id.clone(),
            executable: resolve_path_in(&target.path, &record.base_dir, &self.env),
            args: substitute_args(&target.args, context),
            cwd: target
                .cwd
                .as_deref()
                .map(|cwd| resolve_path_in(cwd, &record.base_dir, &self.env)),
            plugin_dir: record.base_dir.clone(),
        };

        tracing::debug!(
            plugin = %plan.plugin_id,
            executable = %plan.executable.display(),
            "resolved launch plan"
        );
        Ok(plan)
    }
}

/// First key in `keys` that `context` lacks or holds as an empty string.
pub fn first_missing_key<'a>(keys: &'a [String], context: &Context) -> Option<&'a str> {
    keys.iter()
        .find(|key| context.get(*key).is_none_or(|value| value.is_empty()))
        .map(String::as_str)
}

/// Resolve a path template against the process environment.
pub fn resolve_path(template: &str, base_dir: &Path) -> PathBuf {
    resolve_path_in(template, base_dir, &ProcessEnv)
}

/// Resolve a path template: trim, expand `%NAME%` and `$NAME` (unset
/// expands to ""), expand a leading `~`, then rebase anything still relative
/// onto `base_dir` and normalize it lexically.
///
/// Only the template text is expanded. `base_dir` is joined as a path, so a
/// plugin directory that is not valid UTF-8 survives untouched. A template
/// that starts with a placeholder never gets `~` treatment.
pub fn resolve_path_in(template: &str, base_dir: &Path, env: &impl Environment) -> PathBuf {
    let trimmed = template.trim();
    let expanded = expand_env(trimmed, env);

    let located = match (expanded.strip_prefix('~'), env.home_dir()) {
        (Some(rest), Some(home)) if !starts_with_placeholder(trimmed) => {
            home.join(rest.trim_start_matches(['/', '\\']))
        }
        _ => PathBuf::from(&expanded),
    };

    if is_rooted(&expanded, &located) {
        normalize(&located)
    } else {
        normalize(&base_dir.join(located))
    }
}

/// Replace each `{key}` with its context value, or nothing when absent.
pub fn substitute_args(templates: &[String], context: &Context) -> Vec<String> {
    templates
        .iter()
        .map(|template| {
            CONTEXT_KEY_RE
                .replace_all(template, |caps: &Captures| {
                    context.get(&caps[1]).cloned().unwrap_or_default()
                })
                .into_owned()
        })
        .collect()
}

fn starts_with_placeholder(text: &str) -> bool {
    [&*PERCENT_VAR_RE, &*DOLLAR_VAR_RE]
        .iter()
        .any(|re| re.find(text).is_some_and(|m| m.start() == 0))
}

/// A leading separator of either flavor counts as rooted on every host, so
/// `%APPDATA%\tool.exe` with `APPDATA` unset stays `\tool.exe`.
fn is_rooted(text: &str, path: &Path) -> bool {
    path.is_absolute() || path.has_root() || text.starts_with(['/', '\\'])
}

fn expand_env(text: &str, env: &impl Environment) -> String {
    let text = PERCENT_VAR_RE.replace_all(text, |caps: &Captures| {
        env.var(&caps[1]).unwrap_or_default()
    });
    DOLLAR_VAR_RE
        .replace_all(&text, |caps: &Captures| env.var(&caps[1]).unwrap_or_default())
        .into_owned()
}

/// Lexical cleanup: drop `.` and let `..` pop a segment. No filesystem access.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !out.has_root() {
                    out.push(component.as_os_str());
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
