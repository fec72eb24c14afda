use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ManifestError;
use crate::plugin::platform::Platform;

/// Manifest file expected at the root of every plugin directory.
pub const MANIFEST_FILE: &str = "plugin.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PluginKind {
    Embedded,
    ExternalApp,
}

/// Declarative description of one plugin, as read from `plugin.json`.
///
/// Unknown keys are ignored so older hosts keep loading newer manifests.
/// Display-only fields of the wrong shape read as absent instead of
/// dropping the plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    /// Relative to the plugin directory.
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Advisory only; nothing here enforces them.
    #[serde(default, deserialize_with = "lenient_list", skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
    /// A kind this host does not know reads as `None`.
    #[serde(
        rename = "type",
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Option<PluginKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch: Option<LaunchConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_context: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gallery: Option<bool>,
    /// Keyed by platform identifier; see [`Platform::keys`].
    #[serde(default)]
    pub targets: BTreeMap<String, LaunchTarget>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub project_actions: Vec<ProjectAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchTarget {
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}

/// Per-project menu entry. Pure data for the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectAction {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_context: Option<Vec<String>>,
}

impl LaunchConfig {
    /// Exact lookup for `platform`; there is no fallback target.
    pub fn target_for(&self, platform: Platform) -> Option<&LaunchTarget> {
        platform
            .keys()
            .iter()
            .find_map(|key| self.targets.get(*key))
    }

    pub fn in_gallery(&self) -> bool {
        self.gallery.unwrap_or(!self.targets.is_empty())
    }
}

impl PluginManifest {
    pub fn read(plugin_dir: &Path) -> Result<Self, ManifestError> {
        let path = plugin_dir.join(MANIFEST_FILE);
        let raw = fs::read_to_string(&path).map_err(|source| ManifestError::Io { path, source })?;
        parse_manifest(&raw)
    }
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).ok())
}

fn lenient_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(lenient(deserializer)?.unwrap_or_default())
}

/// Parse and validate manifest JSON. `id` and `name` must be non-blank.
pub fn parse_manifest(raw: &str) -> Result<PluginManifest, ManifestError> {
    let mut manifest: PluginManifest = serde_json::from_str(raw)?;

    manifest.id = manifest.id.trim().to_string();
    if manifest.id.is_empty() {
        return Err(ManifestError::MissingField("id"));
    }

    if manifest.name.trim().is_empty() {
        return Err(ManifestError::MissingField("name"));
    }

    Ok(manifest)
}
