use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use serde::Serialize;

use crate::plugin::manifest::PluginManifest;

/// Where a plugin came from. User plugins shadow built-ins with the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginSource {
    Builtin,
    User,
}

/// A directory whose immediate children are plugin directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginRoot {
    pub dir: PathBuf,
    pub source: PluginSource,
}

impl PluginRoot {
    pub fn new(dir: impl Into<PathBuf>, source: PluginSource) -> Self {
        Self {
            dir: dir.into(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PluginRecord {
    pub manifest: PluginManifest,
    pub source: PluginSource,
    pub base_dir: PathBuf,
    /// Set only when the manifest declares an icon and the file exists.
    pub icon_path: Option<PathBuf>,
}

impl PluginRecord {
    pub fn id(&self) -> &str {
        &self.manifest.id
    }
}

/// Read every plugin under `roots`, in root order.
///
/// Missing roots are skipped. A plugin whose manifest cannot be read or
/// fails validation is logged and left out; it never stops the scan.
pub fn discover(roots: &[PluginRoot]) -> Vec<PluginRecord> {
    let mut records = Vec::new();

    for root in roots {
        if !root.dir.is_dir() {
            tracing::debug!(root = %root.dir.display(), "plugin root does not exist");
            continue;
        }

        for plugin_dir in child_dirs(&root.dir) {
            match PluginManifest::read(&plugin_dir) {
                Ok(manifest) => {
                    let icon_path = manifest
                        .icon
                        .as_deref()
                        .map(|icon| plugin_dir.join(icon))
                        .filter(|path| path.is_file());

                    records.push(PluginRecord {
                        manifest,
                        source: root.source,
                        base_dir: plugin_dir,
                        icon_path,
                    });
                }
                Err(err) => {
                    tracing::warn!(plugin_dir = %plugin_dir.display(), "skipping plugin: {err}");
                }
            }
        }
    }

    records
}

fn child_dirs(root: &Path) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = WalkBuilder::new(root)
        .max_depth(Some(1))
        .standard_filters(false)
        .follow_links(true)
        .build()
        .flatten()
        .filter(|entry| entry.depth() == 1)
        .filter(|entry| entry.file_type().is_some_and(|kind| kind.is_dir()))
        .map(|entry| entry.into_path())
        .collect();

    dirs.sort();
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::manifest::MANIFEST_FILE;
    use std::fs;

    fn write_plugin(root: &Path, dir: &str, manifest: &str) -> PathBuf {
        let plugin_dir = root.join(dir);
        fs::create_dir_all(&plugin_dir).unwrap();
        fs::write(plugin_dir.join(MANIFEST_FILE), manifest).unwrap();
        plugin_dir
    }

    #[test]
    fn invalid_manifests_are_skipped_without_failing_the_batch() {
        let tmp = tempfile::tempdir().unwrap();
        write_plugin(tmp.path(), "a-good", r#"{"id": "good", "name": "Good"}"#);
        write_plugin(tmp.path(), "b-no-id", r#"{"name": "No Id"}"#);
        write_plugin(tmp.path(), "c-no-name", r#"{"id": "no-name"}"#);
        write_plugin(tmp.path(), "d-broken", "{ this is not json");
        fs::create_dir_all(tmp.path().join("e-empty")).unwrap();
        fs::write(tmp.path().join("stray-file.json"), "{}").unwrap();

        let records = discover(&[PluginRoot::new(tmp.path(), PluginSource::User)]);
        let ids: Vec<&str> = records.iter().map(PluginRecord::id).collect();
        assert_eq!(ids, vec!["good"]);
        assert_eq!(records[0].source, PluginSource::User);
        assert_eq!(records[0].base_dir, tmp.path().join("a-good"));
    }

    #[test]
    fn roots_are_scanned_in_order_and_missing_roots_ignored() {
        let builtin = tempfile::tempdir().unwrap();
        let user = tempfile::tempdir().unwrap();
        write_plugin(builtin.path(), "git", r#"{"id": "git-tool", "name": "Git", "version": "1"}"#);
        write_plugin(user.path(), "git", r#"{"id": "git-tool", "name": "Git", "version": "2"}"#);

        let records = discover(&[
            PluginRoot::new(builtin.path(), PluginSource::Builtin),
            PluginRoot::new(builtin.path().join("missing"), PluginSource::Builtin),
            PluginRoot::new(user.path(), PluginSource::User),
        ]);

        let sources: Vec<PluginSource> = records.iter().map(|r| r.source).collect();
        assert_eq!(sources, vec![PluginSource::Builtin, PluginSource::User]);
        assert_eq!(records[1].manifest.version.as_deref(), Some("2"));
    }

    #[test]
    fn icon_path_only_set_when_file_exists() {
        let tmp = tempfile::tempdir().unwrap();
        let with_icon = write_plugin(
            tmp.path(),
            "with-icon",
            r#"{"id": "a", "name": "A", "icon": "assets/icon.png"}"#,
        );
        fs::create_dir_all(with_icon.join("assets")).unwrap();
        fs::write(with_icon.join("assets/icon.png"), [0x89, b'P', b'N', b'G']).unwrap();
        write_plugin(tmp.path(), "missing-icon", r#"{"id": "b", "name": "B", "icon": "nope.png"}"#);

        let records = discover(&[PluginRoot::new(tmp.path(), PluginSource::Builtin)]);
        assert_eq!(records.len(), 2);
        let icon_of = |id: &str| {
            records
                .iter()
                .find(|record| record.id() == id)
                .and_then(|record| record.icon_path.clone())
        };
        assert_eq!(icon_of("a"), Some(with_icon.join("assets/icon.png")));
        assert_eq!(icon_of("b"), None);
    }
}
