//! Time-cached map of plugin id to [`PluginRecord`].
//!
//! Each refresh builds a fresh snapshot from disk and swaps it in whole, so
//! readers see either the previous scan or the new one, never a half-built map.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use base64::Engine;
use serde::Serialize;

use crate::error::LaunchError;
use crate::plugin::loader::{self, PluginRecord, PluginRoot, PluginSource};
use crate::plugin::manifest::PluginManifest;

pub const DEFAULT_CACHE_INTERVAL: Duration = Duration::from_secs(5);

/// What the UI receives per plugin. `icon` carries a `data:` URL instead of
/// the manifest's relative path, and `launch.gallery` is always spelled out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SerializedPlugin {
    #[serde(flatten)]
    pub manifest: PluginManifest,
    pub source: PluginSource,
}

#[derive(Debug, Default)]
struct Snapshot {
    plugins: HashMap<String, Arc<PluginRecord>>,
    scanned_at: Option<Instant>,
}

#[derive(Debug)]
pub struct PluginRegistry {
    roots: Vec<PluginRoot>,
    cache_interval: Duration,
    snapshot: RwLock<Arc<Snapshot>>,
    scans: AtomicU64,
}

impl PluginRegistry {
    /// `roots` are scanned in order; a later root wins on id collisions.
    pub fn new(roots: Vec<PluginRoot>) -> Self {
        Self {
            roots,
            cache_interval: DEFAULT_CACHE_INTERVAL,
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            scans: AtomicU64::new(0),
        }
    }

    pub fn with_cache_interval(mut self, cache_interval: Duration) -> Self {
        self.cache_interval = cache_interval;
        self
    }

    /// Rescan the roots unless the last scan is younger than the cache
    /// interval and `force` is false.
    pub fn refresh(&self, force: bool) {
        let fresh = self
            .current()
            .scanned_at
            .is_some_and(|at| at.elapsed() < self.cache_interval);
        if fresh && !force {
            return;
        }

        let mut plugins: HashMap<String, Arc<PluginRecord>> = HashMap::new();
        for record in loader::discover(&self.roots) {
            let record = Arc::new(record);
            if let Some(previous) = plugins.insert(record.id().to_string(), Arc::clone(&record)) {
                tracing::info!(
                    plugin = %record.id(),
                    shadowed = %previous.base_dir.display(),
                    by = %record.base_dir.display(),
                    "plugin id declared twice, later root wins"
                );
            }
        }

        let count = plugins.len();
        let snapshot = Arc::new(Snapshot {
            plugins,
            scanned_at: Some(Instant::now()),
        });
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = snapshot;

        let scans = self.scans.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(count, scans, "plugin scan complete");
    }

    /// Every plugin in the current snapshot, sorted by id.
    pub fn list(&self) -> Vec<SerializedPlugin> {
        let snapshot = self.current();
        let mut records: Vec<&Arc<PluginRecord>> = snapshot.plugins.values().collect();
        records.sort_by(|a, b| a.id().cmp(b.id()));

        records
            .into_iter()
            .map(|record| {
                let mut manifest = record.manifest.clone();
                manifest.icon = record.icon_path.as_deref().and_then(icon_data_url);
                if let Some(launch) = manifest.launch.as_mut() {
                    launch.gallery = Some(launch.in_gallery());
                }
                SerializedPlugin {
                    manifest,
                    source: record.source,
                }
            })
            .collect()
    }

    pub fn get(&self, id: &str) -> Result<Arc<PluginRecord>, LaunchError> {
        self.current()
            .plugins
            .get(id)
            .cloned()
            .ok_or_else(|| LaunchError::PluginNotFound(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.current().plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of filesystem scans performed so far.
    pub fn scan_count(&self) -> u64 {
        self.scans.load(Ordering::Relaxed)
    }

    fn current(&self) -> Arc<Snapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Encode an icon as a `data:` URL. Unreadable files yield `None`.
fn icon_data_url(path: &Path) -> Option<String> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::debug!(icon = %path.display(), "icon unreadable: {err}");
            return None;
        }
    };

    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Some(format!("data:{};base64,{encoded}", icon_mime(path)))
}

fn icon_mime(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}
