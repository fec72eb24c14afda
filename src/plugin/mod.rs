pub mod launcher;
pub mod loader;
pub mod manifest;
pub mod platform;
pub mod registry;
pub mod resolver;

pub use launcher::{DetachedSpawner, ProcessLauncher, ProcessSpawner};
pub use loader::{PluginRecord, PluginRoot, PluginSource};
pub use manifest::{LaunchConfig, LaunchTarget, PluginKind, PluginManifest, ProjectAction};
pub use platform::Platform;
pub use registry::{PluginRegistry, SerializedPlugin};
pub use resolver::{Context, LaunchPlan, LaunchResolver};
