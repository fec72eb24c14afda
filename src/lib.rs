//! Plugin discovery and launch engine for the devhub developer-tools hub.
//!
//! Plugins live one per directory under a built-in root and a per-user root.
//! Each declares a `plugin.json` manifest; externally launched plugins add a
//! per-platform launch recipe that is resolved against caller context and
//! started as a detached process.

pub mod bridge;
pub mod config;
pub mod error;
pub mod plugin;

pub use bridge::PluginHost;
pub use error::{LaunchError, ManifestError};
