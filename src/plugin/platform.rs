use std::fmt;

use serde::Serialize;

/// Host operating systems a manifest can declare a launch target for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Macos,
    Linux,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::Macos
        } else {
            Platform::Linux
        }
    }

    /// Canonical manifest key.
    pub fn key(self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Macos => "macos",
            Platform::Linux => "linux",
        }
    }

    /// Every manifest key that selects this platform, canonical first.
    pub fn keys(self) -> &'static [&'static str] {
        match self {
            Platform::Windows => &["windows", "win32"],
            Platform::Macos => &["macos", "darwin"],
            Platform::Linux => &["linux"],
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_key_is_listed_first() {
        for platform in [Platform::Windows, Platform::Macos, Platform::Linux] {
            assert_eq!(platform.keys()[0], platform.key());
        }
    }

    #[test]
    fn current_matches_build_target() {
        let current = Platform::current();
        if cfg!(target_os = "linux") {
            assert_eq!(current, Platform::Linux);
        }
        assert_eq!(current.to_string(), current.key());
    }
}
