//! Centralized path definitions.
//!
//! Single source of truth for the config directory layout. Functions take
//! `&Path` so the CLI and the server resolve files the same way.

use std::path::{Path, PathBuf};

// ── Application identity ─────────────────────────────────────────

pub const APP_ID: &str = "com.polynodes.osc";

// ── Leaf filenames ───────────────────────────────────────────────

pub const SETTINGS_FILE: &str = "settings.json";

// ── Config-dir functions ─────────────────────────────────────────

pub fn settings_path(app_config_dir: &Path) -> PathBuf {
    app_config_dir.join(SETTINGS_FILE)
}

/// `<platform config dir>/com.polynodes.osc`.
///
/// `$XDG_CONFIG_HOME` (or `~/.config`) on Linux, `~/Library/Application Support`
/// on macOS, `%APPDATA%` on Windows.
pub fn default_config_dir() -> PathBuf {
    let base = if cfg!(target_os = "windows") {
        std::env::var("APPDATA")
            .map_or_else(|_| PathBuf::from("C:\\Users\\Default\\AppData\\Roaming"), PathBuf::from)
    } else if cfg!(target_os = "macos") {
        home_dir().join("Library/Application Support")
    } else {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .filter(|v| !v.is_empty())
            .map_or_else(|| home_dir().join(".config"), PathBuf::from)
    };
    base.join(APP_ID)
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_or_else(|_| PathBuf::from("."), PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_file_lives_in_config_dir() {
        let dir = Path::new("/tmp/polynodes");
        assert_eq!(settings_path(dir), PathBuf::from("/tmp/polynodes/settings.json"));
    }

    #[test]
    fn default_dir_ends_with_app_id() {
        assert!(default_config_dir().ends_with(APP_ID));
    }
}
