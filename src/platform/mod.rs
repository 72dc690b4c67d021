// Smart Bookmarks platform paths
// Config holds settings.json; data holds the session database.
//
// Linux follows the XDG base directories. macOS and Windows keep both under
// the per-user application support folder.

use std::env;
use std::path::PathBuf;

const APP_DIR: &str = "smart-bookmarks";

#[cfg(target_os = "linux")]
fn base_dir(xdg_var: &str, fallback: &[&str]) -> PathBuf {
    match env::var(xdg_var) {
        Ok(xdg) if !xdg.is_empty() => PathBuf::from(xdg),
        _ => {
            let home = env::var("HOME").unwrap_or_else(|_| String::from("/tmp"));
            fallback.iter().fold(PathBuf::from(home), |p, part| p.join(part))
        }
    }
}

/// Returns the configuration directory.
///
/// - **Linux**: `$XDG_CONFIG_HOME/smart-bookmarks` or `~/.config/smart-bookmarks`
/// - **macOS**: `~/Library/Application Support/smart-bookmarks`
/// - **Windows**: `%APPDATA%/smart-bookmarks`
pub fn get_config_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        base_dir("XDG_CONFIG_HOME", &[".config"]).join(APP_DIR)
    }
    #[cfg(not(target_os = "linux"))]
    {
        app_support_dir().join(APP_DIR)
    }
}

/// Returns the data directory. `SMART_BOOKMARKS_DATA_DIR` overrides it.
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = env::var("SMART_BOOKMARKS_DATA_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    #[cfg(target_os = "linux")]
    {
        base_dir("XDG_DATA_HOME", &[".local", "share"]).join(APP_DIR)
    }
    #[cfg(not(target_os = "linux"))]
    {
        app_support_dir().join(APP_DIR)
    }
}

#[cfg(target_os = "macos")]
fn app_support_dir() -> PathBuf {
    let home = env::var("HOME").unwrap_or_else(|_| String::from("/tmp"));
    PathBuf::from(home).join("Library").join("Application Support")
}

#[cfg(all(not(target_os = "linux"), not(target_os = "macos")))]
fn app_support_dir() -> PathBuf {
    match env::var("APPDATA") {
        Ok(appdata) => PathBuf::from(appdata),
        Err(_) => {
            let profile = env::var("USERPROFILE").unwrap_or_else(|_| String::from("C:\\Users\\Default"));
            PathBuf::from(profile).join("AppData").join("Roaming")
        }
    }
}
