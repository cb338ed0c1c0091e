// src/infra/paths.rs - Config and data locations
//
// MOONFORGE_HOME overrides everything: config lives directly under it and data
// under $MOONFORGE_HOME/data. Otherwise config is ~/.moonforge and data follows
// the platform data dir.

use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;

fn moonforge_home() -> Option<PathBuf> {
    std::env::var_os("MOONFORGE_HOME").map(PathBuf::from)
}

/// Configuration directory: $MOONFORGE_HOME/ or ~/.moonforge/
pub fn config_dir() -> PathBuf {
    if let Some(home) = moonforge_home() {
        return home;
    }
    dirs_home().join(".moonforge")
}

/// Data directory: $MOONFORGE_HOME/data/ or the platform local data dir.
pub fn data_dir() -> PathBuf {
    if let Some(home) = moonforge_home() {
        return home.join("data");
    }
    match ProjectDirs::from("", "", "moonforge") {
        Some(dirs) => dirs.data_local_dir().to_path_buf(),
        None => config_dir().join("data"),
    }
}

/// Home directory, falling back to the current directory on exotic platforms.
pub fn dirs_home() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Default location of the SQLite-backed prompt cache.
pub fn db_path() -> PathBuf {
    data_dir().join("moonforge.db")
}
