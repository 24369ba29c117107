use dirs::config_dir;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "meetup-harvest";

pub fn config_root() -> PathBuf {
    config_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
        .join(APP_DIR)
}

pub fn config_path() -> PathBuf {
    config_root().join("config.json")
}

/// Relative targets are taken from the current working directory.
pub fn resolve_target(target: &Path) -> PathBuf {
    if target.is_absolute() {
        return target.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(target),
        Err(_) => target.to_path_buf(),
    }
}
