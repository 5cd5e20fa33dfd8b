//! # Data Paths
//!
//! Centralized definitions for where the bot keeps its files.
//! Acts as the Single Source of Truth for the layout of the data directory.

use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "data/config.yaml";
pub const STATE_FILE: &str = "state.json";
pub const LOG_FILE: &str = "session.log";

/// Returns the path of the runtime state file inside `data_dir`.
pub fn state_file(data_dir: &str) -> PathBuf {
    Path::new(data_dir).join(STATE_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_file() {
        assert_eq!(state_file("data"), PathBuf::from("data/state.json"));
    }
}
