//! Configuration module for treewatch
//!
//! This module provides configuration structures and loading mechanisms for
//! tree walks and directory watching. Configuration can be loaded from TOML
//! files and/or environment variables.

mod defaults;
mod loading;


use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use defaults::{DEFAULT_POLL_INTERVAL_MS, MAX_PENDING_EVENTS};

use defaults::*;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Tree walk configuration
    #[serde(default)]
    pub walker: WalkerConfig,

    /// Directory watch configuration
    #[serde(default)]
    pub watcher: WatcherConfig,
}

/// Configuration for directory tree walks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalkerConfig {
    /// Maximum number of directory levels to descend; absent means unbounded
    #[serde(default)]
    pub max_depth: Option<i64>,

    /// Whether to follow symbolic links (enables loop detection)
    #[serde(default)]
    pub follow_links: bool,
}

/// Configuration for polling directory watches
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WatcherConfig {
    /// Interval between directory scans in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Event kinds subscribed by default: "create", "modify", "delete"
    #[serde(default = "default_event_kinds")]
    pub events: Vec<String>,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            follow_links: false,
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            events: default_event_kinds(),
        }
    }
}

impl WalkerConfig {
    /// Maximum depth as an unsigned level count
    ///
    /// Negative values are rejected; an absent value means unbounded.
    pub fn resolved_max_depth(&self) -> Result<usize> {
        match self.max_depth {
            None => Ok(usize::MAX),
            Some(depth) if depth < 0 => Err(Error::config(format!(
                "walker.max_depth must not be negative (got {depth})"
            ))),
            Some(depth) => Ok(usize::try_from(depth).unwrap_or(usize::MAX)),
        }
    }
}

impl Config {
    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        self.walker.resolved_max_depth()?;

        if self.watcher.poll_interval_ms == 0 {
            return Err(Error::config(
                "watcher.poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.watcher.events.is_empty() {
            return Err(Error::config(
                "watcher.events must name at least one event kind".to_string(),
            ));
        }

        Ok(())
    }

    /// Saves the configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| Error::config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, toml_string)
            .map_err(|e| Error::config(format!("Failed to write config file: {e}")))?;

        Ok(())
    }
}
