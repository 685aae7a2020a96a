//! Walk options

use treewatch_core::error::Result;
use treewatch_core::WalkerConfig;

/// Immutable options for a tree walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkOptions {
    /// Maximum number of directory levels below the start path to visit
    pub max_depth: usize,
    /// Whether symbolic links are followed (and checked for loops)
    pub follow_links: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            max_depth: usize::MAX,
            follow_links: false,
        }
    }
}

impl WalkOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum depth; `0` visits only the start path
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set whether to follow symbolic links
    pub fn follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    /// Build options from configuration, rejecting a negative depth
    pub fn from_config(config: &WalkerConfig) -> Result<Self> {
        Ok(Self {
            max_depth: config.resolved_max_depth()?,
            follow_links: config.follow_links,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use treewatch_core::Error;

    #[test]
    fn test_builder() {
        let options = WalkOptions::new().max_depth(2).follow_links(true);
        assert_eq!(options.max_depth, 2);
        assert!(options.follow_links);
        assert_eq!(WalkOptions::default().max_depth, usize::MAX);
    }

    #[test]
    fn test_from_config_rejects_negative_depth() {
        let config = WalkerConfig {
            max_depth: Some(-3),
            follow_links: false,
        };
        assert!(matches!(
            WalkOptions::from_config(&config),
            Err(Error::Config(_))
        ));

        let config = WalkerConfig {
            max_depth: Some(5),
            follow_links: true,
        };
        let options = WalkOptions::from_config(&config).unwrap();
        assert_eq!(options.max_depth, 5);
        assert!(options.follow_links);
    }
}
