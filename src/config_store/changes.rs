use std::{error::Error as StdError, time::Instant};

use super::Tree;

/// Error type crossing the provider boundary.
///
/// Providers are free to fail with anything that implements [`std::error::Error`];
/// the store only wraps it with operation and provider context.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// A change pushed by a watching provider.
///
/// Lives for a single merge: the store folds `delta` into its tree, then hands
/// the change to the notifier and drops it.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigChange {
    /// Name of the provider that produced the change.
    pub loader: String,
    /// The changed sub-tree, keys already normalized.
    pub delta: Tree,
    /// Delimiter-joined paths the merge actually changed.
    pub paths: Vec<String>,
    /// Timestamp when the change was merged.
    pub timestamp: Instant,
}

impl ConfigChange {
    /// Creates a new configuration change.
    ///
    /// # Arguments
    ///
    /// * `loader` - Name of the provider the delta came from
    /// * `delta` - The changed sub-tree
    /// * `paths` - Paths the merge changed
    pub fn new(loader: impl Into<String>, delta: Tree, paths: Vec<String>) -> Self {
        Self {
            loader: loader.into(),
            delta,
            paths,
            timestamp: Instant::now(),
        }
    }
}

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A provider failed to load; the enclosing load call was aborted.
    #[error("load configuration: {source}")]
    Load {
        /// Name of the provider that failed
        loader: String,
        /// Error reported by the provider
        source: BoxError,
    },

    /// A provider's watch task ended with a fatal error.
    #[error("watch configuration change on error: {source}")]
    Watch {
        /// Name of the provider whose watch failed
        loader: String,
        /// Error reported by the provider
        source: BoxError,
    },

    /// The value at a path could not be decoded into the requested type.
    #[error("failed to decode configuration at '{path}': {source}")]
    Decode {
        /// Path that was resolved before decoding
        path: String,
        /// Decoder error
        source: toml::de::Error,
    },
}

impl ConfigError {
    /// Name of the provider involved, if the error is provider-scoped.
    pub fn loader(&self) -> Option<&str> {
        match self {
            ConfigError::Load { loader, .. } | ConfigError::Watch { loader, .. } => Some(loader),
            ConfigError::Decode { .. } => None,
        }
    }
}
