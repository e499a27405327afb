//! Capabilities a configuration source implements to feed a [`Config`](crate::Config).
//!
//! Every provider implements [`Loader`]. Sources that can detect changes also
//! implement [`Watcher`], and sources that want to report transient health
//! implement [`StatusReporter`]. A loader exposes its optional capabilities
//! through [`Loader::as_watcher`] and [`Loader::as_status_reporter`]; the store
//! asks once, when the provider is registered.

mod file;
mod file_watcher;

#[cfg(test)]
mod tests;

use std::{any, sync::Arc};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config_store::{BoxError, Tree};

pub use file::{File, FileError, Unmarshal, decode_json, decode_toml};

/// Callback a watcher invokes with each changed sub-tree.
pub type OnDelta = Arc<dyn Fn(Tree) + Send + Sync>;

/// Callback a status reporter invokes with `(ok, error)`.
pub type OnStatus = Arc<dyn Fn(bool, Option<BoxError>) + Send + Sync>;

/// A source that can load a configuration tree.
pub trait Loader: Send + Sync {
    /// Loads the full tree from the source.
    ///
    /// May be called more than once.
    ///
    /// # Errors
    /// Returns the source's error; the store wraps it as
    /// [`ConfigError::Load`](crate::ConfigError::Load).
    fn load(&self) -> Result<Tree, BoxError>;

    /// Human-readable identity used in logs and errors.
    fn name(&self) -> String {
        any::type_name::<Self>().to_string()
    }

    /// The watch capability, if the source supports it.
    fn as_watcher(&self) -> Option<&dyn Watcher> {
        None
    }

    /// The status capability, if the source supports it.
    fn as_status_reporter(&self) -> Option<&dyn StatusReporter> {
        None
    }
}

/// A source that can push changes while a watch session is running.
#[async_trait]
pub trait Watcher: Send + Sync {
    /// Watches the source until `cancel` fires.
    ///
    /// Each detected change is passed to `on_delta` as the new sub-tree for
    /// this source. Returning `Ok(())` after cancellation is a clean stop.
    ///
    /// # Errors
    /// A returned error is fatal for this source's watch only.
    async fn watch(&self, cancel: CancellationToken, on_delta: OnDelta) -> Result<(), BoxError>;
}

/// A source that reports transient load or watch health.
pub trait StatusReporter: Send + Sync {
    /// Hands the source a callback it may invoke any number of times, from
    /// any thread.
    fn status(&self, on_status: OnStatus);
}
