//! Merged configuration store with live updates.
//!
//! Folds trees from many providers into one case-insensitive tree, keeps it
//! current while providers watch their sources, and notifies callbacks
//! subscribed to the changed paths.

mod broadcast;
mod changes;
mod path_ops;
mod store;
mod tree;
mod watch;

#[cfg(test)]
mod tests;

pub use changes::{BoxError, ConfigChange, ConfigError};
pub use store::{Config, ConfigBuilder, StatusHook};
pub use tree::{Tree, merge};
pub use watch::WatchState;
