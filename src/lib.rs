//! Strata - layered configuration with live reload.
//!
//! Strata merges configuration trees from any number of providers into one
//! case-insensitive tree. The main features include:
//!
//! - Deterministic deep merge, later providers winning at conflicting leaves
//! - A single watch session fanning in changes from every watch-capable provider
//! - Path-scoped onChange callbacks with a watchdog for slow handlers
//! - Typed reads through serde
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use strata::{Config, File};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), strata::ConfigError> {
//! let config = Config::new();
//! config.load(File::new("config.toml"))?;
//!
//! config.on_change(
//!     Some(|config: &Config| {
//!         let level: String = config.unmarshal("log.level").unwrap_or_default();
//!         println!("log level changed to {level}");
//!     }),
//!     &["log"],
//! );
//!
//! let cancel = CancellationToken::new();
//! config.watch(Some(&cancel)).await?;
//! # Ok(())
//! # }
//! ```

/// Merged configuration store, watch coordination and change notification.
pub mod config_store;

/// Provider capabilities and the file provider.
pub mod provider;

/// Log subscriber setup for binaries.
pub mod tracing_config;

pub use config_store::{
    BoxError, Config, ConfigBuilder, ConfigChange, ConfigError, StatusHook, Tree, WatchState,
    merge,
};
pub use provider::{
    File, FileError, Loader, OnDelta, OnStatus, StatusReporter, Unmarshal, Watcher, decode_json,
    decode_toml,
};
