use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
        atomic::{AtomicU8, Ordering},
    },
    time::Duration,
};

use serde::de::DeserializeOwned;
use tokio::sync::Notify;
use toml::Value;
use tracing::{Dispatch, debug, info, warn};

use super::{
    BoxError, ConfigChange, ConfigError, Tree, WatchState,
    broadcast::Notifier,
    path_ops::{navigate_path, normalize},
    tree::{changed_paths, lowercase_keys, merge_into},
};
use crate::provider::{Loader, OnStatus};

const DEFAULT_DELIMITER: &str = ".";
const DEFAULT_ON_CHANGE_TIMEOUT: Duration = Duration::from_secs(60);

/// Hook receiving every status report as `(provider name, ok, error)`.
pub type StatusHook = Arc<dyn Fn(&str, bool, Option<&BoxError>) + Send + Sync>;

/// A thread-safe configuration store merging trees from many providers.
///
/// Cloning is cheap and every clone shares the same tree, registrations and
/// callbacks. The zero value from [`Config::new`] is ready to use.
///
/// ```rust,no_run
/// use strata::{Config, File};
///
/// # async fn example() -> Result<(), strata::ConfigError> {
/// let config = Config::new();
/// config.load(File::new("config.toml"))?;
///
/// let port: u16 = config.unmarshal("server.port")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Config {
    pub(super) inner: Arc<Inner>,
}

pub(super) struct Inner {
    pub(super) state: RwLock<State>,
    pub(super) registrations: RwLock<Vec<Registration>>,
    pub(super) registered: Notify,
    pub(super) watch_state: AtomicU8,
    pub(super) notifier: Notifier,
    pub(super) options: Options,
}

/// The merged tree plus which provider last wrote each leaf.
#[derive(Default)]
pub(super) struct State {
    tree: Tree,
    origins: BTreeMap<String, String>,
}

pub(super) struct Options {
    pub(super) delimiter: String,
    pub(super) on_change_timeout: Duration,
    dispatch: Option<Dispatch>,
    on_status: Option<StatusHook>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER.to_string(),
            on_change_timeout: DEFAULT_ON_CHANGE_TIMEOUT,
            dispatch: None,
            on_status: None,
        }
    }
}

/// A provider as seen by the store, with its capabilities probed once.
pub(super) struct Registration {
    pub(super) loader: Arc<dyn Loader>,
    pub(super) name: String,
    pub(super) watches: bool,
    pub(super) reports_status: bool,
}

impl Registration {
    fn new(loader: Arc<dyn Loader>, name: String) -> Self {
        let watches = loader.as_watcher().is_some();
        let reports_status = loader.as_status_reporter().is_some();

        Self {
            loader,
            name,
            watches,
            reports_status,
        }
    }
}

/// Builder for a [`Config`] with non-default options.
///
/// ```rust
/// use std::time::Duration;
/// use strata::Config;
///
/// let config = Config::builder()
///     .with_delimiter("/")
///     .with_on_change_timeout(Duration::from_secs(5))
///     .with_on_status(|loader, ok, err| {
///         if !ok {
///             eprintln!("{loader} is unhealthy: {err:?}");
///         }
///     })
///     .build();
/// ```
#[derive(Default)]
pub struct ConfigBuilder {
    options: Options,
}

impl ConfigBuilder {
    /// Routes every log line the store emits to `dispatch` instead of the
    /// global subscriber.
    #[must_use]
    pub fn with_log_dispatch(mut self, dispatch: impl Into<Dispatch>) -> Self {
        self.options.dispatch = Some(dispatch.into());
        self
    }

    /// Registers a hook receiving every provider status report.
    #[must_use]
    pub fn with_on_status<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, bool, Option<&BoxError>) + Send + Sync + 'static,
    {
        self.options.on_status = Some(Arc::new(hook));
        self
    }

    /// Sets the path delimiter. Default is `"."`; an empty delimiter is ignored.
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        let delimiter = delimiter.into();
        if !delimiter.is_empty() {
            self.options.delimiter = delimiter;
        }
        self
    }

    /// Sets how long onChange callbacks may run for one change before a
    /// warning is logged. Default is one minute. The same warning is logged if
    /// the watch session is cancelled while callbacks for a change are still
    /// running.
    #[must_use]
    pub fn with_on_change_timeout(mut self, timeout: Duration) -> Self {
        self.options.on_change_timeout = timeout;
        self
    }

    /// Builds the store.
    pub fn build(self) -> Config {
        Config {
            inner: Arc::new(Inner {
                state: RwLock::new(State::default()),
                registrations: RwLock::new(Vec::new()),
                registered: Notify::new(),
                watch_state: AtomicU8::new(WatchState::Idle.as_u8()),
                notifier: Notifier::default(),
                options: self.options,
            }),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("tree", &self.read_state().tree)
            .field("watch_state", &self.watch_state())
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Creates an empty store with default options.
    pub fn new() -> Self {
        ConfigBuilder::default().build()
    }

    /// Starts building a store with custom options.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Loads a single provider, merges its tree and registers it.
    ///
    /// # Errors
    /// * `ConfigError::Load` - If the provider fails to load; the tree is left untouched
    pub fn load<L>(&self, loader: L) -> Result<(), ConfigError>
    where
        L: Loader + 'static,
    {
        self.load_all([Arc::new(loader) as Arc<dyn Loader>])
    }

    /// Loads providers in order, merging each tree over the previous ones.
    ///
    /// Stops at the first failing provider: providers before it stay applied,
    /// providers after it are not attempted. Loading nothing is a no-op.
    ///
    /// # Errors
    /// * `ConfigError::Load` - If a provider fails to load
    pub fn load_all<I>(&self, loaders: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = Arc<dyn Loader>>,
    {
        for loader in loaders {
            let name = loader.name();
            let tree = loader.load().map_err(|source| ConfigError::Load {
                loader: name.clone(),
                source,
            })?;

            self.apply(&name, tree);

            let registration = Registration::new(loader, name);
            self.log(|| {
                debug!(
                    loader = %registration.name,
                    watches = registration.watches,
                    reports_status = registration.reports_status,
                    "Configuration loaded"
                );
            });

            self.write_registrations().push(registration);
            self.inner.registered.notify_waiters();
        }

        Ok(())
    }

    /// Retrieves a clone of the value at the specified path.
    ///
    /// # Arguments
    /// * `path` - Delimiter-separated, case-insensitive path; empty for the whole tree
    pub fn get(&self, path: &str) -> Option<Value> {
        navigate_path(&self.read_state().tree, path, self.delimiter())
    }

    /// Checks whether the path resolves to a value.
    pub fn exists(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Decodes the value at the specified path into `T`.
    ///
    /// A path that does not resolve yields `T::default()`.
    ///
    /// # Arguments
    /// * `path` - Delimiter-separated, case-insensitive path; empty for the whole tree
    ///
    /// # Errors
    /// * `ConfigError::Decode` - If the value cannot be deserialized into `T`
    pub fn unmarshal<T>(&self, path: &str) -> Result<T, ConfigError>
    where
        T: DeserializeOwned + Default,
    {
        let Some(value) = self.get(path) else {
            return Ok(T::default());
        };

        T::deserialize(value).map_err(|source| ConfigError::Decode {
            path: path.to_string(),
            source,
        })
    }

    /// Names the provider(s) that supplied the value at the specified path.
    ///
    /// For a leaf this is the provider that wrote it last; for a table it is
    /// every provider contributing to it, comma separated.
    pub fn explain(&self, path: &str) -> Option<String> {
        let delimiter = self.delimiter();
        let path = normalize(path, delimiter);
        let nested = format!("{path}{delimiter}");

        let state = self.read_state();
        let mut loaders: Vec<&str> = state
            .origins
            .iter()
            .filter(|(leaf, _)| path.is_empty() || **leaf == path || leaf.starts_with(&nested))
            .map(|(_, loader)| loader.as_str())
            .collect();
        loaders.sort_unstable();
        loaders.dedup();

        (!loaders.is_empty()).then(|| loaders.join(", "))
    }

    /// Returns the lifecycle state of the watch session.
    pub fn watch_state(&self) -> WatchState {
        WatchState::from_u8(self.inner.watch_state.load(Ordering::Acquire))
    }

    /// Merges a change pushed by a watching provider and logs it.
    ///
    /// The log line is written before the new tree becomes readable.
    pub(super) fn apply_change(&self, loader: &str, delta: Tree) -> ConfigChange {
        let delta = lowercase_keys(delta);

        let paths = {
            let mut state = self.write_state();
            let paths = state.merge(loader, delta.clone(), self.delimiter());
            self.log(|| info!(loader = %loader, "Configuration has been changed."));
            paths
        };

        ConfigChange::new(loader, delta, paths)
    }

    fn apply(&self, loader: &str, tree: Tree) {
        let tree = lowercase_keys(tree);
        self.write_state().merge(loader, tree, self.delimiter());
    }

    /// Builds the callback handed to a status-reporting provider.
    ///
    /// Holds the store weakly since the provider is itself owned by the store.
    pub(super) fn status_handler(&self, loader: String) -> OnStatus {
        let inner = Arc::downgrade(&self.inner);

        Arc::new(move |ok, err| {
            if let Some(inner) = inner.upgrade() {
                Config { inner }.report_status(&loader, ok, err.as_ref());
            }
        })
    }

    fn report_status(&self, loader: &str, ok: bool, err: Option<&BoxError>) {
        if let Some(err) = err {
            self.log(|| warn!(loader = %loader, error = %err, "Error when loading configuration."));
        }

        if let Some(hook) = &self.inner.options.on_status {
            hook(loader, ok, err);
        }
    }

    /// Emits log lines through the injected dispatch, if any.
    pub(super) fn log(&self, emit: impl FnOnce()) {
        match &self.inner.options.dispatch {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, emit),
            None => emit(),
        }
    }

    pub(super) fn delimiter(&self) -> &str {
        &self.inner.options.delimiter
    }

    pub(super) fn read_registrations(&self) -> RwLockReadGuard<'_, Vec<Registration>> {
        self.inner
            .registrations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_registrations(&self) -> RwLockWriteGuard<'_, Vec<Registration>> {
        self.inner
            .registrations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn read_state(&self) -> RwLockReadGuard<'_, State> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, State> {
        self.inner.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl State {
    /// Folds a normalized tree in, updates leaf origins and returns the
    /// changed paths.
    ///
    /// Origins under a replaced table, or of a scalar replaced by a table, are
    /// dropped before the changed leaves are recorded.
    fn merge(&mut self, loader: &str, incoming: Tree, delimiter: &str) -> Vec<String> {
        let changed = changed_paths(&self.tree, &incoming, delimiter);

        for leaf in &changed {
            let nested = format!("{leaf}{delimiter}");
            self.origins.retain(|existing, _| {
                !existing.starts_with(&nested)
                    && !leaf.starts_with(&format!("{existing}{delimiter}"))
            });
            self.origins.insert(leaf.clone(), loader.to_string());
        }

        merge_into(&mut self.tree, incoming);
        changed
    }
}
