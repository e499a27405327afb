use std::{
    panic::AssertUnwindSafe,
    sync::{Arc, atomic::Ordering},
};

use futures::FutureExt;
use tokio::{runtime::Handle, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{
    BoxError, Config, ConfigError, Tree,
    broadcast::Session,
    path_ops::normalize,
};
use crate::provider::OnDelta;

/// Lifecycle of a store's watch session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// `watch` has never been called.
    Idle,
    /// A watch session is running.
    Running,
    /// The last session was cancelled and all of its tasks have returned.
    /// Calling `watch` again starts a new session.
    Stopped,
}

impl WatchState {
    pub(super) const fn as_u8(self) -> u8 {
        match self {
            WatchState::Idle => 0,
            WatchState::Running => 1,
            WatchState::Stopped => 2,
        }
    }

    pub(super) const fn from_u8(value: u8) -> Self {
        match value {
            1 => WatchState::Running,
            2 => WatchState::Stopped,
            _ => WatchState::Idle,
        }
    }
}

type WatchOutcome = (String, Result<(), BoxError>);

impl Config {
    /// Watches every watch-capable provider until `cancel` fires.
    ///
    /// Each provider runs on its own task and pushes changes that are merged
    /// into the tree and dispatched to onChange callbacks. Providers loaded
    /// while the session runs are picked up as they register. Only one session
    /// runs at a time: calling `watch` while running logs a warning and
    /// returns immediately. A stopped session can be started again.
    ///
    /// Returns once `cancel` has fired and every provider task has returned.
    ///
    /// # Errors
    /// * `ConfigError::Watch` - The first fatal error returned by a provider's watch.
    ///   Other providers keep running until cancellation.
    ///
    /// # Panics
    /// Panics if `cancel` is `None`. A missing cancellation token is caller misuse.
    #[allow(clippy::panic)]
    pub async fn watch(&self, cancel: Option<&CancellationToken>) -> Result<(), ConfigError> {
        let Some(cancel) = cancel else {
            panic!("cannot create context from nil parent");
        };

        if !self.start_session() {
            self.log(|| warn!("Config has been watched, call Watch more than once has no effects."));
            return Ok(());
        }

        let runtime = Handle::current();
        let mut tasks = JoinSet::new();
        let mut scanned = 0;
        let mut first_error = None;

        loop {
            let registered = self.inner.registered.notified();
            tokio::pin!(registered);
            registered.as_mut().enable();

            scanned = self.spawn_watch_tasks(scanned, &runtime, cancel, &mut tasks);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = &mut registered => {}
                Some(joined) = tasks.join_next() => self.record(joined, &mut first_error),
            }
        }

        while let Some(joined) = tasks.join_next().await {
            self.record(joined, &mut first_error);
        }

        self.inner
            .watch_state
            .store(WatchState::Stopped.as_u8(), Ordering::Release);
        self.log(|| debug!("Watch session stopped"));

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Registers a callback run after every merged change touching `paths`.
    ///
    /// With no paths, or only empty ones, the callback sees every change.
    /// Paths are matched by segment prefix in both directions,
    /// case-insensitively. `None` is accepted and registers nothing.
    /// Callbacks run on the blocking pool and may be registered before or
    /// after `watch` starts.
    ///
    /// ```rust
    /// use strata::Config;
    ///
    /// let config = Config::new();
    /// config.on_change(
    ///     Some(|config: &Config| {
    ///         let port: u16 = config.unmarshal("server.port").unwrap_or_default();
    ///         println!("server.port is now {port}");
    ///     }),
    ///     &["server"],
    /// );
    /// ```
    pub fn on_change<F>(&self, callback: Option<F>, paths: &[&str])
    where
        F: Fn(&Config) + Send + Sync + 'static,
    {
        let Some(callback) = callback else {
            return;
        };

        // An empty path names the whole tree, same as no paths at all.
        let paths = paths
            .iter()
            .map(|path| normalize(path, self.delimiter()))
            .filter(|path| !path.is_empty())
            .collect();

        self.inner.notifier.subscribe(Arc::new(callback), paths);
    }

    /// Test-and-set from `Idle` or `Stopped` to `Running`.
    fn start_session(&self) -> bool {
        let running = WatchState::Running.as_u8();

        [WatchState::Idle, WatchState::Stopped].iter().any(|from| {
            self.inner
                .watch_state
                .compare_exchange(from.as_u8(), running, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        })
    }

    /// Starts a task for every watch-capable registration from index `from`
    /// and returns the number of registrations scanned so far.
    fn spawn_watch_tasks(
        &self,
        from: usize,
        runtime: &Handle,
        cancel: &CancellationToken,
        tasks: &mut JoinSet<WatchOutcome>,
    ) -> usize {
        let (scanned, pending) = {
            let registrations = self.read_registrations();
            let pending: Vec<_> = registrations
                .iter()
                .skip(from)
                .filter(|registration| registration.watches)
                .map(|registration| {
                    (
                        Arc::clone(&registration.loader),
                        registration.name.clone(),
                        registration.reports_status,
                    )
                })
                .collect();

            (registrations.len(), pending)
        };

        for (loader, name, reports_status) in pending {
            if reports_status {
                if let Some(reporter) = loader.as_status_reporter() {
                    reporter.status(self.status_handler(name.clone()));
                }
            }

            let on_delta = self.delta_handler(name.clone(), runtime.clone(), cancel.clone());
            let cancel = cancel.clone();

            self.log(|| debug!(loader = %name, "Starting configuration watch"));
            tasks.spawn_on(
                async move {
                    let Some(watcher) = loader.as_watcher() else {
                        return (name, Ok(()));
                    };

                    let result = AssertUnwindSafe(watcher.watch(cancel, on_delta))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| Err(BoxError::from("watch task panicked")));

                    (name, result)
                },
                runtime,
            );
        }

        scanned
    }

    /// Builds the callback a provider invokes with each delta: merge, log,
    /// then notify.
    fn delta_handler(&self, loader: String, runtime: Handle, cancel: CancellationToken) -> OnDelta {
        let config = self.clone();

        Arc::new(move |delta: Tree| {
            let change = config.apply_change(&loader, delta);
            let session = Session {
                runtime: &runtime,
                cancel: &cancel,
            };
            config.inner.notifier.dispatch(&config, &change, &session);
        })
    }

    fn record(
        &self,
        joined: Result<WatchOutcome, tokio::task::JoinError>,
        first_error: &mut Option<ConfigError>,
    ) {
        let (loader, result) = match joined {
            Ok(outcome) => outcome,
            Err(err) => (String::from("unknown"), Err(Box::new(err) as BoxError)),
        };

        match result {
            Ok(()) => self.log(|| debug!(loader = %loader, "Configuration watch finished")),
            Err(source) => {
                self.log(|| debug!(loader = %loader, error = %source, "Configuration watch failed"));
                if first_error.is_none() {
                    *first_error = Some(ConfigError::Watch { loader, source });
                }
            }
        }
    }
}
