use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use futures::future::join_all;
use tokio::{
    runtime::Handle,
    sync::{
        mpsc::{self, UnboundedReceiver, UnboundedSender, error::SendError},
        oneshot,
    },
};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{Config, ConfigChange, path_ops::path_matches};

/// A registered onChange callback.
pub(super) type Callback = Arc<dyn Fn(&Config) + Send + Sync>;

/// One pending invocation of a callback.
struct Job {
    config: Config,
    done: oneshot::Sender<()>,
}

/// Internal subscription data held by the notifier
struct Subscriber {
    callback: Callback,
    paths: Vec<String>,
    queue: Option<UnboundedSender<Job>>,
}

impl Subscriber {
    fn matches(&self, changed: &[String], delimiter: &str) -> bool {
        self.paths.is_empty()
            || self.paths.iter().any(|pattern| {
                changed
                    .iter()
                    .any(|path| path_matches(path, pattern, delimiter))
            })
    }
}

/// Fans changes out to onChange callbacks.
///
/// Every callback gets its own FIFO queue drained by a single worker task, so
/// one callback sees changes in merge order while different callbacks run
/// concurrently. Workers are started lazily on the first matching change.
#[derive(Default)]
pub(super) struct Notifier {
    subscribers: Mutex<Vec<Subscriber>>,
}

/// The parts of a running watch session the notifier needs.
pub(super) struct Session<'a> {
    pub runtime: &'a Handle,
    pub cancel: &'a CancellationToken,
}

impl Notifier {
    pub(super) fn subscribe(&self, callback: Callback, paths: Vec<String>) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber {
                callback,
                paths,
                queue: None,
            });
    }

    /// Queues `config` for every callback whose paths overlap the change and
    /// starts a watchdog over the batch.
    pub(super) fn dispatch(&self, config: &Config, change: &ConfigChange, session: &Session<'_>) {
        let delimiter = config.delimiter();
        let changed = &change.paths;

        let mut pending = Vec::new();
        {
            let mut subscribers = self
                .subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);

            for subscriber in subscribers
                .iter_mut()
                .filter(|subscriber| subscriber.matches(changed, delimiter))
            {
                let callback = &subscriber.callback;
                let queue = subscriber
                    .queue
                    .get_or_insert_with(|| spawn_worker(session.runtime, Arc::clone(callback)));

                let (done, completed) = oneshot::channel();
                let job = Job {
                    config: config.clone(),
                    done,
                };

                // The worker is gone once the runtime it ran on shuts down.
                let sent = match queue.send(job) {
                    Ok(()) => true,
                    Err(SendError(job)) => {
                        *queue = spawn_worker(session.runtime, Arc::clone(callback));
                        queue.send(job).is_ok()
                    }
                };
                if sent {
                    pending.push(completed);
                }
            }
        }

        if pending.is_empty() {
            return;
        }

        let watchdog_config = config.clone();
        let timeout = config.inner.options.on_change_timeout;
        let cancel = session.cancel.clone();
        session.runtime.spawn(async move {
            watchdog(watchdog_config, pending, timeout, cancel).await;
        });
    }
}

/// Starts the worker draining one callback's queue.
fn spawn_worker(runtime: &Handle, callback: Callback) -> UnboundedSender<Job> {
    let (queue, jobs) = mpsc::unbounded_channel();
    runtime.spawn(worker_loop(callback, jobs));
    queue
}

async fn worker_loop(callback: Callback, mut jobs: UnboundedReceiver<Job>) {
    while let Some(Job { config, done }) = jobs.recv().await {
        let callback = Arc::clone(&callback);
        let view = config.clone();

        let result = tokio::task::spawn_blocking(move || callback(&view)).await;
        if let Err(err) = result {
            config.log(|| warn!(error = %err, "onChange callback failed."));
        }

        let _ = done.send(());
    }
}

/// Warns once if the batch has not completed by the deadline or by the end of
/// the watch session, whichever comes first. Never interrupts the callbacks.
async fn watchdog(
    config: Config,
    pending: Vec<oneshot::Receiver<()>>,
    timeout: Duration,
    cancel: CancellationToken,
) {
    let completed = join_all(pending);

    tokio::select! {
        biased;

        _ = completed => return,
        _ = tokio::time::sleep(timeout) => {}
        _ = cancel.cancelled() => {}
    }

    config.log(|| {
        warn!(
            "Configuration has not been fully applied to onChange callbacks in time. \
             Please check if an onChange callback is blocking or takes too long to complete."
        );
    });
}
