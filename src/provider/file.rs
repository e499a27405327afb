use std::{
    fs, io,
    path::{self, Path, PathBuf},
    str,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{
    Loader, OnDelta, OnStatus, StatusReporter, Watcher,
    file_watcher::{FileEvent, FileWatcher},
};
use crate::config_store::{BoxError, Tree};

/// Decodes raw file bytes into a configuration tree.
pub type Unmarshal = fn(&[u8]) -> Result<Tree, BoxError>;

const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Decodes TOML bytes. This is the default for [`File`].
///
/// # Errors
/// Returns error if the bytes are not UTF-8 or not valid TOML.
pub fn decode_toml(bytes: &[u8]) -> Result<Tree, BoxError> {
    let text = str::from_utf8(bytes)?;
    Ok(toml::from_str(text)?)
}

/// Decodes JSON bytes. The top-level value must be an object.
///
/// # Errors
/// Returns error if the bytes are not a JSON object or contain `null`, which
/// has no tree representation.
pub fn decode_json(bytes: &[u8]) -> Result<Tree, BoxError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Errors produced by the [`File`] provider.
#[derive(Debug, thiserror::Error)]
pub enum FileError {
    /// The file could not be read
    #[error("read file '{path}': {source}")]
    Read {
        /// Path of the file
        path: PathBuf,
        /// I/O error details
        source: io::Error,
    },

    /// The file content could not be decoded
    #[error("unmarshal '{path}': {source}")]
    Unmarshal {
        /// Path of the file
        path: PathBuf,
        /// Decoder error details
        source: BoxError,
    },

    /// The file system watcher could not be started
    #[error("watch '{path}': {source}")]
    Watch {
        /// Path being watched
        path: PathBuf,
        /// Watcher error details
        source: notify::Error,
    },
}

/// Loads configuration from a file on the local file system.
///
/// The whole file is read on every load and decoded with the configured
/// [`Unmarshal`] function (TOML unless overridden). While a watch session is
/// running the file is reloaded whenever it changes on disk.
///
/// ```rust,no_run
/// use strata::{Config, File, decode_json};
///
/// let config = Config::new();
/// config.load(File::new("config.json").with_unmarshal(decode_json))?;
/// # Ok::<(), strata::ConfigError>(())
/// ```
pub struct File {
    path: PathBuf,
    unmarshal: Unmarshal,
    debounce: Duration,
    on_status: Mutex<Option<OnStatus>>,
}

impl File {
    /// Creates a provider for the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            unmarshal: decode_toml,
            debounce: DEFAULT_DEBOUNCE,
            on_status: Mutex::new(None),
        }
    }

    /// Replaces the decoder used to turn file bytes into a tree.
    #[must_use]
    pub fn with_unmarshal(mut self, unmarshal: Unmarshal) -> Self {
        self.unmarshal = unmarshal;
        self
    }

    /// Sets how long to wait for a burst of file events to settle before
    /// reloading. Default is 100ms.
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Path this provider reads from, as given.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Tree, FileError> {
        let bytes = fs::read(&self.path).map_err(|source| FileError::Read {
            path: self.path.clone(),
            source,
        })?;

        (self.unmarshal)(&bytes).map_err(|source| FileError::Unmarshal {
            path: self.path.clone(),
            source,
        })
    }

    pub(super) fn report(&self, ok: bool, err: Option<BoxError>) {
        let on_status = self
            .on_status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        if let Some(on_status) = on_status {
            on_status(ok, err);
        }
    }

    fn reload(&self, on_delta: &OnDelta) {
        match self.read() {
            Ok(tree) => {
                on_delta(tree);
                self.report(true, None);
            }
            Err(err) => self.report(false, Some(Box::new(err))),
        }
    }

    /// Absolute location of the file with its directory canonicalized, which
    /// is the form notify reports event paths in.
    fn watch_target(&self) -> Result<(PathBuf, PathBuf), FileError> {
        let absolute = path::absolute(&self.path).map_err(|source| FileError::Read {
            path: self.path.clone(),
            source,
        })?;

        let dir = absolute
            .parent()
            .unwrap_or_else(|| Path::new("/"))
            .canonicalize()
            .map_err(|source| FileError::Read {
                path: self.path.clone(),
                source,
            })?;

        let target = match absolute.file_name() {
            Some(name) => dir.join(name),
            None => dir.clone(),
        };

        Ok((dir, target))
    }
}

impl Loader for File {
    fn load(&self) -> Result<Tree, BoxError> {
        Ok(self.read()?)
    }

    fn name(&self) -> String {
        match path::absolute(&self.path) {
            Ok(absolute) => format!("file://{}", absolute.display()),
            Err(_) => self.path.display().to_string(),
        }
    }

    fn as_watcher(&self) -> Option<&dyn Watcher> {
        Some(self)
    }

    fn as_status_reporter(&self) -> Option<&dyn StatusReporter> {
        Some(self)
    }
}

#[async_trait]
impl Watcher for File {
    async fn watch(&self, cancel: CancellationToken, on_delta: OnDelta) -> Result<(), BoxError> {
        let (dir, target) = self.watch_target()?;

        let (mut watcher, mut event_rx) = FileWatcher::new().map_err(|source| FileError::Watch {
            path: self.path.clone(),
            source,
        })?;
        watcher
            .watch_dir(&dir)
            .map_err(|source| FileError::Watch {
                path: self.path.clone(),
                source,
            })?;

        debug!(path = %target.display(), "Watching configuration file");

        let debounce_sleep = tokio::time::sleep(self.debounce);
        tokio::pin!(debounce_sleep);
        let mut pending_reload = false;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),

                Some(FileEvent { path, kind }) = event_rx.recv() => {
                    if path == target {
                        debug!(path = %path.display(), ?kind, "Configuration file event");
                        pending_reload = true;
                        debounce_sleep
                            .as_mut()
                            .reset(tokio::time::Instant::now() + self.debounce);
                    }
                }

                _ = &mut debounce_sleep, if pending_reload => {
                    pending_reload = false;
                    self.reload(&on_delta);
                }
            }
        }
    }
}

impl StatusReporter for File {
    fn status(&self, on_status: OnStatus) {
        *self.on_status.lock().unwrap_or_else(PoisonError::into_inner) = Some(on_status);
    }
}
