//! Background watcher that keeps a catalog in sync with its root directory.
//!
//! # Responsibility
//! - Run the initial scan, then translate debounced filesystem events into
//!   batches.
//! - Apply each batch as one catalog mutation.
//!
//! # Invariants
//! - States cycle `Idle -> Scanning -> Debouncing -> Applying -> Idle`.
//! - Bursts are coalesced by the debouncer; deliveries that queue up while
//!   a batch is being collected join that batch.
//! - `stop()` returns only after any in-flight apply phase has finished.
//! - A document that fails to read or parse never blocks the rest of a batch.

use crate::config::CatalogConfig;
use crate::logging::{sanitize_message, MAX_LOG_VALUE_CHARS};
use crate::model::artifact::SourceLocation;
use crate::service::catalog_service::{
    prepare_config, ArtifactCatalog, ChangeOutcome, DocumentChange, LoadError, LoadSummary,
};
use crate::watcher::events::{ChangeBatch, PendingChange};
use log::{debug, error, info, warn};
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, RecommendedCache};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;
use uuid::Uuid;

/// Lifecycle phase of a [`ChangeWatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    Scanning,
    Debouncing,
    Applying,
}

/// Watcher start failures.
#[derive(Debug)]
pub enum WatchError {
    /// Config invalid or initial scan impossible.
    Load(LoadError),
    Notify(notify::Error),
    AlreadyRunning,
    Spawn(std::io::Error),
}

impl Display for WatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Load(err) => write!(f, "{err}"),
            Self::Notify(err) => write!(f, "filesystem watch failed: {err}"),
            Self::AlreadyRunning => write!(f, "watcher is already running"),
            Self::Spawn(err) => write!(f, "failed to spawn watcher thread: {err}"),
        }
    }
}

impl Error for WatchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Load(err) => Some(err),
            Self::Notify(err) => Some(err),
            Self::AlreadyRunning => None,
            Self::Spawn(err) => Some(err),
        }
    }
}

impl From<LoadError> for WatchError {
    fn from(value: LoadError) -> Self {
        Self::Load(value)
    }
}

impl From<notify::Error> for WatchError {
    fn from(value: notify::Error) -> Self {
        Self::Notify(value)
    }
}

/// Result of applying one debounced batch.
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub batch_id: Uuid,
    /// Outcome per applied path, in path order.
    pub outcomes: Vec<(PathBuf, ChangeOutcome)>,
    /// Paths that existed but could not be read.
    pub unreadable: Vec<(PathBuf, String)>,
}

/// Re-reads every path in `batch` and applies the result as one mutation.
///
/// Rescans are expanded against the current snapshot first. Files are read
/// before the catalog lock is taken. A path that no longer exists is treated
/// as a removal.
pub fn apply_batch(
    catalog: &ArtifactCatalog,
    config: &CatalogConfig,
    batch: ChangeBatch,
) -> BatchSummary {
    let batch_id = Uuid::new_v4();
    let started_at = Instant::now();
    let resolved = batch.resolve(config, catalog.snapshot().store());
    let mut paths = Vec::with_capacity(resolved.len());
    let mut changes = Vec::with_capacity(resolved.len());
    let mut unreadable = Vec::new();

    for (path, pending) in resolved {
        let change = match pending {
            PendingChange::Remove => DocumentChange::Remove { path: path.clone() },
            // `resolve` never yields rescans.
            PendingChange::Rescan => continue,
            PendingChange::Upsert => match std::fs::read_to_string(&path) {
                Ok(raw) => DocumentChange::Upsert {
                    raw,
                    source: SourceLocation::from_path(path.clone()),
                },
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    DocumentChange::Remove { path: path.clone() }
                }
                Err(err) => {
                    warn!(
                        "event=watch_read module=watcher status=skip batch_id={} path={} error={}",
                        batch_id,
                        path.display(),
                        sanitize_message(&err.to_string(), MAX_LOG_VALUE_CHARS)
                    );
                    unreadable.push((path, err.to_string()));
                    continue;
                }
            },
        };
        paths.push(path);
        changes.push(change);
    }

    let outcomes: Vec<(PathBuf, ChangeOutcome)> = paths
        .into_iter()
        .zip(catalog.apply_documents(changes, true))
        .collect();

    info!(
        "event=watch_apply module=watcher status=ok batch_id={} paths={} unreadable={} version={} duration_ms={}",
        batch_id,
        outcomes.len(),
        unreadable.len(),
        catalog.snapshot().version(),
        started_at.elapsed().as_millis()
    );

    BatchSummary {
        batch_id,
        outcomes,
        unreadable,
    }
}

enum WatchMessage {
    Events(DebounceEventResult),
    Stop,
}

struct Worker {
    sender: Sender<WatchMessage>,
    handle: JoinHandle<()>,
    debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
}

/// Keeps an [`ArtifactCatalog`] in sync with a directory tree.
pub struct ChangeWatcher {
    catalog: Arc<ArtifactCatalog>,
    config: CatalogConfig,
    state: Arc<Mutex<WatcherState>>,
    worker: Option<Worker>,
}

impl ChangeWatcher {
    pub fn new(catalog: Arc<ArtifactCatalog>, config: CatalogConfig) -> Self {
        Self {
            catalog,
            config,
            state: Arc::new(Mutex::new(WatcherState::Idle)),
            worker: None,
        }
    }

    pub fn catalog(&self) -> &Arc<ArtifactCatalog> {
        &self.catalog
    }

    pub fn state(&self) -> WatcherState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Scans the root once, then starts watching it in the background.
    ///
    /// Events arriving during the scan are queued and applied afterwards.
    ///
    /// # Errors
    /// - `AlreadyRunning` when called twice without `stop()`.
    /// - `Load` when the config is invalid or the root is unusable.
    /// - `Notify` / `Spawn` when the background machinery cannot start.
    pub fn start(&mut self) -> Result<LoadSummary, WatchError> {
        if self.worker.is_some() {
            return Err(WatchError::AlreadyRunning);
        }
        let config = prepare_config(&self.config)?;

        set_state(&self.state, WatcherState::Scanning);
        match self.spawn_worker(&config) {
            Ok(summary) => {
                set_state(&self.state, WatcherState::Idle);
                Ok(summary)
            }
            Err(err) => {
                set_state(&self.state, WatcherState::Idle);
                error!(
                    "event=watch_start module=watcher status=error root={} error={}",
                    config.root.display(),
                    sanitize_message(&err.to_string(), MAX_LOG_VALUE_CHARS)
                );
                Err(err)
            }
        }
    }

    /// Stops watching; batches the debouncer already delivered are applied
    /// before this returns.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let Worker {
            sender,
            handle,
            debouncer,
        } = worker;
        // Joins the debouncer thread; events it still held are dropped.
        debouncer.stop();
        // The worker may already be gone; joining below covers both cases.
        let _ = sender.send(WatchMessage::Stop);
        if handle.join().is_err() {
            error!("event=watch_stop module=watcher status=error reason=worker_panicked");
        }
        set_state(&self.state, WatcherState::Idle);
        info!(
            "event=watch_stop module=watcher status=ok root={}",
            self.config.root.display()
        );
    }

    fn spawn_worker(&mut self, config: &CatalogConfig) -> Result<LoadSummary, WatchError> {
        let (sender, receiver) = mpsc::channel();
        let event_sender = sender.clone();
        let mut debouncer = new_debouncer(
            config.debounce,
            None,
            move |result: DebounceEventResult| {
                let _ = event_sender.send(WatchMessage::Events(result));
            },
        )?;
        debouncer.watch(&config.root, RecursiveMode::Recursive)?;

        let summary = self.catalog.load_directory(config)?;

        let catalog = Arc::clone(&self.catalog);
        let state = Arc::clone(&self.state);
        let worker_config = config.clone();
        let handle = std::thread::Builder::new()
            .name("context1000-watcher".to_string())
            .spawn(move || run_worker(receiver, &catalog, &worker_config, &state))
            .map_err(WatchError::Spawn)?;

        info!(
            "event=watch_start module=watcher status=ok root={} debounce_ms={} documents={}",
            config.root.display(),
            config.debounce.as_millis(),
            summary.documents
        );
        self.worker = Some(Worker {
            sender,
            handle,
            debouncer,
        });
        Ok(summary)
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(
    receiver: Receiver<WatchMessage>,
    catalog: &ArtifactCatalog,
    config: &CatalogConfig,
    state: &Mutex<WatcherState>,
) {
    let mut batch = ChangeBatch::new();
    loop {
        let message = if batch.is_empty() {
            receiver.recv().ok()
        } else {
            match receiver.try_recv() {
                Ok(message) => Some(message),
                Err(TryRecvError::Empty) => {
                    flush(catalog, config, &mut batch, state);
                    continue;
                }
                Err(TryRecvError::Disconnected) => None,
            }
        };

        match message {
            Some(WatchMessage::Events(Ok(events))) => {
                let recorded: usize = events
                    .iter()
                    .map(|debounced| batch.record_event(&debounced.event, config))
                    .sum();
                if recorded > 0 {
                    set_state(state, WatcherState::Debouncing);
                    debug!(
                        "event=watch_event module=watcher status=queued events={} pending={}",
                        events.len(),
                        batch.len()
                    );
                }
            }
            Some(WatchMessage::Events(Err(errors))) => {
                for err in errors {
                    warn!(
                        "event=watch_event module=watcher status=error error={}",
                        sanitize_message(&err.to_string(), MAX_LOG_VALUE_CHARS)
                    );
                }
            }
            Some(WatchMessage::Stop) | None => {
                if !batch.is_empty() {
                    flush(catalog, config, &mut batch, state);
                }
                break;
            }
        }
    }
}

fn flush(
    catalog: &ArtifactCatalog,
    config: &CatalogConfig,
    batch: &mut ChangeBatch,
    state: &Mutex<WatcherState>,
) {
    set_state(state, WatcherState::Applying);
    apply_batch(catalog, config, batch.take());
    set_state(state, WatcherState::Idle);
}

fn set_state(state: &Mutex<WatcherState>, next: WatcherState) {
    *state.lock().unwrap_or_else(PoisonError::into_inner) = next;
}
