//! Polling file watcher backing the [`ChangeNotifier`] contract.

use super::notifier::{ChangeNotifier, ChangeSet, ChangeSink, WatchId, WatchOptions, WatchRequest};
use crate::error::{MonitorError, Result};
use notify::{Event, EventKind, PollWatcher, RecursiveMode, Watcher as NotifyWatcher};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

/// Quiet time after which the events of one scan are delivered together.
const SCAN_GATHER: Duration = Duration::from_millis(25);

struct ActiveWatch {
    watcher: PollWatcher,
    request: WatchRequest,
    sink: Arc<dyn ChangeSink>,
}

/// Change notifier that polls watched paths with `notify`'s [`PollWatcher`].
///
/// Each watch owns its own poll thread. Watches in timed mode scan every
/// `interval`; watches with `external_trigger` set scan only when
/// [`ChangeNotifier::trigger`] is called.
///
/// The events of one scan reach the sink as a single [`ChangeSet`]. A helper
/// thread per watch gathers them until no event arrived for a short while.
///
/// # Examples
///
/// ```rust,no_run
/// use app_monitor::notify::{ChangeNotifier, ChangeSet, PollingNotifier, WatchOptions, WatchRequest};
/// use std::sync::Arc;
///
/// # fn example() -> app_monitor::error::Result<()> {
/// let notifier = PollingNotifier::new();
/// let request = WatchRequest {
///     path: "/srv/dropins".into(),
///     recursive: false,
///     options: WatchOptions::default(),
/// };
/// let id = notifier.watch(request, Arc::new(|changes: &ChangeSet| {
///     println!("added: {:?}", changes.added);
/// }))?;
/// notifier.unwatch(id);
/// # Ok(())
/// # }
/// ```
pub struct PollingNotifier {
    watches: Mutex<HashMap<WatchId, ActiveWatch>>,
    next_id: AtomicU64,
}

impl PollingNotifier {
    /// Create a notifier with no watches.
    pub fn new() -> Self {
        Self {
            watches: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of live watches.
    pub fn watch_count(&self) -> usize {
        self.watches.lock().len()
    }

    fn start_watcher(request: &WatchRequest, sink: Arc<dyn ChangeSink>) -> Result<PollWatcher> {
        let (config, gather) = if request.options.external_trigger {
            (notify::Config::default().with_manual_polling(), SCAN_GATHER)
        } else {
            (
                notify::Config::default().with_poll_interval(request.options.interval),
                SCAN_GATHER.min(request.options.interval / 2),
            )
        };

        let (event_tx, event_rx) = mpsc::channel::<Event>();
        let path = request.path.clone();
        let mut watcher = PollWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let _ = event_tx.send(event);
                }
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "poll watcher error"),
            },
            config,
        )?;
        spawn_gatherer(event_rx, sink, gather)?;

        let mode = if request.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher.watch(&request.path, mode)?;
        Ok(watcher)
    }
}

/// Deliver events in batches separated by `gather` of silence.
///
/// The thread ends once the watcher, and with it the sending side, is dropped.
fn spawn_gatherer(events: mpsc::Receiver<Event>, sink: Arc<dyn ChangeSink>, gather: Duration) -> io::Result<()> {
    thread::Builder::new()
        .name("app-monitor-scan".to_string())
        .spawn(move || {
            while let Ok(first) = events.recv() {
                let mut changes = ChangeSet::new();
                record_event(&mut changes, first);
                loop {
                    match events.recv_timeout(gather) {
                        Ok(event) => record_event(&mut changes, event),
                        Err(RecvTimeoutError::Timeout) => break,
                        Err(RecvTimeoutError::Disconnected) => return,
                    }
                }
                if !changes.is_empty() {
                    sink.on_change(&changes);
                }
            }
        })?;
    Ok(())
}

fn record_event(changes: &mut ChangeSet, event: Event) {
    let target = match event.kind {
        EventKind::Create(_) => &mut changes.added,
        EventKind::Remove(_) => &mut changes.removed,
        EventKind::Modify(_) => &mut changes.modified,
        _ => return,
    };
    target.extend(event.paths);
}

impl ChangeNotifier for PollingNotifier {
    fn watch(&self, request: WatchRequest, sink: Arc<dyn ChangeSink>) -> Result<WatchId> {
        if !request.path.exists() {
            return Err(MonitorError::watch(&request.path, "path does not exist"));
        }

        let watcher = Self::start_watcher(&request, Arc::clone(&sink))
            .map_err(|e| MonitorError::watch(&request.path, e.to_string()))?;
        let id = WatchId(self.next_id.fetch_add(1, Ordering::Relaxed));

        tracing::debug!(
            watch = id.0,
            path = %request.path.display(),
            recursive = request.recursive,
            "watch registered"
        );
        self.watches.lock().insert(
            id,
            ActiveWatch {
                watcher,
                request,
                sink,
            },
        );
        Ok(id)
    }

    fn reconfigure(&self, id: WatchId, options: WatchOptions) -> Result<()> {
        let mut watches = self.watches.lock();
        let active = watches.get_mut(&id).ok_or(MonitorError::UnknownWatch(id.0))?;
        if active.request.options == options {
            return Ok(());
        }

        let mut request = active.request.clone();
        request.options = options;
        // The old poll thread stops once its watcher is dropped by the assignment.
        active.watcher = Self::start_watcher(&request, Arc::clone(&active.sink))?;
        active.request = request;
        Ok(())
    }

    fn unwatch(&self, id: WatchId) {
        if let Some(active) = self.watches.lock().remove(&id) {
            tracing::debug!(watch = id.0, path = %active.request.path.display(), "watch removed");
        }
    }

    fn trigger(&self) {
        let watches = self.watches.lock();
        for (id, active) in watches.iter() {
            if !active.request.options.external_trigger {
                continue;
            }
            if let Err(e) = active.watcher.poll() {
                tracing::warn!(watch = id.0, error = %e, "failed to trigger scan");
            }
        }
    }
}

impl Default for PollingNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PollingNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingNotifier")
            .field("watches", &self.watch_count())
            .finish()
    }
}
