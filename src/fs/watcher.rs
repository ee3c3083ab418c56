//! Recursive directory watcher.
//!
//! Every directory below the root is registered individually so the watched
//! set can follow the tree as it grows and shrinks. A directory created
//! while running is registered before its creation event is forwarded, so a
//! consumer that reacts to that event cannot miss events from inside it.

use ignore::WalkBuilder;
use log::{debug, warn};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to create watcher: {0}")]
    Create(#[from] notify::Error),

    #[error("Failed to watch path {path}: {source}")]
    Root {
        path: PathBuf,
        source: notify::Error,
    },

    #[error("{0}")]
    Resolve(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
    Renamed,
}

impl ChangeKind {
    /// `None` for notifications that do not change anything on disk.
    pub fn from_event(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Access(_) => None,
            EventKind::Create(_) => Some(ChangeKind::Created),
            EventKind::Modify(ModifyKind::Name(_)) => Some(ChangeKind::Renamed),
            EventKind::Modify(_) => Some(ChangeKind::Modified),
            EventKind::Remove(_) => Some(ChangeKind::Removed),
            EventKind::Any | EventKind::Other => Some(ChangeKind::Modified),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

/// Receiving side of a [`TreeWatcher`].
///
/// Iterating yields events until the watcher is closed. Transmission errors
/// from the OS backend arrive on `errors` and do not interrupt `events`.
pub struct ChangeStream {
    pub events: mpsc::Receiver<ChangeEvent>,
    pub errors: mpsc::Receiver<notify::Error>,
}

impl Iterator for ChangeStream {
    type Item = ChangeEvent;

    fn next(&mut self) -> Option<ChangeEvent> {
        self.events.recv().ok()
    }
}

enum Signal {
    Fs(notify::Result<Event>),
    Stop,
}

type SharedDirs = Arc<Mutex<HashSet<PathBuf>>>;

fn lock(dirs: &SharedDirs) -> MutexGuard<'_, HashSet<PathBuf>> {
    dirs.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct TreeWatcher {
    root: PathBuf,
    dirs: SharedDirs,
    signal_tx: mpsc::Sender<Signal>,
    worker: Option<JoinHandle<()>>,
}

impl TreeWatcher {
    /// Watches `root` and everything below it except `root/<exclude>`.
    ///
    /// Failing to create the backend or to watch the root itself is an
    /// error; unreadable subtrees are logged and skipped.
    pub fn open(root: &Path, exclude: &str) -> Result<(Self, ChangeStream), WatchError> {
        let root = super::canonicalize_path(root).map_err(WatchError::Resolve)?;
        let (signal_tx, signal_rx) = mpsc::channel::<Signal>();

        let watcher = RecommendedWatcher::new(
            {
                let tx = signal_tx.clone();
                move |result: notify::Result<Event>| {
                    let _ = tx.send(Signal::Fs(result));
                }
            },
            notify::Config::default(),
        )?;

        let dirs: SharedDirs = Arc::new(Mutex::new(HashSet::new()));
        let exclude = if exclude.is_empty() {
            None
        } else {
            Some(root.join(exclude))
        };
        let mut tree = WatchTree {
            watcher,
            root: root.clone(),
            dirs: dirs.clone(),
            exclude,
        };

        tree.add_dir(&root).map_err(|source| WatchError::Root {
            path: root.clone(),
            source,
        })?;
        let registered = tree.register_tree(&root);
        debug!("watching {} directories under {}", registered + 1, root.display());

        let (event_tx, event_rx) = mpsc::channel::<ChangeEvent>();
        let (error_tx, error_rx) = mpsc::channel::<notify::Error>();
        let worker = std::thread::spawn(move || tree.run(signal_rx, event_tx, error_tx));

        Ok((
            TreeWatcher {
                root,
                dirs,
                signal_tx,
                worker: Some(worker),
            },
            ChangeStream {
                events: event_rx,
                errors: error_rx,
            },
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    #[cfg(test)]
    fn is_watching(&self, dir: &Path) -> bool {
        lock(&self.dirs).contains(dir)
    }

    #[cfg(test)]
    fn watched_dirs(&self) -> Vec<PathBuf> {
        lock(&self.dirs).iter().cloned().collect()
    }

    /// Stops the worker and releases the OS watches. The paired
    /// [`ChangeStream`] ends once buffered events are drained.
    pub fn close(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = self.signal_tx.send(Signal::Stop);
        if worker.join().is_err() {
            warn!("watcher thread panicked");
        }
    }
}

impl Drop for TreeWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

/// State owned by the worker thread; only it mutates the watched set.
struct WatchTree {
    watcher: RecommendedWatcher,
    root: PathBuf,
    dirs: SharedDirs,
    exclude: Option<PathBuf>,
}

impl WatchTree {
    fn is_excluded(&self, path: &Path) -> bool {
        self.exclude
            .as_deref()
            .is_some_and(|exclude| path.starts_with(exclude))
    }

    fn add_dir(&mut self, dir: &Path) -> notify::Result<bool> {
        let mut dirs = lock(&self.dirs);
        if dirs.contains(dir) {
            return Ok(false);
        }
        self.watcher.watch(dir, RecursiveMode::NonRecursive)?;
        dirs.insert(dir.to_path_buf());
        Ok(true)
    }

    /// Registers every non-excluded directory at or below `dir`.
    fn register_tree(&mut self, dir: &Path) -> usize {
        let exclude = self.exclude.clone();
        let walker = WalkBuilder::new(dir)
            .standard_filters(false)
            .filter_entry(move |entry| {
                !exclude
                    .as_deref()
                    .is_some_and(|exclude| entry.path().starts_with(exclude))
            })
            .build();

        let mut registered = 0;
        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("skipping unreadable subtree: {}", err);
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_dir()) || self.is_excluded(entry.path()) {
                continue;
            }
            match self.add_dir(entry.path()) {
                Ok(true) => registered += 1,
                Ok(false) => {}
                Err(err) => warn!("cannot watch {}: {}", entry.path().display(), err),
            }
        }
        registered
    }

    fn forget_tree(&mut self, dir: &Path) {
        let removed = {
            let mut dirs = lock(&self.dirs);
            let removed: Vec<PathBuf> = dirs.iter().filter(|p| p.starts_with(dir)).cloned().collect();
            dirs.retain(|p| !p.starts_with(dir));
            removed
        };
        for path in removed {
            // The backend usually drops watches on deleted directories itself.
            if let Err(err) = self.watcher.unwatch(&path) {
                debug!("unwatch {}: {}", path.display(), err);
            }
        }
    }

    fn register_if_dir(&mut self, path: &Path) {
        if path.is_dir() {
            let registered = self.register_tree(path);
            debug!("registered {} new directories at {}", registered, path.display());
        }
    }

    fn track(&mut self, kind: &EventKind, path: &Path, index: usize) {
        match kind {
            EventKind::Create(_) => self.register_if_dir(path),
            EventKind::Remove(_) => self.forget_tree(path),
            EventKind::Modify(ModifyKind::Name(mode)) => match mode {
                RenameMode::From => self.forget_tree(path),
                RenameMode::To => self.register_if_dir(path),
                RenameMode::Both if index == 0 => self.forget_tree(path),
                RenameMode::Both => self.register_if_dir(path),
                _ => {
                    if path.is_dir() {
                        self.register_if_dir(path);
                    } else {
                        self.forget_tree(path);
                    }
                }
            },
            _ => {}
        }
    }

    /// Brings the watched set back in line with the disk after the backend
    /// lost events: vanished directories are dropped, unseen ones added.
    fn rescan(&mut self) {
        let vanished: Vec<PathBuf> = lock(&self.dirs)
            .iter()
            .filter(|dir| !dir.is_dir())
            .cloned()
            .collect();
        for dir in &vanished {
            self.forget_tree(dir);
        }
        let root = self.root.clone();
        let registered = self.register_tree(&root);
        warn!(
            "event queue overflowed; rescanned {} ({} dropped, {} added)",
            root.display(),
            vanished.len(),
            registered
        );
    }

    fn handle(&mut self, event: Event, events: &mpsc::Sender<ChangeEvent>) {
        if event.need_rescan() {
            self.rescan();
            let _ = events.send(ChangeEvent {
                path: self.root.clone(),
                kind: ChangeKind::Modified,
            });
            return;
        }
        let Some(kind) = ChangeKind::from_event(&event.kind) else {
            return;
        };
        for (index, path) in event.paths.into_iter().enumerate() {
            if self.is_excluded(&path) {
                continue;
            }
            // Register first: the consumer may react to this event by
            // touching files inside the new directory.
            self.track(&event.kind, &path, index);
            let _ = events.send(ChangeEvent { path, kind });
        }
    }

    fn run(
        mut self,
        signals: mpsc::Receiver<Signal>,
        events: mpsc::Sender<ChangeEvent>,
        errors: mpsc::Sender<notify::Error>,
    ) {
        while let Ok(signal) = signals.recv() {
            match signal {
                Signal::Fs(Ok(event)) => self.handle(event, &events),
                Signal::Fs(Err(err)) => {
                    let _ = errors.send(err);
                }
                Signal::Stop => break,
            }
        }
        debug!("watcher stopped with {} directories", lock(&self.dirs).len());
    }
}
