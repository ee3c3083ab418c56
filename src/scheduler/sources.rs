//! Background workers, one per event source, each feeding a bounded
//! channel that the scheduler loop drains.

use crate::fs::display_relative;
use crate::fs::watcher::ChangeStream;
use crate::git::types::Divergence;
use crate::git::{GitError, RepoSource};
use crate::ui::Input;
use crossterm::event::EventStream;
use futures_util::StreamExt;
use log::{debug, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

const INPUT_BUFFER: usize = 32;

pub struct Triggers {
    pub changes: mpsc::Sender<()>,
    pub upstream: mpsc::Sender<Divergence>,
    pub input: mpsc::Sender<Input>,
}

pub struct Sources {
    pub changes: mpsc::Receiver<()>,
    pub upstream: mpsc::Receiver<Divergence>,
    pub input: mpsc::Receiver<Input>,
}

/// The change channel holds a single pending trigger: any number of
/// filesystem events that arrive before the loop picks it up collapse into
/// one refresh.
pub fn channels() -> (Triggers, Sources) {
    let (changes_tx, changes_rx) = mpsc::channel(1);
    let (upstream_tx, upstream_rx) = mpsc::channel(1);
    let (input_tx, input_rx) = mpsc::channel(INPUT_BUFFER);
    (
        Triggers {
            changes: changes_tx,
            upstream: upstream_tx,
            input: input_tx,
        },
        Sources {
            changes: changes_rx,
            upstream: upstream_rx,
            input: input_rx,
        },
    )
}

/// Turns watcher events into refresh triggers. Returns when the watcher is
/// closed or the scheduler is gone.
pub fn forward_changes(
    stream: ChangeStream,
    root: PathBuf,
    tx: mpsc::Sender<()>,
) -> std::thread::JoinHandle<()> {
    let ChangeStream { events, errors } = stream;

    std::thread::spawn(move || {
        for err in errors {
            warn!("watch error: {}", err);
        }
    });

    std::thread::spawn(move || {
        for event in events {
            debug!("{:?} {}", event.kind, display_relative(&event.path, &root));
            match tx.try_send(()) {
                Ok(()) | Err(TrySendError::Full(())) => {}
                Err(TrySendError::Closed(())) => break,
            }
        }
    })
}

/// Fetches and measures divergence from upstream, then waits `period`
/// after the loop has taken the result before doing it again.
///
/// The channel must have capacity 1: the worker waits for its slot to free
/// up, which only happens once the loop has received the value.
pub fn spawn_upstream_worker<R: RepoSource>(
    repo: Arc<R>,
    period: Duration,
    tx: mpsc::Sender<Divergence>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let source = repo.clone();
            let result = tokio::task::spawn_blocking(move || source.ahead_behind()).await;
            let divergence = match result {
                Ok(Ok((ahead, behind))) => Some(Divergence::Tracking { ahead, behind }),
                Ok(Err(GitError::NoUpstream)) => Some(Divergence::NoUpstream),
                Ok(Err(err)) => {
                    warn!("ahead/behind failed: {}", err);
                    None
                }
                Err(err) => {
                    warn!("ahead/behind task failed: {}", err);
                    None
                }
            };

            if let Some(divergence) = divergence {
                if tx.send(divergence).await.is_err() {
                    break;
                }
                match tx.reserve().await {
                    Ok(permit) => drop(permit),
                    Err(_) => break,
                }
            }
            tokio::time::sleep(period).await;
        }
    })
}

pub fn spawn_input_worker(tx: mpsc::Sender<Input>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut events = EventStream::new();
        while let Some(result) = events.next().await {
            let event = match result {
                Ok(event) => event,
                Err(err) => {
                    warn!("terminal input failed: {}", err);
                    break;
                }
            };
            if let Some(input) = Input::from_event(&event) {
                if tx.send(input).await.is_err() {
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::watcher::{ChangeEvent, ChangeKind};
    use crate::git::types::{BranchFileDiff, FileChange};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Upstream(Option<(u32, u32)>, AtomicUsize);

    impl Upstream {
        fn new(counts: Option<(u32, u32)>) -> Self {
            Upstream(counts, AtomicUsize::new(0))
        }

        fn calls(&self) -> usize {
            self.1.load(Ordering::SeqCst)
        }
    }

    impl RepoSource for Upstream {
        fn current_branch(&self) -> String {
            "main".to_string()
        }
        fn status(&self) -> Result<Vec<FileChange>, GitError> {
            Ok(Vec::new())
        }
        fn ahead_behind(&self) -> Result<(u32, u32), GitError> {
            self.1.fetch_add(1, Ordering::SeqCst);
            self.0.ok_or(GitError::NoUpstream)
        }
        fn default_branch_name(&self) -> Option<String> {
            Some("main".to_string())
        }
        fn branch_file_diff(&self) -> Vec<BranchFileDiff> {
            Vec::new()
        }
    }

    #[tokio::test]
    async fn upstream_worker_distinguishes_no_upstream_from_in_sync() {
        let (tx, mut rx) = mpsc::channel(1);
        let worker =
            spawn_upstream_worker(Arc::new(Upstream::new(None)), Duration::from_secs(3600), tx);
        assert_eq!(rx.recv().await, Some(Divergence::NoUpstream));
        worker.abort();

        let (tx, mut rx) = mpsc::channel(1);
        let worker = spawn_upstream_worker(
            Arc::new(Upstream::new(Some((0, 0)))),
            Duration::from_secs(3600),
            tx,
        );
        assert_eq!(
            rx.recv().await,
            Some(Divergence::Tracking {
                ahead: 0,
                behind: 0
            })
        );
        worker.abort();
    }

    #[tokio::test]
    async fn upstream_worker_waits_for_the_loop_before_sleeping() {
        let repo = Arc::new(Upstream::new(Some((1, 2))));
        let (tx, mut rx) = mpsc::channel(1);
        let worker = spawn_upstream_worker(repo.clone(), Duration::from_millis(10), tx);

        // Many periods pass while the first value sits unread.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(repo.calls(), 1);

        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_some());
        assert_eq!(repo.calls(), 2);
        worker.abort();
    }

    #[test]
    fn forwarding_collapses_bursts_into_one_trigger() {
        let (event_tx, event_rx) = std::sync::mpsc::channel();
        let (_error_tx, error_rx) = std::sync::mpsc::channel();
        let stream = ChangeStream {
            events: event_rx,
            errors: error_rx,
        };
        let (tx, mut rx) = mpsc::channel(1);

        for i in 0..50 {
            event_tx
                .send(ChangeEvent {
                    path: PathBuf::from(format!("/repo/f{}.txt", i)),
                    kind: ChangeKind::Modified,
                })
                .unwrap();
        }
        drop(event_tx);

        let forwarder = forward_changes(stream, PathBuf::from("/repo"), tx);
        forwarder.join().unwrap();

        assert_eq!(rx.try_recv(), Ok(()));
        assert!(rx.try_recv().is_err());
    }
}
