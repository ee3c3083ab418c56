//! Single-consumer refresh loop.
//!
//! Filesystem triggers, the fixed poll, upstream results and user input all
//! land here. Each handler runs to completion before the loop looks at the
//! next event, so there is at most one extraction in flight and snapshots
//! are published in the order their extraction finished.

pub mod sources;

use crate::git::types::{BranchFileDiff, FileChange, Snapshot};
use crate::git::{GitError, RepoSource};
use crate::ui::{Dashboard, Input};
use log::{debug, warn};
use ratatui::backend::Backend;
use sources::Sources;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Refresh {
    /// Branch and working-tree status.
    Quick,
    /// Quick plus the files changed on this branch.
    Full,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

struct Extraction {
    branch: String,
    status: Result<Vec<FileChange>, GitError>,
    branch_files: Option<(Option<String>, Vec<BranchFileDiff>)>,
}

fn extract<R: RepoSource>(repo: &R, kind: Refresh) -> Extraction {
    let branch = repo.current_branch();
    let status = repo.status();
    let branch_files = match kind {
        Refresh::Quick => None,
        Refresh::Full => Some((repo.default_branch_name(), repo.branch_file_diff())),
    };
    Extraction {
        branch,
        status,
        branch_files,
    }
}

impl Extraction {
    /// Builds the next snapshot; fields this extraction could not produce
    /// keep their previous value.
    fn apply(self, previous: &Snapshot) -> Snapshot {
        let changes = match self.status {
            Ok(changes) => changes,
            Err(err) => {
                warn!("status failed, keeping previous file list: {}", err);
                previous.changes.clone()
            }
        };
        let (default_branch, branch_files) = match self.branch_files {
            Some((name, files)) => (name, files),
            None => (previous.default_branch.clone(), previous.branch_files.clone()),
        };
        Snapshot {
            branch: self.branch,
            divergence: previous.divergence,
            changes,
            branch_files,
            default_branch,
        }
    }
}

pub struct Scheduler<R: RepoSource, B: Backend> {
    repo: Arc<R>,
    dashboard: Dashboard<B>,
    snapshot: Arc<Snapshot>,
    sources: Sources,
    poll: Interval,
}

impl<R: RepoSource, B: Backend> Scheduler<R, B> {
    pub fn new(repo: Arc<R>, dashboard: Dashboard<B>, sources: Sources, period: Duration) -> Self {
        let mut poll = interval_at(Instant::now() + period, period);
        // Missed ticks are not made up; the next one is a full period after
        // the handler finished.
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            repo,
            dashboard,
            snapshot: Arc::new(Snapshot::default()),
            sources,
            poll,
        }
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.clone()
    }

    #[cfg(test)]
    fn dashboard(&self) -> &Dashboard<B> {
        &self.dashboard
    }

    pub async fn run(mut self) -> io::Result<()> {
        self.refresh(Refresh::Full).await;
        self.dashboard.draw(&self.snapshot)?;
        while self.step().await? == Flow::Continue {}
        Ok(())
    }

    /// Waits for the next event from any source and handles it.
    ///
    /// Ready sources are picked in random order, so a stream of filesystem
    /// triggers cannot keep a keypress waiting for more than one iteration.
    pub async fn step(&mut self) -> io::Result<Flow> {
        tokio::select! {
            Some(()) = self.sources.changes.recv() => {
                self.refresh(Refresh::Quick).await;
            }
            _ = self.poll.tick() => {
                self.refresh(Refresh::Full).await;
            }
            Some(divergence) = self.sources.upstream.recv() => {
                self.publish(self.snapshot.with_divergence(divergence));
            }
            Some(input) = self.sources.input.recv() => {
                return self.handle_input(input).await;
            }
        }
        self.dashboard.draw(&self.snapshot)?;
        Ok(Flow::Continue)
    }

    async fn handle_input(&mut self, input: Input) -> io::Result<Flow> {
        match input {
            Input::Quit => return Ok(Flow::Quit),
            Input::Refresh => {
                self.refresh(Refresh::Full).await;
                self.dashboard.repaint(&self.snapshot)?;
                return Ok(Flow::Continue);
            }
            Input::Resize => {
                self.dashboard.repaint(&self.snapshot)?;
                return Ok(Flow::Continue);
            }
            Input::Scroll(delta) => self.dashboard.scroll_by(delta),
            Input::Top => self.dashboard.scroll_to_top(),
            Input::Bottom => self.dashboard.scroll_to_bottom(),
        }
        self.dashboard.draw(&self.snapshot)?;
        Ok(Flow::Continue)
    }

    fn publish(&mut self, snapshot: Snapshot) {
        self.snapshot = Arc::new(snapshot);
    }

    async fn refresh(&mut self, kind: Refresh) {
        let repo = self.repo.clone();
        let started = std::time::Instant::now();
        match tokio::task::spawn_blocking(move || extract(repo.as_ref(), kind)).await {
            Ok(extraction) => {
                let next = extraction.apply(&self.snapshot);
                self.publish(next);
                debug!("{:?} refresh took {:?}", kind, started.elapsed());
            }
            Err(err) => warn!("{:?} refresh task failed: {}", kind, err),
        }
    }
}
