mod config;
pub mod fs;
pub mod git;
pub mod scheduler;
pub mod ui;

use config::Config;
use fs::watcher::{TreeWatcher, WatchError};
use git::{Git, RepoSource};
use scheduler::sources::{channels, forward_changes, spawn_input_worker, spawn_upstream_worker};
use scheduler::Scheduler;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use ui::terminal::TerminalGuard;
use ui::Dashboard;

#[derive(Debug, Error)]
enum StartupError {
    #[error("Not a git repository\nPlease run vigil from within a git repository.")]
    NotARepository,

    #[error("Cannot read working directory: {0}")]
    WorkingDirectory(std::io::Error),

    #[error("{0}")]
    Config(String),

    #[error("Cannot open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error("Cannot start async runtime: {0}")]
    Runtime(std::io::Error),

    #[error("Terminal error: {0}")]
    Terminal(#[from] std::io::Error),
}

/// Logs go to a file because the dashboard owns the terminal.
fn init_logging(path: Option<&Path>) -> Result<(), StartupError> {
    let Some(path) = path else {
        return Ok(());
    };
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| StartupError::LogFile {
            path: path.to_path_buf(),
            source,
        })?;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vigil_lib=debug"));
    tracing_subscriber::fmt()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_env_filter(filter)
        .init();
    Ok(())
}

async fn watch(config: Config, git: Git) -> Result<(), StartupError> {
    let (mut watcher, stream) = TreeWatcher::open(git.workdir(), &config.exclude)?;
    let root = watcher.root().to_path_buf();
    let repo = Arc::new(git);

    let (triggers, sources) = channels();
    forward_changes(stream, root.clone(), triggers.changes);
    let upstream = spawn_upstream_worker(repo.clone(), config.upstream_interval(), triggers.upstream);

    let (guard, terminal) = TerminalGuard::enter()?;
    let input = spawn_input_worker(triggers.input);
    let dashboard = Dashboard::new(terminal, root.display().to_string());
    let result = Scheduler::new(repo, dashboard, sources, config.poll_interval())
        .run()
        .await;

    input.abort();
    upstream.abort();
    watcher.close();
    drop(guard);
    log::debug!("dashboard closed");
    result.map_err(StartupError::Terminal)
}

fn start() -> Result<(), StartupError> {
    let config = Config::load().map_err(StartupError::Config)?;
    init_logging(config.log_file.as_deref())?;

    let git = Git::new(".");
    if !git.is_repository() {
        return Err(StartupError::NotARepository);
    }
    let workdir = std::env::current_dir().map_err(StartupError::WorkingDirectory)?;
    let git = Git::new(workdir);
    log::debug!(
        "starting in {} on {}",
        git.workdir().display(),
        git.current_branch()
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(StartupError::Runtime)?;
    let result = runtime.block_on(watch(config, git));
    // A fetch still running in the blocking pool must not hold up exit.
    runtime.shutdown_background();
    result
}

pub fn run() -> ExitCode {
    match start() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::from(1)
        }
    }
}
