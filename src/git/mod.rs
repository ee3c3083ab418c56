pub mod types;

use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use thiserror::Error;
use types::{BranchFileDiff, FileChange, StatusCode};

#[derive(Debug, Error)]
pub enum GitError {
    #[error("Failed to run git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("git {command} exited with {code:?}: {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("no upstream")]
    NoUpstream,

    #[error("Unexpected output from git {command}: {output:?}")]
    Unexpected { command: String, output: String },
}

/// Read access to the repository state the dashboard shows.
///
/// Every call is blocking and independent of the others. Implementations
/// must tolerate "no commits yet" and report missing data through the
/// return value instead of failing the caller.
pub trait RepoSource: Send + Sync + 'static {
    fn current_branch(&self) -> String;
    fn status(&self) -> Result<Vec<FileChange>, GitError>;
    /// Commits unique to HEAD and to its upstream, in that order.
    fn ahead_behind(&self) -> Result<(u32, u32), GitError>;
    /// `None` when no candidate resolves.
    fn default_branch_name(&self) -> Option<String>;
    fn branch_file_diff(&self) -> Vec<BranchFileDiff>;
}

/// `RepoSource` backed by the `git` executable.
pub struct Git {
    workdir: PathBuf,
    /// Resolved once per run; a remote changing its default mid-run is not seen.
    default_branch: OnceLock<String>,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            default_branch: OnceLock::new(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn is_repository(&self) -> bool {
        self.run(&["rev-parse", "--is-inside-work-tree"]).is_ok()
    }

    fn run(&self, args: &[&str]) -> Result<String, GitError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .output()?;

        if !output.status.success() {
            return Err(GitError::Failed {
                command: args.join(" "),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// First line of stdout, or `None` on failure or empty output.
    fn line(&self, args: &[&str]) -> Option<String> {
        let stdout = self.run(args).ok()?;
        let line = stdout.trim();
        if line.is_empty() {
            None
        } else {
            Some(line.to_string())
        }
    }

    fn resolve_default_branch(&self) -> Option<String> {
        if let Some(reference) = self.line(&["symbolic-ref", "refs/remotes/origin/HEAD"]) {
            let name = reference
                .strip_prefix("refs/remotes/origin/")
                .unwrap_or(&reference);
            return Some(name.to_string());
        }
        ["main", "master"].into_iter().find_map(|candidate| {
            let reference = format!("refs/heads/{}", candidate);
            self.run(&["rev-parse", "--verify", "--quiet", &reference])
                .ok()
                .map(|_| candidate.to_string())
        })
    }
}

impl RepoSource for Git {
    fn current_branch(&self) -> String {
        let head = self.line(&["rev-parse", "--short", "HEAD"]);
        // `branch --show-current` also names an unborn branch, so only
        // trust it once HEAD points at a commit.
        let attached = match head {
            Some(_) => self.line(&["branch", "--show-current"]),
            None => None,
        };
        let unborn = if head.is_none() {
            self.line(&["symbolic-ref", "--short", "HEAD"])
        } else {
            None
        };
        resolve_branch(attached, unborn, head)
    }

    fn status(&self) -> Result<Vec<FileChange>, GitError> {
        let stdout = self.run(&["status", "--porcelain=v1", "-uall"])?;
        Ok(parse_porcelain(&stdout))
    }

    fn ahead_behind(&self) -> Result<(u32, u32), GitError> {
        if let Err(err) = self.run(&["fetch", "--quiet"]) {
            debug!("fetch skipped: {}", err);
        }

        let command = "rev-list --count --left-right HEAD...@{upstream}";
        match self.run(&["rev-list", "--count", "--left-right", "HEAD...@{upstream}"]) {
            Ok(stdout) => parse_left_right(command, &stdout),
            Err(GitError::Failed { .. }) => Err(GitError::NoUpstream),
            Err(err) => Err(err),
        }
    }

    fn default_branch_name(&self) -> Option<String> {
        if let Some(name) = self.default_branch.get() {
            return Some(name.clone());
        }
        let name = self.resolve_default_branch()?;
        Some(self.default_branch.get_or_init(|| name).clone())
    }

    fn branch_file_diff(&self) -> Vec<BranchFileDiff> {
        let Some(default_branch) = self.default_branch_name() else {
            return Vec::new();
        };

        let Some(head) = self.line(&["rev-parse", "HEAD"]) else {
            return Vec::new();
        };
        let Some(default_rev) = self.line(&["rev-parse", &default_branch]) else {
            return Vec::new();
        };
        if head == default_rev {
            return Vec::new();
        }

        let Some(merge_base) = self.line(&["merge-base", &default_branch, "HEAD"]) else {
            return Vec::new();
        };

        match self.run(&["diff", "--name-status", &merge_base, "HEAD"]) {
            Ok(stdout) => parse_name_status(&stdout),
            Err(err) => {
                warn!("branch diff against {} failed: {}", default_branch, err);
                Vec::new()
            }
        }
    }
}

/// Picks the branch label from what git could tell us, in priority order:
/// attached branch, unborn branch, detached commit, then `"unknown"`.
pub fn resolve_branch(
    attached: Option<String>,
    unborn: Option<String>,
    head: Option<String>,
) -> String {
    if let Some(branch) = attached {
        return branch;
    }
    if let Some(branch) = unborn {
        return format!("{} (no commits)", branch);
    }
    if let Some(hash) = head {
        return format!("(detached) {}", hash);
    }
    "unknown".to_string()
}

pub fn parse_porcelain(output: &str) -> Vec<FileChange> {
    output.lines().filter_map(parse_porcelain_line).collect()
}

fn parse_porcelain_line(line: &str) -> Option<FileChange> {
    if line.len() < 4 {
        return None;
    }
    let bytes = line.as_bytes();
    let staged = StatusCode::from_byte(bytes[0]);
    let unstaged = StatusCode::from_byte(bytes[1]);
    let raw_path = line.get(3..)?;

    let (orig_path, path) = match raw_path.split_once(" -> ") {
        Some((from, to)) => (Some(from.to_string()), to.to_string()),
        None => (None, raw_path.to_string()),
    };

    Some(FileChange {
        staged,
        unstaged,
        label: status_label(staged, unstaged),
        path,
        orig_path,
    })
}

pub fn status_label(staged: StatusCode, unstaged: StatusCode) -> String {
    if staged == StatusCode::Untracked && unstaged == StatusCode::Untracked {
        return "untracked".to_string();
    }
    if staged == StatusCode::Ignored && unstaged == StatusCode::Ignored {
        return "ignored".to_string();
    }

    let mut parts: Vec<&str> = Vec::new();

    match staged {
        StatusCode::Modified => parts.push("modified (staged)"),
        StatusCode::Added => parts.push("added (staged)"),
        StatusCode::Deleted => parts.push("deleted (staged)"),
        StatusCode::Renamed => parts.push("renamed (staged)"),
        StatusCode::Copied => parts.push("copied (staged)"),
        StatusCode::Unmerged => parts.push("conflicted"),
        _ => {}
    }

    match unstaged {
        StatusCode::Modified => parts.push("modified"),
        StatusCode::Deleted => parts.push("deleted"),
        StatusCode::Unmerged if staged != StatusCode::Unmerged => parts.push("conflicted"),
        _ => {}
    }

    if parts.is_empty() {
        return "changed".to_string();
    }
    parts.join(", ")
}

fn parse_left_right(command: &str, output: &str) -> Result<(u32, u32), GitError> {
    let unexpected = || GitError::Unexpected {
        command: command.to_string(),
        output: output.to_string(),
    };

    let parts: Vec<&str> = output.split_whitespace().collect();
    if parts.len() != 2 {
        return Err(unexpected());
    }
    let ahead = parts[0].parse::<u32>().map_err(|_| unexpected())?;
    let behind = parts[1].parse::<u32>().map_err(|_| unexpected())?;
    Ok((ahead, behind))
}

pub fn parse_name_status(output: &str) -> Vec<BranchFileDiff> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 2 {
                return None;
            }
            let status = StatusCode::from_byte(*fields[0].as_bytes().first()?);
            // Renames and copies list source then destination.
            let path = fields[fields.len() - 1];
            Some(BranchFileDiff {
                status,
                path: path.to_string(),
            })
        })
        .collect()
}
