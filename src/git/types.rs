/// One column of a porcelain status pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusCode {
    Unmodified,
    Modified,
    Added,
    Deleted,
    Renamed,
    Copied,
    Untracked,
    Ignored,
    Unmerged,
}

impl StatusCode {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            b'M' | b'T' => StatusCode::Modified,
            b'A' => StatusCode::Added,
            b'D' => StatusCode::Deleted,
            b'R' => StatusCode::Renamed,
            b'C' => StatusCode::Copied,
            b'?' => StatusCode::Untracked,
            b'!' => StatusCode::Ignored,
            b'U' => StatusCode::Unmerged,
            _ => StatusCode::Unmodified,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            StatusCode::Unmodified => ' ',
            StatusCode::Modified => 'M',
            StatusCode::Added => 'A',
            StatusCode::Deleted => 'D',
            StatusCode::Renamed => 'R',
            StatusCode::Copied => 'C',
            StatusCode::Untracked => '?',
            StatusCode::Ignored => '!',
            StatusCode::Unmerged => 'U',
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileChange {
    pub staged: StatusCode,
    pub unstaged: StatusCode,
    pub label: String,
    pub path: String,
    /// Source path of a rename or copy.
    pub orig_path: Option<String>,
}

impl FileChange {
    /// The raw two-character column, e.g. `"M "` or `"??"`.
    pub fn code(&self) -> String {
        let mut code = String::with_capacity(2);
        code.push(self.staged.as_char());
        code.push(self.unstaged.as_char());
        code
    }
}

/// A file touched by commits that only exist on the current branch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BranchFileDiff {
    pub status: StatusCode,
    pub path: String,
}

/// Relation of HEAD to its upstream.
///
/// `NoUpstream` and `Tracking { ahead: 0, behind: 0 }` are different
/// answers and must stay that way.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Divergence {
    /// No answer from the upstream worker yet.
    #[default]
    Pending,
    NoUpstream,
    Tracking { ahead: u32, behind: u32 },
}

/// Everything one refresh cycle knows about the repository.
///
/// Snapshots are never edited once published; a refresh builds a new one
/// from the previous value and replaces it as a whole.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub branch: String,
    pub divergence: Divergence,
    pub changes: Vec<FileChange>,
    pub branch_files: Vec<BranchFileDiff>,
    /// Default branch the branch files were computed against.
    pub default_branch: Option<String>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            branch: "unknown".to_string(),
            divergence: Divergence::Pending,
            changes: Vec::new(),
            branch_files: Vec::new(),
            default_branch: None,
        }
    }
}

impl Snapshot {
    pub fn with_divergence(&self, divergence: Divergence) -> Self {
        Self {
            divergence,
            ..self.clone()
        }
    }
}
