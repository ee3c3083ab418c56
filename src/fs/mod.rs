pub mod watcher;

use std::path::{Path, PathBuf};

pub fn canonicalize_path(raw: &Path) -> Result<PathBuf, String> {
    raw.canonicalize()
        .map_err(|e| format!("Cannot resolve path '{}': {}", raw.display(), e))
}

/// Path of `path` relative to `root`, for display; falls back to `path`.
pub fn display_relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_unresolvable_paths() {
        let err = canonicalize_path(Path::new("/definitely/not/here")).unwrap_err();
        assert!(err.starts_with("Cannot resolve path '/definitely/not/here'"));
    }

    #[test]
    fn strips_root_for_display() {
        let root = Path::new("/repo");
        assert_eq!(display_relative(Path::new("/repo/src/a.rs"), root), "src/a.rs");
        assert_eq!(display_relative(Path::new("/elsewhere"), root), "/elsewhere");
    }
}
