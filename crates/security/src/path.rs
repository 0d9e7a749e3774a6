//! Path validation: sandboxing file tools to the workspace root.
//!
//! Tool paths are workspace-relative. Absolute paths are accepted only when
//! they already point inside the root. Symlinks are resolved on the deepest
//! existing ancestor so a link cannot smuggle a write outside the root.

use std::path::{Component, Path, PathBuf};

/// Error returned when path validation fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathValidationError {
    #[error("Path '{path}' is outside the workspace root")]
    OutsideRoot { path: String },

    #[error("Path '{path}' matches forbidden pattern '{pattern}'")]
    ForbiddenPath { path: String, pattern: String },

    #[error("Path traversal detected in '{path}'")]
    PathTraversal { path: String },

    #[error("Failed to canonicalize path '{path}': {reason}")]
    CanonicalizeFailed { path: String, reason: String },
}

/// Validate `path` against the workspace `root`.
///
/// Checks, in order:
/// 1. No `..` components
/// 2. Absolute paths must sit under `root`
/// 3. Not under any forbidden prefix (matched on whole components)
/// 4. After resolving symlinks, still under `root`
///
/// Returns the absolute path to operate on.
pub fn validate_path(
    root: &Path,
    path: &str,
    forbidden_paths: &[String],
) -> Result<PathBuf, PathValidationError> {
    let normalized = normalize_path(path);
    let input = Path::new(&normalized);

    if input.components().any(|c| c == Component::ParentDir) {
        return Err(PathValidationError::PathTraversal { path: path.into() });
    }

    let relative: PathBuf = if input.is_absolute() {
        input
            .strip_prefix(root)
            .map_err(|_| PathValidationError::OutsideRoot { path: path.into() })?
            .to_path_buf()
    } else {
        input.to_path_buf()
    };

    if let Some(pattern) = forbidden_match(&relative, forbidden_paths) {
        return Err(PathValidationError::ForbiddenPath {
            path: path.into(),
            pattern: pattern.to_string(),
        });
    }

    let full = root.join(&relative);
    ensure_resolves_inside(root, &full, path)?;
    Ok(full)
}

/// Canonical spelling of a tool path: `/` separators, no `.` segments, no
/// empty segments. `..` is kept so validation can still reject it.
///
/// Two spellings that name the same workspace file normalize to the same
/// string, which makes the result usable as a map key.
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let joined = unified
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/");
    if unified.starts_with('/') {
        format!("/{joined}")
    } else {
        joined
    }
}

/// The forbidden pattern a root-relative path falls under, if any.
pub fn forbidden_match<'a>(relative: &Path, forbidden_paths: &'a [String]) -> Option<&'a str> {
    forbidden_paths
        .iter()
        .find(|forbidden| {
            let pattern: PathBuf = Path::new(&forbidden.replace('\\', "/"))
                .components()
                .filter(|c| !matches!(c, Component::CurDir))
                .collect();
            !pattern.as_os_str().is_empty() && relative.starts_with(&pattern)
        })
        .map(String::as_str)
}

/// Workspace-relative form of a path under `root`, with `/` separators.
pub fn relative_display(root: &Path, full: &Path) -> String {
    full.strip_prefix(root)
        .unwrap_or(full)
        .to_string_lossy()
        .replace('\\', "/")
}

fn ensure_resolves_inside(root: &Path, full: &Path, raw: &str) -> Result<(), PathValidationError> {
    let canonical_root = match root.canonicalize() {
        Ok(r) => r,
        // Root does not exist yet; nothing on disk can redirect us.
        Err(_) => return Ok(()),
    };

    let Some(existing) = full.ancestors().find(|a| a.exists()) else {
        return Ok(());
    };
    let resolved = existing
        .canonicalize()
        .map_err(|e| PathValidationError::CanonicalizeFailed {
            path: raw.into(),
            reason: e.to_string(),
        })?;

    if resolved.starts_with(&canonical_root) {
        Ok(())
    } else {
        tracing::warn!(path = raw, resolved = %resolved.display(), "Path escapes workspace root");
        Err(PathValidationError::OutsideRoot { path: raw.into() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forbidden() -> Vec<String> {
        vec![".git".into(), "secrets/keys".into()]
    }

    #[test]
    fn relative_path_joins_root() {
        let dir = tempfile::tempdir().unwrap();
        let full = validate_path(dir.path(), "src/main.rs", &forbidden()).unwrap();
        assert_eq!(full, dir.path().join("src/main.rs"));
        assert_eq!(relative_display(dir.path(), &full), "src/main.rs");
    }

    #[test]
    fn normalize_path_unifies_spellings() {
        assert_eq!(normalize_path("./src/./lib.rs"), "src/lib.rs");
        assert_eq!(normalize_path("src\\lib.rs"), "src/lib.rs");
        assert_eq!(normalize_path("src//lib.rs/"), "src/lib.rs");
        assert_eq!(normalize_path("/abs/./x"), "/abs/x");
        assert_eq!(normalize_path("../up"), "../up");
        assert_eq!(normalize_path("./"), "");
    }

    #[test]
    fn current_dir_components_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let full = validate_path(dir.path(), "./src/./lib.rs", &[]).unwrap();
        assert_eq!(full, dir.path().join("src/lib.rs"));
    }

    #[test]
    fn path_traversal_blocked() {
        let dir = tempfile::tempdir().unwrap();
        for p in ["../etc/passwd", "src/../../x", "..", "a\\..\\..\\b"] {
            match validate_path(dir.path(), p, &[]) {
                Err(PathValidationError::PathTraversal { .. }) => {}
                other => panic!("Expected PathTraversal for {p}, got: {other:?}"),
            }
        }
    }

    #[test]
    fn absolute_path_inside_root_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let abs = dir.path().join("notes.md");
        let full = validate_path(dir.path(), abs.to_str().unwrap(), &[]).unwrap();
        assert_eq!(full, abs);
    }

    #[test]
    fn absolute_path_outside_root_blocked() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            validate_path(dir.path(), "/etc/passwd", &[]),
            Err(PathValidationError::OutsideRoot { .. })
        ));
    }

    #[test]
    fn forbidden_prefix_matches_whole_components() {
        let dir = tempfile::tempdir().unwrap();
        match validate_path(dir.path(), ".git/config", &forbidden()) {
            Err(PathValidationError::ForbiddenPath { pattern, .. }) => assert_eq!(pattern, ".git"),
            other => panic!("Expected ForbiddenPath, got: {other:?}"),
        }
        assert!(validate_path(dir.path(), "secrets/keys/prod.pem", &forbidden()).is_err());
        assert!(validate_path(dir.path(), ".github/workflows/ci.yml", &forbidden()).is_ok());
        assert!(validate_path(dir.path(), "secrets/readme.md", &forbidden()).is_ok());
        assert_eq!(forbidden_match(Path::new(".git/HEAD"), &forbidden()), Some(".git"));
        assert_eq!(forbidden_match(Path::new("src"), &forbidden()), None);
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_blocked() {
        let outside = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
        assert!(matches!(
            validate_path(dir.path(), "link/stolen.txt", &[]),
            Err(PathValidationError::OutsideRoot { .. })
        ));
    }
}
