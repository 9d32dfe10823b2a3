//! Permission Manager (C3) — answers "may this path be accessed?" and "may
//! this command be executed?" against an immutable, process-wide policy.
//!
//! Path resolution is a canonicalize-and-prefix-check, with a
//! deepest-existing-ancestor walk for not-yet-created targets; the
//! deny-pattern table covers credential files, private keys, shell/tool
//! histories, and cloud/package-manager credential stores.

use std::path::{Path, PathBuf};

use crate::error::{ServerError, ServerResult};

/// A single deny-pattern entry. Checked against the final path component
/// (`name`) and, for directory-scoped patterns, against any ancestor name.
enum DenyPattern {
    /// Exact file name, e.g. `.env`.
    ExactName(&'static str),
    /// File name prefix, e.g. `id_rsa`.
    NamePrefix(&'static str),
    /// File name suffix, e.g. `.pem`.
    NameSuffix(&'static str),
    /// Any path component equals this directory name, e.g. `.ssh`.
    AnyComponent(&'static str),
}

/// Built-in, cross-platform deny list. Fixed at compile time and never
/// mutated at runtime — there is no API to add or remove entries.
const DENY_PATTERNS: &[DenyPattern] = &[
    // Environment / secrets files.
    DenyPattern::ExactName(".env"),
    DenyPattern::NamePrefix(".env."),
    DenyPattern::ExactName("credentials"),
    DenyPattern::ExactName("credentials.json"),
    // Private keys and certificates.
    DenyPattern::NameSuffix(".pem"),
    DenyPattern::NameSuffix(".key"),
    DenyPattern::NameSuffix(".p12"),
    DenyPattern::NameSuffix(".pfx"),
    DenyPattern::NamePrefix("id_rsa"),
    DenyPattern::NamePrefix("id_ed25519"),
    DenyPattern::NamePrefix("id_ecdsa"),
    DenyPattern::NamePrefix("id_dsa"),
    // Shell histories.
    DenyPattern::ExactName(".bash_history"),
    DenyPattern::ExactName(".zsh_history"),
    DenyPattern::ExactName(".fish_history"),
    DenyPattern::ExactName(".python_history"),
    // SSH / GPG directories.
    DenyPattern::AnyComponent(".ssh"),
    DenyPattern::AnyComponent(".gnupg"),
    // Cloud provider credential directories.
    DenyPattern::AnyComponent(".aws"),
    DenyPattern::AnyComponent(".azure"),
    DenyPattern::AnyComponent(".gcloud"),
    // Package manager / VCS auth files.
    DenyPattern::ExactName(".npmrc"),
    DenyPattern::ExactName(".pypirc"),
    DenyPattern::ExactName(".netrc"),
    DenyPattern::ExactName(".git-credentials"),
    // The server's own configuration directory.
    DenyPattern::AnyComponent(".hanzo"),
];

/// Commands that are always rejected outright, regardless of cwd, because
/// they are destructive independent of any specific allowed root.
const DENY_COMMAND_SUBSTRINGS: &[&str] = &[
    "rm -rf /",
    "rm -rf /*",
    "mkfs",
    "dd if=/dev/zero of=/dev/",
    "> /dev/sda",
    ":(){ :|:& };:",
];

/// Immutable permission policy: allowed roots plus the built-in deny list.
#[derive(Debug, Clone)]
pub struct PermissionManager {
    allowed_roots: Vec<PathBuf>,
}

impl PermissionManager {
    #[must_use]
    pub fn new(allowed_roots: Vec<PathBuf>) -> Self {
        Self { allowed_roots }
    }

    #[must_use]
    pub fn allowed_roots(&self) -> &[PathBuf] {
        &self.allowed_roots
    }

    /// Resolve `raw_path` (absolute or relative to the first allowed root)
    /// to its canonical, symlink-resolved absolute form, and verify it is
    /// permitted. Does not require the path to exist: for not-yet-created
    /// targets (e.g. a new file `write` is about to create), canonicalizes
    /// the deepest existing ancestor and rejoins the remaining components.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::PermissionDenied`] if the resolved path escapes
    /// every allowed root or matches a deny pattern.
    pub fn resolve(&self, raw_path: &str) -> ServerResult<PathBuf> {
        if raw_path.contains('\0') {
            return Err(ServerError::PermissionDenied {
                path: raw_path.to_owned(),
                reason: "path contains a null byte".to_owned(),
            });
        }

        let candidate = Path::new(raw_path);
        let base = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.allowed_roots
                .first()
                .map(|r| r.join(candidate))
                .unwrap_or_else(|| candidate.to_path_buf())
        };

        let canonical = canonicalize_best_effort(&base)?;

        if !self.is_canonical_path_allowed(&canonical) {
            return Err(ServerError::PermissionDenied {
                path: raw_path.to_owned(),
                reason: "outside the configured allowed roots".to_owned(),
            });
        }

        if let Some(pattern) = matched_deny_pattern(&canonical) {
            return Err(ServerError::PermissionDenied {
                path: raw_path.to_owned(),
                reason: format!("matches a denied pattern ({pattern})"),
            });
        }

        Ok(canonical)
    }

    /// Like [`Self::resolve`], but additionally requires the parent
    /// directory of the resolved path to itself be permitted — used before
    /// any filesystem mutation, per the data-model invariant that both the
    /// target and its parent are checked.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::PermissionDenied`] under the same conditions as
    /// [`Self::resolve`], evaluated against the parent directory.
    pub fn resolve_for_write(&self, raw_path: &str) -> ServerResult<PathBuf> {
        let resolved = self.resolve(raw_path)?;
        if let Some(parent) = resolved.parent() {
            let parent_canonical = canonicalize_best_effort(parent)?;
            if !self.is_canonical_path_allowed(&parent_canonical) {
                return Err(ServerError::PermissionDenied {
                    path: raw_path.to_owned(),
                    reason: "parent directory is outside the configured allowed roots".to_owned(),
                });
            }
        }
        Ok(resolved)
    }

    /// `true` if `path` (already canonical) sits under at least one allowed
    /// root at a path-component boundary and matches no deny pattern.
    #[must_use]
    pub fn is_canonical_path_allowed(&self, path: &Path) -> bool {
        self.allowed_roots.iter().any(|root| path.starts_with(root))
    }

    /// Conservative static check on a shell command string: rejects
    /// enumerated destructive forms and absolute paths that point outside
    /// every allowed root when statically detectable. Borderline commands
    /// are allowed — this check is deliberately a blunt filter on known-bad
    /// patterns, not an attempt at full shell-syntax analysis.
    #[must_use]
    pub fn is_command_allowed(&self, command: &str, cwd: Option<&Path>) -> bool {
        let normalized = command.trim();
        for bad in DENY_COMMAND_SUBSTRINGS {
            if normalized.contains(bad) {
                return false;
            }
        }

        if let Some(cwd) = cwd {
            if canonicalize_best_effort(cwd)
                .map(|c| !self.is_canonical_path_allowed(&c))
                .unwrap_or(false)
            {
                return false;
            }
        }

        for token in normalized.split_whitespace() {
            if let Some(path_str) = token.strip_prefix('/') {
                let abs = PathBuf::from("/").join(path_str);
                if is_statically_denied_absolute(&abs) {
                    return false;
                }
            }
        }

        true
    }
}

/// Absolute paths that are never acceptable shell targets even though they
/// are not filesystem-tool operations subject to `resolve`.
fn is_statically_denied_absolute(path: &Path) -> bool {
    matches!(
        path.to_str(),
        Some("/etc") | Some("/etc/") | Some("/dev") | Some("/dev/") | Some("/sys") | Some("/sys/")
    ) || path.starts_with("/etc/")
        || path.starts_with("/dev/")
        || path.starts_with("/sys/")
}

fn matched_deny_pattern(path: &Path) -> Option<&'static str> {
    let name = path.file_name().and_then(|n| n.to_str());
    for pattern in DENY_PATTERNS {
        match pattern {
            DenyPattern::ExactName(n) if name == Some(n) => return Some(n),
            DenyPattern::NamePrefix(p) if name.is_some_and(|n| n.starts_with(p)) => return Some(p),
            DenyPattern::NameSuffix(s) if name.is_some_and(|n| n.ends_with(s)) => return Some(s),
            DenyPattern::AnyComponent(c) => {
                if path
                    .components()
                    .any(|comp| comp.as_os_str().to_str() == Some(*c))
                {
                    return Some(c);
                }
            }
            _ => {}
        }
    }
    None
}

/// `.git` is never itself deny-listed — no pattern above matches it, so no
/// special-case is required; kept as a documented invariant rather than
/// code so future deny-pattern additions don't accidentally break it.
const _GIT_DIRECTORY_ALLOWED_BY_DEFAULT: () = ();

/// Canonicalize `path` if it exists; otherwise canonicalize the deepest
/// existing ancestor and rejoin the remaining (not-yet-created) components.
fn canonicalize_best_effort(path: &Path) -> ServerResult<PathBuf> {
    if path.exists() {
        return path.canonicalize().map_err(|source| ServerError::Io {
            path: path.to_path_buf(),
            source,
        });
    }

    let mut ancestor = path.to_path_buf();
    let mut suffix = Vec::new();
    loop {
        if ancestor.exists() {
            let canonical = ancestor.canonicalize().map_err(|source| ServerError::Io {
                path: ancestor.clone(),
                source,
            })?;
            let mut result = canonical;
            for part in suffix.iter().rev() {
                result.push(part);
            }
            return Ok(result);
        }
        match (ancestor.file_name().map(std::ffi::OsStr::to_os_string), ancestor.parent().map(Path::to_path_buf)) {
            (Some(name), Some(parent)) => {
                suffix.push(name);
                ancestor = parent;
            }
            _ => return Ok(path.to_path_buf()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_for(dir: &Path) -> PermissionManager {
        PermissionManager::new(vec![dir.canonicalize().expect("canon")])
    }

    #[test]
    fn allows_path_inside_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.txt"), "x").expect("write");
        let pm = manager_for(dir.path());
        let resolved = pm.resolve(dir.path().join("a.txt").to_str().expect("path"));
        assert!(resolved.is_ok());
    }

    #[test]
    fn rejects_path_outside_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pm = manager_for(dir.path());
        let resolved = pm.resolve("/etc/passwd");
        assert!(resolved.is_err());
    }

    #[test]
    fn rejects_deny_pattern_even_inside_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join(".ssh")).expect("mkdir");
        std::fs::write(dir.path().join(".ssh/id_rsa"), "secret").expect("write");
        let pm = manager_for(dir.path());
        let resolved = pm.resolve(dir.path().join(".ssh/id_rsa").to_str().expect("path"));
        assert!(resolved.is_err());
    }

    #[test]
    fn allows_not_yet_created_file_under_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pm = manager_for(dir.path());
        let target = dir.path().join("new/subdir/file.txt");
        let resolved = pm.resolve(target.to_str().expect("path"));
        assert!(resolved.is_ok());
    }

    #[test]
    fn rejects_destructive_command() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pm = manager_for(dir.path());
        assert!(!pm.is_command_allowed("rm -rf /", None));
        assert!(pm.is_command_allowed("echo hello", None));
    }

    #[test]
    fn git_directory_not_denied() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join(".git")).expect("mkdir");
        std::fs::write(dir.path().join(".git/HEAD"), "ref: refs/heads/main").expect("write");
        let pm = manager_for(dir.path());
        let resolved = pm.resolve(dir.path().join(".git/HEAD").to_str().expect("path"));
        assert!(resolved.is_ok());
    }
}
