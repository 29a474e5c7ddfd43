//! Version-control provenance and tag derivation.
//!
//! The repository is queried read-only: short commit hash, branch, dirty
//! state, and an exact version tag if HEAD has one. Tag derivation itself is
//! a pure function of that state, so identical repository states always
//! produce identical tags.
//!
//! "Not a repository" and "git invocation failed" are distinct outcomes:
//! the former falls back to [`FALLBACK_TAG`], the latter aborts the run. A
//! transient git failure must not silently produce a mistagged image.

use std::path::Path;
use thiserror::Error;

use crate::process::Cmd;
use crate::registry::BuildMode;

/// Tag used when no repository is present at all.
pub const FALLBACK_TAG: &str = "dev";

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("not a git repository (and no --tag override given)")]
    NotARepository,
    #[error("git query failed: {0}")]
    QueryFailed(String),
}

/// Version-control state of the source tree at build time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    /// Short commit hash of HEAD.
    pub commit: String,
    /// Current branch name (may be `HEAD` when detached).
    pub branch: String,
    /// Uncommitted changes present.
    pub dirty: bool,
    /// Version tag pointing exactly at HEAD, if any.
    pub exact_tag: Option<String>,
}

impl Provenance {
    /// Placeholder provenance for trees without a repository.
    pub fn unknown() -> Self {
        Self {
            commit: "unknown".to_string(),
            branch: "unknown".to_string(),
            dirty: false,
            exact_tag: None,
        }
    }
}

/// Query git state for the given source tree.
pub fn query(repo_root: &Path) -> Result<Provenance, VcsError> {
    // `rev-parse --is-inside-work-tree` separates "no repository here" from
    // everything else that can go wrong with git. A missing git binary counts
    // as "no repository": with allow_fail set, run() only errors on spawn.
    let probe = Cmd::new("git")
        .args(["-C"])
        .arg_path(repo_root)
        .args(["rev-parse", "--is-inside-work-tree"])
        .allow_fail()
        .run()
        .map_err(|_| VcsError::NotARepository)?;
    if !probe.success() {
        return Err(VcsError::NotARepository);
    }

    let commit = git_query(repo_root, &["rev-parse", "--short", "HEAD"])?;
    let branch = git_query(repo_root, &["rev-parse", "--abbrev-ref", "HEAD"])?;

    let status = Cmd::new("git")
        .args(["-C"])
        .arg_path(repo_root)
        .args(["status", "--porcelain"])
        .run()
        .map_err(|e| VcsError::QueryFailed(e.to_string()))?;
    let dirty = !status.stdout_trimmed().is_empty();

    // Exact-match describe fails when HEAD has no tag; that is not an error.
    let describe = Cmd::new("git")
        .args(["-C"])
        .arg_path(repo_root)
        .args(["describe", "--exact-match", "--tags"])
        .allow_fail()
        .run()
        .map_err(|e| VcsError::QueryFailed(e.to_string()))?;
    let exact_tag = if describe.success() {
        let tag = describe.stdout_trimmed();
        (!tag.is_empty()).then_some(tag)
    } else {
        None
    };

    Ok(Provenance {
        commit,
        branch,
        dirty,
        exact_tag,
    })
}

fn git_query(repo_root: &Path, args: &[&str]) -> Result<String, VcsError> {
    let out = Cmd::new("git")
        .args(["-C"])
        .arg_path(repo_root)
        .args(args.iter().copied())
        .run()
        .map_err(|e| VcsError::QueryFailed(e.to_string()))?;
    Ok(out.stdout_trimmed())
}

/// Derive the base image tag from version-control state.
///
/// An exact version tag on a clean tree wins; otherwise the short commit
/// hash, suffixed `-dirty` when uncommitted changes exist.
pub fn derive_tag(provenance: &Provenance) -> String {
    match (&provenance.exact_tag, provenance.dirty) {
        (Some(version), false) => version.clone(),
        _ => {
            let mut tag = provenance.commit.clone();
            if provenance.dirty {
                tag.push_str("-dirty");
            }
            tag
        }
    }
}

/// Resolve the effective tag for one build: user override or derived tag,
/// then the unconditional `-debug` suffix for debug mode.
pub fn resolve_tag(base: &str, mode: BuildMode) -> String {
    match mode {
        BuildMode::Debug => format!("{}-debug", base),
        BuildMode::Release => base.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provenance(commit: &str, dirty: bool, exact_tag: Option<&str>) -> Provenance {
        Provenance {
            commit: commit.to_string(),
            branch: "main".to_string(),
            dirty,
            exact_tag: exact_tag.map(String::from),
        }
    }

    #[test]
    fn test_version_tag_on_clean_tree() {
        let p = provenance("abc1234", false, Some("v1.2.0"));
        assert_eq!(derive_tag(&p), "v1.2.0");
    }

    #[test]
    fn test_version_tag_ignored_when_dirty() {
        let p = provenance("abc1234", true, Some("v1.2.0"));
        assert_eq!(derive_tag(&p), "abc1234-dirty");
    }

    #[test]
    fn test_commit_hash_when_untagged() {
        let p = provenance("abc1234", false, None);
        assert_eq!(derive_tag(&p), "abc1234");
    }

    #[test]
    fn test_dirty_suffix() {
        let p = provenance("abc1234", true, None);
        assert_eq!(derive_tag(&p), "abc1234-dirty");
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let p = provenance("abc1234", true, None);
        assert_eq!(derive_tag(&p), derive_tag(&p));
    }

    #[test]
    fn test_debug_mode_appends_suffix() {
        assert_eq!(resolve_tag("abc1234-dirty", BuildMode::Debug), "abc1234-dirty-debug");
        assert_eq!(resolve_tag("v1.2.0", BuildMode::Debug), "v1.2.0-debug");
    }

    #[test]
    fn test_release_mode_leaves_tag_alone() {
        assert_eq!(resolve_tag("abc1234", BuildMode::Release), "abc1234");
    }

    #[test]
    fn test_query_on_non_repository() {
        let dir = tempfile::tempdir().unwrap();
        match query(dir.path()) {
            Err(VcsError::NotARepository) => {}
            other => panic!("expected NotARepository, got {:?}", other.map(|_| ())),
        }
    }
}
