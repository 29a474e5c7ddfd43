//! Publishing: push eligibility, channel re-tagging, multi-arch manifests.
//!
//! The plan is computed as a pure value first and executed second, so
//! dry-run can print exactly what a real run would do without touching the
//! backend. Images with a `-dirty` tag are excluded from the plan unless
//! force is set or a channel re-tag applies; channel tags are unversioned by
//! design, so dirty state is irrelevant to them.

use anyhow::{bail, Result};

use crate::build::ImageRecord;
use crate::build::assemble::DEFAULT_NAMESPACE;
use crate::docker::Docker;
use crate::registry::BuildMode;

/// Mutable, non-version-pinned channel tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Tracks released versions; only selectable with an explicit `v` tag.
    Latest,
    /// Work in progress; conflicts with explicit tags.
    Wip,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Latest => "latest",
            Channel::Wip => "wip",
        }
    }
}

/// Validate the channel flag combination before any build starts.
///
/// `--latest` requires an explicit version tag (leading `v`); `--wip`
/// conflicts with both an explicit tag and `--latest`.
pub fn validate_flags(tag: Option<&str>, latest: bool, wip: bool) -> Result<Option<Channel>> {
    if wip && (tag.is_some() || latest) {
        bail!("--wip cannot be combined with --tag or --latest");
    }
    if latest {
        match tag {
            Some(t) if t.starts_with('v') => {}
            _ => bail!("--latest requires an explicit version tag (e.g. --tag v1.2.0)"),
        }
    }
    Ok(match (latest, wip) {
        (true, _) => Some(Channel::Latest),
        (_, true) => Some(Channel::Wip),
        _ => None,
    })
}

/// One source -> destination push pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushEntry {
    pub source: String,
    pub target: String,
}

/// Ordered list of pushes for this run.
#[derive(Debug, Default)]
pub struct PushPlan {
    pub entries: Vec<PushEntry>,
    /// Images excluded because their tag is dirty and no force/channel
    /// override applies.
    pub skipped_dirty: Vec<String>,
}

/// Re-tag an image name onto a channel, preserving the `-debug` suffix.
pub fn channel_target(name: &str, channel: Channel) -> String {
    let (base, tag) = name.rsplit_once(':').unwrap_or((name, ""));
    let channel_tag = if tag.ends_with("-debug") {
        format!("{}-debug", channel.as_str())
    } else {
        channel.as_str().to_string()
    };
    format!("{}:{}", base, channel_tag)
}

fn is_dirty(name: &str) -> bool {
    name.contains("-dirty")
}

/// Compute the push plan for the run's records.
pub fn plan_push(records: &[ImageRecord], force: bool) -> PushPlan {
    let mut plan = PushPlan::default();

    for record in records {
        match record.channel {
            // Channel destinations are clean names by construction; dirty
            // sources may feed them.
            Some(channel) => plan.entries.push(PushEntry {
                source: record.name.clone(),
                target: channel_target(&record.name, channel),
            }),
            None if !is_dirty(&record.name) || force => plan.entries.push(PushEntry {
                source: record.name.clone(),
                target: record.name.clone(),
            }),
            None => plan.skipped_dirty.push(record.name.clone()),
        }
    }

    plan
}

/// Refuse to push a dirty-tagged reference unless forced.
fn ensure_pushable(target: &str, force: bool) -> Result<()> {
    if is_dirty(target) && !force {
        bail!(
            "refusing to push dirty tag: {}\n\
             Commit your changes first, or pass --force.",
            target
        );
    }
    Ok(())
}

/// Execute (or, in dry-run, display) the push plan.
///
/// Returns the pushed (or would-be-pushed) references. In dry-run mode no
/// tag or push call reaches the backend.
pub fn execute(docker: &Docker, plan: &PushPlan, dry_run: bool, force: bool) -> Result<Vec<String>> {
    println!("\n=== {} ===", if dry_run { "Dry run - would push" } else { "Pushing images" });

    for skipped in &plan.skipped_dirty {
        println!("  [SKIP] {} (dirty tag, no --force)", skipped);
    }

    let mut pushed = Vec::new();
    for entry in &plan.entries {
        if dry_run {
            println!("  {} -> {}", entry.source, entry.target);
            pushed.push(entry.target.clone());
            continue;
        }

        if entry.source != entry.target {
            docker.tag(&entry.source, &entry.target)?;
        }
        // Channel targets carry clean names, so force is implied for them.
        ensure_pushable(&entry.target, force)?;
        docker.push(&entry.target)?;
        println!("  [OK] {}", entry.target);
        pushed.push(entry.target.clone());
    }

    println!(
        "\nTotal: {} images {}",
        pushed.len(),
        if dry_run { "would be pushed" } else { "pushed" }
    );
    Ok(pushed)
}

/// One multi-arch manifest merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestMerge {
    pub manifest: String,
    pub images: Vec<String>,
}

/// Plan multi-arch manifests: for each (app, mode) pair, merge every pushed
/// per-platform image sharing the channel tag.
pub fn plan_manifests(
    pushed: &[String],
    apps: &[&str],
    modes: &[BuildMode],
    channel: Channel,
    registry: Option<&str>,
) -> Vec<ManifestMerge> {
    let mut merges = Vec::new();

    for app in apps {
        for mode in modes {
            let tag = match mode {
                BuildMode::Debug => format!("{}-debug", channel.as_str()),
                BuildMode::Release => channel.as_str().to_string(),
            };
            let suffix = format!(":{}", tag);
            let infix = format!("/{}/", app);

            let images: Vec<String> = pushed
                .iter()
                .filter(|img| img.contains(&infix) && img.ends_with(&suffix))
                .cloned()
                .collect();

            if !images.is_empty() {
                merges.push(ManifestMerge {
                    manifest: format!("{}/{}:{}", registry.unwrap_or(DEFAULT_NAMESPACE), app, tag),
                    images,
                });
            }
        }
    }

    merges
}

/// Execute (or display) the planned manifest merges. Merging is skipped
/// entirely in dry-run mode; the plan is only printed.
pub fn execute_manifests(docker: &Docker, merges: &[ManifestMerge], dry_run: bool) -> Result<()> {
    if merges.is_empty() {
        return Ok(());
    }

    println!(
        "\n=== {} ===",
        if dry_run { "Dry run - would merge manifests" } else { "Creating multiarch manifests" }
    );

    for merge in merges {
        if dry_run {
            println!("  {} <- {}", merge.manifest, merge.images.join(", "));
            continue;
        }
        docker.imagetools_create(&merge.manifest, &merge.images)?;
        println!("  [OK] {}", merge.manifest);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, channel: Option<Channel>) -> ImageRecord {
        ImageRecord {
            name: name.to_string(),
            app: "client".to_string(),
            platform: "aarch64-unknown-linux-gnu".to_string(),
            mode: BuildMode::Release,
            channel,
            lib_size: 0,
        }
    }

    #[test]
    fn test_latest_requires_version_tag() {
        assert!(validate_flags(None, true, false).is_err());
        assert!(validate_flags(Some("abc1234"), true, false).is_err());
        assert_eq!(
            validate_flags(Some("v1.2.0"), true, false).unwrap(),
            Some(Channel::Latest)
        );
    }

    #[test]
    fn test_wip_conflicts() {
        assert!(validate_flags(Some("v1.2.0"), false, true).is_err());
        assert!(validate_flags(None, true, true).is_err());
        assert_eq!(validate_flags(None, false, true).unwrap(), Some(Channel::Wip));
    }

    #[test]
    fn test_no_channel() {
        assert_eq!(validate_flags(Some("v1.2.0"), false, false).unwrap(), None);
    }

    #[test]
    fn test_channel_target_preserves_debug() {
        assert_eq!(
            channel_target("forge/client/t:abc1234-dirty-debug", Channel::Wip),
            "forge/client/t:wip-debug"
        );
        assert_eq!(
            channel_target("forge/client/t:v1.2.0", Channel::Latest),
            "forge/client/t:latest"
        );
    }

    #[test]
    fn test_plan_excludes_dirty_without_force() {
        let records = [
            record("forge/client/a:abc1234", None),
            record("forge/client/b:abc1234-dirty", None),
        ];
        let plan = plan_push(&records, false);
        assert_eq!(plan.entries.len(), 1);
        assert_eq!(plan.entries[0].source, "forge/client/a:abc1234");
        assert_eq!(plan.skipped_dirty, vec!["forge/client/b:abc1234-dirty"]);
    }

    #[test]
    fn test_plan_force_includes_dirty() {
        let records = [record("forge/client/b:abc1234-dirty", None)];
        let plan = plan_push(&records, true);
        assert_eq!(plan.entries.len(), 1);
        assert_eq!(plan.entries[0].target, "forge/client/b:abc1234-dirty");
    }

    #[test]
    fn test_plan_channel_retags_dirty_to_clean() {
        let records = [record("forge/client/b:abc1234-dirty", Some(Channel::Wip))];
        let plan = plan_push(&records, false);
        assert_eq!(plan.entries.len(), 1);
        assert_eq!(plan.entries[0].target, "forge/client/b:wip");
        assert!(plan.skipped_dirty.is_empty());
    }

    #[test]
    fn test_dry_run_issues_no_backend_calls() {
        // A plan against an unreachable backend: execute in dry-run must
        // succeed because it never invokes docker.
        let records = [record("forge/client/a:abc1234", None)];
        let plan = plan_push(&records, false);
        let docker = Docker::new(false);
        let pushed = execute(&docker, &plan, true, false).unwrap();
        assert_eq!(pushed, vec!["forge/client/a:abc1234"]);
    }

    #[test]
    fn test_plan_manifests_groups_by_app_and_mode() {
        let pushed = vec![
            "ghcr.io/forgeproject/client/aarch64-unknown-linux-gnu:wip".to_string(),
            "ghcr.io/forgeproject/client/armv6-unknown-linux-gnueabihf:wip".to_string(),
            "ghcr.io/forgeproject/relay/aarch64-unknown-linux-gnu:wip-debug".to_string(),
        ];
        let merges = plan_manifests(
            &pushed,
            &["client", "relay"],
            &[BuildMode::Release, BuildMode::Debug],
            Channel::Wip,
            Some("ghcr.io/forgeproject"),
        );

        assert_eq!(merges.len(), 2);
        assert_eq!(merges[0].manifest, "ghcr.io/forgeproject/client:wip");
        assert_eq!(merges[0].images.len(), 2);
        assert_eq!(merges[1].manifest, "ghcr.io/forgeproject/relay:wip-debug");
    }
}
