//! The per-build pipeline: artifact compilation, dependency extraction,
//! runtime composition, and final image assembly.
//!
//! # Flow
//!
//! ```text
//! builder image (once per platform)
//!         ↓
//! artifact image        Dockerfile.build.{mode}, run-scoped cache
//!         ↓
//! staging directory     docker create + cp, TempDir (removed on drop)
//!         ↓
//! [cross only] libs/{tuple}/   NEEDED closure + dynamic linker from sysroot
//!         ↓
//! runtime base image    platform runtime dockerfile
//!         ↓
//! final image           {registry|forge}/{app}/{triple}:{tag}
//! ```
//!
//! Execution is strictly sequential and fail-fast: any stage error aborts
//! the entire run. The staging directory and the artifact cache are shared
//! mutable state and are safe only because nothing runs concurrently.

pub mod artifact;
pub mod assemble;
pub mod builder;
pub mod extract;
pub mod runtime;

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;

use crate::docker::Docker;
use crate::publish::Channel;
use crate::registry::{AppSpec, BuildMode, PlatformSpec};
use crate::vcs::{self, Provenance};

/// Builder image name for a platform.
pub fn builder_image(triple: &str) -> String {
    format!("forge-builder:{}", triple)
}

/// Artifact image name. The name is the artifact's identity:
/// (platform, build mode, tag), with the mode folded into the tag suffix.
pub fn artifact_image(tag: &str, triple: &str) -> String {
    format!("forge-artifact:{}-{}", tag, triple)
}

/// Runtime base image name for a platform.
pub fn runtime_image(triple: &str) -> String {
    format!("forge-runtime:{}", triple)
}

/// Deterministic build-cache key for the backend's cache mounts.
pub fn cache_id(mode: BuildMode, triple: &str) -> String {
    format!("forge-cache-{}-{}", mode, triple)
}

/// Run-scoped set of artifact identities already built.
///
/// Multiple apps share one artifact image per (platform, mode, tag); the
/// cache guarantees the compile step runs at most once per identity.
#[derive(Default)]
pub struct ArtifactCache {
    built: HashSet<String>,
}

impl ArtifactCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, image: &str) -> bool {
        self.built.contains(image)
    }

    pub fn mark_built(&mut self, image: &str) {
        self.built.insert(image.to_string());
    }
}

/// Everything a single build needs, fixed for the whole run.
pub struct BuildContext<'a> {
    pub docker: &'a Docker,
    /// Directory containing all dockerfiles and crosstool configs.
    pub docker_dir: &'a Path,
    /// Source tree root; build context for artifact compilation.
    pub project_root: &'a Path,
    pub provenance: &'a Provenance,
    /// Effective base tag (override or derived), before mode suffixing.
    pub base_tag: &'a str,
    /// Registry namespace for final image names, when publishing.
    pub registry: Option<&'a str>,
}

/// One successfully built image, as recorded for reporting and publishing.
#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub name: String,
    pub app: String,
    pub platform: String,
    pub mode: BuildMode,
    /// Channel this image will be re-tagged to on push, if any.
    pub channel: Option<Channel>,
    /// Total bytes of staged cross-compilation libraries (0 for native).
    pub lib_size: u64,
}

/// Build one app for one platform in one mode, start to finish.
pub fn run(
    ctx: &BuildContext,
    app: &AppSpec,
    platform: &PlatformSpec,
    mode: BuildMode,
    cache: &mut ArtifactCache,
    channel: Option<Channel>,
) -> Result<ImageRecord> {
    println!(
        "\n=== Building {} for {} ({}) ===",
        app.name, platform.triple, mode
    );

    let tag = vcs::resolve_tag(ctx.base_tag, mode);

    let artifact = artifact::build(ctx, platform, mode, &tag, cache)?;

    // Staging directory lives exactly as long as this build; TempDir drop
    // removes it on every exit path, including errors below.
    let staged = extract::stage(ctx.docker, &artifact, app, platform)?;

    runtime::build(
        ctx.docker,
        ctx.docker_dir,
        platform,
        staged.tuple.as_deref(),
        staged.dir.path(),
    )?;

    let name = assemble::image_name(ctx.registry, app.name, platform.triple, &tag);
    assemble::build(ctx.docker, ctx.docker_dir, platform, app, staged.dir.path(), &name)?;

    Ok(ImageRecord {
        name,
        app: app.name.to_string(),
        platform: platform.triple.to_string(),
        mode,
        channel,
        lib_size: staged.lib_size,
    })
}

/// Remove cached intermediate images for the selected modes and platforms.
///
/// Artifact and compile-cache images are cheap to reproduce; crosstool
/// builder images are not, so `forge-builder:*` is deliberately preserved.
pub fn clean_build_cache(
    docker: &Docker,
    modes: &[BuildMode],
    platforms: &[&PlatformSpec],
) -> Result<()> {
    println!("\n=== Cleaning build cache (keeping builder images) ===");

    for mode in modes {
        for platform in platforms {
            let cache = cache_id(*mode, platform.triple);
            for id in docker
                .image_ids(&cache)
                .with_context(|| format!("listing cache images for {}", cache))?
            {
                println!("  Removing: {} ({})", cache, id);
                docker.rmi(&id)?;
            }
        }
    }

    for platform in platforms {
        let pattern = format!("forge-artifact:*-{}", platform.triple);
        for id in docker
            .image_ids(&pattern)
            .with_context(|| format!("listing artifact images for {}", platform.triple))?
        {
            println!("  Removing artifact image {}", id);
            docker.rmi(&id)?;
        }
    }

    println!("  Build cache cleaned (builder images preserved)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_names() {
        assert_eq!(
            builder_image("aarch64-unknown-linux-gnu"),
            "forge-builder:aarch64-unknown-linux-gnu"
        );
        assert_eq!(
            artifact_image("abc1234-debug", "aarch64-unknown-linux-gnu"),
            "forge-artifact:abc1234-debug-aarch64-unknown-linux-gnu"
        );
        assert_eq!(
            cache_id(BuildMode::Release, "x86_64-unknown-linux-gnu"),
            "forge-cache-release-x86_64-unknown-linux-gnu"
        );
    }

    #[test]
    fn test_artifact_cache_tracks_identities() {
        let mut cache = ArtifactCache::new();
        let image = artifact_image("abc1234", "aarch64-unknown-linux-gnu");
        assert!(!cache.contains(&image));
        cache.mark_built(&image);
        assert!(cache.contains(&image));

        // Distinct identities are tracked independently.
        let debug = artifact_image("abc1234-debug", "aarch64-unknown-linux-gnu");
        assert!(!cache.contains(&debug));
    }
}
