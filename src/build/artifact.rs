//! Artifact stage: compile one app's platform/mode artifact inside a
//! container, with a run-scoped cache preventing duplicate compiles.

use anyhow::{Context, Result};

use crate::docker::ImageBuild;
use crate::registry::{BuilderKind, BuildMode, PlatformSpec};

use super::{artifact_image, builder_image, cache_id, ArtifactCache, BuildContext};

/// Build (or reuse) the artifact image for (platform, mode, tag).
///
/// Returns the artifact image name. When the identity is already in the
/// run-scoped cache the compile step is skipped entirely; this happens when
/// several apps share one platform/mode/tag.
pub fn build(
    ctx: &BuildContext,
    platform: &PlatformSpec,
    mode: BuildMode,
    tag: &str,
    cache: &mut ArtifactCache,
) -> Result<String> {
    let image = artifact_image(tag, platform.triple);

    if cache.contains(&image) {
        println!("[SKIP] Artifact {} already built this run", image);
        return Ok(image);
    }

    let dockerfile = ctx.docker_dir.join(format!("Dockerfile.build.{}", mode));

    let mut compile = ImageBuild::new(dockerfile, image.as_str(), ctx.project_root)
        .build_arg("BUILDER_IMAGE", builder_image(platform.triple))
        .build_arg("BUILD_CACHE_ID", cache_id(mode, platform.triple))
        .build_arg("GIT_COMMIT_HASH", ctx.provenance.commit.as_str())
        .build_arg("GIT_BRANCH", ctx.provenance.branch.as_str())
        .build_arg("GIT_DIRTY", if ctx.provenance.dirty { "1" } else { "0" });

    // Cross artifact builds run a host-arch image containing the cross
    // compiler; only native builds are pinned to the target platform.
    match &platform.builder {
        BuilderKind::Native { .. } => {
            compile = compile.platform(platform.platform);
        }
        BuilderKind::Cross { toolchain_file, .. } => {
            compile = compile.build_arg("TOOLCHAIN_FILE", *toolchain_file);
        }
    }

    if let Some(extra) = platform.extra_build_args {
        compile = compile.build_arg("EXTRA_BUILD_ARGS", extra);
    }

    ctx.docker
        .build(&compile)
        .with_context(|| format!("artifact build failed for {} ({})", platform.triple, mode))?;

    cache.mark_built(&image);
    Ok(image)
}
