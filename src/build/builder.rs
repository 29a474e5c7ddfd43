//! Builder stage: one compiler/toolchain image per platform.

use anyhow::{Context, Result};
use std::path::Path;

use crate::docker::{Docker, ImageBuild};
use crate::registry::{BuilderKind, PlatformSpec};

use super::builder_image;

/// Build the builder image for a platform.
///
/// Cross platforms get a crosstool toolchain image parameterized by the
/// platform triple and its config path; native platforms build their
/// declared builder dockerfile under the target container platform.
pub fn build(docker: &Docker, docker_dir: &Path, platform: &PlatformSpec) -> Result<()> {
    let tag = builder_image(platform.triple);

    let image = match &platform.builder {
        BuilderKind::Cross { config, .. } => {
            println!("\n=== Building crosstool builder for {} ===", platform.triple);
            ImageBuild::new(docker_dir.join("Dockerfile.crosstool"), tag, docker_dir)
                .build_arg("PLATFORM", platform.triple)
                .build_arg("CONFIG_PATH", *config)
        }
        BuilderKind::Native { dockerfile } => {
            println!("\n=== Building builder for {} ===", platform.triple);
            ImageBuild::new(docker_dir.join(*dockerfile), tag, docker_dir)
                .platform(platform.platform)
        }
    };

    docker
        .build(&image)
        .with_context(|| format!("builder image failed for {}", platform.triple))
}
