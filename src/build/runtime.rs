//! Runtime composer: minimal per-platform runtime base image.

use anyhow::{Context, Result};
use std::path::Path;

use crate::docker::{Docker, ImageBuild};
use crate::registry::PlatformSpec;

use super::runtime_image;

/// Build the runtime base image from the platform's runtime dockerfile.
///
/// For cross builds the resolved toolchain tuple is passed through, so the
/// runtime knows the `libs/{tuple}/` staging layout to install from.
pub fn build(
    docker: &Docker,
    docker_dir: &Path,
    platform: &PlatformSpec,
    tuple: Option<&str>,
    staging: &Path,
) -> Result<()> {
    let tag = runtime_image(platform.triple);

    let mut image = ImageBuild::new(docker_dir.join(platform.runtime), tag, staging)
        .platform(platform.platform);
    if let Some(tuple) = tuple {
        image = image.build_arg("TUPLE", tuple);
    }

    docker
        .build(&image)
        .with_context(|| format!("runtime image failed for {}", platform.triple))
}
