//! Final image assembler: runtime base + staged artifacts, publishable name.

use anyhow::{Context, Result};
use std::path::Path;

use crate::docker::{Docker, ImageBuild};
use crate::registry::{AppSpec, PlatformSpec};

use super::runtime_image;

/// Namespace used for final image names when no registry is given.
pub const DEFAULT_NAMESPACE: &str = "forge";

/// Source-provenance label applied to every final image.
const SOURCE_URL: &str = "https://github.com/forgeproject/imageforge";

/// Publishable image name: `{registry-or-namespace}/{app}/{triple}:{tag}`.
pub fn image_name(registry: Option<&str>, app: &str, triple: &str, tag: &str) -> String {
    format!(
        "{}/{}/{}:{}",
        registry.unwrap_or(DEFAULT_NAMESPACE),
        app,
        triple,
        tag
    )
}

/// Build the final application image from the runtime base and the staging
/// directory, embedding the target binary name and a source label.
pub fn build(
    docker: &Docker,
    docker_dir: &Path,
    platform: &PlatformSpec,
    app: &AppSpec,
    staging: &Path,
    name: &str,
) -> Result<()> {
    let image = ImageBuild::new(docker_dir.join(app.dockerfile), name, staging)
        .platform(platform.platform)
        .build_arg("RUNTIME_BASE", runtime_image(platform.triple))
        .build_arg("TARGET", app.target)
        .label("org.opencontainers.image.source", SOURCE_URL);

    docker
        .build(&image)
        .with_context(|| format!("final image failed for {}", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_name_with_registry() {
        assert_eq!(
            image_name(Some("ghcr.io/forgeproject"), "client", "aarch64-unknown-linux-gnu", "v1.2.0"),
            "ghcr.io/forgeproject/client/aarch64-unknown-linux-gnu:v1.2.0"
        );
    }

    #[test]
    fn test_image_name_default_namespace() {
        assert_eq!(
            image_name(None, "relay", "linux-triple", "abc1234-debug"),
            "forge/relay/linux-triple:abc1234-debug"
        );
    }
}
