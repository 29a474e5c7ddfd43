//! Host tool validation before the pipeline starts.

use anyhow::{bail, Result};

use crate::process::exists;

/// Check that the container backend is available.
///
/// Everything else the pipeline needs (readelf, find, the compilers) lives
/// inside the builder images, so docker is the only hard host requirement.
pub fn check_docker() -> Result<()> {
    if !exists("docker") {
        bail!(
            "docker not found on PATH.\n\
             Install Docker (with buildx for --multiarch) before building."
        );
    }
    Ok(())
}
