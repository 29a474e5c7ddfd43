//! Typed wrappers over the container build backend.
//!
//! Every docker invocation the pipeline issues goes through [`Docker`], which
//! carries the run-wide `--network=host` setting. [`ImageBuild`] assembles
//! `docker build` argument lists as a pure value so the composition is
//! testable without a daemon.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::process::Cmd;

/// Container build backend handle.
#[derive(Debug, Clone)]
pub struct Docker {
    /// Pass `--network=host` to every build.
    pub network_host: bool,
}

/// One `docker build` invocation.
#[derive(Debug, Clone)]
pub struct ImageBuild {
    pub dockerfile: PathBuf,
    pub tag: String,
    pub context: PathBuf,
    /// Container platform id (`linux/arm64`), when the build is pinned.
    pub platform: Option<String>,
    pub build_args: Vec<(String, String)>,
    pub labels: Vec<(String, String)>,
}

impl ImageBuild {
    pub fn new(dockerfile: impl Into<PathBuf>, tag: impl Into<String>, context: impl Into<PathBuf>) -> Self {
        Self {
            dockerfile: dockerfile.into(),
            tag: tag.into(),
            context: context.into(),
            platform: None,
            build_args: Vec::new(),
            labels: Vec::new(),
        }
    }

    pub fn platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    pub fn build_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.build_args.push((key.into(), value.into()));
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((key.into(), value.into()));
        self
    }

    /// Argument list after `docker build`, in invocation order.
    pub fn to_args(&self, network_host: bool) -> Vec<String> {
        let mut args = Vec::new();
        if network_host {
            args.push("--network=host".to_string());
        }
        if let Some(platform) = &self.platform {
            args.push("--platform".to_string());
            args.push(platform.clone());
        }
        for (key, value) in &self.build_args {
            args.push("--build-arg".to_string());
            args.push(format!("{}={}", key, value));
        }
        for (key, value) in &self.labels {
            args.push("--label".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push("-f".to_string());
        args.push(self.dockerfile.display().to_string());
        args.push("-t".to_string());
        args.push(self.tag.clone());
        args.push(self.context.display().to_string());
        args
    }
}

impl Docker {
    pub fn new(network_host: bool) -> Self {
        Self { network_host }
    }

    /// Build an image, streaming backend output to the terminal.
    pub fn build(&self, build: &ImageBuild) -> Result<()> {
        Cmd::new("docker")
            .arg("build")
            .args(build.to_args(self.network_host))
            .run_streamed()
            .with_context(|| format!("docker build failed for {}", build.tag))
    }

    /// Create a stopped container from an image, returning its id.
    pub fn create(&self, image: &str) -> Result<String> {
        let out = Cmd::new("docker")
            .args(["create", image])
            .run()
            .with_context(|| format!("docker create failed for {}", image))?;
        Ok(out.stdout_trimmed())
    }

    /// Copy a path out of (or into) a container.
    pub fn cp(&self, from: &str, to: &str) -> Result<()> {
        Cmd::new("docker").args(["cp", from, to]).run()?;
        Ok(())
    }

    /// Remove a container.
    pub fn rm(&self, container: &str) -> Result<()> {
        Cmd::new("docker").args(["rm", container]).run()?;
        Ok(())
    }

    /// Run a command in an ephemeral container and capture stdout.
    pub fn run_capture(&self, image: &str, mounts: &[(&Path, &str)], cmd: &[&str]) -> Result<String> {
        let mut invocation = Cmd::new("docker").args(["run", "--rm"]);
        for (host, guest) in mounts {
            invocation = invocation
                .arg("-v")
                .arg(format!("{}:{}", host.display(), guest));
        }
        let out = invocation
            .arg(image)
            .args(cmd.iter().copied())
            .run()
            .with_context(|| format!("docker run failed for {}", image))?;
        Ok(out.stdout)
    }

    /// Tag an image under an additional name.
    pub fn tag(&self, source: &str, target: &str) -> Result<()> {
        Cmd::new("docker").args(["tag", source, target]).run()?;
        Ok(())
    }

    /// Push an image to its registry.
    pub fn push(&self, image: &str) -> Result<()> {
        Cmd::new("docker")
            .args(["push", image])
            .run_streamed()
            .with_context(|| format!("docker push failed for {}", image))
    }

    /// Local image ids matching a repository[:tag] pattern.
    pub fn image_ids(&self, pattern: &str) -> Result<Vec<String>> {
        let out = Cmd::new("docker").args(["images", "-q", pattern]).run()?;
        Ok(out
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    /// Force-remove an image by id or name. Failure is not fatal.
    pub fn rmi(&self, image: &str) -> Result<()> {
        Cmd::new("docker")
            .args(["rmi", "-f", image])
            .allow_fail()
            .run()?;
        Ok(())
    }

    /// Total image size in bytes.
    pub fn inspect_size(&self, image: &str) -> Result<u64> {
        let out = Cmd::new("docker")
            .args(["inspect", "--format", "{{.Size}}", image])
            .run()
            .with_context(|| format!("docker inspect failed for {}", image))?;
        out.stdout_trimmed()
            .parse()
            .with_context(|| format!("unparseable image size for {}", image))
    }

    /// Layer history as (human size, creating step) pairs.
    pub fn history(&self, image: &str) -> Result<Vec<(String, String)>> {
        let out = Cmd::new("docker")
            .args([
                "history",
                "--no-trunc",
                "--format",
                "{{.Size}}\t{{.CreatedBy}}",
                image,
            ])
            .run()
            .with_context(|| format!("docker history failed for {}", image))?;
        Ok(out
            .stdout
            .lines()
            .filter_map(|line| {
                let (size, created_by) = line.split_once('\t')?;
                Some((size.to_string(), created_by.to_string()))
            })
            .collect())
    }

    /// Merge already-pushed per-platform images into one manifest reference.
    pub fn imagetools_create(&self, manifest: &str, images: &[String]) -> Result<()> {
        Cmd::new("docker")
            .args(["buildx", "imagetools", "create", "-t", manifest])
            .args(images.iter().cloned())
            .run_streamed()
            .with_context(|| format!("imagetools create failed for {}", manifest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_args_minimal() {
        let build = ImageBuild::new("docker/Dockerfile.target", "forge/client:abc", "/tmp/ctx");
        let args = build.to_args(false);
        assert_eq!(
            args,
            vec!["-f", "docker/Dockerfile.target", "-t", "forge/client:abc", "/tmp/ctx"]
        );
    }

    #[test]
    fn test_build_args_full() {
        let build = ImageBuild::new("f", "t", "ctx")
            .platform("linux/arm64")
            .build_arg("BUILDER_IMAGE", "forge-builder:aarch64")
            .label("org.opencontainers.image.source", "https://example.org");
        let args = build.to_args(true);
        assert_eq!(args[0], "--network=host");
        assert_eq!(&args[1..3], &["--platform", "linux/arm64"]);
        assert!(args.contains(&"BUILDER_IMAGE=forge-builder:aarch64".to_string()));
        assert!(args.contains(&"org.opencontainers.image.source=https://example.org".to_string()));
    }

    #[test]
    fn test_network_host_omitted() {
        let build = ImageBuild::new("f", "t", "ctx");
        assert!(!build.to_args(false).contains(&"--network=host".to_string()));
    }
}
