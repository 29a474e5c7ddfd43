//! imageforge - multi-platform container image builder.
//!
//! # Usage
//!
//! ```bash
//! # Build every app for every platform (release)
//! imageforge
//!
//! # One platform, debug and release
//! imageforge -p aarch64-unknown-linux-gnu -m all
//!
//! # Tagged release, pushed with a latest channel and multiarch manifests
//! imageforge -t v1.2.0 --latest --push --multiarch -r ghcr.io/forgeproject
//!
//! # Show the push plan without touching the registry
//! imageforge --push --dry-run
//! ```
//!
//! Execution is strictly sequential: platforms, then build modes, then
//! apps, then stages. The first failing stage aborts the whole run.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;

use imageforge::build::{self, ArtifactCache, BuildContext};
use imageforge::docker::Docker;
use imageforge::registry::{self, AppSpec, BuildMode, PlatformSpec};
use imageforge::vcs::{self, Provenance, VcsError};
use imageforge::{preflight, publish, report};

#[derive(Parser)]
#[command(name = "imageforge")]
#[command(author, version, about = "Build and push multi-platform container images", long_about = None)]
struct Cli {
    /// Platform to build (repeatable, or "all"; default: all)
    #[arg(short, long = "platform")]
    platform: Vec<String>,

    /// Application to build (repeatable, or "all"; default: all)
    #[arg(short, long = "app")]
    app: Vec<String>,

    /// Build mode (repeatable, or "all"; default: release)
    #[arg(short = 'm', long = "build-mode")]
    build_mode: Vec<String>,

    /// Push images after building
    #[arg(long)]
    push: bool,

    /// Show the full push plan without issuing any registry operation
    #[arg(long)]
    dry_run: bool,

    /// Container registry namespace (default: local "forge" namespace)
    #[arg(short, long)]
    registry: Option<String>,

    /// Image tag (default: derived from git state)
    #[arg(short, long)]
    tag: Option<String>,

    /// Also push under the "latest" channel (requires a v-prefixed --tag)
    #[arg(long)]
    latest: bool,

    /// Push under the "wip" channel (conflicts with --tag and --latest)
    #[arg(long)]
    wip: bool,

    /// Push even when the tag is dirty
    #[arg(long)]
    force: bool,

    /// Merge per-platform images into multiarch manifests after pushing
    #[arg(long)]
    multiarch: bool,

    /// Use --network=host for all image builds
    #[arg(long)]
    network_host: bool,

    /// Remove cached artifact and compile-cache images first
    /// (builder/toolchain images are kept)
    #[arg(long)]
    clean: bool,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    // All validation happens before any image build starts.
    preflight::check_docker()?;

    let channel = publish::validate_flags(cli.tag.as_deref(), cli.latest, cli.wip)?;
    if cli.multiarch && channel.is_none() {
        bail!("--multiarch requires a channel (--latest or --wip) shared by all platforms");
    }

    let all_platforms = registry::default_platforms()?;
    let all_apps = registry::default_apps();

    let platforms = select_platforms(&cli.platform, &all_platforms)?;
    let apps = select_apps(&cli.app, &all_apps)?;
    let modes = select_modes(&cli.build_mode)?;

    let project_root = std::env::current_dir().context("resolving project root")?;
    let docker_dir = project_root.join("docker");
    if !docker_dir.is_dir() {
        bail!(
            "docker directory not found at {}\n\
             Run imageforge from the project root.",
            docker_dir.display()
        );
    }

    let (provenance, base_tag) = resolve_provenance(&cli, &project_root)?;

    let docker = Docker::new(cli.network_host);

    // The registry namespace only matters for names that will be pushed.
    let registry_ns = if cli.push || cli.dry_run {
        cli.registry.as_deref()
    } else {
        None
    };

    if cli.clean {
        build::clean_build_cache(&docker, &modes, &platforms)?;
    }

    // Builder images first; no partial builder set is tolerated.
    for platform in &platforms {
        build::builder::build(&docker, &docker_dir, platform)?;
    }

    let ctx = BuildContext {
        docker: &docker,
        docker_dir: docker_dir.as_path(),
        project_root: project_root.as_path(),
        provenance: &provenance,
        base_tag: base_tag.as_str(),
        registry: registry_ns,
    };

    let mut cache = ArtifactCache::new();
    let mut records = Vec::new();

    for mode in &modes {
        for app in &apps {
            for platform in &platforms {
                let record = build::run(&ctx, app, platform, *mode, &mut cache, channel)
                    .with_context(|| {
                        format!(
                            "build failed for {} on {} ({}); see the build output above",
                            app.name, platform.triple, mode
                        )
                    })?;
                records.push(record);
            }
        }
    }

    println!("\nAll builds completed successfully!");
    report::print_summary(&docker, &records)?;

    if cli.push || cli.dry_run {
        let plan = publish::plan_push(&records, cli.force);
        let pushed = publish::execute(&docker, &plan, cli.dry_run, cli.force)?;

        if cli.multiarch {
            let app_names: Vec<&str> = apps.iter().map(|a| a.name).collect();
            let merges = publish::plan_manifests(
                &pushed,
                &app_names,
                &modes,
                channel.expect("validated above"),
                registry_ns,
            );
            publish::execute_manifests(&docker, &merges, cli.dry_run)?;
        }
    }

    Ok(())
}

/// Resolve version-control provenance and the effective base tag.
///
/// "No repository" falls back to the default literal; any other git failure
/// aborts the run rather than silently mistagging images.
fn resolve_provenance(cli: &Cli, project_root: &PathBuf) -> Result<(Provenance, String)> {
    let (provenance, derived) = match vcs::query(project_root) {
        Ok(p) => {
            let tag = vcs::derive_tag(&p);
            (p, tag)
        }
        Err(VcsError::NotARepository) => {
            if cli.tag.is_none() {
                println!(
                    "No git repository found; tagging as '{}'",
                    vcs::FALLBACK_TAG
                );
            }
            (Provenance::unknown(), vcs::FALLBACK_TAG.to_string())
        }
        Err(e @ VcsError::QueryFailed(_)) => return Err(e.into()),
    };

    let base_tag = cli.tag.clone().unwrap_or(derived);
    Ok((provenance, base_tag))
}

fn select_platforms<'a>(
    requested: &[String],
    all: &'a [PlatformSpec],
) -> Result<Vec<&'a PlatformSpec>> {
    if requested.is_empty() || requested.iter().any(|r| r == "all") {
        return Ok(all.iter().collect());
    }
    requested
        .iter()
        .map(|r| registry::find_platform(all, r))
        .collect()
}

fn select_apps<'a>(requested: &[String], all: &'a [AppSpec]) -> Result<Vec<&'a AppSpec>> {
    if requested.is_empty() || requested.iter().any(|r| r == "all") {
        return Ok(all.iter().collect());
    }
    requested.iter().map(|r| registry::find_app(all, r)).collect()
}

fn select_modes(requested: &[String]) -> Result<Vec<BuildMode>> {
    if requested.is_empty() {
        return Ok(vec![BuildMode::Release]);
    }
    if requested.iter().any(|r| r == "all") {
        return Ok(BuildMode::ALL.to_vec());
    }
    requested
        .iter()
        .map(|r| {
            BuildMode::parse(r)
                .ok_or_else(|| anyhow::anyhow!("unknown build mode '{}' (debug, release, all)", r))
        })
        .collect()
}
