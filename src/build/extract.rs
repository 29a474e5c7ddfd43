//! Dependency extractor: stage compiled artifacts and, for cross builds,
//! the minimal shared-library closure the binary needs.
//!
//! Library discovery reads the binary's dynamic section with `readelf -d`
//! rather than `ldd`: readelf inspects ELF headers directly, so it works on
//! foreign-architecture binaries the host loader cannot execute. For every
//! NEEDED SONAME the crosstool sysroot is searched for `{soname}*`, which
//! captures the base file plus its major/minor version symlink chain. The
//! dynamic linker is copied unconditionally - it is the program interpreter,
//! not a NEEDED entry.

use anyhow::{bail, Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tempfile::TempDir;

use crate::docker::Docker;
use crate::registry::{AppSpec, PlatformSpec};

/// Staged build outputs for one build operation.
///
/// The directory is exclusively owned by the operation and removed on drop,
/// on every exit path.
pub struct StagedArtifacts {
    pub dir: TempDir,
    /// Toolchain target tuple, resolved for cross builds only.
    pub tuple: Option<String>,
    /// Total bytes of staged libraries (0 for native builds).
    pub lib_size: u64,
}

/// Copy the artifact image's outputs into a fresh staging directory and,
/// for cross platforms, resolve and stage the library closure.
pub fn stage(
    docker: &Docker,
    artifact_image: &str,
    app: &AppSpec,
    platform: &PlatformSpec,
) -> Result<StagedArtifacts> {
    let dir = tempfile::Builder::new()
        .prefix("forge-artifacts-")
        .tempdir()
        .context("creating staging directory")?;

    let container = docker.create(artifact_image)?;
    let result = stage_inner(docker, &container, artifact_image, dir.path(), app, platform);
    // The container is removed whether staging succeeded or not.
    let removed = docker.rm(&container);

    let (tuple, lib_size) = result?;
    removed?;

    Ok(StagedArtifacts {
        dir,
        tuple,
        lib_size,
    })
}

fn stage_inner(
    docker: &Docker,
    container: &str,
    artifact_image: &str,
    staging: &Path,
    app: &AppSpec,
    platform: &PlatformSpec,
) -> Result<(Option<String>, u64)> {
    // The artifacts directory holds the built executables.
    docker
        .cp(
            &format!("{}:/artifacts/.", container),
            &staging.display().to_string(),
        )
        .context("copying artifacts out of the container")?;

    if !platform.is_cross() {
        return Ok((None, 0));
    }

    let tuple = resolve_tuple(docker, artifact_image)?;
    println!("Toolchain tuple: {}", tuple);

    let libs_dir = staging.join("libs").join(&tuple);
    fs::create_dir_all(&libs_dir)?;

    let needed = read_needed_libraries(docker, artifact_image, staging, app.target)?;
    println!(
        "Required libraries: {}",
        needed.iter().cloned().collect::<Vec<_>>().join(", ")
    );

    let sysroot_lib = format!("/home/builder/x-tools/{0}/{0}/sysroot/lib", tuple);

    for soname in &needed {
        copy_matching(docker, container, artifact_image, &sysroot_lib, soname, &libs_dir)
            .with_context(|| format!("staging {}", soname))?;
    }

    // The program interpreter never appears as a NEEDED entry; stage it
    // regardless.
    copy_matching(
        docker,
        container,
        artifact_image,
        &sysroot_lib,
        "ld-linux*.so*",
        &libs_dir,
    )
    .context("staging the dynamic linker")?;

    prune_non_runtime(&libs_dir)?;
    let lib_size = report_staged(&libs_dir)?;

    Ok((Some(tuple), lib_size))
}

/// Resolve the crosstool target tuple by inspecting the toolchain install
/// directory inside the artifact image.
fn resolve_tuple(docker: &Docker, artifact_image: &str) -> Result<String> {
    let out = docker.run_capture(
        artifact_image,
        &[],
        &["sh", "-c", "basename /home/builder/x-tools/*"],
    )?;
    let tuple = out.trim().to_string();
    if tuple.is_empty() || tuple.contains('*') {
        bail!(
            "could not resolve toolchain tuple in {} (got '{}')",
            artifact_image,
            tuple
        );
    }
    Ok(tuple)
}

/// Read the binary's NEEDED entries via readelf inside the artifact image.
fn read_needed_libraries(
    docker: &Docker,
    artifact_image: &str,
    staging: &Path,
    target: &str,
) -> Result<BTreeSet<String>> {
    let binary = format!("/artifacts/{}", target);
    let out = docker
        .run_capture(
            artifact_image,
            &[(staging, "/artifacts")],
            &["readelf", "-d", &binary],
        )
        .with_context(|| format!("readelf failed for {}", target))?;

    let needed = parse_needed(&out);
    if needed.is_empty() {
        println!("  (no NEEDED entries - statically linked?)");
    }
    Ok(needed)
}

/// Extract NEEDED SONAMEs from `readelf -d` output.
///
/// Lines look like:
/// `0x0000000000000001 (NEEDED)  Shared library: [libc.so.6]`
pub fn parse_needed(output: &str) -> BTreeSet<String> {
    output
        .lines()
        .filter(|line| line.contains("NEEDED"))
        .filter_map(|line| {
            let start = line.find('[')? + 1;
            let end = line[start..].find(']')? + start;
            Some(line[start..end].to_string())
        })
        .collect()
}

/// Copy every sysroot file matching `{pattern}*` into the staging libs dir.
///
/// The trailing wildcard captures version-suffixed symlink chains
/// (`libc.so.6`, `libc-2.31.so`). Patterns that already contain a wildcard
/// are used as-is.
fn copy_matching(
    docker: &Docker,
    container: &str,
    artifact_image: &str,
    sysroot_lib: &str,
    pattern: &str,
    libs_dir: &Path,
) -> Result<()> {
    let find_pattern = if pattern.contains('*') {
        pattern.to_string()
    } else {
        format!("{}*", pattern)
    };

    let out = docker.run_capture(
        artifact_image,
        &[],
        &["find", sysroot_lib, "-name", &find_pattern],
    )?;

    for path in out.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let name = Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("bad sysroot path: {}", path))?;
        docker.cp(
            &format!("{}:{}", container, path),
            &libs_dir.join(name).display().to_string(),
        )?;
    }

    Ok(())
}

/// Whether a staged file is a runtime shared object (as opposed to a static
/// archive, object file, or toolchain metadata).
pub fn is_runtime_object(name: &str) -> bool {
    const NON_RUNTIME: &[&str] = &[".a", ".la", ".o", ".py", ".json"];
    !NON_RUNTIME.iter().any(|ext| name.ends_with(ext))
}

/// Remove everything that is not a runtime shared object from the staging
/// directory, and make the remaining files owner-writable (docker cp
/// preserves sysroot permissions).
pub fn prune_non_runtime(libs_dir: &Path) -> Result<()> {
    for entry in fs::read_dir(libs_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !is_runtime_object(&name) {
            fs::remove_file(&path)?;
            continue;
        }
        let mut perms = fs::metadata(&path)?.permissions();
        perms.set_mode(perms.mode() | 0o600);
        fs::set_permissions(&path, perms)?;
    }
    Ok(())
}

/// Print per-file sizes and return the total staged byte count.
fn report_staged(libs_dir: &Path) -> Result<u64> {
    let mut entries: Vec<_> = fs::read_dir(libs_dir)?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .filter(|e| e.path().is_file())
        .collect();
    entries.sort_by_key(|e| e.file_name());

    println!("\nStaged libraries:");
    let mut total = 0u64;
    for entry in entries {
        let size = fs::metadata(entry.path())?.len();
        total += size;
        println!("  {:40} {:>12} bytes", entry.file_name().to_string_lossy(), size);
    }
    println!(
        "Total library size: {} bytes ({:.2} MB)",
        total,
        total as f64 / 1024.0 / 1024.0
    );

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    const READELF_OUTPUT: &str = "
Dynamic section at offset 0x7ad8 contains 29 entries:
  Tag        Type                         Name/Value
 0x0000000000000001 (NEEDED)             Shared library: [libm.so.6]
 0x0000000000000001 (NEEDED)             Shared library: [libc.so.6]
 0x000000000000000c (INIT)               0x1a2b8
 0x0000000000000019 (INIT_ARRAY)         0x7b018
";

    #[test]
    fn test_parse_needed() {
        let needed = parse_needed(READELF_OUTPUT);
        assert_eq!(needed.len(), 2);
        assert!(needed.contains("libc.so.6"));
        assert!(needed.contains("libm.so.6"));
    }

    #[test]
    fn test_parse_needed_empty() {
        assert!(parse_needed("no dynamic section").is_empty());
    }

    #[test]
    fn test_is_runtime_object() {
        assert!(is_runtime_object("libc.so.6"));
        assert!(is_runtime_object("libc-2.31.so"));
        assert!(is_runtime_object("ld-linux-aarch64.so.1"));
        assert!(!is_runtime_object("libc.a"));
        assert!(!is_runtime_object("libc_nonshared.a"));
        assert!(!is_runtime_object("meta.json"));
        assert!(!is_runtime_object("gdb_helpers.py"));
        assert!(!is_runtime_object("libfoo.la"));
        assert!(!is_runtime_object("crt1.o"));
    }

    #[test]
    fn test_prune_keeps_symlink_chain_and_linker() {
        let dir = tempfile::tempdir().unwrap();
        let staged = [
            "libc.so.6",
            "libc-2.31.so",
            "libm.so.6",
            "ld-linux-aarch64.so.1",
            "libc.a",
            "meta.json",
        ];
        for name in staged {
            fs::write(dir.path().join(name), b"x").unwrap();
        }

        prune_non_runtime(dir.path()).unwrap();

        let mut remaining: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        remaining.sort();
        assert_eq!(
            remaining,
            vec!["ld-linux-aarch64.so.1", "libc-2.31.so", "libc.so.6", "libm.so.6"]
        );
    }
}
