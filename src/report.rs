//! Image size reporting: totals, layer breakdown, aggregate shares.
//!
//! Layer categorization matches each layer's originating build-step text
//! against known patterns. This is approximate by design - the backend
//! exposes no structured per-step metadata - and lives behind the single
//! [`classify_step`] seam so it can be replaced if that ever changes.

use anyhow::Result;

use crate::build::ImageRecord;
use crate::docker::Docker;

/// Size bucket a layer is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    /// Base image content and package installs.
    BaseOs,
    /// Staged shared-library installs.
    Libraries,
    /// The compiled target binary.
    Executable,
}

/// Attribute a layer to a bucket from its `CreatedBy` step text.
///
/// Copies of compiled targets (the `forge-` binaries) count as executable;
/// copies of the staged `libs/` tree count as libraries; package installs
/// and everything else count as base OS.
pub fn classify_step(created_by: &str) -> LayerKind {
    if created_by.contains("COPY") {
        if created_by.contains("forge-") {
            return LayerKind::Executable;
        }
        if created_by.contains("libs") {
            return LayerKind::Libraries;
        }
    }
    LayerKind::BaseOs
}

/// Parse a human-readable size from `docker history` (`10.5MB`, `1.2kB`,
/// `0B`) into bytes.
pub fn parse_size(s: &str) -> u64 {
    let s = s.trim();
    if s.is_empty() || s == "0" || s == "0B" {
        return 0;
    }

    // Suffix order matters: "B" is a suffix of all of them.
    const UNITS: &[(&str, u64)] = &[
        ("GB", 1024 * 1024 * 1024),
        ("MB", 1024 * 1024),
        ("kB", 1024),
        ("B", 1),
    ];

    for (suffix, factor) in UNITS {
        if let Some(number) = s.strip_suffix(suffix) {
            return number
                .trim()
                .parse::<f64>()
                .map(|n| (n * *factor as f64) as u64)
                .unwrap_or(0);
        }
    }
    0
}

/// Format a byte count as a human-readable size.
pub fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if value < 1024.0 {
            return format!("{:.1}{}", value, unit);
        }
        value /= 1024.0;
    }
    format!("{:.1}TB", value)
}

/// Per-image size breakdown.
#[derive(Debug, Default, Clone)]
pub struct Breakdown {
    pub total: u64,
    pub base_os: u64,
    pub libraries: u64,
    pub executable: u64,
}

/// Query an image's total size and bucket its layer history.
pub fn breakdown(docker: &Docker, image: &str) -> Result<Breakdown> {
    let mut b = Breakdown {
        total: docker.inspect_size(image)?,
        ..Default::default()
    };

    for (size, created_by) in docker.history(image)? {
        let bytes = parse_size(&size);
        if bytes == 0 {
            continue;
        }
        match classify_step(&created_by) {
            LayerKind::BaseOs => b.base_os += bytes,
            LayerKind::Libraries => b.libraries += bytes,
            LayerKind::Executable => b.executable += bytes,
        }
    }

    Ok(b)
}

/// Print the build summary: every image with its size, then the aggregate
/// layer breakdown table with totals and percentage shares.
pub fn print_summary(docker: &Docker, records: &[ImageRecord]) -> Result<()> {
    println!("\n=== Build summary ===");
    for record in records {
        match docker.inspect_size(&record.name) {
            Ok(size) => println!("  [OK] {:<80} {:>10}", record.name, format_bytes(size)),
            Err(_) => println!("  [OK] {:<80} {:>10}", record.name, "n/a"),
        }
    }
    println!("\nTotal: {} images built", records.len());

    println!("\n=== Image breakdown ===\n");
    println!(
        "{:<80} {:>10} {:>10} {:>10} {:>10}",
        "Image", "Base OS", "Libraries", "Executable", "Total"
    );

    let mut totals = Breakdown::default();
    for record in records {
        let Ok(b) = breakdown(docker, &record.name) else {
            continue;
        };
        // The staged-library size is tracked by the extractor, not inferred
        // from layer text; it is its own accounting bucket.
        let libraries = if record.lib_size > 0 { record.lib_size } else { b.libraries };

        totals.total += b.total;
        totals.base_os += b.base_os;
        totals.libraries += libraries;
        totals.executable += b.executable;

        println!(
            "{:<80} {:>10} {:>10} {:>10} {:>10}",
            record.name,
            format_bytes(b.base_os),
            format_bytes(libraries),
            format_bytes(b.executable),
            format_bytes(b.total)
        );
    }

    if totals.total > 0 {
        println!(
            "{:<80} {:>10} {:>10} {:>10} {:>10}",
            "TOTAL",
            format_bytes(totals.base_os),
            format_bytes(totals.libraries),
            format_bytes(totals.executable),
            format_bytes(totals.total)
        );
        println!(
            "{:<80} {:>9.1}% {:>9.1}% {:>9.1}%",
            "",
            totals.base_os as f64 / totals.total as f64 * 100.0,
            totals.libraries as f64 / totals.total as f64 * 100.0,
            totals.executable as f64 / totals.total as f64 * 100.0
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size_units() {
        assert_eq!(parse_size("0B"), 0);
        assert_eq!(parse_size("0"), 0);
        assert_eq!(parse_size("512B"), 512);
        assert_eq!(parse_size("1.2kB"), (1.2 * 1024.0) as u64);
        assert_eq!(parse_size("10.5MB"), (10.5 * 1024.0 * 1024.0) as u64);
        assert_eq!(parse_size("2GB"), 2 * 1024 * 1024 * 1024);
    }

    #[test]
    fn test_parse_size_garbage() {
        assert_eq!(parse_size(""), 0);
        assert_eq!(parse_size("n/a"), 0);
    }

    #[test]
    fn test_classify_copy_of_target() {
        assert_eq!(
            classify_step("COPY forge-client /usr/local/bin/forge-client # buildkit"),
            LayerKind::Executable
        );
    }

    #[test]
    fn test_classify_copy_of_libs() {
        assert_eq!(
            classify_step("COPY libs/aarch64-unknown-linux-gnu/ /lib/ # buildkit"),
            LayerKind::Libraries
        );
    }

    #[test]
    fn test_classify_package_install() {
        assert_eq!(
            classify_step("/bin/sh -c apt-get update && apt-get install -y ca-certificates"),
            LayerKind::BaseOs
        );
        assert_eq!(classify_step("FROM debian:bookworm-slim"), LayerKind::BaseOs);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512.0B");
        assert_eq!(format_bytes(2048), "2.0KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0GB");
    }
}
