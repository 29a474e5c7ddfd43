//! Platform and app registries.
//!
//! Immutable configuration for every supported target platform and every
//! buildable application. Both registries are constructed once at process
//! start and threaded through the pipeline; nothing mutates them afterwards.
//!
//! A platform either builds natively (its builder image runs on the target
//! architecture) or cross-compiles (its builder image carries a crosstool
//! toolchain with a sysroot). [`PlatformSpec::new`] rejects configurations
//! that declare both or neither, before any image build runs.

use anyhow::{bail, Result};

/// How a platform produces its builder image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuilderKind {
    /// Native build: the builder dockerfile runs under the target platform.
    Native {
        /// Builder dockerfile, relative to the docker directory.
        dockerfile: &'static str,
    },
    /// Cross build: a crosstool config produces the toolchain image.
    Cross {
        /// Crosstool config path, relative to the docker directory.
        config: &'static str,
        /// CMake toolchain file path inside the builder image.
        toolchain_file: &'static str,
    },
}

/// One target platform the pipeline can build for.
#[derive(Debug, Clone)]
pub struct PlatformSpec {
    /// Target triple, e.g. `aarch64-unknown-linux-gnu`. Also the registry key.
    pub triple: &'static str,
    /// Container platform identifier, e.g. `linux/arm64`.
    pub platform: &'static str,
    pub builder: BuilderKind,
    /// Runtime dockerfile, relative to the docker directory.
    pub runtime: &'static str,
    /// Extra flags forwarded into the artifact build, e.g. feature toggles.
    pub extra_build_args: Option<&'static str>,
}

impl PlatformSpec {
    /// Construct a platform spec, enforcing that exactly one of the
    /// native/cross paths is declared.
    pub fn new(
        triple: &'static str,
        platform: &'static str,
        native_dockerfile: Option<&'static str>,
        cross: Option<(&'static str, &'static str)>,
        runtime: &'static str,
        extra_build_args: Option<&'static str>,
    ) -> Result<Self> {
        let builder = match (native_dockerfile, cross) {
            (Some(_), Some(_)) => bail!(
                "platform '{}' declares both a native builder and a cross toolchain; \
                 use one or the other",
                triple
            ),
            (None, None) => bail!(
                "platform '{}' declares neither a native builder nor a cross toolchain",
                triple
            ),
            (Some(dockerfile), None) => BuilderKind::Native { dockerfile },
            (None, Some((config, toolchain_file))) => BuilderKind::Cross {
                config,
                toolchain_file,
            },
        };

        Ok(Self {
            triple,
            platform,
            builder,
            runtime,
            extra_build_args,
        })
    }

    pub fn is_cross(&self) -> bool {
        matches!(self.builder, BuilderKind::Cross { .. })
    }
}

/// One application buildable from the source tree.
#[derive(Debug, Clone)]
pub struct AppSpec {
    pub name: &'static str,
    /// Release dockerfile for this app (entry point configuration).
    pub dockerfile: &'static str,
    /// Name of the compiled binary inside the artifacts directory.
    pub target: &'static str,
}

/// Build mode for the compiled artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildMode {
    Debug,
    Release,
}

impl BuildMode {
    pub const ALL: &'static [BuildMode] = &[BuildMode::Debug, BuildMode::Release];

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildMode::Debug => "debug",
            BuildMode::Release => "release",
        }
    }

    pub fn parse(s: &str) -> Option<BuildMode> {
        match s {
            "debug" => Some(BuildMode::Debug),
            "release" => Some(BuildMode::Release),
            _ => None,
        }
    }
}

impl std::fmt::Display for BuildMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// All supported platforms.
pub fn default_platforms() -> Result<Vec<PlatformSpec>> {
    Ok(vec![
        PlatformSpec::new(
            "x86_64-unknown-linux-gnu",
            "linux/amd64",
            Some("linux/amd64/native.builder"),
            None,
            "linux/amd64/base.runtime",
            None,
        )?,
        PlatformSpec::new(
            "aarch64-unknown-linux-gnu",
            "linux/arm64",
            None,
            Some((
                "linux/arm64/aarch64-unknown-linux-gnu.config",
                "/src/docker/linux/arm64/aarch64-unknown-linux-gnu.toolchain.cmake",
            )),
            "linux/arm64/base.runtime",
            None,
        )?,
        PlatformSpec::new(
            "armv8-rpi3-linux-gnueabihf",
            "linux/arm/v7",
            None,
            Some((
                "linux/arm-v7/armv8-rpi3-linux-gnueabihf.config",
                "/src/docker/linux/arm-v7/armv8-rpi3-linux-gnueabihf.toolchain.cmake",
            )),
            "linux/arm-v7/rpi3.runtime",
            Some("-DUSE_ASAN=OFF -DENABLE_BASELINE_RECORDING=ON"),
        )?,
        PlatformSpec::new(
            "armv6-unknown-linux-gnueabihf",
            "linux/arm/v6",
            None,
            Some((
                "linux/arm-v6/armv6-unknown-linux-gnueabihf.config",
                "/src/docker/linux/arm-v6/armv6-unknown-linux-gnueabihf.toolchain.cmake",
            )),
            "linux/arm-v6/base.runtime",
            None,
        )?,
    ])
}

/// All buildable apps.
pub fn default_apps() -> Vec<AppSpec> {
    vec![
        AppSpec {
            name: "client",
            dockerfile: "Dockerfile.release.client",
            target: "forge-client",
        },
        AppSpec {
            name: "relay",
            dockerfile: "Dockerfile.release.relay",
            target: "forge-relay",
        },
    ]
}

/// Look up a platform by triple.
pub fn find_platform<'a>(platforms: &'a [PlatformSpec], triple: &str) -> Result<&'a PlatformSpec> {
    platforms
        .iter()
        .find(|p| p.triple == triple)
        .ok_or_else(|| {
            anyhow::anyhow!(
                "unknown platform '{}' (known: {})",
                triple,
                platforms
                    .iter()
                    .map(|p| p.triple)
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        })
}

/// Look up an app by name.
pub fn find_app<'a>(apps: &'a [AppSpec], name: &str) -> Result<&'a AppSpec> {
    apps.iter().find(|a| a.name == name).ok_or_else(|| {
        anyhow::anyhow!(
            "unknown app '{}' (known: {})",
            name,
            apps.iter().map(|a| a.name).collect::<Vec<_>>().join(", ")
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_builder_paths_rejected() {
        let result = PlatformSpec::new(
            "test-triple",
            "linux/amd64",
            Some("builder.dockerfile"),
            Some(("cross.config", "/toolchain.cmake")),
            "base.runtime",
            None,
        );
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("both"));
    }

    #[test]
    fn test_neither_builder_path_rejected() {
        let result =
            PlatformSpec::new("test-triple", "linux/amd64", None, None, "base.runtime", None);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("neither"));
    }

    #[test]
    fn test_native_platform() {
        let spec = PlatformSpec::new(
            "test-triple",
            "linux/amd64",
            Some("builder.dockerfile"),
            None,
            "base.runtime",
            None,
        )
        .unwrap();
        assert!(!spec.is_cross());
    }

    #[test]
    fn test_cross_platform() {
        let spec = PlatformSpec::new(
            "test-triple",
            "linux/arm64",
            None,
            Some(("cross.config", "/toolchain.cmake")),
            "base.runtime",
            None,
        )
        .unwrap();
        assert!(spec.is_cross());
    }

    #[test]
    fn test_default_registries_valid() {
        let platforms = default_platforms().unwrap();
        assert!(!platforms.is_empty());
        // Exactly one native platform in the default set.
        assert_eq!(platforms.iter().filter(|p| !p.is_cross()).count(), 1);

        let apps = default_apps();
        assert!(!apps.is_empty());
    }

    #[test]
    fn test_find_platform() {
        let platforms = default_platforms().unwrap();
        assert!(find_platform(&platforms, "aarch64-unknown-linux-gnu").is_ok());

        let err = find_platform(&platforms, "mips-unknown-linux-gnu").unwrap_err();
        assert!(err.to_string().contains("unknown platform"));
    }

    #[test]
    fn test_find_app() {
        let apps = default_apps();
        assert!(find_app(&apps, "client").is_ok());
        assert!(find_app(&apps, "nonexistent").is_err());
    }

    #[test]
    fn test_build_mode_parse() {
        assert_eq!(BuildMode::parse("debug"), Some(BuildMode::Debug));
        assert_eq!(BuildMode::parse("release"), Some(BuildMode::Release));
        assert_eq!(BuildMode::parse("all"), None);
    }
}
