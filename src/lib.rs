//! imageforge build pipeline library.
//!
//! Builds release artifacts for multiple CPU architectures from one source
//! tree, assembles minimal runtime images by staging only the shared
//! libraries a cross-compiled binary needs, derives tags from git state,
//! and publishes per-architecture and multi-architecture references.

pub mod build;
pub mod docker;
pub mod preflight;
pub mod process;
pub mod publish;
pub mod registry;
pub mod report;
pub mod vcs;
