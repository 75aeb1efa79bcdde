//! Runtime header distribution management and CMake invocation for native
//! Node.js, Electron and NW.js addons.
//!
//! The [`dist`] module resolves which header/import-library archive a target
//! needs, downloads and verifies it, and keeps it in an on-disk cache. The
//! [`build`] module drives the external `cmake` executable with the paths the
//! cache exposes.

pub mod build;
pub mod config;
pub mod dist;
pub mod utils;

// Re-export commonly used types
pub use build::{BuildOptions, BuildSystem, ToolchainProbe};
pub use dist::{
    DistError, Downloader, ResolvedTarget, Runtime, RuntimeCache, RuntimePathsInfo,
    TargetOptions,
};
