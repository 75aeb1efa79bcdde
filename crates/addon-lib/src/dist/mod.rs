pub mod cache;
pub mod downloader;
pub mod error;
pub mod extract;
pub mod manifest;
pub mod runtime;
pub mod transaction;
pub mod types;

pub use cache::RuntimeCache;
pub use downloader::{DownloadSource, Downloader, ExpectedDigest, HashAlgorithm};
pub use error::{DistError, Result};
pub use manifest::{ShaManifest, ShaSum};
pub use runtime::{Mirrors, ResolvedTarget, Runtime, RuntimePathsInfo, TargetOptions, WinLib};
pub use types::{
    host_arch, LogProgressReporter, Platform, ProgressReporter, SilentProgressReporter,
};
