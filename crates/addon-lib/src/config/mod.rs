//! Centralized settings.
//! Static constants plus the handful of environment overrides the tool honours.
//! Environment is read here once and handed out as plain values.

pub mod project;

pub use project::{is_node_api_project, load_app_config, AppConfig, NpmConfig};

use std::path::PathBuf;

// URL Constants
pub const NODE_MIRROR_URL: &str = "https://nodejs.org/dist";
pub const ELECTRON_MIRROR_URL: &str = "https://artifacts.electronjs.org/headers/dist";
pub const NW_MIRROR_URL: &str = "https://node-webkit.s3.amazonaws.com";

// Environment variable names
pub const NODE_MIRROR_ENV: &str = "NVM_NODEJS_ORG_MIRROR";
pub const ELECTRON_MIRROR_ENV: &str = "ELECTRON_MIRROR";
pub const NW_MIRROR_ENV: &str = "NWJS_MIRROR";
pub const CACHE_DIR_ENV: &str = "CMAKE_ADDON_CACHE_DIR";
pub const CMAKE_PATH_ENV: &str = "CMAKE_ADDON_CMAKE_PATH";

/// Directory under the home directory holding cached distributions
pub const CACHE_DIR_NAME: &str = ".cmake-addon";

/// Checksum manifest published next to node releases
pub const SHASUMS_FILE: &str = "SHASUMS256.txt";

// Size caps for downloaded payloads
pub const MANIFEST_SIZE_CAP: u64 = 1024 * 1024;
pub const TARBALL_SIZE_CAP: u64 = 256 * 1024 * 1024;
pub const WIN_LIB_SIZE_CAP: u64 = 128 * 1024 * 1024;

pub const USER_AGENT: &str = concat!("cmake-addon/", env!("CARGO_PKG_VERSION"));

/// Version stamped into the configure step as `CMAKE_JS_VERSION`
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Read a non-empty environment variable
pub fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Root directory of the distribution cache.
///
/// `CMAKE_ADDON_CACHE_DIR` wins; otherwise `{home}/.cmake-addon`. Without a
/// resolvable home directory the cache lives under the working directory.
pub fn default_cache_root() -> PathBuf {
    if let Some(dir) = env_value(CACHE_DIR_ENV) {
        return PathBuf::from(dir);
    }
    match directories::BaseDirs::new() {
        Some(dirs) => dirs.home_dir().join(CACHE_DIR_NAME),
        None => {
            log::warn!("Could not determine home directory, caching in working directory");
            PathBuf::from(CACHE_DIR_NAME)
        }
    }
}

/// Explicit cmake executable from the environment, if any
pub fn cmake_path_override() -> Option<PathBuf> {
    env_value(CMAKE_PATH_ENV).map(PathBuf::from)
}
