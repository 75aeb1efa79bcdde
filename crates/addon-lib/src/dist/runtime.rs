//! Target resolution: which archive and import libraries a given
//! {runtime, version, arch} needs, and where the mirror keeps them.
//!
//! Resolution is pure. Mirror overrides are read from the environment once
//! into [`Mirrors`] and passed in explicitly.

use super::error::{DistError, Result};
use crate::config;
use semver::Version;
use std::fmt;
use std::str::FromStr;

/// Native module ABI family an addon is built against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Runtime {
    Node,
    Electron,
    Nw,
}

impl Runtime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Runtime::Node => "node",
            Runtime::Electron => "electron",
            Runtime::Nw => "nw",
        }
    }

    /// Only node publishes a `SHASUMS256.txt` next to its header archives
    pub fn publishes_manifest(&self) -> bool {
        matches!(self, Runtime::Node)
    }

    fn resolve(&self, target: &TargetOptions, version: &Version, mirrors: &Mirrors) -> Result<RuntimePathsInfo> {
        Ok(match self {
            Runtime::Node => resolve_node(target, version, &mirrors.node),
            Runtime::Electron => resolve_electron(target, version, &mirrors.electron)?,
            Runtime::Nw => resolve_nw(target, version, &mirrors.nw),
        })
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Runtime {
    type Err = DistError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "node" => Ok(Runtime::Node),
            "electron" => Ok(Runtime::Electron),
            "nw" => Ok(Runtime::Nw),
            _ => Err(DistError::UnknownRuntime {
                runtime: s.to_string(),
            }),
        }
    }
}

/// Base URLs of the per-runtime distribution servers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mirrors {
    pub node: String,
    pub electron: String,
    pub nw: String,
}

impl Default for Mirrors {
    fn default() -> Self {
        Self {
            node: config::NODE_MIRROR_URL.to_string(),
            electron: config::ELECTRON_MIRROR_URL.to_string(),
            nw: config::NW_MIRROR_URL.to_string(),
        }
    }
}

impl Mirrors {
    /// Defaults, overridden by `NVM_NODEJS_ORG_MIRROR`, `ELECTRON_MIRROR`
    /// and `NWJS_MIRROR` when set
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            node: config::env_value(config::NODE_MIRROR_ENV).unwrap_or(defaults.node),
            electron: config::env_value(config::ELECTRON_MIRROR_ENV).unwrap_or(defaults.electron),
            nw: config::env_value(config::NW_MIRROR_ENV).unwrap_or(defaults.nw),
        }
    }

    /// Send every runtime to the same base URL (local mirrors, tests)
    pub fn uniform(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            node: base.clone(),
            electron: base.clone(),
            nw: base,
        }
    }
}

/// The build target a native module is compiled for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetOptions {
    pub runtime: Runtime,
    /// Semver string without a leading `v`
    pub runtime_version: String,
    /// Node style architecture name (`x64`, `arm64`, `ia32`, `x86`, `arm`)
    pub runtime_arch: String,
}

impl TargetOptions {
    pub fn new(runtime: Runtime, runtime_version: &str, runtime_arch: &str) -> Self {
        let trimmed = runtime_version.trim();
        let version = trimmed.strip_prefix('v').unwrap_or(trimmed);
        Self {
            runtime,
            runtime_version: version.to_string(),
            runtime_arch: runtime_arch.trim().to_string(),
        }
    }

    /// Build from a runtime name, failing with `UnknownRuntime` for anything
    /// other than node, electron or nw
    pub fn parse(runtime: &str, runtime_version: &str, runtime_arch: &str) -> Result<Self> {
        Ok(Self::new(runtime.parse()?, runtime_version, runtime_arch))
    }

    pub fn is_x64(&self) -> bool {
        self.runtime_arch == "x64"
    }

    pub fn is_x86(&self) -> bool {
        self.runtime_arch == "ia32" || self.runtime_arch == "x86"
    }

    pub fn is_arm64(&self) -> bool {
        self.runtime_arch == "arm64"
    }

    pub fn version(&self) -> Result<Version> {
        Version::parse(&self.runtime_version).map_err(|source| DistError::InvalidVersion {
            version: self.runtime_version.clone(),
            source,
        })
    }

    /// Resolve and keep the result alongside the options
    pub fn resolve(&self, mirrors: &Mirrors) -> Result<ResolvedTarget> {
        let paths = resolve(self, mirrors)?;
        Ok(ResolvedTarget {
            options: self.clone(),
            paths,
        })
    }
}

/// A Windows import library, relative to the distribution root
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WinLib {
    pub dir: String,
    pub name: String,
}

impl WinLib {
    fn new(dir: &str, name: &str) -> Self {
        Self {
            dir: dir.to_string(),
            name: name.to_string(),
        }
    }

    /// `dir/name`, or just `name` for libraries at the root. This is also the
    /// key the checksum manifest uses.
    pub fn relative_path(&self) -> String {
        if self.dir.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.dir, self.name)
        }
    }
}

/// Where a runtime distribution lives and what it contains
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePathsInfo {
    /// Base URL, always ending in `/`
    pub external_path: String,
    pub win_libs: Vec<WinLib>,
    /// Archive file name relative to `external_path`
    pub tar_path: String,
    /// Only public headers (`include/node`) rather than a full source tree
    pub header_only: bool,
}

/// Target options together with their resolved paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub options: TargetOptions,
    pub paths: RuntimePathsInfo,
}

impl ResolvedTarget {
    pub fn runtime(&self) -> Runtime {
        self.options.runtime
    }
}

/// Compute the distribution layout for `options`. No I/O happens here.
pub fn resolve(options: &TargetOptions, mirrors: &Mirrors) -> Result<RuntimePathsInfo> {
    let version = options.version()?;
    options.runtime.resolve(options, &version, mirrors)
}

fn external_path(mirror: &str, version: &str) -> String {
    format!("{}/v{}/", mirror.trim_end_matches('/'), version)
}

/// Directory name used by pre-4.0 node, electron and nw for import libraries
fn legacy_lib_dir(target: &TargetOptions) -> &'static str {
    if target.is_x64() {
        "x64"
    } else if target.is_arm64() {
        "arm64"
    } else {
        ""
    }
}

fn resolve_node(target: &TargetOptions, version: &Version, mirror: &str) -> RuntimePathsInfo {
    let v = &target.runtime_version;
    let lib_name = format!("{}.lib", Runtime::Node);
    if *version < Version::new(4, 0, 0) {
        RuntimePathsInfo {
            external_path: external_path(mirror, v),
            win_libs: vec![WinLib::new(legacy_lib_dir(target), &lib_name)],
            tar_path: format!("node-v{}.tar.gz", v),
            header_only: false,
        }
    } else {
        let dir = if target.is_x64() {
            "win-x64"
        } else if target.is_arm64() {
            "win-arm64"
        } else {
            "win-x86"
        };
        RuntimePathsInfo {
            external_path: external_path(mirror, v),
            win_libs: vec![WinLib::new(dir, &lib_name)],
            tar_path: format!("node-v{}-headers.tar.gz", v),
            header_only: true,
        }
    }
}

/// First electron release that ships node-ABI header-only archives
const ELECTRON_HEADER_ONLY_FLOOR: &str = "4.0.0-alpha";

fn electron_header_only_floor() -> Result<Version> {
    Version::parse(ELECTRON_HEADER_ONLY_FLOOR).map_err(|source| DistError::InvalidVersion {
        version: ELECTRON_HEADER_ONLY_FLOOR.to_string(),
        source,
    })
}

fn resolve_electron(target: &TargetOptions, version: &Version, mirror: &str) -> Result<RuntimePathsInfo> {
    let v = &target.runtime_version;
    Ok(RuntimePathsInfo {
        external_path: external_path(mirror, v),
        win_libs: vec![WinLib::new(legacy_lib_dir(target), "node.lib")],
        tar_path: format!("node-v{}.tar.gz", v),
        header_only: *version >= electron_header_only_floor()?,
    })
}

fn resolve_nw(target: &TargetOptions, version: &Version, mirror: &str) -> RuntimePathsInfo {
    let v = &target.runtime_version;
    let dir = legacy_lib_dir(target);
    let mut win_libs = vec![WinLib::new(dir, &format!("{}.lib", Runtime::Nw))];
    if *version >= Version::new(0, 13, 0) {
        win_libs.push(WinLib::new(dir, "node.lib"));
    }
    RuntimePathsInfo {
        external_path: external_path(mirror, v),
        win_libs,
        tar_path: format!("nw-headers-v{}.tar.gz", v),
        header_only: false,
    }
}
