//! Host toolchain detection and generator/compiler selection.

use super::error::BuildError;
use super::options::BuildOptions;
use crate::dist::{Platform, TargetOptions};
use crate::utils::process;
use anyhow::Result;
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CMakeLocation {
    Found(PathBuf),
    /// An explicit path was given but is not a file
    Invalid(PathBuf),
    Missing,
}

/// Facts about the host toolchain, gathered once at startup and passed to
/// everything that needs them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainProbe {
    pub platform: Platform,
    pub cmake: CMakeLocation,
    pub ninja: bool,
    pub make: bool,
    pub gpp: bool,
    pub clang: bool,
}

impl ToolchainProbe {
    /// Look up cmake (or validate `cmake_override`) and the generators and
    /// compilers on `PATH`
    pub fn detect(cmake_override: Option<&Path>) -> Self {
        let cmake = match cmake_override {
            Some(path) => match fs::metadata(path) {
                Ok(meta) if !meta.is_dir() => CMakeLocation::Found(path.to_path_buf()),
                _ => CMakeLocation::Invalid(path.to_path_buf()),
            },
            None => match which::which("cmake") {
                Ok(found) => CMakeLocation::Found(dunce::simplified(&found).to_path_buf()),
                Err(_) => CMakeLocation::Missing,
            },
        };
        let available = |name: &str| which::which(name).is_ok();
        let probe = Self {
            platform: Platform::current(),
            cmake,
            ninja: available("ninja"),
            make: available("make"),
            gpp: available("g++"),
            clang: available("clang++"),
        };
        log::debug!("Toolchain: {:?}", probe);
        probe
    }

    pub fn cmake_program(&self) -> Result<&Path, BuildError> {
        match &self.cmake {
            CMakeLocation::Found(path) => Ok(path),
            CMakeLocation::Invalid(path) => Err(BuildError::InvalidCMakePath { path: path.clone() }),
            CMakeLocation::Missing => Err(BuildError::CMakeNotFound),
        }
    }
}

/// Generator, compilers and flags for one configure run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Toolset {
    pub generator: Option<String>,
    pub platform: Option<String>,
    pub toolset: Option<String>,
    pub c_compiler: Option<String>,
    pub cxx_compiler: Option<String>,
    pub compiler_flags: Vec<String>,
    pub linker_flags: Vec<String>,
}

impl Toolset {
    fn from_options(options: &BuildOptions) -> Self {
        Self {
            generator: options.generator.clone(),
            platform: options.platform.clone(),
            toolset: options.toolset.clone(),
            c_compiler: options.c_compiler.clone(),
            cxx_compiler: options.cxx_compiler.clone(),
            ..Default::default()
        }
    }

    pub async fn select(
        probe: &ToolchainProbe,
        options: &BuildOptions,
        target: &TargetOptions,
    ) -> Result<Self> {
        if let Some(target_name) = &options.target {
            log::info!(
                "Building only the {} target, as specified from the command line.",
                target_name
            );
        }
        if !probe.platform.is_windows() {
            return Ok(Self::select_posix(probe, options)?);
        }
        let generators = if options.generator.is_some() {
            Vec::new()
        } else {
            list_generators(probe.cmake_program()?).await?
        };
        Ok(Self::select_windows(options, target, &generators)?)
    }

    pub fn select_posix(probe: &ToolchainProbe, options: &BuildOptions) -> Result<Self, BuildError> {
        let mut ts = Self::from_options(options);

        if ts.c_compiler.is_none() || ts.cxx_compiler.is_none() {
            if !probe.gpp && !probe.clang {
                let hint = if probe.platform.is_macos() {
                    "Install Xcode Command Line Tools, or install Clang with homebrew."
                } else {
                    "Install a compiler toolset with your package manager, e.g. 'sudo apt-get install g++'."
                };
                return Err(BuildError::NoCompiler { hint });
            }
            if options.prefer_clang && probe.clang {
                log::info!("Using clang++ compiler, because preferClang option is set, and clang++ is available.");
                ts.cxx_compiler.get_or_insert_with(|| "clang++".to_string());
                ts.c_compiler.get_or_insert_with(|| "clang".to_string());
            } else if options.prefer_gnu && probe.gpp {
                log::info!("Using g++ compiler, because preferGnu option is set, and g++ is available.");
                ts.cxx_compiler.get_or_insert_with(|| "g++".to_string());
                ts.c_compiler.get_or_insert_with(|| "gcc".to_string());
            }
        }

        let generator = if let Some(explicit) = &ts.generator {
            log::info!("Using {} generator, as specified from commandline.", explicit);
            explicit.clone()
        } else if probe.platform.is_macos() && options.prefer_xcode {
            log::info!("Using Xcode generator, because preferXcode option is set.");
            "Xcode".to_string()
        } else if options.prefer_make && probe.make {
            log::info!("Using Unix Makefiles generator, because preferMake option is set, and make is available.");
            "Unix Makefiles".to_string()
        } else if probe.ninja {
            log::info!("Using Ninja generator, because ninja is available.");
            "Ninja".to_string()
        } else {
            log::info!("Using Unix Makefiles generator.");
            "Unix Makefiles".to_string()
        };
        ts.generator = Some(generator);

        if probe.platform.is_macos() {
            log::debug!("Setting default OSX compiler flags.");
            ts.compiler_flags.extend(
                [
                    "-D_DARWIN_USE_64_BIT_INODE=1",
                    "-D_LARGEFILE_SOURCE",
                    "-D_FILE_OFFSET_BITS=64",
                    "-DBUILDING_NODE_EXTENSION",
                ]
                .map(String::from),
            );
            ts.linker_flags.push("-undefined dynamic_lookup".to_string());
        }
        Ok(ts)
    }

    /// `generators` is what cmake reports; only consulted when no generator
    /// was given explicitly
    pub fn select_windows(
        options: &BuildOptions,
        target: &TargetOptions,
        generators: &[String],
    ) -> Result<Self, BuildError> {
        let mut ts = Self::from_options(options);

        if let Some(explicit) = &ts.generator {
            log::info!("Using {} generator, as specified from commandline.", explicit);
        } else {
            let (generator, major) =
                pick_visual_studio(generators, target, options.msvs_version.as_deref())
                    .ok_or(BuildError::NoVisualStudio)?;
            log::info!("Using {} generator.", generator);
            ts.generator = Some(generator);

            // VS 2019 and later take the architecture as a platform, not a
            // generator name suffix
            if ts.platform.is_none() && major >= 16 {
                ts.platform = match target.runtime_arch.as_str() {
                    "ia32" | "x86" => Some("Win32".to_string()),
                    "x64" => Some("x64".to_string()),
                    "arm" => Some("ARM".to_string()),
                    "arm64" => Some("ARM64".to_string()),
                    other => {
                        log::warn!("Unknown NodeJS architecture: {}", other);
                        None
                    }
                };
            }
        }

        ts.linker_flags.push("/DELAYLOAD:NODE.EXE".to_string());
        if target.is_x86() {
            log::debug!("Setting SAFESEH:NO linker flag.");
            ts.linker_flags.push("/SAFESEH:NO".to_string());
        }
        Ok(ts)
    }
}

fn msvs_matches(preferred: &str, generator: &str, major: u32) -> bool {
    let preferred = preferred.trim();
    preferred.parse::<u32>().map(|v| v == major).unwrap_or(false)
        || generator.ends_with(preferred)
        || generator.contains(&format!(" {} ", preferred))
}

/// Newest `Visual Studio N` generator usable for `target`. Pre-2019
/// generators encode the architecture in their name and are skipped when it
/// does not match.
pub fn pick_visual_studio(
    generators: &[String],
    target: &TargetOptions,
    preferred: Option<&str>,
) -> Option<(String, u32)> {
    let re = Regex::new(r"(?i)^visual studio (\d+)").ok()?;
    let mut best: Option<(String, u32)> = None;
    for generator in generators {
        let Some(major) = re
            .captures(generator)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
        else {
            continue;
        };
        if best.as_ref().is_some_and(|(_, max)| major <= *max) {
            continue;
        }
        if major < 16 {
            let is_64_bit = generator.ends_with("Win64");
            if (target.is_x86() && is_64_bit) || (target.is_x64() && !is_64_bit) {
                continue;
            }
        }
        if let Some(preferred) = preferred {
            if !msvs_matches(preferred, generator, major) {
                continue;
            }
        }
        best = Some((generator.clone(), major));
    }
    best
}

#[derive(Deserialize)]
struct Capabilities {
    generators: Vec<GeneratorInfo>,
}

#[derive(Deserialize)]
struct GeneratorInfo {
    name: String,
}

fn parse_capabilities(json: &str) -> Option<Vec<String>> {
    let caps: Capabilities = serde_json::from_str(json).ok()?;
    Some(caps.generators.into_iter().map(|g| g.name).collect())
}

/// Generator names from the `Generators` section of `cmake --help`
fn parse_help_generators(help: &str) -> Vec<String> {
    const ARCH_SUFFIX: &str = " [arch]";
    let lines: Vec<&str> = help.lines().collect();
    let mut generators = Vec::new();
    let mut in_section = false;
    for (i, line) in lines.iter().enumerate() {
        if in_section {
            let parts: Vec<&str> = line.split('=').collect();
            let name = parts[0].trim().trim_start_matches("* ").trim();
            let next_is_description = lines
                .get(i + 1)
                .map(|next| next.trim_start().starts_with('='))
                .unwrap_or(false);
            let is_entry = (parts.len() == 2 && !name.is_empty())
                || (parts.len() == 1 && !name.is_empty() && next_is_description);
            if is_entry {
                generators.push(name.strip_suffix(ARCH_SUFFIX).unwrap_or(name).to_string());
            }
        }
        if line.trim() == "Generators" {
            in_section = true;
        }
    }
    generators
}

/// Generators the given cmake supports, from `cmake -E capabilities` with a
/// fallback to scraping `cmake --help` for very old versions
pub async fn list_generators(cmake: &Path) -> Result<Vec<String>> {
    let program = cmake.display().to_string();
    let query = [program.clone(), "-E".to_string(), "capabilities".to_string()];
    match process::capture(&query).await {
        Ok(stdout) => {
            if let Some(generators) = parse_capabilities(&stdout) {
                return Ok(generators);
            }
            log::debug!("Unparsable CMake capabilities output");
        }
        Err(e) => log::debug!(
            "Failed to query CMake capabilities (CMake is probably older than 3.7): {}",
            e
        ),
    }
    let help = process::capture(&[program, "--help".to_string()]).await?;
    Ok(parse_help_generators(&help))
}
