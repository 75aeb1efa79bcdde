//! Turns parsed arguments plus project and npm configuration into a
//! `BuildSystem` and runs the requested command.

use crate::cli::{Arguments, Command};
use addon_lib::build::{BuildOptions, BuildSystem, ToolchainProbe};
use addon_lib::config::{self, AppConfig, NpmConfig};
use addon_lib::dist::{host_arch, LogProgressReporter, Mirrors, RuntimeCache, TargetOptions};
use addon_lib::utils::process;
use addon_lib::Downloader;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// Runtime, version and arch before host defaults are applied
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct TargetSettings {
    runtime: Option<String>,
    runtime_version: Option<String>,
    arch: Option<String>,
}

impl TargetSettings {
    /// Command line values win over the application config
    fn layered(args: &Arguments, app: Option<&AppConfig>) -> Self {
        Self {
            runtime: args
                .runtime
                .clone()
                .or_else(|| app.and_then(|a| a.runtime.clone())),
            runtime_version: args
                .runtime_version
                .clone()
                .or_else(|| app.and_then(|a| a.runtime_version.clone())),
            arch: args.arch.clone().or_else(|| app.and_then(|a| a.arch.clone())),
        }
    }
}

/// Version of the `node` executable on `PATH`, without the leading `v`
async fn host_node_version() -> Result<String> {
    let out = process::capture(&["node".to_string(), "--version".to_string()])
        .await
        .context("Could not run 'node --version'; pass --runtime-version explicitly")?;
    Ok(out.trim().trim_start_matches('v').to_string())
}

async fn target_options(settings: TargetSettings) -> Result<TargetOptions> {
    let runtime = settings.runtime.as_deref().unwrap_or("node");
    let version = match settings.runtime_version {
        Some(version) => version,
        None if runtime.eq_ignore_ascii_case("node") => host_node_version().await?,
        None => anyhow::bail!("A runtime version is required when building for {}", runtime),
    };
    let arch = settings.arch.unwrap_or_else(|| host_arch().to_string());
    Ok(TargetOptions::parse(runtime, &version, &arch)?)
}

fn build_options(args: &Arguments, project_root: PathBuf, npm: &NpmConfig) -> BuildOptions {
    BuildOptions {
        directory: project_root,
        out: args.out.clone(),
        config: args.config.clone(),
        debug: args.debug,
        target: args.target.clone(),
        parallel: args.parallel,
        generator: args.generator.clone(),
        platform: args.platform.clone(),
        toolset: args.toolset.clone(),
        prefer_make: args.prefer_make,
        prefer_xcode: args.prefer_xcode,
        prefer_gnu: args.prefer_gnu,
        prefer_clang: args.prefer_clang,
        c_compiler: args.cc.clone(),
        cxx_compiler: args.cxx.clone(),
        msvs_version: npm.msvs_version().map(String::from),
        cmake_options: args.definitions.clone(),
        npm_definitions: npm.cmake_definitions(),
        extra_cmake_args: args.extra.clone(),
        silent: args.silent,
        node_api: None,
    }
}

fn runtime_directory(args: &Arguments, npm: &NpmConfig) -> Option<PathBuf> {
    args.runtime_directory
        .clone()
        .or_else(|| npm.nodedir().map(PathBuf::from))
}

fn project_root(args: &Arguments) -> Result<PathBuf> {
    let dir = match &args.directory {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("Could not determine the working directory")?,
    };
    Ok(std::path::absolute(&dir).unwrap_or(dir))
}

fn print_command(command: &[String]) {
    println!("{}", process::format_command(command));
}

pub async fn run(args: Arguments) -> Result<()> {
    let cmake_override = args.cmake_path.clone().or_else(config::cmake_path_override);
    let probe = ToolchainProbe::detect(cmake_override.as_deref());

    // Commands that only need cmake itself
    match args.command {
        Command::CmakePath => {
            println!("{}", probe.cmake_program()?.display());
            return Ok(());
        }
        Command::ListGenerators => {
            let cmake = probe.cmake_program()?;
            for generator in addon_lib::build::toolchain::list_generators(cmake).await? {
                println!("{}", generator);
            }
            return Ok(());
        }
        _ => {}
    }

    let root = project_root(&args)?;
    let npm = NpmConfig::from_env();
    let app = config::load_app_config(&root);
    let target = target_options(TargetSettings::layered(&args, app.as_ref()))
        .await?
        .resolve(&Mirrors::from_env())?;
    log::info!(
        "Target: {} {} ({})",
        target.options.runtime,
        target.options.runtime_version,
        target.options.runtime_arch
    );

    let downloader = Downloader::new()?.with_reporter(Arc::new(LogProgressReporter));
    let cache = RuntimeCache::new(config::default_cache_root(), downloader)
        .with_runtime_directory(runtime_directory(&args, &npm));
    let system = BuildSystem::new(build_options(&args, root, &npm), target, cache, probe);

    match args.command {
        Command::Install => system.install_headers().await,
        Command::Configure => system.configure().await,
        Command::PrintConfigure => {
            print_command(&system.configure_command().await?);
            Ok(())
        }
        Command::Build => system.build().await,
        Command::PrintBuild => {
            print_command(&system.build_command()?);
            Ok(())
        }
        Command::Clean => system.clean().await,
        Command::PrintClean => {
            print_command(&system.clean_command()?);
            Ok(())
        }
        Command::Reconfigure => system.reconfigure().await,
        Command::Rebuild => system.rebuild().await,
        Command::Compile => system.compile().await,
        Command::CmakePath | Command::ListGenerators => Ok(()),
    }
}
