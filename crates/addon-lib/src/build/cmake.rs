use super::error::BuildError;
use super::locate;
use super::options::BuildOptions;
use super::toolchain::{self, ToolchainProbe, Toolset};
use crate::config;
use crate::dist::{ResolvedTarget, RuntimeCache};
use crate::utils::process;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// MSVC runtime selection passed to every configure run. Static runtimes
/// avoid crashes when memory is freed across CRT boundaries.
const MSVC_RUNTIME_LIBRARY: &str = "MultiThreaded$<$<CONFIG:Debug>:Debug>";

/// Compiled into every Windows addon. Pairs with the `/DELAYLOAD:NODE.EXE`
/// linker flag.
const DELAY_LOAD_HOOK_SOURCE: &str = include_str!("win_delay_load_hook.cc");
const DELAY_LOAD_HOOK_FILE: &str = "win_delay_load_hook.cc";

fn path_string(path: &Path) -> String {
    path.display().to_string()
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths.iter().map(|p| path_string(p)).collect::<Vec<_>>().join(";")
}

/// Drives the external `cmake` executable for one addon project
pub struct BuildSystem {
    options: BuildOptions,
    target: ResolvedTarget,
    cache: RuntimeCache,
    probe: ToolchainProbe,
    work_dir: PathBuf,
    config: String,
    node_api: bool,
}

impl BuildSystem {
    pub fn new(
        options: BuildOptions,
        target: ResolvedTarget,
        cache: RuntimeCache,
        probe: ToolchainProbe,
    ) -> Self {
        let work_dir = options.work_dir();
        let config = options.config_name();
        let node_api = options
            .node_api
            .unwrap_or_else(|| config::is_node_api_project(&options.directory));
        if node_api {
            log::debug!("Node-API project, runtime headers come from node-api-headers");
        }
        Self {
            options,
            target,
            cache,
            probe,
            work_dir,
            config,
            node_api,
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.options.directory
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn config_name(&self) -> &str {
        &self.config
    }

    pub fn target(&self) -> &ResolvedTarget {
        &self.target
    }

    pub fn cache(&self) -> &RuntimeCache {
        &self.cache
    }

    pub fn is_node_api(&self) -> bool {
        self.node_api
    }

    fn cmake(&self) -> Result<String, BuildError> {
        self.probe.cmake_program().map(path_string)
    }

    fn library_output_dir(&self) -> PathBuf {
        if self.work_dir.ends_with(&self.config) {
            self.work_dir.clone()
        } else {
            self.work_dir.join(&self.config)
        }
    }

    fn include_dirs(&self) -> Vec<PathBuf> {
        let root = self.project_root();
        let mut dirs = Vec::new();
        if self.node_api {
            match locate::locate_node_api_headers(root) {
                Some(dir) => dirs.push(dir),
                None => log::warn!("node-api-headers package not found, CMAKE_JS_INC lacks Node-API headers"),
            }
            dirs.extend(locate::locate_node_addon_api(root));
        } else {
            dirs.extend(self.cache.include_dirs(&self.target));
            dirs.extend(locate::locate_nan(root));
        }
        dirs
    }

    /// `node_api.def` from node-api-headers, for Node-API builds on Windows
    fn node_lib_def(&self) -> Option<PathBuf> {
        if !self.probe.platform.is_windows() || !self.node_api {
            return None;
        }
        let def = locate::locate_node_api_def(self.project_root());
        if def.is_none() {
            log::warn!("node-api-headers has no def/node_api.def, node.lib will not be generated");
        }
        def
    }

    /// Import library cmake generates from [`Self::node_lib_def`]
    fn node_lib_target(&self) -> PathBuf {
        self.work_dir.join("node.lib")
    }

    fn lib_paths(&self, node_lib_def: Option<&Path>) -> Vec<PathBuf> {
        if !self.probe.platform.is_windows() {
            Vec::new()
        } else if node_lib_def.is_some() {
            vec![self.node_lib_target()]
        } else if self.node_api {
            Vec::new()
        } else {
            self.cache.win_lib_paths(&self.target)
        }
    }

    /// Where the delay-load hook source is written for cmake to compile
    pub fn delay_load_hook_path(&self) -> PathBuf {
        self.cache.root().join(DELAY_LOAD_HOOK_FILE)
    }

    fn source_paths(&self) -> Vec<String> {
        if self.probe.platform.is_windows() {
            vec![path_string(&self.delay_load_hook_path()).replace('\\', "/")]
        } else {
            Vec::new()
        }
    }

    /// Write the delay-load hook source unless an identical copy is there
    pub async fn write_delay_load_hook(&self) -> Result<PathBuf> {
        let path = self.delay_load_hook_path();
        if let Ok(existing) = tokio::fs::read_to_string(&path).await {
            if existing == DELAY_LOAD_HOOK_SOURCE {
                return Ok(path);
            }
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Create directory {:?}", parent))?;
        }
        tokio::fs::write(&path, DELAY_LOAD_HOOK_SOURCE)
            .await
            .with_context(|| format!("Write {:?}", path))?;
        log::debug!("Wrote delay-load hook to {:?}", path);
        Ok(path)
    }

    /// `KEY=VALUE` pairs handed to cmake as `-D` definitions, in order
    pub fn definitions(&self, toolset: &Toolset) -> Vec<(String, String)> {
        let options = &self.target.options;
        let platform = self.probe.platform;
        let mut defs: Vec<(String, String)> = Vec::new();
        let mut define = |key: &str, value: String| defs.push((key.to_string(), value));

        define("CMAKE_JS_VERSION", config::TOOL_VERSION.to_string());
        define("CMAKE_BUILD_TYPE", self.config.clone());
        if platform.is_windows() {
            define("CMAKE_RUNTIME_OUTPUT_DIRECTORY", path_string(&self.work_dir));
        } else {
            define("CMAKE_LIBRARY_OUTPUT_DIRECTORY", path_string(&self.library_output_dir()));
        }
        define("CMAKE_MSVC_RUNTIME_LIBRARY", MSVC_RUNTIME_LIBRARY.to_string());

        define("CMAKE_JS_INC", join_paths(&self.include_dirs()));
        define("CMAKE_JS_SRC", self.source_paths().join(";"));

        define("NODE_RUNTIME", options.runtime.to_string());
        define("NODE_RUNTIMEVERSION", options.runtime_version.clone());
        define("NODE_ARCH", options.runtime_arch.clone());
        if platform.is_macos() && !options.runtime_arch.is_empty() {
            let xcode_arch = if options.is_x64() {
                "x86_64".to_string()
            } else {
                options.runtime_arch.clone()
            };
            define("CMAKE_OSX_ARCHITECTURES", xcode_arch);
        }

        for (key, value) in &self.options.cmake_options {
            define(key.as_str(), value.clone());
        }

        let node_lib_def = self.node_lib_def();
        define("CMAKE_JS_LIB", join_paths(&self.lib_paths(node_lib_def.as_deref())));
        if let Some(def) = &node_lib_def {
            define("CMAKE_JS_NODELIB_DEF", path_string(def));
            define("CMAKE_JS_NODELIB_TARGET", path_string(&self.node_lib_target()));
        }

        if let Some(cxx) = &toolset.cxx_compiler {
            define("CMAKE_CXX_COMPILER", cxx.clone());
        }
        if let Some(cc) = &toolset.c_compiler {
            define("CMAKE_C_COMPILER", cc.clone());
        }
        if !toolset.compiler_flags.is_empty() {
            define("CMAKE_CXX_FLAGS", toolset.compiler_flags.join(" "));
        }
        if !toolset.linker_flags.is_empty() {
            define("CMAKE_SHARED_LINKER_FLAGS", toolset.linker_flags.join(" "));
        }

        for (key, value) in &self.options.npm_definitions {
            define(key.as_str(), value.clone());
        }
        defs
    }

    /// Assemble the configure command line for an already selected toolset
    pub fn configure_command_with(&self, toolset: &Toolset, extra: &[String]) -> Result<Vec<String>> {
        let mut command = vec![
            self.cmake()?,
            path_string(self.project_root()),
            "--no-warn-unused-cli".to_string(),
        ];
        if let Some(generator) = &toolset.generator {
            command.extend(["-G".to_string(), generator.clone()]);
        }
        if let Some(platform) = &toolset.platform {
            command.extend(["-A".to_string(), platform.clone()]);
        }
        if let Some(ts) = &toolset.toolset {
            command.extend(["-T".to_string(), ts.clone()]);
        }
        command.extend(
            self.definitions(toolset)
                .into_iter()
                .map(|(key, value)| format!("-D{}={}", key, value)),
        );
        command.extend(extra.iter().cloned());
        Ok(command)
    }

    pub async fn toolset(&self) -> Result<Toolset> {
        Toolset::select(&self.probe, &self.options, &self.target.options).await
    }

    pub async fn configure_command(&self) -> Result<Vec<String>> {
        let toolset = self.toolset().await?;
        self.configure_command_with(&toolset, &self.options.extra_cmake_args)
    }

    pub fn build_command(&self) -> Result<Vec<String>> {
        self.build_command_with(&self.options.extra_cmake_args)
    }

    fn build_command_with(&self, extra: &[String]) -> Result<Vec<String>> {
        let mut command = vec![
            self.cmake()?,
            "--build".to_string(),
            path_string(&self.work_dir),
            "--config".to_string(),
            self.config.clone(),
        ];
        if let Some(target) = &self.options.target {
            command.extend(["--target".to_string(), target.clone()]);
        }
        if let Some(parallel) = self.options.parallel {
            command.extend(["--parallel".to_string(), parallel.to_string()]);
        }
        command.extend(extra.iter().cloned());
        Ok(command)
    }

    pub fn install_command(&self) -> Result<Vec<String>> {
        let mut command = vec![
            self.cmake()?,
            "--install".to_string(),
            path_string(&self.work_dir),
            "--config".to_string(),
            self.config.clone(),
        ];
        command.extend(self.options.extra_cmake_args.iter().cloned());
        Ok(command)
    }

    pub fn clean_command(&self) -> Result<Vec<String>> {
        self.clean_command_with(&self.options.extra_cmake_args)
    }

    fn clean_command_with(&self, extra: &[String]) -> Result<Vec<String>> {
        let mut command = vec![
            self.cmake()?,
            "-E".to_string(),
            "remove_directory".to_string(),
            path_string(&self.work_dir),
        ];
        command.extend(extra.iter().cloned());
        Ok(command)
    }

    async fn run(&self, command: &[String]) -> Result<()> {
        process::run(command, None, self.options.silent).await?;
        Ok(())
    }

    /// Make sure the runtime distribution for the target is in the cache
    pub async fn install_headers(&self) -> Result<()> {
        self.cache
            .ensure_downloaded(&self.target)
            .await
            .with_context(|| {
                format!(
                    "Failed to install {} {} ({}) headers",
                    self.target.options.runtime,
                    self.target.options.runtime_version,
                    self.target.options.runtime_arch
                )
            })
    }

    async fn configure_with(&self, extra: &[String]) -> Result<()> {
        self.cmake()?;
        let list_path = self.project_root().join("CMakeLists.txt");
        if !list_path.is_file() {
            return Err(BuildError::MissingCMakeLists { path: list_path }.into());
        }
        if !self.node_api {
            self.install_headers().await?;
        }

        if self.probe.platform.is_windows() {
            self.write_delay_load_hook().await?;
        }

        log::info!("CONFIGURE");
        let toolset = self.toolset().await?;
        let command = self.configure_command_with(&toolset, extra)?;
        tokio::fs::create_dir_all(&self.work_dir)
            .await
            .with_context(|| format!("Create build directory {:?}", self.work_dir))?;
        process::run(&command, Some(&self.work_dir), self.options.silent).await?;
        Ok(())
    }

    pub async fn configure(&self) -> Result<()> {
        self.configure_with(&self.options.extra_cmake_args).await
    }

    /// Configure unless the build directory already has a `CMakeCache.txt`
    pub async fn ensure_configured(&self) -> Result<()> {
        self.ensure_configured_with(&self.options.extra_cmake_args).await
    }

    async fn ensure_configured_with(&self, extra: &[String]) -> Result<()> {
        if self.work_dir.join("CMakeCache.txt").is_file() {
            return Ok(());
        }
        self.configure_with(extra).await
    }

    pub async fn build(&self) -> Result<()> {
        self.build_with(&self.options.extra_cmake_args).await
    }

    async fn build_with(&self, extra: &[String]) -> Result<()> {
        self.cmake()?;
        self.ensure_configured_with(extra).await?;
        let command = self.build_command_with(extra)?;
        log::info!("BUILD");
        self.run(&command).await
    }

    pub async fn install(&self) -> Result<()> {
        self.ensure_configured().await?;
        let command = self.install_command()?;
        log::info!("INSTALL");
        self.run(&command).await
    }

    pub async fn clean(&self) -> Result<()> {
        self.clean_with(&self.options.extra_cmake_args).await
    }

    async fn clean_with(&self, extra: &[String]) -> Result<()> {
        let command = self.clean_command_with(extra)?;
        log::info!("CLEAN");
        self.run(&command).await
    }

    // The composite commands below ignore extra cmake args: they are meant
    // for the single step the user asked for.

    pub async fn reconfigure(&self) -> Result<()> {
        self.clean_with(&[]).await?;
        self.configure_with(&[]).await
    }

    pub async fn rebuild(&self) -> Result<()> {
        self.clean_with(&[]).await?;
        self.build_with(&[]).await
    }

    /// Build, falling back to a full rebuild when the incremental build fails
    pub async fn compile(&self) -> Result<()> {
        if let Err(e) = self.build_with(&[]).await {
            log::info!("Build has been failed, trying to do a full rebuild. ({:#})", e);
            return self.rebuild().await;
        }
        Ok(())
    }

    pub async fn list_generators(&self) -> Result<Vec<String>> {
        let cmake = self.probe.cmake_program()?;
        toolchain::list_generators(cmake).await
    }
}
