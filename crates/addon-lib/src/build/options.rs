use std::path::PathBuf;

/// Everything a build needs besides the runtime target itself.
///
/// Assembled by the CLI from flags, project config and npm config.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Project root holding `CMakeLists.txt`
    pub directory: PathBuf,
    /// Build directory, `{directory}/build` when unset
    pub out: Option<PathBuf>,
    /// Build configuration name; overrides `debug`
    pub config: Option<String>,
    pub debug: bool,
    pub target: Option<String>,
    pub parallel: Option<u32>,

    pub generator: Option<String>,
    pub platform: Option<String>,
    pub toolset: Option<String>,
    pub prefer_make: bool,
    pub prefer_xcode: bool,
    pub prefer_gnu: bool,
    pub prefer_clang: bool,
    pub c_compiler: Option<String>,
    pub cxx_compiler: Option<String>,
    /// Preferred Visual Studio release (`2022`, `17`)
    pub msvs_version: Option<String>,

    /// `-D` definitions given by the user
    pub cmake_options: Vec<(String, String)>,
    /// `npm_config_cmake_*` definitions, appended after everything else
    pub npm_definitions: Vec<(String, String)>,
    /// Passed verbatim after the generated arguments of the first command
    pub extra_cmake_args: Vec<String>,

    /// Discard cmake's output
    pub silent: bool,
    /// Force Node-API mode; detected from `package.json` when unset
    pub node_api: Option<bool>,
}

impl BuildOptions {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Default::default()
        }
    }

    /// `config` if given, otherwise `Debug` or `Release`
    pub fn config_name(&self) -> String {
        match &self.config {
            Some(config) => config.clone(),
            None if self.debug => "Debug".to_string(),
            None => "Release".to_string(),
        }
    }

    pub fn work_dir(&self) -> PathBuf {
        match &self.out {
            Some(out) if out.is_absolute() => out.clone(),
            Some(out) => self.directory.join(out),
            None => self.directory.join("build"),
        }
    }
}
