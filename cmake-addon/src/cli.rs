use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cmake-addon", author, version, about)]
pub struct Arguments {
    /// What to do
    #[arg(value_enum)]
    pub command: Command,

    /// Runtime to build for: node, electron or nw
    #[arg(short = 'r', long)]
    pub runtime: Option<String>,

    /// Runtime version to build for
    #[arg(short = 'v', long = "runtime-version")]
    pub runtime_version: Option<String>,

    /// Target architecture (x64, ia32, arm64, arm)
    #[arg(short = 'a', long)]
    pub arch: Option<String>,

    /// Project directory holding CMakeLists.txt [default: current directory]
    #[arg(short = 'd', long)]
    pub directory: Option<PathBuf>,

    /// Build output directory [default: <directory>/build]
    #[arg(short = 'O', long)]
    pub out: Option<PathBuf>,

    /// Build configuration (Debug, Release, RelWithDebInfo, ...)
    #[arg(short = 'B', long)]
    pub config: Option<String>,

    /// Build the Debug configuration
    #[arg(long)]
    pub debug: bool,

    /// Only build the named cmake target
    #[arg(short = 'T', long)]
    pub target: Option<String>,

    /// Number of parallel build jobs
    #[arg(short = 'j', long)]
    pub parallel: Option<u32>,

    /// CMake generator to use
    #[arg(short = 'G', long)]
    pub generator: Option<String>,

    /// Generator platform (-A)
    #[arg(short = 'A', long)]
    pub platform: Option<String>,

    /// Generator toolset (-T)
    #[arg(short = 't', long)]
    pub toolset: Option<String>,

    /// Prefer the Unix Makefiles generator
    #[arg(short = 'm', long)]
    pub prefer_make: bool,

    /// Prefer the Xcode generator on macOS
    #[arg(short = 'x', long)]
    pub prefer_xcode: bool,

    /// Prefer GNU compilers
    #[arg(short = 'g', long)]
    pub prefer_gnu: bool,

    /// Prefer Clang compilers
    #[arg(long)]
    pub prefer_clang: bool,

    /// C compiler to use
    #[arg(long)]
    pub cc: Option<String>,

    /// C++ compiler to use
    #[arg(long)]
    pub cxx: Option<String>,

    /// Path of the cmake executable
    #[arg(short = 'c', long)]
    pub cmake_path: Option<PathBuf>,

    /// Extra cmake definition, repeatable
    #[arg(short = 'D', long = "define", value_name = "KEY=VALUE", value_parser = parse_definition)]
    pub definitions: Vec<(String, String)>,

    /// Use this directory as the runtime distribution instead of the cache
    #[arg(long)]
    pub runtime_directory: Option<PathBuf>,

    /// Discard cmake's output
    #[arg(short = 'i', long)]
    pub silent: bool,

    /// Log verbosity
    #[arg(short = 'l', long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Arguments passed verbatim to cmake
    #[arg(last = true)]
    pub extra: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Command {
    /// Install the runtime distribution files if needed
    Install,
    /// Invoke cmake with the given options
    Configure,
    /// Print the configure command
    PrintConfigure,
    /// Build the project, configuring first if needed
    Build,
    /// Print the build command
    PrintBuild,
    /// Remove the build directory
    Clean,
    /// Print the clean command
    PrintClean,
    /// Clean, then configure
    Reconfigure,
    /// Clean, then build
    Rebuild,
    /// Build, or rebuild from scratch if that fails
    Compile,
    /// List the generators cmake supports
    ListGenerators,
    /// Print the path of the cmake executable in use
    CmakePath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Silly,
    Verbose,
    Info,
    Http,
    Warn,
    Error,
}

impl LogLevel {
    pub fn filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Silly => log::LevelFilter::Trace,
            LogLevel::Verbose | LogLevel::Http => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }

    /// Show full error details at verbose levels
    pub fn is_verbose(&self) -> bool {
        matches!(self, LogLevel::Silly | LogLevel::Verbose)
    }
}

fn parse_definition(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

pub fn parse_command_line_args() -> Arguments {
    Arguments::parse()
}
