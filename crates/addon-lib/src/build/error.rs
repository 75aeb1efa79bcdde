use std::path::PathBuf;

/// Failures of the external toolchain around a build
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(
        "CMake executable is not found. Please use your system's package manager to install it, \
         or get an installer from https://cmake.org"
    )]
    CMakeNotFound,

    #[error("CMake path {path:?} does not point to an executable file")]
    InvalidCMakePath { path: PathBuf },

    #[error("'{}' not found", .path.display())]
    MissingCMakeLists { path: PathBuf },

    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process terminated ({status}): {command}{output}")]
    ProcessFailed {
        command: String,
        status: String,
        /// Captured output, prefixed with a newline when present
        output: String,
    },

    #[error("C++ compiler toolset is not available. {hint}")]
    NoCompiler { hint: &'static str },

    #[error("There is no Visual C++ compiler installed. Install Visual C++ Build Toolset or Visual Studio.")]
    NoVisualStudio,
}
