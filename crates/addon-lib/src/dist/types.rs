/// Progress reporter trait for distribution downloads
/// Implementations forward updates to a terminal, a log or a test recorder
pub trait ProgressReporter: Send + Sync {
    /// Called each time a transfer with a known length crosses a 10% step.
    /// `percent` is always a multiple of 10 in `10..=100`.
    fn report_percent(&self, url: &str, percent: u32);

    /// Set a short status message
    fn set_message(&self, _message: &str) {}
}

/// A progress reporter that does nothing (silent).
/// Useful for background verification or tests.
pub struct SilentProgressReporter;

impl ProgressReporter for SilentProgressReporter {
    fn report_percent(&self, _url: &str, _percent: u32) {}
}

/// Forwards progress to the `log` facade at debug level
pub struct LogProgressReporter;

impl ProgressReporter for LogProgressReporter {
    fn report_percent(&self, url: &str, percent: u32) {
        log::debug!("\t{}% of {}", percent, url);
    }

    fn set_message(&self, message: &str) {
        log::info!("{}", message);
    }
}

/// Operating system family a build targets.
///
/// Only Windows changes what a cache entry must contain (import libraries),
/// but generator selection also distinguishes macOS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOS,
    Linux,
}

impl Platform {
    /// Detect the current OS
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOS
        } else {
            Platform::Linux
        }
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, Platform::Windows)
    }

    pub fn is_macos(&self) -> bool {
        matches!(self, Platform::MacOS)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Windows => "win32",
            Platform::MacOS => "darwin",
            Platform::Linux => "linux",
        }
    }
}

/// Map the host architecture to Node's naming (`process.arch`)
pub fn host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "x64",
        "aarch64" => "arm64",
        "x86" => "ia32",
        "arm" => "arm",
        other => other,
    }
}
