pub mod cmake;
pub mod error;
pub mod locate;
pub mod options;
pub mod toolchain;

pub use cmake::BuildSystem;
pub use error::BuildError;
pub use options::BuildOptions;
pub use toolchain::{CMakeLocation, ToolchainProbe, Toolset};
