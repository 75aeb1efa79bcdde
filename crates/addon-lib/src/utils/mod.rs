pub mod process;
pub mod url;
