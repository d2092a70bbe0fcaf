//! CLI command handling

pub mod config;
pub mod output;
pub mod pipe;
pub mod send;

pub use config::*;
pub use output::*;
pub use pipe::*;
pub use send::*;
