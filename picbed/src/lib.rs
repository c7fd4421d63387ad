pub mod cli;
pub mod console;
pub mod load_config;

pub use cli::{run, Cli, Commands};
