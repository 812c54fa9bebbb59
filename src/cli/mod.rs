mod commands;

pub use commands::{run, Cli, OutputMode};
