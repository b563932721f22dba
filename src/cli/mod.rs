pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{CliArgs, Commands, DownArgs, ServiceArg, StatusArgs, UpArgs};
pub use output::{OutputFormat, OutputFormatter};
