pub mod commands;
pub mod run;

pub use commands::{parse_command, CommandError, HistoryCommand};
pub use run::{run, CliError};
