use std::io;
use std::process::ExitCode;

use history_cli::{parse_command, run, CliError};
use tape_history::{init_logging, HistoryConfig, LogConfig};

fn main() -> ExitCode {
    init_logging(&LogConfig::from_env());

    let args: Vec<String> = std::env::args().skip(1).collect();
    let result = parse_command(&args)
        .map_err(CliError::from)
        .and_then(|command| run(&command, HistoryConfig::from_env(), &mut io::stdout().lock()));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}
