use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryCommand {
    Help,
    List { json: bool },
    Add(String),
    /// 1-based, as printed by `list`.
    Delete(usize),
    Clear,
    Compact,
    ExpandCheck { marker_pos: usize, line: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command '{0}'; try 'help'")]
    Unknown(String),

    #[error("'{command}' needs {argument}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    #[error("'{command}' takes no argument '{argument}'")]
    UnexpectedArgument {
        command: &'static str,
        argument: String,
    },

    #[error("'{value}' is not a valid {argument}")]
    InvalidNumber {
        argument: &'static str,
        value: String,
    },
}

pub const USAGE: &str = "\
usage: tape-history <command>

commands:
  list [--json]                   print every active line, oldest first
  export                          same as list
  add <text...>                   append a line
  delete <position>               delete the line at a listed position
  clear                           delete all history
  compact                         rewrite history without deleted lines
  expand-check <pos> <line...>    whether '!' at byte <pos> may expand
  help                            show this message
";

pub fn parse_command(args: &[String]) -> Result<HistoryCommand, CommandError> {
    let Some((command, rest)) = args.split_first() else {
        return Ok(HistoryCommand::Help);
    };

    let parsed = match command.as_str() {
        "help" | "--help" | "-h" => {
            no_arguments("help", rest)?;
            HistoryCommand::Help
        }
        "list" | "export" => {
            let mut json = false;
            for argument in rest {
                match argument.as_str() {
                    "--json" => json = true,
                    _ => {
                        return Err(CommandError::UnexpectedArgument {
                            command: "list",
                            argument: argument.clone(),
                        })
                    }
                }
            }
            HistoryCommand::List { json }
        }
        "add" => {
            if rest.is_empty() {
                return Err(CommandError::MissingArgument {
                    command: "add",
                    argument: "the text to add",
                });
            }
            HistoryCommand::Add(rest.join(" "))
        }
        "delete" => {
            let (position, extra) = rest.split_first().ok_or(CommandError::MissingArgument {
                command: "delete",
                argument: "a position",
            })?;
            no_arguments("delete", extra)?;
            let position = parse_number("position", position)?;
            if position == 0 {
                return Err(CommandError::InvalidNumber {
                    argument: "position",
                    value: "0".to_string(),
                });
            }
            HistoryCommand::Delete(position)
        }
        "clear" => {
            no_arguments("clear", rest)?;
            HistoryCommand::Clear
        }
        "compact" => {
            no_arguments("compact", rest)?;
            HistoryCommand::Compact
        }
        "expand-check" => {
            let (marker_pos, line) = rest.split_first().ok_or(CommandError::MissingArgument {
                command: "expand-check",
                argument: "a marker position",
            })?;
            if line.is_empty() {
                return Err(CommandError::MissingArgument {
                    command: "expand-check",
                    argument: "a line",
                });
            }
            HistoryCommand::ExpandCheck {
                marker_pos: parse_number("marker position", marker_pos)?,
                line: line.join(" "),
            }
        }
        _ => return Err(CommandError::Unknown(command.clone())),
    };

    Ok(parsed)
}

fn no_arguments(command: &'static str, rest: &[String]) -> Result<(), CommandError> {
    match rest.first() {
        Some(argument) => Err(CommandError::UnexpectedArgument {
            command,
            argument: argument.clone(),
        }),
        None => Ok(()),
    }
}

fn parse_number(argument: &'static str, value: &str) -> Result<usize, CommandError> {
    value.parse().map_err(|_| CommandError::InvalidNumber {
        argument,
        value: value.to_string(),
    })
}
