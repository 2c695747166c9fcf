use std::io::{self, Write};

use serde::Serialize;
use tape_history::{history_expansion_inhibited, HistoryConfig, HistoryDb, HistoryError};
use thiserror::Error;

use crate::commands::{CommandError, HistoryCommand, USAGE};

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error("failed to encode history line: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),

    #[error("line was not added to history")]
    Rejected,
}

#[derive(Debug, Serialize)]
struct ListedLine<'a> {
    position: usize,
    bank: &'static str,
    offset: u32,
    text: &'a str,
}

/// Runs one command against the history at `config`. The CLI always works
/// on the master bank directly; it never leaves a session bank behind.
pub fn run(
    command: &HistoryCommand,
    mut config: HistoryConfig,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    match command {
        HistoryCommand::Help => {
            out.write_all(USAGE.as_bytes())?;
            return Ok(());
        }
        HistoryCommand::ExpandCheck { marker_pos, line } => {
            let inhibited = history_expansion_inhibited(config.expand_mode, line, *marker_pos);
            writeln!(out, "{}", if inhibited { "inhibited" } else { "expand" })?;
            return Ok(());
        }
        _ => {}
    }

    config.shared = true;
    let mut db = HistoryDb::new(config);
    db.initialise()?;
    db.load(false);
    tracing::debug!(?command, lines = db.len(), "running history command");

    match command {
        HistoryCommand::List { json } => list(&db, *json, out)?,
        HistoryCommand::Add(text) => {
            if !db.add(text) {
                return Err(CliError::Rejected);
            }
        }
        HistoryCommand::Delete(position) => {
            let position = *position;
            if position == 0 || position > db.len() {
                return Err(HistoryError::UnknownPosition {
                    position,
                    len: db.len(),
                }
                .into());
            }
            db.try_remove_at(position - 1, None)?;
        }
        HistoryCommand::Clear => db.clear()?,
        HistoryCommand::Compact => {
            let deleted = db.master_deleted_count();
            db.compact(true);
            writeln!(
                out,
                "compacted: {} active, {deleted} deleted",
                db.master_len()
            )?;
        }
        HistoryCommand::Help | HistoryCommand::ExpandCheck { .. } => {}
    }

    db.shutdown();
    Ok(())
}

fn list(db: &HistoryDb, json: bool, out: &mut dyn Write) -> Result<(), CliError> {
    for (index, line) in db.iter().enumerate() {
        let line = line?;
        let position = index + 1;
        if json {
            let listed = ListedLine {
                position,
                bank: line.id.bank.as_str(),
                offset: line.id.offset,
                text: &line.text,
            };
            writeln!(out, "{}", serde_json::to_string(&listed)?)?;
        } else {
            writeln!(out, "{position:>5}  {}", line.text)?;
        }
    }
    Ok(())
}
