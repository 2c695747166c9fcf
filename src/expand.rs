//! Policy hook for `!` history expansion. The expansion itself belongs to
//! the line editor; this only answers whether a given `!` may expand.

use crate::config::ExpandMode;

/// Whether the `!` at byte `marker_pos` of `line` must be left alone.
#[must_use]
pub fn history_expansion_inhibited(mode: ExpandMode, line: &str, marker_pos: usize) -> bool {
    let (inhibit_single, inhibit_double) = match mode {
        ExpandMode::Off => return true,
        ExpandMode::On => return false,
        ExpandMode::NotSquoted => (true, false),
        ExpandMode::NotDquoted => (false, true),
        ExpandMode::NotQuoted => (true, true),
    };

    let mut in_quote: Option<u8> = None;
    for &byte in line.as_bytes().iter().take(marker_pos) {
        if byte != b'\'' && byte != b'"' {
            continue;
        }
        // A different quote character replaces the open one.
        in_quote = if in_quote == Some(byte) { None } else { Some(byte) };
    }

    match in_quote {
        Some(b'\'') => inhibit_single,
        Some(b'"') => inhibit_double,
        _ => false,
    }
}
