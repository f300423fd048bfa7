//! Phantom bind detection for the host's `binds.cfg`.
//!
//! A line is a candidate when it has the shape `bind <key> "<command>"`
//! (the `bind` token is case-insensitive) and `<command>` mentions any of the
//! six action identifiers. Every such key is reported, whatever the current
//! mapping says: the applier rebinds the wanted keys afterwards.
use std::collections::BTreeSet;
use std::path::Path;

use crate::keybindings::ActionId;

/// Keys found bound to an action identifier.
pub type PhantomKeys = BTreeSet<String>;

/// Scan bind file contents and return every key bound to an action identifier.
pub fn scan(contents: &str) -> PhantomKeys {
    contents
        .lines()
        .filter_map(parse_bind_line)
        .filter(|(_, command)| mentions_action(command))
        .map(|(key, _)| key.to_string())
        .collect()
}

/// Read and scan a bind file. Missing or unreadable files scan as empty.
pub fn scan_file(path: &Path) -> PhantomKeys {
    match std::fs::read_to_string(path) {
        Ok(contents) => scan(&contents),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Bind file not readable, nothing to scrub");
            PhantomKeys::new()
        }
    }
}

/// `unbind <key>;` for each key, or `None` when there is nothing to unbind.
pub fn unbind_command(keys: &PhantomKeys) -> Option<String> {
    if keys.is_empty() {
        return None;
    }
    Some(keys.iter().map(|k| format!("unbind {};", k)).collect())
}

fn mentions_action(command: &str) -> bool {
    ActionId::ALL
        .iter()
        .any(|a| command.contains(a.identifier()))
}

/// Split `bind <key> "<command>"` into key and command.
///
/// Anything after the closing quote is ignored. An empty command or a
/// missing closing quote is not a match.
fn parse_bind_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim_start();
    let keyword = line.get(..4)?;
    if !keyword.eq_ignore_ascii_case("bind") {
        return None;
    }

    let rest = &line[4..];
    let rest = strip_required_whitespace(rest)?;

    let key_end = rest.find(char::is_whitespace)?;
    let (key, rest) = rest.split_at(key_end);
    let rest = rest.trim_start().strip_prefix('"')?;

    let command_end = rest.find('"')?;
    let command = &rest[..command_end];
    if command.is_empty() {
        return None;
    }
    Some((key, command))
}

fn strip_required_whitespace(s: &str) -> Option<&str> {
    let trimmed = s.trim_start();
    if trimmed.len() == s.len() {
        return None;
    }
    Some(trimmed)
}

// ============================================================================
// Tests
// ============================================================================
