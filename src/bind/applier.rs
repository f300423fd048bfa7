//! Translation of a validated assignment set into host commands and the
//! private `matchadminhotkeys.cfg` script.
//!
//! Every bind sequence starts with an unbind of all letters (both cases) and
//! the legacy key, so a letter can never stay bound to an action it no longer
//! belongs to.
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::scrubber::PhantomKeys;
use crate::config::write_atomic;
use crate::keybindings::{
    ActionId, CommandOverrides, KeyAssignmentSet, KeyCode, CVAR_PAUSE_CMD, CVAR_RESET_CMD,
};

/// File name of the private script inside `<data-dir>/cfg`.
pub const CONFIG_FILE_NAME: &str = "matchadminhotkeys.cfg";
pub const UNBIND_ALL_ALIAS: &str = "mah_unbind_all";
pub const BIND_ALIAS: &str = "mah_bind_letters";
/// Key bound by earlier releases, still cleared on every apply.
pub const LEGACY_KEY: &str = "Slash";

const HEADER: &[&str] = &[
    "// MatchAdminHotkeys configuration",
    "// Rewritten by the plugin on every save. Single-letter keys only.",
    "// mah_unbind_all clears A-Z in both cases plus legacy keys before rebinding.",
    "// Prefer letters that are not already used by the game's own controls.",
];

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("Failed to write hotkey config {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read hotkey config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed hotkey config: {0}")]
    Malformed(String),
}

// ============================================================================
// Command Building
// ============================================================================

/// One command that unbinds every letter (upper and lower case) and the legacy key.
pub fn build_unbind_all() -> String {
    let mut cmd = String::with_capacity(26 * 20 + 16);
    for c in 'A'..='Z' {
        cmd.push_str(&format!("unbind {};unbind {};", c, c.to_ascii_lowercase()));
    }
    cmd.push_str(&format!("unbind {};", LEGACY_KEY));
    cmd
}

/// `bind <key> <identifier>` per assigned action, canonical order. Unset slots are skipped.
fn bind_statements(set: &KeyAssignmentSet) -> Vec<String> {
    set.iter()
        .filter(|(_, key)| !key.is_unset())
        .map(|(action, key)| format!("bind {} {}", key, action.identifier()))
        .collect()
}

/// Builds bind command sequences, clearing scrubbed phantom keys first.
#[derive(Debug, Clone, Default)]
pub struct BindApplier {
    phantoms: PhantomKeys,
}

impl BindApplier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also unbind these keys (typically the scrubber's findings) before rebinding.
    pub fn with_phantoms(phantoms: PhantomKeys) -> Self {
        Self { phantoms }
    }

    pub fn phantoms(&self) -> &PhantomKeys {
        &self.phantoms
    }

    /// Unbind-all, then phantom unbinds, then one bind per assigned action.
    pub fn build_bind_commands(&self, set: &KeyAssignmentSet) -> String {
        let mut cmd = build_unbind_all();
        for key in &self.phantoms {
            cmd.push_str(&format!("unbind {};", key));
        }
        for stmt in bind_statements(set) {
            cmd.push_str(&stmt);
            cmd.push(';');
        }
        cmd
    }
}

// ============================================================================
// Private Config File
// ============================================================================

/// Render the full private script for `set` and `overrides`.
pub fn render_config(set: &KeyAssignmentSet, overrides: &CommandOverrides) -> String {
    let mut out = String::new();
    for line in HEADER {
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');

    out.push_str(&format!(
        "alias {} \"{}\"\n",
        UNBIND_ALL_ALIAS,
        build_unbind_all()
    ));

    let body: Vec<String> = std::iter::once(UNBIND_ALL_ALIAS.to_string())
        .chain(bind_statements(set))
        .collect();
    out.push_str(&format!("alias {} \"{}\"\n", BIND_ALIAS, body.join(";")));
    out.push_str(BIND_ALIAS);
    out.push('\n');

    out.push_str(&format!(
        "{} \"{}\"\n",
        CVAR_PAUSE_CMD,
        quote_safe(CVAR_PAUSE_CMD, &overrides.pause_cmd)
    ));
    out.push_str(&format!(
        "{} \"{}\"\n",
        CVAR_RESET_CMD,
        quote_safe(CVAR_RESET_CMD, &overrides.reset_cmd)
    ));
    out
}

/// Overwrite `path` with the rendered script.
///
/// Nothing is created besides the file itself: a missing `cfg` directory is
/// reported as a write failure.
pub fn write_config_file(
    set: &KeyAssignmentSet,
    overrides: &CommandOverrides,
    path: &Path,
) -> Result<(), ApplyError> {
    let content = render_config(set, overrides);
    write_atomic(path, content.as_bytes()).map_err(|source| {
        tracing::warn!(path = %path.display(), error = %source, "Failed to open hotkey config for writing");
        ApplyError::Write {
            path: path.to_path_buf(),
            source,
        }
    })?;
    tracing::info!(path = %path.display(), "Wrote hotkey config");
    Ok(())
}

/// Assignments and overrides recovered from a private script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedConfig {
    pub assignments: KeyAssignmentSet,
    pub overrides: CommandOverrides,
}

/// Parse a script produced by [`render_config`].
///
/// Actions absent from the bind alias come back unset. Missing override lines
/// come back empty.
pub fn parse_config(text: &str) -> Result<ParsedConfig, ApplyError> {
    let mut assignments = None;
    let mut overrides = CommandOverrides::default();

    for line in text.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("alias ") {
            let Some((name, body)) = rest.trim_start().split_once(char::is_whitespace) else {
                continue;
            };
            if name == BIND_ALIAS {
                assignments = Some(parse_bind_alias(unquote(body.trim())?)?);
            }
        } else if let Some(value) = cvar_value(line, CVAR_PAUSE_CMD) {
            overrides.pause_cmd = unquote(value)?.to_string();
        } else if let Some(value) = cvar_value(line, CVAR_RESET_CMD) {
            overrides.reset_cmd = unquote(value)?.to_string();
        }
    }

    let assignments = assignments
        .ok_or_else(|| ApplyError::Malformed(format!("no `{}` alias", BIND_ALIAS)))?;
    Ok(ParsedConfig {
        assignments,
        overrides,
    })
}

/// Read and parse the private script at `path`.
pub fn load_config_file(path: &Path) -> Result<ParsedConfig, ApplyError> {
    let text = std::fs::read_to_string(path).map_err(|source| ApplyError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&text)
}

fn parse_bind_alias(body: &str) -> Result<KeyAssignmentSet, ApplyError> {
    let mut set = KeyAssignmentSet::from_keys([KeyCode::UNSET; 6]);
    for stmt in body.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        if stmt == UNBIND_ALL_ALIAS {
            continue;
        }
        let mut parts = stmt.split_whitespace();
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some("bind"), Some(key), Some(identifier), None) => {
                let action = ActionId::from_identifier(identifier).ok_or_else(|| {
                    ApplyError::Malformed(format!("unknown action `{}`", identifier))
                })?;
                set.set(action, KeyCode::normalize(key));
            }
            _ => {
                return Err(ApplyError::Malformed(format!(
                    "unexpected statement `{}` in `{}`",
                    stmt, BIND_ALIAS
                )))
            }
        }
    }
    Ok(set)
}

fn cvar_value<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(name)?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(rest.trim())
}

fn unquote(value: &str) -> Result<&str, ApplyError> {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .ok_or_else(|| ApplyError::Malformed(format!("expected quoted value, got `{}`", value)))
}

/// Overrides are written inside double quotes; embedded quotes become single
/// quotes and line breaks are dropped.
fn quote_safe(name: &str, value: &str) -> String {
    let cleaned: String = value
        .chars()
        .filter(|c| *c != '\n' && *c != '\r')
        .map(|c| if c == '"' { '\'' } else { c })
        .collect();
    if cleaned != value {
        tracing::warn!(cvar = %name, "Override contained quotes or line breaks, sanitized");
    }
    cleaned
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn set_of(letters: &str) -> KeyAssignmentSet {
        let mut keys = [KeyCode::UNSET; 6];
        for (slot, c) in keys.iter_mut().zip(letters.chars()) {
            *slot = KeyCode::from_char(c);
        }
        KeyAssignmentSet::from_keys(keys)
    }

    #[test]
    fn test_unbind_all_covers_both_cases_and_legacy_key() {
        let cmd = build_unbind_all();
        assert!(cmd.starts_with("unbind A;unbind a;unbind B;unbind b;"));
        assert!(cmd.ends_with("unbind Z;unbind z;unbind Slash;"));
        assert_eq!(cmd.matches("unbind ").count(), 53);
    }

    #[test]
    fn test_bind_commands_follow_unbind_all() {
        let applier = BindApplier::with_phantoms(["F1".to_string()].into_iter().collect());
        let cmd = applier.build_bind_commands(&KeyAssignmentSet::defaults());
        let tail = cmd.strip_prefix(&build_unbind_all()).unwrap();
        assert_eq!(
            tail,
            "unbind F1;bind U mah_blue_plus;bind J mah_blue_minus;bind I mah_orange_plus;\
             bind K mah_orange_minus;bind P mah_pause_toggle;bind O mah_reset_kickoff;"
        );
    }

    #[test]
    fn test_bind_commands_skip_unset_slots() {
        let cmd = BindApplier::new().build_bind_commands(&set_of("U-IKPO"));
        assert!(!cmd.contains("mah_blue_minus"));
        assert!(cmd.contains("bind U mah_blue_plus;"));
    }

    #[test]
    fn test_render_config_layout() {
        let overrides = CommandOverrides {
            pause_cmd: "pause".to_string(),
            reset_cmd: String::new(),
        };
        let text = render_config(&set_of("ILJKPO"), &overrides);
        let lines: Vec<&str> = text.lines().filter(|l| !l.starts_with("//")).collect();
        let unbind_line = format!("alias mah_unbind_all \"{}\"", build_unbind_all());
        assert_eq!(
            lines,
            vec![
                "",
                unbind_line.as_str(),
                "alias mah_bind_letters \"mah_unbind_all;bind I mah_blue_plus;bind L mah_blue_minus;\
                 bind J mah_orange_plus;bind K mah_orange_minus;bind P mah_pause_toggle;\
                 bind O mah_reset_kickoff\"",
                "mah_bind_letters",
                "mah_pause_cmd \"pause\"",
                "mah_reset_cmd \"\"",
            ]
        );
    }

    #[test]
    fn test_override_quotes_sanitized() {
        let overrides = CommandOverrides {
            pause_cmd: "say \"hi\"\nrestart".to_string(),
            reset_cmd: String::new(),
        };
        let text = render_config(&KeyAssignmentSet::defaults(), &overrides);
        assert!(text.contains("mah_pause_cmd \"say 'hi'restart\"\n"));
    }

    #[test]
    fn test_write_and_load_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let overrides = CommandOverrides {
            pause_cmd: "pause_server".to_string(),
            reset_cmd: "ballontop".to_string(),
        };
        write_config_file(&set_of("QWERTY"), &overrides, &path).unwrap();

        let parsed = load_config_file(&path).unwrap();
        assert_eq!(parsed.assignments, set_of("QWERTY"));
        assert_eq!(parsed.overrides, overrides);
    }

    #[test]
    fn test_write_config_file_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join(CONFIG_FILE_NAME);
        let err = write_config_file(
            &KeyAssignmentSet::defaults(),
            &CommandOverrides::default(),
            &path,
        )
        .unwrap_err();
        assert!(matches!(err, ApplyError::Write { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn test_write_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let set = set_of("ABCDEF");
        write_config_file(&set, &CommandOverrides::default(), &path).unwrap();
        let first = std::fs::read_to_string(&path).unwrap();
        write_config_file(&set, &CommandOverrides::default(), &path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), first);
    }

    #[test]
    fn test_parse_config_without_bind_alias_is_malformed() {
        let err = parse_config("mah_pause_cmd \"\"\n").unwrap_err();
        assert!(matches!(err, ApplyError::Malformed(_)));
    }

    #[test]
    fn test_parse_config_unknown_identifier_is_malformed() {
        let err = parse_config("alias mah_bind_letters \"bind U mah_fly\"\n").unwrap_err();
        assert!(err.to_string().contains("mah_fly"));
    }

    proptest! {
        #[test]
        fn prop_render_then_parse_round_trips(
            letters in proptest::sample::subsequence(('A'..='Z').collect::<Vec<_>>(), 6)
                .prop_shuffle(),
            pause_cmd in "[a-z_ ;]{0,16}",
            reset_cmd in "[a-z_ ;]{0,16}",
        ) {
            let set = set_of(&letters.iter().collect::<String>());
            let overrides = CommandOverrides { pause_cmd, reset_cmd };
            let parsed = parse_config(&render_config(&set, &overrides)).unwrap();
            prop_assert_eq!(parsed.assignments, set);
            prop_assert_eq!(parsed.overrides, overrides);
        }
    }
}
