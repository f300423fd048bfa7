//! Line-driven session over the settings form.
//!
//! Reads one command per line (`edit`, `save`, `revert`, `reset`, `status`,
//! `plan`, `press`, `help`, `quit`). Key presses are forwarded over a channel
//! to a separate task that dispatches them through the host binds, so they
//! only ever see the mapping that was last applied.
use std::sync::Arc;

use anyhow::Result;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::controller::{ControllerStatus, EditState, ReconcileError, ReconciliationController};
use crate::host::ConsoleHost;
use crate::keybindings::{parse_action_name, ActionId};

const HELP: &str = "\
commands:
  edit <action> <key>   assign a key (unsaved until `save`)
  save                  apply and persist the working keys
  revert                discard unsaved edits
  reset                 restore and apply the default keys
  status                show working and saved keys
  plan                  show the commands a save would run
  press <key>           simulate a key press
  quit                  leave the session";

/// Whether the loop keeps reading after a line.
pub enum Action {
    Continue,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Edit { action: ActionId, key: String },
    Save,
    Revert,
    Reset,
    Status,
    Plan,
    Press(String),
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command: {0} (try `help`)")]
    Unknown(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Usage: {0}")]
    Usage(&'static str),
}

/// Parse one input line. Blank lines and `#` comments yield `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let mut parts = line.split_whitespace();
    let head = parts.next().unwrap_or_default().to_lowercase();
    let args: Vec<&str> = parts.collect();

    let command = match (head.as_str(), args.as_slice()) {
        ("edit" | "set", [action, key]) => Command::Edit {
            action: parse_action_name(action)
                .ok_or_else(|| CommandError::UnknownAction(action.to_string()))?,
            key: key.to_string(),
        },
        ("edit" | "set", [action]) => Command::Edit {
            action: parse_action_name(action)
                .ok_or_else(|| CommandError::UnknownAction(action.to_string()))?,
            key: String::new(),
        },
        ("edit" | "set", _) => return Err(CommandError::Usage("edit <action> <key>")),
        ("press", [key]) => Command::Press(key.to_string()),
        ("press", _) => return Err(CommandError::Usage("press <key>")),
        ("save", []) => Command::Save,
        ("revert", []) => Command::Revert,
        ("reset", []) => Command::Reset,
        ("status", []) => Command::Status,
        ("plan", []) => Command::Plan,
        ("help" | "?", _) => Command::Help,
        ("quit" | "exit", _) => Command::Quit,
        _ => return Err(CommandError::Unknown(line.to_string())),
    };
    Ok(Some(command))
}

/// Human-readable key table for `status`.
pub fn format_status(status: &ControllerStatus) -> String {
    let mut out = String::new();
    for action in ActionId::ALL {
        let working = status.working.get(action);
        let saved = status.snapshot.get(action);
        let marker = if working == saved { " " } else { "*" };
        out.push_str(&format!(
            "{} {:<22} {:<3} (saved: {})\n",
            marker,
            action.describe(),
            display_key(&working.to_string()),
            display_key(&saved.to_string()),
        ));
    }
    out.push_str(&format!("state: {}", status.state));
    if let Some(key) = status.duplicate {
        out.push_str(&format!(
            "\nDuplicate key: {} is assigned to multiple actions",
            key
        ));
    }
    out
}

fn display_key(key: &str) -> &str {
    if key.is_empty() {
        "-"
    } else {
        key
    }
}

/// Run the session until `quit` or end of input.
///
/// Pending key presses are drained before returning.
pub async fn run<R, W>(
    controller: &mut ReconciliationController,
    host: Arc<ConsoleHost>,
    input: R,
    mut output: W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (press_tx, mut press_rx) = mpsc::channel::<String>(32);
    let presses = tokio::spawn(async move {
        while let Some(key) = press_rx.recv().await {
            match host.press(&key) {
                Ok(true) => tracing::debug!(key = %key, "Key press dispatched"),
                Ok(false) => tracing::info!(key = %key, "Key is not bound"),
                Err(e) => tracing::warn!(key = %key, error = %e, "Key press failed"),
            }
        }
    });

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        match handle_line(controller, &press_tx, &line, &mut output).await? {
            Action::Continue => {}
            Action::Quit => break,
        }
    }

    drop(press_tx);
    presses.await?;
    output.flush().await?;
    Ok(())
}

async fn handle_line<W>(
    controller: &mut ReconciliationController,
    press_tx: &mpsc::Sender<String>,
    line: &str,
    output: &mut W,
) -> Result<Action>
where
    W: AsyncWrite + Unpin,
{
    let command = match parse_command(line) {
        Ok(Some(command)) => command,
        Ok(None) => return Ok(Action::Continue),
        Err(e) => {
            say(output, &e.to_string()).await?;
            return Ok(Action::Continue);
        }
    };

    let reply = match command {
        Command::Edit { action, key } => {
            let state = controller.edit(action, &key);
            let key = controller.working().get(action).to_string();
            match (state, controller.duplicate()) {
                (EditState::Invalid, Some(dup)) => format!(
                    "{} = {} ({})\nDuplicate key: {} is assigned to multiple actions",
                    action,
                    display_key(&key),
                    state,
                    dup
                ),
                _ => format!("{} = {} ({})", action, display_key(&key), state),
            }
        }
        Command::Save => match controller.save() {
            Ok(()) => "Keybinds saved".to_string(),
            Err(ReconcileError::NothingToSave) => "No unsaved changes".to_string(),
            Err(e) => format!("Save failed: {}", e),
        },
        Command::Revert => {
            if controller.revert() {
                "Reverted to saved keybinds".to_string()
            } else {
                "No unsaved changes".to_string()
            }
        }
        Command::Reset => match controller.reset_to_defaults() {
            Ok(()) => "Defaults restored".to_string(),
            Err(ReconcileError::NothingToSave) => "Saved keybinds are already the defaults".to_string(),
            Err(e) => format!("Reset failed: {}", e),
        },
        Command::Status => format_status(&controller.status()),
        Command::Plan => controller
            .plan()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n"),
        Command::Press(key) => {
            press_tx.send(key.clone()).await?;
            format!("pressed {}", key)
        }
        Command::Help => HELP.to_string(),
        Command::Quit => return Ok(Action::Quit),
    };
    say(output, &reply).await?;
    Ok(Action::Continue)
}

async fn say<W>(output: &mut W, text: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    output.write_all(text.as_bytes()).await?;
    output.write_all(b"\n").await?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command_variants() {
        assert_eq!(parse_command("  "), Ok(None));
        assert_eq!(parse_command("# note"), Ok(None));
        assert_eq!(parse_command("SAVE"), Ok(Some(Command::Save)));
        assert_eq!(
            parse_command("edit pause q"),
            Ok(Some(Command::Edit {
                action: ActionId::PauseToggle,
                key: "q".to_string()
            }))
        );
        assert_eq!(
            parse_command("edit blue-minus"),
            Ok(Some(Command::Edit {
                action: ActionId::BlueMinus,
                key: String::new()
            }))
        );
        assert_eq!(
            parse_command("press F9"),
            Ok(Some(Command::Press("F9".to_string())))
        );
    }

    #[test]
    fn test_parse_command_errors() {
        assert_eq!(
            parse_command("edit nitro B"),
            Err(CommandError::UnknownAction("nitro".to_string()))
        );
        assert_eq!(
            parse_command("press"),
            Err(CommandError::Usage("press <key>"))
        );
        assert!(matches!(
            parse_command("jump"),
            Err(CommandError::Unknown(_))
        ));
    }
}
