//! Host capabilities consumed by the engine.
//!
//! The host owns the console (command execution, settings, notifications,
//! data directory) and the running match. Both sides are traits so the
//! engine can be driven by the real host or by the reference implementations
//! in this module:
//!
//! - [`console`] - file-backed console with binds, aliases, scripts and settings
//! - [`cvars`] - registered settings with defaults
//! - [`game`] - in-memory match state
//!
//! Every capability may be unavailable; callers treat that as a no-op.

pub mod console;
pub mod cvars;
pub mod game;

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::config::ConfigError;

pub use console::ConsoleHost;
pub use cvars::CvarStore;
pub use game::{LocalGame, LocalMatch};

/// Title used for every notification raised by this plugin.
pub const TOAST_TITLE: &str = "MatchAdminHotkeys";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum HostError {
    #[error("Host file operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Script not found: {0}")]
    ScriptNotFound(String),

    #[error("Command nesting exceeds {0} levels")]
    RecursionLimit(usize),

    #[error("Unknown setting: {0}")]
    UnknownCvar(String),

    #[error("Failed to persist settings: {0}")]
    Settings(#[from] ConfigError),
}

// ============================================================================
// Console Capabilities
// ============================================================================

/// Console side of the host: commands, settings, notifications, files.
pub trait Console: Send + Sync {
    /// Run one or more `;`-separated console commands.
    fn execute(&self, command: &str) -> Result<(), HostError>;

    /// Current value of a registered setting.
    fn cvar(&self, name: &str) -> Option<String>;

    fn set_cvar(&self, name: &str, value: &str) -> Result<(), HostError>;

    /// Show a short user-facing notification.
    fn toast(&self, title: &str, message: &str);

    /// Root of the host's data directory.
    fn data_dir(&self) -> PathBuf;

    /// `<data-dir>/cfg`, where bind files and scripts live.
    fn cfg_dir(&self) -> PathBuf {
        self.data_dir().join("cfg")
    }
}

// ============================================================================
// Game Capabilities
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Team {
    Blue,
    Orange,
}

/// Opaque handle for a player controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlayerId(pub u32);

/// Game side of the host.
pub trait GameServer: Send + Sync {
    fn is_in_game(&self) -> bool;

    /// The active match, if the host can resolve one.
    fn current_match(&self) -> Option<Arc<dyn MatchState>>;
}

/// Live state of one match.
pub trait MatchState: Send + Sync {
    /// Score of `team`, or `None` when the team cannot be resolved.
    fn score(&self, team: Team) -> Option<i32>;

    fn set_score(&self, team: Team, score: i32);

    /// Player currently holding the pause, if paused.
    fn pauser(&self) -> Option<PlayerId>;

    /// Local player controller, if one can be resolved.
    fn local_player(&self) -> Option<PlayerId>;

    fn set_paused(&self, by: PlayerId, paused: bool);

    fn start_new_round(&self);
}
