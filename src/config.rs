//! Persisted settings file (`<data-dir>/cfg/matchadminhotkeys.toml`).
//!
//! The file is optional: a missing file yields `Settings::default()`.
//! Unknown keys are accepted by serde (`deny_unknown_fields` off) and logged
//! as warnings.
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use thiserror::Error;

use crate::keybindings::{
    ActionId, CommandOverrides, KeyAssignmentSet, KeyCode, CVAR_ENABLED, CVAR_PAUSE_CMD,
    CVAR_RESET_CMD,
};

/// File name of the settings file inside `<data-dir>/cfg`.
pub const SETTINGS_FILE_NAME: &str = "matchadminhotkeys.toml";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in settings file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Settings file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Settings Structs
// ============================================================================

/// Key letters as stored on disk. Raw strings; normalized by [`Settings::assignments`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeySettings {
    pub blue_plus: String,
    pub blue_minus: String,
    pub orange_plus: String,
    pub orange_minus: String,
    pub pause_toggle: String,
    pub reset_kickoff: String,
}

impl KeySettings {
    fn slot(&self, action: ActionId) -> &str {
        match action {
            ActionId::BluePlus => &self.blue_plus,
            ActionId::BlueMinus => &self.blue_minus,
            ActionId::OrangePlus => &self.orange_plus,
            ActionId::OrangeMinus => &self.orange_minus,
            ActionId::PauseToggle => &self.pause_toggle,
            ActionId::ResetKickoff => &self.reset_kickoff,
        }
    }

    fn slot_mut(&mut self, action: ActionId) -> &mut String {
        match action {
            ActionId::BluePlus => &mut self.blue_plus,
            ActionId::BlueMinus => &mut self.blue_minus,
            ActionId::OrangePlus => &mut self.orange_plus,
            ActionId::OrangeMinus => &mut self.orange_minus,
            ActionId::PauseToggle => &mut self.pause_toggle,
            ActionId::ResetKickoff => &mut self.reset_kickoff,
        }
    }
}

impl Default for KeySettings {
    fn default() -> Self {
        let mut keys = Self {
            blue_plus: String::new(),
            blue_minus: String::new(),
            orange_plus: String::new(),
            orange_minus: String::new(),
            pause_toggle: String::new(),
            reset_kickoff: String::new(),
        };
        for action in ActionId::ALL {
            *keys.slot_mut(action) = action.default_key().to_string();
        }
        keys
    }
}

/// Persisted hotkey settings.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Master switch for the six handlers.
    pub enabled: bool,

    /// Fallback pause command(s), `;`-separated. Empty = none.
    pub pause_cmd: String,

    /// Command(s) run before a kickoff reset. Empty = none.
    pub reset_cmd: String,

    pub keys: KeySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            pause_cmd: String::new(),
            reset_cmd: String::new(),
            keys: KeySettings::default(),
        }
    }
}

impl Settings {
    /// Maximum settings file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 4] = ["enabled", "pause_cmd", "reset_cmd", "keys"];

    /// Load settings from a TOML file.
    ///
    /// - Missing file → `Ok(Settings::default())`
    /// - Empty file → `Ok(Settings::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)`
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Settings file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No settings file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Settings file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Settings file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in settings file, ignoring");
                }
            }
        }

        let mut settings: Settings = toml::from_str(&content)?;
        settings.normalize_keys();
        tracing::info!(path = %path.display(), enabled = settings.enabled, "Loaded settings");
        Ok(settings)
    }

    /// Write settings to `path`, replacing the previous file atomically.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        write_atomic(path, content.as_bytes())?;
        tracing::debug!(path = %path.display(), "Saved settings");
        Ok(())
    }

    /// The six key letters as a validated-shape assignment set.
    pub fn assignments(&self) -> KeyAssignmentSet {
        let mut set = KeyAssignmentSet::defaults();
        for action in ActionId::ALL {
            set.set(action, KeyCode::normalize(self.keys.slot(action)));
        }
        set
    }

    pub fn set_assignments(&mut self, set: &KeyAssignmentSet) {
        for (action, key) in set.iter() {
            *self.keys.slot_mut(action) = key.to_string();
        }
    }

    pub fn overrides(&self) -> CommandOverrides {
        CommandOverrides {
            pause_cmd: self.pause_cmd.clone(),
            reset_cmd: self.reset_cmd.clone(),
        }
    }

    /// Flatten into host setting name/value pairs.
    pub fn to_cvars(&self) -> Vec<(&'static str, String)> {
        let mut cvars: Vec<(&'static str, String)> = ActionId::ALL
            .into_iter()
            .map(|a| (a.cvar_name(), self.keys.slot(a).to_string()))
            .collect();
        cvars.push((CVAR_PAUSE_CMD, self.pause_cmd.clone()));
        cvars.push((CVAR_RESET_CMD, self.reset_cmd.clone()));
        cvars.push((CVAR_ENABLED, bool_cvar(self.enabled).to_string()));
        cvars
    }

    /// Rebuild from host settings. Names the lookup doesn't know keep their defaults.
    pub fn from_cvars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();
        for action in ActionId::ALL {
            if let Some(value) = lookup(action.cvar_name()) {
                *settings.keys.slot_mut(action) = value;
            }
        }
        if let Some(value) = lookup(CVAR_PAUSE_CMD) {
            settings.pause_cmd = value;
        }
        if let Some(value) = lookup(CVAR_RESET_CMD) {
            settings.reset_cmd = value;
        }
        if let Some(value) = lookup(CVAR_ENABLED) {
            settings.enabled = parse_bool_cvar(&value).unwrap_or(true);
        }
        settings.normalize_keys();
        settings
    }

    fn normalize_keys(&mut self) {
        for action in ActionId::ALL {
            let slot = self.keys.slot_mut(action);
            *slot = KeyCode::normalize(slot).to_string();
        }
    }
}

/// Host boolean settings are stored as `1` / `0`.
pub fn bool_cvar(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

/// Parse a host boolean setting. Accepts `1`/`0` and `true`/`false`.
pub fn parse_bool_cvar(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

/// Replace `dst` with `content` using write-to-temp-then-rename, so readers
/// never observe a partially written file.
pub(crate) fn write_atomic(dst: &Path, content: &[u8]) -> std::io::Result<()> {
    use std::time::{SystemTime, UNIX_EPOCH};
    let random_suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let temp_path = dst.with_extension(format!("tmp.{:016x}", random_suffix));

    let mut temp_file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)?;

    let written = temp_file
        .write_all(content)
        .and_then(|()| temp_file.sync_all());
    drop(temp_file);
    if let Err(e) = written {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e);
    }

    // On Windows, rename fails if destination exists
    #[cfg(windows)]
    if dst.exists() {
        if let Err(e) = std::fs::remove_file(dst) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e);
        }
    }

    std::fs::rename(&temp_path, dst).inspect_err(|_| {
        let _ = std::fs::remove_file(&temp_path);
    })
}

// ============================================================================
// Tests
// ============================================================================
