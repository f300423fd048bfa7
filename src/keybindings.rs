//! Key assignment model: the six admin actions and the letter bound to each.
//!
//! A [`KeyAssignmentSet`] always holds exactly six slots, one per [`ActionId`].
//! Duplicate letters are representable (the settings form may pass through an
//! invalid state while the user types) but [`KeyAssignmentSet::find_duplicate`]
//! must come back empty before anything is persisted.
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fmt;

// ============================================================================
// Action Enum
// ============================================================================

/// The fixed set of admin actions. Never extended at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionId {
    BluePlus,
    BlueMinus,
    OrangePlus,
    OrangeMinus,
    PauseToggle,
    ResetKickoff,
}

impl ActionId {
    /// All actions in canonical order. Bind commands and cfg output follow it.
    pub const ALL: [ActionId; 6] = [
        Self::BluePlus,
        Self::BlueMinus,
        Self::OrangePlus,
        Self::OrangeMinus,
        Self::PauseToggle,
        Self::ResetKickoff,
    ];

    /// Stable identifier the host dispatches on key press.
    pub const fn identifier(self) -> &'static str {
        match self {
            Self::BluePlus => "mah_blue_plus",
            Self::BlueMinus => "mah_blue_minus",
            Self::OrangePlus => "mah_orange_plus",
            Self::OrangeMinus => "mah_orange_minus",
            Self::PauseToggle => "mah_pause_toggle",
            Self::ResetKickoff => "mah_reset_kickoff",
        }
    }

    /// Name of the host setting that stores this action's key.
    pub const fn cvar_name(self) -> &'static str {
        match self {
            Self::BluePlus => "mah_key_blue_plus",
            Self::BlueMinus => "mah_key_blue_minus",
            Self::OrangePlus => "mah_key_orange_plus",
            Self::OrangeMinus => "mah_key_orange_minus",
            Self::PauseToggle => "mah_key_pause_toggle",
            Self::ResetKickoff => "mah_key_reset_kickoff",
        }
    }

    /// Short name used in the settings file and on the command line.
    pub const fn short_name(self) -> &'static str {
        match self {
            Self::BluePlus => "blue_plus",
            Self::BlueMinus => "blue_minus",
            Self::OrangePlus => "orange_plus",
            Self::OrangeMinus => "orange_minus",
            Self::PauseToggle => "pause_toggle",
            Self::ResetKickoff => "reset_kickoff",
        }
    }

    pub const fn default_key(self) -> KeyCode {
        match self {
            Self::BluePlus => KeyCode::U,
            Self::BlueMinus => KeyCode::J,
            Self::OrangePlus => KeyCode::I,
            Self::OrangeMinus => KeyCode::K,
            Self::PauseToggle => KeyCode::P,
            Self::ResetKickoff => KeyCode::O,
        }
    }

    /// Human-readable description for help output.
    pub fn describe(self) -> &'static str {
        match self {
            Self::BluePlus => "Add 1 to Blue",
            Self::BlueMinus => "Remove 1 from Blue",
            Self::OrangePlus => "Add 1 to Orange",
            Self::OrangeMinus => "Remove 1 from Orange",
            Self::PauseToggle => "Toggle server pause",
            Self::ResetKickoff => "Reset to kickoff",
        }
    }

    /// Look up an action by its host identifier (`mah_blue_plus`, ...).
    pub fn from_identifier(identifier: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|a| a.identifier() == identifier)
    }

    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Parse an action name as typed by a user or found in a settings file.
///
/// Accepts the short name (`blue_plus`), its dashed or squashed forms
/// (`blue-plus`, `blueplus`), `pause`/`reset`/`kickoff`, and the host identifier.
pub fn parse_action_name(name: &str) -> Option<ActionId> {
    let name = name.trim().to_lowercase().replace('-', "_");
    if let Some(action) = ActionId::from_identifier(&name) {
        return Some(action);
    }
    match name.as_str() {
        "blue_plus" | "blueplus" => Some(ActionId::BluePlus),
        "blue_minus" | "blueminus" => Some(ActionId::BlueMinus),
        "orange_plus" | "orangeplus" => Some(ActionId::OrangePlus),
        "orange_minus" | "orangeminus" => Some(ActionId::OrangeMinus),
        "pause_toggle" | "pausetoggle" | "pause" => Some(ActionId::PauseToggle),
        "reset_kickoff" | "resetkickoff" | "reset" | "kickoff" => Some(ActionId::ResetKickoff),
        _ => None,
    }
}

// ============================================================================
// Key Code
// ============================================================================

/// A single uppercase ASCII letter, or unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct KeyCode(Option<char>);

impl KeyCode {
    pub const UNSET: KeyCode = KeyCode(None);

    const U: KeyCode = KeyCode(Some('U'));
    const J: KeyCode = KeyCode(Some('J'));
    const I: KeyCode = KeyCode(Some('I'));
    const K: KeyCode = KeyCode(Some('K'));
    const P: KeyCode = KeyCode(Some('P'));
    const O: KeyCode = KeyCode(Some('O'));

    /// Normalize raw user input: the first character, uppercased, if it is an
    /// ASCII letter. Anything else yields [`KeyCode::UNSET`].
    pub fn normalize(input: &str) -> Self {
        match input.chars().next() {
            Some(c) if c.is_ascii_alphabetic() => Self(Some(c.to_ascii_uppercase())),
            _ => Self::UNSET,
        }
    }

    /// Build a key from a character, normalizing it the same way as text input.
    pub fn from_char(c: char) -> Self {
        if c.is_ascii_alphabetic() {
            Self(Some(c.to_ascii_uppercase()))
        } else {
            Self::UNSET
        }
    }

    pub fn as_char(self) -> Option<char> {
        self.0
    }

    pub fn is_unset(self) -> bool {
        self.0.is_none()
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(c) => write!(f, "{}", c),
            None => Ok(()),
        }
    }
}

impl Serialize for KeyCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ============================================================================
// Key Assignment Set
// ============================================================================

/// Action → key mapping covering all six actions.
///
/// Equality is structural over the six slots; command overrides live in
/// [`CommandOverrides`] and never take part in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyAssignmentSet {
    keys: [KeyCode; 6],
}

impl KeyAssignmentSet {
    /// The fixed default mapping: `U, J, I, K, P, O` in canonical order.
    pub const fn defaults() -> Self {
        Self {
            keys: [
                ActionId::BluePlus.default_key(),
                ActionId::BlueMinus.default_key(),
                ActionId::OrangePlus.default_key(),
                ActionId::OrangeMinus.default_key(),
                ActionId::PauseToggle.default_key(),
                ActionId::ResetKickoff.default_key(),
            ],
        }
    }

    /// Build from keys given in canonical action order.
    pub const fn from_keys(keys: [KeyCode; 6]) -> Self {
        Self { keys }
    }

    pub fn get(&self, action: ActionId) -> KeyCode {
        self.keys[action.index()]
    }

    pub fn set(&mut self, action: ActionId, key: KeyCode) {
        self.keys[action.index()] = key;
    }

    /// Slots in canonical action order.
    pub fn iter(&self) -> impl Iterator<Item = (ActionId, KeyCode)> + '_ {
        ActionId::ALL.into_iter().map(|a| (a, self.get(a)))
    }

    /// First letter assigned to more than one action, scanning in canonical
    /// order. Unset slots never collide with each other.
    pub fn find_duplicate(&self) -> Option<char> {
        let mut seen = [false; 26];
        for key in self.keys {
            let Some(c) = key.as_char() else {
                continue;
            };
            let slot = (c as u8 - b'A') as usize;
            if seen[slot] {
                return Some(c);
            }
            seen[slot] = true;
        }
        None
    }

    pub fn is_default(&self) -> bool {
        *self == Self::defaults()
    }

    /// Actions currently sharing `key` (empty for an unset key).
    pub fn actions_for(&self, key: KeyCode) -> Vec<ActionId> {
        if key.is_unset() {
            return Vec::new();
        }
        self.iter()
            .filter(|(_, k)| *k == key)
            .map(|(a, _)| a)
            .collect()
    }
}

impl Default for KeyAssignmentSet {
    fn default() -> Self {
        Self::defaults()
    }
}

impl Serialize for KeyAssignmentSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.keys.len()))?;
        for (action, key) in self.iter() {
            map.serialize_entry(action.short_name(), &key)?;
        }
        map.end()
    }
}

// ============================================================================
// Command Overrides
// ============================================================================

/// Free-text fallback commands run by the pause and reset handlers.
///
/// Not subject to duplicate-key rules; either may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandOverrides {
    pub pause_cmd: String,
    pub reset_cmd: String,
}

/// Host setting holding the fallback pause command.
pub const CVAR_PAUSE_CMD: &str = "mah_pause_cmd";
/// Host setting holding the command run before a kickoff reset.
pub const CVAR_RESET_CMD: &str = "mah_reset_cmd";
/// Host setting that gates all six handlers.
pub const CVAR_ENABLED: &str = "mah_enabled";

// ============================================================================
// Tests
// ============================================================================
