//! Registered host settings ("cvars").
//!
//! Values are plain strings. A setting must be registered (with a default)
//! before it can be assigned; registering an existing name keeps its value.
use std::collections::BTreeMap;

use super::HostError;
use crate::config::Settings;

#[derive(Debug, Clone, Default)]
pub struct CvarStore {
    values: BTreeMap<String, String>,
}

impl CvarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the plugin's settings with values taken from `settings`.
    pub fn from_settings(settings: &Settings) -> Self {
        let mut store = Self::new();
        for (name, value) in settings.to_cvars() {
            store.register(name, &value);
        }
        store
    }

    /// Register `name` with `default`. An already registered value is kept.
    pub fn register(&mut self, name: &str, default: &str) {
        self.values
            .entry(name.to_string())
            .or_insert_with(|| default.to_string());
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: &str, value: &str) -> Result<(), HostError> {
        match self.values.get_mut(name) {
            Some(slot) => {
                *slot = value.to_string();
                Ok(())
            }
            None => Err(HostError::UnknownCvar(name.to_string())),
        }
    }

    /// Typed settings view for persistence.
    pub fn to_settings(&self) -> Settings {
        Settings::from_cvars(|name| self.get(name).map(str::to_string))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_settings_registers_plugin_cvars() {
        let store = CvarStore::from_settings(&Settings::default());
        assert_eq!(store.get("mah_key_pause_toggle"), Some("P"));
        assert_eq!(store.get("mah_pause_cmd"), Some(""));
        assert_eq!(store.get("mah_enabled"), Some("1"));
    }

    #[test]
    fn test_register_keeps_existing_value() {
        let mut store = CvarStore::new();
        store.register("mah_enabled", "1");
        store.set("mah_enabled", "0").unwrap();
        store.register("mah_enabled", "1");
        assert_eq!(store.get("mah_enabled"), Some("0"));
    }

    #[test]
    fn test_set_unknown_cvar_fails() {
        let mut store = CvarStore::new();
        let err = store.set("sv_cheats", "1").unwrap_err();
        assert!(matches!(err, HostError::UnknownCvar(name) if name == "sv_cheats"));
    }

    #[test]
    fn test_to_settings_reflects_changes() {
        let mut store = CvarStore::from_settings(&Settings::default());
        store.set("mah_key_blue_plus", "z").unwrap();
        store.set("mah_reset_cmd", "ballontop").unwrap();

        let settings = store.to_settings();
        assert_eq!(settings.keys.blue_plus, "Z");
        assert_eq!(settings.reset_cmd, "ballontop");
    }
}
