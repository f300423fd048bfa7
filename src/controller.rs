//! Edit/save/revert/reset state machine over the working and saved key assignments.
//!
//! The controller is the only owner of both sets. Key presses never read it:
//! they reach the handlers through whatever the host has bound, which is
//! always the last mapping applied by [`ReconciliationController::save`] or
//! [`ReconciliationController::reset_to_defaults`].
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::bind::{
    build_unbind_all, scan_file, unbind_command, write_config_file, ApplyError, BINDS_FILE_NAME,
    CONFIG_FILE_NAME,
};
use crate::config::Settings;
use crate::host::{Console, HostError, TOAST_TITLE};
use crate::keybindings::{ActionId, KeyAssignmentSet, KeyCode};

const UNSAVED_NOTICE: &str = "You have unsaved changes. Click Save to apply.";
const SAVED_NOTICE: &str = "Keybinds saved";
const DEFAULTS_NOTICE: &str = "Defaults restored";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Duplicate key: {0} is assigned to multiple actions")]
    Duplicate(char),

    #[error("Nothing to save")]
    NothingToSave,

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error("Host command failed: {0}")]
    Host(#[from] HostError),
}

// ============================================================================
// State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EditState {
    /// Working set equals the saved snapshot.
    Clean,
    /// Unsaved changes, no duplicate key.
    Dirty,
    /// Unsaved changes with a duplicate key. Cannot be saved.
    Invalid,
}

impl fmt::Display for EditState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditState::Clean => write!(f, "clean"),
            EditState::Dirty => write!(f, "dirty"),
            EditState::Invalid => write!(f, "invalid"),
        }
    }
}

/// Serializable view for status output.
#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    pub state: EditState,
    pub working: KeyAssignmentSet,
    pub snapshot: KeyAssignmentSet,
    pub duplicate: Option<char>,
    pub can_save: bool,
    pub can_revert: bool,
    pub can_reset: bool,
}

// ============================================================================
// Apply Plan
// ============================================================================

/// One step of the apply sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyStep {
    /// Console command, run through the host.
    Execute(String),
    /// Host setting assignment.
    SetCvar { name: &'static str, value: String },
    /// Rewrite of the private script.
    WriteConfig(PathBuf),
}

impl fmt::Display for ApplyStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplyStep::Execute(cmd) => write!(f, "{}", cmd),
            ApplyStep::SetCvar { name, value } => write!(f, "{} \"{}\"", name, value),
            ApplyStep::WriteConfig(path) => write!(f, "<write {}>", path.display()),
        }
    }
}

// ============================================================================
// Controller
// ============================================================================

pub struct ReconciliationController {
    console: Arc<dyn Console>,
    working: KeyAssignmentSet,
    snapshot: KeyAssignmentSet,
    unsaved_notice_shown: bool,
}

impl ReconciliationController {
    /// Load the persisted key settings into both the working set and the snapshot.
    ///
    /// The private config is executed first so its binds and override
    /// commands are back in place. Settings the host doesn't have fall back
    /// to the default mapping.
    pub fn load(console: Arc<dyn Console>) -> Self {
        match console.execute(&format!("exec {}", CONFIG_FILE_NAME)) {
            Ok(()) => tracing::debug!(file = CONFIG_FILE_NAME, "Re-applied private config"),
            Err(HostError::ScriptNotFound(path)) => {
                tracing::debug!(path = %path, "No private config yet")
            }
            Err(e) => tracing::warn!(file = CONFIG_FILE_NAME, error = %e, "Failed to re-apply private config"),
        }

        let assignments = Settings::from_cvars(|name| console.cvar(name)).assignments();
        tracing::info!(default = assignments.is_default(), "Loaded key assignments");
        Self {
            console,
            working: assignments,
            snapshot: assignments,
            unsaved_notice_shown: false,
        }
    }

    pub fn working(&self) -> &KeyAssignmentSet {
        &self.working
    }

    pub fn snapshot(&self) -> &KeyAssignmentSet {
        &self.snapshot
    }

    /// First key shared by two working slots.
    pub fn duplicate(&self) -> Option<char> {
        self.working.find_duplicate()
    }

    pub fn state(&self) -> EditState {
        if self.working == self.snapshot {
            EditState::Clean
        } else if self.duplicate().is_some() {
            EditState::Invalid
        } else {
            EditState::Dirty
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.state() != EditState::Clean
    }

    pub fn can_save(&self) -> bool {
        self.state() == EditState::Dirty
    }

    pub fn can_revert(&self) -> bool {
        self.is_dirty()
    }

    /// Reset is offered unless the working set is saved and already the default mapping.
    pub fn can_reset(&self) -> bool {
        !(self.state() == EditState::Clean && self.working.is_default())
    }

    pub fn status(&self) -> ControllerStatus {
        ControllerStatus {
            state: self.state(),
            working: self.working,
            snapshot: self.snapshot,
            duplicate: self.duplicate(),
            can_save: self.can_save(),
            can_revert: self.can_revert(),
            can_reset: self.can_reset(),
        }
    }

    /// Assign `input` (normalized) to `action` in the working set.
    ///
    /// The first edit of a dirty period raises an "unsaved changes" notice.
    pub fn edit(&mut self, action: ActionId, input: &str) -> EditState {
        let key = KeyCode::normalize(input);
        self.working.set(action, key);
        let state = self.state();
        tracing::debug!(action = %action, key = %key, state = %state, "Edited key");

        if state != EditState::Clean && !self.unsaved_notice_shown {
            self.console.toast(TOAST_TITLE, UNSAVED_NOTICE);
            self.unsaved_notice_shown = true;
        }
        state
    }

    /// Persist and apply the working set.
    ///
    /// Refused when there is nothing to save or when two actions share a key;
    /// a refused save touches no files. On any apply failure the snapshot is
    /// kept, so the change stays pending and can be retried.
    pub fn save(&mut self) -> Result<(), ReconcileError> {
        if !self.is_dirty() {
            tracing::debug!("Save requested without changes");
            return Err(ReconcileError::NothingToSave);
        }
        if let Some(key) = self.duplicate() {
            let err = ReconcileError::Duplicate(key);
            self.console.toast(TOAST_TITLE, &err.to_string());
            tracing::info!(key = %key, "Save blocked by duplicate key");
            return Err(err);
        }

        self.apply(SAVED_NOTICE)?;
        tracing::info!("Keybinds saved; scrubbed binds.cfg, double-unbound, exec'd cfg, persisted");
        Ok(())
    }

    /// Discard edits. Returns `false` when there was nothing to discard.
    pub fn revert(&mut self) -> bool {
        if !self.can_revert() {
            return false;
        }
        self.working = self.snapshot;
        self.unsaved_notice_shown = false;
        tracing::info!("Reverted fields from last saved snapshot");
        true
    }

    /// Replace the working set with the default mapping and apply it.
    ///
    /// Works from any state, including one with duplicate keys. A clean
    /// default set returns [`ReconcileError::NothingToSave`].
    pub fn reset_to_defaults(&mut self) -> Result<(), ReconcileError> {
        if !self.can_reset() {
            tracing::debug!("Keybinds already saved as defaults, reset skipped");
            return Err(ReconcileError::NothingToSave);
        }
        self.working = KeyAssignmentSet::defaults();
        self.apply(DEFAULTS_NOTICE)?;
        tracing::info!("Defaults restored; scrubbed binds.cfg, double-unbound, exec'd cfg, persisted");
        Ok(())
    }

    /// Steps a save of the current working set would run, without running them.
    pub fn plan(&self) -> Vec<ApplyStep> {
        self.build_plan(&self.working)
    }

    fn build_plan(&self, set: &KeyAssignmentSet) -> Vec<ApplyStep> {
        let cfg_dir = self.console.cfg_dir();
        let phantoms = scan_file(&cfg_dir.join(BINDS_FILE_NAME));
        let writeconfig = || ApplyStep::Execute("writeconfig".to_string());

        let mut steps = Vec::new();
        if let Some(unbind) = unbind_command(&phantoms) {
            tracing::info!(keys = phantoms.len(), "Phantom binds found in binds.cfg");
            steps.push(ApplyStep::Execute(unbind));
            steps.push(writeconfig());
        }
        steps.push(ApplyStep::Execute(build_unbind_all()));
        steps.push(writeconfig());

        for (action, key) in set.iter() {
            steps.push(ApplyStep::SetCvar {
                name: action.cvar_name(),
                value: key.to_string(),
            });
        }
        steps.push(ApplyStep::WriteConfig(cfg_dir.join(CONFIG_FILE_NAME)));

        steps.push(ApplyStep::Execute(build_unbind_all()));
        steps.push(ApplyStep::Execute(format!("exec {}", CONFIG_FILE_NAME)));
        steps.push(writeconfig());
        steps
    }

    fn apply(&mut self, notice: &str) -> Result<(), ReconcileError> {
        let set = self.working;
        let steps = self.build_plan(&set);

        if let Err(e) = self.run_steps(&set, &steps) {
            tracing::warn!(error = %e, "Apply failed, keeping last saved keybinds");
            self.restore_snapshot_cvars();
            self.console
                .toast(TOAST_TITLE, &format!("Keybinds not saved: {}", e));
            return Err(e);
        }
        self.snapshot = set;
        self.unsaved_notice_shown = false;
        self.console.toast(TOAST_TITLE, notice);
        Ok(())
    }

    /// Put the snapshot's keys back into the host settings after a failed apply.
    fn restore_snapshot_cvars(&self) {
        for (action, key) in self.snapshot.iter() {
            if let Err(e) = self.console.set_cvar(action.cvar_name(), &key.to_string()) {
                tracing::warn!(cvar = action.cvar_name(), error = %e, "Failed to restore key setting");
            }
        }
    }

    fn run_steps(&self, set: &KeyAssignmentSet, steps: &[ApplyStep]) -> Result<(), ReconcileError> {
        for step in steps {
            match step {
                ApplyStep::Execute(cmd) => self.console.execute(cmd)?,
                ApplyStep::SetCvar { name, value } => self.console.set_cvar(name, value)?,
                ApplyStep::WriteConfig(path) => {
                    let overrides = Settings::from_cvars(|name| self.console.cvar(name)).overrides();
                    write_config_file(set, &overrides, path)?;
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
