//! Keybind reconciliation and persistence for the match admin hotkeys.
//!
//! Six admin actions (score up/down per team, pause toggle, kickoff reset)
//! are bound to single letter keys. The [`controller`] tracks edits against
//! the last saved mapping and applies validated mappings to the host: it
//! scrubs phantom binds ([`bind::scrubber`]), rewrites the private script
//! ([`bind::applier`]) and asks the host to persist. Key presses reach the
//! [`handlers`] through the host binds only.

pub mod bind;
pub mod config;
pub mod controller;
pub mod handlers;
pub mod host;
pub mod keybindings;
pub mod session;

pub use controller::{EditState, ReconcileError, ReconciliationController};
pub use keybindings::{ActionId, KeyAssignmentSet, KeyCode};
