//! Action handlers run by the host when a bound key fires an action identifier.
//!
//! Handlers read host settings and match state only. They never see the
//! settings form's working assignments: a key press always reflects the last
//! mapping that was applied to the host. Every handler is single-shot and
//! best-effort; an unavailable match is a quiet no-op.
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crate::config::parse_bool_cvar;
use crate::host::{Console, ConsoleHost, GameServer, MatchState, Team};
use crate::keybindings::{ActionId, CVAR_ENABLED, CVAR_PAUSE_CMD, CVAR_RESET_CMD};

type Handler = fn(&ActionDispatcher);

/// New score after applying `delta`, never below zero.
pub fn clamp_score(current: i32, delta: i32) -> i32 {
    current.saturating_add(delta).max(0)
}

/// Identifier → handler table plus the capabilities the handlers use.
pub struct ActionDispatcher {
    console: Arc<dyn Console>,
    game: Arc<dyn GameServer>,
    handlers: HashMap<&'static str, Handler>,
}

impl ActionDispatcher {
    pub fn new(console: Arc<dyn Console>, game: Arc<dyn GameServer>) -> Self {
        let mut handlers: HashMap<&'static str, Handler> = HashMap::new();
        for action in ActionId::ALL {
            let handler: Handler = match action {
                ActionId::BluePlus => |d: &ActionDispatcher| d.adjust_score(Team::Blue, 1),
                ActionId::BlueMinus => |d: &ActionDispatcher| d.adjust_score(Team::Blue, -1),
                ActionId::OrangePlus => |d: &ActionDispatcher| d.adjust_score(Team::Orange, 1),
                ActionId::OrangeMinus => |d: &ActionDispatcher| d.adjust_score(Team::Orange, -1),
                ActionId::PauseToggle => |d: &ActionDispatcher| d.toggle_pause(),
                ActionId::ResetKickoff => |d: &ActionDispatcher| d.kickoff_reset(),
            };
            handlers.insert(action.identifier(), handler);
        }
        Self {
            console,
            game,
            handlers,
        }
    }

    /// Run the handler registered for `identifier`. Returns `false` when none is.
    pub fn dispatch(&self, identifier: &str) -> bool {
        match self.handlers.get(identifier) {
            Some(handler) => {
                handler(self);
                true
            }
            None => {
                tracing::debug!(identifier = %identifier, "No handler for identifier");
                false
            }
        }
    }

    /// Register one console notifier per action identifier.
    ///
    /// The notifiers hold a weak reference; once the dispatcher is dropped
    /// they do nothing.
    pub fn install(self: &Arc<Self>, host: &ConsoleHost) {
        for action in ActionId::ALL {
            let dispatcher: Weak<Self> = Arc::downgrade(self);
            let identifier = action.identifier();
            host.register_notifier(identifier, move || {
                if let Some(dispatcher) = dispatcher.upgrade() {
                    dispatcher.dispatch(identifier);
                }
            });
        }
    }

    fn enabled(&self) -> bool {
        self.console
            .cvar(CVAR_ENABLED)
            .and_then(|v| parse_bool_cvar(&v))
            .unwrap_or(true)
    }

    /// Both teams must resolve before either score is touched.
    fn resolve_teams(&self) -> Option<Arc<dyn MatchState>> {
        if !self.game.is_in_game() {
            return None;
        }
        let m = self.game.current_match()?;
        m.score(Team::Blue)?;
        m.score(Team::Orange)?;
        Some(m)
    }

    pub fn adjust_score(&self, team: Team, delta: i32) {
        if delta == 0 {
            return;
        }
        if !self.enabled() {
            tracing::info!(?team, "Ignored score change (disabled)");
            return;
        }
        let Some(m) = self.resolve_teams() else {
            tracing::info!(?team, "Could not resolve teams");
            return;
        };
        let Some(current) = m.score(team) else {
            return;
        };
        let next = clamp_score(current, delta);
        m.set_score(team, next);
        tracing::info!(?team, from = current, to = next, "Score adjusted");
    }

    pub fn toggle_pause(&self) {
        if !self.enabled() {
            tracing::info!("Ignored pause toggle (disabled)");
            return;
        }
        if !self.game.is_in_game() {
            tracing::info!("Pause toggle skipped (not in game)");
            return;
        }
        let Some(m) = self.game.current_match() else {
            tracing::info!("Pause toggle skipped (no server)");
            return;
        };

        if let Some(pauser) = m.pauser() {
            m.set_paused(pauser, false);
            tracing::info!("Unpaused");
            return;
        }
        if let Some(player) = m.local_player() {
            m.set_paused(player, true);
            tracing::info!("Paused");
            return;
        }
        if !self.run_override(CVAR_PAUSE_CMD) {
            tracing::info!("No player controller to pause with and no pause command configured");
        }
    }

    pub fn kickoff_reset(&self) {
        if !self.enabled() {
            tracing::info!("Ignored kickoff reset (disabled)");
            return;
        }
        if !self.game.is_in_game() {
            tracing::info!("Kickoff reset skipped (not in game)");
            return;
        }
        let Some(m) = self.game.current_match() else {
            tracing::info!("Kickoff reset skipped (no server)");
            return;
        };

        self.run_override(CVAR_RESET_CMD);
        m.start_new_round();
        tracing::info!("New round started for kickoff reset");

        if m.pauser().is_some() {
            tracing::info!("Already paused after new round");
            return;
        }
        if let Some(player) = m.local_player() {
            m.set_paused(player, true);
            tracing::info!("Paused after new round, awaiting manual unpause");
            return;
        }
        if !self.run_override(CVAR_PAUSE_CMD) {
            tracing::info!("No player controller to pause after reset and no pause command configured");
        }
    }

    /// Execute the command stored in `cvar`. Returns `false` when it is empty.
    fn run_override(&self, cvar: &str) -> bool {
        let command = self.console.cvar(cvar).unwrap_or_default();
        if command.trim().is_empty() {
            return false;
        }
        match self.console.execute(&command) {
            Ok(()) => tracing::info!(cvar = %cvar, command = %command, "Executed override command"),
            Err(e) => {
                tracing::warn!(cvar = %cvar, command = %command, error = %e, "Override command failed")
            }
        }
        true
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{LocalGame, LocalMatch, PlayerId};

    struct Fixture {
        _dir: tempfile::TempDir,
        console: Arc<ConsoleHost>,
        game: Arc<LocalGame>,
        dispatcher: ActionDispatcher,
    }

    impl Fixture {
        fn new(game: LocalGame) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let console = Arc::new(ConsoleHost::open(dir.path()).unwrap());
            let game = Arc::new(game);
            let dispatcher = ActionDispatcher::new(console.clone(), game.clone());
            Self {
                _dir: dir,
                console,
                game,
                dispatcher,
            }
        }

        fn local(&self) -> Arc<LocalMatch> {
            self.game.local_match().unwrap()
        }
    }

    #[test]
    fn test_clamp_score() {
        assert_eq!(clamp_score(0, -1), 0);
        assert_eq!(clamp_score(3, 1), 4);
        assert_eq!(clamp_score(i32::MAX, 1), i32::MAX);
    }

    #[test]
    fn test_dispatch_adjusts_scores() {
        let f = Fixture::new(LocalGame::with_match(LocalMatch::new(None).with_scores(3, 0)));
        assert!(f.dispatcher.dispatch("mah_blue_plus"));
        assert!(f.dispatcher.dispatch("mah_orange_minus"));
        assert_eq!(f.local().scores(), (Some(4), Some(0)));
    }

    #[test]
    fn test_dispatch_unknown_identifier() {
        let f = Fixture::new(LocalGame::idle());
        assert!(!f.dispatcher.dispatch("mah_fly"));
    }

    #[test]
    fn test_disabled_ignores_actions() {
        let f = Fixture::new(LocalGame::with_match(LocalMatch::new(Some(PlayerId(1)))));
        f.console.set_cvar("mah_enabled", "0").unwrap();
        f.dispatcher.dispatch("mah_blue_plus");
        f.dispatcher.dispatch("mah_pause_toggle");
        assert_eq!(f.local().scores(), (Some(0), Some(0)));
        assert!(!f.local().is_paused());
    }

    #[test]
    fn test_score_needs_both_teams() {
        let f = Fixture::new(LocalGame::with_match(LocalMatch::without_orange(None)));
        f.dispatcher.dispatch("mah_blue_plus");
        assert_eq!(f.local().scores(), (Some(0), None));
    }

    #[test]
    fn test_not_in_game_is_noop() {
        let f = Fixture::new(LocalGame::with_match(LocalMatch::new(Some(PlayerId(1)))));
        f.game.set_in_game(false);
        f.dispatcher.dispatch("mah_blue_plus");
        f.dispatcher.dispatch("mah_reset_kickoff");
        assert_eq!(f.local().scores(), (Some(0), Some(0)));
        assert_eq!(f.local().rounds_started(), 0);
    }

    #[test]
    fn test_pause_toggle_pauses_then_unpauses() {
        let f = Fixture::new(LocalGame::with_match(LocalMatch::new(Some(PlayerId(7)))));
        f.dispatcher.dispatch("mah_pause_toggle");
        assert!(f.local().is_paused());
        f.dispatcher.dispatch("mah_pause_toggle");
        assert!(!f.local().is_paused());
    }

    #[test]
    fn test_pause_falls_back_to_command() {
        let f = Fixture::new(LocalGame::with_match(LocalMatch::new(None)));
        f.console
            .set_cvar("mah_pause_cmd", "bind F9 mah_pause_toggle")
            .unwrap();
        f.dispatcher.dispatch("mah_pause_toggle");
        assert_eq!(f.console.binding("F9").as_deref(), Some("mah_pause_toggle"));
    }

    #[test]
    fn test_kickoff_reset_runs_command_and_pauses() {
        let f = Fixture::new(LocalGame::with_match(LocalMatch::new(Some(PlayerId(2)))));
        f.console
            .set_cvar("mah_reset_cmd", "bind F10 mah_reset_kickoff")
            .unwrap();
        f.dispatcher.dispatch("mah_reset_kickoff");

        assert_eq!(f.local().rounds_started(), 1);
        assert!(f.local().is_paused());
        assert!(f.console.binding("F10").is_some());
    }

    #[test]
    fn test_pause_command_naming_itself_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let console = Arc::new(ConsoleHost::open(dir.path()).unwrap());
        let game = Arc::new(LocalGame::with_match(LocalMatch::new(None)));
        let dispatcher = Arc::new(ActionDispatcher::new(console.clone(), game.clone()));
        dispatcher.install(&console);

        console.set_cvar("mah_pause_cmd", "mah_pause_toggle").unwrap();
        console.execute("bind P mah_pause_toggle;bind U mah_blue_plus").unwrap();
        assert!(console.press("P").unwrap());
        assert!(!game.local_match().unwrap().is_paused());

        // Later presses still dispatch normally.
        console.press("U").unwrap();
        assert_eq!(game.local_match().unwrap().scores(), (Some(1), Some(0)));
    }

    #[test]
    fn test_reset_command_naming_itself_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let console = Arc::new(ConsoleHost::open(dir.path()).unwrap());
        let game = Arc::new(LocalGame::with_match(LocalMatch::new(Some(PlayerId(3)))));
        let dispatcher = Arc::new(ActionDispatcher::new(console.clone(), game.clone()));
        dispatcher.install(&console);

        console.set_cvar("mah_reset_cmd", "mah_reset_kickoff").unwrap();
        console.execute("bind O mah_reset_kickoff").unwrap();
        assert!(console.press("O").unwrap());

        let m = game.local_match().unwrap();
        assert!(m.rounds_started() >= 1);
        assert!(m.rounds_started() <= 17);
        assert!(m.is_paused());
    }

    #[test]
    fn test_install_routes_key_presses() {
        let dir = tempfile::tempdir().unwrap();
        let console = Arc::new(ConsoleHost::open(dir.path()).unwrap());
        let game = Arc::new(LocalGame::with_match(LocalMatch::new(None)));
        let dispatcher = Arc::new(ActionDispatcher::new(console.clone(), game.clone()));
        dispatcher.install(&console);

        console.execute("bind U mah_blue_plus").unwrap();
        console.press("U").unwrap();
        console.press("U").unwrap();
        assert_eq!(game.local_match().unwrap().scores(), (Some(2), Some(0)));

        drop(dispatcher);
        console.press("U").unwrap();
        assert_eq!(game.local_match().unwrap().scores(), (Some(2), Some(0)));
    }
}
