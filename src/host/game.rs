//! In-memory match model implementing the game capabilities.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{GameServer, MatchState, PlayerId, Team};

/// Host game state: either idle or running one [`LocalMatch`].
#[derive(Default)]
pub struct LocalGame {
    in_game: AtomicBool,
    current: Mutex<Option<Arc<LocalMatch>>>,
}

impl LocalGame {
    /// No match running.
    pub fn idle() -> Self {
        Self::default()
    }

    /// In game with a fresh match.
    pub fn with_match(m: LocalMatch) -> Self {
        Self {
            in_game: AtomicBool::new(true),
            current: Mutex::new(Some(Arc::new(m))),
        }
    }

    /// The running match, for inspection.
    pub fn local_match(&self) -> Option<Arc<LocalMatch>> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_in_game(&self, in_game: bool) {
        self.in_game.store(in_game, Ordering::SeqCst);
    }
}

impl GameServer for LocalGame {
    fn is_in_game(&self) -> bool {
        self.in_game.load(Ordering::SeqCst)
    }

    fn current_match(&self) -> Option<Arc<dyn MatchState>> {
        self.local_match().map(|m| m as Arc<dyn MatchState>)
    }
}

#[derive(Debug, Clone)]
struct MatchInner {
    blue: Option<i32>,
    orange: Option<i32>,
    pauser: Option<PlayerId>,
    local_player: Option<PlayerId>,
    rounds_started: u32,
}

/// Scores, pause holder and round counter of one match.
#[derive(Debug)]
pub struct LocalMatch {
    inner: Mutex<MatchInner>,
}

impl LocalMatch {
    /// Both teams at 0, unpaused, with an optional local player.
    pub fn new(local_player: Option<PlayerId>) -> Self {
        Self {
            inner: Mutex::new(MatchInner {
                blue: Some(0),
                orange: Some(0),
                pauser: None,
                local_player,
                rounds_started: 0,
            }),
        }
    }

    /// A match where only the blue team resolves.
    pub fn without_orange(local_player: Option<PlayerId>) -> Self {
        let m = Self::new(local_player);
        m.lock().orange = None;
        m
    }

    pub fn with_scores(self, blue: i32, orange: i32) -> Self {
        {
            let mut inner = self.lock();
            inner.blue = Some(blue);
            inner.orange = Some(orange);
        }
        self
    }

    pub fn scores(&self) -> (Option<i32>, Option<i32>) {
        let inner = self.lock();
        (inner.blue, inner.orange)
    }

    pub fn is_paused(&self) -> bool {
        self.lock().pauser.is_some()
    }

    pub fn rounds_started(&self) -> u32 {
        self.lock().rounds_started
    }

    fn lock(&self) -> MutexGuard<'_, MatchInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MatchState for LocalMatch {
    fn score(&self, team: Team) -> Option<i32> {
        let inner = self.lock();
        match team {
            Team::Blue => inner.blue,
            Team::Orange => inner.orange,
        }
    }

    fn set_score(&self, team: Team, score: i32) {
        let mut inner = self.lock();
        let slot = match team {
            Team::Blue => &mut inner.blue,
            Team::Orange => &mut inner.orange,
        };
        if slot.is_some() {
            *slot = Some(score);
        }
    }

    fn pauser(&self) -> Option<PlayerId> {
        self.lock().pauser
    }

    fn local_player(&self) -> Option<PlayerId> {
        self.lock().local_player
    }

    fn set_paused(&self, by: PlayerId, paused: bool) {
        self.lock().pauser = paused.then_some(by);
    }

    fn start_new_round(&self) {
        let mut inner = self.lock();
        inner.rounds_started += 1;
        inner.pauser = None;
    }
}
