pub mod answers;
pub mod broadcast;
pub mod game;
pub mod rng;
pub mod scheduler;
pub mod scoring;
pub mod state_machine;

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use dashmap::DashMap;

use crate::{
    config::AppConfig,
    dao::question_bank::QuestionBank,
    error::ServiceError,
    state::{
        broadcast::Broadcaster,
        game::{Game, GameId},
        scheduler::Scheduler,
        state_machine::GameMachine,
    },
};

/// Shared handle on [`AppState`] passed to every handler.
pub type SharedState = Arc<AppState>;
/// Game state shared between the request handlers and its stage machine.
pub type SharedGame = Arc<RwLock<Game>>;

/// Lock `game` for reading. A poisoned lock still yields the last written state.
pub fn read_game(game: &SharedGame) -> RwLockReadGuard<'_, Game> {
    game.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Lock `game` for writing.
pub fn write_game(game: &SharedGame) -> RwLockWriteGuard<'_, Game> {
    game.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone)]
/// Registry entry of one game.
pub struct GameEntry {
    pub game: SharedGame,
    /// Present once the game has been started.
    pub machine: Option<Arc<GameMachine>>,
}

/// Central application state: configuration, collaborators and the live games.
pub struct AppState {
    config: AppConfig,
    broadcaster: Arc<Broadcaster>,
    scheduler: Arc<dyn Scheduler>,
    question_bank: Arc<dyn QuestionBank>,
    games: DashMap<GameId, GameEntry>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(
        config: AppConfig,
        question_bank: Arc<dyn QuestionBank>,
        scheduler: Arc<dyn Scheduler>,
    ) -> SharedState {
        let broadcaster = Arc::new(Broadcaster::new(config.event_channel_capacity));
        Arc::new(Self {
            config,
            broadcaster,
            scheduler,
            question_bank,
            games: DashMap::new(),
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Event fan-out shared by every game.
    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Deadline scheduler handed to stage machines.
    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    /// Source of questions.
    pub fn question_bank(&self) -> &Arc<dyn QuestionBank> {
        &self.question_bank
    }

    /// Registry of live games.
    pub fn games(&self) -> &DashMap<GameId, GameEntry> {
        &self.games
    }

    /// Look up a game, failing with [`ServiceError::NotFound`].
    pub fn game(&self, id: &GameId) -> Result<GameEntry, ServiceError> {
        self.games
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ServiceError::NotFound(format!("game `{id}` not found")))
    }

    /// Number of games whose stage machine is running.
    pub fn running_games(&self) -> usize {
        self.games
            .iter()
            .filter(|entry| {
                entry
                    .machine
                    .as_ref()
                    .is_some_and(|machine| machine.is_running())
            })
            .count()
    }
}
