use std::{collections::BTreeMap, time::Duration, time::SystemTime};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::ServiceError,
    state::{scoring::ScoringConfig, state_machine::Stage},
};

/// Identifier of a game instance.
pub type GameId = Uuid;
/// Identifier of a player, supplied by the upstream identity layer.
pub type PlayerId = Uuid;
/// Identifier of a question in the question bank.
pub type QuestionId = u32;

/// Shortest answer window a survival game can decay to.
const MIN_ANSWER_TIME: Duration = Duration::from_secs(1);

/// Lifecycle of a game as seen from the outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    /// Lobby accepting players.
    Created,
    /// Questions are being played.
    Ongoing,
    /// Game ended; only the final leaderboard remains.
    Finished,
}

/// How questions are paced during a game.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GameMode {
    /// Fixed answer window for every question.
    Definite {
        /// Number of questions played.
        question_count: usize,
        /// Answer window of every question.
        answer_time: Duration,
    },
    /// Answer window shrinks by `speed_modifier` after every question.
    Survival {
        /// Number of questions played.
        question_count: usize,
        /// Answer window of the first question.
        answer_time: Duration,
        /// Factor in `(0, 1]` applied once per elapsed question.
        speed_modifier: f64,
    },
}

impl GameMode {
    /// Number of questions the game plays.
    pub fn question_count(&self) -> usize {
        match self {
            GameMode::Definite { question_count, .. }
            | GameMode::Survival { question_count, .. } => *question_count,
        }
    }

    /// Answer window granted for the question at `index`.
    pub fn answer_time_for(&self, index: usize) -> Duration {
        match self {
            GameMode::Definite { answer_time, .. } => *answer_time,
            GameMode::Survival {
                answer_time,
                speed_modifier,
                ..
            } => {
                let exponent = i32::try_from(index).unwrap_or(i32::MAX);
                answer_time
                    .mul_f64(decay_factor(*speed_modifier).powi(exponent))
                    .max(MIN_ANSWER_TIME)
            }
        }
    }

    /// Short label used in summaries.
    pub fn label(&self) -> &'static str {
        match self {
            GameMode::Definite { .. } => "definite",
            GameMode::Survival { .. } => "survival",
        }
    }
}

/// Survival decay restricted to `(0, 1]`; anything else keeps the window constant.
fn decay_factor(speed_modifier: f64) -> f64 {
    if speed_modifier.is_finite() && speed_modifier > 0.0 {
        speed_modifier.min(1.0)
    } else {
        1.0
    }
}

/// Settings frozen when the lobby is created.
#[derive(Debug, Clone, PartialEq)]
pub struct GameSettings {
    /// Pacing and length of the game.
    pub mode: GameMode,
    /// Maximum number of players in the lobby.
    pub capacity: usize,
    /// Scoring parameters.
    pub scoring: ScoringConfig,
}

/// Shape of a question and its expected answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionKind {
    /// Pick exactly one of `choices`.
    MultipleChoice {
        /// Displayed options.
        choices: Vec<String>,
        /// Index of the right option.
        correct: usize,
    },
    /// Guess a number as close as possible to `correct`.
    Estimate {
        /// Expected value.
        correct: i64,
    },
}

/// Question drawn from the bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// Identifier in the bank.
    pub id: QuestionId,
    /// Prompt shown to players.
    pub text: String,
    /// Expected answer shape.
    #[serde(flatten)]
    pub kind: QuestionKind,
}

impl Question {
    /// Whether `answer` has the shape this question expects.
    pub fn accepts(&self, answer: &Answer) -> bool {
        match (&self.kind, answer) {
            (QuestionKind::MultipleChoice { choices, .. }, Answer::Choice { index }) => {
                *index < choices.len()
            }
            (QuestionKind::Estimate { .. }, Answer::Estimate { .. }) => true,
            _ => false,
        }
    }
}

/// Answer submitted by a player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Answer {
    /// Selected option of a multiple-choice question.
    Choice {
        /// Zero-based option index.
        index: usize,
    },
    /// Numeric guess for an estimate question.
    Estimate {
        /// Guessed value.
        value: i64,
    },
}

/// One-shot bonus a player can play while a question is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PowerUp {
    /// Halve the time left on the open question for everyone.
    HalveTime,
    /// Double the points the player earns on the open question.
    DoublePoints,
    /// Reveal one wrong option of the open multiple-choice question.
    IncorrectAnswer,
}

/// Per-player state tracked for the lifetime of a game.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    /// Display name.
    pub nickname: String,
    /// Accumulated points.
    pub score: u32,
    /// Consecutive correct answers.
    pub streak: u32,
    /// Player left an ongoing game; kept on the leaderboard, skipped by scoring.
    pub abandoned: bool,
    /// Wall-clock join time.
    pub joined_at: SystemTime,
    /// Power-ups already played, with the question index they were played on.
    pub power_ups: BTreeMap<PowerUp, usize>,
    join_seq: u64,
}

/// Outcome of removing a player from a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// Player left the lobby; `host` is the current host afterwards.
    LeftLobby {
        /// Host after the departure.
        host: Option<PlayerId>,
    },
    /// Last player left the lobby; the game can be discarded.
    LobbyEmpty,
    /// Player abandoned an ongoing game; others remain.
    Abandoned,
    /// Every player of an ongoing game has now abandoned it.
    LastPlayerLeft,
}

/// Aggregated state of a single game.
#[derive(Debug, Clone)]
pub struct Game {
    /// Primary key.
    pub id: GameId,
    /// Settings chosen at creation.
    pub settings: GameSettings,
    /// Lifecycle status.
    pub status: GameStatus,
    /// Active stage while the game runs.
    pub stage: Option<Stage>,
    /// Deadline of the active stage.
    pub stage_deadline: Option<SystemTime>,
    /// Index into `question_ids` of the question being played.
    pub current_question: Option<usize>,
    /// Question order fixed at start.
    pub question_ids: Vec<QuestionId>,
    /// Seed the question order was drawn from.
    pub seed: Option<u64>,
    /// Players keyed by id.
    pub players: BTreeMap<PlayerId, PlayerState>,
    /// Player allowed to start the game.
    pub host: Option<PlayerId>,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// When the game reached FINISHED.
    pub finished_at: Option<SystemTime>,
    next_join_seq: u64,
}

impl Game {
    /// Create an empty lobby.
    pub fn new(id: GameId, settings: GameSettings) -> Self {
        Self {
            id,
            settings,
            status: GameStatus::Created,
            stage: None,
            stage_deadline: None,
            current_question: None,
            question_ids: Vec::new(),
            seed: None,
            players: BTreeMap::new(),
            host: None,
            created_at: SystemTime::now(),
            finished_at: None,
            next_join_seq: 0,
        }
    }

    /// Add `player` to the lobby. The first player becomes host.
    pub fn add_player(&mut self, player: PlayerId, nickname: String) -> Result<(), ServiceError> {
        if self.status != GameStatus::Created {
            return Err(ServiceError::InvalidState(format!(
                "game `{}` no longer accepts players",
                self.id
            )));
        }
        if self.players.contains_key(&player) {
            return Err(ServiceError::AlreadyPresent(format!(
                "player `{player}` already joined game `{}`",
                self.id
            )));
        }
        if self.players.len() >= self.settings.capacity {
            return Err(ServiceError::CapacityExceeded(format!(
                "game `{}` is full ({} players)",
                self.id, self.settings.capacity
            )));
        }

        let join_seq = self.next_join_seq;
        self.next_join_seq += 1;
        self.players.insert(
            player,
            PlayerState {
                nickname,
                score: 0,
                streak: 0,
                abandoned: false,
                joined_at: SystemTime::now(),
                power_ups: BTreeMap::new(),
                join_seq,
            },
        );
        self.host.get_or_insert(player);
        Ok(())
    }

    /// Remove `player` from the lobby, or mark them abandoned once the game runs.
    pub fn remove_player(&mut self, player: &PlayerId) -> Result<Removal, ServiceError> {
        match self.status {
            GameStatus::Created => {
                if self.players.remove(player).is_none() {
                    return Err(self.unknown_player(player));
                }
                if self.players.is_empty() {
                    self.host = None;
                    return Ok(Removal::LobbyEmpty);
                }
                if self.host.as_ref() == Some(player) {
                    self.host = self
                        .players
                        .iter()
                        .min_by_key(|(_, state)| state.join_seq)
                        .map(|(id, _)| *id);
                }
                Ok(Removal::LeftLobby { host: self.host })
            }
            GameStatus::Ongoing => {
                let state = self
                    .players
                    .get_mut(player)
                    .ok_or_else(|| ServiceError::NotFound(format!("player `{player}`")))?;
                if state.abandoned {
                    return Err(ServiceError::InvalidState(format!(
                        "player `{player}` already left game `{}`",
                        self.id
                    )));
                }
                state.abandoned = true;
                if self.active_players().next().is_none() {
                    Ok(Removal::LastPlayerLeft)
                } else {
                    Ok(Removal::Abandoned)
                }
            }
            GameStatus::Finished => Err(ServiceError::InvalidState(format!(
                "game `{}` is already finished",
                self.id
            ))),
        }
    }

    /// Freeze the lobby and record the drawn question order.
    ///
    /// Capacity shrinks to the current number of players.
    pub fn start(&mut self, seed: u64, question_ids: Vec<QuestionId>) -> Result<(), ServiceError> {
        if self.status != GameStatus::Created {
            return Err(ServiceError::InvalidState(format!(
                "game `{}` has already been started",
                self.id
            )));
        }
        if self.players.is_empty() {
            return Err(ServiceError::InvalidState(format!(
                "game `{}` has no players",
                self.id
            )));
        }
        if question_ids.is_empty() {
            return Err(ServiceError::InvalidInput(
                "a game needs at least one question".into(),
            ));
        }

        self.settings.capacity = self.players.len();
        self.seed = Some(seed);
        self.question_ids = question_ids;
        self.current_question = None;
        self.status = GameStatus::Ongoing;
        Ok(())
    }

    /// Players that have not abandoned the game.
    pub fn active_players(&self) -> impl Iterator<Item = (&PlayerId, &PlayerState)> {
        self.players.iter().filter(|(_, state)| !state.abandoned)
    }

    /// Whether `player` is in the game and has not left it.
    pub fn is_active_player(&self, player: &PlayerId) -> bool {
        self.players
            .get(player)
            .is_some_and(|state| !state.abandoned)
    }

    /// Whether another question can still be opened.
    pub fn has_remaining_questions(&self) -> bool {
        match self.current_question {
            None => !self.question_ids.is_empty(),
            Some(index) => index + 1 < self.question_ids.len(),
        }
    }

    /// Players ranked by score, ties broken by join order.
    pub fn leaderboard(&self) -> Vec<(PlayerId, &PlayerState)> {
        let mut ranked: Vec<_> = self.players.iter().map(|(id, state)| (*id, state)).collect();
        ranked.sort_by(|(_, a), (_, b)| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.join_seq.cmp(&b.join_seq))
        });
        ranked
    }

    fn unknown_player(&self, player: &PlayerId) -> ServiceError {
        ServiceError::NotFound(format!("player `{player}` is not in game `{}`", self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(capacity: usize) -> GameSettings {
        GameSettings {
            mode: GameMode::Definite {
                question_count: 3,
                answer_time: Duration::from_secs(20),
            },
            capacity,
            scoring: ScoringConfig::default(),
        }
    }

    fn lobby(players: usize, capacity: usize) -> (Game, Vec<PlayerId>) {
        let mut game = Game::new(Uuid::new_v4(), settings(capacity));
        let ids: Vec<PlayerId> = (0..players).map(|_| Uuid::new_v4()).collect();
        for (n, id) in ids.iter().enumerate() {
            game.add_player(*id, format!("player-{n}")).unwrap();
        }
        (game, ids)
    }

    #[test]
    fn first_player_becomes_host() {
        let (game, ids) = lobby(2, 4);
        assert_eq!(game.host, Some(ids[0]));
        assert_eq!(game.status, GameStatus::Created);
    }

    #[test]
    fn join_rejects_duplicates_and_overflow() {
        let (mut game, ids) = lobby(2, 2);

        let duplicate = game.add_player(ids[0], "again".into()).unwrap_err();
        let overflow = game.add_player(Uuid::new_v4(), "late".into()).unwrap_err();

        assert!(matches!(duplicate, ServiceError::AlreadyPresent(_)));
        assert!(matches!(overflow, ServiceError::CapacityExceeded(_)));
    }

    #[test]
    fn host_leaving_lobby_hands_over_to_earliest_joiner() {
        let (mut game, ids) = lobby(3, 4);

        let removal = game.remove_player(&ids[0]).unwrap();
        assert_eq!(removal, Removal::LeftLobby { host: Some(ids[1]) });

        game.remove_player(&ids[1]).unwrap();
        assert_eq!(game.host, Some(ids[2]));
        assert_eq!(game.remove_player(&ids[2]).unwrap(), Removal::LobbyEmpty);
        assert!(game.host.is_none());
    }

    #[test]
    fn start_shrinks_capacity_and_requires_lobby() {
        let (mut game, _) = lobby(2, 6);
        game.start(7, vec![3, 1, 2]).unwrap();

        assert_eq!(game.settings.capacity, 2);
        assert_eq!(game.status, GameStatus::Ongoing);
        assert_eq!(game.seed, Some(7));
        assert!(game.has_remaining_questions());

        let err = game.start(7, vec![1]).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[test]
    fn start_without_players_is_rejected() {
        let (mut game, _) = lobby(0, 6);
        assert!(matches!(
            game.start(1, vec![1]),
            Err(ServiceError::InvalidState(_))
        ));
    }

    #[test]
    fn leaving_ongoing_game_marks_abandoned() {
        let (mut game, ids) = lobby(2, 2);
        game.start(1, vec![1, 2]).unwrap();

        assert_eq!(game.remove_player(&ids[0]).unwrap(), Removal::Abandoned);
        assert!(game.players[&ids[0]].abandoned);
        assert!(!game.is_active_player(&ids[0]));
        assert_eq!(game.leaderboard().len(), 2);
        assert!(matches!(
            game.remove_player(&ids[0]),
            Err(ServiceError::InvalidState(_))
        ));
        assert_eq!(game.remove_player(&ids[1]).unwrap(), Removal::LastPlayerLeft);
    }

    #[test]
    fn leaderboard_ranks_by_score_then_join_order() {
        let (mut game, ids) = lobby(3, 3);
        game.players.get_mut(&ids[2]).unwrap().score = 300;
        game.players.get_mut(&ids[0]).unwrap().score = 100;
        game.players.get_mut(&ids[1]).unwrap().score = 100;

        let order: Vec<PlayerId> = game.leaderboard().into_iter().map(|(id, _)| id).collect();
        assert_eq!(order, vec![ids[2], ids[0], ids[1]]);
    }

    #[test]
    fn survival_answer_time_decays_to_floor() {
        let mode = GameMode::Survival {
            question_count: 10,
            answer_time: Duration::from_secs(10),
            speed_modifier: 0.5,
        };
        assert_eq!(mode.answer_time_for(0), Duration::from_secs(10));
        assert_eq!(mode.answer_time_for(1), Duration::from_secs(5));
        assert_eq!(mode.answer_time_for(6), MIN_ANSWER_TIME);
        assert_eq!(mode.question_count(), 10);
    }

    #[test]
    fn out_of_range_speed_modifier_keeps_window_constant() {
        for speed_modifier in [-0.5, 0.0, f64::NAN, f64::INFINITY] {
            let mode = GameMode::Survival {
                question_count: 3,
                answer_time: Duration::from_secs(10),
                speed_modifier,
            };
            assert_eq!(mode.answer_time_for(1), Duration::from_secs(10));
            assert_eq!(mode.answer_time_for(2), Duration::from_secs(10));
        }

        let above_one = GameMode::Survival {
            question_count: 3,
            answer_time: Duration::from_secs(10),
            speed_modifier: 3.0,
        };
        assert_eq!(above_one.answer_time_for(2), Duration::from_secs(10));
    }

    #[test]
    fn question_accepts_matching_answer_shape() {
        let question = Question {
            id: 1,
            text: "Pick one".into(),
            kind: QuestionKind::MultipleChoice {
                choices: vec!["x".into(), "y".into()],
                correct: 0,
            },
        };
        assert!(question.accepts(&Answer::Choice { index: 1 }));
        assert!(!question.accepts(&Answer::Choice { index: 2 }));
        assert!(!question.accepts(&Answer::Estimate { value: 0 }));
    }
}
