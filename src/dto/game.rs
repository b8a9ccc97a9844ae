use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    dto::{
        format_system_time,
        validation::{validate_nickname, validate_reaction, validate_speed_modifier},
    },
    state::{
        game::{Answer, Game, GameStatus, PowerUp, Question, QuestionKind},
        scoring::ScoringConfig,
        state_machine::Stage,
    },
};

/// Bounds accepted for a requested number of questions.
pub const QUESTION_COUNT_RANGE: (usize, usize) = (1, 100);
/// Bounds accepted for a requested answer window, in milliseconds.
pub const ANSWER_TIME_RANGE_MS: (u64, u64) = (1_000, 600_000);
/// Bounds accepted for a requested lobby capacity.
pub const CAPACITY_RANGE: (usize, usize) = (1, 64);

/// Pacing requested for a new game.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ModeInput {
    /// Same answer window for every question.
    #[default]
    Definite,
    /// Answer window shrinks after every question.
    Survival,
}

/// Payload used to open a new lobby. Omitted settings fall back to the server defaults.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateGameRequest {
    /// Nickname of the creating player, who becomes host.
    pub nickname: String,
    #[serde(default)]
    pub mode: ModeInput,
    #[serde(default)]
    pub question_count: Option<usize>,
    #[serde(default)]
    pub answer_time_ms: Option<u64>,
    #[serde(default)]
    pub capacity: Option<usize>,
    /// Survival only: factor applied to the answer window after each question.
    #[serde(default)]
    pub speed_modifier: Option<f64>,
    #[serde(default)]
    pub scoring: Option<ScoringConfig>,
}

impl Validate for CreateGameRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_nickname(&self.nickname) {
            errors.add("nickname", e);
        }
        if let Some(count) = self.question_count {
            if let Err(e) = check_range("question_count", count, QUESTION_COUNT_RANGE) {
                errors.add("question_count", e);
            }
        }
        if let Some(answer_time) = self.answer_time_ms {
            if let Err(e) = check_range("answer_time_ms", answer_time, ANSWER_TIME_RANGE_MS) {
                errors.add("answer_time_ms", e);
            }
        }
        if let Some(capacity) = self.capacity {
            if let Err(e) = check_range("capacity", capacity, CAPACITY_RANGE) {
                errors.add("capacity", e);
            }
        }
        if let Some(modifier) = self.speed_modifier {
            if let Err(e) = validate_speed_modifier(modifier) {
                errors.add("speed_modifier", e);
            }
        }
        if let Some(scoring) = &self.scoring {
            if scoring.streak_multiplier < 1.0 {
                let mut err = ValidationError::new("streak_multiplier_range");
                err.message = Some("Streak multiplier must be at least 1".into());
                errors.add("scoring", err);
            }
            if !(0.0..=1.0).contains(&scoring.time_penalty) {
                let mut err = ValidationError::new("time_penalty_range");
                err.message = Some("Time penalty must be in [0, 1]".into());
                errors.add("scoring", err);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Payload used to join an existing lobby.
#[derive(Debug, Deserialize, ToSchema)]
pub struct JoinGameRequest {
    pub nickname: String,
}

impl Validate for JoinGameRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(e) = validate_nickname(&self.nickname) {
            errors.add("nickname", e);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Answer submitted for the question currently open.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitAnswerRequest {
    pub answer: Answer,
    /// Index of the question the client is answering; stale submissions are rejected.
    #[serde(default)]
    pub question_index: Option<usize>,
}

/// Acknowledgement of an accepted answer.
#[derive(Debug, Serialize, ToSchema)]
pub struct AnswerAccepted {
    pub question_index: usize,
    pub question_id: u32,
}

/// Power-up a player wants to use on the open question.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PowerUpRequest {
    pub power_up: PowerUp,
}

/// Result of a played power-up.
#[derive(Debug, Serialize, ToSchema)]
pub struct PowerUpPlayed {
    pub power_up: PowerUp,
    pub question_index: usize,
    /// Wrong option revealed by `incorrect_answer` on a multiple-choice question.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eliminated_choice: Option<usize>,
    /// New end of the answer window after `halve_time`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
}

/// Reaction broadcast to the other players of a game.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReactionRequest {
    /// Short label such as an emoji.
    pub reaction: String,
}

impl Validate for ReactionRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(e) = validate_reaction(&self.reaction) {
            errors.add("reaction", e);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Public projection of a player.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct PlayerSummary {
    pub id: Uuid,
    pub nickname: String,
    pub score: u32,
    pub streak: u32,
    pub abandoned: bool,
    pub joined_at: String,
    /// Power-ups already used.
    pub power_ups: Vec<PowerUp>,
}

/// Row of a ranking.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct LeaderboardEntry {
    /// One-based rank; tied scores share a rank.
    pub rank: usize,
    pub player_id: Uuid,
    pub nickname: String,
    pub score: u32,
    pub streak: u32,
    pub abandoned: bool,
}

impl LeaderboardEntry {
    /// Rank every player of `game`.
    pub fn ranking(game: &Game) -> Vec<Self> {
        let mut entries: Vec<Self> = Vec::with_capacity(game.players.len());
        for (position, (player_id, state)) in game.leaderboard().into_iter().enumerate() {
            let rank = match entries.last() {
                Some(previous) if previous.score == state.score => previous.rank,
                _ => position + 1,
            };
            entries.push(Self {
                rank,
                player_id,
                nickname: state.nickname.clone(),
                score: state.score,
                streak: state.streak,
                abandoned: state.abandoned,
            });
        }
        entries
    }
}

/// Question as shown to players, without its answer.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct QuestionSnapshot {
    pub id: u32,
    pub text: String,
    /// `multiple_choice` or `estimate`.
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
}

impl From<&Question> for QuestionSnapshot {
    fn from(question: &Question) -> Self {
        let (kind, choices) = match &question.kind {
            QuestionKind::MultipleChoice { choices, .. } => {
                ("multiple_choice", Some(choices.clone()))
            }
            QuestionKind::Estimate { .. } => ("estimate", None),
        };
        Self {
            id: question.id,
            text: question.text.clone(),
            kind: kind.to_string(),
            choices,
        }
    }
}

/// Correct answer of `question`, in the same shape players submit.
pub fn correct_answer(question: &Question) -> Answer {
    match &question.kind {
        QuestionKind::MultipleChoice { correct, .. } => Answer::Choice { index: *correct },
        QuestionKind::Estimate { correct } => Answer::Estimate { value: *correct },
    }
}

/// Summary of a game returned by the REST API and the `INIT` event.
#[derive(Debug, Serialize, ToSchema)]
pub struct GameSummary {
    pub id: Uuid,
    pub status: GameStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_deadline: Option<String>,
    /// `definite` or `survival`.
    pub mode: String,
    pub capacity: usize,
    pub question_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_question: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<Uuid>,
    pub players: Vec<PlayerSummary>,
    pub created_at: String,
}

impl From<&Game> for GameSummary {
    fn from(game: &Game) -> Self {
        Self {
            id: game.id,
            status: game.status,
            stage: game.stage,
            stage_deadline: game.stage_deadline.map(format_system_time),
            mode: game.settings.mode.label().to_string(),
            capacity: game.settings.capacity,
            question_count: game.settings.mode.question_count(),
            current_question: game.current_question,
            host: game.host,
            players: game
                .players
                .iter()
                .map(|(id, state)| PlayerSummary {
                    id: *id,
                    nickname: state.nickname.clone(),
                    score: state.score,
                    streak: state.streak,
                    abandoned: state.abandoned,
                    joined_at: format_system_time(state.joined_at),
                    power_ups: state.power_ups.keys().copied().collect(),
                })
                .collect(),
            created_at: format_system_time(game.created_at),
        }
    }
}

fn check_range<T>(field: &'static str, value: T, (min, max): (T, T)) -> Result<(), ValidationError>
where
    T: PartialOrd + std::fmt::Display,
{
    if value < min || value > max {
        let mut err = ValidationError::new("range");
        err.message = Some(format!("{field} must be between {min} and {max} (got {value})").into());
        return Err(err);
    }
    Ok(())
}
