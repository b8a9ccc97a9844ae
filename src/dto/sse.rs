use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::game::{LeaderboardEntry, QuestionSnapshot},
    state::game::{Answer, PowerUp},
};

/// Kind of notification pushed to players, used as the SSE event name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// Snapshot of the game, sent on subscribe and when the game starts.
    Init,
    /// A question opened for answers.
    QuestionStart,
    /// The answer window closed.
    QuestionStop,
    /// Correct answer and per-player results.
    ShowAnswer,
    /// Intermediate ranking.
    ShowLeaderboard,
    /// A player left the game.
    PlayerLeft,
    /// Final ranking; no more events follow.
    GameFinished,
    /// A player used a power-up.
    PowerUpPlayed,
    /// A player sent a reaction.
    Reaction,
}

impl EventKind {
    /// Wire name of the event.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Init => "INIT",
            EventKind::QuestionStart => "QUESTION_START",
            EventKind::QuestionStop => "QUESTION_STOP",
            EventKind::ShowAnswer => "SHOW_ANSWER",
            EventKind::ShowLeaderboard => "SHOW_LEADERBOARD",
            EventKind::PlayerLeft => "PLAYER_LEFT",
            EventKind::GameFinished => "GAME_FINISHED",
            EventKind::PowerUpPlayed => "POWER_UP_PLAYED",
            EventKind::Reaction => "REACTION",
        }
    }
}

#[derive(Clone, Debug)]
/// Event queued on a player's channel.
pub struct ServerEvent {
    pub kind: EventKind,
    pub data: Option<String>,
}

impl ServerEvent {
    /// Serialise `payload` into the event data.
    pub fn json<T>(kind: EventKind, payload: &T) -> serde_json::Result<Self>
    where
        T: Serialize,
    {
        Ok(Self {
            kind,
            data: Some(serde_json::to_string(payload)?),
        })
    }

    /// Event carrying no payload.
    pub fn bare(kind: EventKind) -> Self {
        Self { kind, data: None }
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Payload of `QUESTION_START`.
pub struct QuestionStartEvent {
    /// Zero-based question index.
    pub index: usize,
    /// Total number of questions.
    pub total: usize,
    pub question: QuestionSnapshot,
    /// Answer window length in milliseconds.
    pub answer_time_ms: u64,
    /// RFC 3339 time at which the window closes.
    pub deadline: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Payload of `QUESTION_STOP`.
pub struct QuestionStopEvent {
    pub index: usize,
    pub question_id: u32,
    /// Number of players who answered in time.
    pub answers: usize,
}

#[derive(Debug, Serialize, ToSchema)]
/// Per-player outcome shown with the correct answer.
pub struct PlayerResult {
    pub player_id: Uuid,
    pub correct: bool,
    pub points: u32,
    pub score: u32,
    pub streak: u32,
    /// Points were doubled by a power-up.
    pub double_points: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<Answer>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Payload of `SHOW_ANSWER`.
pub struct ShowAnswerEvent {
    pub index: usize,
    pub question_id: u32,
    pub correct_answer: Answer,
    pub results: Vec<PlayerResult>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Payload of `SHOW_LEADERBOARD`.
pub struct LeaderboardEvent {
    /// Number of questions played so far.
    pub played: usize,
    pub entries: Vec<LeaderboardEntry>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Payload of `PLAYER_LEFT`.
pub struct PlayerLeftEvent {
    pub player_id: Uuid,
    /// Players still taking part.
    pub remaining: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Payload of `GAME_FINISHED`.
pub struct GameFinishedEvent {
    pub leaderboard: Vec<LeaderboardEntry>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Payload of `POWER_UP_PLAYED`.
pub struct PowerUpPlayedEvent {
    pub player_id: Uuid,
    pub power_up: PowerUp,
    /// Question the power-up was played on.
    pub index: usize,
    /// New end of the answer window, when it moved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Payload of `REACTION`.
pub struct ReactionEvent {
    pub player_id: Uuid,
    pub nickname: String,
    pub reaction: String,
}
