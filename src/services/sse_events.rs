use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::{
    dto::{
        game::GameSummary,
        sse::{
            EventKind, GameFinishedEvent, LeaderboardEvent, PlayerLeftEvent, PowerUpPlayedEvent,
            QuestionStartEvent, QuestionStopEvent, ReactionEvent, ServerEvent, ShowAnswerEvent,
        },
    },
    state::{
        broadcast::Broadcaster,
        game::{Game, GameId, PlayerId},
    },
};

/// Broadcast the game snapshot to every player of `game`.
pub fn broadcast_init(broadcaster: &Broadcaster, game: &Game) -> usize {
    send_game_event(broadcaster, &game.id, EventKind::Init, &GameSummary::from(game))
}

/// Send the game snapshot to a single, freshly connected player.
pub fn send_init(broadcaster: &Broadcaster, game: &Game, player: &PlayerId) -> bool {
    match ServerEvent::json(EventKind::Init, &GameSummary::from(game)) {
        Ok(event) => broadcaster.send_to(&game.id, player, event),
        Err(err) => {
            warn!(event = EventKind::Init.as_str(), error = %err, "failed to serialize game event payload");
            false
        }
    }
}

/// Broadcast that a question opened.
pub fn broadcast_question_start(
    broadcaster: &Broadcaster,
    game: &GameId,
    payload: &QuestionStartEvent,
) -> usize {
    send_game_event(broadcaster, game, EventKind::QuestionStart, payload)
}

/// Broadcast that the answer window closed.
pub fn broadcast_question_stop(
    broadcaster: &Broadcaster,
    game: &GameId,
    payload: &QuestionStopEvent,
) -> usize {
    send_game_event(broadcaster, game, EventKind::QuestionStop, payload)
}

/// Broadcast the correct answer and per-player results.
pub fn broadcast_show_answer(
    broadcaster: &Broadcaster,
    game: &GameId,
    payload: &ShowAnswerEvent,
) -> usize {
    send_game_event(broadcaster, game, EventKind::ShowAnswer, payload)
}

/// Broadcast the intermediate ranking.
pub fn broadcast_leaderboard(
    broadcaster: &Broadcaster,
    game: &GameId,
    payload: &LeaderboardEvent,
) -> usize {
    send_game_event(broadcaster, game, EventKind::ShowLeaderboard, payload)
}

/// Broadcast that a player left.
pub fn broadcast_player_left(
    broadcaster: &Broadcaster,
    game: &GameId,
    player_id: Uuid,
    remaining: usize,
    host: Option<Uuid>,
) -> usize {
    let payload = PlayerLeftEvent {
        player_id,
        remaining,
        host,
    };
    send_game_event(broadcaster, game, EventKind::PlayerLeft, &payload)
}

/// Broadcast the final ranking.
pub fn broadcast_game_finished(
    broadcaster: &Broadcaster,
    game: &GameId,
    payload: &GameFinishedEvent,
) -> usize {
    send_game_event(broadcaster, game, EventKind::GameFinished, payload)
}

/// Broadcast that a power-up was played.
pub fn broadcast_power_up(
    broadcaster: &Broadcaster,
    game: &GameId,
    payload: &PowerUpPlayedEvent,
) -> usize {
    send_game_event(broadcaster, game, EventKind::PowerUpPlayed, payload)
}

/// Broadcast a player's reaction.
pub fn broadcast_reaction(
    broadcaster: &Broadcaster,
    game: &GameId,
    payload: &ReactionEvent,
) -> usize {
    send_game_event(broadcaster, game, EventKind::Reaction, payload)
}

fn send_game_event(
    broadcaster: &Broadcaster,
    game: &GameId,
    kind: EventKind,
    payload: &impl Serialize,
) -> usize {
    match ServerEvent::json(kind, payload) {
        Ok(event) => broadcaster.send_to_all(game, &event),
        Err(err) => {
            warn!(event = kind.as_str(), error = %err, "failed to serialize game event payload");
            0
        }
    }
}
