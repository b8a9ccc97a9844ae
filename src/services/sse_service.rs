use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

use crate::{
    dto::sse::ServerEvent,
    error::ServiceError,
    services::sse_events,
    state::{
        SharedState,
        game::{GameId, GameStatus, PlayerId},
        read_game,
    },
};

/// Open the event channel of `player` in `game` and queue the current game
/// summary as its first event.
///
/// A second subscription of the same player replaces the first one. Players
/// who left the game can no longer subscribe.
pub fn subscribe(
    state: &SharedState,
    game: GameId,
    player: PlayerId,
) -> Result<mpsc::Receiver<ServerEvent>, ServiceError> {
    let entry = state.game(&game)?;
    let snapshot = {
        let guard = read_game(&entry.game);
        if !guard.players.contains_key(&player) {
            return Err(ServiceError::NotFound(format!(
                "player `{player}` is not in game `{game}`"
            )));
        }
        if !guard.is_active_player(&player) {
            return Err(ServiceError::InvalidState(format!(
                "player `{player}` left game `{game}`"
            )));
        }
        guard.clone()
    };

    let receiver = state.broadcaster().register(game, player);
    sse_events::send_init(state.broadcaster(), &snapshot, &player);
    if snapshot.status == GameStatus::Finished {
        // Nothing follows the final snapshot; the stream ends once it is read.
        state.broadcaster().unregister(&game, &player);
    }
    Ok(receiver)
}

/// Convert a player channel into an SSE response. The channel is dropped once
/// the client disconnects, which unregisters it on the next delivery.
pub fn to_sse_stream(
    mut receiver: mpsc::Receiver<ServerEvent>,
    game: GameId,
    player: PlayerId,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                next = receiver.recv() => {
                    let Some(payload) = next else { break };
                    let event = Event::default()
                        .event(payload.kind.as_str())
                        .data(payload.data.unwrap_or_default());
                    if tx.send(Ok(event)).await.is_err() {
                        break;
                    }
                }
            }
        }
        info!(game_id = %game, player_id = %player, "player event stream disconnected");
    });

    Sse::new(ReceiverStream::new(rx)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::question_bank::InMemoryQuestionBank,
        dto::sse::EventKind,
        state::{
            AppState, GameEntry,
            game::{Game, GameMode, GameSettings},
            scheduler::ManualScheduler,
        },
    };

    fn state_with_game(player: PlayerId) -> (SharedState, GameId) {
        let state = AppState::new(
            AppConfig::default(),
            Arc::new(InMemoryQuestionBank::builtin()),
            Arc::new(ManualScheduler::new()),
        );
        let mut game = Game::new(
            Uuid::new_v4(),
            GameSettings {
                mode: GameMode::Definite {
                    question_count: 2,
                    answer_time: Duration::from_secs(5),
                },
                capacity: 4,
                scoring: Default::default(),
            },
        );
        game.add_player(player, "ada".into()).unwrap();
        let id = game.id;
        state.games().insert(
            id,
            GameEntry {
                game: Arc::new(std::sync::RwLock::new(game)),
                machine: None,
            },
        );
        (state, id)
    }

    #[test]
    fn subscribe_sends_init_first() {
        let player = Uuid::new_v4();
        let (state, id) = state_with_game(player);

        let mut receiver = subscribe(&state, id, player).unwrap();
        let init = receiver.try_recv().unwrap();

        assert_eq!(init.kind, EventKind::Init);
        let summary: serde_json::Value = serde_json::from_str(init.data.as_deref().unwrap()).unwrap();
        assert_eq!(summary["id"], id.to_string());
        assert_eq!(summary["players"][0]["nickname"], "ada");
        assert!(state.broadcaster().is_registered(&id, &player));
    }

    #[test]
    fn subscribe_rejects_strangers_and_unknown_games() {
        let player = Uuid::new_v4();
        let (state, id) = state_with_game(player);

        let stranger = subscribe(&state, id, Uuid::new_v4());
        let unknown = subscribe(&state, Uuid::new_v4(), player);

        assert!(matches!(stranger, Err(ServiceError::NotFound(_))));
        assert!(matches!(unknown, Err(ServiceError::NotFound(_))));
    }

    #[test]
    fn players_who_left_cannot_subscribe() {
        let player = Uuid::new_v4();
        let (state, id) = state_with_game(player);
        {
            let entry = state.game(&id).unwrap();
            let mut game = crate::state::write_game(&entry.game);
            game.players.get_mut(&player).unwrap().abandoned = true;
        }

        let result = subscribe(&state, id, player);

        assert!(matches!(result, Err(ServiceError::InvalidState(_))));
        assert!(!state.broadcaster().is_registered(&id, &player));
    }

    #[test]
    fn finished_game_stream_ends_after_the_snapshot() {
        let player = Uuid::new_v4();
        let (state, id) = state_with_game(player);
        {
            let entry = state.game(&id).unwrap();
            crate::state::write_game(&entry.game).status = GameStatus::Finished;
        }

        let mut receiver = subscribe(&state, id, player).unwrap();

        assert_eq!(receiver.try_recv().unwrap().kind, EventKind::Init);
        assert!(matches!(
            receiver.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        assert!(!state.broadcaster().is_registered(&id, &player));
    }
}
