use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    config::GameDefaults,
    dao::question_bank::draw_questions,
    dto::{
        game::{
            AnswerAccepted, CreateGameRequest, GameSummary, JoinGameRequest, ModeInput,
            PowerUpPlayed, PowerUpRequest, ReactionRequest, SubmitAnswerRequest,
        },
        sse::ReactionEvent,
    },
    error::ServiceError,
    services::sse_events,
    state::{
        GameEntry, SharedGame, SharedState,
        game::{Game, GameId, GameMode, GameSettings, GameStatus, PlayerId, Question, Removal},
        read_game,
        state_machine::GameMachine,
        write_game,
    },
};

/// Open a new lobby with `player` as host.
pub async fn create_game(
    state: &SharedState,
    player: PlayerId,
    request: CreateGameRequest,
) -> Result<GameSummary, ServiceError> {
    let settings = build_settings(&state.config().defaults, &request);
    let mut game = Game::new(Uuid::new_v4(), settings);
    game.add_player(player, request.nickname.trim().to_string())?;

    let summary = GameSummary::from(&game);
    info!(
        game_id = %game.id,
        player_id = %player,
        mode = game.settings.mode.label(),
        capacity = game.settings.capacity,
        "created game"
    );
    state.games().insert(
        game.id,
        GameEntry {
            game: Arc::new(std::sync::RwLock::new(game)),
            machine: None,
        },
    );
    Ok(summary)
}

/// Current summary of a game.
pub async fn get_game(state: &SharedState, id: GameId) -> Result<GameSummary, ServiceError> {
    let entry = state.game(&id)?;
    let game = read_game(&entry.game);
    Ok(GameSummary::from(&*game))
}

/// Add `player` to the lobby of `id`.
pub async fn join_game(
    state: &SharedState,
    id: GameId,
    player: PlayerId,
    request: JoinGameRequest,
) -> Result<GameSummary, ServiceError> {
    let entry = state.game(&id)?;
    let game = {
        let mut game = write_game(&entry.game);
        game.add_player(player, request.nickname.trim().to_string())?;
        game.clone()
    };

    info!(game_id = %id, player_id = %player, players = game.players.len(), "player joined");
    sse_events::broadcast_init(state.broadcaster(), &game);
    Ok(GameSummary::from(&game))
}

/// Remove `player` from `id`: leave a lobby or abandon a running game.
pub async fn remove_player(
    state: &SharedState,
    id: GameId,
    player: PlayerId,
) -> Result<Removal, ServiceError> {
    let entry = state.game(&id)?;
    let (removal, remaining) = {
        let mut game = write_game(&entry.game);
        let removal = game.remove_player(&player)?;
        (removal, game.active_players().count())
    };
    state.broadcaster().unregister(&id, &player);
    info!(game_id = %id, player_id = %player, ?removal, "player left");

    match removal {
        Removal::LobbyEmpty => {
            state.games().remove(&id);
            state.broadcaster().unregister_game(&id);
            info!(game_id = %id, "discarded empty lobby");
        }
        Removal::LeftLobby { host } => {
            sse_events::broadcast_player_left(state.broadcaster(), &id, player, remaining, host);
        }
        Removal::Abandoned => {
            sse_events::broadcast_player_left(state.broadcaster(), &id, player, remaining, None);
        }
        // Looked up again: the machine may have been published since `entry` was read.
        Removal::LastPlayerLeft => match state.games().get(&id).and_then(|slot| slot.machine.clone()) {
            Some(machine) => machine.finish_now(),
            None => debug!(game_id = %id, "game finishes once its stage machine starts"),
        },
    }

    Ok(removal)
}

/// Draw the questions of `id` and start its stage machine. Only the host may start.
pub async fn start_game(
    state: &SharedState,
    id: GameId,
    player: PlayerId,
) -> Result<GameSummary, ServiceError> {
    let entry = state.game(&id)?;
    let question_count = {
        let game = read_game(&entry.game);
        if game.host != Some(player) {
            return Err(ServiceError::InvalidState(format!(
                "only the host can start game `{id}`"
            )));
        }
        game.settings.mode.question_count()
    };

    let pool = state.question_bank().question_pool().await?;
    if pool.len() < question_count {
        return Err(ServiceError::InvalidState(format!(
            "question bank holds {} questions, {question_count} requested",
            pool.len()
        )));
    }

    let seed = rand::random::<u64>();
    let questions = draw_questions(seed, pool, question_count);
    write_game(&entry.game).start(seed, questions.iter().map(|question| question.id).collect())?;
    info!(game_id = %id, seed, question_count, "game started");
    launch_machine(state, id, &entry.game, questions)?;

    let game = read_game(&entry.game);
    Ok(GameSummary::from(&*game))
}

/// Publish and start the stage machine of a game that was just started.
///
/// Every player may have left between the start and the publication, in
/// which case the machine is finished right away.
fn launch_machine(
    state: &SharedState,
    id: GameId,
    game: &SharedGame,
    questions: Vec<Question>,
) -> Result<Arc<GameMachine>, ServiceError> {
    let machine = GameMachine::new(
        Arc::clone(game),
        questions,
        Arc::clone(state.broadcaster()),
        Arc::clone(state.scheduler()),
        state.config().timing,
    )?;
    if let Some(mut slot) = state.games().get_mut(&id) {
        slot.machine = Some(Arc::clone(&machine));
    }
    machine.start()?;

    let deserted = read_game(game).active_players().next().is_none();
    if deserted {
        info!(game_id = %id, "every player left before the first stage");
        machine.finish_now();
    }
    Ok(machine)
}

/// Record the answer of `player` for the question currently open in `id`.
pub async fn submit_answer(
    state: &SharedState,
    id: GameId,
    player: PlayerId,
    request: SubmitAnswerRequest,
) -> Result<AnswerAccepted, ServiceError> {
    let entry = state.game(&id)?;
    let machine = entry.machine.ok_or_else(|| {
        ServiceError::InvalidState(format!("game `{id}` has not been started"))
    })?;
    machine.submit_answer(player, request.question_index, request.answer)
}

/// Play a power-up of `player` on the question currently open in `id`.
pub async fn play_power_up(
    state: &SharedState,
    id: GameId,
    player: PlayerId,
    request: PowerUpRequest,
) -> Result<PowerUpPlayed, ServiceError> {
    let entry = state.game(&id)?;
    let machine = entry.machine.ok_or_else(|| {
        ServiceError::InvalidState(format!("game `{id}` has not been started"))
    })?;
    machine.play_power_up(player, request.power_up)
}

/// Relay a reaction of `player` to everyone connected to `id`.
///
/// Returns the number of channels it was delivered to.
pub async fn send_reaction(
    state: &SharedState,
    id: GameId,
    player: PlayerId,
    request: ReactionRequest,
) -> Result<usize, ServiceError> {
    let entry = state.game(&id)?;
    let nickname = {
        let game = read_game(&entry.game);
        if game.status == GameStatus::Finished {
            return Err(ServiceError::InvalidState(format!(
                "game `{id}` is already finished"
            )));
        }
        match game.players.get(&player) {
            None => {
                return Err(ServiceError::NotFound(format!(
                    "player `{player}` is not in game `{id}`"
                )));
            }
            Some(member) if member.abandoned => {
                return Err(ServiceError::InvalidState(format!(
                    "player `{player}` left game `{id}`"
                )));
            }
            Some(member) => member.nickname.clone(),
        }
    };

    let delivered = sse_events::broadcast_reaction(
        state.broadcaster(),
        &id,
        &ReactionEvent {
            player_id: player,
            nickname,
            reaction: request.reaction.trim().to_string(),
        },
    );
    debug!(game_id = %id, player_id = %player, delivered, "reaction relayed");
    Ok(delivered)
}

/// Drop finished games kept longer than the configured retention.
///
/// Returns how many games were removed.
pub fn evict_finished(state: &SharedState, now: SystemTime) -> usize {
    let retention = state.config().finished_retention;
    let expired: Vec<GameId> = state
        .games()
        .iter()
        .filter(|entry| {
            let game = read_game(&entry.game);
            game.status == GameStatus::Finished
                && game
                    .finished_at
                    .and_then(|finished_at| finished_at.checked_add(retention))
                    .is_some_and(|expiry| expiry <= now)
        })
        .map(|entry| *entry.key())
        .collect();

    for id in &expired {
        state.games().remove(id);
        state.broadcaster().unregister_game(id);
        debug!(game_id = %id, "evicted finished game");
    }
    if !expired.is_empty() {
        info!(evicted = expired.len(), remaining = state.games().len(), "swept finished games");
    }
    expired.len()
}

fn build_settings(defaults: &GameDefaults, request: &CreateGameRequest) -> GameSettings {
    let question_count = request.question_count.unwrap_or(defaults.question_count);
    let answer_time = request
        .answer_time_ms
        .map(Duration::from_millis)
        .unwrap_or(defaults.answer_time);
    let mode = match request.mode {
        ModeInput::Definite => GameMode::Definite {
            question_count,
            answer_time,
        },
        ModeInput::Survival => GameMode::Survival {
            question_count,
            answer_time,
            speed_modifier: request.speed_modifier.unwrap_or(defaults.speed_modifier),
        },
    };

    GameSettings {
        mode,
        capacity: request.capacity.unwrap_or(defaults.capacity),
        scoring: request.scoring.unwrap_or(defaults.scoring),
    }
}
