use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::game::{
        AnswerAccepted, CreateGameRequest, GameSummary, JoinGameRequest, PowerUpPlayed,
        PowerUpRequest, ReactionRequest, SubmitAnswerRequest,
    },
    error::AppError,
    services::game_service,
    state::{SharedState, game::PlayerId},
};

/// Header carrying the identity of the calling player.
pub const PLAYER_ID_HEADER: &str = "x-player-id";

/// Routes handling lobbies and running games.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/games", post(create_game))
        .route("/games/{id}", get(get_game))
        .route("/games/{id}/players", post(join_game).delete(leave_game))
        .route("/games/{id}/start", post(start_game))
        .route("/games/{id}/answers", post(submit_answer))
        .route("/games/{id}/power-ups", post(play_power_up))
        .route("/games/{id}/reactions", post(send_reaction))
}

/// Open a new lobby; the caller joins it as host.
#[utoipa::path(
    post,
    path = "/games",
    tag = "game",
    params(("x-player-id" = Uuid, Header, description = "Identity of the calling player")),
    request_body = CreateGameRequest,
    responses(
        (status = 200, description = "Lobby created", body = GameSummary),
        (status = 400, description = "Invalid settings"),
        (status = 401, description = "Missing player identity")
    )
)]
pub async fn create_game(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(payload): Json<CreateGameRequest>,
) -> Result<Json<GameSummary>, AppError> {
    let player = player_id(&headers)?;
    payload.validate()?;
    let summary = game_service::create_game(&state, player, payload).await?;
    Ok(Json(summary))
}

#[utoipa::path(
    get,
    path = "/games/{id}",
    tag = "game",
    params(("id" = Uuid, Path, description = "Identifier of the game")),
    responses(
        (status = 200, description = "Current game summary", body = GameSummary),
        (status = 404, description = "Unknown game")
    )
)]
/// Fetch the current summary of a game.
pub async fn get_game(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<GameSummary>, AppError> {
    Ok(Json(game_service::get_game(&state, id).await?))
}

#[utoipa::path(
    post,
    path = "/games/{id}/players",
    tag = "game",
    params(
        ("id" = Uuid, Path, description = "Identifier of the game"),
        ("x-player-id" = Uuid, Header, description = "Identity of the calling player")
    ),
    request_body = JoinGameRequest,
    responses(
        (status = 200, description = "Player joined", body = GameSummary),
        (status = 404, description = "Unknown game"),
        (status = 409, description = "Lobby full, already joined or game started")
    )
)]
/// Join a lobby.
pub async fn join_game(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<JoinGameRequest>,
) -> Result<Json<GameSummary>, AppError> {
    let player = player_id(&headers)?;
    payload.validate()?;
    Ok(Json(
        game_service::join_game(&state, id, player, payload).await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/games/{id}/players",
    tag = "game",
    params(
        ("id" = Uuid, Path, description = "Identifier of the game"),
        ("x-player-id" = Uuid, Header, description = "Identity of the calling player")
    ),
    responses(
        (status = 204, description = "Player left the lobby or abandoned the game"),
        (status = 404, description = "Unknown game or player"),
        (status = 409, description = "Game finished or player already left")
    )
)]
/// Leave a lobby, or abandon a running game.
pub async fn leave_game(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let player = player_id(&headers)?;
    game_service::remove_player(&state, id, player).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/games/{id}/start",
    tag = "game",
    params(
        ("id" = Uuid, Path, description = "Identifier of the game"),
        ("x-player-id" = Uuid, Header, description = "Identity of the host")
    ),
    responses(
        (status = 200, description = "Game started", body = GameSummary),
        (status = 404, description = "Unknown game"),
        (status = 409, description = "Caller is not host or game already started")
    )
)]
/// Draw the questions and start the game clock. Host only.
pub async fn start_game(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<GameSummary>, AppError> {
    let player = player_id(&headers)?;
    Ok(Json(game_service::start_game(&state, id, player).await?))
}

#[utoipa::path(
    post,
    path = "/games/{id}/answers",
    tag = "game",
    params(
        ("id" = Uuid, Path, description = "Identifier of the game"),
        ("x-player-id" = Uuid, Header, description = "Identity of the calling player")
    ),
    request_body = SubmitAnswerRequest,
    responses(
        (status = 200, description = "Answer recorded", body = AnswerAccepted),
        (status = 400, description = "Answer does not fit the question"),
        (status = 409, description = "No answer window open")
    )
)]
/// Answer the open question. Later submissions replace earlier ones.
pub async fn submit_answer(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<Json<AnswerAccepted>, AppError> {
    let player = player_id(&headers)?;
    Ok(Json(
        game_service::submit_answer(&state, id, player, payload).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/games/{id}/power-ups",
    tag = "game",
    params(
        ("id" = Uuid, Path, description = "Identifier of the game"),
        ("x-player-id" = Uuid, Header, description = "Identity of the calling player")
    ),
    request_body = PowerUpRequest,
    responses(
        (status = 200, description = "Power-up played", body = PowerUpPlayed),
        (status = 404, description = "Unknown game or player"),
        (status = 409, description = "No question open, power-up already used or too little time left")
    )
)]
/// Play a one-shot power-up on the open question.
pub async fn play_power_up(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<PowerUpRequest>,
) -> Result<Json<PowerUpPlayed>, AppError> {
    let player = player_id(&headers)?;
    Ok(Json(
        game_service::play_power_up(&state, id, player, payload).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/games/{id}/reactions",
    tag = "game",
    params(
        ("id" = Uuid, Path, description = "Identifier of the game"),
        ("x-player-id" = Uuid, Header, description = "Identity of the calling player")
    ),
    request_body = ReactionRequest,
    responses(
        (status = 202, description = "Reaction relayed"),
        (status = 400, description = "Empty or oversized reaction"),
        (status = 404, description = "Unknown game or player"),
        (status = 409, description = "Game finished or player left")
    )
)]
/// Send a short reaction to the other players.
pub async fn send_reaction(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<ReactionRequest>,
) -> Result<StatusCode, AppError> {
    let player = player_id(&headers)?;
    payload.validate()?;
    game_service::send_reaction(&state, id, player, payload).await?;
    Ok(StatusCode::ACCEPTED)
}

fn player_id(headers: &HeaderMap) -> Result<PlayerId, AppError> {
    let raw = headers
        .get(PLAYER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            AppError::Unauthorized(format!("missing player header `{PLAYER_ID_HEADER}`"))
        })?;
    Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::Unauthorized(format!("malformed player id `{raw}`")))
}
