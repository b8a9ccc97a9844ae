use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, Query, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use serde::Deserialize;
use tracing::info;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{error::AppError, services::sse_service, state::SharedState};

/// Query string identifying the subscribing player.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StreamQuery {
    /// Player opening the stream.
    pub player: Uuid,
}

#[utoipa::path(
    get,
    path = "/games/{id}/events",
    tag = "sse",
    params(
        ("id" = Uuid, Path, description = "Identifier of the game"),
        StreamQuery
    ),
    responses(
        (status = 200, description = "Game event stream, starting with INIT", content_type = "text/event-stream", body = String),
        (status = 404, description = "Unknown game or player")
    )
)]
/// Stream the events of one game to one of its players.
pub async fn game_stream(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let receiver = sse_service::subscribe(&state, id, query.player)?;
    info!(game_id = %id, player_id = %query.player, "new player event stream");
    Ok(sse_service::to_sse_stream(receiver, id, query.player))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/games/{id}/events", get(game_stream))
}
