use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report the number of live games and whether questions can be drawn.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let questions = state.question_bank().len();
    if questions == 0 {
        warn!("question bank is empty; games cannot be started");
    }

    HealthResponse::new(state.games().len(), state.running_games(), questions)
}
