use serde::Serialize;
use utoipa::ToSchema;

/// Health payload returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Games currently held in memory.
    pub games: usize,
    /// Games whose stage machine is running.
    pub running: usize,
    /// Questions available in the bank.
    pub questions: usize,
}

impl HealthResponse {
    /// Create a health response; an empty question bank is reported as degraded.
    pub fn new(games: usize, running: usize, questions: usize) -> Self {
        let status = if questions == 0 { "degraded" } else { "ok" };
        Self {
            status: status.to_string(),
            games,
            running,
            questions,
        }
    }
}
