use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the trivia backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::game::create_game,
        crate::routes::game::get_game,
        crate::routes::game::join_game,
        crate::routes::game::leave_game,
        crate::routes::game::start_game,
        crate::routes::game::submit_answer,
        crate::routes::game::play_power_up,
        crate::routes::game::send_reaction,
        crate::routes::sse::game_stream,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::game::CreateGameRequest,
            crate::dto::game::ModeInput,
            crate::dto::game::JoinGameRequest,
            crate::dto::game::SubmitAnswerRequest,
            crate::dto::game::AnswerAccepted,
            crate::dto::game::PowerUpRequest,
            crate::dto::game::PowerUpPlayed,
            crate::dto::game::ReactionRequest,
            crate::dto::game::GameSummary,
            crate::dto::game::PlayerSummary,
            crate::dto::game::LeaderboardEntry,
            crate::dto::game::QuestionSnapshot,
            crate::dto::sse::EventKind,
            crate::dto::sse::QuestionStartEvent,
            crate::dto::sse::QuestionStopEvent,
            crate::dto::sse::PlayerResult,
            crate::dto::sse::ShowAnswerEvent,
            crate::dto::sse::LeaderboardEvent,
            crate::dto::sse::PlayerLeftEvent,
            crate::dto::sse::GameFinishedEvent,
            crate::dto::sse::PowerUpPlayedEvent,
            crate::dto::sse::ReactionEvent,
            crate::state::game::Answer,
            crate::state::game::GameStatus,
            crate::state::game::PowerUp,
            crate::state::scoring::ScoringConfig,
            crate::state::state_machine::Stage,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "game", description = "Lobby and game lifecycle"),
        (name = "sse", description = "Server-sent game events"),
    )
)]
pub struct ApiDoc;
