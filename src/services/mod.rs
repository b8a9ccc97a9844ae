/// OpenAPI documentation generation.
pub mod documentation;
/// Lobby management, game start and answer submission.
pub mod game_service;
/// Health check service.
pub mod health_service;
/// Background eviction of finished games.
pub mod registry_sweeper;
/// Game event payloads and fan-out helpers.
pub mod sse_events;
/// Server-Sent Events streaming of per-player channels.
pub mod sse_service;
