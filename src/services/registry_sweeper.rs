use std::time::{Duration, SystemTime};

use tokio::time::sleep;
use tracing::info;

use crate::{services::game_service, state::SharedState};

const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Periodically drop finished games whose retention period has elapsed.
pub async fn run(state: SharedState) {
    let interval = sweep_interval(state.config().finished_retention);
    info!(interval_ms = interval.as_millis() as u64, "registry sweeper started");
    loop {
        sleep(interval).await;
        game_service::evict_finished(&state, SystemTime::now());
    }
}

fn sweep_interval(retention: Duration) -> Duration {
    retention.clamp(MIN_SWEEP_INTERVAL, MAX_SWEEP_INTERVAL)
}
