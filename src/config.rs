//! Application-level configuration loading: stage timing, channel sizes and game defaults.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    dto::validation::validate_speed_modifier,
    state::{scoring::ScoringConfig, state_machine::StageTiming},
};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "TRIVIA_BACK_CONFIG_PATH";
/// Default location of the question bank.
const DEFAULT_QUESTION_BANK_PATH: &str = "config/questions.json";
/// Survival decay used when the configured one is out of range.
const DEFAULT_SPEED_MODIFIER: f64 = 0.9;

#[derive(Debug, Clone, PartialEq)]
/// Settings applied to a new game when the request leaves them out.
pub struct GameDefaults {
    /// Questions per game.
    pub question_count: usize,
    /// Answer window of each question.
    pub answer_time: Duration,
    /// Lobby capacity.
    pub capacity: usize,
    /// Survival answer-time decay.
    pub speed_modifier: f64,
    /// Scoring parameters.
    pub scoring: ScoringConfig,
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Delays between stages and leaderboard cadence.
    pub timing: StageTiming,
    /// Events buffered per player before they are dropped as too slow.
    pub event_channel_capacity: usize,
    /// JSON question bank, when configured.
    pub question_bank_path: Option<PathBuf>,
    /// How long a finished game stays readable before it is evicted.
    pub finished_retention: Duration,
    /// Defaults for new games.
    pub defaults: GameDefaults,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        leaderboard_interval = app_config.timing.leaderboard_interval,
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a configuration document; omitted keys keep their defaults.
    pub fn from_json(contents: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    timing: RawTiming,
    leaderboard_interval: usize,
    event_channel_capacity: usize,
    question_bank_path: Option<PathBuf>,
    finished_retention_ms: u64,
    defaults: RawDefaults,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            timing: RawTiming::default(),
            leaderboard_interval: 5,
            event_channel_capacity: 32,
            question_bank_path: Some(PathBuf::from(DEFAULT_QUESTION_BANK_PATH)),
            finished_retention_ms: 300_000,
            defaults: RawDefaults::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
/// Stage delays in milliseconds.
struct RawTiming {
    preparation_ms: u64,
    answer_reveal_ms: u64,
    leaderboard_ms: u64,
}

impl Default for RawTiming {
    fn default() -> Self {
        Self {
            preparation_ms: 5_000,
            answer_reveal_ms: 8_000,
            leaderboard_ms: 8_000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
/// Defaults applied to new games.
struct RawDefaults {
    question_count: usize,
    answer_time_ms: u64,
    capacity: usize,
    speed_modifier: f64,
    scoring: ScoringConfig,
}

impl Default for RawDefaults {
    fn default() -> Self {
        Self {
            question_count: 10,
            answer_time_ms: 20_000,
            capacity: 6,
            speed_modifier: DEFAULT_SPEED_MODIFIER,
            scoring: ScoringConfig::default(),
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let speed_modifier = match validate_speed_modifier(value.defaults.speed_modifier) {
            Ok(()) => value.defaults.speed_modifier,
            Err(err) => {
                warn!(
                    speed_modifier = value.defaults.speed_modifier,
                    error = %err,
                    fallback = DEFAULT_SPEED_MODIFIER,
                    "configured speed modifier out of range; using fallback"
                );
                DEFAULT_SPEED_MODIFIER
            }
        };

        Self {
            timing: StageTiming {
                preparation: Duration::from_millis(value.timing.preparation_ms),
                answer_reveal: Duration::from_millis(value.timing.answer_reveal_ms),
                leaderboard: Duration::from_millis(value.timing.leaderboard_ms),
                leaderboard_interval: value.leaderboard_interval,
            },
            event_channel_capacity: value.event_channel_capacity.max(1),
            question_bank_path: value
                .question_bank_path
                .filter(|path| !path.as_os_str().is_empty()),
            finished_retention: Duration::from_millis(value.finished_retention_ms),
            defaults: GameDefaults {
                question_count: value.defaults.question_count.max(1),
                answer_time: Duration::from_millis(value.defaults.answer_time_ms),
                capacity: value.defaults.capacity.max(1),
                speed_modifier,
                scoring: value.defaults.scoring,
            },
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
