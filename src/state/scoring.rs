//! Pure scoring rules applied when an answer window closes.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::game::{Answer, QuestionKind};

/// Minimum spread of the closeness curve, used for small target values.
const MIN_SPREAD: f64 = 31.0;

/// Tunable scoring parameters of a game.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct ScoringConfig {
    /// Points awarded for a correct multiple-choice answer.
    pub points_correct: u32,
    /// Length of the correct-answer run that activates the multiplier.
    pub streak_size: u32,
    /// Factor applied to the points once the streak is active.
    pub streak_multiplier: f64,
    /// Points awarded for a perfect estimate.
    pub estimate_max_points: u32,
    /// Closeness at or above which an estimate keeps the streak alive.
    pub estimate_streak_threshold: f64,
    /// Share of the base points lost by answering right at the deadline.
    /// Points decay linearly with the share of the answer window used.
    pub time_penalty: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            points_correct: 100,
            streak_size: 3,
            streak_multiplier: 1.5,
            estimate_max_points: 100,
            estimate_streak_threshold: 0.75,
            time_penalty: 0.5,
        }
    }
}

/// Result of scoring one player for one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreOutcome {
    /// Points to add to the player's total.
    pub points: u32,
    /// Streak after this question.
    pub streak: u32,
    /// Whether the answer counted as correct.
    pub correct: bool,
}

impl ScoreOutcome {
    fn miss() -> Self {
        Self {
            points: 0,
            streak: 0,
            correct: false,
        }
    }
}

/// How the answer was given, beyond its value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Timing {
    /// Share of the answer window that had elapsed, in `[0, 1]`.
    pub elapsed_share: f64,
    /// The player played double points on this question.
    pub double_points: bool,
}

/// Score `answer` against `question` given the player's streak before it.
///
/// The base reward shrinks with the time taken, the streak multiplier then
/// applies, and double points comes last.
pub fn score(
    question: &QuestionKind,
    answer: Option<&Answer>,
    current_streak: u32,
    timing: Timing,
    config: &ScoringConfig,
) -> ScoreOutcome {
    let (base, correct) = match (question, answer) {
        (QuestionKind::MultipleChoice { correct, .. }, Some(Answer::Choice { index })) => {
            if index == correct {
                (f64::from(config.points_correct), true)
            } else {
                return ScoreOutcome::miss();
            }
        }
        (QuestionKind::Estimate { correct }, Some(Answer::Estimate { value })) => {
            let ratio = closeness(*value as f64, *correct as f64);
            (
                ratio * f64::from(config.estimate_max_points),
                ratio >= config.estimate_streak_threshold,
            )
        }
        _ => return ScoreOutcome::miss(),
    };

    let streak = if correct {
        current_streak.saturating_add(1)
    } else {
        0
    };
    let multiplier = if correct && streak >= config.streak_size.max(1) {
        config.streak_multiplier
    } else {
        1.0
    };

    let penalty = config.time_penalty.clamp(0.0, 1.0) * timing.elapsed_share.clamp(0.0, 1.0);
    let bonus = if timing.double_points { 2.0 } else { 1.0 };

    ScoreOutcome {
        points: (base * (1.0 - penalty) * multiplier * bonus).round().max(0.0) as u32,
        streak,
        correct,
    }
}

/// Share of the estimate reward earned by `value` when `target` was expected.
///
/// Returns `1.0` for an exact hit and decays toward `0.0` as the squared error
/// grows relative to `max(31, sqrt(|target|)^3)`.
pub fn closeness(value: f64, target: f64) -> f64 {
    let error = (value - target).abs();
    if error == 0.0 {
        return 1.0;
    }
    let spread = target.abs().sqrt().powi(3).max(MIN_SPREAD);
    let deviation = error * error / spread;
    (1.0 - erf(deviation / std::f64::consts::SQRT_2).abs()).clamp(0.0, 1.0)
}

/// Gauss error function, fixed-coefficient Chebyshev approximation.
pub fn erf(z: f64) -> f64 {
    let t = 1.0 / (1.0 + 0.5 * z.abs());
    let poly = -1.26551223
        + t * (1.00002368
            + t * (0.37409196
                + t * (0.09678418
                    + t * (-0.18628806
                        + t * (0.27886807
                            + t * (-1.13520398
                                + t * (1.48851587
                                    + t * (-0.82215223 + t * 0.17087277))))))));
    let ans = 1.0 - t * (-z * z + poly).exp();
    if z >= 0.0 { ans } else { -ans }
}
