use std::{
    collections::BTreeMap,
    sync::{
        Arc, Mutex, MutexGuard, Weak,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant, SystemTime},
};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info};
use utoipa::ToSchema;

use crate::{
    dto::{
        format_system_time,
        game::{AnswerAccepted, LeaderboardEntry, PowerUpPlayed, QuestionSnapshot, correct_answer},
        sse::{
            GameFinishedEvent, LeaderboardEvent, PlayerResult, PowerUpPlayedEvent,
            QuestionStartEvent, QuestionStopEvent, ShowAnswerEvent,
        },
    },
    error::ServiceError,
    services::sse_events,
    state::{
        SharedGame,
        answers::AnswerCollection,
        broadcast::Broadcaster,
        game::{Answer, GameId, GameStatus, PlayerId, PowerUp, Question, QuestionKind},
        read_game,
        scheduler::{Scheduler, TaskHandle},
        scoring::{self, Timing},
        write_game,
    },
};

/// Shortest answer window `halve_time` can leave behind.
const MIN_HALVED_WINDOW: Duration = Duration::from_secs(1);

/// Stage of a running game. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    /// Countdown before the first question.
    Preparing,
    /// A question is open for answers.
    Question,
    /// The correct answer and results are shown.
    AnswerReveal,
    /// Intermediate ranking is shown.
    Leaderboard,
    /// No stage follows.
    Finished,
}

/// Error returned when no stage can follow the current one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: no stage follows {from:?} at question {index:?} of {total}")]
pub struct InvalidTransition {
    /// Stage the game was in.
    pub from: Stage,
    /// Question index at that time.
    pub index: Option<usize>,
    /// Number of questions in the game.
    pub total: usize,
}

/// Compute the stage following `from`.
///
/// After question `index` is revealed the leaderboard is shown when
/// `(index + 1) % interval == 0` and questions remain; an interval of zero
/// never shows it.
pub fn next_stage(
    from: Stage,
    index: Option<usize>,
    total: usize,
    interval: usize,
) -> Result<Stage, InvalidTransition> {
    let invalid = InvalidTransition { from, index, total };
    let remaining = match index {
        None => total > 0,
        Some(index) => index + 1 < total,
    };

    let next = match from {
        Stage::Preparing if index.is_none() && total > 0 => Stage::Question,
        Stage::Question if index.is_some() => Stage::AnswerReveal,
        Stage::AnswerReveal => match index {
            Some(_) if !remaining => Stage::Finished,
            Some(index) if interval > 0 && (index + 1) % interval == 0 => Stage::Leaderboard,
            Some(_) => Stage::Question,
            None => return Err(invalid),
        },
        Stage::Leaderboard if index.is_some() => {
            if remaining {
                Stage::Question
            } else {
                Stage::Finished
            }
        }
        _ => return Err(invalid),
    };

    Ok(next)
}

/// Delays between stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTiming {
    /// Length of the preparation countdown.
    pub preparation: Duration,
    /// How long the correct answer stays on screen.
    pub answer_reveal: Duration,
    /// How long the leaderboard stays on screen.
    pub leaderboard: Duration,
    /// Questions between two leaderboards.
    pub leaderboard_interval: usize,
}

#[derive(Debug, Default)]
struct Cursor {
    ticket: u64,
    pending: Option<TaskHandle>,
    deadline: Option<Instant>,
}

/// Drives the stages of one game on its own timer.
///
/// Every transition runs under the cursor lock, so transitions of one game
/// never interleave. A scheduled callback carries the ticket it was issued
/// with and does nothing if the machine moved on or was stopped meanwhile.
pub struct GameMachine {
    game_id: GameId,
    game: SharedGame,
    questions: Vec<Question>,
    answers: Mutex<Option<Arc<AnswerCollection>>>,
    running: AtomicBool,
    cursor: Mutex<Cursor>,
    broadcaster: Arc<Broadcaster>,
    scheduler: Arc<dyn Scheduler>,
    timing: StageTiming,
    me: Weak<GameMachine>,
}

impl GameMachine {
    /// Build a machine for an ongoing game with questions left to play.
    pub fn new(
        game: SharedGame,
        questions: Vec<Question>,
        broadcaster: Arc<Broadcaster>,
        scheduler: Arc<dyn Scheduler>,
        timing: StageTiming,
    ) -> Result<Arc<Self>, ServiceError> {
        let game_id = {
            let guard = read_game(&game);
            if guard.status != GameStatus::Ongoing {
                return Err(ServiceError::InvalidState(format!(
                    "game `{}` is not ongoing",
                    guard.id
                )));
            }
            if !guard.has_remaining_questions() {
                return Err(ServiceError::InvalidState(format!(
                    "game `{}` has no questions left",
                    guard.id
                )));
            }
            let ids: Vec<_> = questions.iter().map(|question| question.id).collect();
            if ids != guard.question_ids {
                return Err(ServiceError::InvalidState(format!(
                    "questions do not match the order of game `{}`",
                    guard.id
                )));
            }
            guard.id
        };

        Ok(Arc::new_cyclic(|me| Self {
            game_id,
            game,
            questions,
            answers: Mutex::new(None),
            running: AtomicBool::new(false),
            cursor: Mutex::new(Cursor::default()),
            broadcaster,
            scheduler,
            timing,
            me: me.clone(),
        }))
    }

    /// Identifier of the driven game.
    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    /// Shared handle on the driven game.
    pub fn game(&self) -> &SharedGame {
        &self.game
    }

    /// Enter the preparation stage and start the timer.
    pub fn start(&self) -> Result<(), ServiceError> {
        let mut cursor = lock(&self.cursor);
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServiceError::InvalidState(format!(
                "game `{}` is already running",
                self.game_id
            )));
        }
        info!(game_id = %self.game_id, questions = self.questions.len(), "starting game");
        self.enter(&mut cursor, Stage::Preparing);
        Ok(())
    }

    /// Whether stage transitions are still scheduled.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Cancel the pending transition. Callbacks firing afterwards are no-ops.
    pub fn stop(&self) {
        let mut cursor = lock(&self.cursor);
        self.halt(&mut cursor);
    }

    /// Stop the timer and finish the game right away.
    pub fn finish_now(&self) {
        let mut cursor = lock(&self.cursor);
        if !self.is_running() {
            return;
        }
        self.halt(&mut cursor);
        self.enter(&mut cursor, Stage::Finished);
    }

    /// Answers of the open question, if a question has been opened.
    pub fn current_answers(&self) -> Option<Arc<AnswerCollection>> {
        lock(&self.answers).clone()
    }

    /// Record `answer` from `player` for the open question.
    pub fn submit_answer(
        &self,
        player: PlayerId,
        question_index: Option<usize>,
        answer: Answer,
    ) -> Result<AnswerAccepted, ServiceError> {
        let (index, question, collection) = {
            let game = read_game(&self.game);
            if game.stage != Some(Stage::Question) {
                return Err(ServiceError::InvalidState(format!(
                    "game `{}` is not accepting answers",
                    self.game_id
                )));
            }
            if !game.players.contains_key(&player) {
                return Err(ServiceError::NotFound(format!(
                    "player `{player}` is not in game `{}`",
                    self.game_id
                )));
            }
            if !game.is_active_player(&player) {
                return Err(ServiceError::InvalidState(format!(
                    "player `{player}` left game `{}`",
                    self.game_id
                )));
            }
            let index = game.current_question.ok_or_else(|| {
                ServiceError::InvalidState("no question is open".into())
            })?;
            if question_index.is_some_and(|requested| requested != index) {
                return Err(ServiceError::InvalidState(format!(
                    "question {index} is open, not {}",
                    question_index.unwrap_or_default()
                )));
            }
            let question = self
                .questions
                .get(index)
                .ok_or_else(|| ServiceError::InvalidState(format!("unknown question {index}")))?;
            // Taken under the game lock so it cannot belong to a later question.
            let collection = self
                .current_answers()
                .filter(|collection| collection.question_index() == index)
                .ok_or_else(|| ServiceError::InvalidState("no question is open".into()))?;
            (index, question, collection)
        };

        if !question.accepts(&answer) {
            return Err(ServiceError::InvalidInput(format!(
                "answer does not fit question {}",
                question.id
            )));
        }

        collection.submit(player, answer)?;
        debug!(game_id = %self.game_id, player_id = %player, index, "answer recorded");

        Ok(AnswerAccepted {
            question_index: index,
            question_id: question.id,
        })
    }

    /// Play `power_up` for `player` on the open question.
    ///
    /// Each power-up can be used once per game. `halve_time` moves the end of
    /// the window for everyone and is refused when less than two seconds remain.
    pub fn play_power_up(
        &self,
        player: PlayerId,
        power_up: PowerUp,
    ) -> Result<PowerUpPlayed, ServiceError> {
        let mut cursor = lock(&self.cursor);
        if !self.is_running() {
            return Err(ServiceError::InvalidState(format!(
                "game `{}` is not running",
                self.game_id
            )));
        }

        let (index, question, collection) = {
            let game = read_game(&self.game);
            if game.stage != Some(Stage::Question) {
                return Err(ServiceError::InvalidState(format!(
                    "power-ups are only playable while a question is open in game `{}`",
                    self.game_id
                )));
            }
            let Some(state) = game.players.get(&player) else {
                return Err(ServiceError::NotFound(format!(
                    "player `{player}` is not in game `{}`",
                    self.game_id
                )));
            };
            if state.abandoned {
                return Err(ServiceError::InvalidState(format!(
                    "player `{player}` left game `{}`",
                    self.game_id
                )));
            }
            if state.power_ups.contains_key(&power_up) {
                return Err(ServiceError::InvalidState(format!(
                    "player `{player}` already used {power_up:?}"
                )));
            }
            let index = game.current_question.ok_or_else(|| {
                ServiceError::InvalidState("no question is open".into())
            })?;
            let question = self
                .questions
                .get(index)
                .ok_or_else(|| ServiceError::InvalidState(format!("unknown question {index}")))?;
            let collection = self
                .current_answers()
                .filter(|collection| collection.question_index() == index)
                .ok_or_else(|| ServiceError::InvalidState("no question is open".into()))?;
            (index, question, collection)
        };

        let mut eliminated_choice = None;
        let mut new_deadline = None;
        match power_up {
            PowerUp::HalveTime => {
                let now = Instant::now();
                let remaining = cursor
                    .deadline
                    .map_or(Duration::ZERO, |deadline| deadline.saturating_duration_since(now));
                let halved = remaining / 2;
                if halved < MIN_HALVED_WINDOW {
                    return Err(ServiceError::InvalidState(format!(
                        "only {} ms left on question {index}",
                        remaining.as_millis()
                    )));
                }
                collection.set_deadline(now + halved);
                self.schedule(&mut cursor, now + halved);
                new_deadline = Some(SystemTime::now() + halved);
            }
            PowerUp::IncorrectAnswer => {
                eliminated_choice = Some(first_wrong_choice(question).ok_or_else(|| {
                    ServiceError::InvalidState(format!(
                        "question {} has no wrong option to reveal",
                        question.id
                    ))
                })?);
            }
            PowerUp::DoublePoints => {}
        }

        {
            let mut game = write_game(&self.game);
            if let Some(deadline) = new_deadline {
                game.stage_deadline = Some(deadline);
            }
            if let Some(state) = game.players.get_mut(&player) {
                state.power_ups.insert(power_up, index);
            }
        }
        drop(cursor);

        info!(game_id = %self.game_id, player_id = %player, ?power_up, index, "power-up played");
        let deadline = new_deadline.map(format_system_time);
        sse_events::broadcast_power_up(
            &self.broadcaster,
            &self.game_id,
            &PowerUpPlayedEvent {
                player_id: player,
                power_up,
                index,
                deadline: deadline.clone(),
            },
        );

        Ok(PowerUpPlayed {
            power_up,
            question_index: index,
            eliminated_choice,
            deadline,
        })
    }

    fn halt(&self, cursor: &mut Cursor) {
        self.running.store(false, Ordering::SeqCst);
        cursor.ticket += 1;
        cursor.deadline = None;
        if let Some(pending) = cursor.pending.take() {
            pending.cancel();
        }
    }

    /// Replace any pending transition with one firing at `deadline`.
    fn schedule(&self, cursor: &mut Cursor, deadline: Instant) {
        if let Some(previous) = cursor.pending.take() {
            previous.cancel();
        }
        cursor.ticket += 1;
        let ticket = cursor.ticket;
        let me = self.me.clone();
        let handle = self.scheduler.schedule_at(
            deadline,
            Box::new(move || {
                if let Some(machine) = me.upgrade() {
                    machine.advance(ticket);
                }
            }),
        );
        cursor.pending = Some(handle);
        cursor.deadline = Some(deadline);
    }

    fn advance(&self, ticket: u64) {
        let mut cursor = lock(&self.cursor);
        if !self.is_running() || cursor.ticket != ticket {
            debug!(game_id = %self.game_id, ticket, "ignoring stale stage callback");
            return;
        }
        cursor.pending = None;
        cursor.deadline = None;

        let (stage, index) = {
            let game = read_game(&self.game);
            (game.stage, game.current_question)
        };
        let Some(stage) = stage else {
            error!(game_id = %self.game_id, "running game has no stage");
            self.halt(&mut cursor);
            return;
        };

        match next_stage(
            stage,
            index,
            self.questions.len(),
            self.timing.leaderboard_interval,
        ) {
            Ok(next) => self.enter(&mut cursor, next),
            Err(err) => {
                error!(game_id = %self.game_id, error = %err, "stage transition rejected");
                self.halt(&mut cursor);
            }
        }
    }

    fn enter(&self, cursor: &mut Cursor, stage: Stage) {
        let delay = match stage {
            Stage::Preparing => self.enter_preparing(),
            Stage::Question => self.enter_question(),
            Stage::AnswerReveal => self.enter_answer_reveal(),
            Stage::Leaderboard => self.enter_leaderboard(),
            Stage::Finished => {
                self.enter_finished();
                self.running.store(false, Ordering::SeqCst);
                cursor.ticket += 1;
                cursor.deadline = None;
                return;
            }
        };

        let Some(delay) = delay else {
            self.halt(cursor);
            return;
        };

        self.schedule(cursor, Instant::now() + delay);
        debug!(game_id = %self.game_id, ?stage, delay_ms = delay.as_millis() as u64, "entered stage");
    }

    fn set_stage(&self, stage: Stage, delay: Option<Duration>) {
        let mut game = write_game(&self.game);
        game.stage = Some(stage);
        game.stage_deadline = delay.map(|delay| SystemTime::now() + delay);
    }

    fn enter_preparing(&self) -> Option<Duration> {
        let delay = self.timing.preparation;
        self.set_stage(Stage::Preparing, Some(delay));
        let game = read_game(&self.game);
        sse_events::broadcast_init(&self.broadcaster, &game);
        Some(delay)
    }

    fn enter_question(&self) -> Option<Duration> {
        let (index, answer_time, deadline) = {
            let mut game = write_game(&self.game);
            let index = game.current_question.map_or(0, |index| index + 1);
            let answer_time = game.settings.mode.answer_time_for(index);
            let deadline = SystemTime::now() + answer_time;
            game.current_question = Some(index);
            game.stage = Some(Stage::Question);
            game.stage_deadline = Some(deadline);
            (index, answer_time, deadline)
        };

        let Some(question) = self.questions.get(index) else {
            error!(game_id = %self.game_id, index, "question index out of range");
            return None;
        };
        *lock(&self.answers) = Some(Arc::new(AnswerCollection::new(index, answer_time)));

        sse_events::broadcast_question_start(
            &self.broadcaster,
            &self.game_id,
            &QuestionStartEvent {
                index,
                total: self.questions.len(),
                question: QuestionSnapshot::from(question),
                answer_time_ms: answer_time.as_millis() as u64,
                deadline: format_system_time(deadline),
            },
        );
        Some(answer_time)
    }

    fn enter_answer_reveal(&self) -> Option<Duration> {
        let delay = self.timing.answer_reveal;
        let collection = lock(&self.answers).take();
        let frozen = match &collection {
            Some(collection) => collection.close(),
            None => BTreeMap::new(),
        };

        let mut game = write_game(&self.game);
        let Some(index) = game.current_question else {
            error!(game_id = %self.game_id, "answer reveal without an open question");
            return None;
        };
        let Some(question) = self.questions.get(index) else {
            error!(game_id = %self.game_id, index, "question index out of range");
            return None;
        };
        game.stage = Some(Stage::AnswerReveal);
        game.stage_deadline = Some(SystemTime::now() + delay);

        let stop = QuestionStopEvent {
            index,
            question_id: question.id,
            answers: frozen.len(),
        };

        let config = game.settings.scoring;
        let mut results = Vec::new();
        for (player_id, player) in game.players.iter_mut() {
            if player.abandoned {
                continue;
            }
            let timed = frozen.get(player_id);
            let timing = Timing {
                elapsed_share: match (&collection, timed) {
                    (Some(collection), Some(timed)) => collection.elapsed_share(timed.received_at),
                    _ => 1.0,
                },
                double_points: player.power_ups.get(&PowerUp::DoublePoints) == Some(&index),
            };
            let answer = timed.map(|timed| &timed.answer);
            let outcome = scoring::score(&question.kind, answer, player.streak, timing, &config);
            player.score = player.score.saturating_add(outcome.points);
            player.streak = outcome.streak;
            results.push(PlayerResult {
                player_id: *player_id,
                correct: outcome.correct,
                points: outcome.points,
                score: player.score,
                streak: player.streak,
                double_points: timing.double_points,
                answer: answer.cloned(),
            });
        }
        drop(game);

        sse_events::broadcast_question_stop(&self.broadcaster, &self.game_id, &stop);
        sse_events::broadcast_show_answer(
            &self.broadcaster,
            &self.game_id,
            &ShowAnswerEvent {
                index,
                question_id: question.id,
                correct_answer: correct_answer(question),
                results,
            },
        );
        Some(delay)
    }

    fn enter_leaderboard(&self) -> Option<Duration> {
        let delay = self.timing.leaderboard;
        self.set_stage(Stage::Leaderboard, Some(delay));
        let payload = {
            let game = read_game(&self.game);
            LeaderboardEvent {
                played: game.current_question.map_or(0, |index| index + 1),
                entries: LeaderboardEntry::ranking(&game),
            }
        };
        sse_events::broadcast_leaderboard(&self.broadcaster, &self.game_id, &payload);
        Some(delay)
    }

    fn enter_finished(&self) {
        if let Some(collection) = lock(&self.answers).take() {
            collection.close();
        }
        let payload = {
            let mut game = write_game(&self.game);
            game.stage = Some(Stage::Finished);
            game.stage_deadline = None;
            game.status = GameStatus::Finished;
            game.finished_at = Some(SystemTime::now());
            GameFinishedEvent {
                leaderboard: LeaderboardEntry::ranking(&game),
            }
        };
        info!(game_id = %self.game_id, "game finished");
        sse_events::broadcast_game_finished(&self.broadcaster, &self.game_id, &payload);
        // Receivers still drain what was queued, then their streams end.
        self.broadcaster.unregister_game(&self.game_id);
    }
}

/// First option of a multiple-choice question that is not the right one.
fn first_wrong_choice(question: &Question) -> Option<usize> {
    match &question.kind {
        QuestionKind::MultipleChoice { choices, correct } => {
            (0..choices.len()).find(|choice| choice != correct)
        }
        QuestionKind::Estimate { .. } => None,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
