use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard},
    time::{Duration, Instant},
};

use crate::{
    error::ServiceError,
    state::game::{Answer, PlayerId},
};

/// Answer together with the instant it was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedAnswer {
    /// Submitted answer.
    pub answer: Answer,
    /// Reception time, measured against the window of the collection.
    pub received_at: Instant,
}

#[derive(Debug)]
struct Inner {
    closed: bool,
    deadline: Instant,
    entries: BTreeMap<PlayerId, TimedAnswer>,
}

/// Answers submitted for a single question while its window is open.
///
/// At most one answer is kept per player; a later submission replaces the
/// earlier one. [`AnswerCollection::close`] freezes the collection so racing
/// submissions either land before the close or are rejected.
#[derive(Debug)]
pub struct AnswerCollection {
    question_index: usize,
    opened_at: Instant,
    inner: Mutex<Inner>,
}

impl AnswerCollection {
    /// Open an empty collection for question `question_index`, answerable for `window`.
    pub fn new(question_index: usize, window: Duration) -> Self {
        Self::opened_at(question_index, Instant::now(), window)
    }

    /// Open an empty collection whose window started at `opened_at`.
    pub fn opened_at(question_index: usize, opened_at: Instant, window: Duration) -> Self {
        Self {
            question_index,
            opened_at,
            inner: Mutex::new(Inner {
                closed: false,
                deadline: opened_at + window,
                entries: BTreeMap::new(),
            }),
        }
    }

    /// Index of the question this collection belongs to.
    pub fn question_index(&self) -> usize {
        self.question_index
    }

    /// Current end of the answer window.
    pub fn deadline(&self) -> Instant {
        self.lock().deadline
    }

    /// Move the end of the answer window, e.g. when the time is halved.
    pub fn set_deadline(&self, deadline: Instant) {
        self.lock().deadline = deadline.max(self.opened_at);
    }

    /// Insert or replace the answer of `player`.
    pub fn submit(&self, player: PlayerId, answer: Answer) -> Result<(), ServiceError> {
        self.submit_at(player, answer, Instant::now())
    }

    /// Insert or replace the answer of `player`, received at `received_at`.
    pub fn submit_at(
        &self,
        player: PlayerId,
        answer: Answer,
        received_at: Instant,
    ) -> Result<(), ServiceError> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(ServiceError::InvalidState(
                "answer window is closed".into(),
            ));
        }
        inner.entries.insert(
            player,
            TimedAnswer {
                answer,
                received_at,
            },
        );
        Ok(())
    }

    /// Whether `player` already answered.
    pub fn has(&self, player: &PlayerId) -> bool {
        self.lock().entries.contains_key(player)
    }

    /// Latest answer of `player`, if any.
    pub fn get(&self, player: &PlayerId) -> Option<Answer> {
        self.lock()
            .entries
            .get(player)
            .map(|timed| timed.answer.clone())
    }

    /// Snapshot of every answer ordered by player id.
    pub fn all(&self) -> Vec<(PlayerId, Answer)> {
        self.lock()
            .entries
            .iter()
            .map(|(player, timed)| (*player, timed.answer.clone()))
            .collect()
    }

    /// Number of answers received so far.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether no answer was received.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the collection has been closed.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Share of the answer window elapsed at `at`, clamped to `[0, 1]`.
    pub fn elapsed_share(&self, at: Instant) -> f64 {
        let window = self.deadline().saturating_duration_since(self.opened_at);
        if window.is_zero() {
            return 1.0;
        }
        let elapsed = at.saturating_duration_since(self.opened_at);
        (elapsed.as_secs_f64() / window.as_secs_f64()).clamp(0.0, 1.0)
    }

    /// Reject further submissions and return the frozen answers.
    pub fn close(&self) -> BTreeMap<PlayerId, TimedAnswer> {
        let mut inner = self.lock();
        inner.closed = true;
        inner.entries.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the guard cannot leave the map half-written.
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::*;

    #[test]
    fn later_submission_replaces_earlier_one() {
        let answers = AnswerCollection::new(0, Duration::from_secs(10));
        let player = Uuid::new_v4();

        answers.submit(player, Answer::Choice { index: 1 }).unwrap();
        answers.submit(player, Answer::Choice { index: 3 }).unwrap();

        assert_eq!(answers.len(), 1);
        assert!(answers.has(&player));
        assert_eq!(answers.get(&player), Some(Answer::Choice { index: 3 }));
    }

    #[test]
    fn all_is_ordered_by_player() {
        let answers = AnswerCollection::new(0, Duration::from_secs(10));
        let mut players: Vec<PlayerId> = (0..5).map(|_| Uuid::new_v4()).collect();
        for (value, player) in players.iter().enumerate() {
            answers
                .submit(*player, Answer::Estimate { value: value as i64 })
                .unwrap();
        }

        players.sort();
        let ordered: Vec<PlayerId> = answers.all().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ordered, players);
    }

    #[test]
    fn closed_collection_rejects_submissions() {
        let answers = AnswerCollection::new(0, Duration::from_secs(10));
        let early = Uuid::new_v4();
        let late = Uuid::new_v4();
        answers.submit(early, Answer::Choice { index: 0 }).unwrap();

        let frozen = answers.close();
        let err = answers
            .submit(late, Answer::Choice { index: 2 })
            .unwrap_err();

        assert!(matches!(err, ServiceError::InvalidState(_)));
        assert!(answers.is_closed());
        assert_eq!(frozen.len(), 1);
        assert_eq!(frozen[&early].answer, Answer::Choice { index: 0 });
        assert!(!answers.has(&late));
    }

    #[test]
    fn concurrent_submissions_keep_one_entry_per_player() {
        let answers = Arc::new(AnswerCollection::new(0, Duration::from_secs(10)));
        let players: Vec<PlayerId> = (0..8).map(|_| Uuid::new_v4()).collect();

        let handles: Vec<_> = players
            .iter()
            .copied()
            .map(|player| {
                let answers = Arc::clone(&answers);
                std::thread::spawn(move || {
                    for index in 0..50 {
                        answers.submit(player, Answer::Choice { index }).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(answers.len(), players.len());
        for player in &players {
            assert_eq!(answers.get(player), Some(Answer::Choice { index: 49 }));
        }
    }

    #[test]
    fn elapsed_share_follows_the_window() {
        let opened = Instant::now();
        let answers = AnswerCollection::opened_at(2, opened, Duration::from_secs(10));
        let player = Uuid::new_v4();
        answers
            .submit_at(player, Answer::Choice { index: 0 }, opened + Duration::from_secs(4))
            .unwrap();

        let frozen = answers.close();
        let received = frozen[&player].received_at;

        assert_eq!(answers.question_index(), 2);
        assert!((answers.elapsed_share(received) - 0.4).abs() < 1e-9);
        assert_eq!(answers.elapsed_share(opened), 0.0);
        assert_eq!(answers.elapsed_share(opened + Duration::from_secs(30)), 1.0);
    }

    #[test]
    fn shortened_window_raises_elapsed_share() {
        let opened = Instant::now();
        let answers = AnswerCollection::opened_at(0, opened, Duration::from_secs(10));
        let at = opened + Duration::from_secs(2);

        answers.set_deadline(opened + Duration::from_secs(4));

        assert_eq!(answers.deadline(), opened + Duration::from_secs(4));
        assert!((answers.elapsed_share(at) - 0.5).abs() < 1e-9);
    }
}
