use std::{
    collections::HashSet,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use futures::future::{self, BoxFuture};
use tracing::{info, warn};

use crate::{
    dao::storage::{StorageError, StorageResult},
    state::{
        game::{Question, QuestionKind},
        rng::QuestionRng,
    },
};

/// Source of the questions games draw from.
pub trait QuestionBank: Send + Sync {
    /// Every question available for drawing.
    fn question_pool(&self) -> BoxFuture<'static, StorageResult<Vec<Question>>>;
    /// Number of questions in the pool.
    fn len(&self) -> usize;
    /// Whether the pool is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Question bank held entirely in memory.
#[derive(Debug, Clone)]
pub struct InMemoryQuestionBank {
    questions: Arc<Vec<Question>>,
}

impl InMemoryQuestionBank {
    /// Build a bank from `questions`, dropping malformed or duplicated entries.
    pub fn new(questions: Vec<Question>) -> Self {
        let mut seen = HashSet::new();
        let questions = questions
            .into_iter()
            .filter(|question| {
                if !is_well_formed(question) {
                    warn!(question_id = question.id, "skipping malformed question");
                    return false;
                }
                if !seen.insert(question.id) {
                    warn!(question_id = question.id, "skipping duplicated question id");
                    return false;
                }
                true
            })
            .collect();
        Self {
            questions: Arc::new(questions),
        }
    }

    /// Read a JSON array of questions from `path`.
    pub fn from_path(path: &Path) -> StorageResult<Self> {
        let contents = fs::read_to_string(path).map_err(|err| {
            StorageError::unavailable(format!("reading {}", path.display()), err)
        })?;
        let questions: Vec<Question> = serde_json::from_str(&contents).map_err(|err| {
            StorageError::malformed(format!("parsing {}", path.display()), err)
        })?;
        Ok(Self::new(questions))
    }

    /// Load `path` when configured, falling back to the built-in sample pool.
    pub fn load_or_builtin(path: Option<&PathBuf>) -> Self {
        let Some(path) = path else {
            info!("no question bank configured; using built-in questions");
            return Self::builtin();
        };

        match Self::from_path(path) {
            Ok(bank) if !bank.questions.is_empty() => {
                info!(path = %path.display(), count = bank.len(), "loaded question bank");
                bank
            }
            Ok(_) => {
                warn!(path = %path.display(), "question bank is empty; using built-in questions");
                Self::builtin()
            }
            Err(StorageError::Unavailable { source, .. })
                if source
                    .downcast_ref::<std::io::Error>()
                    .is_some_and(|err| err.kind() == ErrorKind::NotFound) =>
            {
                info!(path = %path.display(), "question bank not found; using built-in questions");
                Self::builtin()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to load question bank; using built-in questions"
                );
                Self::builtin()
            }
        }
    }

    /// Small sample pool shipped with the binary.
    pub fn builtin() -> Self {
        let choice = |id: u32, text: &str, choices: &[&str], correct: usize| Question {
            id,
            text: text.to_string(),
            kind: QuestionKind::MultipleChoice {
                choices: choices.iter().map(|choice| choice.to_string()).collect(),
                correct,
            },
        };
        let estimate = |id: u32, text: &str, correct: i64| Question {
            id,
            text: text.to_string(),
            kind: QuestionKind::Estimate { correct },
        };

        Self::new(vec![
            choice(1, "Which planet is closest to the sun?", &["Venus", "Mercury", "Mars"], 1),
            choice(2, "What is the chemical symbol of gold?", &["Ag", "Gd", "Au", "Go"], 2),
            choice(3, "How many sides does a hexagon have?", &["5", "6", "7", "8"], 1),
            choice(4, "Which ocean is the largest?", &["Atlantic", "Indian", "Pacific"], 2),
            choice(5, "Who wrote 'Hamlet'?", &["Shakespeare", "Marlowe", "Chaucer"], 0),
            choice(6, "What is the boiling point of water at sea level in Celsius?", &["90", "100", "110"], 1),
            choice(7, "Which gas do plants absorb for photosynthesis?", &["Oxygen", "Nitrogen", "Carbon dioxide"], 2),
            estimate(8, "How tall is the Eiffel Tower in metres?", 330),
            estimate(9, "In which year did the first person walk on the moon?", 1969),
            estimate(10, "How many bones are in the adult human body?", 206),
            estimate(11, "How many kilometres long is the Great Wall of China (main line)?", 6_259),
            estimate(12, "How many keys does a standard piano have?", 88),
        ])
    }
}

impl QuestionBank for InMemoryQuestionBank {
    fn question_pool(&self) -> BoxFuture<'static, StorageResult<Vec<Question>>> {
        let questions = self.questions.as_ref().clone();
        Box::pin(future::ready(Ok(questions)))
    }

    fn len(&self) -> usize {
        self.questions.len()
    }
}

/// Pick `count` questions from `pool` in the order produced by `seed`.
///
/// The pool is sorted by id first so the result only depends on the seed and
/// the set of questions, not on the order the source returned them in.
pub fn draw_questions(seed: u64, mut pool: Vec<Question>, count: usize) -> Vec<Question> {
    pool.sort_by_key(|question| question.id);
    QuestionRng::from_seed(seed).shuffle(&mut pool);
    pool.truncate(count);
    pool
}

fn is_well_formed(question: &Question) -> bool {
    if question.text.trim().is_empty() {
        return false;
    }
    match &question.kind {
        QuestionKind::MultipleChoice { choices, correct } => {
            choices.len() >= 2 && *correct < choices.len()
        }
        QuestionKind::Estimate { .. } => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(questions: &[Question]) -> Vec<u32> {
        questions.iter().map(|question| question.id).collect()
    }

    #[test]
    fn same_seed_draws_same_order() {
        let pool = InMemoryQuestionBank::builtin().questions.as_ref().clone();
        let mut reversed = pool.clone();
        reversed.reverse();

        let first = draw_questions(99, pool.clone(), 5);
        let second = draw_questions(99, reversed, 5);
        let other = draw_questions(100, pool, 5);

        assert_eq!(first.len(), 5);
        assert_eq!(ids(&first), ids(&second));
        assert_ne!(ids(&first), ids(&other));
    }

    #[test]
    fn draw_follows_seeded_shuffle() {
        let pool: Vec<Question> = (0..10)
            .map(|id| Question {
                id,
                text: format!("q{id}"),
                kind: QuestionKind::Estimate { correct: 1 },
            })
            .collect();
        let drawn = draw_questions(1234, pool, 4);
        assert_eq!(ids(&drawn), vec![0, 5, 3, 4]);
    }

    #[test]
    fn malformed_and_duplicate_questions_are_dropped() {
        let bank = InMemoryQuestionBank::new(vec![
            Question {
                id: 1,
                text: "ok".into(),
                kind: QuestionKind::Estimate { correct: 3 },
            },
            Question {
                id: 1,
                text: "duplicate".into(),
                kind: QuestionKind::Estimate { correct: 3 },
            },
            Question {
                id: 2,
                text: "bad index".into(),
                kind: QuestionKind::MultipleChoice {
                    choices: vec!["a".into(), "b".into()],
                    correct: 2,
                },
            },
        ]);
        assert_eq!(bank.len(), 1);
    }

    #[test]
    fn questions_parse_from_json() {
        let json = r#"[
            { "id": 7, "text": "Pick", "type": "multiple_choice", "choices": ["a", "b"], "correct": 1 },
            { "id": 8, "text": "Guess", "type": "estimate", "correct": 42 }
        ]"#;
        let questions: Vec<Question> = serde_json::from_str(json).unwrap();
        assert_eq!(questions[1].kind, QuestionKind::Estimate { correct: 42 });
        assert_eq!(InMemoryQuestionBank::new(questions).len(), 2);
    }

    #[test]
    fn missing_file_falls_back_to_builtin() {
        let path = PathBuf::from("config/does-not-exist.json");
        let bank = InMemoryQuestionBank::load_or_builtin(Some(&path));
        assert_eq!(bank.len(), InMemoryQuestionBank::builtin().len());
    }

    #[tokio::test]
    async fn pool_is_served_asynchronously() {
        let bank = InMemoryQuestionBank::builtin();
        let pool = bank.question_pool().await.unwrap();
        assert_eq!(pool.len(), bank.len());
        assert!(!bank.is_empty());
    }
}
