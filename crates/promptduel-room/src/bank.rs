//! Question bank collaborator and the one-shot question draw.

use std::collections::HashMap;
use std::future::Future;

use promptduel_protocol::{Difficulty, Question};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::{DuelError, Evaluate};

/// Failure reported by a question bank.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BankError {
    /// The bank could not be queried.
    #[error("question bank unavailable: {0}")]
    Unavailable(String),
}

/// Source of candidate questions for a topic and difficulty.
///
/// The engine calls [`fetch_pool`](QuestionBank::fetch_pool) exactly once
/// per room, at creation, and draws the room's fixed sequence from the
/// returned pool. An empty pool is a valid answer; the draw then fails with
/// [`DuelError::InsufficientQuestions`].
pub trait QuestionBank: Send + Sync + 'static {
    /// Question payload served by this bank.
    type Question: Evaluate;

    /// Returns every eligible question for `topic` at `difficulty`.
    fn fetch_pool(
        &self,
        topic: &str,
        difficulty: Difficulty,
    ) -> impl Future<Output = Result<Vec<Self::Question>, BankError>> + Send;
}

/// A fixed, in-process question bank keyed by topic and difficulty.
#[derive(Debug, Clone)]
pub struct InMemoryQuestionBank<Q> {
    pools: HashMap<(String, Difficulty), Vec<Q>>,
}

impl<Q> InMemoryQuestionBank<Q> {
    pub fn new() -> Self {
        Self {
            pools: HashMap::new(),
        }
    }

    /// Adds `questions` to the pool for `topic` at `difficulty`.
    pub fn with_pool(
        mut self,
        topic: impl Into<String>,
        difficulty: Difficulty,
        questions: impl IntoIterator<Item = Q>,
    ) -> Self {
        self.pools
            .entry((topic.into(), difficulty))
            .or_default()
            .extend(questions);
        self
    }

    /// Number of questions available for `topic` at `difficulty`.
    pub fn pool_size(&self, topic: &str, difficulty: Difficulty) -> usize {
        self.pools
            .get(&(topic.to_owned(), difficulty))
            .map_or(0, Vec::len)
    }
}

impl<Q> Default for InMemoryQuestionBank<Q> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Q: Evaluate> QuestionBank for InMemoryQuestionBank<Q> {
    type Question = Q;

    async fn fetch_pool(
        &self,
        topic: &str,
        difficulty: Difficulty,
    ) -> Result<Vec<Q>, BankError> {
        Ok(self
            .pools
            .get(&(topic.to_owned(), difficulty))
            .cloned()
            .unwrap_or_default())
    }
}

/// Draws `count` questions from `pool` at random, without replacement.
///
/// The result is the room's fixed sequence: indices are assigned `0..count`
/// in draw order. Called once per room and never again.
///
/// # Errors
/// Returns [`DuelError::InsufficientQuestions`] if the pool is smaller than
/// `count`.
pub fn draw_questions<Q, R>(
    mut pool: Vec<Q>,
    count: usize,
    rng: &mut R,
) -> Result<Vec<Question<Q>>, DuelError>
where
    R: Rng + ?Sized,
{
    if pool.len() < count {
        return Err(DuelError::InsufficientQuestions {
            requested: count,
            available: pool.len(),
        });
    }

    pool.shuffle(rng);
    pool.truncate(count);

    Ok(pool
        .into_iter()
        .enumerate()
        .map(|(index, item)| Question { index, item })
        .collect())
}
