//! The `Evaluate` trait: how a question payload scores an answer.
//!
//! The engine never looks inside a question. It stores the payload, hands
//! it to clients, and asks it to evaluate submitted answers. Anything that
//! implements [`Evaluate`] can be drawn from a question bank and played.

use std::fmt::Debug;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Result of evaluating one answer against one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Whether the answer counts as correct.
    pub correct: bool,
    /// Points awarded. Added to the participant's running total.
    pub score: u32,
}

impl Evaluation {
    pub fn correct(score: u32) -> Self {
        Self {
            correct: true,
            score,
        }
    }

    pub fn incorrect() -> Self {
        Self {
            correct: false,
            score: 0,
        }
    }
}

/// A question payload that knows how to score answers to itself.
///
/// Payloads must be serializable because the room aggregate, including its
/// question sequence, is persisted as one document and pushed to clients.
///
/// # Example
///
/// ```rust
/// use promptduel_room::{Evaluate, Evaluation};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct Spelling {
///     word: String,
/// }
///
/// impl Evaluate for Spelling {
///     type Answer = String;
///
///     fn evaluate(&self, answer: &String) -> Evaluation {
///         if answer.eq_ignore_ascii_case(&self.word) {
///             Evaluation::correct(1)
///         } else {
///             Evaluation::incorrect()
///         }
///     }
/// }
/// ```
pub trait Evaluate:
    Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// What a participant submits for this kind of question.
    type Answer: Clone + Debug + PartialEq + Send + Sync + Serialize + DeserializeOwned + 'static;

    /// Scores `answer`. Must be deterministic: the same answer to the same
    /// question always yields the same evaluation.
    fn evaluate(&self, answer: &Self::Answer) -> Evaluation;
}

// ---------------------------------------------------------------------------
// MultipleChoice
// ---------------------------------------------------------------------------

/// The question shape served by the prompting course bank: pick one option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipleChoice {
    /// Stable id of the question in the bank.
    pub id: String,
    pub prompt: String,
    pub options: Vec<String>,
    /// Index into `options`.
    pub correct_option: usize,
    /// Points for a correct answer.
    pub points: u32,
}

impl MultipleChoice {
    pub fn new(
        id: impl Into<String>,
        prompt: impl Into<String>,
        options: Vec<String>,
        correct_option: usize,
    ) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            options,
            correct_option,
            points: 1,
        }
    }

    pub fn with_points(mut self, points: u32) -> Self {
        self.points = points;
        self
    }
}

impl Evaluate for MultipleChoice {
    /// The chosen option index.
    type Answer = usize;

    fn evaluate(&self, answer: &usize) -> Evaluation {
        if *answer == self.correct_option {
            Evaluation::correct(self.points)
        } else {
            Evaluation::incorrect()
        }
    }
}
