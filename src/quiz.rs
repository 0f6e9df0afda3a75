//! Per-question quiz flow.
//!
//! `Answering(i)` → `Submitted(i)` → `Answering(i + 1)` … → `Completed`.
//! The session only tracks answers; persisting the outcome is left to whoever
//! receives the completion callback.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::catalog::Question;
use crate::scoring;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuizError {
    #[error("a quiz needs at least one question")]
    NoQuestions,
    #[error("option {option} does not exist, question has {available} options")]
    NoSuchOption { option: usize, available: usize },
    #[error("select an option before submitting")]
    NothingSelected,
    #[error("the answer to question {0} is already submitted")]
    AlreadySubmitted(usize),
    #[error("question {0} has not been answered yet")]
    NotSubmitted(usize),
    #[error("the quiz is already completed")]
    Completed,
}

/// Outcome of one quiz attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizResult {
    pub attempt_id: Uuid,
    pub lesson_id: String,
    pub total_questions: u32,
    pub correct_answers: u32,
    /// `correct_answers / total_questions`.
    pub score: f64,
    pub answers: Vec<usize>,
    pub completed: bool,
    pub date: DateTime<Utc>,
}

impl QuizResult {
    pub fn new(lesson_id: impl Into<String>, total_questions: u32, correct_answers: u32) -> Self {
        let score = if total_questions == 0 {
            0.0
        } else {
            correct_answers as f64 / total_questions as f64
        };

        Self {
            attempt_id: Uuid::new_v4(),
            lesson_id: lesson_id.into(),
            total_questions,
            correct_answers,
            score,
            answers: Vec::new(),
            completed: true,
            date: Utc::now(),
        }
    }

    pub fn percentage(&self) -> u32 {
        scoring::quiz_percentage(self.correct_answers, self.total_questions)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizState {
    Answering { index: usize, selected: Option<usize> },
    Submitted { index: usize },
    Completed,
}

/// What the learner sees after submitting an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerFeedback {
    pub correct: bool,
    pub correct_answer: usize,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QuizStep {
    /// Moved on to the question at this index.
    Question(usize),
    Completed(QuizResult),
    /// A completion request after the quiz already finished; nothing happened.
    AlreadyCompleted,
}

pub type CompletionCallback = Box<dyn FnMut(&QuizResult) + Send>;

pub struct QuizSession {
    lesson_id: String,
    questions: Vec<Question>,
    answers: Vec<Option<usize>>,
    state: QuizState,
    result: Option<QuizResult>,
    on_complete: CompletionCallback,
}

impl std::fmt::Debug for QuizSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuizSession")
            .field("lesson_id", &self.lesson_id)
            .field("questions", &self.questions.len())
            .field("state", &self.state)
            .finish()
    }
}

impl QuizSession {
    pub fn new<F>(
        lesson_id: impl Into<String>,
        questions: Vec<Question>,
        on_complete: F,
    ) -> Result<Self, QuizError>
    where
        F: FnMut(&QuizResult) + Send + 'static,
    {
        if questions.is_empty() {
            return Err(QuizError::NoQuestions);
        }

        Ok(Self {
            lesson_id: lesson_id.into(),
            answers: vec![None; questions.len()],
            questions,
            state: QuizState::Answering {
                index: 0,
                selected: None,
            },
            result: None,
            on_complete: Box::new(on_complete),
        })
    }

    pub fn lesson_id(&self) -> &str {
        &self.lesson_id
    }

    pub fn state(&self) -> QuizState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn is_completed(&self) -> bool {
        self.state == QuizState::Completed
    }

    pub fn result(&self) -> Option<&QuizResult> {
        self.result.as_ref()
    }

    /// The question being answered or reviewed; `None` once completed.
    pub fn current(&self) -> Option<(usize, &Question)> {
        let index = match self.state {
            QuizState::Answering { index, .. } | QuizState::Submitted { index } => index,
            QuizState::Completed => return None,
        };
        self.questions.get(index).map(|q| (index, q))
    }

    pub fn is_last(&self) -> bool {
        matches!(self.current(), Some((i, _)) if i + 1 == self.questions.len())
    }

    /// Picks an option. Changing the pick is allowed until it is submitted.
    pub fn select(&mut self, option: usize) -> Result<(), QuizError> {
        match self.state {
            QuizState::Answering { index, .. } => {
                let available = self.questions[index].options.len();
                if option >= available {
                    return Err(QuizError::NoSuchOption { option, available });
                }
                self.state = QuizState::Answering {
                    index,
                    selected: Some(option),
                };
                Ok(())
            }
            QuizState::Submitted { index } => Err(QuizError::AlreadySubmitted(index)),
            QuizState::Completed => Err(QuizError::Completed),
        }
    }

    /// Locks in the selected option for the current question.
    pub fn submit_answer(&mut self) -> Result<AnswerFeedback, QuizError> {
        match self.state {
            QuizState::Answering {
                selected: None, ..
            } => Err(QuizError::NothingSelected),
            QuizState::Answering {
                index,
                selected: Some(option),
            } => {
                self.answers[index] = Some(option);
                self.state = QuizState::Submitted { index };

                let question = &self.questions[index];
                Ok(AnswerFeedback {
                    correct: question.is_correct(option),
                    correct_answer: question.correct_answer,
                    explanation: question.explanation.clone(),
                })
            }
            QuizState::Submitted { index } => Err(QuizError::AlreadySubmitted(index)),
            QuizState::Completed => Err(QuizError::Completed),
        }
    }

    /// Advances past a submitted question. On the last question this
    /// completes the quiz and fires the completion callback; asking again
    /// afterwards is ignored.
    pub fn next(&mut self) -> Result<QuizStep, QuizError> {
        match self.state {
            QuizState::Answering { index, .. } => Err(QuizError::NotSubmitted(index)),
            QuizState::Submitted { index } if index + 1 < self.questions.len() => {
                self.state = QuizState::Answering {
                    index: index + 1,
                    selected: None,
                };
                Ok(QuizStep::Question(index + 1))
            }
            QuizState::Submitted { .. } => Ok(self.complete()),
            QuizState::Completed => Ok(self.complete()),
        }
    }

    fn complete(&mut self) -> QuizStep {
        if self.result.is_some() {
            tracing::warn!(lesson_id = %self.lesson_id, "quiz already completed");
            return QuizStep::AlreadyCompleted;
        }

        let correct = self
            .answers
            .iter()
            .zip(&self.questions)
            .filter(|(answer, question)| answer.is_some_and(|a| question.is_correct(a)))
            .count();

        let mut result = QuizResult::new(
            self.lesson_id.clone(),
            self.questions.len() as u32,
            correct as u32,
        );
        result.answers = self.answers.iter().map(|a| a.unwrap_or(usize::MAX)).collect();

        tracing::debug!(
            lesson_id = %result.lesson_id,
            correct = result.correct_answers,
            total = result.total_questions,
            "quiz completed"
        );

        self.state = QuizState::Completed;
        (self.on_complete)(&result);
        self.result = Some(result.clone());
        QuizStep::Completed(result)
    }
}
