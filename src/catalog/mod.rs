//! Bundled lesson catalog.
//!
//! Lessons ship with the binary and never change at runtime; only the
//! learner's progress against them is persisted.

use std::collections::HashSet;

use thiserror::Error;

mod lesson;
pub use lesson::{Difficulty, Lesson, LessonSection, Question, Quiz};

static BUNDLED_CATALOG: &str = include_str!("../../catalog/lessons.toml");

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("duplicate lesson id `{0}`")]
    DuplicateLesson(String),
    #[error("lesson `{lesson}` requires unknown lesson `{prerequisite}`")]
    UnknownPrerequisite { lesson: String, prerequisite: String },
    #[error("question `{question}` of lesson `{lesson}` has no option {index}")]
    InvalidAnswer {
        lesson: String,
        question: String,
        index: usize,
    },
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Catalog {
    lessons: Vec<Lesson>,
}

impl Catalog {
    pub fn bundled() -> Result<Self, CatalogError> {
        Self::from_toml(BUNDLED_CATALOG)
    }

    pub fn from_toml(text: &str) -> Result<Self, CatalogError> {
        let catalog: Self = toml::from_str(text)?;
        catalog.check()?;
        Ok(catalog)
    }

    pub fn new(lessons: Vec<Lesson>) -> Result<Self, CatalogError> {
        let catalog = Self { lessons };
        catalog.check()?;
        Ok(catalog)
    }

    fn check(&self) -> Result<(), CatalogError> {
        let mut seen = HashSet::new();
        for lesson in &self.lessons {
            if !seen.insert(lesson.id()) {
                return Err(CatalogError::DuplicateLesson(lesson.id().to_string()));
            }
        }

        for lesson in &self.lessons {
            if let Some(missing) = lesson.prerequisites().iter().find(|p| !seen.contains(p.as_str())) {
                return Err(CatalogError::UnknownPrerequisite {
                    lesson: lesson.id().to_string(),
                    prerequisite: missing.clone(),
                });
            }

            let questions = lesson.quiz().map(|q| q.questions.as_slice()).unwrap_or_default();
            if let Some(q) = questions.iter().find(|q| q.correct_answer >= q.options.len()) {
                return Err(CatalogError::InvalidAnswer {
                    lesson: lesson.id().to_string(),
                    question: q.id.clone(),
                    index: q.correct_answer,
                });
            }
        }

        Ok(())
    }

    pub fn lessons(&self) -> &[Lesson] {
        &self.lessons
    }

    pub fn lesson(&self, id: &str) -> Option<&Lesson> {
        self.lessons.iter().find(|l| l.id() == id)
    }

    /// The lesson after `id` in catalog order.
    pub fn next_lesson(&self, id: &str) -> Option<&Lesson> {
        let idx = self.lessons.iter().position(|l| l.id() == id)?;
        self.lessons.get(idx + 1)
    }

    /// Local prerequisite check against the learner's completed lessons.
    /// The database check stays authoritative; this one drives the listing.
    pub fn is_unlocked(&self, id: &str, completed: &[String]) -> bool {
        self.lesson(id)
            .map(|l| l.missing_prerequisites(completed).is_empty())
            .unwrap_or(false)
    }
}
