//! Per-lesson view of the learner's progress, tying the repository, the
//! scoring rules and the store together.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::model::entity::{LessonProgress, ProgressPatch, UnitCompletion};
use crate::model::{DatabaseError, ProgressRepository, QuizSubmission};
use crate::quiz::QuizResult;
use crate::scoring::{self, Component};
use crate::store::{Achievement, Action, StoreError, StoreHandle};

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type ProgressResult<T> = std::result::Result<T, ProgressError>;

#[derive(Debug, Clone, PartialEq)]
pub struct QuizCompletion {
    pub submission: QuizSubmission,
    /// Weighted lesson score written by `mark_complete`.
    pub lesson_score: u32,
    pub progress: LessonProgress,
    /// `None` when awarding the unit points failed; the lesson itself is
    /// already stored at that point.
    pub unit: Option<UnitCompletion>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QuizOutcome {
    Recorded(Box<QuizCompletion>),
    /// This attempt was stored before; nothing was written or credited.
    AlreadyRecorded(Uuid),
}

#[derive(Debug)]
pub struct LessonProgressHook {
    lesson_id: String,
    repo: Arc<ProgressRepository>,
    store: StoreHandle,
    progress: Option<LessonProgress>,
    is_loading: bool,
    error: Option<String>,
}

impl LessonProgressHook {
    pub fn new(lesson_id: impl Into<String>, repo: Arc<ProgressRepository>, store: StoreHandle) -> Self {
        Self {
            lesson_id: lesson_id.into(),
            repo,
            store,
            progress: None,
            is_loading: true,
            error: None,
        }
    }

    pub fn lesson_id(&self) -> &str {
        &self.lesson_id
    }

    pub fn progress(&self) -> Option<&LessonProgress> {
        self.progress.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn record<T, E>(&mut self, result: Result<T, E>) -> ProgressResult<T>
    where
        E: Into<ProgressError>,
    {
        result.map_err(|e| {
            let e = e.into();
            self.error = Some(e.to_string());
            e
        })
    }

    /// Fetches the stored progress. Without a signed-in learner nothing is
    /// fetched and the hook stays empty.
    #[tracing::instrument(skip(self), fields(lesson_id = %self.lesson_id))]
    pub async fn load(&mut self) -> ProgressResult<Option<&LessonProgress>> {
        if !self.store.read(|s| s.is_logged_in() && s.user().is_some()) {
            tracing::debug!("no signed-in learner, skipping progress fetch");
            self.is_loading = false;
            return Ok(None);
        }

        let fetched = self.repo.get(&self.lesson_id).await;
        self.is_loading = false;
        self.progress = self.record(fetched)?;
        Ok(self.progress.as_ref())
    }

    #[tracing::instrument(skip(self), fields(lesson_id = %self.lesson_id))]
    pub async fn update_progress(&mut self, patch: ProgressPatch) -> ProgressResult<&LessonProgress> {
        let written = self.repo.upsert(&self.lesson_id, &patch).await;
        let progress = self.record(written)?;
        Ok(self.progress.insert(progress))
    }

    /// Stores a finished quiz, then marks the lesson completed with the
    /// weighted score, updates the store and awards the unit points. A
    /// failure to award points is reported but does not undo the rest.
    #[tracing::instrument(skip(self, result), fields(lesson_id = %self.lesson_id, attempt_id = %result.attempt_id))]
    pub async fn complete_quiz(&mut self, result: QuizResult) -> ProgressResult<QuizOutcome> {
        if self.store.read(|s| s.has_quiz_result(result.attempt_id)) {
            tracing::warn!("quiz attempt already recorded");
            return Ok(QuizOutcome::AlreadyRecorded(result.attempt_id));
        }

        let submitted = self.repo.submit_quiz_result(&result).await;
        let submission = self.record(submitted)?;

        let lesson_score = scoring::lesson_score(
            submission.percentage as f64,
            submission.progress.components(),
        );
        let completed = self.repo.mark_complete(&self.lesson_id, lesson_score).await;
        let progress = self.record(completed)?;
        self.progress = Some(progress.clone());

        let dispatched = self
            .store
            .dispatch(Action::AddQuizResult {
                result,
                points: submission.points,
            })
            .and_then(|_| self.store.dispatch(Action::CompleteLesson(self.lesson_id.clone())));
        self.record(dispatched)?;

        let unit = match self.repo.process_unit_completion(&self.lesson_id).await {
            Ok(unit) => {
                self.unlock_achievements(&unit);
                Some(unit)
            }
            Err(e) => {
                self.error = Some(e.to_string());
                None
            }
        };

        Ok(QuizOutcome::Recorded(Box::new(QuizCompletion {
            submission,
            lesson_score,
            progress,
            unit,
        })))
    }

    fn unlock_achievements(&self, unit: &UnitCompletion) {
        let now = chrono::Utc::now();
        for awarded in &unit.achievements {
            let achievement = Achievement {
                id: awarded.name.to_lowercase().replace(' ', "-"),
                title: awarded.name.clone(),
                description: awarded.description.clone(),
                icon: "🏆".to_string(),
                unlocked: true,
                unlocked_at: Some(now),
            };
            if let Err(e) = self.store.dispatch(Action::UnlockAchievement(achievement)) {
                crate::error::log_error(&e);
            }
        }
    }

    /// Checks the lesson's catalog prerequisites against the database.
    #[tracing::instrument(skip(self), fields(lesson_id = %self.lesson_id))]
    pub async fn validate_prerequisites(&mut self) -> ProgressResult<bool> {
        let prerequisites = self
            .repo
            .catalog()
            .lesson(&self.lesson_id)
            .map(|l| l.prerequisites().to_vec())
            .ok_or_else(|| DatabaseError::LessonNotFound(self.lesson_id.clone()));
        let prerequisites = self.record(prerequisites)?;

        let met = self
            .repo
            .check_prerequisites(&self.lesson_id, &prerequisites)
            .await;
        self.record(met)
    }

    #[tracing::instrument(skip(self), fields(lesson_id = %self.lesson_id))]
    pub async fn mark_component_complete(&mut self, component: Component) -> ProgressResult<&LessonProgress> {
        let written = self
            .repo
            .update_component(&self.lesson_id, component, true)
            .await;
        let progress = self.record(written)?;
        Ok(self.progress.insert(progress))
    }
}
