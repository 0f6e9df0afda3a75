use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

use crate::model::access::HasOwner;
use crate::scoring::ComponentSet;

/// Columns `submit_quiz_result` relies on.
pub const REQUIRED_COLUMNS: [&str; 7] = [
    "lesson_id",
    "user_id",
    "completed",
    "score",
    "completed_at",
    "updated_at",
    "components_completed",
];

/// One learner's progress through one lesson. At most one row exists per
/// `(user_id, lesson_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct LessonProgress {
    id: Uuid,
    user_id: Uuid,
    lesson_id: String,
    completed: bool,
    score: i32,
    #[sqlx(json)]
    #[serde(default)]
    components_completed: ComponentSet,
    last_accessed: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl LessonProgress {
    pub fn new(user_id: Uuid, lesson_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            lesson_id: lesson_id.into(),
            completed: false,
            score: 0,
            components_completed: ComponentSet::default(),
            last_accessed: now,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn lesson_id(&self) -> &str {
        &self.lesson_id
    }

    pub fn completed(&self) -> bool {
        self.completed
    }

    pub fn score(&self) -> u32 {
        self.score.max(0) as u32
    }

    pub fn components(&self) -> &ComponentSet {
        &self.components_completed
    }

    pub fn last_accessed(&self) -> DateTime<Utc> {
        self.last_accessed
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Applies `patch` the way the `lesson_progress_monotonic` trigger does:
    /// completion is sticky, the best score wins and the first completion
    /// time is kept.
    pub fn apply(&mut self, patch: &ProgressPatch, now: DateTime<Utc>) {
        if let Some(completed) = patch.completed {
            self.completed |= completed;
        }
        if let Some(score) = patch.score {
            self.score = self.score.max(score);
        }
        if let Some(components) = &patch.components_completed {
            self.components_completed = components.clone();
        }
        if self.completed_at.is_none() {
            self.completed_at = patch.completed_at;
        }
        if let Some(at) = patch.last_accessed {
            self.last_accessed = at;
        }
        self.updated_at = now;
    }
}

impl HasOwner for LessonProgress {
    fn owner_id(&self) -> Uuid {
        self.user_id
    }
}

/// Columns to write. `None` fields are left out of the statement, so an
/// upsert only touches what is given.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components_completed: Option<ComponentSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<DateTime<Utc>>,
}

impl ProgressPatch {
    pub fn completion(score: u32, at: DateTime<Utc>) -> Self {
        Self {
            completed: Some(true),
            score: Some(score.min(i32::MAX as u32) as i32),
            completed_at: Some(at),
            ..Default::default()
        }
    }

    pub fn with_components(mut self, components: ComponentSet) -> Self {
        self.components_completed = Some(components);
        self
    }
}

/// Request body of the REST upsert.
#[derive(Debug, Serialize)]
pub struct ProgressUpsert<'a> {
    pub user_id: Uuid,
    pub lesson_id: &'a str,
    #[serde(flatten)]
    pub patch: &'a ProgressPatch,
    pub updated_at: DateTime<Utc>,
}
