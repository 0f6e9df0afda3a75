use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;

use crate::auth::Session;
use crate::catalog::Catalog;
use crate::model::entity::{
    LeaderboardEntry, LessonProgress, PointsHistoryEntry, ProgressPatch, REQUIRED_COLUMNS,
    UnitCompletion,
};
use crate::model::error::{DatabaseError, DatabaseResult};
use crate::model::retry::RetryPolicy;
use crate::model::transport::ProgressTransport;
use crate::notify::{Notification, Notifier};
use crate::quiz::QuizResult;
use crate::scoring::{self, Component, ComponentSet, QuizMark};

const PROGRESS_TABLE: &str = "lesson_progress";

/// What a stored quiz result earned.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizSubmission {
    pub percentage: u32,
    pub points: u32,
    pub lesson_points: u32,
    pub progress: LessonProgress,
}

/// Lesson progress of the signed-in learner, written through the primary
/// transport with an optional secondary one to fall back on.
pub struct ProgressRepository {
    primary: Arc<dyn ProgressTransport>,
    fallback: Option<Arc<dyn ProgressTransport>>,
    session: RwLock<Option<Session>>,
    catalog: Arc<Catalog>,
    notifier: Arc<dyn Notifier>,
    submit_policy: RetryPolicy,
    unit_policy: RetryPolicy,
}

impl std::fmt::Debug for ProgressRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressRepository")
            .field("primary", &self.primary.name())
            .field("fallback", &self.fallback.as_ref().map(|t| t.name()))
            .field("submit_policy", &self.submit_policy)
            .field("unit_policy", &self.unit_policy)
            .finish()
    }
}

impl ProgressRepository {
    pub fn new(primary: Arc<dyn ProgressTransport>, catalog: Arc<Catalog>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            primary,
            fallback: None,
            session: RwLock::new(None),
            catalog,
            notifier,
            submit_policy: RetryPolicy::linear(3, Duration::from_secs(1)),
            unit_policy: RetryPolicy::exponential(3, Duration::from_secs(1), Duration::from_secs(8)),
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn ProgressTransport>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_retry(mut self, submit: RetryPolicy, unit: RetryPolicy) -> Self {
        self.submit_policy = submit;
        self.unit_policy = unit;
        self
    }

    pub fn set_session(&self, session: Option<Session>) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    pub fn session(&self) -> DatabaseResult<Session> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(DatabaseError::AuthRequired)
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    fn lesson_points(&self, lesson_id: &str) -> DatabaseResult<u32> {
        self.catalog
            .lesson(lesson_id)
            .map(|l| l.points())
            .ok_or_else(|| DatabaseError::LessonNotFound(lesson_id.to_string()))
    }

    fn notify_failure(&self, message: &str, error: &DatabaseError) {
        crate::error::log_error(error);
        self.notifier.notify(Notification::error(message));
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, lesson_id: &str) -> DatabaseResult<Option<LessonProgress>> {
        let session = self.session()?;
        self.primary.fetch(&session, lesson_id).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn list(&self) -> DatabaseResult<Vec<LessonProgress>> {
        let session = self.session()?;
        self.primary.fetch_all(&session).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn upsert(&self, lesson_id: &str, patch: &ProgressPatch) -> DatabaseResult<LessonProgress> {
        let session = self.session()?;
        self.primary.upsert(&session, lesson_id, patch).await
    }

    /// Marks the lesson completed with `score`. The stored score never goes
    /// down.
    #[tracing::instrument(skip(self))]
    pub async fn mark_complete(&self, lesson_id: &str, score: u32) -> DatabaseResult<LessonProgress> {
        let written = async {
            self.lesson_points(lesson_id)?;
            let session = self.session()?;
            self.primary
                .upsert(&session, lesson_id, &ProgressPatch::completion(score, Utc::now()))
                .await
        }
        .await;

        match written {
            Ok(progress) => {
                self.notifier.notify(Notification::success(format!(
                    "Lesson completed! {} points earned",
                    progress.score()
                )));
                Ok(progress)
            }
            Err(e) => {
                self.notify_failure("Failed to update lesson progress", &e);
                Err(e)
            }
        }
    }

    /// Asks the database whether every lesson in `prerequisites` is
    /// completed. An empty list is trivially met.
    #[tracing::instrument(skip(self))]
    pub async fn check_prerequisites(&self, lesson_id: &str, prerequisites: &[String]) -> DatabaseResult<bool> {
        if prerequisites.is_empty() {
            return Ok(true);
        }

        let session = self.session()?;
        self.primary
            .check_prerequisites(&session, lesson_id, prerequisites)
            .await
            .inspect_err(|e| tracing::error!("error checking prerequisites: {e}"))
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_component(
        &self,
        lesson_id: &str,
        component: Component,
        done: bool,
    ) -> DatabaseResult<LessonProgress> {
        let written = async {
            let session = self.session()?;
            let mut components = self
                .primary
                .fetch(&session, lesson_id)
                .await?
                .map(|p| p.components().clone())
                .unwrap_or_default();
            components.set(component, done);

            let patch = ProgressPatch {
                components_completed: Some(components),
                last_accessed: Some(Utc::now()),
                ..Default::default()
            };
            self.primary.upsert(&session, lesson_id, &patch).await
        }
        .await;

        written.inspect_err(|e| self.notify_failure("Failed to update progress", e))
    }

    /// Stores a finished quiz: the lesson is marked completed with the quiz's
    /// share of the lesson points and the quiz mark is merged into the
    /// completed components. Retried with linear backoff; each attempt falls
    /// back to the secondary transport when the primary fails.
    #[tracing::instrument(skip(self, result), fields(lesson_id = %result.lesson_id, attempt_id = %result.attempt_id))]
    pub async fn submit_quiz_result(&self, result: &QuizResult) -> DatabaseResult<QuizSubmission> {
        let prepared = self.prepare_submission(result);
        let (session, percentage, lesson_points) = match prepared {
            Ok(p) => p,
            Err(e) => {
                self.notify_failure("Failed to submit quiz results", &e);
                return Err(e);
            }
        };
        let points = scoring::quiz_points(percentage, lesson_points);
        let mark = QuizMark {
            score: percentage,
            completed_at: result.date,
        };

        let session = &session;
        let lesson_id = result.lesson_id.as_str();
        let written = self
            .submit_policy
            .run("submit_quiz_result", move |_| {
                self.write_quiz(session, lesson_id, points, mark)
            })
            .await;

        match written {
            Ok(progress) => {
                self.notifier.notify(Notification::success(format!(
                    "Quiz completed! {percentage}% ({points}/{lesson_points} points)"
                )));
                Ok(QuizSubmission {
                    percentage,
                    points,
                    lesson_points,
                    progress,
                })
            }
            Err(e) => {
                self.notify_failure("Failed to submit quiz results", &e);
                Err(e)
            }
        }
    }

    fn prepare_submission(&self, result: &QuizResult) -> DatabaseResult<(Session, u32, u32)> {
        if result.total_questions == 0 {
            return Err(DatabaseError::InvalidResult("quiz has no questions".to_string()));
        }
        if result.correct_answers > result.total_questions {
            return Err(DatabaseError::InvalidResult(format!(
                "{} correct answers out of {} questions",
                result.correct_answers, result.total_questions
            )));
        }

        let lesson_points = self.lesson_points(&result.lesson_id)?;
        let session = self.session()?;
        let percentage = scoring::quiz_percentage(result.correct_answers, result.total_questions);
        Ok((session, percentage, lesson_points))
    }

    /// One logical write: primary first, then the secondary after checking
    /// that its table has the columns the write needs. When both fail the
    /// primary's error is returned, so it alone decides whether the attempt
    /// is retried.
    async fn write_quiz(
        &self,
        session: &Session,
        lesson_id: &str,
        points: u32,
        mark: QuizMark,
    ) -> DatabaseResult<LessonProgress> {
        let error = match write_quiz_via(&*self.primary, session, lesson_id, points, mark).await {
            Ok(progress) => return Ok(progress),
            Err(e) => e,
        };

        let Some(fallback) = &self.fallback else {
            return Err(error);
        };
        tracing::warn!(
            "{} write failed ({error}), falling back to {}",
            self.primary.name(),
            fallback.name()
        );

        let secondary = async {
            verify_schema_via(&**fallback, session).await?;
            write_quiz_via(&**fallback, session, lesson_id, points, mark).await
        };
        secondary.await.map_err(|e| {
            tracing::warn!("{} write failed as well: {e}", fallback.name());
            error
        })
    }

    /// Fails with `SchemaMismatch` when `lesson_progress` lacks a column the
    /// quiz write needs.
    #[tracing::instrument(skip(self))]
    pub async fn verify_schema(&self) -> DatabaseResult<()> {
        let session = self.session()?;
        verify_schema_via(&*self.primary, &session).await
    }

    /// Awards the points of a completed lesson. Retried with exponential
    /// backoff; announces unlocked achievements and rank changes.
    #[tracing::instrument(skip(self))]
    pub async fn process_unit_completion(&self, unit_id: &str) -> DatabaseResult<UnitCompletion> {
        let processed = match self.session() {
            Ok(session) => {
                let session = &session;
                self.unit_policy
                    .run("process_unit_completion", move |_| self.unit_completion_once(session, unit_id))
                    .await
            }
            Err(e) => Err(e),
        };

        let unit = match processed {
            Ok(unit) => unit,
            Err(e) => {
                self.notify_failure("Failed to process unit completion. Please try again later.", &e);
                return Err(e);
            }
        };

        for achievement in &unit.achievements {
            self.notifier.notify(
                Notification::success(format!("Achievement Unlocked: {}", achievement.name)).with_icon("🏆"),
            );
        }
        if unit.leaderboard.improved() {
            self.notifier.notify(
                Notification::success(format!(
                    "Rank Up! You're now #{} on the leaderboard!",
                    unit.leaderboard.current_rank
                ))
                .with_icon("📈"),
            );
        }

        Ok(unit)
    }

    async fn unit_completion_once(&self, session: &Session, unit_id: &str) -> DatabaseResult<UnitCompletion> {
        let error = match self.primary.process_unit_completion(session, unit_id).await {
            Ok(unit) => return Ok(unit),
            Err(e) => e,
        };

        match &self.fallback {
            Some(fallback) => {
                tracing::warn!("{} rpc failed ({error}), trying {}", self.primary.name(), fallback.name());
                fallback.process_unit_completion(session, unit_id).await
            }
            None => Err(error),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn leaderboard(&self, category: &str, limit: i64) -> DatabaseResult<Vec<LeaderboardEntry>> {
        let session = self.session()?;
        self.primary.leaderboard(&session, category, limit).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn points_history(&self, limit: i64) -> DatabaseResult<Vec<PointsHistoryEntry>> {
        let session = self.session()?;
        self.primary.points_history(&session, limit).await
    }
}

async fn write_quiz_via(
    transport: &dyn ProgressTransport,
    session: &Session,
    lesson_id: &str,
    points: u32,
    mark: QuizMark,
) -> DatabaseResult<LessonProgress> {
    let mut quiz = ComponentSet::default();
    quiz.set_quiz(mark);
    let components = transport
        .fetch(session, lesson_id)
        .await?
        .map(|p| p.components().merge(&quiz))
        .unwrap_or(quiz);

    let patch = ProgressPatch::completion(points, mark.completed_at).with_components(components);
    transport.upsert(session, lesson_id, &patch).await
}

async fn verify_schema_via(transport: &dyn ProgressTransport, session: &Session) -> DatabaseResult<()> {
    let columns = transport.table_columns(session, PROGRESS_TABLE).await?;
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|c| !columns.iter().any(|have| have == *c))
        .map(|c| c.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        tracing::error!(transport = transport.name(), ?missing, "lesson_progress schema mismatch");
        Err(DatabaseError::SchemaMismatch { missing })
    }
}

#[cfg(test)]
mod test {
    use chrono::Duration as ChronoDuration;
    use uuid::Uuid;

    use super::*;
    use crate::model::transport::{MemoryTransport, Operation};
    use crate::notify::MemoryNotifier;

    fn repo(memory: &MemoryTransport, notifier: &MemoryNotifier) -> ProgressRepository {
        let repo = ProgressRepository::new(
            Arc::new(memory.clone()),
            Arc::new(Catalog::bundled().unwrap()),
            Arc::new(notifier.clone()),
        );
        repo.set_session(Some(Session::new(
            Uuid::new_v4(),
            "token",
            Utc::now() + ChronoDuration::hours(1),
        )));
        repo
    }

    #[tokio::test]
    async fn operations_need_a_session() {
        let memory = MemoryTransport::new();
        let notifier = MemoryNotifier::new();
        let repo = repo(&memory, &notifier);
        repo.set_session(None);

        assert!(matches!(repo.get("laser-fundamentals").await, Err(DatabaseError::AuthRequired)));
        assert!(matches!(
            repo.update_component("laser-fundamentals", Component::Reading, true).await,
            Err(DatabaseError::AuthRequired)
        ));
        assert_eq!(notifier.messages(), vec!["Failed to update progress"]);
    }

    #[tokio::test]
    async fn empty_prerequisites_skip_the_request() {
        let memory = MemoryTransport::new();
        let repo = repo(&memory, &MemoryNotifier::new());

        assert!(repo.check_prerequisites("laser-fundamentals", &[]).await.unwrap());
        assert_eq!(memory.calls(Operation::Prerequisites), 0);
    }

    #[tokio::test]
    async fn prerequisite_errors_propagate() {
        let memory = MemoryTransport::new();
        let repo = repo(&memory, &MemoryNotifier::new());
        memory.fail_next(Operation::Prerequisites, 1);

        let prereqs = vec!["laser-fundamentals".to_string()];
        assert!(repo.check_prerequisites("optical-resonators", &prereqs).await.is_err());
    }

    #[tokio::test]
    async fn components_accumulate() {
        let memory = MemoryTransport::new();
        let repo = repo(&memory, &MemoryNotifier::new());

        repo.update_component("laser-fundamentals", Component::Reading, true)
            .await
            .unwrap();
        let progress = repo
            .update_component("laser-fundamentals", Component::Simulation, true)
            .await
            .unwrap();

        assert_eq!(progress.components().completed_count(), 2);
        assert!(!progress.completed());
    }

    #[tokio::test]
    async fn mark_complete_keeps_the_best_score() {
        let memory = MemoryTransport::new();
        let notifier = MemoryNotifier::new();
        let repo = repo(&memory, &notifier);

        repo.mark_complete("laser-fundamentals", 90).await.unwrap();
        let progress = repo.mark_complete("laser-fundamentals", 40).await.unwrap();

        assert_eq!(progress.score(), 90);
        assert_eq!(
            notifier.messages(),
            vec![
                "Lesson completed! 90 points earned",
                "Lesson completed! 90 points earned"
            ]
        );
        assert!(matches!(
            repo.mark_complete("no-such-lesson", 10).await,
            Err(DatabaseError::LessonNotFound(_))
        ));
    }

    #[tokio::test]
    async fn invalid_results_are_rejected_without_retrying() {
        let memory = MemoryTransport::new();
        let notifier = MemoryNotifier::new();
        let repo = repo(&memory, &notifier);

        let result = QuizResult::new("laser-fundamentals", 5, 6);
        assert!(matches!(
            repo.submit_quiz_result(&result).await,
            Err(DatabaseError::InvalidResult(_))
        ));
        let result = QuizResult::new("no-such-lesson", 5, 4);
        assert!(matches!(
            repo.submit_quiz_result(&result).await,
            Err(DatabaseError::LessonNotFound(_))
        ));

        assert_eq!(memory.calls(Operation::Upsert), 0);
        assert_eq!(notifier.messages().len(), 2);
    }

    #[tokio::test]
    async fn schema_mismatch_is_reported() {
        let memory = MemoryTransport::new();
        let repo = repo(&memory, &MemoryNotifier::new());
        memory.set_columns(&["id", "user_id", "lesson_id", "completed", "score"]);

        match repo.verify_schema().await {
            Err(DatabaseError::SchemaMismatch { missing }) => {
                assert_eq!(missing, vec!["completed_at", "updated_at", "components_completed"]);
            }
            other => panic!("expected a schema mismatch, got {other:?}"),
        }
    }
}
