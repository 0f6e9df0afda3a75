use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};

use crate::auth::Session;
use crate::model::DbConnection;
use crate::model::entity::{
    LeaderboardEntry, LessonProgress, PointsHistoryEntry, ProgressPatch, UnitCompletion,
};
use crate::model::error::DatabaseResult;

use super::ProgressTransport;

/// Direct connection to the hosted Postgres. Statements run inside a
/// transaction that carries the session's JWT claims and the
/// `authenticated` role, so `auth.uid()` and the RLS policies apply exactly
/// as they do for the REST API.
#[derive(Debug, Clone)]
pub struct PgTransport {
    database: DbConnection,
}

impl PgTransport {
    pub fn new(conn: DbConnection) -> Self {
        Self { database: conn }
    }

    pub fn executor(&self) -> &PgPool {
        self.database.pool()
    }

    async fn scoped(&self, session: &Session) -> DatabaseResult<Transaction<'static, Postgres>> {
        let mut tx = self.executor().begin().await?;

        sqlx::query("SELECT set_config('request.jwt.claims', $1, true)")
            .bind(session.claims_json().to_string())
            .execute(&mut *tx)
            .await?;
        sqlx::query("SET LOCAL ROLE authenticated")
            .execute(&mut *tx)
            .await?;

        Ok(tx)
    }
}

#[async_trait]
impl ProgressTransport for PgTransport {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn fetch(&self, session: &Session, lesson_id: &str) -> DatabaseResult<Option<LessonProgress>> {
        let mut tx = self.scoped(session).await?;
        let result = sqlx::query_as("SELECT * FROM lesson_progress WHERE user_id = $1 AND lesson_id = $2")
            .bind(session.user_id())
            .bind(lesson_id)
            .fetch_optional(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(result)
    }

    async fn fetch_all(&self, session: &Session) -> DatabaseResult<Vec<LessonProgress>> {
        let mut tx = self.scoped(session).await?;
        let result = sqlx::query_as(
            "SELECT * FROM lesson_progress WHERE user_id = $1 ORDER BY completed_at DESC NULLS LAST",
        )
        .bind(session.user_id())
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(result)
    }

    async fn upsert(
        &self,
        session: &Session,
        lesson_id: &str,
        patch: &ProgressPatch,
    ) -> DatabaseResult<LessonProgress> {
        let mut tx = self.scoped(session).await?;
        let row = sqlx::query_as(
            r#"INSERT INTO lesson_progress
                (user_id, lesson_id, completed, score, components_completed, completed_at, last_accessed, updated_at)
            VALUES ($1, $2, COALESCE($3, false), COALESCE($4, 0), COALESCE($5, '{}'::jsonb), $6, COALESCE($7, now()), now())
            ON CONFLICT (user_id, lesson_id) DO UPDATE SET
                completed = COALESCE($3, lesson_progress.completed),
                score = COALESCE($4, lesson_progress.score),
                components_completed = COALESCE($5, lesson_progress.components_completed),
                completed_at = COALESCE($6, lesson_progress.completed_at),
                last_accessed = COALESCE($7, lesson_progress.last_accessed),
                updated_at = now()
            RETURNING *"#,
        )
        .bind(session.user_id())
        .bind(lesson_id)
        .bind(patch.completed)
        .bind(patch.score)
        .bind(patch.components_completed.as_ref().map(Json))
        .bind(patch.completed_at)
        .bind(patch.last_accessed)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(row)
    }

    async fn check_prerequisites(
        &self,
        session: &Session,
        lesson_id: &str,
        prerequisites: &[String],
    ) -> DatabaseResult<bool> {
        let mut tx = self.scoped(session).await?;
        let met: bool = sqlx::query_scalar("SELECT check_lesson_prerequisites($1, $2)")
            .bind(lesson_id)
            .bind(prerequisites.to_vec())
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(met)
    }

    async fn process_unit_completion(&self, session: &Session, unit_id: &str) -> DatabaseResult<UnitCompletion> {
        let mut tx = self.scoped(session).await?;
        let Json(unit): Json<UnitCompletion> = sqlx::query_scalar("SELECT process_unit_completion($1, $2)")
            .bind(session.user_id())
            .bind(unit_id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(unit)
    }

    async fn table_columns(&self, session: &Session, table: &str) -> DatabaseResult<Vec<String>> {
        let mut tx = self.scoped(session).await?;
        let columns = sqlx::query_scalar("SELECT column_name FROM get_table_columns($1)")
            .bind(table)
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(columns)
    }

    async fn leaderboard(
        &self,
        session: &Session,
        category: &str,
        limit: i64,
    ) -> DatabaseResult<Vec<LeaderboardEntry>> {
        let mut tx = self.scoped(session).await?;
        let entries = sqlx::query_as(
            "SELECT user_id, username, score, rank FROM leaderboard_cache WHERE category = $1 ORDER BY rank LIMIT $2",
        )
        .bind(category)
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(entries)
    }

    async fn points_history(&self, session: &Session, limit: i64) -> DatabaseResult<Vec<PointsHistoryEntry>> {
        let mut tx = self.scoped(session).await?;
        let entries = sqlx::query_as(
            "SELECT * FROM points_history WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(session.user_id())
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(entries)
    }
}
