//! Ways of reaching the progress tables.
//!
//! Every call runs as the signed-in learner; the database's row-level
//! security policies decide what that learner may read or write.

use async_trait::async_trait;

use crate::auth::Session;
use crate::model::entity::{
    LeaderboardEntry, LessonProgress, PointsHistoryEntry, ProgressPatch, UnitCompletion,
};
use crate::model::error::DatabaseResult;

mod memory;
pub use memory::{MemoryTransport, Operation};

mod postgres;
pub use postgres::PgTransport;

mod rest;
pub use rest::RestTransport;

#[async_trait]
pub trait ProgressTransport: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn fetch(&self, session: &Session, lesson_id: &str) -> DatabaseResult<Option<LessonProgress>>;

    /// All of the learner's rows, most recently completed first.
    async fn fetch_all(&self, session: &Session) -> DatabaseResult<Vec<LessonProgress>>;

    /// Insert or merge on `(user_id, lesson_id)`.
    async fn upsert(
        &self,
        session: &Session,
        lesson_id: &str,
        patch: &ProgressPatch,
    ) -> DatabaseResult<LessonProgress>;

    /// `check_lesson_prerequisites` RPC.
    async fn check_prerequisites(
        &self,
        session: &Session,
        lesson_id: &str,
        prerequisites: &[String],
    ) -> DatabaseResult<bool>;

    /// `process_unit_completion` RPC.
    async fn process_unit_completion(&self, session: &Session, unit_id: &str) -> DatabaseResult<UnitCompletion>;

    /// `get_table_columns` RPC.
    async fn table_columns(&self, session: &Session, table: &str) -> DatabaseResult<Vec<String>>;

    async fn leaderboard(
        &self,
        session: &Session,
        category: &str,
        limit: i64,
    ) -> DatabaseResult<Vec<LeaderboardEntry>>;

    async fn points_history(&self, session: &Session, limit: i64) -> DatabaseResult<Vec<PointsHistoryEntry>>;
}
