use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::auth::Session;
use crate::model::entity::{
    AwardedAchievement, LeaderboardEntry, LessonProgress, Multiplier, PointsEarned,
    PointsHistoryEntry, ProgressPatch, ProgressUpdate, REQUIRED_COLUMNS, RankChange,
    UnitCompletion, rank,
};
use crate::model::error::{DatabaseError, DatabaseResult};

use super::ProgressTransport;

const FIRST_LIGHT_BONUS: i64 = 25;
const UNIT_COMPLETION: &str = "unit_completion";

/// Calls that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Fetch,
    Upsert,
    Prerequisites,
    UnitCompletion,
    Columns,
}

#[derive(Debug)]
struct Profile {
    username: String,
    points: i64,
}

#[derive(Debug, Default)]
struct MemoryState {
    rows: HashMap<(Uuid, String), LessonProgress>,
    history: Vec<PointsHistoryEntry>,
    profiles: HashMap<Uuid, Profile>,
    columns: Option<Vec<String>>,
    failures: HashMap<Operation, u32>,
    calls: HashMap<Operation, u32>,
}

/// In-process stand-in for the hosted database: the same upsert merge,
/// monotonic trigger, RPCs and owner checks, kept in a map. Clones share
/// state.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    name: &'static str,
    state: Arc<Mutex<MemoryState>>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::named("memory")
    }

    pub fn named(name: &'static str) -> Self {
        Self {
            name,
            state: Arc::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes the next `times` calls of `op` fail with a 503.
    pub fn fail_next(&self, op: Operation, times: u32) {
        self.state().failures.insert(op, times);
    }

    pub fn calls(&self, op: Operation) -> u32 {
        self.state().calls.get(&op).copied().unwrap_or(0)
    }

    /// Replaces the column list reported for `lesson_progress`.
    pub fn set_columns(&self, columns: &[&str]) {
        self.state().columns = Some(columns.iter().map(|c| c.to_string()).collect());
    }

    pub fn add_profile(&self, user_id: Uuid, username: impl Into<String>, points: i64) {
        self.state().profiles.insert(
            user_id,
            Profile {
                username: username.into(),
                points,
            },
        );
    }

    /// Rows across all users.
    pub fn row_count(&self) -> usize {
        self.state().rows.len()
    }

    fn enter(&self, op: Operation) -> DatabaseResult<MutexGuard<'_, MemoryState>> {
        let mut state = self.state();
        *state.calls.entry(op).or_default() += 1;

        if let Some(remaining) = state.failures.get_mut(&op).filter(|n| **n > 0) {
            *remaining -= 1;
            tracing::debug!(transport = self.name, ?op, "injected failure");
            return Err(DatabaseError::RestError {
                status: 503,
                message: format!("{} unavailable", self.name),
            });
        }
        Ok(state)
    }
}

impl MemoryState {
    fn rank_of(&self, user_id: Uuid) -> i64 {
        match self.profiles.get(&user_id) {
            Some(me) => 1 + self.profiles.values().filter(|p| p.points > me.points).count() as i64,
            None => self.profiles.len() as i64 + 1,
        }
    }

    fn points_to_next_rank(&self, user_id: Uuid) -> i64 {
        let mine = self.profiles.get(&user_id).map(|p| p.points).unwrap_or(0);
        self.profiles
            .values()
            .map(|p| p.points)
            .filter(|p| *p > mine)
            .min()
            .map(|next| next - mine)
            .unwrap_or(0)
    }
}

#[async_trait]
impl ProgressTransport for MemoryTransport {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch(&self, session: &Session, lesson_id: &str) -> DatabaseResult<Option<LessonProgress>> {
        let state = self.enter(Operation::Fetch)?;
        Ok(state
            .rows
            .get(&(session.user_id(), lesson_id.to_string()))
            .cloned())
    }

    async fn fetch_all(&self, session: &Session) -> DatabaseResult<Vec<LessonProgress>> {
        let state = self.enter(Operation::Fetch)?;
        let mut rows: Vec<_> = state
            .rows
            .values()
            .filter(|r| r.user_id() == session.user_id())
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.completed_at().cmp(&a.completed_at()));
        Ok(rows)
    }

    async fn upsert(
        &self,
        session: &Session,
        lesson_id: &str,
        patch: &ProgressPatch,
    ) -> DatabaseResult<LessonProgress> {
        let mut state = self.enter(Operation::Upsert)?;
        let now = Utc::now();

        let row = state
            .rows
            .entry((session.user_id(), lesson_id.to_string()))
            .or_insert_with(|| LessonProgress::new(session.user_id(), lesson_id, now));
        row.apply(patch, now);
        Ok(row.clone())
    }

    async fn check_prerequisites(
        &self,
        session: &Session,
        _lesson_id: &str,
        prerequisites: &[String],
    ) -> DatabaseResult<bool> {
        let state = self.enter(Operation::Prerequisites)?;
        Ok(prerequisites.iter().all(|p| {
            state
                .rows
                .get(&(session.user_id(), p.clone()))
                .is_some_and(LessonProgress::completed)
        }))
    }

    async fn process_unit_completion(&self, session: &Session, unit_id: &str) -> DatabaseResult<UnitCompletion> {
        let mut state = self.enter(Operation::UnitCompletion)?;
        let user_id = session.user_id();

        let base = match state.rows.get(&(user_id, unit_id.to_string())) {
            Some(row) if row.completed() => row.score() as i64,
            _ => {
                return Err(DatabaseError::Rejected(format!("unit {unit_id} is not completed")));
            }
        };
        let completed_units = state
            .rows
            .values()
            .filter(|r| r.user_id() == user_id && r.completed())
            .count();

        let earlier: Vec<_> = state
            .history
            .iter()
            .filter(|h| h.user_id == user_id && h.reason == UNIT_COMPLETION)
            .map(|h| h.unit_id.clone())
            .collect();
        let previous_rank = state.rank_of(user_id);

        if earlier.iter().any(|u| u.as_deref() == Some(unit_id)) {
            return Ok(UnitCompletion {
                status: "already_processed".to_string(),
                points_earned: PointsEarned {
                    base_points: 0,
                    bonus_points: 0,
                    multipliers: Vec::new(),
                },
                total_points: state.profiles.get(&user_id).map(|p| p.points).unwrap_or(0),
                leaderboard: RankChange {
                    current_rank: previous_rank,
                    previous_rank,
                    points_to_next_rank: state.points_to_next_rank(user_id),
                },
                achievements: Vec::new(),
                progress_update: ProgressUpdate {
                    pathway_completion: completed_units as f64,
                    unlocked_content: Vec::new(),
                },
            });
        }

        let mut bonus = 0;
        let mut multipliers = Vec::new();
        let mut achievements = Vec::new();
        if earlier.is_empty() {
            bonus += FIRST_LIGHT_BONUS;
            achievements.push(AwardedAchievement {
                name: "First Light".to_string(),
                description: "Complete your first lesson".to_string(),
                bonus_awarded: FIRST_LIGHT_BONUS,
            });
        }
        if base >= 100 {
            bonus += (base as f64 * 0.1).round() as i64;
            multipliers.push(Multiplier {
                kind: "perfect_score".to_string(),
                value: 1.1,
            });
        }

        let earned = base + bonus;
        state.history.push(PointsHistoryEntry {
            id: Uuid::new_v4(),
            user_id,
            points: earned.clamp(0, i32::MAX as i64) as i32,
            reason: UNIT_COMPLETION.to_string(),
            unit_id: Some(unit_id.to_string()),
            created_at: Utc::now(),
        });

        let username = session.username().unwrap_or("learner").to_string();
        let profile = state
            .profiles
            .entry(user_id)
            .or_insert(Profile { username, points: 0 });
        profile.points += earned;
        let total_points = profile.points;

        Ok(UnitCompletion {
            status: "success".to_string(),
            points_earned: PointsEarned {
                base_points: base,
                bonus_points: bonus,
                multipliers,
            },
            total_points,
            leaderboard: RankChange {
                current_rank: state.rank_of(user_id),
                previous_rank,
                points_to_next_rank: state.points_to_next_rank(user_id),
            },
            achievements,
            progress_update: ProgressUpdate {
                pathway_completion: completed_units as f64,
                unlocked_content: Vec::new(),
            },
        })
    }

    async fn table_columns(&self, _session: &Session, table: &str) -> DatabaseResult<Vec<String>> {
        let state = self.enter(Operation::Columns)?;
        if table != "lesson_progress" {
            return Ok(Vec::new());
        }

        Ok(state.columns.clone().unwrap_or_else(|| {
            ["id", "last_accessed", "created_at"]
                .into_iter()
                .chain(REQUIRED_COLUMNS)
                .map(str::to_string)
                .collect()
        }))
    }

    async fn leaderboard(
        &self,
        _session: &Session,
        category: &str,
        limit: i64,
    ) -> DatabaseResult<Vec<LeaderboardEntry>> {
        let state = self.enter(Operation::Fetch)?;
        if category != "global" {
            return Ok(Vec::new());
        }

        let scores = state
            .profiles
            .iter()
            .map(|(id, p)| (*id, p.username.clone(), p.points))
            .collect();
        Ok(rank(scores).into_iter().take(limit.max(0) as usize).collect())
    }

    async fn points_history(&self, session: &Session, limit: i64) -> DatabaseResult<Vec<PointsHistoryEntry>> {
        let state = self.enter(Operation::Fetch)?;
        let mut entries: Vec<_> = state
            .history
            .iter()
            .filter(|h| h.user_id == session.user_id())
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit.max(0) as usize);
        Ok(entries)
    }
}

#[cfg(test)]
mod test {
    use chrono::Duration;

    use super::*;

    fn session() -> Session {
        Session::new(Uuid::new_v4(), "token", Utc::now() + Duration::hours(1)).with_username("ada")
    }

    #[tokio::test]
    async fn upsert_keeps_one_row_per_lesson() {
        let memory = MemoryTransport::new();
        let session = session();

        memory
            .upsert(&session, "laser-fundamentals", &ProgressPatch::completion(80, Utc::now()))
            .await
            .unwrap();
        let row = memory
            .upsert(&session, "laser-fundamentals", &ProgressPatch::completion(60, Utc::now()))
            .await
            .unwrap();

        assert_eq!(memory.row_count(), 1);
        assert_eq!(row.score(), 80);
        assert!(memory.fetch(&session, "laser-fundamentals").await.unwrap().is_some());
        assert!(memory.fetch(&session, "optical-resonators").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rows_are_scoped_to_the_session() {
        let memory = MemoryTransport::new();
        let (ada, bob) = (session(), session());
        memory
            .upsert(&ada, "laser-fundamentals", &ProgressPatch::default())
            .await
            .unwrap();

        assert!(memory.fetch(&bob, "laser-fundamentals").await.unwrap().is_none());
        assert!(memory.fetch_all(&bob).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn injected_failures_run_out() {
        let memory = MemoryTransport::new();
        let session = session();
        memory.fail_next(Operation::Upsert, 2);

        for _ in 0..2 {
            assert!(memory.upsert(&session, "l", &ProgressPatch::default()).await.is_err());
        }
        assert!(memory.upsert(&session, "l", &ProgressPatch::default()).await.is_ok());
        assert_eq!(memory.calls(Operation::Upsert), 3);
    }

    #[tokio::test]
    async fn unit_completion_awards_points_once() {
        let memory = MemoryTransport::new();
        let session = session();
        memory.add_profile(Uuid::new_v4(), "rival", 50);

        assert!(matches!(
            memory.process_unit_completion(&session, "laser-fundamentals").await,
            Err(DatabaseError::Rejected(_))
        ));

        memory
            .upsert(&session, "laser-fundamentals", &ProgressPatch::completion(80, Utc::now()))
            .await
            .unwrap();
        let first = memory
            .process_unit_completion(&session, "laser-fundamentals")
            .await
            .unwrap();
        assert_eq!(first.points(), 105);
        assert_eq!(first.achievements.len(), 1);
        assert_eq!(first.leaderboard.previous_rank, 2);
        assert_eq!(first.leaderboard.current_rank, 1);
        assert!(first.leaderboard.improved());

        let again = memory
            .process_unit_completion(&session, "laser-fundamentals")
            .await
            .unwrap();
        assert!(again.already_processed());
        assert_eq!(again.total_points, 105);
        assert_eq!(memory.points_history(&session, 10).await.unwrap().len(), 1);

        let board = memory.leaderboard(&session, "global", 10).await.unwrap();
        assert_eq!(board[0].username, "ada");
        assert_eq!(board[1].rank, 2);
    }

    #[tokio::test]
    async fn prerequisites_need_completed_rows() {
        let memory = MemoryTransport::new();
        let session = session();
        let prereqs = vec!["laser-fundamentals".to_string()];

        memory
            .upsert(&session, "laser-fundamentals", &ProgressPatch::default())
            .await
            .unwrap();
        assert!(!memory.check_prerequisites(&session, "optical-resonators", &prereqs).await.unwrap());

        memory
            .upsert(&session, "laser-fundamentals", &ProgressPatch::completion(100, Utc::now()))
            .await
            .unwrap();
        assert!(memory.check_prerequisites(&session, "optical-resonators", &prereqs).await.unwrap());
    }
}
