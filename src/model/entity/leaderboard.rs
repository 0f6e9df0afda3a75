use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;

use crate::model::access::HasOwner;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct LeaderboardEntry {
    pub user_id: Uuid,
    pub username: String,
    pub score: i64,
    pub rank: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PointsHistoryEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub points: i32,
    pub reason: String,
    pub unit_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl HasOwner for PointsHistoryEntry {
    fn owner_id(&self) -> Uuid {
        self.user_id
    }
}

/// Ranks `(user, points)` pairs: highest first, ties share a rank.
pub fn rank(mut scores: Vec<(Uuid, String, i64)>) -> Vec<LeaderboardEntry> {
    scores.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.1.cmp(&b.1)));

    let mut entries: Vec<LeaderboardEntry> = Vec::with_capacity(scores.len());
    for (i, (user_id, username, score)) in scores.into_iter().enumerate() {
        let rank = match entries.last() {
            Some(prev) if prev.score == score => prev.rank,
            _ => i as i64 + 1,
        };
        entries.push(LeaderboardEntry {
            user_id,
            username,
            score,
            rank,
        });
    }
    entries
}
