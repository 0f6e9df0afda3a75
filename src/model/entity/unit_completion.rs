use serde::{Deserialize, Serialize};

/// Payload returned by the `process_unit_completion` RPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitCompletion {
    pub status: String,
    pub points_earned: PointsEarned,
    pub total_points: i64,
    pub leaderboard: RankChange,
    #[serde(default)]
    pub achievements: Vec<AwardedAchievement>,
    pub progress_update: ProgressUpdate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsEarned {
    pub base_points: i64,
    pub bonus_points: i64,
    #[serde(default)]
    pub multipliers: Vec<Multiplier>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Multiplier {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankChange {
    pub current_rank: i64,
    pub previous_rank: i64,
    pub points_to_next_rank: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardedAchievement {
    pub name: String,
    pub description: String,
    pub bonus_awarded: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    /// Completed lessons.
    pub pathway_completion: f64,
    #[serde(default)]
    pub unlocked_content: Vec<String>,
}

impl UnitCompletion {
    pub fn already_processed(&self) -> bool {
        self.status == "already_processed"
    }

    pub fn points(&self) -> i64 {
        self.points_earned.base_points + self.points_earned.bonus_points
    }
}

impl RankChange {
    /// A smaller rank number is better.
    pub fn improved(&self) -> bool {
        self.current_rank < self.previous_rank
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_rpc_payload() {
        let payload = serde_json::json!({
            "status": "success",
            "pointsEarned": {
                "basePoints": 80,
                "bonusPoints": 25,
                "multipliers": [{ "type": "first_completion", "value": 1.0 }]
            },
            "totalPoints": 105,
            "leaderboard": { "currentRank": 3, "previousRank": 5, "pointsToNextRank": 40 },
            "achievements": [
                { "name": "First Light", "description": "Complete your first lesson", "bonusAwarded": 25 }
            ],
            "progressUpdate": { "pathwayCompletion": 1, "unlockedContent": ["optical-resonators"] }
        });

        let unit: UnitCompletion = serde_json::from_value(payload).unwrap();
        assert_eq!(unit.points(), 105);
        assert!(unit.leaderboard.improved());
        assert!(!unit.already_processed());
        assert_eq!(unit.points_earned.multipliers[0].kind, "first_completion");
        assert_eq!(unit.progress_update.unlocked_content, ["optical-resonators"]);
    }
}
