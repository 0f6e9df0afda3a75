mod lesson_progress;
pub use lesson_progress::{LessonProgress, ProgressPatch, ProgressUpsert, REQUIRED_COLUMNS};

mod unit_completion;
pub use unit_completion::{
    AwardedAchievement, Multiplier, PointsEarned, ProgressUpdate, RankChange, UnitCompletion,
};

mod leaderboard;
pub use leaderboard::{LeaderboardEntry, PointsHistoryEntry, rank};
