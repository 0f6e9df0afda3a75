use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::auth::Session;
use crate::scoring;

const MIN_USERNAME_LEN: usize = 4;
const MAX_BIO_LEN: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Achievement {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub icon: String,
    pub unlocked: bool,
    pub unlocked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub points: u32,
    pub level: u32,
    #[serde(default)]
    pub achievements: Vec<Achievement>,
    #[serde(default)]
    completed_lessons: Vec<String>,
    #[serde(default)]
    pub current_streak: u32,
    #[serde(default)]
    pub longest_streak: u32,
    pub last_active: Option<NaiveDate>,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub avatar_url: Option<String>,
}

/// Profile edits. `None` leaves a field alone; an empty string clears the
/// optional ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfilePatch {
    pub username: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {reason}")]
pub struct ProfileError {
    pub field: &'static str,
    pub reason: String,
}

impl ProfilePatch {
    pub fn validate(&self) -> Result<(), ProfileError> {
        if let Some(username) = &self.username
            && username.trim().chars().count() < MIN_USERNAME_LEN
        {
            return Err(ProfileError {
                field: "username",
                reason: format!("must be at least {MIN_USERNAME_LEN} characters"),
            });
        }
        if let Some(bio) = &self.bio
            && bio.chars().count() > MAX_BIO_LEN
        {
            return Err(ProfileError {
                field: "bio",
                reason: format!("must be less than {MAX_BIO_LEN} characters"),
            });
        }
        check_url("website", self.website.as_deref())?;
        check_url("avatar_url", self.avatar_url.as_deref())
    }
}

fn check_url(field: &'static str, value: Option<&str>) -> Result<(), ProfileError> {
    let Some(value) = value.filter(|v| !v.is_empty()) else {
        return Ok(());
    };
    match reqwest::Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        Ok(url) => Err(ProfileError {
            field,
            reason: format!("unsupported scheme `{}`", url.scheme()),
        }),
        Err(e) => Err(ProfileError {
            field,
            reason: e.to_string(),
        }),
    }
}

fn cleared(value: String) -> Option<String> {
    Some(value).filter(|v| !v.is_empty())
}

impl User {
    pub fn new(id: Uuid, email: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            username: username.into(),
            points: 0,
            level: 1,
            achievements: Vec::new(),
            completed_lessons: Vec::new(),
            current_streak: 0,
            longest_streak: 0,
            last_active: None,
            bio: None,
            website: None,
            avatar_url: None,
        }
    }

    /// A fresh profile for the signed-in learner. The username falls back to
    /// the local part of the e-mail address.
    pub fn from_session(session: &Session) -> Self {
        let email = session.email().unwrap_or_default().to_string();
        let username = session
            .username()
            .map(str::to_string)
            .or_else(|| email.split('@').next().filter(|s| !s.is_empty()).map(str::to_string))
            .unwrap_or_else(|| "learner".to_string());

        Self::new(session.user_id(), email, username)
    }

    pub fn completed_lessons(&self) -> &[String] {
        &self.completed_lessons
    }

    pub fn has_completed(&self, lesson_id: &str) -> bool {
        self.completed_lessons.iter().any(|l| l == lesson_id)
    }

    /// Returns `false` when the lesson was already recorded.
    pub fn complete_lesson(&mut self, lesson_id: &str) -> bool {
        if self.has_completed(lesson_id) {
            return false;
        }
        self.completed_lessons.push(lesson_id.to_string());
        true
    }

    pub fn add_points(&mut self, points: u32) {
        self.set_points(self.points.saturating_add(points));
    }

    pub fn set_points(&mut self, points: u32) {
        self.points = points;
        self.level = scoring::level_for_points(points);
    }

    /// Unlocks `achievement` unless one with the same id is already unlocked.
    pub fn unlock(&mut self, achievement: Achievement) -> bool {
        match self.achievements.iter_mut().find(|a| a.id == achievement.id) {
            Some(existing) if existing.unlocked => false,
            Some(existing) => {
                *existing = achievement;
                true
            }
            None => {
                self.achievements.push(achievement);
                true
            }
        }
    }

    pub fn update_profile(&mut self, patch: ProfilePatch) -> Result<(), ProfileError> {
        patch.validate()?;
        if let Some(username) = patch.username {
            self.username = username.trim().to_string();
        }
        if let Some(bio) = patch.bio {
            self.bio = cleared(bio);
        }
        if let Some(website) = patch.website {
            self.website = cleared(website);
        }
        if let Some(avatar_url) = patch.avatar_url {
            self.avatar_url = cleared(avatar_url);
        }
        Ok(())
    }

    /// Same day keeps the streak, the next day extends it, any gap restarts
    /// it at one.
    pub fn record_activity(&mut self, day: NaiveDate) {
        match self.last_active {
            Some(last) if last >= day => return,
            Some(last) if last.succ_opt() == Some(day) => self.current_streak += 1,
            _ => self.current_streak = 1,
        }
        self.longest_streak = self.longest_streak.max(self.current_streak);
        self.last_active = Some(day);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn completed_lessons_are_a_set() {
        let mut user = User::new(Uuid::new_v4(), "a@b.c", "a");
        assert!(user.complete_lesson("laser-fundamentals"));
        assert!(!user.complete_lesson("laser-fundamentals"));
        assert_eq!(user.completed_lessons(), ["laser-fundamentals"]);
    }

    #[test]
    fn points_drive_level() {
        let mut user = User::new(Uuid::new_v4(), "a@b.c", "a");
        user.add_points(500);
        assert_eq!(user.level, 1);
        user.add_points(400);
        assert_eq!(user.points, 900);
        assert_eq!(user.level, 3);
    }

    #[test]
    fn streaks() {
        let mut user = User::new(Uuid::new_v4(), "a@b.c", "a");
        user.record_activity(day(1));
        user.record_activity(day(1));
        user.record_activity(day(2));
        user.record_activity(day(3));
        assert_eq!(user.current_streak, 3);

        user.record_activity(day(7));
        assert_eq!(user.current_streak, 1);
        assert_eq!(user.longest_streak, 3);
        assert_eq!(user.last_active, Some(day(7)));
    }

    #[test]
    fn achievements_unlock_once() {
        let mut user = User::new(Uuid::new_v4(), "a@b.c", "a");
        let first_light = Achievement {
            id: "first-light".into(),
            title: "First Light".into(),
            description: "Complete a lesson".into(),
            icon: "🏆".into(),
            unlocked: true,
            unlocked_at: None,
        };
        assert!(user.unlock(first_light.clone()));
        assert!(!user.unlock(first_light));
        assert_eq!(user.achievements.len(), 1);
    }

    #[test]
    fn profile_edits_are_validated() {
        let mut user = User::new(Uuid::new_v4(), "a@b.c", "ada");
        user.update_profile(ProfilePatch {
            username: Some("ada lovelace".into()),
            bio: Some("Counts photons.".into()),
            website: Some("https://example.com/ada".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(user.username, "ada lovelace");
        assert_eq!(user.website.as_deref(), Some("https://example.com/ada"));

        let err = user
            .update_profile(ProfilePatch {
                username: Some("ab".into()),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err.field, "username");

        let err = user
            .update_profile(ProfilePatch {
                website: Some("ftp://example.com".into()),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err.field, "website");
        assert!(user
            .update_profile(ProfilePatch {
                bio: Some("x".repeat(201)),
                ..Default::default()
            })
            .is_err());

        // a rejected patch changes nothing; an empty string clears
        assert_eq!(user.bio.as_deref(), Some("Counts photons."));
        user.update_profile(ProfilePatch {
            bio: Some(String::new()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(user.bio, None);
    }

    #[test]
    fn username_from_email() {
        let session = Session::new(Uuid::new_v4(), "token", Utc::now()).with_email("ada@example.com");
        assert_eq!(User::from_session(&session).username, "ada");
    }
}
