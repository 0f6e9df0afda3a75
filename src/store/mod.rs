//! Application state.
//!
//! Every mutation is an [`Action`] applied by [`AppStore::reduce`]; the
//! [`StoreHandle`] shares one store between the progress hook and the
//! presentation layer and mirrors the signed-in user to the on-disk cache.

use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::quiz::QuizResult;
use crate::simulation::{SimulationError, SimulationParams, SimulationPatch};

mod cache;
pub use cache::{CacheError, CacheResult, CachedLogin, UserCache};

mod user;
pub use user::{Achievement, ProfileError, ProfilePatch, User};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown lesson `{0}`")]
    UnknownLesson(String),
    #[error(transparent)]
    Simulation(#[from] SimulationError),
    #[error(transparent)]
    Profile(#[from] ProfileError),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone)]
pub enum Action {
    SetUser(Option<User>),
    SetLoggedIn(bool),
    ToggleDarkMode,
    SetCurrentLesson(Option<String>),
    UpdateSimulation(SimulationPatch),
    /// Adds the lesson to the user's completed set.
    CompleteLesson(String),
    /// Records a finished quiz and credits `points` once per attempt.
    AddQuizResult { result: QuizResult, points: u32 },
    UnlockAchievement(Achievement),
    UpdateProfile(ProfilePatch),
    Logout,
}

/// A stored quiz outcome with the points it earned.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizRecord {
    pub result: QuizResult,
    pub points: u32,
}

#[derive(Debug, Clone)]
pub struct AppStore {
    user: Option<User>,
    catalog: Arc<Catalog>,
    dark_mode: bool,
    current_lesson: Option<String>,
    simulation: SimulationParams,
    is_logged_in: bool,
    quiz_results: Vec<QuizRecord>,
}

impl AppStore {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            user: None,
            catalog,
            dark_mode: false,
            current_lesson: None,
            simulation: SimulationParams::default(),
            is_logged_in: false,
            quiz_results: Vec::new(),
        }
    }

    pub fn reduce(&mut self, action: Action) -> StoreResult<()> {
        match action {
            Action::SetUser(user) => {
                self.is_logged_in = user.is_some();
                self.user = user;
            }
            Action::SetLoggedIn(logged_in) => self.is_logged_in = logged_in,
            Action::ToggleDarkMode => self.dark_mode = !self.dark_mode,
            Action::SetCurrentLesson(Some(id)) => {
                if self.catalog.lesson(&id).is_none() {
                    return Err(StoreError::UnknownLesson(id));
                }
                self.current_lesson = Some(id);
            }
            Action::SetCurrentLesson(None) => self.current_lesson = None,
            Action::UpdateSimulation(patch) => self.simulation.apply(patch)?,
            Action::CompleteLesson(lesson_id) => {
                if let Some(user) = self.user.as_mut() {
                    user.complete_lesson(&lesson_id);
                }
            }
            Action::AddQuizResult { result, points } => {
                if self.has_quiz_result(result.attempt_id) {
                    tracing::debug!(attempt_id = %result.attempt_id, "quiz result already recorded");
                    return Ok(());
                }
                if let Some(user) = self.user.as_mut() {
                    user.add_points(points);
                    user.complete_lesson(&result.lesson_id);
                    user.record_activity(result.date.date_naive());
                }
                self.quiz_results.push(QuizRecord { result, points });
            }
            Action::UnlockAchievement(achievement) => {
                if let Some(user) = self.user.as_mut() {
                    user.unlock(achievement);
                }
            }
            Action::UpdateProfile(patch) => match self.user.as_mut() {
                Some(user) => user.update_profile(patch)?,
                None => tracing::debug!("profile edit without a signed-in user"),
            },
            Action::Logout => {
                self.user = None;
                self.is_logged_in = false;
                self.current_lesson = None;
                self.quiz_results.clear();
            }
        }
        Ok(())
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn dark_mode(&self) -> bool {
        self.dark_mode
    }

    pub fn current_lesson(&self) -> Option<&str> {
        self.current_lesson.as_deref()
    }

    pub fn simulation(&self) -> &SimulationParams {
        &self.simulation
    }

    pub fn is_logged_in(&self) -> bool {
        self.is_logged_in
    }

    pub fn quiz_results(&self) -> &[QuizRecord] {
        &self.quiz_results
    }

    pub fn has_quiz_result(&self, attempt_id: Uuid) -> bool {
        self.quiz_results.iter().any(|r| r.result.attempt_id == attempt_id)
    }
}

/// Shared, synchronously locked store. The lock is never held across an
/// `.await`.
#[derive(Debug, Clone)]
pub struct StoreHandle {
    inner: Arc<RwLock<AppStore>>,
    cache: Option<UserCache>,
}

impl StoreHandle {
    pub fn new(store: AppStore) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
            cache: None,
        }
    }

    /// Restores the cached user, if any, and keeps the cache in sync with
    /// later dispatches.
    pub fn with_cache(mut store: AppStore, cache: UserCache) -> CacheResult<Self> {
        if let Some(login) = cache.load()? {
            tracing::debug!(user_id = %login.user.id, "restored cached user");
            store.user = Some(login.user);
            store.is_logged_in = true;
        }

        Ok(Self {
            inner: Arc::new(RwLock::new(store)),
            cache: Some(cache),
        })
    }

    pub fn cache(&self) -> Option<&UserCache> {
        self.cache.as_ref()
    }

    pub fn dispatch(&self, action: Action) -> StoreResult<()> {
        let logout = matches!(action, Action::Logout);
        let user = {
            let mut store = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            store.reduce(action)?;
            store.user.clone()
        };

        if let Some(cache) = &self.cache {
            let written = match (&user, logout) {
                (_, true) | (None, _) => cache.clear(),
                (Some(user), false) => cache.save_user(user),
            };
            // the in-memory store stays authoritative for this run
            if let Err(e) = written {
                crate::error::log_error(&e);
            }
        }
        Ok(())
    }

    pub fn read<R>(&self, f: impl FnOnce(&AppStore) -> R) -> R {
        let store = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&store)
    }

    pub fn user(&self) -> Option<User> {
        self.read(|s| s.user.clone())
    }
}
