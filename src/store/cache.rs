use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::User;

const CACHE_FILE: &str = "session.json";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache io error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("cache format error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// What survives between runs: the learner and the token that signed them in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedLogin {
    pub user: User,
    pub access_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UserCache {
    path: PathBuf,
}

impl UserCache {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(CACHE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when nothing is cached yet.
    pub fn load(&self) -> CacheResult<Option<CachedLogin>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, login: &CachedLogin) -> CacheResult<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&self.path, serde_json::to_vec_pretty(login)?)?;
        tracing::trace!("cached login at {}", self.path.display());
        Ok(())
    }

    /// Keeps the cached token, replaces the user.
    pub fn save_user(&self, user: &User) -> CacheResult<()> {
        let access_token = self.load()?.and_then(|c| c.access_token);
        self.save(&CachedLogin {
            user: user.clone(),
            access_token,
        })
    }

    pub fn clear(&self) -> CacheResult<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod test {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = UserCache::new(dir.path().join("nested"));
        assert!(cache.load().unwrap().is_none());

        let login = CachedLogin {
            user: User::new(Uuid::new_v4(), "a@b.c", "a"),
            access_token: Some("jwt".into()),
        };
        cache.save(&login).unwrap();
        assert_eq!(cache.load().unwrap(), Some(login.clone()));

        let mut user = login.user.clone();
        user.add_points(80);
        cache.save_user(&user).unwrap();
        let reloaded = cache.load().unwrap().unwrap();
        assert_eq!(reloaded.user.points, 80);
        assert_eq!(reloaded.access_token.as_deref(), Some("jwt"));

        cache.clear().unwrap();
        cache.clear().unwrap();
        assert!(cache.load().unwrap().is_none());
    }

    #[test]
    fn corrupt_cache_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = UserCache::new(dir.path());
        fs::write(cache.path(), b"{not json").unwrap();
        assert!(matches!(cache.load(), Err(CacheError::SerdeError(_))));
    }
}
