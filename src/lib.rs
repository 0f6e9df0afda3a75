use std::path::Path;
use std::sync::Arc;

use chrono::Utc;

use crate::auth::Session;
use crate::catalog::Catalog;
use crate::config::TransportKind;
use crate::error::{AppError, AppResult};
use crate::model::{
    DbConnection, MemoryTransport, PgTransport, ProgressRepository, ProgressTransport,
    RestTransport, RetryPolicy,
};
use crate::notify::Notifier;
use crate::progress::LessonProgressHook;
use crate::store::{Action, AppStore, CachedLogin, StoreHandle, User, UserCache};

pub mod config;
pub use config::{Config, ConfigError, ConfigResult};

pub mod auth;
pub mod catalog;
pub mod error;
pub mod model;
pub mod notify;
pub mod progress;
pub mod quiz;
pub mod scoring;
pub mod simulation;
pub mod store;

static APPLICATION_NAME: &str = "lasertutor";

/// Everything a front end needs: the catalog, the progress repository and
/// the shared store.
#[derive(Debug, Clone)]
pub struct App {
    catalog: Arc<Catalog>,
    repo: Arc<ProgressRepository>,
    store: StoreHandle,
    jwt_secret: Option<String>,
}

impl App {
    pub fn new(
        catalog: Arc<Catalog>,
        repo: Arc<ProgressRepository>,
        store: StoreHandle,
        jwt_secret: Option<String>,
    ) -> Self {
        Self {
            catalog,
            repo,
            store,
            jwt_secret,
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn repo(&self) -> &Arc<ProgressRepository> {
        &self.repo
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub fn lesson_progress(&self, lesson_id: impl Into<String>) -> LessonProgressHook {
        LessonProgressHook::new(lesson_id, self.repo.clone(), self.store.clone())
    }

    /// Signs in with an access token issued by the hosted auth provider and
    /// remembers it for later runs.
    #[tracing::instrument(skip_all)]
    pub fn login(&self, access_token: &str) -> AppResult<User> {
        let session = Session::from_access_token(access_token, self.jwt_secret.as_deref())?;
        if session.is_expired(Utc::now()) {
            return Err(auth::CryptError::SessionExpired.into());
        }
        self.sign_in(session, Some(access_token))
    }

    /// Makes `session` current. The token, when given, is cached so the
    /// next run resumes signed in.
    pub fn sign_in(&self, session: Session, access_token: Option<&str>) -> AppResult<User> {
        let user = match self.store.user() {
            Some(user) if user.id == session.user_id() => user,
            _ => User::from_session(&session),
        };

        if let Some(cache) = self.store.cache() {
            cache.save(&CachedLogin {
                user: user.clone(),
                access_token: access_token.map(str::to_string),
            })?;
        }
        self.repo.set_session(Some(session));
        self.store.dispatch(Action::SetUser(Some(user.clone())))?;

        tracing::info!(user_id = %user.id, "signed in");
        Ok(user)
    }

    pub fn logout(&self) -> AppResult<()> {
        self.repo.set_session(None);
        self.store.dispatch(Action::Logout)?;
        Ok(())
    }

    /// Restores the session cached by an earlier `login`, unless it expired.
    fn resume(&self, access_token: &str) {
        match Session::from_access_token(access_token, self.jwt_secret.as_deref()) {
            Ok(session) if !session.is_expired(Utc::now()) => {
                tracing::debug!(user_id = %session.user_id(), "resumed cached session");
                self.repo.set_session(Some(session));
            }
            Ok(_) => tracing::warn!("cached session expired, sign in again"),
            Err(e) => error::log_error(&e),
        }
    }
}

pub fn build_transport(kind: TransportKind, config: &Config) -> AppResult<Arc<dyn ProgressTransport>> {
    let database = config.database();
    let transport: Arc<dyn ProgressTransport> = match kind {
        TransportKind::Postgres => {
            let uri = database
                .postgres_uri()
                .ok_or(ConfigError::MissingSetting("DATABASE_URL"))?;
            Arc::new(PgTransport::new(DbConnection::connect(uri)?))
        }
        TransportKind::Rest => Arc::new(RestTransport::new(database.url(), database.anon_key())?),
        TransportKind::Memory => Arc::new(MemoryTransport::new()),
        TransportKind::Disabled => {
            return Err(ConfigError::InvalidSetting {
                key: "database.primary",
                reason: "no transport configured".to_string(),
            }
            .into());
        }
    };

    tracing::debug!("using {} transport", transport.name());
    Ok(transport)
}

/// Wires the configured transports, the bundled catalog and the cached
/// learner into an [`App`].
#[tracing::instrument(skip_all)]
pub async fn build_app(config: &Config, notifier: Arc<dyn Notifier>) -> AppResult<App> {
    let catalog = Arc::new(Catalog::bundled()?);

    let database = config.database();
    let (submit, unit) = RetryPolicy::from_config(config.retry());
    let mut repo = ProgressRepository::new(
        build_transport(database.primary(), config)?,
        catalog.clone(),
        notifier,
    )
    .with_retry(submit, unit);
    if let Some(kind) = database.fallback() {
        repo = repo.with_fallback(build_transport(kind, config)?);
    }

    let store = AppStore::new(catalog.clone());
    let (store, token) = match config.app().cache_dir() {
        Some(dir) => {
            let cache = UserCache::new(dir);
            let token = cache.load()?.and_then(|c| c.access_token);
            (StoreHandle::with_cache(store, cache)?, token)
        }
        None => (StoreHandle::new(store), None),
    };

    let app = App::new(
        catalog,
        Arc::new(repo),
        store,
        database.jwt_secret().map(str::to_string),
    );
    if let Some(token) = token {
        app.resume(&token);
    }
    Ok(app)
}

/// Applies the SQL migrations in `dir` over the direct database connection.
#[tracing::instrument(skip(config))]
pub async fn migrate(config: &Config, dir: &Path) -> AppResult<()> {
    let uri = config
        .database()
        .postgres_uri()
        .ok_or(AppError::ConfigError(ConfigError::MissingSetting("DATABASE_URL")))?;
    DbConnection::connect(uri)?.migrate(dir).await?;
    Ok(())
}

pub fn setup_trace() {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

    // load .env file for RUST_LOG etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .with(ErrorLayer::default())
        .init();

    tracing::debug!("tracing initialized.");
}
