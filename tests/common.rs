use std::sync::Arc;

use chrono::{Duration, Utc};
use lasertutor::auth::Session;
use lasertutor::catalog::Catalog;
use lasertutor::model::{MemoryTransport, ProgressRepository};
use lasertutor::notify::MemoryNotifier;
use lasertutor::progress::LessonProgressHook;
use lasertutor::store::{Action, AppStore, StoreHandle, User};
use uuid::Uuid;

/// A signed-in learner wired to in-memory transports. The transports and the
/// notifier are clones sharing state with the ones inside `repo`.
pub struct TestApp {
    pub primary: MemoryTransport,
    pub fallback: Option<MemoryTransport>,
    pub notifier: MemoryNotifier,
    pub repo: Arc<ProgressRepository>,
    pub store: StoreHandle,
    pub session: Session,
}

#[allow(unused)]
impl TestApp {
    pub fn hook(&self, lesson_id: &str) -> LessonProgressHook {
        LessonProgressHook::new(lesson_id, self.repo.clone(), self.store.clone())
    }

    pub fn user(&self) -> User {
        self.store.user().expect("learner is signed in")
    }

    pub fn notified(&self, message: &str) -> bool {
        self.notifier.messages().iter().any(|m| m == message)
    }
}

pub fn learner() -> Session {
    Session::new(Uuid::new_v4(), "test-token", Utc::now() + Duration::hours(1))
        .with_email("ada@example.com")
        .with_username("ada")
}

fn build(fallback: Option<MemoryTransport>) -> TestApp {
    let catalog = Arc::new(Catalog::bundled().expect("bundled catalog parses"));
    let primary = MemoryTransport::named("primary");
    let notifier = MemoryNotifier::new();
    let session = learner();

    let mut repo = ProgressRepository::new(Arc::new(primary.clone()), catalog.clone(), Arc::new(notifier.clone()));
    if let Some(fallback) = &fallback {
        repo = repo.with_fallback(Arc::new(fallback.clone()));
    }
    repo.set_session(Some(session.clone()));

    let store = StoreHandle::new(AppStore::new(catalog));
    store
        .dispatch(Action::SetUser(Some(User::from_session(&session))))
        .expect("user is stored");

    TestApp {
        primary,
        fallback,
        notifier,
        repo: Arc::new(repo),
        store,
        session,
    }
}

pub fn setup() -> TestApp {
    build(None)
}

#[allow(unused)]
pub fn setup_with_fallback() -> TestApp {
    build(Some(MemoryTransport::named("fallback")))
}
