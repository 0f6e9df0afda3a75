mod access;
pub use access::{HasOwner, check_access};

mod database;
pub use database::DbConnection;

pub mod entity;

mod error;
pub use error::{DatabaseError, DatabaseResult};

mod repo;
pub use repo::{ProgressRepository, QuizSubmission};

pub mod retry;
pub use retry::{Backoff, RetryPolicy, RetryState};

pub mod transport;
pub use transport::{MemoryTransport, PgTransport, ProgressTransport, RestTransport};
