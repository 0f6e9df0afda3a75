use thiserror::Error;

pub type DatabaseResult<T> = std::result::Result<T, DatabaseError>;

/// SQLSTATE raised when a row-level security policy rejects a statement.
const INSUFFICIENT_PRIVILEGE: &str = "42501";
/// SQLSTATE the database functions raise for requests they refuse.
const INVALID_PARAMETER_VALUE: &str = "22023";

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("sqlx migrate error: {0}")]
    SqlxMigrateError(#[from] sqlx::migrate::MigrateError),
    #[error("sqlx error: {0}")]
    SqlxError(sqlx::Error),
    #[error("http error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("rest error {status}: {message}")]
    RestError { status: u16, message: String },
    #[error("json error: {0}")]
    SerdeError(#[from] serde_json::Error),
    #[error("sign in to save your progress")]
    AuthRequired,
    #[error("access to this resource is forbidden")]
    Forbidden,
    #[error("lesson_progress is missing columns: {}", missing.join(", "))]
    SchemaMismatch { missing: Vec<String> },
    #[error("lesson {0} not found")]
    LessonNotFound(String),
    #[error("invalid quiz result: {0}")]
    InvalidResult(String),
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(e: sqlx::Error) -> Self {
        let known = e
            .as_database_error()
            .and_then(|db| db.code().and_then(|code| Self::from_sqlstate(&code, db.message())));

        match known {
            Some(known) => {
                tracing::debug!("database refused a statement: {e}");
                known
            }
            None => DatabaseError::SqlxError(e),
        }
    }
}

impl DatabaseError {
    /// SQLSTATEs that mean the request itself is at fault, whichever
    /// transport carried it.
    pub(crate) fn from_sqlstate(code: &str, message: &str) -> Option<Self> {
        match code {
            INSUFFICIENT_PRIVILEGE => Some(Self::Forbidden),
            INVALID_PARAMETER_VALUE => Some(Self::Rejected(message.to_string())),
            _ => None,
        }
    }

    /// Retrying the same request cannot fix these.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::AuthRequired
                | Self::Forbidden
                | Self::SchemaMismatch { .. }
                | Self::LessonNotFound(_)
                | Self::InvalidResult(_)
                | Self::Rejected(_)
        )
    }
}
