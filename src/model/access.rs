use uuid::Uuid;

use crate::auth::Session;
use crate::model::error::{DatabaseError, DatabaseResult};

/// A row that belongs to one learner.
pub trait HasOwner {
    fn owner_id(&self) -> Uuid;
}

/// Client-side counterpart of the `auth.uid() = user_id` policies.
pub fn check_access<T: HasOwner>(session: &Session, resource: &T) -> DatabaseResult<()> {
    if session.user_id() == resource.owner_id() {
        Ok(())
    } else {
        Err(DatabaseError::Forbidden)
    }
}
