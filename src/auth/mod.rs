mod jwt;
pub use jwt::{UserClaims, UserMetadata, generate_token, process_token};
mod error;
pub use error::{CryptError, CryptResult};
mod session;
pub use session::Session;
