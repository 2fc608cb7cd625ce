pub mod otp;

use crate::error::AuthError;
use crate::message::User;
use serde::Deserialize;

pub use otp::{decode_token, OtpRetentionMap, Token};

/// Transient request payload for `POST /auth`.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Validates credentials and produces a `User`. A real deployment would
/// check a user store; the stub below accepts any credentials, matching
/// the source's `EchoUserAuth` — persistent user storage is explicitly
/// out of scope (spec §1).
pub trait UserAuthenticator: Send + Sync {
    fn authenticate_credentials(&self, creds: Credentials) -> Result<User, AuthError>;
}

#[derive(Debug, Clone, Default)]
pub struct EchoUserAuth;

impl UserAuthenticator for EchoUserAuth {
    fn authenticate_credentials(&self, creds: Credentials) -> Result<User, AuthError> {
        Ok(User::new(creds.username))
    }
}
