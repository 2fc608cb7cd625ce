use crate::error::AuthError;
use crate::message::User;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Opaque bearer carried in the `/ws?otp=...` query parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub key: String,
}

struct Otp {
    user: User,
    created: Instant,
}

/// Time-indexed single-use token store. Entries live until consumed or
/// until `created + retention` elapses, whichever comes first — there
/// is no "in-flight consumed" state, consumption is the deletion.
#[derive(Clone)]
pub struct OtpRetentionMap {
    entries: Arc<Mutex<HashMap<String, Otp>>>,
    retention: Duration,
}

impl OtpRetentionMap {
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            retention,
        }
    }

    /// Inserts a freshly generated 128-bit-CSPRNG-keyed entry for
    /// `user` and returns its token. Never fails on key collision —
    /// collisions are astronomically unlikely at 128 bits and are not
    /// retried, matching the low-probability tolerance the spec allows.
    pub async fn new_token(&self, user: User) -> Token {
        let key = generate_key();
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.clone(),
            Otp {
                user,
                created: Instant::now(),
            },
        );
        Token { key }
    }

    /// Atomic test-and-delete: consumption is removal, successful or not.
    pub async fn authenticate_token(&self, token: &Token) -> Result<User, AuthError> {
        let mut entries = self.entries.lock().await;
        match entries.remove(&token.key) {
            None => Err(AuthError::InvalidToken),
            Some(otp) if otp.created.elapsed() > self.retention => Err(AuthError::InvalidToken),
            Some(otp) => Ok(otp.user),
        }
    }

    async fn sweep(&self) {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, otp| otp.created + self.retention >= now);
    }

    /// Spawns the cooperative sweeper, period <= retention/2 by
    /// convention (400ms for the default 5s retention). Unlike the
    /// source this sweeper is attached to a cancellation signal tied to
    /// process shutdown.
    pub fn spawn_sweeper(&self, period: Duration, cancellation: CancellationToken) {
        let map = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    () = cancellation.cancelled() => {
                        debug!("otp sweeper stopping");
                        return;
                    }
                    _ = interval.tick() => {
                        map.sweep().await;
                    }
                }
            }
        });
    }
}

fn generate_key() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Extracts the `otp` query parameter. An absent or empty value fails
/// with `missing-token`.
pub fn decode_token(otp: Option<String>) -> Result<Token, AuthError> {
    match otp {
        Some(key) if !key.is_empty() => Ok(Token { key }),
        _ => Err(AuthError::MissingToken),
    }
}
