use thiserror::Error;

/// Failure modes of the OTP / credential exchange.
///
/// `invalid-token` covers both the source spec's `not-found` and
/// `expired` cases — callers never need to distinguish them, since both
/// translate to the same refused upgrade (see spec §7).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing otp token")]
    MissingToken,
    #[error("invalid or expired otp token")]
    InvalidToken,
    #[error("invalid credentials")]
    CredentialInvalid,
}

/// Failure modes of registrar mutations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    #[error("receiver already present")]
    AlreadyPresent,
    #[error("receiver not present")]
    NotPresent,
}
