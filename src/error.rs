//! Application error types and result alias.

use thiserror::Error;

/// Application result type alias
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types.
///
/// Most variants are local, recoverable domain conditions the caller is
/// expected to handle and render. `Settlement`, `Storage`, and `Internal`
/// signal collaborator outages and carry no domain meaning; see
/// [`AppError::is_domain`].
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Access code does not exist or has been deactivated
    #[error("Access code not found: {0}")]
    CodeNotFound(String),

    /// Access code is past its expiry timestamp
    #[error("Access code expired: {0}")]
    CodeExpired(String),

    /// Access code already bound to a different consumer
    #[error("Access code already redeemed: {0}")]
    CodeAlreadyRedeemed(String),

    /// Not enough remaining quota on the code
    #[error("Quota exceeded on code {code}: requested {requested_mb:.2} MB, {remaining_mb:.2} MB remaining")]
    QuotaExceeded {
        code: String,
        requested_mb: f64,
        remaining_mb: f64,
    },

    /// Peer is not known to the registry
    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    /// Session does not exist
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Session is not in the active state
    #[error("Session not active: {0}")]
    SessionNotActive(String),

    /// Session has reached its connected-user capacity
    #[error("Session full: {0}")]
    SessionFull(String),

    /// User is already connected to the session
    #[error("User {user_id} already joined session {session_id}")]
    AlreadyJoined { session_id: String, user_id: String },

    /// Emergency message does not exist
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// Location with lat/lng is required for this operation
    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    /// Settlement oracle call failed (retryable, never fatal to the caller)
    #[error("Settlement failed: {0}")]
    Settlement(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Persistence collaborator failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// True for domain conditions the caller can handle; false for
    /// collaborator failures (config, settlement oracle, storage) that
    /// should surface as a generic outage and are worth retrying.
    pub fn is_domain(&self) -> bool {
        !matches!(
            self,
            AppError::Config(_)
                | AppError::Settlement(_)
                | AppError::Storage(_)
                | AppError::Internal(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_separates_domain_from_collaborator_failures() {
        assert!(AppError::PeerNotFound("p".into()).is_domain());
        assert!(AppError::CodeExpired("c".into()).is_domain());
        assert!(AppError::SessionFull("s".into()).is_domain());
        assert!(!AppError::Settlement("oracle down".into()).is_domain());
        assert!(!AppError::Storage("engine down".into()).is_domain());
    }
}
