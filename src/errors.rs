use thiserror::Error;

/// Typed outcomes of credential issuance and redemption.
///
/// Everything except `Storage` is a recoverable-by-caller condition: the
/// coordinator returns these as values of the protocol, not as faults.
/// `Storage` wraps backend unavailability and is propagated unchanged.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("no credential for that code")]
    NotFound,

    #[error("credential expired")]
    Expired,

    #[error("credential deactivated")]
    Deactivated,

    #[error("holder is not a member of the credential's scope")]
    NotEligible,

    #[error("holder already redeemed this credential")]
    AlreadyRedeemed,

    #[error("identity conflict: {0}")]
    Conflict(String),

    #[error("concurrent updates exhausted the retry budget")]
    TransientConflict,

    #[error("validity window must be positive")]
    InvalidValidity,

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl CredentialError {
    /// True for conditions the caller can act on without operator help.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, CredentialError::Storage(_))
    }
}
