use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::CredentialError;

/// The three flavors of ephemeral code the product mints.
///
/// One record shape covers all three; redemption differs only in the
/// eligibility rule applied per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    /// Class check-in code: one teacher session, many holders.
    Attendance,
    /// Class enrollment code: long-lived, redemption grants membership.
    Join,
    /// Per-student QR token: single use, self-issued.
    Personal,
}

impl CredentialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKind::Attendance => "attendance",
            CredentialKind::Join => "join",
            CredentialKind::Personal => "personal",
        }
    }
}

/// Derived lifecycle state at a given instant. Never stored — recomputed
/// from `active` and wall-clock time on every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStatus {
    Active,
    Expired,
    Deactivated,
}

/// A minted code with its validity window and redemption history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub id: Uuid,
    pub kind: CredentialKind,
    pub code: String,
    /// Minting principal. `None` for self-issued personal codes.
    pub issuer: Option<Uuid>,
    /// Class group for attendance/join codes; the student for personal codes.
    pub scope: Uuid,
    pub description: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Monotonic: once false, never true again.
    pub active: bool,
    /// Holders who redeemed, each at most once. Ordered by redemption time.
    pub redeemed_by: Vec<Uuid>,
    /// Optimistic-concurrency token; bumped by every mutation.
    pub version: i64,
}

impl Credential {
    pub fn has_redeemed(&self, holder: Uuid) -> bool {
        self.redeemed_by.contains(&holder)
    }
}

/// Validated input for inserting a credential.
///
/// Construction is the only place the `expires_at > issued_at` invariant is
/// checked, so every stored row satisfies it.
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub kind: CredentialKind,
    pub code: String,
    pub issuer: Option<Uuid>,
    pub scope: Uuid,
    pub description: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl NewCredential {
    pub fn new(
        kind: CredentialKind,
        code: String,
        issuer: Option<Uuid>,
        scope: Uuid,
        description: Option<String>,
        issued_at: DateTime<Utc>,
        validity: Duration,
    ) -> Result<Self, CredentialError> {
        if validity <= Duration::zero() {
            return Err(CredentialError::InvalidValidity);
        }
        Ok(Self {
            kind,
            code,
            issuer,
            scope,
            description,
            issued_at,
            expires_at: issued_at + validity,
        })
    }
}
