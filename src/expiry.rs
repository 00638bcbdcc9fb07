//! Lifecycle state derivation.
//!
//! Expiry is passive: nothing writes an "expired" bit. Every read derives
//! the state from the `active` flag and the clock, so a credential flips to
//! `Expired` exactly at `expires_at` with no timer involved.

use chrono::{DateTime, Utc};

use crate::models::{Credential, CredentialStatus};

/// Compute the lifecycle state of `credential` at `now`.
///
/// Deactivation wins over expiry: an ended session reads `Deactivated`
/// even after its window has also lapsed.
pub fn status(credential: &Credential, now: DateTime<Utc>) -> CredentialStatus {
    if !credential.active {
        CredentialStatus::Deactivated
    } else if now >= credential.expires_at {
        CredentialStatus::Expired
    } else {
        CredentialStatus::Active
    }
}
