//! Personal QR codes.
//!
//! Self-issued (`issuer = None`), scoped to the student they identify, and
//! single-use: consuming one is a conditional deactivate, so a scanned code
//! can never be replayed. `redeemed_by` stays empty for this kind.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::errors::CredentialError;
use crate::expiry;
use crate::minter::CodeMinter;
use crate::models::{Credential, CredentialKind, CredentialStatus, NewCredential};
use crate::store::CredentialStore;

pub const DEFAULT_PERSONAL_VALIDITY_MINUTES: i64 = 10;

pub struct PersonalCodeService {
    store: Arc<dyn CredentialStore>,
    validity: Duration,
}

impl PersonalCodeService {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self::with_validity(store, Duration::minutes(DEFAULT_PERSONAL_VALIDITY_MINUTES))
    }

    pub fn with_validity(store: Arc<dyn CredentialStore>, validity: Duration) -> Self {
        Self { store, validity }
    }

    /// Mint a fresh token for a student. Earlier tokens stay valid until
    /// they are consumed or lapse — each render of the QR screen gets its
    /// own code.
    pub async fn issue(&self, student: Uuid) -> Result<Credential, CredentialError> {
        let token = CodeMinter::mint(self.store.as_ref(), CredentialKind::Personal).await?;
        let new = NewCredential::new(
            CredentialKind::Personal,
            token,
            None,
            student,
            None,
            Utc::now(),
            self.validity,
        )?;
        Ok(self.store.insert(new).await?)
    }

    /// Verify a scanned token and consume it, returning the student it
    /// identifies. A second scan of the same token reports `Deactivated`.
    pub async fn consume(&self, code: &str, now: DateTime<Utc>) -> Result<Uuid, CredentialError> {
        let credential = self
            .store
            .find_by_code(code)
            .await?
            .ok_or(CredentialError::NotFound)?;
        if credential.kind != CredentialKind::Personal {
            return Err(CredentialError::NotFound);
        }
        match expiry::status(&credential, now) {
            CredentialStatus::Expired => return Err(CredentialError::Expired),
            CredentialStatus::Deactivated => return Err(CredentialError::Deactivated),
            CredentialStatus::Active => {}
        }
        // Conditional flip is the single-use guarantee: of two concurrent
        // scans, exactly one performs the deactivation.
        if !self.store.deactivate_if_active(credential.id).await? {
            return Err(CredentialError::Deactivated);
        }
        Ok(credential.scope)
    }

    /// Deactivate lapsed tokens. Housekeeping only — `consume` already
    /// rejects expired tokens from time alone.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, CredentialError> {
        Ok(self
            .store
            .deactivate_expired(CredentialKind::Personal, now)
            .await?)
    }
}
