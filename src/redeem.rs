//! Redemption coordination — the concurrency-sensitive core.
//!
//! The naive shape (read the holder set, check in application code, write
//! it back) loses updates under concurrent redemption. Here the duplicate
//! check and the insert happen inside the store's own per-credential
//! critical section, backed by a uniqueness guarantee on
//! `(credential, holder)`; the coordinator re-reads and retries a bounded
//! number of times when the record was deactivated underneath it. Attempts
//! on different credentials never contend; attempts on the same one
//! serialize inside the store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::CredentialError;
use crate::expiry;
use crate::models::{Credential, CredentialKind, CredentialStatus};
use crate::roster::Roster;
use crate::store::{AppendOutcome, CredentialStore};

pub const DEFAULT_REDEEM_RETRIES: u32 = 3;

pub struct RedemptionCoordinator {
    store: Arc<dyn CredentialStore>,
    roster: Arc<dyn Roster>,
    max_retries: u32,
}

impl RedemptionCoordinator {
    pub fn new(store: Arc<dyn CredentialStore>, roster: Arc<dyn Roster>) -> Self {
        Self::with_retries(store, roster, DEFAULT_REDEEM_RETRIES)
    }

    pub fn with_retries(
        store: Arc<dyn CredentialStore>,
        roster: Arc<dyn Roster>,
        max_retries: u32,
    ) -> Self {
        Self {
            store,
            roster,
            max_retries,
        }
    }

    /// Redeem `code` for `holder` at instant `now`.
    ///
    /// Returns the post-redemption snapshot on success. Every failure mode
    /// is a typed `CredentialError`; only storage unavailability is opaque.
    pub async fn redeem(
        &self,
        code: &str,
        holder: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Credential, CredentialError> {
        // One initial attempt plus `max_retries` re-reads on append races.
        for attempt in 0..=self.max_retries {
            let credential = self
                .store
                .find_by_code(code)
                .await?
                .ok_or(CredentialError::NotFound)?;

            match expiry::status(&credential, now) {
                CredentialStatus::Expired => return Err(CredentialError::Expired),
                CredentialStatus::Deactivated => return Err(CredentialError::Deactivated),
                CredentialStatus::Active => {}
            }

            self.check_eligibility(&credential, holder).await?;

            if credential.has_redeemed(holder) {
                return Err(CredentialError::AlreadyRedeemed);
            }

            match self.store.append_redemption(credential.id, holder).await? {
                AppendOutcome::Applied(updated) => {
                    tracing::info!(
                        code = %updated.code,
                        kind = updated.kind.as_str(),
                        holder = %holder,
                        redeemed = updated.redeemed_by.len(),
                        "credential redeemed"
                    );
                    return Ok(updated);
                }
                AppendOutcome::Duplicate => return Err(CredentialError::AlreadyRedeemed),
                AppendOutcome::Conflict => {
                    tracing::debug!(
                        code = %credential.code,
                        holder = %holder,
                        attempt = attempt,
                        "redemption raced a concurrent update, re-reading"
                    );
                }
            }
        }
        Err(CredentialError::TransientConflict)
    }

    /// Step-3 eligibility, per kind:
    /// - attendance codes require pre-existing scope membership;
    /// - join codes grant membership by redemption, so the check is
    ///   trivially satisfied;
    /// - personal codes identify their own scope, so only that holder
    ///   may redeem.
    async fn check_eligibility(
        &self,
        credential: &Credential,
        holder: Uuid,
    ) -> Result<(), CredentialError> {
        match credential.kind {
            CredentialKind::Attendance => {
                if !self.roster.is_member(credential.scope, holder).await? {
                    return Err(CredentialError::NotEligible);
                }
            }
            CredentialKind::Join => {}
            CredentialKind::Personal => {
                if holder != credential.scope {
                    return Err(CredentialError::NotEligible);
                }
            }
        }
        Ok(())
    }
}
