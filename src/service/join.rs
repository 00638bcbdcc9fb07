//! Class-join-code flow.
//!
//! Issuance is idempotent: a live join code is handed back unchanged, so a
//! teacher re-opening the share dialog sees the same code all term. Only a
//! stale (expired or deactivated) code is replaced. Redemption provisions
//! unknown holders on first use and grants scope membership — the one path
//! where eligibility is satisfied by the act of redemption itself.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::errors::CredentialError;
use crate::expiry;
use crate::minter::CodeMinter;
use crate::models::{Credential, CredentialKind, CredentialStatus, NewCredential};
use crate::redeem::RedemptionCoordinator;
use crate::roster::{HolderDirectory, JoinIdentity, Roster};
use crate::store::CredentialStore;

pub const DEFAULT_JOIN_VALIDITY_DAYS: i64 = 30;

#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub credential: Credential,
    pub holder: Uuid,
    /// Whether redemption created the holder record.
    pub newly_created: bool,
}

pub struct JoinService {
    store: Arc<dyn CredentialStore>,
    roster: Arc<dyn Roster>,
    directory: Arc<dyn HolderDirectory>,
    coordinator: RedemptionCoordinator,
    validity: Duration,
}

impl JoinService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        roster: Arc<dyn Roster>,
        directory: Arc<dyn HolderDirectory>,
    ) -> Self {
        Self::with_validity(store, roster, directory, Duration::days(DEFAULT_JOIN_VALIDITY_DAYS))
    }

    pub fn with_validity(
        store: Arc<dyn CredentialStore>,
        roster: Arc<dyn Roster>,
        directory: Arc<dyn HolderDirectory>,
        validity: Duration,
    ) -> Self {
        let coordinator = RedemptionCoordinator::new(store.clone(), roster.clone());
        Self {
            store,
            roster,
            directory,
            coordinator,
            validity,
        }
    }

    /// Get-or-mint the join code for a class.
    pub async fn issue_join_code(
        &self,
        scope: Uuid,
        issuer: Uuid,
    ) -> Result<Credential, CredentialError> {
        let now = Utc::now();
        if let Some(existing) = self
            .store
            .find_active_by_scope(scope, CredentialKind::Join)
            .await?
        {
            if expiry::status(&existing, now) == CredentialStatus::Active {
                return Ok(existing);
            }
        }

        // Stale or absent: replace. `insert_superseding` also flips the
        // expired-but-still-flagged-active row off.
        let code = CodeMinter::mint(self.store.as_ref(), CredentialKind::Join).await?;
        let new = NewCredential::new(
            CredentialKind::Join,
            code,
            Some(issuer),
            scope,
            None,
            now,
            self.validity,
        )?;
        let credential = self.store.insert_superseding(new).await?;
        tracing::info!(code = %credential.code, scope = %scope, "join code issued");
        Ok(credential)
    }

    /// The class's current join code, if it is live.
    pub async fn join_info(
        &self,
        scope: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Credential>, CredentialError> {
        let found = self
            .store
            .find_active_by_scope(scope, CredentialKind::Join)
            .await?;
        Ok(found.filter(|c| expiry::status(c, now) == CredentialStatus::Active))
    }

    /// Redeem a join code, provisioning the holder on first use.
    ///
    /// The code is validated before the directory is touched, so an invalid
    /// code never creates a holder record. Enrollment is the point of the
    /// flow — unlike the attendance ledger write, a failure here surfaces.
    pub async fn redeem_join(
        &self,
        code: &str,
        identity: &JoinIdentity,
        now: DateTime<Utc>,
    ) -> Result<JoinOutcome, CredentialError> {
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

        let provisioned = self.directory.resolve_or_provision(identity).await?;

        // Already enrolled — by this code or any other route.
        if self
            .roster
            .is_member(credential.scope, provisioned.id)
            .await?
        {
            return Err(CredentialError::AlreadyRedeemed);
        }

        let credential = self.coordinator.redeem(code, provisioned.id, now).await?;
        self.roster.enroll(credential.scope, provisioned.id).await?;

        tracing::info!(
            code = %credential.code,
            scope = %credential.scope,
            holder = %provisioned.id,
            new_holder = provisioned.newly_created,
            "holder joined class via join code"
        );

        Ok(JoinOutcome {
            credential,
            holder: provisioned.id,
            newly_created: provisioned.newly_created,
        })
    }
}
