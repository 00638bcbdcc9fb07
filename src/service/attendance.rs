//! Attendance-code flow.
//!
//! A session is one attendance credential: the teacher opens it, students
//! check in against it, and it ends by explicit deactivation or by its
//! window lapsing. Opening a new session always supersedes the previous
//! one — two live check-in codes for the same class would be ambiguous.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::errors::CredentialError;
use crate::expiry;
use crate::ledger::AttendanceLedger;
use crate::minter::CodeMinter;
use crate::models::{Credential, CredentialKind, CredentialStatus, NewCredential};
use crate::redeem::RedemptionCoordinator;
use crate::roster::Roster;
use crate::store::CredentialStore;

pub struct AttendanceService {
    store: Arc<dyn CredentialStore>,
    roster: Arc<dyn Roster>,
    ledger: Arc<dyn AttendanceLedger>,
    coordinator: RedemptionCoordinator,
}

impl AttendanceService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        roster: Arc<dyn Roster>,
        ledger: Arc<dyn AttendanceLedger>,
    ) -> Self {
        let coordinator = RedemptionCoordinator::new(store.clone(), roster.clone());
        Self {
            store,
            roster,
            ledger,
            coordinator,
        }
    }

    /// Open a check-in session for a class. Any still-active session for
    /// the same class is deactivated in the same store operation.
    pub async fn open_session(
        &self,
        scope: Uuid,
        issuer: Uuid,
        description: &str,
        valid_minutes: u32,
    ) -> Result<Credential, CredentialError> {
        if valid_minutes == 0 {
            return Err(CredentialError::InvalidValidity);
        }
        let code = CodeMinter::mint(self.store.as_ref(), CredentialKind::Attendance).await?;
        let new = NewCredential::new(
            CredentialKind::Attendance,
            code,
            Some(issuer),
            scope,
            Some(description.to_string()),
            Utc::now(),
            Duration::minutes(i64::from(valid_minutes)),
        )?;
        let credential = self.store.insert_superseding(new).await?;
        tracing::info!(
            code = %credential.code,
            scope = %scope,
            valid_minutes = valid_minutes,
            "attendance session opened"
        );
        Ok(credential)
    }

    /// End a session early. Idempotent — ending an already-ended or
    /// already-expired session is not an error.
    pub async fn end_session(&self, id: Uuid) -> Result<(), CredentialError> {
        if !self.store.deactivate(id).await? {
            return Err(CredentialError::NotFound);
        }
        Ok(())
    }

    /// Student check-in. On success a side record is appended to the plain
    /// attendance ledger; that write is best-effort and never rolls back
    /// the redemption.
    pub async fn check_in(
        &self,
        code: &str,
        holder: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Credential, CredentialError> {
        let credential = self.coordinator.redeem(code, holder, now).await?;

        let note = match &credential.description {
            Some(desc) => format!("checked in via attendance code: {desc}"),
            None => "checked in via attendance code".to_string(),
        };
        if let Err(e) = self
            .ledger
            .append_fact(holder, credential.scope, true, &note)
            .await
        {
            tracing::warn!(
                code = %credential.code,
                holder = %holder,
                error = %e,
                "attendance fact append failed; check-in stands"
            );
        }

        Ok(credential)
    }

    /// Class members who have not redeemed the session credential.
    /// Together with `redeemed_by` this partitions the class roster.
    pub async fn absentees(&self, credential: &Credential) -> Result<Vec<Uuid>, CredentialError> {
        let redeemed: HashSet<Uuid> = credential.redeemed_by.iter().copied().collect();
        let mut absent: Vec<Uuid> = self
            .roster
            .members(credential.scope)
            .await?
            .into_iter()
            .filter(|m| !redeemed.contains(m))
            .collect();
        absent.sort();
        Ok(absent)
    }

    /// The live session for a class, if one exists right now.
    pub async fn active_session(
        &self,
        scope: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Credential>, CredentialError> {
        let found = self
            .store
            .find_active_by_scope(scope, CredentialKind::Attendance)
            .await?;
        Ok(found.filter(|c| expiry::status(c, now) == CredentialStatus::Active))
    }

    /// Every session ever opened for a class, newest first.
    pub async fn session_history(&self, scope: Uuid) -> Result<Vec<Credential>, CredentialError> {
        Ok(self
            .store
            .list_by_scope(scope, CredentialKind::Attendance)
            .await?)
    }
}
