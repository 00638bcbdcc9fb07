//! External collaborator seams: class membership and holder identity.
//!
//! The credential core consults the roster but does not own it. The join
//! flow additionally writes through `enroll`, since redeeming a join code
//! is what grants membership.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;
use uuid::Uuid;

use crate::errors::CredentialError;

/// Class-membership relation, supplied by the roster subsystem.
#[async_trait]
pub trait Roster: Send + Sync {
    async fn is_member(&self, scope: Uuid, holder: Uuid) -> anyhow::Result<bool>;

    /// All members of a scope. Needed to derive absentees.
    async fn members(&self, scope: Uuid) -> anyhow::Result<Vec<Uuid>>;

    /// Add a holder to a scope. Idempotent.
    async fn enroll(&self, scope: Uuid, holder: Uuid) -> anyhow::Result<()>;
}

/// Identity submitted by a holder redeeming a join code: a login name, an
/// external student number, and an opaque secret the surrounding app has
/// already hashed or will verify itself.
#[derive(Debug, Clone)]
pub struct JoinIdentity {
    pub username: String,
    pub student_number: String,
    pub secret: String,
}

#[derive(Debug, Clone, Copy)]
pub struct ProvisionedHolder {
    pub id: Uuid,
    pub newly_created: bool,
}

/// Create-or-fetch-by-name holder provisioning, used only by the join flow.
///
/// Implementations must reject with `Conflict` when the username exists
/// under a different secret, or the student number is already claimed by a
/// different holder.
#[async_trait]
pub trait HolderDirectory: Send + Sync {
    async fn resolve_or_provision(
        &self,
        identity: &JoinIdentity,
    ) -> Result<ProvisionedHolder, CredentialError>;
}

// ── In-memory implementations (tests, embedded deployments) ──

#[derive(Default)]
pub struct MemoryRoster {
    memberships: DashMap<Uuid, HashSet<Uuid>>,
}

impl MemoryRoster {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Roster for MemoryRoster {
    async fn is_member(&self, scope: Uuid, holder: Uuid) -> anyhow::Result<bool> {
        Ok(self
            .memberships
            .get(&scope)
            .map(|m| m.contains(&holder))
            .unwrap_or(false))
    }

    async fn members(&self, scope: Uuid) -> anyhow::Result<Vec<Uuid>> {
        Ok(self
            .memberships
            .get(&scope)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn enroll(&self, scope: Uuid, holder: Uuid) -> anyhow::Result<()> {
        self.memberships.entry(scope).or_default().insert(holder);
        Ok(())
    }
}

struct HolderRecord {
    id: Uuid,
    student_number: String,
    secret: String,
}

#[derive(Default)]
pub struct MemoryDirectory {
    by_username: DashMap<String, HolderRecord>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HolderDirectory for MemoryDirectory {
    async fn resolve_or_provision(
        &self,
        identity: &JoinIdentity,
    ) -> Result<ProvisionedHolder, CredentialError> {
        if let Some(existing) = self.by_username.get(&identity.username) {
            if existing.secret != identity.secret {
                return Err(CredentialError::Conflict(format!(
                    "username '{}' already exists with different credentials",
                    identity.username
                )));
            }
            return Ok(ProvisionedHolder {
                id: existing.id,
                newly_created: false,
            });
        }

        let number_taken = self
            .by_username
            .iter()
            .any(|r| r.student_number == identity.student_number);
        if number_taken {
            return Err(CredentialError::Conflict(format!(
                "student number '{}' is already registered",
                identity.student_number
            )));
        }

        let id = Uuid::new_v4();
        self.by_username.insert(
            identity.username.clone(),
            HolderRecord {
                id,
                student_number: identity.student_number.clone(),
                secret: identity.secret.clone(),
            },
        );
        Ok(ProvisionedHolder {
            id,
            newly_created: true,
        })
    }
}
