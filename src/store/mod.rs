pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Credential, CredentialKind, NewCredential};

/// Result of the conditional redemption append.
#[derive(Debug)]
pub enum AppendOutcome {
    /// Holder recorded; snapshot reflects the committed state.
    Applied(Credential),
    /// Holder was already in the redemption set. Nothing written.
    Duplicate,
    /// The record was deactivated or removed between the caller's read and
    /// the append. Caller re-reads and decides whether to retry.
    Conflict,
}

/// Abstraction over credential persistence backends.
/// Implementations: MemoryStore (DashMap, tests/embedded), PgStore (Postgres).
///
/// `append_redemption` is the concurrency-sensitive operation: it must be
/// atomic per credential, with duplicate detection backed by the store's own
/// uniqueness guarantee on `(credential, holder)` rather than a read-check-
/// write sequence in application code.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn insert(&self, new: NewCredential) -> anyhow::Result<Credential>;

    /// Deactivate every active credential of the same `(scope, kind)`, then
    /// insert `new` — a single atomic unit, so a fresh session can never
    /// coexist with the one it replaces.
    async fn insert_superseding(&self, new: NewCredential) -> anyhow::Result<Credential>;

    async fn find_by_code(&self, code: &str) -> anyhow::Result<Option<Credential>>;

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Credential>>;

    /// The flag-active credential for a scope/kind, if any. Expiry is not
    /// consulted here; callers derive it via `expiry::status`.
    async fn find_active_by_scope(
        &self,
        scope: Uuid,
        kind: CredentialKind,
    ) -> anyhow::Result<Option<Credential>>;

    /// Full history for a scope/kind, newest first.
    async fn list_by_scope(
        &self,
        scope: Uuid,
        kind: CredentialKind,
    ) -> anyhow::Result<Vec<Credential>>;

    async fn list_by_issuer(&self, issuer: Uuid) -> anyhow::Result<Vec<Credential>>;

    /// Whether any stored credential (active or not) holds this literal
    /// code. Uniqueness is global over the stored column, so the minter
    /// regenerates on any hit.
    async fn code_in_use(&self, code: &str) -> anyhow::Result<bool>;

    /// Set `active = false` unconditionally. Idempotent; returns false only
    /// when no such credential exists.
    async fn deactivate(&self, id: Uuid) -> anyhow::Result<bool>;

    /// Set `active = false` only if currently active. Returns whether this
    /// call performed the flip — the single-use consume primitive.
    async fn deactivate_if_active(&self, id: Uuid) -> anyhow::Result<bool>;

    /// Conditionally record `holder` against the credential: applies only
    /// while the record is still active, with the duplicate check and the
    /// insert inside one per-credential critical section. Appends for
    /// distinct holders never invalidate each other.
    async fn append_redemption(&self, id: Uuid, holder: Uuid) -> anyhow::Result<AppendOutcome>;

    /// Deactivate rows of one kind whose window has lapsed. Purely
    /// housekeeping — expiry is already derived from time on every read.
    async fn deactivate_expired(
        &self,
        kind: CredentialKind,
        now: DateTime<Utc>,
    ) -> anyhow::Result<u64>;
}
