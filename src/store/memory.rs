//! In-memory credential store.
//!
//! Backed by DashMap. A `get_mut` ref holds the shard write lock, so every
//! mutation of one record is a critical section without an explicit mutex;
//! `append_redemption` checks and appends under that lock, matching the
//! conditional-update semantics the Postgres backend gets from its
//! transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use super::{AppendOutcome, CredentialStore};
use crate::models::{Credential, CredentialKind, NewCredential};

#[derive(Default)]
pub struct MemoryStore {
    records: DashMap<Uuid, Credential>,
    by_code: DashMap<String, Uuid>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn materialize(new: NewCredential) -> Credential {
        Credential {
            id: Uuid::new_v4(),
            kind: new.kind,
            code: new.code,
            issuer: new.issuer,
            scope: new.scope,
            description: new.description,
            issued_at: new.issued_at,
            expires_at: new.expires_at,
            active: true,
            redeemed_by: Vec::new(),
            version: 0,
        }
    }

    fn insert_record(&self, credential: Credential) -> anyhow::Result<Credential> {
        match self.by_code.entry(credential.code.clone()) {
            Entry::Occupied(_) => anyhow::bail!("code '{}' already in use", credential.code),
            Entry::Vacant(slot) => {
                slot.insert(credential.id);
            }
        }
        self.records.insert(credential.id, credential.clone());
        Ok(credential)
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn insert(&self, new: NewCredential) -> anyhow::Result<Credential> {
        self.insert_record(Self::materialize(new))
    }

    async fn insert_superseding(&self, new: NewCredential) -> anyhow::Result<Credential> {
        for mut rec in self.records.iter_mut() {
            if rec.scope == new.scope && rec.kind == new.kind && rec.active {
                rec.active = false;
                rec.version += 1;
            }
        }
        self.insert_record(Self::materialize(new))
    }

    async fn find_by_code(&self, code: &str) -> anyhow::Result<Option<Credential>> {
        let Some(id) = self.by_code.get(code).map(|r| *r) else {
            return Ok(None);
        };
        Ok(self.records.get(&id).map(|r| r.clone()))
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Credential>> {
        Ok(self.records.get(&id).map(|r| r.clone()))
    }

    async fn find_active_by_scope(
        &self,
        scope: Uuid,
        kind: CredentialKind,
    ) -> anyhow::Result<Option<Credential>> {
        Ok(self
            .records
            .iter()
            .find(|r| r.scope == scope && r.kind == kind && r.active)
            .map(|r| r.clone()))
    }

    async fn list_by_scope(
        &self,
        scope: Uuid,
        kind: CredentialKind,
    ) -> anyhow::Result<Vec<Credential>> {
        let mut rows: Vec<Credential> = self
            .records
            .iter()
            .filter(|r| r.scope == scope && r.kind == kind)
            .map(|r| r.clone())
            .collect();
        rows.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
        Ok(rows)
    }

    async fn list_by_issuer(&self, issuer: Uuid) -> anyhow::Result<Vec<Credential>> {
        let mut rows: Vec<Credential> = self
            .records
            .iter()
            .filter(|r| r.issuer == Some(issuer))
            .map(|r| r.clone())
            .collect();
        rows.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
        Ok(rows)
    }

    async fn code_in_use(&self, code: &str) -> anyhow::Result<bool> {
        Ok(self.by_code.contains_key(code))
    }

    async fn deactivate(&self, id: Uuid) -> anyhow::Result<bool> {
        match self.records.get_mut(&id) {
            Some(mut rec) => {
                if rec.active {
                    rec.active = false;
                    rec.version += 1;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn deactivate_if_active(&self, id: Uuid) -> anyhow::Result<bool> {
        match self.records.get_mut(&id) {
            Some(mut rec) if rec.active => {
                rec.active = false;
                rec.version += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn append_redemption(&self, id: Uuid, holder: Uuid) -> anyhow::Result<AppendOutcome> {
        // The mutable ref is the lock: nothing else can touch this record
        // until it drops, so the duplicate check and the push are one
        // critical section.
        let Some(mut rec) = self.records.get_mut(&id) else {
            return Ok(AppendOutcome::Conflict);
        };
        if !rec.active {
            return Ok(AppendOutcome::Conflict);
        }
        if rec.redeemed_by.contains(&holder) {
            return Ok(AppendOutcome::Duplicate);
        }
        rec.redeemed_by.push(holder);
        rec.version += 1;
        Ok(AppendOutcome::Applied(rec.clone()))
    }

    async fn deactivate_expired(
        &self,
        kind: CredentialKind,
        now: DateTime<Utc>,
    ) -> anyhow::Result<u64> {
        let mut swept = 0;
        for mut rec in self.records.iter_mut() {
            if rec.kind == kind && rec.active && now >= rec.expires_at {
                rec.active = false;
                rec.version += 1;
                swept += 1;
            }
        }
        Ok(swept)
    }
}
