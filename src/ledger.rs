//! Plain attendance ledger seam.
//!
//! Owned by the reporting subsystem. The attendance flow writes a side
//! record here on every successful check-in; the write is fire-and-forget
//! and must never fail the redemption that triggered it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct AttendanceFact {
    pub holder: Uuid,
    pub scope: Uuid,
    pub present: bool,
    pub note: String,
    pub recorded_at: DateTime<Utc>,
}

#[async_trait]
pub trait AttendanceLedger: Send + Sync {
    async fn append_fact(
        &self,
        holder: Uuid,
        scope: Uuid,
        present: bool,
        note: &str,
    ) -> anyhow::Result<()>;
}

/// Collects facts per scope; used by tests and embedded deployments.
#[derive(Default)]
pub struct MemoryLedger {
    facts: DashMap<Uuid, Vec<AttendanceFact>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn facts_for(&self, scope: Uuid) -> Vec<AttendanceFact> {
        self.facts.get(&scope).map(|f| f.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AttendanceLedger for MemoryLedger {
    async fn append_fact(
        &self,
        holder: Uuid,
        scope: Uuid,
        present: bool,
        note: &str,
    ) -> anyhow::Result<()> {
        self.facts.entry(scope).or_default().push(AttendanceFact {
            holder,
            scope,
            present,
            note: note.to_string(),
            recorded_at: Utc::now(),
        });
        Ok(())
    }
}
