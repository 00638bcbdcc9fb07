//! Integration tests for the attendance-code flow.
//!
//! These tests verify:
//! 1. The canonical session timeline: success, double-tap, non-member, and
//!    post-expiry redemption against one session
//! 2. Session supersession and idempotent end-session
//! 3. Absentee derivation partitions the roster
//! 4. Ledger side records are best-effort and never fail a check-in
//!
//! Everything runs against the in-memory store; no external services.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use rollcall::errors::CredentialError;
use rollcall::expiry;
use rollcall::ledger::{AttendanceLedger, MemoryLedger};
use rollcall::models::CredentialStatus;
use rollcall::roster::{MemoryRoster, Roster};
use rollcall::service::AttendanceService;
use rollcall::store::memory::MemoryStore;
use rollcall::store::CredentialStore;

struct Fixture {
    store: Arc<MemoryStore>,
    ledger: Arc<MemoryLedger>,
    service: AttendanceService,
    scope: Uuid,
    teacher: Uuid,
}

async fn fixture(members: &[Uuid]) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let roster = Arc::new(MemoryRoster::new());
    let ledger = Arc::new(MemoryLedger::new());
    let scope = Uuid::new_v4();
    for &m in members {
        roster.enroll(scope, m).await.unwrap();
    }
    let service = AttendanceService::new(store.clone(), roster, ledger.clone());
    Fixture {
        store,
        ledger,
        service,
        scope,
        teacher: Uuid::new_v4(),
    }
}

mod scenario_tests {
    use super::*;

    /// Mint at T0 with a 10-minute window, then walk the timeline of
    /// redemption attempts.
    #[tokio::test]
    async fn redemption_timeline() {
        let alice = Uuid::new_v4();
        let outsider = Uuid::new_v4();
        let fx = fixture(&[alice]).await;

        let cred = fx
            .service
            .open_session(fx.scope, fx.teacher, "monday lecture", 10)
            .await
            .unwrap();
        let t0 = cred.issued_at;

        // T0+1min: member checks in
        let snap = fx
            .service
            .check_in(&cred.code, alice, t0 + Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(snap.redeemed_by, vec![alice]);

        // T0+2min: same member again
        let err = fx
            .service
            .check_in(&cred.code, alice, t0 + Duration::minutes(2))
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::AlreadyRedeemed));

        // T0+3min: holder outside the class
        let err = fx
            .service
            .check_in(&cred.code, outsider, t0 + Duration::minutes(3))
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::NotEligible));

        // T0+11min: anyone at all
        let err = fx
            .service
            .check_in(&cred.code, alice, t0 + Duration::minutes(11))
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::Expired));
    }

    #[tokio::test]
    async fn unknown_code_is_not_found() {
        let fx = fixture(&[]).await;
        let err = fx
            .service
            .check_in("NOSUCHCODE", Uuid::new_v4(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::NotFound));
    }

    #[tokio::test]
    async fn zero_minute_session_is_rejected() {
        let fx = fixture(&[]).await;
        let err = fx
            .service
            .open_session(fx.scope, fx.teacher, "instant", 0)
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::InvalidValidity));
    }
}

mod session_lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn new_session_supersedes_the_old_one() {
        let student = Uuid::new_v4();
        let fx = fixture(&[student]).await;

        let first = fx
            .service
            .open_session(fx.scope, fx.teacher, "first", 10)
            .await
            .unwrap();
        let second = fx
            .service
            .open_session(fx.scope, fx.teacher, "second", 10)
            .await
            .unwrap();
        assert_ne!(first.code, second.code);

        // the first session's code is dead
        let err = fx
            .service
            .check_in(&first.code, student, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::Deactivated));

        // the second works
        fx.service
            .check_in(&second.code, student, Utc::now())
            .await
            .unwrap();

        let active = fx
            .service
            .active_session(fx.scope, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.id, second.id);

        let history = fx.service.session_history(fx.scope).await.unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn end_session_is_terminal_and_idempotent() {
        let student = Uuid::new_v4();
        let fx = fixture(&[student]).await;

        let cred = fx
            .service
            .open_session(fx.scope, fx.teacher, "ended early", 10)
            .await
            .unwrap();

        fx.service.end_session(cred.id).await.unwrap();
        // twice is fine
        fx.service.end_session(cred.id).await.unwrap();

        // deactivation is reported even after the window would have lapsed
        let later = fx.store.find_by_id(cred.id).await.unwrap().unwrap();
        assert_eq!(
            expiry::status(&later, cred.expires_at + Duration::hours(1)),
            CredentialStatus::Deactivated
        );

        let err = fx
            .service
            .check_in(&cred.code, student, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::Deactivated));

        // unknown id is the only failure
        let err = fx.service.end_session(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, CredentialError::NotFound));
    }
}

mod absentee_tests {
    use super::*;
    use std::collections::HashSet;

    #[tokio::test]
    async fn absentees_and_redeemers_partition_the_roster() {
        let members: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
        let fx = fixture(&members).await;

        let cred = fx
            .service
            .open_session(fx.scope, fx.teacher, "partition", 10)
            .await
            .unwrap();
        for &m in &members[..2] {
            fx.service.check_in(&cred.code, m, Utc::now()).await.unwrap();
        }

        let cred = fx.store.find_by_id(cred.id).await.unwrap().unwrap();
        let absent = fx.service.absentees(&cred).await.unwrap();

        let absent: HashSet<Uuid> = absent.into_iter().collect();
        let redeemed: HashSet<Uuid> = cred.redeemed_by.iter().copied().collect();
        let all: HashSet<Uuid> = members.iter().copied().collect();

        assert!(absent.is_disjoint(&redeemed));
        assert_eq!(
            absent.union(&redeemed).copied().collect::<HashSet<_>>(),
            all
        );
    }

    #[tokio::test]
    async fn fresh_session_has_everyone_absent() {
        let members: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let fx = fixture(&members).await;
        let cred = fx
            .service
            .open_session(fx.scope, fx.teacher, "nobody yet", 10)
            .await
            .unwrap();
        let absent = fx.service.absentees(&cred).await.unwrap();
        assert_eq!(absent.len(), members.len());
    }
}

mod ledger_tests {
    use super::*;

    /// Ledger sink that always fails, standing in for a down reporting
    /// subsystem.
    struct BrokenLedger;

    #[async_trait]
    impl AttendanceLedger for BrokenLedger {
        async fn append_fact(
            &self,
            _holder: Uuid,
            _scope: Uuid,
            _present: bool,
            _note: &str,
        ) -> anyhow::Result<()> {
            anyhow::bail!("reporting database unavailable")
        }
    }

    #[tokio::test]
    async fn successful_check_in_writes_a_fact() {
        let student = Uuid::new_v4();
        let fx = fixture(&[student]).await;
        let cred = fx
            .service
            .open_session(fx.scope, fx.teacher, "standup", 10)
            .await
            .unwrap();

        fx.service
            .check_in(&cred.code, student, Utc::now())
            .await
            .unwrap();

        let facts = fx.ledger.facts_for(fx.scope);
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].holder, student);
        assert!(facts[0].present);
        assert!(facts[0].note.contains("standup"));
    }

    #[tokio::test]
    async fn ledger_failure_does_not_fail_the_check_in() {
        let store = Arc::new(MemoryStore::new());
        let roster = Arc::new(MemoryRoster::new());
        let scope = Uuid::new_v4();
        let student = Uuid::new_v4();
        roster.enroll(scope, student).await.unwrap();
        let service = AttendanceService::new(store.clone(), roster, Arc::new(BrokenLedger));

        let cred = service
            .open_session(scope, Uuid::new_v4(), "ledger down", 10)
            .await
            .unwrap();
        let snap = service
            .check_in(&cred.code, student, Utc::now())
            .await
            .unwrap();

        // the redemption stands even though the side record was lost
        assert_eq!(snap.redeemed_by, vec![student]);
        let stored = store.find_by_id(cred.id).await.unwrap().unwrap();
        assert_eq!(stored.redeemed_by, vec![student]);
    }
}
