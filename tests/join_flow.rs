//! Integration tests for the class-join-code flow.
//!
//! These tests verify:
//! 1. Idempotent issuance: a live code is reused, a stale one is replaced
//! 2. Provision on first redeem, Conflict on a wrong secret,
//!    AlreadyRedeemed on a second join
//! 3. Redemption grants membership without a pre-existing roster entry
//! 4. Invalid codes never provision a holder

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use rollcall::errors::CredentialError;
use rollcall::roster::{JoinIdentity, MemoryDirectory, MemoryRoster, Roster};
use rollcall::service::JoinService;
use rollcall::store::memory::MemoryStore;
use rollcall::store::CredentialStore;

struct Fixture {
    store: Arc<MemoryStore>,
    roster: Arc<MemoryRoster>,
    service: JoinService,
    scope: Uuid,
    teacher: Uuid,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let roster = Arc::new(MemoryRoster::new());
    let directory = Arc::new(MemoryDirectory::new());
    let service = JoinService::new(store.clone(), roster.clone(), directory);
    Fixture {
        store,
        roster,
        service,
        scope: Uuid::new_v4(),
        teacher: Uuid::new_v4(),
    }
}

fn alice(secret: &str) -> JoinIdentity {
    JoinIdentity {
        username: "alice".into(),
        student_number: "S-1001".into(),
        secret: secret.into(),
    }
}

mod issuance_tests {
    use super::*;

    #[tokio::test]
    async fn live_code_is_reused_unchanged() {
        let fx = fixture();
        let first = fx
            .service
            .issue_join_code(fx.scope, fx.teacher)
            .await
            .unwrap();
        let second = fx
            .service
            .issue_join_code(fx.scope, fx.teacher)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.code, second.code);
        assert_eq!(first.code.len(), 8);
        // weeks, not minutes
        assert!(first.expires_at - first.issued_at >= Duration::days(30));
    }

    #[tokio::test]
    async fn stale_code_is_replaced() {
        let fx = fixture();
        let first = fx
            .service
            .issue_join_code(fx.scope, fx.teacher)
            .await
            .unwrap();

        // simulate the old code going stale
        fx.store.deactivate(first.id).await.unwrap();

        let second = fx
            .service
            .issue_join_code(fx.scope, fx.teacher)
            .await
            .unwrap();
        assert_ne!(first.id, second.id);
        assert_ne!(first.code, second.code);
        assert!(second.active);
    }

    #[tokio::test]
    async fn expired_but_flagged_active_code_is_replaced() {
        let store = Arc::new(MemoryStore::new());
        let roster = Arc::new(MemoryRoster::new());
        let service = JoinService::with_validity(
            store.clone(),
            roster,
            Arc::new(MemoryDirectory::new()),
            Duration::milliseconds(1),
        );
        let scope = Uuid::new_v4();
        let teacher = Uuid::new_v4();

        let first = service.issue_join_code(scope, teacher).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = service.issue_join_code(scope, teacher).await.unwrap();

        assert_ne!(first.id, second.id);
        // the lapsed one was explicitly flipped off during supersession
        assert!(!store.find_by_id(first.id).await.unwrap().unwrap().active);
    }

    #[tokio::test]
    async fn join_info_reports_only_live_codes() {
        let fx = fixture();
        assert!(fx
            .service
            .join_info(fx.scope, Utc::now())
            .await
            .unwrap()
            .is_none());

        let cred = fx
            .service
            .issue_join_code(fx.scope, fx.teacher)
            .await
            .unwrap();
        let info = fx
            .service
            .join_info(fx.scope, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(info.id, cred.id);

        assert!(fx
            .service
            .join_info(fx.scope, cred.expires_at)
            .await
            .unwrap()
            .is_none());
    }
}

mod redemption_tests {
    use super::*;

    /// New identity joins, a wrong secret conflicts, and a repeat join
    /// reports AlreadyRedeemed.
    #[tokio::test]
    async fn provision_conflict_and_repeat() {
        let fx = fixture();
        let cred = fx
            .service
            .issue_join_code(fx.scope, fx.teacher)
            .await
            .unwrap();

        // first redemption provisions alice and enrolls her
        let outcome = fx
            .service
            .redeem_join(&cred.code, &alice("hunter2"), Utc::now())
            .await
            .unwrap();
        assert!(outcome.newly_created);
        assert!(fx
            .roster
            .is_member(fx.scope, outcome.holder)
            .await
            .unwrap());
        assert_eq!(outcome.credential.redeemed_by, vec![outcome.holder]);

        // same username, different secret
        let err = fx
            .service
            .redeem_join(&cred.code, &alice("wrong"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::Conflict(_)));

        // correct secret, but already a member
        let err = fx
            .service
            .redeem_join(&cred.code, &alice("hunter2"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::AlreadyRedeemed));
    }

    #[tokio::test]
    async fn redemption_grants_membership_without_prior_enrollment() {
        let fx = fixture();
        let cred = fx
            .service
            .issue_join_code(fx.scope, fx.teacher)
            .await
            .unwrap();

        let bob = JoinIdentity {
            username: "bob".into(),
            student_number: "S-2002".into(),
            secret: "sekrit".into(),
        };
        // bob is a stranger to the roster; the join code is what lets him in
        let outcome = fx
            .service
            .redeem_join(&cred.code, &bob, Utc::now())
            .await
            .unwrap();
        assert!(fx
            .roster
            .is_member(fx.scope, outcome.holder)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn taken_student_number_conflicts() {
        let fx = fixture();
        let cred = fx
            .service
            .issue_join_code(fx.scope, fx.teacher)
            .await
            .unwrap();

        fx.service
            .redeem_join(&cred.code, &alice("hunter2"), Utc::now())
            .await
            .unwrap();

        // different username, same student number
        let impostor = JoinIdentity {
            username: "alice2".into(),
            student_number: "S-1001".into(),
            secret: "other".into(),
        };
        let err = fx
            .service
            .redeem_join(&cred.code, &impostor, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::Conflict(_)));
    }

    #[tokio::test]
    async fn invalid_code_never_provisions_a_holder() {
        let fx = fixture();
        let err = fx
            .service
            .redeem_join("WRONGCOD", &alice("hunter2"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::NotFound));

        // alice was not created: joining with a *different* secret on a
        // real code would conflict if she had been
        let cred = fx
            .service
            .issue_join_code(fx.scope, fx.teacher)
            .await
            .unwrap();
        let outcome = fx
            .service
            .redeem_join(&cred.code, &alice("fresh-secret"), Utc::now())
            .await
            .unwrap();
        assert!(outcome.newly_created);
    }

    #[tokio::test]
    async fn expired_code_is_rejected() {
        let fx = fixture();
        let cred = fx
            .service
            .issue_join_code(fx.scope, fx.teacher)
            .await
            .unwrap();
        let err = fx
            .service
            .redeem_join(&cred.code, &alice("hunter2"), cred.expires_at)
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::Expired));
    }
}
