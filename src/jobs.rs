//! Background job: sweep lapsed personal QR tokens.
//!
//! Expiry itself is passive — every read derives it from the clock — so
//! this task only bounds the number of flag-active rows. Attendance and
//! join credentials are left alone: their history views distinguish
//! "expired" from "explicitly ended".

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time;

use crate::models::CredentialKind;
use crate::store::CredentialStore;

/// Spawn the sweep task. Call this once at startup.
pub fn spawn(store: Arc<dyn CredentialStore>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = time::interval(every);
        loop {
            interval.tick().await;
            match store
                .deactivate_expired(CredentialKind::Personal, Utc::now())
                .await
            {
                Ok(0) => {}
                Ok(swept) => {
                    tracing::info!(rows = swept, "swept lapsed personal tokens");
                }
                Err(e) => {
                    tracing::error!("personal token sweep failed: {}", e);
                }
            }
        }
    });
}
