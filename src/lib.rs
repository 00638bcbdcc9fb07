//! Rollcall — ephemeral credential engine for class rosters and attendance.
//!
//! Mints short-lived codes (attendance check-in codes, class-join codes,
//! personal QR tokens), tracks their validity windows, and coordinates
//! concurrent redemption with per-credential atomicity. Transport, auth,
//! and reporting live in the surrounding application; this crate exposes
//! the lifecycle and the seams (`Roster`, `HolderDirectory`,
//! `AttendanceLedger`, `BarcodeEncoder`) those layers plug into.

pub mod config;
pub mod errors;
pub mod expiry;
pub mod jobs;
pub mod ledger;
pub mod minter;
pub mod models;
pub mod qr;
pub mod redeem;
pub mod roster;
pub mod service;
pub mod store;

pub use errors::CredentialError;
pub use models::{Credential, CredentialKind, CredentialStatus};
pub use redeem::RedemptionCoordinator;
