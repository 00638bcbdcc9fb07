//! Code generation.
//!
//! Codes are drawn from an uppercase-alphanumeric alphabet so they survive
//! being read aloud or typed from a projected slide. Personal QR tokens are
//! never typed, so they get a full random UUID instead.

use rand::Rng;
use uuid::Uuid;

use crate::errors::CredentialError;
use crate::models::CredentialKind;
use crate::store::CredentialStore;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Bound on regeneration when a candidate collides with a stored code.
/// At 36^8 candidates, hitting this means the store lookup is broken, not
/// that we are unlucky.
const MAX_MINT_ATTEMPTS: u32 = 32;

pub struct CodeMinter;

impl CodeMinter {
    /// Code length per kind. Join codes are shorter because students type
    /// them by hand; attendance codes only ever travel through a QR scan or
    /// copy-paste.
    pub fn code_len(kind: CredentialKind) -> Option<usize> {
        match kind {
            CredentialKind::Join => Some(8),
            CredentialKind::Attendance => Some(10),
            CredentialKind::Personal => None, // full UUID token
        }
    }

    fn candidate(kind: CredentialKind) -> String {
        match Self::code_len(kind) {
            Some(len) => {
                let mut rng = rand::thread_rng();
                (0..len)
                    .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
                    .collect()
            }
            None => Uuid::new_v4().to_string(),
        }
    }

    /// Generate a code that no stored credential holds, active or not.
    /// The stored `code` column is globally unique, so one lookup decides.
    pub async fn mint(
        store: &dyn CredentialStore,
        kind: CredentialKind,
    ) -> Result<String, CredentialError> {
        for _ in 0..MAX_MINT_ATTEMPTS {
            let code = Self::candidate(kind);
            if !store.code_in_use(&code).await? {
                return Ok(code);
            }
            tracing::debug!(kind = kind.as_str(), "minted code collided, regenerating");
        }
        Err(CredentialError::TransientConflict)
    }
}
