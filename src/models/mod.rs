pub mod credential;

pub use credential::{Credential, CredentialKind, CredentialStatus, NewCredential};
