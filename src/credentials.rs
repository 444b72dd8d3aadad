//! Named broker identities
//!
//! Each identity is an access-key/secret pair registered under a label. Scenarios refer to
//! identities by label only; the registry is the single place secrets live during a run.

use crate::error::{ProbeError, Result};
use std::collections::HashMap;
use std::fmt;

/// An access-key/secret pair known under a label
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub label: String,
    pub access_key: String,
    pub secret_key: String,
}

impl Credential {
    pub fn new(
        label: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }
}

// Secrets must never reach logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("label", &self.label)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Label-keyed store of credentials
#[derive(Debug, Clone, Default)]
pub struct CredentialRegistry {
    credentials: HashMap<String, Credential>,
    /// Declared labels that cannot be used, with the missing field(s)
    incomplete: HashMap<String, String>,
}

impl CredentialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a credential. A label registered twice keeps the last value.
    pub fn register(
        &mut self,
        label: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) {
        let credential = Credential::new(label, access_key, secret_key);
        self.incomplete.remove(&credential.label);
        self.credentials.insert(credential.label.clone(), credential);
    }

    /// Record a declared label that lacks `missing`. Resolving it fails with
    /// [`ProbeError::IncompleteCredential`] instead of `UnknownCredential`.
    pub fn register_incomplete(&mut self, label: impl Into<String>, missing: impl Into<String>) {
        let label = label.into();
        self.credentials.remove(&label);
        self.incomplete.insert(label, missing.into());
    }

    pub fn resolve(&self, label: &str) -> Result<&Credential> {
        if let Some(credential) = self.credentials.get(label) {
            return Ok(credential);
        }

        match self.incomplete.get(label) {
            Some(missing) => Err(ProbeError::IncompleteCredential {
                label: label.to_string(),
                missing: missing.clone(),
            }),
            None => Err(ProbeError::UnknownCredential(label.to_string())),
        }
    }

    pub fn contains(&self, label: &str) -> bool {
        self.credentials.contains_key(label)
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Registered labels in sorted order
    pub fn labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = self.credentials.keys().map(String::as_str).collect();
        labels.sort_unstable();
        labels
    }
}
