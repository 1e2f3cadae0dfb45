//! Per-provider validation status.
//!
//! The whole table lives in one `watch` channel value. Every mutation
//! replaces a single provider entry inside `send_modify`, so readers observe
//! either the previous or the next snapshot and never a partial write.

use std::collections::BTreeMap;

use serde::Serialize;
use tokio::sync::watch;

use crate::errors::ValidationError;
use crate::providers::Provider;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "error", rename_all = "snake_case")]
pub enum ValidationStatus {
    #[default]
    NotValidated,
    Validating,
    Valid,
    Invalid(ValidationError),
}

impl ValidationStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn is_validating(&self) -> bool {
        matches!(self, Self::Validating)
    }

    pub fn error(&self) -> Option<&ValidationError> {
        match self {
            Self::Invalid(err) => Some(err),
            _ => None,
        }
    }
}

/// Point-in-time copy of all statuses plus the active-credential indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationSnapshot {
    statuses: BTreeMap<Provider, ValidationStatus>,
    /// Whether the credential of the active model's provider is usable.
    pub active_credential_valid: bool,
}

impl ValidationSnapshot {
    fn new() -> Self {
        Self {
            statuses: Provider::ALL
                .into_iter()
                .map(|p| (p, ValidationStatus::NotValidated))
                .collect(),
            active_credential_valid: false,
        }
    }

    pub fn get(&self, provider: Provider) -> ValidationStatus {
        self.statuses.get(&provider).cloned().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Provider, &ValidationStatus)> {
        self.statuses.iter().map(|(p, s)| (*p, s))
    }
}

/// Single source of truth for validation status.
pub struct ValidationState {
    tx: watch::Sender<ValidationSnapshot>,
}

impl Default for ValidationState {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ValidationSnapshot::new());
        Self { tx }
    }

    pub fn get(&self, provider: Provider) -> ValidationStatus {
        self.tx.borrow().get(provider)
    }

    pub fn snapshot(&self) -> ValidationSnapshot {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ValidationSnapshot> {
        self.tx.subscribe()
    }

    pub fn active_credential_valid(&self) -> bool {
        self.tx.borrow().active_credential_valid
    }

    pub(crate) fn set_validating(&self, provider: Provider) {
        self.replace(provider, ValidationStatus::Validating);
    }

    pub(crate) fn set_valid(&self, provider: Provider) {
        self.replace(provider, ValidationStatus::Valid);
    }

    pub(crate) fn set_invalid(&self, provider: Provider, reason: ValidationError) {
        self.replace(provider, ValidationStatus::Invalid(reason));
    }

    pub(crate) fn set_active_credential_valid(&self, valid: bool) {
        self.tx.send_if_modified(|snapshot| {
            let changed = snapshot.active_credential_valid != valid;
            snapshot.active_credential_valid = valid;
            changed
        });
    }

    fn replace(&self, provider: Provider, status: ValidationStatus) {
        self.tx.send_modify(|snapshot| {
            snapshot.statuses.insert(provider, status);
        });
    }
}
