//! Drives a credential through `Validating` to its terminal status and writes
//! the result through to the trust store.
//!
//! Calls for the same provider are serialised by a per-provider async mutex
//! and run in arrival order, so the status left visible always belongs to the
//! most recently issued call. Calls for different providers never contend.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tokio::sync::{watch, Mutex};

use super::executor::ProbeExecutor;
use super::state::{ValidationSnapshot, ValidationState, ValidationStatus};
use crate::errors::{NetworkError, ValidationError};
use crate::logging::{credential_fingerprint, Event, EventLevel, EventSink, LogEventSink};
use crate::providers::{build_probe, resolve_endpoint_target, Provider};
use crate::settings::{ActiveModel, OperatingMode, SettingsStore};
use crate::trust::{CredentialKey, TrustStore};

const MODULE: &str = "token.validation";

/// What a failed validation of a provider that is *not* the active one does to
/// the active-credential indicator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InactiveFailurePolicy {
    /// Leave the indicator as it is.
    #[default]
    Preserve,
    /// Mark the active credential unusable.
    Clear,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValidatorConfig {
    #[serde(default)]
    pub inactive_failure: InactiveFailurePolicy,
}

pub struct TokenValidator {
    state: ValidationState,
    locks: [Mutex<()>; Provider::COUNT],
    executor: Arc<dyn ProbeExecutor>,
    settings: Arc<dyn SettingsStore>,
    trust: Arc<dyn TrustStore>,
    events: Arc<dyn EventSink>,
    config: ValidatorConfig,
}

impl TokenValidator {
    pub fn new(
        executor: Arc<dyn ProbeExecutor>,
        settings: Arc<dyn SettingsStore>,
        trust: Arc<dyn TrustStore>,
    ) -> Self {
        Self {
            state: ValidationState::new(),
            locks: std::array::from_fn(|_| Mutex::new(())),
            executor,
            settings,
            trust,
            events: Arc::new(LogEventSink),
            config: ValidatorConfig::default(),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_config(mut self, config: ValidatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Current status; never blocks on in-flight validations.
    pub fn status(&self, provider: Provider) -> ValidationStatus {
        self.state.get(provider)
    }

    pub fn snapshot(&self) -> ValidationSnapshot {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<ValidationSnapshot> {
        self.state.subscribe()
    }

    pub fn active_credential_valid(&self) -> bool {
        self.state.active_credential_valid()
    }

    /// Whether the stored credential for `key` may be used. Read failures
    /// count as untrusted.
    pub async fn is_credential_usable(&self, key: impl Into<CredentialKey>) -> bool {
        let key = key.into();
        match self.trust.trust_flag(&key).await {
            Ok(flag) => flag,
            Err(err) => {
                log::warn!(target: MODULE, "trust flag for {key} unreadable: {err}");
                false
            }
        }
    }

    /// The stored credential for `key` if it passed validation.
    pub async fn trusted_credential(&self, key: impl Into<CredentialKey>) -> Option<String> {
        let key = key.into();
        match self.trust.trusted_credential(&key).await {
            Ok(credential) => credential,
            Err(err) => {
                log::warn!(target: MODULE, "credential for {key} unreadable: {err}");
                None
            }
        }
    }

    /// Validate `credential` for `provider`. A custom provider is resolved
    /// through the active model's custom provider name.
    pub async fn validate(&self, provider: Provider, credential: &str) -> ValidationStatus {
        self.run(provider, credential, None).await
    }

    /// Validate a credential against the named custom provider configuration.
    pub async fn validate_custom(&self, name: &str, credential: &str) -> ValidationStatus {
        self.run(Provider::Custom, credential, Some(name)).await
    }

    async fn run(
        &self,
        provider: Provider,
        credential: &str,
        custom_name: Option<&str>,
    ) -> ValidationStatus {
        let _guard = self.locks[provider as usize].lock().await;
        self.state.set_validating(provider);
        let mut pending = PendingValidation {
            validator: self,
            provider,
            armed: true,
        };

        let credential = credential.trim();
        let fingerprint = credential_fingerprint(credential);
        log::debug!(target: MODULE, "validating {provider} credential {fingerprint}");

        let active = match self.settings.active_model().await {
            Ok(active) => active,
            Err(err) => {
                self.report(
                    EventLevel::Warn,
                    "TKN-0301",
                    format!("active model lookup failed: {err}"),
                    json!({ "provider": provider.id() }),
                );
                None
            }
        };
        let custom_name = custom_name.or_else(|| {
            active
                .as_ref()
                .filter(|a| a.provider == Provider::Custom)
                .and_then(|a| a.custom_provider_name.as_deref())
        });
        let key = CredentialKey::new(provider, custom_name);

        let outcome = self.probe(provider, credential, custom_name).await;
        let status = match &outcome {
            Ok(()) => {
                self.state.set_valid(provider);
                self.report(
                    EventLevel::Info,
                    "TKN-0100",
                    format!("{} credential validated", provider.display_name()),
                    json!({ "provider": provider.id(), "fingerprint": fingerprint }),
                );
                ValidationStatus::Valid
            }
            Err(reason) => {
                self.state.set_invalid(provider, reason.clone());
                self.report(
                    EventLevel::Warn,
                    "TKN-0101",
                    format!("{} credential rejected: {reason}", provider.display_name()),
                    json!({
                        "provider": provider.id(),
                        "fingerprint": fingerprint,
                        "error_code": reason.code(),
                    }),
                );
                ValidationStatus::Invalid(reason.clone())
            }
        };
        pending.settle();

        let trusted = outcome.is_ok();
        let persisted = if credential.is_empty() {
            self.trust.set_trust_flag(&key, false).await
        } else {
            self.trust.record_validation(&key, credential, trusted).await
        };

        self.update_active_indicator(&key, trusted, persisted.is_ok(), active.as_ref())
            .await;

        match persisted {
            Ok(()) => status,
            Err(err) => {
                // In-memory status stays as probed; only the caller sees the
                // persistence failure.
                let reason =
                    ValidationError::Unknown(format!("failed to persist trust flag: {err}"));
                self.report(
                    EventLevel::Error,
                    "TKN-0500",
                    reason.to_string(),
                    json!({ "provider": provider.id(), "trusted": trusted }),
                );
                ValidationStatus::Invalid(reason)
            }
        }
    }

    async fn probe(
        &self,
        provider: Provider,
        credential: &str,
        custom_name: Option<&str>,
    ) -> Result<(), ValidationError> {
        let target =
            resolve_endpoint_target(provider, credential, custom_name, self.settings.as_ref())
                .await?;
        let probe = build_probe(&target);
        self.executor
            .execute(&probe)
            .await
            .map_err(ValidationError::from)
    }

    async fn update_active_indicator(
        &self,
        key: &CredentialKey,
        valid: bool,
        persisted: bool,
        active: Option<&ActiveModel>,
    ) {
        let provider = key.provider();
        match self.settings.operating_mode().await {
            Ok(OperatingMode::Remote) => {}
            Ok(OperatingMode::Local) => {
                self.report(
                    EventLevel::Info,
                    "TKN-0302",
                    "local mode: active credential indicator left unchanged".into(),
                    json!({ "provider": provider.id(), "valid": valid }),
                );
                return;
            }
            Err(err) => {
                self.report(
                    EventLevel::Warn,
                    "TKN-0301",
                    format!("operating mode lookup failed: {err}"),
                    json!({ "provider": provider.id(), "valid": valid }),
                );
                return;
            }
        }

        let Some(active) = active else {
            self.report(
                EventLevel::Warn,
                "TKN-0300",
                "no active model configured: active credential indicator not updated".into(),
                json!({ "provider": provider.id(), "valid": valid }),
            );
            return;
        };

        // A custom key only matches the active model's named configuration.
        if active.credential_key() == *key {
            self.state.set_active_credential_valid(valid && persisted);
        } else if !valid && self.config.inactive_failure == InactiveFailurePolicy::Clear {
            self.state.set_active_credential_valid(false);
        }
    }

    fn report(
        &self,
        level: EventLevel,
        code: &'static str,
        message: String,
        data: serde_json::Value,
    ) {
        let explain = match code {
            "TKN-0100" => Some("Provider accepted the credential"),
            "TKN-0101" => Some("Credential marked untrusted"),
            "TKN-0102" => Some(ValidationError::NetworkFailure(String::new()).explain()),
            "TKN-0300" | "TKN-0301" | "TKN-0302" => {
                Some(ValidationError::InvalidConfiguration(String::new()).explain())
            }
            "TKN-0500" => Some(ValidationError::Unknown(String::new()).explain()),
            _ => None,
        };
        self.events.record(Event {
            level,
            code: Some(code),
            module: MODULE,
            message,
            explain,
            data: Some(data),
        });
    }
}

/// Settles a provider still shown as `Validating` when its call is dropped
/// before a terminal status was written.
struct PendingValidation<'a> {
    validator: &'a TokenValidator,
    provider: Provider,
    armed: bool,
}

impl PendingValidation<'_> {
    fn settle(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingValidation<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let provider = self.provider;
        self.validator
            .state
            .set_invalid(provider, ValidationError::from(NetworkError::Cancelled));
        self.validator.report(
            EventLevel::Warn,
            "TKN-0102",
            format!("{} validation cancelled", provider.display_name()),
            json!({ "provider": provider.id() }),
        );
    }
}
