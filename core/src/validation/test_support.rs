//! In-memory collaborators for validator tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::Notify;

use super::executor::ProbeExecutor;
use crate::errors::NetworkError;
use crate::logging::{Event, EventSink};
use crate::providers::{Probe, Provider};
use crate::settings::{ActiveModel, CustomProviderConfig, OperatingMode, SettingsStore};
use crate::trust::{CredentialKey, TrustStore};

#[derive(Default)]
pub struct MemorySettings {
    active: Mutex<Option<ActiveModel>>,
    custom: Mutex<HashMap<String, CustomProviderConfig>>,
    mode: Mutex<OperatingMode>,
}

impl MemorySettings {
    pub fn with_active(provider: Provider) -> Self {
        let settings = Self::default();
        settings.set_active(provider, None);
        settings
    }

    pub fn set_active(&self, provider: Provider, custom_provider_name: Option<&str>) {
        *self.active.lock().unwrap() = Some(ActiveModel {
            provider,
            model: None,
            custom_provider_name: custom_provider_name.map(str::to_string),
        });
    }

    pub fn add_custom(&self, config: CustomProviderConfig) {
        self.custom
            .lock()
            .unwrap()
            .insert(config.name.clone(), config);
    }

    pub fn set_mode(&self, mode: OperatingMode) {
        *self.mode.lock().unwrap() = mode;
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn active_model(&self) -> Result<Option<ActiveModel>> {
        Ok(self.active.lock().unwrap().clone())
    }

    async fn custom_provider(&self, name: &str) -> Result<Option<CustomProviderConfig>> {
        Ok(self.custom.lock().unwrap().get(name).cloned())
    }

    async fn operating_mode(&self) -> Result<OperatingMode> {
        Ok(*self.mode.lock().unwrap())
    }
}

#[derive(Default)]
pub struct MemoryTrust {
    flags: Mutex<HashMap<CredentialKey, bool>>,
    credentials: Mutex<HashMap<CredentialKey, String>>,
    fail_writes: AtomicBool,
}

impl MemoryTrust {
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(anyhow!("disk I/O error"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TrustStore for MemoryTrust {
    async fn set_trust_flag(&self, key: &CredentialKey, value: bool) -> Result<()> {
        self.check_writable()?;
        self.flags.lock().unwrap().insert(key.clone(), value);
        Ok(())
    }

    async fn trust_flag(&self, key: &CredentialKey) -> Result<bool> {
        Ok(self
            .flags
            .lock()
            .unwrap()
            .get(key)
            .copied()
            .unwrap_or(false))
    }

    async fn store_credential(&self, key: &CredentialKey, credential: &str) -> Result<()> {
        self.check_writable()?;
        let mut credentials = self.credentials.lock().unwrap();
        if credentials.get(key).map(String::as_str) != Some(credential) {
            self.flags.lock().unwrap().insert(key.clone(), false);
        }
        credentials.insert(key.clone(), credential.to_string());
        Ok(())
    }

    async fn stored_credential(&self, key: &CredentialKey) -> Result<Option<String>> {
        Ok(self.credentials.lock().unwrap().get(key).cloned())
    }

    async fn record_validation(
        &self,
        key: &CredentialKey,
        credential: &str,
        trusted: bool,
    ) -> Result<()> {
        self.check_writable()?;
        self.credentials
            .lock()
            .unwrap()
            .insert(key.clone(), credential.to_string());
        self.flags.lock().unwrap().insert(key.clone(), trusted);
        Ok(())
    }
}

/// One scripted executor reply.
pub struct Reply {
    pub result: Result<(), NetworkError>,
    pub delay: Duration,
    pub wait_for: Option<Arc<Notify>>,
}

impl Reply {
    pub fn ok() -> Self {
        Self {
            result: Ok(()),
            delay: Duration::ZERO,
            wait_for: None,
        }
    }

    pub fn err(err: NetworkError) -> Self {
        Self {
            result: Err(err),
            delay: Duration::ZERO,
            wait_for: None,
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn gated(mut self, notify: Arc<Notify>) -> Self {
        self.wait_for = Some(notify);
        self
    }
}

/// Executor answering from per-provider scripts; unscripted probes succeed.
#[derive(Default)]
pub struct StubExecutor {
    replies: Mutex<HashMap<Provider, VecDeque<Reply>>>,
    probes: Mutex<Vec<Probe>>,
    calls: AtomicUsize,
}

impl StubExecutor {
    pub fn script(&self, provider: Provider, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(provider)
            .or_default()
            .push_back(reply);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> Vec<Probe> {
        self.probes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProbeExecutor for StubExecutor {
    async fn execute(&self, probe: &Probe) -> Result<(), NetworkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.probes.lock().unwrap().push(probe.clone());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .get_mut(&probe.provider)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(Reply::ok);
        if let Some(notify) = reply.wait_for {
            notify.notified().await;
        }
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        reply.result
    }
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    pub fn codes(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| e.code)
            .collect()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for RecordingSink {
    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}
