//! Startup population of configuration and credentials.
//!
//! Configuration is loaded once, best-effort. Credentials are loaded from the
//! CRM, falling back to Reporting; when both fail an alert is sent and the
//! whole cycle is retried after a fixed delay until it succeeds or the
//! process shuts down.

mod notifier;
mod requester;

pub use notifier::{FailureNotifier, LogNotifier};
pub use requester::{HttpRequester, ReqwestRequester, classify_status};

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use marvelous_auth_core::config::{UpstreamConfig, redact};
use marvelous_auth_core::types::Microservice;
use marvelous_auth_core::validation::{ConfigEntry, LeadAuthExchange, parse_validated_list};

use crate::auth::{AuthError, CredentialRecord, Store, TokenEngine};

/// Bootstrap progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BootstrapState {
    /// Nothing attempted yet.
    NotStarted,
    /// Fetching remote configuration.
    ConfigLoading,
    /// Configuration attempt finished.
    ConfigReady,
    /// Fetching credentials (first attempt or retry).
    CredentialsLoading,
    /// Credentials loaded.
    CredentialsReady,
}

/// Published bootstrap status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapStatus {
    /// Current state.
    pub state: BootstrapState,
    /// Completed credential cycles, successful or not.
    pub credential_cycles: u64,
}

impl Default for BootstrapStatus {
    fn default() -> Self {
        Self {
            state: BootstrapState::NotStarted,
            credential_cycles: 0,
        }
    }
}

/// Awaitable view of bootstrap progress for request handling.
#[derive(Debug, Clone)]
pub struct BootstrapHandle {
    rx: watch::Receiver<BootstrapStatus>,
    stopped: CancellationToken,
}

impl BootstrapHandle {
    /// Current status.
    #[must_use]
    pub fn status(&self) -> BootstrapStatus {
        *self.rx.borrow()
    }

    /// Wait until the configuration attempt has finished.
    ///
    /// Returns `false` on timeout, or at once when bootstrap was cancelled.
    pub async fn wait_config(&self, timeout: Duration) -> bool {
        self.wait(timeout, |status| status.state >= BootstrapState::ConfigReady)
            .await
    }

    /// Wait until the first credential cycle has finished, whatever its outcome.
    pub async fn wait_first_credentials_cycle(&self, timeout: Duration) -> bool {
        self.wait(timeout, |status| status.credential_cycles > 0).await
    }

    async fn wait(&self, timeout: Duration, done: impl FnMut(&BootstrapStatus) -> bool) -> bool {
        let mut rx = self.rx.clone();
        tokio::select! {
            biased;
            waited = tokio::time::timeout(timeout, rx.wait_for(done)) => matches!(waited, Ok(Ok(_))),
            () = self.stopped.cancelled() => false,
        }
    }
}

/// Populates the store from upstream providers.
pub struct BootstrapOrchestrator {
    store: Arc<Store>,
    engine: TokenEngine,
    requester: Arc<dyn HttpRequester>,
    notifier: Arc<dyn FailureNotifier>,
    upstream: UpstreamConfig,
    retry_interval: Duration,
    status: watch::Sender<BootstrapStatus>,
    stopped: CancellationToken,
}

impl BootstrapOrchestrator {
    /// Create an orchestrator.
    #[must_use]
    pub fn new(
        store: Arc<Store>,
        engine: TokenEngine,
        requester: Arc<dyn HttpRequester>,
        notifier: Arc<dyn FailureNotifier>,
        upstream: UpstreamConfig,
        retry_interval: Duration,
    ) -> Self {
        let (status, _rx) = watch::channel(BootstrapStatus::default());
        Self {
            store,
            engine,
            requester,
            notifier,
            upstream,
            retry_interval,
            status,
            stopped: CancellationToken::new(),
        }
    }

    /// Handle for waiting on bootstrap progress.
    #[must_use]
    pub fn handle(&self) -> BootstrapHandle {
        BootstrapHandle {
            rx: self.status.subscribe(),
            stopped: self.stopped.clone(),
        }
    }

    /// Run configuration, then credentials with retry, until success or
    /// cancellation. Cancellation also releases every handle still waiting.
    pub async fn run(&self, cancel: CancellationToken) {
        self.run_until_cancelled(&cancel).await;
        if cancel.is_cancelled() {
            self.stopped.cancel();
        }
    }

    async fn run_until_cancelled(&self, cancel: &CancellationToken) {
        tokio::select! {
            () = cancel.cancelled() => {
                tracing::info!("Bootstrap cancelled during configuration");
                return;
            }
            _ = self.initialize_config() => {}
        }

        loop {
            let loaded = tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("Bootstrap cancelled during credential load");
                    return;
                }
                loaded = self.initialize_credentials() => loaded,
            };
            if loaded {
                return;
            }

            tracing::info!(
                retry_in_secs = self.retry_interval.as_secs(),
                "Scheduling credential bootstrap retry"
            );
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("Bootstrap retry loop cancelled");
                    return;
                }
                () = tokio::time::sleep(self.retry_interval) => {}
            }
        }
    }

    /// Fetch remote configuration and apply it over current values.
    ///
    /// Never fails: on error the current values stay in place. Returns
    /// whether remote values were applied.
    pub async fn initialize_config(&self) -> bool {
        self.set_state(BootstrapState::ConfigLoading);

        let applied = match self.fetch_config().await {
            Ok(entries) => {
                for entry in &entries {
                    let previous = self.store.config.set(&entry.key, &entry.value);
                    tracing::debug!(
                        key = %entry.key,
                        old = %previous.as_deref().map(|v| redact(&entry.key, v)).unwrap_or_default(),
                        new = %redact(&entry.key, &entry.value),
                        "Configuration value applied"
                    );
                }
                self.store.registry.rebuild();
                tracing::info!(count = entries.len(), "Configuration initialized");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Configuration initialization failed, keeping current values");
                self.notifier
                    .notify_failure(&format!(
                        "Failed to load configuration from {}: {e}",
                        Microservice::MarvelousConfigs
                    ))
                    .await;
                false
            }
        };

        self.store.config_ready.set(true);
        self.set_state(BootstrapState::ConfigReady);
        applied
    }

    /// Load credentials from the CRM, falling back to Reporting.
    ///
    /// Returns whether credentials are now loaded. When both providers fail
    /// a single alert naming both is sent.
    pub async fn initialize_credentials(&self) -> bool {
        self.store.credentials_ready.set(false);
        self.set_state(BootstrapState::CredentialsLoading);

        let providers = [
            (Microservice::MarvelousCrm, self.upstream.crm_leads_path.as_str()),
            (
                Microservice::MarvelousReporting,
                self.upstream.reporting_leads_path.as_str(),
            ),
        ];

        let token = self.engine.issue_for_service(Microservice::MarvelousAuth);
        if let Ok(token) = &token {
            for (provider, path) in providers {
                match self.fetch_leads(provider, path, token).await {
                    Ok(leads) => {
                        let count = leads.len();
                        self.store.credentials.populate(
                            leads
                                .into_iter()
                                .map(|lead| (lead.email.clone(), CredentialRecord::from(lead))),
                        );
                        self.store.credentials_ready.set(true);
                        self.finish_cycle(BootstrapState::CredentialsReady);
                        tracing::info!(provider = %provider, count, "Credentials initialized");
                        return true;
                    }
                    Err(e) => {
                        tracing::warn!(provider = %provider, error = %e, "Credential provider failed");
                    }
                }
            }
        }

        self.notifier
            .notify_failure(&format!(
                "Failed to load lead credentials from {} and {}",
                Microservice::MarvelousCrm,
                Microservice::MarvelousReporting
            ))
            .await;
        self.finish_cycle(BootstrapState::CredentialsLoading);
        false
    }

    async fn fetch_config(&self) -> Result<Vec<ConfigEntry>, AuthError> {
        let service = Microservice::MarvelousConfigs;
        let token = self.engine.issue_for_service(Microservice::MarvelousAuth)?;
        let base = self.store.config.service_url(service).ok_or_else(|| {
            AuthError::ServiceUnavailable(format!("{} is not configured", service.url_key()))
        })?;

        let payload = self
            .requester
            .send(&format!("{base}{}", self.upstream.configs_path), service, &token)
            .await?;
        parse_validated_list(payload)
            .map_err(|e| AuthError::BadGateway(format!("Invalid payload from {service}: {e}")))
    }

    async fn fetch_leads(
        &self,
        provider: Microservice,
        path: &str,
        token: &str,
    ) -> Result<Vec<LeadAuthExchange>, AuthError> {
        let base = self.store.config.service_url(provider).ok_or_else(|| {
            AuthError::ServiceUnavailable(format!("{} is not configured", provider.url_key()))
        })?;

        let payload = self
            .requester
            .send(&format!("{base}{path}"), provider, token)
            .await?;
        parse_validated_list(payload)
            .map_err(|e| AuthError::BadGateway(format!("Invalid payload from {provider}: {e}")))
    }

    fn set_state(&self, state: BootstrapState) {
        self.status.send_modify(|status| status.state = state);
    }

    fn finish_cycle(&self, state: BootstrapState) {
        self.status.send_modify(|status| {
            status.state = state;
            status.credential_cycles += 1;
        });
    }
}

impl std::fmt::Debug for BootstrapOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapOrchestrator")
            .field("status", &*self.status.borrow())
            .field("retry_interval", &self.retry_interval)
            .finish_non_exhaustive()
    }
}
