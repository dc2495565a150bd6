//! Message-driven mutation of the store.
//!
//! The bus adapter owns transport; these consumers own validation and the
//! resulting store writes. A returned error rejects the message.

use std::sync::Arc;

use async_trait::async_trait;
use validator::Validate;

use marvelous_auth_core::config::redact;
use marvelous_auth_core::validation::{
    ConfigChange, LeadFullExchange, LeadShortExchange, validate_all,
};

use crate::auth::{AuthError, CredentialRecord, Store, mask_email};

/// Queue carrying lead add, change, and ban events.
pub const LEAD_ADD_OR_CHANGE_QUEUE: &str = "leadAddOrChangeAuthQueue";

/// Queue carrying batched lead role changes.
pub const LEAD_CHANGE_ROLE_QUEUE: &str = "leadChangeRoleQueue";

/// Queue carrying configuration changes addressed to this service.
pub const CONFIG_CHANGE_QUEUE: &str = "ChangeConfigAuth";

/// A consumer of one message type.
#[async_trait]
pub trait Consumer<M: Send + 'static>: Send + Sync {
    /// Queue this consumer is bound to.
    fn queue(&self) -> &'static str;

    /// Apply one message.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Validation` and leaves the store untouched when
    /// the message fails its field rules.
    async fn consume(&self, message: M) -> Result<(), AuthError>;
}

/// Applies lead add/change/ban events.
#[derive(Debug, Clone)]
pub struct LeadAddOrChangeConsumer {
    store: Arc<Store>,
}

impl LeadAddOrChangeConsumer {
    /// Create a consumer over the shared store.
    #[must_use]
    pub const fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Consumer<LeadFullExchange> for LeadAddOrChangeConsumer {
    fn queue(&self) -> &'static str {
        LEAD_ADD_OR_CHANGE_QUEUE
    }

    async fn consume(&self, message: LeadFullExchange) -> Result<(), AuthError> {
        message.validate().inspect_err(|e| {
            tracing::error!(queue = LEAD_ADD_OR_CHANGE_QUEUE, error = %e, "Rejected lead message");
        })?;

        let email = message.email.clone();
        if message.is_banned == Some(true) {
            self.store.credentials.remove(&email);
            tracing::info!(email = %mask_email(&email), "Lead banned, credential removed");
        } else {
            self.store
                .credentials
                .upsert(&email, CredentialRecord::from(message));
            tracing::info!(email = %mask_email(&email), "Lead credential stored");
        }
        Ok(())
    }
}

/// Applies batched role changes to existing leads.
#[derive(Debug, Clone)]
pub struct LeadChangeRoleConsumer {
    store: Arc<Store>,
}

impl LeadChangeRoleConsumer {
    /// Create a consumer over the shared store.
    #[must_use]
    pub const fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Consumer<Vec<LeadShortExchange>> for LeadChangeRoleConsumer {
    fn queue(&self) -> &'static str {
        LEAD_CHANGE_ROLE_QUEUE
    }

    async fn consume(&self, message: Vec<LeadShortExchange>) -> Result<(), AuthError> {
        validate_all(&message).inspect_err(|e| {
            tracing::error!(queue = LEAD_CHANGE_ROLE_QUEUE, error = %e, "Rejected role change batch");
        })?;

        let mut applied = 0usize;
        for lead in message {
            if self.store.credentials.update_role(&lead.email, lead.role) {
                applied += 1;
            } else {
                tracing::debug!(email = %mask_email(&lead.email), "Role change for unknown lead skipped");
            }
        }
        tracing::info!(applied, "Lead roles changed");
        Ok(())
    }
}

/// Applies configuration changes and rebuilds the registry.
#[derive(Debug, Clone)]
pub struct ConfigChangeConsumer {
    store: Arc<Store>,
}

impl ConfigChangeConsumer {
    /// Create a consumer over the shared store.
    #[must_use]
    pub const fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Consumer<ConfigChange> for ConfigChangeConsumer {
    fn queue(&self) -> &'static str {
        CONFIG_CHANGE_QUEUE
    }

    async fn consume(&self, message: ConfigChange) -> Result<(), AuthError> {
        message.validate().inspect_err(|e| {
            tracing::error!(queue = CONFIG_CHANGE_QUEUE, error = %e, "Rejected configuration change");
        })?;

        let previous = self.store.config.set(&message.key, &message.value);
        self.store.registry.rebuild();
        tracing::info!(
            key = %message.key,
            old = %previous.as_deref().map(|v| redact(&message.key, v)).unwrap_or_default(),
            new = %redact(&message.key, &message.value),
            "Configuration changed"
        );
        Ok(())
    }
}
