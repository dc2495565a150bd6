//! Credential cache, readiness flags, and the shared [`Store`].

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::watch;

use marvelous_auth_core::config::LiveConfig;
use marvelous_auth_core::types::Role;
use marvelous_auth_core::validation::{LeadAuthExchange, LeadFullExchange};

use super::registry::ServiceRegistry;

/// Cached authentication identity of a lead.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CredentialRecord {
    /// Upstream user id; `0` means absent.
    pub user_id: i32,
    /// Opaque role; empty means absent.
    pub role: Role,
    /// Stored password hash; empty means no credential.
    pub password_hash: String,
}

impl CredentialRecord {
    /// A record is absent only when every field is at its sentinel.
    #[must_use]
    pub fn is_absent(&self) -> bool {
        self.user_id == 0 && self.role.is_absent() && self.password_hash.is_empty()
    }
}

impl From<LeadAuthExchange> for CredentialRecord {
    fn from(lead: LeadAuthExchange) -> Self {
        Self {
            user_id: lead.id,
            role: lead.role,
            password_hash: lead.hash_password,
        }
    }
}

impl From<LeadFullExchange> for CredentialRecord {
    fn from(lead: LeadFullExchange) -> Self {
        Self {
            user_id: lead.id,
            role: lead.role,
            password_hash: lead.password,
        }
    }
}

/// In-memory map of email to credential. Writes are last-write-wins per key.
#[derive(Debug, Default)]
pub struct CredentialStore {
    records: RwLock<HashMap<String, CredentialRecord>>,
}

impl CredentialStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a credential. Entries at full default count as absent.
    #[must_use]
    pub fn get(&self, email: &str) -> Option<CredentialRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(email)
            .filter(|record| !record.is_absent())
            .cloned()
    }

    /// Insert or overwrite a credential.
    pub fn upsert(&self, email: &str, record: CredentialRecord) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(email.to_string(), record);
    }

    /// Clear a credential. Returns whether one was present.
    pub fn remove(&self, email: &str) -> bool {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(email)
            .is_some_and(|record| !record.is_absent())
    }

    /// Overwrite the role of an existing credential.
    ///
    /// No-op when the email has no password hash; role changes never create
    /// accounts. Returns whether the role was applied.
    pub fn update_role(&self, email: &str, role: Role) -> bool {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        match records.get_mut(email) {
            Some(record) if !record.password_hash.is_empty() => {
                record.role = role;
                true
            }
            _ => false,
        }
    }

    /// Upsert a batch of credentials under one write lock.
    pub fn populate(&self, batch: impl IntoIterator<Item = (String, CredentialRecord)>) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(batch);
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A readiness gate that callers can poll or await.
#[derive(Debug, Clone)]
pub struct ReadinessFlag {
    tx: Arc<watch::Sender<bool>>,
}

impl ReadinessFlag {
    /// Create a flag in the not-ready state.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Current value.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.tx.borrow()
    }

    /// Flip the flag.
    pub fn set(&self, ready: bool) {
        self.tx.send_replace(ready);
    }

    /// Wait until ready, up to `timeout`. Returns the final readiness.
    pub async fn wait(&self, timeout: Duration) -> bool {
        let mut rx = self.tx.subscribe();
        matches!(
            tokio::time::timeout(timeout, rx.wait_for(|ready| *ready)).await,
            Ok(Ok(_))
        )
    }
}

impl Default for ReadinessFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared state mutated by bootstrap and consumers, read by request handling.
#[derive(Debug, Default)]
pub struct Store {
    /// Trust registry.
    pub registry: ServiceRegistry,
    /// Credential cache.
    pub credentials: CredentialStore,
    /// Running configuration.
    pub config: LiveConfig,
    /// Set once configuration initialization has run.
    pub config_ready: ReadinessFlag,
    /// Set once credentials have been loaded.
    pub credentials_ready: ReadinessFlag,
}

impl Store {
    /// Create a store over a live configuration table.
    #[must_use]
    pub fn new(config: LiveConfig) -> Self {
        Self {
            registry: ServiceRegistry::new(),
            credentials: CredentialStore::new(),
            config,
            config_ready: ReadinessFlag::new(),
            credentials_ready: ReadinessFlag::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(id: i32, role: &str, hash: &str) -> CredentialRecord {
        CredentialRecord {
            user_id: id,
            role: Role::new(role),
            password_hash: hash.to_string(),
        }
    }

    #[test]
    fn test_absent_only_when_all_default() {
        assert!(CredentialRecord::default().is_absent());
        assert!(!record(0, "", "1000:a:b").is_absent());
        assert!(!record(7, "", "").is_absent());
        assert!(!record(0, "Vip", "").is_absent());
    }

    #[test]
    fn test_get_filters_default_entries() {
        let store = CredentialStore::new();
        store.upsert("ghost@x.y", CredentialRecord::default());
        store.upsert("partial@x.y", record(0, "", "1000:a:b"));

        assert_eq!(store.get("ghost@x.y"), None);
        assert_eq!(store.get("missing@x.y"), None);
        assert_eq!(store.get("partial@x.y"), Some(record(0, "", "1000:a:b")));
    }

    #[test]
    fn test_update_role_never_creates() {
        let store = CredentialStore::new();
        assert!(!store.update_role("new@x.y", Role::new("Vip")));
        assert_eq!(store.get("new@x.y"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_update_role_keeps_hash_and_id() {
        let store = CredentialStore::new();
        store.upsert("a@x.y", record(4, "Regular", "1000:s:h"));
        assert!(store.update_role("a@x.y", Role::new("Vip")));
        assert_eq!(store.get("a@x.y"), Some(record(4, "Vip", "1000:s:h")));
    }

    #[test]
    fn test_remove() {
        let store = CredentialStore::new();
        store.upsert("a@x.y", record(4, "Regular", "1000:s:h"));
        assert!(store.remove("a@x.y"));
        assert!(!store.remove("a@x.y"));
        assert_eq!(store.get("a@x.y"), None);
    }

    #[test]
    fn test_populate_overwrites_per_key() {
        let store = CredentialStore::new();
        store.upsert("a@x.y", record(1, "Regular", "old"));
        store.upsert("keep@x.y", record(9, "Regular", "keep"));
        store.populate([
            ("a@x.y".to_string(), record(1, "Vip", "new")),
            ("b@x.y".to_string(), record(2, "Regular", "b")),
        ]);
        assert_eq!(store.len(), 3);
        assert_eq!(store.get("a@x.y").unwrap().password_hash, "new");
        assert_eq!(store.get("keep@x.y").unwrap().user_id, 9);
    }

    #[tokio::test]
    async fn test_readiness_wait() {
        let flag = ReadinessFlag::new();
        assert!(!flag.is_ready());
        assert!(!flag.wait(Duration::from_millis(10)).await);

        let waiter = {
            let flag = flag.clone();
            tokio::spawn(async move { flag.wait(Duration::from_secs(5)).await })
        };
        flag.set(true);
        assert!(waiter.await.unwrap());
        assert!(flag.is_ready());
    }
}
