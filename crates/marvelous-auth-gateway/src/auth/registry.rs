//! Inter-service trust registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use marvelous_auth_core::types::{Audience, Frontend, Microservice};

/// Services whose only legitimate caller is the configuration authority.
const CONFIG_ONLY: [Microservice; 5] = [
    Microservice::MarvelousRatesApi,
    Microservice::MarvelousEmailSender,
    Microservice::MarvelousSmsSender,
    Microservice::MarvelousAccountChecking,
    Microservice::MarvelousTransactionStore,
];

/// Ordered set of principals allowed to accept a token issued for a service.
///
/// Serializes deterministically as a comma-joined list; that string is the
/// `aud` claim and is compared verbatim on validation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AllowList(Vec<Audience>);

impl AllowList {
    /// Build an allow-list, appending the configuration authority if absent.
    #[must_use]
    pub fn with_config_authority(members: impl IntoIterator<Item = Audience>) -> Self {
        let mut list: Vec<Audience> = Vec::new();
        for member in members {
            if !list.contains(&member) {
                list.push(member);
            }
        }
        let authority = Audience::Service(Microservice::MarvelousConfigs);
        if !list.contains(&authority) {
            list.push(authority);
        }
        Self(list)
    }

    /// Members in serialization order.
    #[must_use]
    pub fn members(&self) -> &[Audience] {
        &self.0
    }

    /// Whether `member` is on the list.
    #[must_use]
    pub fn contains(&self, member: Audience) -> bool {
        self.0.contains(&member)
    }

    /// Whether an `aud` claim is exactly this list.
    #[must_use]
    pub fn matches_claim(&self, claim: &str) -> bool {
        let mut segments = claim.split(',');
        self.0
            .iter()
            .all(|member| segments.next() == Some(member.as_str()))
            && segments.next().is_none()
    }
}

impl fmt::Display for AllowList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, member) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(member.as_str())?;
        }
        Ok(())
    }
}

/// Whether a comma-joined `aud` claim names `member`.
#[must_use]
pub fn audience_contains(claim: &str, member: &str) -> bool {
    claim.split(',').any(|segment| segment == member)
}

/// Identity of a known peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MicroserviceDescriptor {
    /// Service identifier.
    pub id: Microservice,
    /// Principals allowed to accept tokens this service issues.
    pub allowed_callers: AllowList,
    /// Browser-facing counterpart.
    pub frontend: Frontend,
}

/// Registry map keyed by service.
pub type RegistryMap = HashMap<Microservice, MicroserviceDescriptor>;

/// Live registry; rebuilt wholesale and swapped atomically.
#[derive(Debug)]
pub struct ServiceRegistry {
    map: RwLock<Arc<RegistryMap>>,
}

impl ServiceRegistry {
    /// Create a registry holding a freshly built map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            map: RwLock::new(Arc::new(Self::build())),
        }
    }

    /// Build the full registry.
    #[must_use]
    pub fn build() -> RegistryMap {
        use Frontend::{
            MarvelousFrontendConfigs, MarvelousFrontendCrm, MarvelousFrontendReporting,
            MarvelousFrontendResource, MarvelousFrontendUndefined,
        };
        use Microservice::{
            MarvelousAuth, MarvelousConfigs, MarvelousCrm, MarvelousReporting,
            MarvelousResource, MarvelousTransactionStore,
        };

        let mut map = RegistryMap::new();
        let mut insert = |id: Microservice, callers: Vec<Audience>, frontend: Frontend| {
            map.insert(
                id,
                MicroserviceDescriptor {
                    id,
                    allowed_callers: AllowList::with_config_authority(callers),
                    frontend,
                },
            );
        };

        for id in CONFIG_ONLY {
            insert(id, Vec::new(), MarvelousFrontendUndefined);
        }

        insert(
            MarvelousResource,
            vec![
                MarvelousTransactionStore.into(),
                MarvelousCrm.into(),
                MarvelousFrontendResource.into(),
            ],
            MarvelousFrontendResource,
        );
        insert(
            MarvelousCrm,
            vec![
                MarvelousTransactionStore.into(),
                MarvelousAuth.into(),
                MarvelousFrontendCrm.into(),
            ],
            MarvelousFrontendCrm,
        );
        insert(
            MarvelousReporting,
            vec![MarvelousFrontendReporting.into()],
            MarvelousFrontendReporting,
        );
        insert(
            MarvelousAuth,
            vec![MarvelousCrm.into(), MarvelousReporting.into()],
            MarvelousFrontendUndefined,
        );
        insert(
            MarvelousConfigs,
            vec![MarvelousFrontendConfigs.into()],
            MarvelousFrontendConfigs,
        );

        map
    }

    /// Look up a service.
    #[must_use]
    pub fn lookup(&self, id: Microservice) -> Option<MicroserviceDescriptor> {
        self.snapshot().get(&id).cloned()
    }

    /// Look up a service by its wire name.
    #[must_use]
    pub fn lookup_name(&self, name: &str) -> Option<MicroserviceDescriptor> {
        name.parse().ok().and_then(|id| self.lookup(id))
    }

    /// Current map. Readers keep a consistent view for as long as they hold it.
    #[must_use]
    pub fn snapshot(&self) -> Arc<RegistryMap> {
        Arc::clone(&self.map.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Swap in a new map.
    pub fn replace(&self, map: RegistryMap) {
        *self.map.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(map);
    }

    /// Rebuild and swap.
    pub fn rebuild(&self) {
        self.replace(Self::build());
        tracing::debug!("Service registry rebuilt");
    }

    /// Number of registered services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
