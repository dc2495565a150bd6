//! Identifiers shared across the Marvelous constellation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Returned when a name does not match any known identifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown identifier: {0}")]
pub struct UnknownIdentifier(pub String);

/// A backend microservice of the constellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Microservice {
    /// This service.
    MarvelousAuth,
    /// Configuration authority.
    MarvelousConfigs,
    /// Customer relationship management; primary source of leads.
    MarvelousCrm,
    /// Reporting; secondary source of leads.
    MarvelousReporting,
    /// Resource service.
    MarvelousResource,
    /// Transaction store.
    MarvelousTransactionStore,
    /// Currency rates.
    MarvelousRatesApi,
    /// Email delivery worker.
    MarvelousEmailSender,
    /// SMS delivery worker.
    MarvelousSmsSender,
    /// Account checking worker.
    MarvelousAccountChecking,
}

impl Microservice {
    /// Every known microservice.
    pub const ALL: [Self; 10] = [
        Self::MarvelousAuth,
        Self::MarvelousConfigs,
        Self::MarvelousCrm,
        Self::MarvelousReporting,
        Self::MarvelousResource,
        Self::MarvelousTransactionStore,
        Self::MarvelousRatesApi,
        Self::MarvelousEmailSender,
        Self::MarvelousSmsSender,
        Self::MarvelousAccountChecking,
    ];

    /// Wire name of the service.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MarvelousAuth => "MarvelousAuth",
            Self::MarvelousConfigs => "MarvelousConfigs",
            Self::MarvelousCrm => "MarvelousCrm",
            Self::MarvelousReporting => "MarvelousReporting",
            Self::MarvelousResource => "MarvelousResource",
            Self::MarvelousTransactionStore => "MarvelousTransactionStore",
            Self::MarvelousRatesApi => "MarvelousRatesApi",
            Self::MarvelousEmailSender => "MarvelousEmailSender",
            Self::MarvelousSmsSender => "MarvelousSmsSender",
            Self::MarvelousAccountChecking => "MarvelousAccountChecking",
        }
    }

    /// Configuration key holding the base URL of this service.
    #[must_use]
    pub fn url_key(&self) -> String {
        format!("{}Url", self.as_str())
    }
}

impl fmt::Display for Microservice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Microservice {
    type Err = UnknownIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|service| service.as_str() == s)
            .ok_or_else(|| UnknownIdentifier(s.to_string()))
    }
}

/// A browser-facing client associated with a backend service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Frontend {
    /// No frontend is associated.
    #[default]
    MarvelousFrontendUndefined,
    /// CRM frontend.
    MarvelousFrontendCrm,
    /// Resource frontend.
    MarvelousFrontendResource,
    /// Reporting frontend.
    MarvelousFrontendReporting,
    /// Configuration frontend.
    MarvelousFrontendConfigs,
}

impl Frontend {
    /// Wire name of the frontend.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MarvelousFrontendUndefined => "MarvelousFrontendUndefined",
            Self::MarvelousFrontendCrm => "MarvelousFrontendCrm",
            Self::MarvelousFrontendResource => "MarvelousFrontendResource",
            Self::MarvelousFrontendReporting => "MarvelousFrontendReporting",
            Self::MarvelousFrontendConfigs => "MarvelousFrontendConfigs",
        }
    }
}

impl fmt::Display for Frontend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A principal that may appear in a token audience.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// A backend microservice.
    Service(Microservice),
    /// A browser-facing frontend.
    Frontend(Frontend),
}

impl Audience {
    /// Wire name of the audience member.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Service(service) => service.as_str(),
            Self::Frontend(frontend) => frontend.as_str(),
        }
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Microservice> for Audience {
    fn from(service: Microservice) -> Self {
        Self::Service(service)
    }
}

impl From<Frontend> for Audience {
    fn from(frontend: Frontend) -> Self {
        Self::Frontend(frontend)
    }
}

/// Opaque role of a lead. The empty string means "absent".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(pub String);

impl Role {
    /// Create a new role.
    #[must_use]
    pub fn new(role: impl Into<String>) -> Self {
        Self(role.into())
    }

    /// Whether this is the "absent" sentinel.
    #[must_use]
    pub fn is_absent(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Role {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_microservice_roundtrip_names() {
        for service in Microservice::ALL {
            assert_eq!(service.as_str().parse::<Microservice>().unwrap(), service);
        }
    }

    #[test]
    fn test_unknown_microservice() {
        let err = "MarvelousFrontendCrm".parse::<Microservice>().unwrap_err();
        assert_eq!(err, UnknownIdentifier("MarvelousFrontendCrm".to_string()));
    }

    #[test]
    fn test_url_key() {
        assert_eq!(Microservice::MarvelousCrm.url_key(), "MarvelousCrmUrl");
    }

    #[test]
    fn test_audience_display() {
        assert_eq!(
            Audience::from(Frontend::MarvelousFrontendCrm).to_string(),
            "MarvelousFrontendCrm"
        );
        assert_eq!(
            Audience::from(Microservice::MarvelousConfigs).to_string(),
            "MarvelousConfigs"
        );
    }

    #[test]
    fn test_role_sentinel() {
        assert!(Role::default().is_absent());
        assert!(!Role::new("Vip").is_absent());
    }
}
