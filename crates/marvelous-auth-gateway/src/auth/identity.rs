//! Caller identification.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use marvelous_auth_core::config::LiveConfig;
use marvelous_auth_core::types::{Microservice, Role};

use super::AuthError;
use super::jwt::Claims;
use super::registry::ServiceRegistry;

/// Header in which a caller declares its service name.
pub const MICROSERVICE_HEADER: &str = "Microservice";

/// Resolve which service is calling.
///
/// The connection must come from the trusted gateway address and the
/// declared name must be in the registry.
///
/// # Errors
///
/// Returns `AuthError::Forbidden` if either check fails.
pub fn resolve_caller(
    registry: &ServiceRegistry,
    config: &LiveConfig,
    remote: IpAddr,
    declared: Option<&str>,
) -> Result<Microservice, AuthError> {
    let remote = remote.to_canonical();
    let trusted = config
        .base_address()
        .and_then(|address| address.trim().parse::<IpAddr>().ok())
        .map(|address| address.to_canonical());
    if trusted != Some(remote) {
        return Err(AuthError::Forbidden(format!(
            "Unresolved IP address {remote}"
        )));
    }

    let declared = declared
        .filter(|name| !name.is_empty())
        .ok_or_else(|| AuthError::Forbidden(format!("Missing {MICROSERVICE_HEADER} header")))?;

    registry
        .lookup_name(declared)
        .map(|descriptor| descriptor.id)
        .ok_or_else(|| AuthError::Forbidden(format!("Unknown microservice {declared}")))
}

/// Per-request identity: the resolved caller and its decoded token.
#[derive(Debug, Clone)]
pub struct RequestIdentity {
    /// Service making the request.
    pub service: Microservice,
    /// Claims of the presented token.
    pub claims: Claims,
}

impl RequestIdentity {
    /// Issuer claim.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.claims.iss
    }

    /// Audience claim.
    #[must_use]
    pub fn audience(&self) -> &str {
        self.claims.audience()
    }

    /// Identity reported back to the caller.
    #[must_use]
    pub fn response(&self) -> IdentityResponse {
        IdentityResponse {
            id: self.claims.user_data,
            role: self.claims.user_data.and(self.claims.role.clone()),
            issuer_microservice: self.claims.iss.clone(),
        }
    }
}

/// Identity returned by the validation endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityResponse {
    /// Lead id, for user tokens.
    pub id: Option<i32>,
    /// Lead role, for user tokens.
    pub role: Option<Role>,
    /// Service that issued the token.
    pub issuer_microservice: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use marvelous_auth_core::config::BASE_ADDRESS;
    use std::net::Ipv6Addr;

    fn setup() -> (ServiceRegistry, LiveConfig) {
        let config = LiveConfig::new();
        config.set(BASE_ADDRESS, "10.0.0.5");
        (ServiceRegistry::new(), config)
    }

    #[test]
    fn test_resolves_known_caller() {
        let (registry, config) = setup();
        let caller = resolve_caller(
            &registry,
            &config,
            "10.0.0.5".parse().unwrap(),
            Some("MarvelousCrm"),
        );
        assert_eq!(caller, Ok(Microservice::MarvelousCrm));
    }

    #[test]
    fn test_ipv4_mapped_address_is_trusted() {
        let (registry, config) = setup();
        let mapped = IpAddr::V6(Ipv6Addr::new(0, 0, 0, 0, 0, 0xffff, 0x0a00, 0x0005));
        assert!(resolve_caller(&registry, &config, mapped, Some("MarvelousCrm")).is_ok());
    }

    #[test]
    fn test_untrusted_address() {
        let (registry, config) = setup();
        let result = resolve_caller(
            &registry,
            &config,
            "10.0.0.6".parse().unwrap(),
            Some("MarvelousCrm"),
        );
        assert!(matches!(result, Err(AuthError::Forbidden(_))));
    }

    #[test]
    fn test_missing_or_unknown_header() {
        let (registry, config) = setup();
        let remote: IpAddr = "10.0.0.5".parse().unwrap();
        for declared in [None, Some(""), Some("MarvelousFrontendCrm"), Some("marvelouscrm")] {
            let result = resolve_caller(&registry, &config, remote, declared);
            assert!(matches!(result, Err(AuthError::Forbidden(_))), "{declared:?}");
        }
    }

    #[test]
    fn test_identity_response() {
        let claims = Claims {
            iss: "MarvelousCrm".to_string(),
            aud: Some("MarvelousFrontendCrm".to_string()),
            iat: 0,
            exp: 0,
            user_data: Some(3),
            role: Some(Role::new("Regular")),
        };
        let identity = RequestIdentity {
            service: Microservice::MarvelousCrm,
            claims: claims.clone(),
        };
        assert_eq!(identity.response().id, Some(3));

        let service_identity = RequestIdentity {
            service: Microservice::MarvelousCrm,
            claims: Claims {
                user_data: None,
                ..claims
            },
        };
        let response = service_identity.response();
        assert_eq!(response.id, None);
        assert_eq!(response.role, None);
        assert_eq!(response.issuer_microservice, "MarvelousCrm");
    }
}
