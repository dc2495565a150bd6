//! Token issuance and validation.

use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use marvelous_auth_core::types::{Microservice, Role};

use super::password::verify_password;
use super::registry::audience_contains;
use super::store::{CredentialRecord, Store};
use super::{AuthError, mask_email};

const DEFAULT_LIFETIME_MINUTES: i64 = 30;

/// JWT claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Service that issued the token.
    pub iss: String,
    /// Comma-joined list of principals allowed to accept the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Expiration (Unix timestamp).
    pub exp: i64,
    /// Lead id, for user tokens.
    #[serde(rename = "userData", default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<i32>,
    /// Lead role, for user tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl Claims {
    /// The audience claim, or empty if absent.
    #[must_use]
    pub fn audience(&self) -> &str {
        self.aud.as_deref().unwrap_or_default()
    }
}

/// Issues tokens and checks them against the trust registry.
///
/// The signing secret is read from the live configuration on every call,
/// so a configuration change takes effect without a restart.
#[derive(Clone)]
pub struct TokenEngine {
    store: Arc<Store>,
    lifetime: chrono::Duration,
}

impl TokenEngine {
    /// Create an engine over the shared store.
    #[must_use]
    pub fn new(store: Arc<Store>, lifetime_minutes: i64) -> Self {
        let lifetime = chrono::Duration::try_minutes(lifetime_minutes)
            .filter(|d| *d > chrono::Duration::zero())
            .unwrap_or_else(|| chrono::Duration::minutes(DEFAULT_LIFETIME_MINUTES));
        Self { store, lifetime }
    }

    /// Issue a frontend token for a lead.
    ///
    /// # Errors
    ///
    /// `ServiceUnavailable` before credentials are loaded, `NotFound` for an
    /// unknown email, `IncorrectPassword` on mismatch.
    pub fn issue_for_user(
        &self,
        email: &str,
        password: &str,
        calling: Microservice,
    ) -> Result<String, AuthError> {
        let result = self.try_issue_for_user(email, password, calling);
        match &result {
            Ok(_) => tracing::info!(
                service = %calling,
                email = %mask_email(email),
                "Issued lead token"
            ),
            Err(e) => tracing::error!(
                service = %calling,
                email = %mask_email(email),
                error = %e,
                "Lead token refused"
            ),
        }
        result
    }

    fn try_issue_for_user(
        &self,
        email: &str,
        password: &str,
        calling: Microservice,
    ) -> Result<String, AuthError> {
        if !self.store.credentials_ready.is_ready() {
            return Err(AuthError::ServiceUnavailable(
                "Lead credentials are not loaded yet".to_string(),
            ));
        }

        let record = self.store.credentials.get(email).ok_or_else(|| {
            AuthError::NotFound(format!("Lead with email {} not found", mask_email(email)))
        })?;

        let verified = !record.password_hash.is_empty()
            && verify_password(password, &record.password_hash)?;
        if !verified {
            return Err(AuthError::IncorrectPassword);
        }

        self.sign(calling, Some(&record))
    }

    /// Issue a token for a service. Not gated on credential readiness.
    ///
    /// # Errors
    ///
    /// `Forbidden` for an unregistered service, `Internal` if no signing
    /// secret is configured.
    pub fn issue_for_service(&self, calling: Microservice) -> Result<String, AuthError> {
        let result = self.sign(calling, None);
        match &result {
            Ok(_) => tracing::info!(service = %calling, "Issued service token"),
            Err(e) => tracing::error!(service = %calling, error = %e, "Service token refused"),
        }
        result
    }

    /// Check a token issued by one peer and presented to another.
    ///
    /// The audience must equal the issuer's current allow-list verbatim,
    /// then the calling service must be one of its members.
    ///
    /// # Errors
    ///
    /// `Authentication` on an unknown issuer or audience mismatch,
    /// `Forbidden` if the caller is not in the audience.
    pub fn validate_among_services(
        &self,
        issuer: &str,
        audience: &str,
        calling: Microservice,
    ) -> Result<(), AuthError> {
        let result = self.check_among_services(issuer, audience, calling);
        log_validation("among services", issuer, calling, &result);
        result
    }

    fn check_among_services(
        &self,
        issuer: &str,
        audience: &str,
        calling: Microservice,
    ) -> Result<(), AuthError> {
        match self.store.registry.lookup_name(issuer) {
            Some(descriptor) if descriptor.allowed_callers.matches_claim(audience) => {}
            Some(_) => {
                return Err(AuthError::Authentication(format!(
                    "Broken token: audience does not match the allow-list of {issuer}"
                )));
            }
            None => {
                return Err(AuthError::Authentication(format!(
                    "Broken token: unknown issuer {issuer}"
                )));
            }
        }

        if !audience_contains(audience, calling.as_str()) {
            return Err(AuthError::Forbidden(format!(
                "{calling} does not have access to tokens issued by {issuer}"
            )));
        }
        Ok(())
    }

    /// Check a frontend token presented back to the service that issued it.
    ///
    /// # Errors
    ///
    /// `Authentication` if the issuer is not the calling service,
    /// `Forbidden` if the caller's frontend is not in the audience.
    pub fn validate_frontend(
        &self,
        issuer: &str,
        audience: &str,
        calling: Microservice,
    ) -> Result<(), AuthError> {
        let result = self.check_frontend(issuer, audience, calling);
        log_validation("frontend", issuer, calling, &result);
        result
    }

    fn check_frontend(
        &self,
        issuer: &str,
        audience: &str,
        calling: Microservice,
    ) -> Result<(), AuthError> {
        if issuer != calling.as_str() {
            return Err(AuthError::Authentication(format!(
                "Broken token: issued by {issuer}, presented by {calling}"
            )));
        }

        let frontend = self
            .store
            .registry
            .lookup(calling)
            .map(|descriptor| descriptor.frontend)
            .ok_or_else(|| {
                AuthError::Forbidden(format!("{calling} is not a registered microservice"))
            })?;

        if !audience_contains(audience, frontend.as_str()) {
            return Err(AuthError::Forbidden(format!(
                "{frontend} is not in the token audience"
            )));
        }
        Ok(())
    }

    /// Accept either token shape: self-issued goes through frontend
    /// validation, peer-issued through among-services validation.
    ///
    /// # Errors
    ///
    /// Whatever the selected validation returns.
    pub fn validate_double(
        &self,
        issuer: &str,
        audience: &str,
        calling: Microservice,
    ) -> Result<(), AuthError> {
        if issuer == calling.as_str() {
            self.validate_frontend(issuer, audience, calling)
        } else {
            self.validate_among_services(issuer, audience, calling)
        }
    }

    /// Verify signature and expiry, and require an audience claim.
    ///
    /// # Errors
    ///
    /// `Authentication` for any garbled, expired, or audience-less token.
    pub fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        let secret = self.secret()?;
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;

        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| AuthError::Authentication(format!("Broken token: {e}")));

        let claims = match claims {
            Ok(claims) if claims.aud.as_deref().is_none_or(str::is_empty) => Err(
                AuthError::Authentication("Broken token: token has no audience".to_string()),
            ),
            other => other,
        };

        if let Err(e) = &claims {
            tracing::error!(error = %e, "Token decoding failed");
        }
        claims
    }

    fn sign(
        &self,
        issuer: Microservice,
        subject: Option<&CredentialRecord>,
    ) -> Result<String, AuthError> {
        let descriptor = self.store.registry.lookup(issuer).ok_or_else(|| {
            AuthError::Forbidden(format!("{issuer} is not a registered microservice"))
        })?;
        let secret = self.secret()?;

        let now = Utc::now();
        let claims = Claims {
            iss: issuer.to_string(),
            aud: Some(descriptor.allowed_callers.to_string()),
            iat: now.timestamp(),
            exp: (now + self.lifetime).timestamp(),
            user_data: subject.map(|record| record.user_id),
            role: subject
                .map(|record| record.role.clone())
                .filter(|role| !role.is_absent()),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|e| AuthError::Internal(format!("Token encoding failed: {e}")))
    }

    fn secret(&self) -> Result<String, AuthError> {
        self.store
            .config
            .secret_key()
            .ok_or_else(|| AuthError::Internal("Signing secret is not configured".to_string()))
    }
}

fn log_validation(
    mode: &str,
    issuer: &str,
    calling: Microservice,
    result: &Result<(), AuthError>,
) {
    match result {
        Ok(()) => tracing::info!(mode, issuer, service = %calling, "Token validated"),
        Err(e) => tracing::error!(
            mode,
            issuer,
            service = %calling,
            error = %e,
            "Token validation failed"
        ),
    }
}

impl std::fmt::Debug for TokenEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenEngine")
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}
