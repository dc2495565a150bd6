//! Authentication and authorization for the hub.
//!
//! This module provides:
//! - PBKDF2 password hashing and verification
//! - The inter-service trust registry
//! - The credential cache and readiness flags
//! - JWT issuance and the three validation modes
//! - Caller identification and axum extractors

mod identity;
mod jwt;
mod middleware;
mod password;
mod registry;
mod store;

pub use identity::{IdentityResponse, MICROSERVICE_HEADER, RequestIdentity, resolve_caller};
pub use jwt::{Claims, TokenEngine};
pub use middleware::{CallerService, ErrorResponse, extract_bearer};
pub use password::{
    HASH_BYTE_SIZE, PBKDF2_ITERATIONS, SALT_BYTE_SIZE, hash_password, verify_password,
};
pub use registry::{
    AllowList, MicroserviceDescriptor, RegistryMap, ServiceRegistry, audience_contains,
};
pub use store::{CredentialRecord, CredentialStore, ReadinessFlag, Store};

use axum::http::StatusCode;
use marvelous_auth_core::validation::ValidationError;
use thiserror::Error;

/// Request-level error taxonomy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Malformed input.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Token structurally broken or failed the issuer/audience cross-check.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Caller lacks the specific access.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Credential absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Credential present but verification failed.
    #[error("Incorrect password")]
    IncorrectPassword,

    /// A dependency is not ready or not reachable.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// An upstream call timed out.
    #[error("Request timeout: {0}")]
    RequestTimeout(String),

    /// An upstream answered with something unusable.
    #[error("Bad gateway: {0}")]
    BadGateway(String),

    /// Inbound message or request failed field rules.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Unclassified failure.
    #[error("{0}")]
    Internal(String),
}

impl AuthError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Internal(_) => StatusCode::BAD_REQUEST,
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::IncorrectPassword => StatusCode::CONFLICT,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::RequestTimeout(_) => StatusCode::REQUEST_TIMEOUT,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<ValidationError> for AuthError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AuthError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Mask an email for logs: `john@example.com` becomes `j***@example.com`.
#[must_use]
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let first = local.chars().next().map(String::from).unwrap_or_default();
            format!("{first}***@{domain}")
        }
        None => "***".to_string(),
    }
}
