//! Error rendering and request extractors for axum.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json,
    extract::{ConnectInfo, FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use marvelous_auth_core::types::Microservice;

use super::AuthError;
use super::identity::{MICROSERVICE_HEADER, RequestIdentity, resolve_caller};
use crate::server::GatewayState;

/// Body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status code.
    pub code: u16,
    /// Human-readable message.
    pub message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let Self::Internal(detail) = &self {
            tracing::error!(error = %detail, "Unhandled error while serving request");
        }

        let status = self.status();
        let body = ErrorResponse {
            code: status.as_u16(),
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Extract token from an Authorization header value.
///
/// Expects format: "Bearer <token>"
#[must_use]
pub fn extract_bearer(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Extractor for the resolved calling service.
///
/// Waits for configuration initialization, then checks the peer address
/// and the `Microservice` header against the registry.
#[derive(Debug, Clone, Copy)]
pub struct CallerService(pub Microservice);

impl<S> FromRequestParts<S> for CallerService
where
    S: Send + Sync,
    Arc<GatewayState>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app = Arc::<GatewayState>::from_ref(state);

        if !app.bootstrap.wait_config(app.startup_wait).await {
            tracing::error!("Request arrived before configuration was initialized");
            return Err(AuthError::ServiceUnavailable(
                "Configuration is not initialized yet".to_string(),
            ));
        }

        let ConnectInfo(remote) = ConnectInfo::<SocketAddr>::from_request_parts(parts, state)
            .await
            .map_err(|_| AuthError::Forbidden("Unresolved IP address".to_string()))?;

        let declared = parts
            .headers
            .get(MICROSERVICE_HEADER)
            .and_then(|value| value.to_str().ok());

        resolve_caller(&app.store.registry, &app.store.config, remote.ip(), declared)
            .map(CallerService)
            .inspect_err(|e| {
                tracing::error!(remote = %remote.ip(), error = %e, "Caller identification failed");
            })
    }
}

impl<S> FromRequestParts<S> for RequestIdentity
where
    S: Send + Sync,
    Arc<GatewayState>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CallerService(service) = CallerService::from_request_parts(parts, state).await?;
        let app = Arc::<GatewayState>::from_ref(state);

        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(extract_bearer)
            .ok_or_else(|| {
                tracing::error!(service = %service, "Request has no bearer token");
                AuthError::Authentication("Missing bearer token".to_string())
            })?;

        let claims = app.engine.decode(token)?;
        Ok(Self { service, claims })
    }
}
