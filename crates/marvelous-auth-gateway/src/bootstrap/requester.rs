//! Outbound calls to peer services.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use marvelous_auth_core::types::Microservice;

use crate::auth::{AuthError, MICROSERVICE_HEADER};

/// Sends an authenticated GET to a peer and returns its JSON payload.
#[async_trait]
pub trait HttpRequester: Send + Sync {
    /// Call `url` on `service` with a bearer token.
    ///
    /// # Errors
    ///
    /// `RequestTimeout`, `ServiceUnavailable`, or `BadGateway` depending on
    /// how the call failed.
    async fn send(
        &self,
        url: &str,
        service: Microservice,
        token: &str,
    ) -> Result<serde_json::Value, AuthError>;
}

/// Map a response status onto the error taxonomy. `None` means success.
#[must_use]
pub fn classify_status(service: Microservice, status: u16) -> Option<AuthError> {
    match status {
        200 => None,
        408 => Some(AuthError::RequestTimeout(format!(
            "{service} did not answer in time"
        ))),
        503 => Some(AuthError::ServiceUnavailable(format!(
            "{service} is unavailable"
        ))),
        other => Some(AuthError::BadGateway(format!(
            "{service} answered with status {other}"
        ))),
    }
}

/// [`HttpRequester`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestRequester {
    client: Client,
}

impl ReqwestRequester {
    /// Create a requester with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Internal(format!("HTTP client setup failed: {e}")))?;
        Ok(Self { client })
    }

    fn transport_error(service: Microservice, err: &reqwest::Error) -> AuthError {
        if err.is_timeout() {
            AuthError::RequestTimeout(format!("{service} did not answer in time"))
        } else if err.is_connect() {
            AuthError::ServiceUnavailable(format!("{service} is unreachable: {err}"))
        } else {
            AuthError::BadGateway(format!("{service} call failed: {err}"))
        }
    }
}

#[async_trait]
impl HttpRequester for ReqwestRequester {
    async fn send(
        &self,
        url: &str,
        service: Microservice,
        token: &str,
    ) -> Result<serde_json::Value, AuthError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .header(MICROSERVICE_HEADER, Microservice::MarvelousAuth.as_str())
            .send()
            .await
            .map_err(|e| Self::transport_error(service, &e))?;

        if let Some(err) = classify_status(service, response.status().as_u16()) {
            return Err(err);
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Self::transport_error(service, &e))?;

        match serde_json::from_slice::<serde_json::Value>(&body) {
            Ok(serde_json::Value::Null) => Err(AuthError::BadGateway(format!(
                "{service} returned an empty body"
            ))),
            Ok(payload) => Ok(payload),
            Err(e) => Err(AuthError::BadGateway(format!(
                "{service} returned an unparsable body: {e}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        let service = Microservice::MarvelousCrm;
        assert_eq!(classify_status(service, 200), None);
        assert!(matches!(
            classify_status(service, 408),
            Some(AuthError::RequestTimeout(_))
        ));
        assert!(matches!(
            classify_status(service, 503),
            Some(AuthError::ServiceUnavailable(_))
        ));
        for status in [201, 204, 400, 401, 404, 500, 502] {
            assert!(matches!(
                classify_status(service, status),
                Some(AuthError::BadGateway(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_unreachable_peer() {
        let requester = ReqwestRequester::new(Duration::from_secs(2)).unwrap();
        // Port 9 on loopback (discard) is closed on test hosts.
        let result = requester
            .send("http://127.0.0.1:9/api/leads", Microservice::MarvelousCrm, "t")
            .await;
        assert!(matches!(
            result,
            Err(AuthError::ServiceUnavailable(_) | AuthError::RequestTimeout(_))
        ));
    }
}
