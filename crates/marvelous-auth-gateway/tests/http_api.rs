//! End-to-end tests of the HTTP surface over a bootstrapped gateway.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    extract::connect_info::MockConnectInfo,
    http::{Request, StatusCode, header::AUTHORIZATION},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use marvelous_auth_core::config::Config;
use marvelous_auth_core::types::Microservice;
use marvelous_auth_gateway::auth::{AuthError, hash_password, verify_password};
use marvelous_auth_gateway::bootstrap::HttpRequester;
use marvelous_auth_gateway::{Gateway, GatewayBuilder};

const LEAD_EMAIL: &str = "lead@marvelous.io";
const LEAD_PASSWORD: &str = "correct horse battery staple";

/// Upstream stand-in: configs answer with nothing, the CRM with one lead.
struct Upstream {
    lead_hash: String,
}

#[async_trait]
impl HttpRequester for Upstream {
    async fn send(&self, _url: &str, service: Microservice, _token: &str) -> Result<Value, AuthError> {
        match service {
            Microservice::MarvelousConfigs => Ok(json!([])),
            Microservice::MarvelousCrm => Ok(json!([{
                "id": 42,
                "email": LEAD_EMAIL,
                "role": "Vip",
                "hashPassword": self.lead_hash,
            }])),
            other => Err(AuthError::ServiceUnavailable(format!("{other} is down"))),
        }
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.auth.secret_key = Some("integration-test-secret".to_string());
    config.auth.startup_wait_secs = 1;
    config.server.trusted_gateway = "127.0.0.1".to_string();
    config.upstream.configs_url = Some("http://configs".to_string());
    config.upstream.crm_url = Some("http://crm".to_string());
    config.upstream.reporting_url = Some("http://reporting".to_string());
    config
}

async fn bootstrapped_gateway() -> Gateway {
    let gateway = GatewayBuilder::new()
        .with_config(test_config())
        .with_requester(Arc::new(Upstream {
            lead_hash: hash_password(LEAD_PASSWORD),
        }))
        .build()
        .unwrap();

    let orchestrator = gateway.orchestrator();
    orchestrator.initialize_config().await;
    assert!(orchestrator.initialize_credentials().await);
    gateway
}

fn app(gateway: &Gateway, remote: [u8; 4]) -> Router {
    gateway
        .router()
        .layer(MockConnectInfo(SocketAddr::from((remote, 40_000))))
}

fn request(method: &str, uri: &str, service: Option<&str>, token: Option<&str>, body: Body) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(service) = service {
        builder = builder.header("Microservice", service);
    }
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(body).unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, value)
}

async fn login(gateway: &Gateway, service: &str, email: &str, password: &str) -> (StatusCode, Value) {
    let body = json!({ "email": email, "password": password }).to_string();
    send(
        app(gateway, [127, 0, 0, 1]),
        request("POST", "/api/auth/login", Some(service), None, Body::from(body)),
    )
    .await
}

async fn service_token(gateway: &Gateway, service: &str) -> String {
    let (status, token) = send(
        app(gateway, [127, 0, 0, 1]),
        request("GET", "/api/auth/token-microservice", Some(service), None, Body::empty()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    token.as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_reports_readiness() {
    let gateway = bootstrapped_gateway().await;
    let (status, body) = send(
        app(&gateway, [127, 0, 0, 1]),
        request("GET", "/health", None, None, Body::empty()),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["configReady"], json!(true));
    assert_eq!(body["credentialsReady"], json!(true));
    assert_eq!(body["bootstrap"]["credentialCycles"], json!(1));
}

#[tokio::test]
async fn login_then_validate_on_frontend() {
    let gateway = bootstrapped_gateway().await;

    let (status, token) = login(&gateway, "MarvelousCrm", LEAD_EMAIL, LEAD_PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
    let token = token.as_str().unwrap().to_string();

    let (status, identity) = send(
        app(&gateway, [127, 0, 0, 1]),
        request(
            "GET",
            "/api/auth/check-validate-token-front",
            Some("MarvelousCrm"),
            Some(&token),
            Body::empty(),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        identity,
        json!({ "id": 42, "role": "Vip", "issuerMicroservice": "MarvelousCrm" })
    );

    // The same token presented by another service is not a frontend token for it.
    let (status, _) = send(
        app(&gateway, [127, 0, 0, 1]),
        request(
            "GET",
            "/api/auth/check-validate-token-front",
            Some("MarvelousReporting"),
            Some(&token),
            Body::empty(),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_failures_map_to_statuses() {
    let gateway = bootstrapped_gateway().await;

    let (status, body) = login(&gateway, "MarvelousCrm", LEAD_EMAIL, "wrong").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], json!(409));

    let (status, _) = login(&gateway, "MarvelousCrm", "nobody@marvelous.io", LEAD_PASSWORD).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = login(&gateway, "MarvelousCrm", "", LEAD_PASSWORD).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(
        app(&gateway, [127, 0, 0, 1]),
        request("POST", "/api/auth/login", Some("MarvelousCrm"), None, Body::empty()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn service_token_is_checked_against_the_issuer_allow_list() {
    let gateway = bootstrapped_gateway().await;
    let token = service_token(&gateway, "MarvelousCrm").await;

    let (status, identity) = send(
        app(&gateway, [127, 0, 0, 1]),
        request(
            "GET",
            "/api/auth/check-validate-token-microservices",
            Some("MarvelousTransactionStore"),
            Some(&token),
            Body::empty(),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        identity,
        json!({ "id": null, "role": null, "issuerMicroservice": "MarvelousCrm" })
    );

    let (status, _) = send(
        app(&gateway, [127, 0, 0, 1]),
        request(
            "GET",
            "/api/auth/check-validate-token-microservices",
            Some("MarvelousResource"),
            Some(&token),
            Body::empty(),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn own_tokens_pass_among_services_validation() {
    let gateway = bootstrapped_gateway().await;
    let token = service_token(&gateway, "MarvelousAuth").await;

    // MarvelousResource is not on MarvelousAuth's allow-list.
    let (status, identity) = send(
        app(&gateway, [127, 0, 0, 1]),
        request(
            "GET",
            "/api/auth/check-validate-token-microservices",
            Some("MarvelousResource"),
            Some(&token),
            Body::empty(),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(identity["issuerMicroservice"], json!("MarvelousAuth"));

    let (status, _) = send(
        app(&gateway, [127, 0, 0, 1]),
        request(
            "GET",
            "/api/auth/check-double-validate-token",
            Some("MarvelousResource"),
            Some(&token),
            Body::empty(),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn double_validation_dispatches_on_issuer() {
    let gateway = bootstrapped_gateway().await;

    let (_, user_token) = login(&gateway, "MarvelousCrm", LEAD_EMAIL, LEAD_PASSWORD).await;
    let user_token = user_token.as_str().unwrap().to_string();
    let (status, identity) = send(
        app(&gateway, [127, 0, 0, 1]),
        request(
            "GET",
            "/api/auth/check-double-validate-token",
            Some("MarvelousCrm"),
            Some(&user_token),
            Body::empty(),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(identity["id"], json!(42));

    let peer_token = service_token(&gateway, "MarvelousCrm").await;
    let (status, identity) = send(
        app(&gateway, [127, 0, 0, 1]),
        request(
            "GET",
            "/api/auth/check-double-validate-token",
            Some("MarvelousTransactionStore"),
            Some(&peer_token),
            Body::empty(),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(identity["issuerMicroservice"], json!("MarvelousCrm"));
}

#[tokio::test]
async fn callers_outside_the_trusted_gateway_are_refused() {
    let gateway = bootstrapped_gateway().await;

    let (status, body) = send(
        app(&gateway, [10, 1, 1, 1]),
        request("GET", "/api/auth/token-microservice", Some("MarvelousCrm"), None, Body::empty()),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], json!(403));

    let (status, _) = send(
        app(&gateway, [127, 0, 0, 1]),
        request("GET", "/api/auth/token-microservice", None, None, Body::empty()),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        app(&gateway, [127, 0, 0, 1]),
        request("GET", "/api/auth/token-microservice", Some("MarvelousUnknown"), None, Body::empty()),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn validation_requires_a_bearer_token() {
    let gateway = bootstrapped_gateway().await;

    let (status, _) = send(
        app(&gateway, [127, 0, 0, 1]),
        request(
            "GET",
            "/api/auth/check-validate-token-microservices",
            Some("MarvelousCrm"),
            None,
            Body::empty(),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        app(&gateway, [127, 0, 0, 1]),
        request(
            "GET",
            "/api/auth/check-validate-token-microservices",
            Some("MarvelousCrm"),
            Some("not.a.token"),
            Body::empty(),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn hashing_returns_a_verifiable_hash() {
    let gateway = bootstrapped_gateway().await;

    let (status, hash) = send(
        app(&gateway, [127, 0, 0, 1]),
        request(
            "POST",
            "/api/auth/hashing",
            Some("MarvelousCrm"),
            None,
            Body::from(json!("s3cret").to_string()),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let hash = hash.as_str().unwrap();
    assert!(hash.starts_with("1000:"));
    assert!(verify_password("s3cret", hash).unwrap());

    let (status, _) = send(
        app(&gateway, [127, 0, 0, 1]),
        request(
            "POST",
            "/api/auth/hashing",
            Some("MarvelousCrm"),
            None,
            Body::from(json!("").to_string()),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn requests_wait_for_configuration() {
    let mut config = test_config();
    config.auth.startup_wait_secs = 0;
    let gateway = GatewayBuilder::new()
        .with_config(config)
        .with_requester(Arc::new(Upstream {
            lead_hash: hash_password(LEAD_PASSWORD),
        }))
        .build()
        .unwrap();

    let (status, _) = send(
        app(&gateway, [127, 0, 0, 1]),
        request("GET", "/api/auth/token-microservice", Some("MarvelousCrm"), None, Body::empty()),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
