//! HTTP surface of the hub.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    routing::{get, post},
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use validator::Validate;

use marvelous_auth_core::config::{Config, LiveConfig};
use marvelous_auth_core::types::Microservice;
use marvelous_auth_core::validation::LoginRequest;

use crate::GatewayError;
use crate::auth::{
    AuthError, CallerService, IdentityResponse, RequestIdentity, Store, TokenEngine,
    hash_password,
};
use crate::bootstrap::{
    BootstrapHandle, BootstrapOrchestrator, FailureNotifier, HttpRequester, LogNotifier,
    ReqwestRequester,
};

/// State shared across handlers.
pub struct GatewayState {
    /// Registry, credentials, and live configuration.
    pub store: Arc<Store>,
    /// Token engine.
    pub engine: TokenEngine,
    /// Bootstrap progress.
    pub bootstrap: BootstrapHandle,
    /// How long a request waits on bootstrap before giving up.
    pub startup_wait: Duration,
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("bootstrap", &self.bootstrap.status())
            .field("startup_wait", &self.startup_wait)
            .finish_non_exhaustive()
    }
}

/// Build the router over shared state.
pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/token-microservice", get(service_token_handler))
        .route(
            "/api/auth/check-validate-token-microservices",
            get(validate_among_services_handler),
        )
        .route(
            "/api/auth/check-validate-token-front",
            get(validate_frontend_handler),
        )
        .route(
            "/api/auth/check-double-validate-token",
            get(validate_double_handler),
        )
        .route("/api/auth/hashing", post(hashing_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The hub server.
pub struct Gateway {
    config: Config,
    state: Arc<GatewayState>,
    orchestrator: Arc<BootstrapOrchestrator>,
}

/// Builder for constructing a Gateway with its collaborators.
pub struct GatewayBuilder {
    config: Config,
    requester: Option<Arc<dyn HttpRequester>>,
    notifier: Option<Arc<dyn FailureNotifier>>,
}

impl GatewayBuilder {
    /// Create a new builder with default config.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            requester: None,
            notifier: None,
        }
    }

    /// Set configuration.
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set the outbound requester.
    #[must_use]
    pub fn with_requester(mut self, requester: Arc<dyn HttpRequester>) -> Self {
        self.requester = Some(requester);
        self
    }

    /// Set the failure notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn FailureNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Build the gateway.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn build(self) -> Result<Gateway, GatewayError> {
        let auth = &self.config.auth;
        if auth.secret_key.is_none() {
            tracing::warn!("No signing secret configured, token issuance fails until one is set");
        }

        let store = Arc::new(Store::new(LiveConfig::from_config(&self.config)));
        let engine = TokenEngine::new(Arc::clone(&store), auth.token_lifetime_minutes);

        let requester = match self.requester {
            Some(requester) => requester,
            None => Arc::new(
                ReqwestRequester::new(Duration::from_secs(auth.request_timeout_secs))
                    .map_err(|e| GatewayError::Config(e.to_string()))?,
            ),
        };
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(LogNotifier));

        let orchestrator = Arc::new(BootstrapOrchestrator::new(
            Arc::clone(&store),
            engine.clone(),
            requester,
            notifier,
            self.config.upstream.clone(),
            Duration::from_secs(auth.retry_interval_secs),
        ));

        let state = Arc::new(GatewayState {
            store,
            engine,
            bootstrap: orchestrator.handle(),
            startup_wait: Duration::from_secs(auth.startup_wait_secs),
        });

        Ok(Gateway {
            config: self.config,
            state,
            orchestrator,
        })
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Gateway {
    /// Shared handler state.
    #[must_use]
    pub fn state(&self) -> Arc<GatewayState> {
        Arc::clone(&self.state)
    }

    /// Shared store, for wiring message consumers.
    #[must_use]
    pub fn store(&self) -> Arc<Store> {
        Arc::clone(&self.state.store)
    }

    /// Bootstrap orchestrator.
    #[must_use]
    pub fn orchestrator(&self) -> Arc<BootstrapOrchestrator> {
        Arc::clone(&self.orchestrator)
    }

    /// Router over this gateway's state.
    #[must_use]
    pub fn router(&self) -> Router {
        router(self.state())
    }

    /// Run bootstrap and the HTTP server until `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns error if the listen address is invalid or the server fails.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), GatewayError> {
        let orchestrator = self.orchestrator();
        let bootstrap_cancel = cancel.child_token();
        let bootstrap = tokio::spawn(async move { orchestrator.run(bootstrap_cancel).await });

        let server = &self.config.server;
        let addr: SocketAddr = format!("{}:{}", server.mode.host(), server.port)
            .parse()
            .map_err(|e| GatewayError::Config(format!("Invalid address: {e}")))?;

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, "Auth hub listening");

        let shutdown = cancel.clone();
        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| GatewayError::Server(e.to_string()))?;

        cancel.cancel();
        bootstrap
            .await
            .map_err(|e| GatewayError::Server(format!("Bootstrap task panic: {e}")))?;
        tracing::info!("Auth hub stopped");
        Ok(())
    }
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "configReady": state.store.config_ready.is_ready(),
        "credentialsReady": state.store.credentials_ready.is_ready(),
        "bootstrap": state.bootstrap.status(),
    }))
}

async fn login_handler(
    State(state): State<Arc<GatewayState>>,
    CallerService(service): CallerService,
    body: Bytes,
) -> Result<Json<String>, AuthError> {
    if body.is_empty() {
        tracing::error!(service = %service, "Login request without body");
        return Err(AuthError::BadRequest("Login request is missing".to_string()));
    }
    let request: LoginRequest = serde_json::from_slice(&body).map_err(|e| {
        tracing::error!(service = %service, error = %e, "Malformed login request");
        AuthError::BadRequest(format!("Malformed login request: {e}"))
    })?;
    request.validate().inspect_err(|e| {
        tracing::error!(service = %service, error = %e, "Invalid login request");
    })?;

    if !state
        .bootstrap
        .wait_first_credentials_cycle(state.startup_wait)
        .await
    {
        tracing::warn!("Credential bootstrap still running after startup wait");
    }

    let token = state
        .engine
        .issue_for_user(&request.email, &request.password, service)?;
    Ok(Json(token))
}

async fn service_token_handler(
    State(state): State<Arc<GatewayState>>,
    CallerService(service): CallerService,
) -> Result<Json<String>, AuthError> {
    state.engine.issue_for_service(service).map(Json)
}

async fn validate_among_services_handler(
    State(state): State<Arc<GatewayState>>,
    identity: RequestIdentity,
) -> Result<Json<IdentityResponse>, AuthError> {
    if identity.issuer() == Microservice::MarvelousAuth.as_str() {
        tracing::info!(service = %identity.service, "Accepted token issued by this service");
        return Ok(Json(identity.response()));
    }

    state.engine.validate_among_services(
        identity.issuer(),
        identity.audience(),
        identity.service,
    )?;
    Ok(Json(identity.response()))
}

async fn validate_frontend_handler(
    State(state): State<Arc<GatewayState>>,
    identity: RequestIdentity,
) -> Result<Json<IdentityResponse>, AuthError> {
    state
        .engine
        .validate_frontend(identity.issuer(), identity.audience(), identity.service)?;

    let response = identity.response();
    if response.id.is_none() {
        tracing::warn!(service = %identity.service, "Frontend token carries no lead data");
        return Err(AuthError::Forbidden(format!(
            "Token presented to {} carries no lead data",
            identity.service
        )));
    }
    Ok(Json(response))
}

async fn validate_double_handler(
    State(state): State<Arc<GatewayState>>,
    identity: RequestIdentity,
) -> Result<Json<IdentityResponse>, AuthError> {
    state
        .engine
        .validate_double(identity.issuer(), identity.audience(), identity.service)?;
    Ok(Json(identity.response()))
}

async fn hashing_handler(
    CallerService(service): CallerService,
    body: Bytes,
) -> Result<Json<String>, AuthError> {
    tracing::info!(service = %service, "Password hashing requested");

    let password = if body.is_empty() {
        None
    } else {
        serde_json::from_slice::<Option<String>>(&body)
            .map_err(|e| AuthError::BadRequest(format!("Malformed hashing request: {e}")))?
    };

    match password.filter(|p| !p.is_empty()) {
        Some(password) => Ok(Json(hash_password(&password))),
        None => {
            tracing::error!(service = %service, "Hashing request without password");
            Err(AuthError::BadRequest("Password is empty".to_string()))
        }
    }
}
