//! Authentication integration tests.
//!
//! Runs the full router against a mocked Keycloak realm and checks each
//! route's 401/403/200 behaviour.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use api_service::config::Config;
use api_service::observability::metrics::init_metrics_recorder;
use api_service::routes::{self, AppState};
use auth_core::{AuthorizationGate, JwtVerifier, KeySetCache};
use auth_test_utils::{
    MockIdentityProvider, TestClaimsBuilder, TestKeyPair, RSA_KEY_1, RSA_KEY_2, TEST_CLIENT_ID,
    TEST_REALM,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;

/// Global metrics handle for test servers
static TEST_METRICS_HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> =
    OnceLock::new();

fn get_test_metrics_handle() -> metrics_exporter_prometheus::PrometheusHandle {
    TEST_METRICS_HANDLE
        .get_or_init(|| {
            init_metrics_recorder().unwrap_or_else(|_| {
                metrics_exporter_prometheus::PrometheusBuilder::new()
                    .build_recorder()
                    .handle()
            })
        })
        .clone()
}

const FRONTEND_ORIGIN: &str = "http://localhost:3000";

/// API server wired to a mock identity provider publishing one key.
struct TestApiServer {
    addr: SocketAddr,
    _server_handle: JoinHandle<()>,
    provider: MockIdentityProvider,
    key: TestKeyPair,
}

impl TestApiServer {
    async fn spawn() -> Result<Self> {
        let provider = MockIdentityProvider::start().await;
        let key = TestKeyPair::new("k1", &RSA_KEY_1);
        provider.mount_jwks(&[&key]).await;

        let vars = HashMap::from([
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("KEYCLOAK_URL".to_string(), provider.uri()),
            ("KEYCLOAK_REALM".to_string(), TEST_REALM.to_string()),
            ("API_CLIENT_ID".to_string(), TEST_CLIENT_ID.to_string()),
            (
                "CORS_ALLOWED_ORIGINS".to_string(),
                FRONTEND_ORIGIN.to_string(),
            ),
        ]);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let key_set = KeySetCache::from_provider(&config.provider, config.provider_http_timeout)?
            .with_max_age(Some(config.jwks_cache_ttl));
        let verifier = JwtVerifier::from_provider(Arc::new(key_set), &config.provider);
        let gate = AuthorizationGate::new(Arc::new(verifier));

        let state = Arc::new(AppState { config, gate });
        let app = routes::build_routes(state, get_test_metrics_handle());

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let server_handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            _server_handle: server_handle,
            provider,
            key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    fn claims(&self) -> TestClaimsBuilder {
        TestClaimsBuilder::new(&self.provider.issuer()).with_username("ada")
    }

    fn token_with_roles(&self, roles: &[&str]) -> String {
        self.key.sign(&self.claims().with_roles(roles).build())
    }

    async fn get(&self, path: &str, token: Option<&str>) -> Result<reqwest::Response> {
        let mut request = reqwest::Client::new().get(self.url(path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        Ok(request.send().await?)
    }

    async fn post_model(&self, token: &str) -> Result<reqwest::Response> {
        Ok(reqwest::Client::new()
            .post(self.url("/models"))
            .bearer_auth(token)
            .json(&json!({
                "id": "model_3",
                "name": "Lobby",
                "description": "Ground floor lobby",
                "file_path": "/models/lobby_001.ply"
            }))
            .send()
            .await?)
    }
}

impl Drop for TestApiServer {
    fn drop(&mut self) {
        self._server_handle.abort();
    }
}

async fn error_message(response: reqwest::Response) -> Result<String> {
    let body: Value = response.json().await?;
    Ok(body["error"]["message"].as_str().unwrap_or_default().to_string())
}

// =============================================================================
// Public routes
// =============================================================================

#[tokio::test]
async fn test_public_routes_need_no_token() -> Result<()> {
    let server = TestApiServer::spawn().await?;

    let root: Value = server.get("/", None).await?.json().await?;
    assert_eq!(
        root,
        json!({"message": "CareTwin 3DGS API Service", "status": "running"})
    );

    let health: Value = server.get("/health", None).await?.json().await?;
    assert_eq!(health, json!({"status": "healthy", "service": "3dgs-api"}));

    assert_eq!(server.provider.certs_request_count().await, 0);

    Ok(())
}

#[tokio::test]
async fn test_metrics_endpoint_renders_http_metrics() -> Result<()> {
    let server = TestApiServer::spawn().await?;

    server.get("/health", None).await?;
    let response = server.get("/metrics", None).await?;

    assert_eq!(response.status(), 200);
    let body = response.text().await?;
    assert!(body.contains("api_http_requests_total"));

    Ok(())
}

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn test_protected_requires_bearer_token() -> Result<()> {
    let server = TestApiServer::spawn().await?;

    let response = server.get("/protected", None).await?;

    assert_eq!(response.status(), 401);
    assert_eq!(response.headers()["www-authenticate"], "Bearer");
    assert_eq!(error_message(response).await?, "missing bearer token");

    let response = reqwest::Client::new()
        .get(server.url("/protected"))
        .header("Authorization", "Basic YWRhOnNlY3JldA==")
        .send()
        .await?;
    assert_eq!(response.status(), 401);

    assert_eq!(server.provider.certs_request_count().await, 0);

    Ok(())
}

#[tokio::test]
async fn test_invalid_tokens_get_identical_401() -> Result<()> {
    let server = TestApiServer::spawn().await?;

    let expired = server.key.sign(&server.claims().expired().build());
    let wrong_audience = server
        .key
        .sign(&server.claims().with_audience("another-client").build());
    let unknown_key = TestKeyPair::new("k2", &RSA_KEY_2).sign(&server.claims().build());

    for token in [
        expired.as_str(),
        wrong_audience.as_str(),
        unknown_key.as_str(),
        "garbage",
    ] {
        let response = server.get("/protected", Some(token)).await?;

        assert_eq!(response.status(), 401);
        assert_eq!(
            response.headers()["www-authenticate"],
            r#"Bearer error="invalid_token""#
        );
        let body: Value = response.json().await?;
        assert_eq!(
            body,
            json!({"error": {"code": "INVALID_TOKEN", "message": "invalid or expired token"}})
        );
    }

    Ok(())
}

#[tokio::test]
async fn test_protected_with_valid_token() -> Result<()> {
    let server = TestApiServer::spawn().await?;
    let token = server.token_with_roles(&["api_user"]);

    let response = server.get("/protected", Some(&token)).await?;

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(
        body,
        json!({
            "message": "Access granted to protected resource",
            "user": "ada",
            "roles": ["api_user"]
        })
    );

    Ok(())
}

#[tokio::test]
async fn test_profile_returns_identity() -> Result<()> {
    let server = TestApiServer::spawn().await?;
    let token = server.key.sign(
        &server
            .claims()
            .for_user("user-7")
            .with_email("ada@example.com")
            .with_roles(&["viewer"])
            .build(),
    );

    let body: Value = server.get("/profile", Some(&token)).await?.json().await?;

    assert_eq!(
        body,
        json!({
            "sub": "user-7",
            "email": "ada@example.com",
            "name": "ada",
            "roles": ["viewer"]
        })
    );

    Ok(())
}

#[tokio::test]
async fn test_repeat_requests_reuse_cached_keys() -> Result<()> {
    let server = TestApiServer::spawn().await?;
    let token = server.token_with_roles(&[]);

    for _ in 0..3 {
        assert_eq!(server.get("/protected", Some(&token)).await?.status(), 200);
    }

    assert_eq!(server.provider.certs_request_count().await, 1);

    Ok(())
}

// =============================================================================
// Role checks
// =============================================================================

#[tokio::test]
async fn test_admin_only_requires_admin_role() -> Result<()> {
    let server = TestApiServer::spawn().await?;

    let response = server
        .get("/admin-only", Some(&server.token_with_roles(&["api_user"])))
        .await?;
    assert_eq!(response.status(), 403);
    assert!(response.headers().get("www-authenticate").is_none());
    assert_eq!(
        error_message(response).await?,
        "Required role 'admin' not found"
    );

    let response = server
        .get("/admin-only", Some(&server.token_with_roles(&["admin"])))
        .await?;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body, json!({"message": "Admin access granted", "user": "ada"}));

    // Role checks never turn a missing token into 403
    assert_eq!(server.get("/admin-only", None).await?.status(), 401);

    Ok(())
}

#[tokio::test]
async fn test_create_model_requires_api_user_role() -> Result<()> {
    let server = TestApiServer::spawn().await?;

    let response = server.post_model(&server.token_with_roles(&["admin"])).await?;
    assert_eq!(response.status(), 403);
    assert_eq!(
        error_message(response).await?,
        "Required role 'api_user' not found"
    );

    let response = server
        .post_model(&server.token_with_roles(&["api_user"]))
        .await?;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body["message"], "Model created successfully");
    assert_eq!(body["model"]["id"], "model_3");
    assert_eq!(body["created_by"], "ada");

    Ok(())
}

// =============================================================================
// Models
// =============================================================================

#[tokio::test]
async fn test_list_models_needs_no_role() -> Result<()> {
    let server = TestApiServer::spawn().await?;

    let response = server
        .get("/models", Some(&server.token_with_roles(&[])))
        .await?;

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    let models = body["models"].as_array().unwrap();
    assert_eq!(models.len(), 2);
    assert_eq!(models.first().unwrap()["id"], "model_1");

    assert_eq!(server.get("/models", None).await?.status(), 401);

    Ok(())
}

#[tokio::test]
async fn test_get_model_by_id() -> Result<()> {
    let server = TestApiServer::spawn().await?;
    let token = server.token_with_roles(&[]);

    let response = server.get("/models/model_1", Some(&token)).await?;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await?;
    assert_eq!(body["name"], "Sample Building");

    let response = server.get("/models/model_404", Some(&token)).await?;
    assert_eq!(response.status(), 404);
    assert_eq!(error_message(response).await?, "Model not found");

    // Listed in the catalogue but not served by id.
    assert_eq!(
        server.get("/models/model_2", Some(&token)).await?.status(),
        404
    );

    assert_eq!(server.get("/models/model_1", None).await?.status(), 401);

    Ok(())
}

// =============================================================================
// CORS
// =============================================================================

#[tokio::test]
async fn test_cors_preflight_allows_configured_origin() -> Result<()> {
    let server = TestApiServer::spawn().await?;

    let response = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, server.url("/models"))
        .header("Origin", FRONTEND_ORIGIN)
        .header("Access-Control-Request-Method", "POST")
        .header("Access-Control-Request-Headers", "authorization")
        .send()
        .await?;

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        FRONTEND_ORIGIN
    );
    assert_eq!(
        response.headers()["access-control-allow-credentials"],
        "true"
    );

    let response = server.get("/health", None).await?;
    assert!(response.headers().get("access-control-allow-origin").is_none());

    Ok(())
}

#[tokio::test]
async fn test_create_model_without_description_is_unprocessable() -> Result<()> {
    let server = TestApiServer::spawn().await?;
    let token = server.token_with_roles(&["api_user"]);

    let response = reqwest::Client::new()
        .post(server.url("/models"))
        .bearer_auth(&token)
        .json(&json!({
            "id": "model_3",
            "name": "Lobby",
            "file_path": "/models/lobby_001.ply"
        }))
        .send()
        .await?;

    assert_eq!(response.status(), 422);

    Ok(())
}
