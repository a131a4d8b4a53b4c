//! Integration tests for Rural Grow.
//!
//! The full marketplace router runs in-process over the in-memory BaaS
//! backend; [`TestApp`] plays one browser, carrying its session cookie from
//! response to request. Each app gets its own SQLite session database in the
//! temp directory, removed when the last browser sharing it is dropped.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p rural-grow-integration-tests
//! ```

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use rural_grow_core::{ProductId, Role, UserId};
use rural_grow_marketplace::baas::Backend;
use rural_grow_marketplace::baas::memory::MemoryBackend;
use rural_grow_marketplace::config::{BaasConfig, MarketplaceConfig};
use rural_grow_marketplace::db;
use rural_grow_marketplace::state::AppState;
use secrecy::SecretString;
use serde_json::{Value, json};
use tower::ServiceExt;
use url::Url;
use uuid::Uuid;

/// Password used for every seeded account.
pub const PASSWORD: &str = "mavuno-2025";

/// Configuration pointing at nothing; every call goes to the memory backend.
#[must_use]
pub fn test_config() -> MarketplaceConfig {
    MarketplaceConfig {
        host: "127.0.0.1".parse().unwrap(),
        port: 3000,
        base_url: "http://localhost:3000".to_owned(),
        baas: BaasConfig {
            url: Url::parse("http://baas.invalid").unwrap(),
            api_key: SecretString::from("anon-test-key"),
        },
        role_fetch_timeout: Duration::from_secs(2),
        session_idle: Duration::from_secs(600),
        session_database_url: "sqlite::memory:".to_owned(),
        product_image_bucket: "product-images".to_owned(),
        sentry_dsn: None,
    }
}

/// A response with its body read.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    /// The body as JSON.
    #[must_use]
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    /// The redirect target, if any.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }

    /// Assert a redirect to `path`.
    pub fn assert_redirect(&self, path: &str) {
        assert!(
            self.status.is_redirection(),
            "expected redirect to {path}, got {} {:?}",
            self.status,
            String::from_utf8_lossy(&self.body)
        );
        assert_eq!(self.location(), Some(path));
    }
}

/// A session database file, deleted on drop.
#[derive(Debug)]
struct SessionDb {
    path: PathBuf,
}

impl SessionDb {
    fn temp() -> Self {
        let path = std::env::temp_dir().join(format!("rural-grow-sessions-{}.db", Uuid::new_v4()));
        Self { path }
    }

    fn url(&self) -> String {
        format!("sqlite://{}", self.path.display())
    }
}

impl Drop for SessionDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }
}

/// One browser talking to an in-process marketplace.
pub struct TestApp {
    pub backend: MemoryBackend,
    config: MarketplaceConfig,
    sessions: Arc<SessionDb>,
    router: Router,
    cookie: Option<String>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(mut config: MarketplaceConfig) -> Self {
        let sessions = Arc::new(SessionDb::temp());
        config.session_database_url = sessions.url();
        let backend = MemoryBackend::new();
        let router = start(&config, &backend).await;
        Self {
            backend,
            config,
            sessions,
            router,
            cookie: None,
        }
    }

    /// Another browser on the same marketplace, without cookies.
    #[must_use]
    pub fn other_browser(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            config: self.config.clone(),
            sessions: Arc::clone(&self.sessions),
            router: self.router.clone(),
            cookie: None,
        }
    }

    /// Replace the marketplace process: fresh state and router over a new
    /// pool on the same session database. The browser keeps its cookie; the
    /// BaaS keeps its data.
    pub async fn restart(&mut self) {
        self.router = start(&self.config, &self.backend).await;
    }

    /// Register an account with a profile and optional role.
    pub fn user(&self, email: &str, role: Option<Role>) -> UserId {
        self.backend.add_user_with_role(email, PASSWORD, role)
    }

    /// Insert an available product listed by `farmer`.
    pub fn product(&self, farmer: UserId, name: &str, price: f64) -> ProductId {
        let id = ProductId::generate();
        self.backend.insert_row(
            "products",
            json!({
                "id": id,
                "farmer_id": farmer,
                "name": name,
                "price": price,
                "unit": "kg",
                "stock_quantity": 100,
                "is_available": true,
            }),
        );
        id
    }

    pub async fn send(&mut self, request: Request<Body>) -> TestResponse {
        let mut request = request;
        if let Some(cookie) = &self.cookie {
            request
                .headers_mut()
                .insert(header::COOKIE, cookie.parse().unwrap());
        }

        let response = self.router.clone().oneshot(request).await.unwrap();
        if let Some(set_cookie) = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
        {
            let pair = set_cookie.split(';').next().unwrap_or_default();
            self.cookie = Some(pair.to_owned());
        }

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&mut self, path: &str) -> TestResponse {
        let request = Request::builder()
            .uri(path)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn post(&mut self, path: &str, body: &Value) -> TestResponse {
        let request = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn post_empty(&mut self, path: &str) -> TestResponse {
        let request = Request::builder()
            .method(Method::POST)
            .uri(path)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn sign_in(&mut self, email: &str) -> TestResponse {
        self.post(
            "/auth/sign-in",
            &json!({ "email": email, "password": PASSWORD }),
        )
        .await
    }

    pub async fn sign_out(&mut self) -> TestResponse {
        self.post_empty("/auth/sign-out").await
    }
}

/// Open the session database and build the router, as `main` does.
async fn start(config: &MarketplaceConfig, backend: &MemoryBackend) -> Router {
    let pool = db::create_pool(&config.session_database_url)
        .await
        .unwrap();
    db::migrate(&pool).await.unwrap();
    let state = AppState::with_backend(
        config.clone(),
        pool,
        Backend::from_service(backend.clone()),
    );
    rural_grow_marketplace::app(state)
}
