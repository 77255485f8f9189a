//! Shared helpers for the HTTP integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use serde_json::Value;
use taskline_api::{AppState, config::ApiConfig};
use taskline_core::auth::password::hash_password;
use taskline_core::models::auth::{PrincipalId, Role};
use taskline_core::store::memory::InMemoryStore;
use tower::ServiceExt;

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<InMemoryStore>,
    pub app: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(ApiConfig::with_secret("integration-secret"))
    }

    pub fn with_config(config: ApiConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let state = AppState::new(config, store.clone());
        let app = taskline_api::router(state.clone());
        Self { state, store, app }
    }

    /// Seed a principal with a real bcrypt hash.
    pub async fn seed(&self, email: &str, role: Role, password: &str) -> PrincipalId {
        let hash = hash_password(password).expect("hash");
        self.store.add_principal(email, role, &hash).await
    }

    /// Access token for a seeded principal, without going through login.
    pub fn access_token(&self, id: PrincipalId) -> String {
        self.state.tokens.issue_access_token(id).expect("issue token")
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let resp = self.app.clone().oneshot(req).await.expect("request");
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("read body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("parse JSON")
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, token, Some(body)).await
    }
}
