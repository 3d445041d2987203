#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use jsonwebtoken::{encode, EncodingKey, Header};
use route_coedit::clients::route_directory::MemoryRouteDirectory;
use route_coedit::config::Config;
use route_coedit::models::Coordinate;
use route_coedit::routes::create_app;
use route_coedit::services::coordinator::{Coordinator, CoordinatorSettings};
use route_coedit::services::proposal_store::MemoryProposalStore;
use route_coedit::AppState;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

pub const SECRET: &str = "integration-secret";

pub struct TestApp {
    pub app: Router,
    pub routes: Arc<MemoryRouteDirectory>,
    pub coordinator: Arc<Coordinator>,
}

/// App on in-memory storage with one JWT secret
pub fn test_app() -> TestApp {
    let config = Config {
        auth_jwt_secret: Some(SECRET.to_string()),
        ..Config::default()
    };
    let routes = Arc::new(MemoryRouteDirectory::new());
    let coordinator = Arc::new(Coordinator::new(
        CoordinatorSettings::default(),
        routes.clone(),
        Arc::new(MemoryProposalStore::new()),
    ));
    let state = AppState {
        config: Arc::new(config),
        coordinator: coordinator.clone(),
        db: None,
    };
    TestApp {
        app: create_app(state),
        routes,
        coordinator,
    }
}

pub fn token(user_id: Uuid, name: &str, roles: &[&str]) -> String {
    let claims = json!({
        "sub": user_id.to_string(),
        "name": name,
        "roles": roles,
        "exp": (Utc::now() + Duration::minutes(10)).timestamp(),
    });
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

/// Route with three points, owned by `owner`
pub fn seed_route(app: &TestApp, owner: Uuid) -> Uuid {
    let route_id = Uuid::new_v4();
    app.routes.insert_route(
        route_id,
        owner,
        vec![Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 1.0), Coordinate::new(2.0, 2.0)],
    );
    route_id
}

pub async fn send(app: &TestApp, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}
