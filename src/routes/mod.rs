pub mod api;
pub mod auth_middleware;

use axum::http::{header, HeaderValue, Method};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::Config;
use crate::docs::ApiDoc;
use crate::AppState;

pub use api::create_api_routes;

fn origin_allowed(allowed: &[String], origin: &str) -> bool {
    allowed.iter().any(|pattern| match pattern.strip_prefix("*.") {
        Some(domain) => origin.ends_with(&format!(".{}", domain)),
        None => pattern == origin,
    })
}

/// Exact origins plus `*.domain` wildcards; any origin in development when none are configured
pub fn cors_layer(config: &Config) -> CorsLayer {
    let allowed = config.allowed_origins();
    if allowed.is_empty() && config.is_development() {
        return CorsLayer::permissive();
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            origin.to_str().map(|o| origin_allowed(&allowed, o)).unwrap_or(false)
        }))
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// The complete application: API under `/api`, Swagger UI, CORS and tracing
pub fn create_app(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    Router::new()
        .nest("/api", create_api_routes(state))
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_origins_match_subdomains_only() {
        let allowed = vec!["https://app.example.org".to_string(), "*.preview.dev".to_string()];
        assert!(origin_allowed(&allowed, "https://app.example.org"));
        assert!(origin_allowed(&allowed, "https://pr-12.preview.dev"));
        assert!(!origin_allowed(&allowed, "https://evilpreview.dev"));
        assert!(!origin_allowed(&allowed, "https://other.example.org"));
    }
}
