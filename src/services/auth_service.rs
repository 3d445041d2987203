use tracing::{debug, warn};
use axum::http::{self};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation, TokenData};
use serde_json::Value;
use uuid::Uuid;

use crate::auth::auth::AuthUser;
use crate::ws::userctx;

// Get the auth token from a request
pub fn get_auth_token<B>(req: &http::Request<B>) -> Result<String, String> {
    // 1. Try to get token from Authorization header
    if let Some(auth_header) = req.headers().get(http::header::AUTHORIZATION) {
        let auth_str = auth_header.to_str().map_err(|_| "Invalid Authorization header".to_string())?;
        Ok(auth_str
            .strip_prefix("Bearer ")
            .unwrap_or(auth_str)
            .to_string())
    }
    // 2. Try to get token from cookies
    else {
        let cookie_header = req.headers().get(http::header::COOKIE)
            .ok_or_else(|| "Missing Authorization header or Cookie".to_string())?
            .to_str()
            .map_err(|_| "Invalid Cookie header".to_string())?;

        cookie::Cookie::split_parse(cookie_header)
            .flatten()
            .find(|c| c.name() == "auth_token")
            .map(|c| c.value().to_string())
            .ok_or_else(|| "auth_token cookie not found".to_string())
    }
}

// Validate a JWT token and return the token data
pub fn validate_jwt(token: &str, secret: &str) -> Result<TokenData<Value>, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<Value>(token, &decoding_key, &validation)
}

fn claim_str<'a>(claims: &'a Value, name: &str) -> Option<&'a str> {
    claims
        .get(name)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn claim_roles(claims: &Value) -> Vec<String> {
    match claims.get("roles").and_then(|v| v.as_array()) {
        Some(roles) => roles.iter().filter_map(|r| r.as_str().map(|s| s.to_string())).collect(),
        None => Vec::new(),
    }
}

// Resolve the caller from a JWT token
pub async fn authenticate(token: &str, secret: &str) -> Result<AuthUser, String> {
    let token_data = validate_jwt(token, secret).map_err(|e| format!("JWT validation failed: {}", e))?;
    let claims = &token_data.claims;

    let sub = claim_str(claims, "sub").ok_or_else(|| "JWT token does not contain 'sub' claim".to_string())?;
    let user_id = Uuid::parse_str(sub).map_err(|_| format!("JWT subject '{}' is not a user id", sub))?;

    // Display name: token claims, then the profile service, then the id itself
    let display_name = match claim_str(claims, "name").or_else(|| claim_str(claims, "email")) {
        Some(name) => name.to_string(),
        None => match userctx::get_or_fetch_user_ctx(user_id).await {
            Ok(ctx) => ctx.display_name.unwrap_or_else(|| user_id.to_string()),
            Err(e) => {
                warn!("No display name for {}: {}", user_id, e);
                user_id.to_string()
            }
        },
    };
    debug!("Authenticated user {} ({})", user_id, display_name);

    Ok(AuthUser {
        user_id,
        display_name,
        roles: claim_roles(claims),
    })
}
