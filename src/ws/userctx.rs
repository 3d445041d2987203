use moka::future::Cache;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

use crate::clients::profile_client;

/// What we know about a user beyond the token
#[derive(Clone, Debug, Default)]
pub struct UserCtx {
    pub display_name: Option<String>,
}

static USER_CTX_CACHE: OnceLock<Cache<Uuid, UserCtx>> = OnceLock::new();

pub fn get_user_ctx_cache() -> &'static Cache<Uuid, UserCtx> {
    USER_CTX_CACHE.get_or_init(|| {
        info!("User cache initialized");
        Cache::builder()
            .max_capacity(100_000)
            .time_to_idle(Duration::from_secs(5 * 60))
            .build()
    })
}

async fn fetch_user_ctx_from_service(user_id: Uuid) -> Result<UserCtx, String> {
    let client = profile_client::get_profile_client()
        .ok_or_else(|| "Profile client not initialized".to_string())?;

    let profile = client.get_profile(user_id).await.map_err(|e| {
        error!("Failed to retrieve profile for user {}: {}", user_id, e);
        format!("Failed to retrieve profile: {}", e)
    })?;

    Ok(UserCtx {
        display_name: profile.best_display_name(),
    })
}

pub async fn get_or_fetch_user_ctx(user_id: Uuid) -> Result<UserCtx, String> {
    let cache = get_user_ctx_cache();

    if let Some(ctx) = cache.get(&user_id).await {
        return Ok(ctx);
    }

    info!("User context cache miss for {}. Refreshing from profile service.", user_id);
    let fetched_ctx = fetch_user_ctx_from_service(user_id).await?;

    cache.insert(user_id, fetched_ctx.clone()).await;
    Ok(fetched_ctx)
}
