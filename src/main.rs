use route_coedit::clients::profile_client;
use route_coedit::clients::route_directory::{MemoryRouteDirectory, RouteDirectory};
use route_coedit::config::Config;
use route_coedit::db::{self, dbproposals::PgProposalStore, dbroutes::PgRouteDirectory};
use route_coedit::routes::create_app;
use route_coedit::services::coordinator::{Coordinator, CoordinatorSettings};
use route_coedit::services::proposal_store::{MemoryProposalStore, ProposalStore};
use route_coedit::services::sweeper::{spawn_sweeper, SweepIntervals};
use route_coedit::AppState;
use sqlx::postgres::PgPool;
use std::error::Error;
use std::panic;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

type Stores = (Arc<dyn RouteDirectory>, Arc<dyn ProposalStore>, Option<PgPool>);

fn memory_stores() -> Stores {
    (Arc::new(MemoryRouteDirectory::new()), Arc::new(MemoryProposalStore::new()), None)
}

async fn init_stores(config: &Config) -> Stores {
    let Some(db_url) = &config.db_url else {
        warn!("No database URL configured - using in-memory route and proposal storage");
        return memory_stores();
    };

    match db::connect(db_url).await {
        Ok(pool) => {
            info!("Database initialized successfully");
            (
                Arc::new(PgRouteDirectory::new(pool.clone())),
                Arc::new(PgProposalStore::new(pool.clone())),
                Some(pool),
            )
        }
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            warn!("Falling back to in-memory route and proposal storage");
            memory_stores()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {

    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level, but allow debug for our app
            "route_coedit=debug,tower_http=debug,axum::rejection=trace,info".into()
        }))
        .init();

    info!("Starting server...");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });

    match (&config.profile_service_url, &config.auth_jwt_secret) {
        (Some(url), Some(secret)) => {
            profile_client::init_profile_client(url.clone(), secret.clone(), config.service_name.clone())?;
            info!("Profile client initialized for {}", url);
        }
        _ => warn!("Profile service not configured - display names come from tokens only"),
    }
    if config.auth_jwt_secret.is_none() {
        warn!("AUTH_JWT_SECRET is not set - authenticated endpoints will reject every request");
    }

    let (routes, proposals, pool) = init_stores(&config).await;

    let coordinator = Arc::new(Coordinator::new(
        CoordinatorSettings::from_config(&config),
        routes,
        proposals,
    ));
    spawn_sweeper(
        coordinator.clone(),
        SweepIntervals {
            sessions: config.session_sweep_interval(),
            locks: config.drag_lock_sweep_interval(),
            proposals: config.proposal_archive_sweep_interval(),
        },
    );

    let address = config.server_address();
    let state = AppState {
        config: Arc::new(config),
        coordinator,
        db: pool,
    };
    info!("Using {} storage", state.storage_name());
    let app = create_app(state);

    // Start the HTTP/API server
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!("🚀 Server running on http://{}", address);
    info!("📡 Route channels available at ws://{}/api/routes/{{route_id}}/channel", address);
    info!("📚 Swagger UI available at http://{}/swagger", address);

    axum::serve(listener, app).await?;
    Ok(())
}
