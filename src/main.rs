use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use listing_tracker::config::StoreBackend;
use listing_tracker::{router, AppState, Config, MemoryStore, SessionStore, SupabaseStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "listing_tracker=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Listing Tracker...");

    // Load configuration
    let config = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    tracing::info!(
        "Environment: {}, Server: {}, Site: {}",
        config.environment,
        config.server_address(),
        config.site_url
    );

    // Connect the session store
    let store: Arc<dyn SessionStore> = match config.store_backend {
        StoreBackend::Supabase => Arc::new(SupabaseStore::new(
            &config.supabase_url,
            &config.supabase_anon_key,
            Duration::from_secs(config.store_timeout_secs),
        )?),
        StoreBackend::Memory => {
            tracing::warn!(
                "Using in-memory session store; data is lost on restart and browser sign-in cannot complete"
            );
            Arc::new(MemoryStore::new())
        }
    };

    // Configure CORS
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid allowed origin: {}", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    let state = AppState::new(store, config.clone());

    let mut app = router(state).layer(cors);
    if config.log_requests {
        app = app.layer(TraceLayer::new_for_http());
    }

    // Start server
    let listener = tokio::net::TcpListener::bind(config.server_address()).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
