use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, Level};

use reviewer_core::{RandomSource, ReviewService, StdRandom};
use reviewer_server::api::router;
use reviewer_server::config::Config;
use reviewer_server::repository::SqliteRepository;
use reviewer_server::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!(
        "Starting reviewer service v{}",
        reviewer_server::get_service_version()
    );

    let config = Config::from_env().context("Failed to load configuration from environment")?;

    let db_path = config.database_path();
    info!("Using state database: {}", db_path.display());
    let repository = SqliteRepository::new(&db_path).context("Failed to initialize SQLite database")?;

    // One generator for the lifetime of the process.
    let random: Arc<dyn RandomSource> = match config.reviewer_seed {
        Some(seed) => {
            info!("Reviewer selection seeded with {}", seed);
            Arc::new(StdRandom::seeded(seed))
        }
        None => Arc::new(StdRandom::from_entropy()),
    };

    let service = ReviewService::with_repository(Arc::new(repository), random);
    let app = router(Arc::new(AppState { service }));

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
