use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use zenbook::checkout::CheckoutClient;
use zenbook::http::{self, AppState};
use zenbook::{config, db};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/zenbook.db", cfg.app.data_dir));

    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let checkout = CheckoutClient::from_config(&cfg)?;
    let state = AppState {
        pool,
        checkout: Arc::new(checkout),
        config: Arc::new(cfg.clone()),
    };

    let app = http::router(state);
    let listener = tokio::net::TcpListener::bind(&cfg.app.bind_addr).await?;
    info!(addr = %cfg.app.bind_addr, "booking service listening");
    axum::serve(listener, app).await?;

    Ok(())
}
