use anyhow::Result;
use axum::Router;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, Level};

use riskguard::config::RiskConfig;
use riskguard::refresh::Source;
use riskguard::AppState;

#[derive(Parser)]
#[command(name = "riskguard")]
#[command(about = "Fraud risk evaluation engine")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Configuration file path
    #[arg(short, long, default_value = "riskguard-config.yaml", global = true)]
    config: String,

    /// SQLite database path
    #[arg(long, default_value = "sqlite://riskguard.db", global = true)]
    database_url: String,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API server
    Serve {
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
    /// Trigger a reference-data refresh run
    Refresh {
        /// Source to refresh: all, tor, disposable_emails, asn, user_agents
        #[arg(short, long, default_value = "all")]
        source: String,
        /// Ignore the minimum-interval guard
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let cli = Cli::parse();
    let config = RiskConfig::load(&cli.config).await?;
    let state = AppState::new(config, &cli.database_url).await?;

    match cli.command.unwrap_or(Command::Serve { port: 3000 }) {
        Command::Serve { port } => serve(state, port).await,
        Command::Refresh { source, force } => run_refresh(state, &source, force).await,
    }
}

async fn serve(state: AppState, port: u16) -> Result<()> {
    let app = Router::new()
        .nest("/api", riskguard::api::router())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!("riskguard listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn run_refresh(state: AppState, source: &str, force: bool) -> Result<()> {
    let pipeline = state.refresh_pipeline();
    if source == "all" {
        let report = pipeline.run_all(force).await;
        info!(total = report.total, "refresh complete");
        for (name, result) in &report.per_source {
            info!(source = %name, success = result.success, count = ?result.count, skipped = result.skipped, "source result");
        }
        if report.per_source.values().any(|r| !r.success) {
            anyhow::bail!("one or more refresh sources failed");
        }
    } else {
        let parsed = Source::from_str(source).ok_or_else(|| anyhow::anyhow!("unknown source: {source}"))?;
        let result = pipeline.run_source(parsed, force).await;
        info!(source, success = result.success, count = ?result.count, skipped = result.skipped, "refresh complete");
        if !result.success {
            anyhow::bail!("refresh failed: {}", result.error.unwrap_or_default());
        }
    }
    Ok(())
}
