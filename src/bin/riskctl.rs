//! Standalone refresh-pipeline CLI, separate from the `riskguard` server
//! binary so a cron job can trigger refreshes without running the API.

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};

use riskguard::config::RiskConfig;
use riskguard::refresh::Source;
use riskguard::AppState;

#[derive(Parser)]
#[command(name = "riskctl")]
#[command(about = "Trigger riskguard reference-data refresh jobs")]
struct Cli {
    /// Source to refresh: all, tor, disposable_emails, asn, user_agents
    #[arg(short, long, default_value = "all")]
    source: String,

    /// Ignore the minimum-interval guard
    #[arg(long)]
    force: bool,

    #[arg(short, long, default_value = "riskguard-config.yaml")]
    config: String,

    #[arg(long, default_value = "sqlite://riskguard.db")]
    database_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let cli = Cli::parse();
    let config = RiskConfig::load(&cli.config).await?;
    let state = AppState::new(config, &cli.database_url).await?;
    let pipeline = state.refresh_pipeline();

    let failed = if cli.source == "all" {
        let report = pipeline.run_all(cli.force).await;
        for (name, result) in &report.per_source {
            info!(source = %name, success = result.success, count = ?result.count, skipped = result.skipped, error = ?result.error, "source result");
        }
        report.per_source.values().any(|r| !r.success)
    } else {
        let source = Source::from_str(&cli.source)
            .ok_or_else(|| anyhow::anyhow!("unknown source: {}", cli.source))?;
        let result = pipeline.run_source(source, cli.force).await;
        info!(source = %cli.source, success = result.success, count = ?result.count, skipped = result.skipped, error = ?result.error, "source result");
        !result.success
    };

    if failed {
        std::process::exit(1);
    }
    Ok(())
}
