pub mod api;
pub mod audit;
pub mod checks;
pub mod config;
pub mod decision;
pub mod error;
pub mod evaluator;
pub mod hashing;
pub mod metrics;
pub mod netutil;
pub mod refdata;
pub mod refresh;
pub mod scorer;
pub mod velocity;

use std::sync::Arc;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use checks::collaborators::{HttpAsnLookup, HttpDomainAgeLookup, HttpGeoLookup, HttpMxLookup};
use config::RiskConfig;
use hashing::{Hasher, Vault};
use metrics::EvaluationMetrics;
use refdata::ReferenceDataLayer;
use velocity::VelocityCounters;

/// Shared application state assembled once at boot and cloned (cheaply, via
/// `Arc`) into every request handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RiskConfig>,
    pub hasher: Arc<Hasher>,
    pub vault: Arc<Vault>,
    pub refdata: Arc<ReferenceDataLayer>,
    pub velocity: Arc<VelocityCounters>,
    pub metrics: Arc<EvaluationMetrics>,
    pub http_client: reqwest::Client,
    pub pool: SqlitePool,
}

impl AppState {
    pub async fn new(config: RiskConfig, database_url: &str) -> Result<Self> {
        let hasher = Hasher::new(&config.hashing.hmac_key)?;
        let vault = Vault::new(&config.hashing.encryption_key_b64)?;

        let connect_options: SqliteConnectOptions = database_url
            .parse::<SqliteConnectOptions>()?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(connect_options)
            .await?;
        refdata::store::run_migrations(&pool).await?;

        let refdata = ReferenceDataLayer::new(pool.clone(), config.cache_ttls_secs);
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()?;

        Ok(Self {
            config: Arc::new(config),
            hasher: Arc::new(hasher),
            vault: Arc::new(vault),
            refdata: Arc::new(refdata),
            velocity: Arc::new(VelocityCounters::new()),
            metrics: Arc::new(EvaluationMetrics::new()),
            http_client,
            pool,
        })
    }

    pub fn check_collaborators(&self) -> checks::Collaborators {
        checks::Collaborators {
            mx: Arc::new(HttpMxLookup),
            domain_age: Arc::new(HttpDomainAgeLookup::new(self.http_client.clone())),
            geo: Arc::new(HttpGeoLookup::new(self.http_client.clone())),
            asn: Arc::new(HttpAsnLookup::new(self.http_client.clone())),
        }
    }

    pub fn refresh_pipeline(&self) -> refresh::RefreshPipeline {
        refresh::RefreshPipeline::new(
            self.pool.clone(),
            self.refdata.clone(),
            self.http_client.clone(),
            self.config.refresh.clone(),
        )
    }
}
