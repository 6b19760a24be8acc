use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Risk/decision thresholds and per-check toggles, loaded from YAML at boot.
///
/// A flat struct with nested sub-configs, a `Default` impl, and `load`/`save`
/// helpers that create the file on first run instead of failing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    pub hashing: HashingConfig,
    pub risk_thresholds: RiskThresholds,
    pub decision_thresholds: DecisionThresholds,
    pub checks: CheckToggles,
    pub cache_ttls_secs: CacheTtls,
    pub refresh: RefreshConfig,
    pub evaluation_deadline_ms: u64,
    pub retention_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashingConfig {
    /// Secret HMAC key. Absence at boot is a fatal initialization error.
    pub hmac_key: String,
    /// 32-byte key (base64) for the reversible ciphertext vault.
    pub encryption_key_b64: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskThresholds {
    pub low: u32,
    pub medium: u32,
    pub high: u32,
    pub critical: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DecisionThresholds {
    pub auto_allow: u32,
    pub manual_review: u32,
    pub auto_block: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CheckToggles {
    pub email: bool,
    pub domain: bool,
    pub ip: bool,
    pub credit_card: bool,
    pub phone: bool,
    pub user_agent: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CacheTtls {
    pub blacklist: u64,
    pub disposable_domain: u64,
    pub tor_node: u64,
    pub asn_info: u64,
    pub geolocation: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    pub tor_min_interval_hours: u64,
    pub disposable_min_interval_hours: u64,
    pub asn_min_interval_days: u64,
    pub user_agents_min_interval_days: u64,
    pub batch_size: usize,
    pub job_deadline_secs: u64,
    pub retry_attempts: u32,
    pub tor_feed_url: String,
    pub disposable_feed_url: String,
    pub asn_feed_url: String,
    pub user_agents_feed_url: String,
}

impl RiskConfig {
    pub async fn load(path: &str) -> Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let config: RiskConfig = serde_yaml::from_str(&content)?;
                Ok(config)
            }
            Err(_) => {
                info!("config file not found at {path}, writing defaults");
                let config = Self::default();
                config.save(path).await?;
                Ok(config)
            }
        }
    }

    pub async fn load_or_default() -> Result<Self> {
        Self::load("riskguard-config.yaml").await
    }

    pub async fn save(&self, path: &str) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            hashing: HashingConfig {
                hmac_key: "change-me-dev-only-hmac-key".to_string(),
                encryption_key_b64: "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY=".to_string(),
            },
            risk_thresholds: RiskThresholds {
                low: 30,
                medium: 50,
                high: 80,
                critical: 100,
            },
            decision_thresholds: DecisionThresholds {
                auto_allow: 30,
                manual_review: 50,
                auto_block: 80,
            },
            checks: CheckToggles {
                email: true,
                domain: true,
                ip: true,
                credit_card: true,
                phone: true,
                user_agent: true,
            },
            cache_ttls_secs: CacheTtls {
                blacklist: 300,
                disposable_domain: 3600,
                tor_node: 3600,
                asn_info: 3600,
                geolocation: 86_400,
            },
            refresh: RefreshConfig {
                tor_min_interval_hours: 6,
                disposable_min_interval_hours: 24,
                asn_min_interval_days: 7,
                user_agents_min_interval_days: 7,
                batch_size: 500,
                job_deadline_secs: 1200,
                retry_attempts: 2,
                tor_feed_url: "https://tor-feed.example-provider.invalid/exit-addresses".to_string(),
                disposable_feed_url: "https://disposable-feed.example-provider.invalid/domains".to_string(),
                asn_feed_url: "https://asn-feed.example-provider.invalid/ranges".to_string(),
                user_agents_feed_url: "https://ua-feed.example-provider.invalid/known".to_string(),
            },
            evaluation_deadline_ms: 5000,
            retention_days: 365,
        }
    }
}
