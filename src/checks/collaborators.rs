//! External collaborators the Checks consult (MX records, domain age, geo, ASN).
//! Every implementation here degrades to `None`/`Ok(false)` on failure --
//! callers in `checks/*` then contribute 0 for the dependent sub-rule instead
//! of propagating the error.

use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait MxLookup: Send + Sync {
    /// True if the domain resolves an MX record, or failing that an A/AAAA record.
    async fn has_mail_exchanger(&self, domain: &str) -> bool;
    async fn has_address_record(&self, domain: &str) -> bool;
    /// True if any TXT record starts with `v=spf1`.
    async fn has_spf_record(&self, domain: &str) -> bool;
}

pub struct HttpMxLookup;

#[async_trait]
impl MxLookup for HttpMxLookup {
    async fn has_mail_exchanger(&self, domain: &str) -> bool {
        let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());
        match resolver.mx_lookup(format!("{domain}.")).await {
            Ok(lookup) => lookup.iter().count() > 0,
            Err(e) => {
                debug!(domain, error = %e, "MX lookup failed, degrading to false");
                false
            }
        }
    }

    async fn has_address_record(&self, domain: &str) -> bool {
        let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());
        match resolver.lookup_ip(format!("{domain}.")).await {
            Ok(lookup) => lookup.iter().count() > 0,
            Err(e) => {
                debug!(domain, error = %e, "A/AAAA lookup failed, degrading to false");
                false
            }
        }
    }

    async fn has_spf_record(&self, domain: &str) -> bool {
        let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());
        match resolver.txt_lookup(format!("{domain}.")).await {
            Ok(lookup) => lookup
                .iter()
                .any(|txt| txt.to_string().to_lowercase().starts_with("v=spf1")),
            Err(e) => {
                debug!(domain, error = %e, "SPF TXT lookup failed, degrading to false");
                false
            }
        }
    }
}

/// Domain age in days, `None` on any failure -- a null result contributes 0
/// to the domain check rather than failing it.
#[async_trait]
pub trait DomainAgeLookup: Send + Sync {
    async fn age_days(&self, domain: &str) -> Option<i64>;
    /// Bounded GET of the domain's landing page, for parked-domain detection.
    async fn fetch_body(&self, domain: &str) -> Option<String>;
}

pub struct HttpDomainAgeLookup {
    client: reqwest::Client,
}

impl HttpDomainAgeLookup {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[derive(Deserialize)]
struct WhoisResponse {
    age_days: Option<i64>,
}

#[async_trait]
impl DomainAgeLookup for HttpDomainAgeLookup {
    async fn age_days(&self, domain: &str) -> Option<i64> {
        let url = format!("https://whois.example-registry.invalid/age?domain={domain}");
        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(3))
            .send()
            .await
        {
            Ok(resp) => resp.json::<WhoisResponse>().await.ok().and_then(|r| r.age_days),
            Err(e) => {
                debug!(domain, error = %e, "domain age lookup failed, degrading to None");
                None
            }
        }
    }

    async fn fetch_body(&self, domain: &str) -> Option<String> {
        let url = format!("https://{domain}/");
        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(3))
            .send()
            .await
        {
            Ok(resp) => resp.text().await.ok(),
            Err(e) => {
                debug!(domain, error = %e, "parked-domain probe failed, degrading to None");
                None
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GeoInfo {
    pub country: Option<String>,
    pub timezone_offset_hours: Option<f64>,
}

#[async_trait]
pub trait GeoLookup: Send + Sync {
    async fn lookup(&self, ip: &IpAddr) -> Option<GeoInfo>;
}

pub struct HttpGeoLookup {
    client: reqwest::Client,
}

impl HttpGeoLookup {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[derive(Deserialize)]
struct GeoApiResponse {
    country: Option<String>,
    #[serde(rename = "timezone_offset_hours")]
    timezone_offset_hours: Option<f64>,
}

#[async_trait]
impl GeoLookup for HttpGeoLookup {
    async fn lookup(&self, ip: &IpAddr) -> Option<GeoInfo> {
        let url = format!("https://geoip.example-provider.invalid/lookup?ip={ip}");
        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(3))
            .send()
            .await
        {
            Ok(resp) => resp.json::<GeoApiResponse>().await.ok().map(|r| GeoInfo {
                country: r.country,
                timezone_offset_hours: r.timezone_offset_hours,
            }),
            Err(e) => {
                debug!(%ip, error = %e, "geolocation lookup failed, degrading to None");
                None
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct AsnInfo {
    pub asn: i64,
    pub organization: String,
    pub is_hosting: bool,
    pub is_vpn: bool,
    pub is_proxy: bool,
    pub risk_weight: i32,
}

/// Fallback ASN classification when the local `ip_ranges` table has no match.
#[async_trait]
pub trait AsnLookup: Send + Sync {
    async fn classify(&self, ip: &IpAddr) -> Option<AsnInfo>;
}

pub struct HttpAsnLookup {
    client: reqwest::Client,
}

impl HttpAsnLookup {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[derive(Deserialize)]
struct AsnApiResponse {
    asn: i64,
    organization: String,
    is_hosting: bool,
    is_vpn: bool,
    is_proxy: bool,
    risk_weight: i32,
}

#[async_trait]
impl AsnLookup for HttpAsnLookup {
    async fn classify(&self, ip: &IpAddr) -> Option<AsnInfo> {
        let url = format!("https://asn.example-provider.invalid/classify?ip={ip}");
        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(3))
            .send()
            .await
        {
            Ok(resp) => resp.json::<AsnApiResponse>().await.ok().map(|r| AsnInfo {
                asn: r.asn,
                organization: r.organization,
                is_hosting: r.is_hosting,
                is_vpn: r.is_vpn,
                is_proxy: r.is_proxy,
                risk_weight: r.risk_weight,
            }),
            Err(e) => {
                debug!(%ip, error = %e, "ASN classification failed, degrading to None");
                None
            }
        }
    }
}

#[cfg(test)]
pub mod fakes {
    use super::*;

    pub struct FakeMxLookup {
        pub has_mx: bool,
        pub has_a: bool,
        pub has_spf: bool,
    }

    #[async_trait]
    impl MxLookup for FakeMxLookup {
        async fn has_mail_exchanger(&self, _domain: &str) -> bool {
            self.has_mx
        }
        async fn has_address_record(&self, _domain: &str) -> bool {
            self.has_a
        }
        async fn has_spf_record(&self, _domain: &str) -> bool {
            self.has_spf
        }
    }

    pub struct FakeDomainAgeLookup {
        pub age_days: Option<i64>,
        pub body: Option<String>,
    }

    #[async_trait]
    impl DomainAgeLookup for FakeDomainAgeLookup {
        async fn age_days(&self, _domain: &str) -> Option<i64> {
            self.age_days
        }
        async fn fetch_body(&self, _domain: &str) -> Option<String> {
            self.body.clone()
        }
    }

    pub struct FakeGeoLookup(pub Option<GeoInfo>);

    #[async_trait]
    impl GeoLookup for FakeGeoLookup {
        async fn lookup(&self, _ip: &IpAddr) -> Option<GeoInfo> {
            self.0.clone()
        }
    }

    pub struct FakeAsnLookup(pub Option<AsnInfo>);

    #[async_trait]
    impl AsnLookup for FakeAsnLookup {
        async fn classify(&self, _ip: &IpAddr) -> Option<AsnInfo> {
            self.0.clone()
        }
    }
}
