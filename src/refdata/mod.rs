pub mod cache;
pub mod models;
pub mod store;

use std::net::IpAddr;
use std::time::Duration;

use sqlx::SqlitePool;

use crate::config::CacheTtls;
use cache::TtlCache;
use models::*;

/// Reference data layer: cache-then-store lookups, transactional natural-key
/// upserts. Read by the Evaluator/Checks; written only by the Refresh
/// Pipeline and admin tooling.
pub struct ReferenceDataLayer {
    pool: SqlitePool,
    ttls: CacheTtls,
    blacklist_cache: TtlCache<(BlacklistKindKey, String), Option<BlacklistEntry>>,
    disposable_cache: TtlCache<String, Option<DisposableEmailDomain>>,
    tor_cache: TtlCache<String, Option<TorExitNode>>,
    asn_cache: TtlCache<i64, Option<Asn>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum BlacklistKindKey {
    Email,
    Ip,
    CreditCard,
    Phone,
}

impl From<BlacklistKind> for BlacklistKindKey {
    fn from(k: BlacklistKind) -> Self {
        match k {
            BlacklistKind::Email => BlacklistKindKey::Email,
            BlacklistKind::Ip => BlacklistKindKey::Ip,
            BlacklistKind::CreditCard => BlacklistKindKey::CreditCard,
            BlacklistKind::Phone => BlacklistKindKey::Phone,
        }
    }
}

impl ReferenceDataLayer {
    pub fn new(pool: SqlitePool, ttls: CacheTtls) -> Self {
        Self {
            pool,
            ttls,
            blacklist_cache: TtlCache::new(),
            disposable_cache: TtlCache::new(),
            tor_cache: TtlCache::new(),
            asn_cache: TtlCache::new(),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn lookup_blacklist(
        &self,
        kind: BlacklistKind,
        keyed_hash: &str,
    ) -> Result<Option<BlacklistEntry>, sqlx::Error> {
        let cache_key = (kind.into(), keyed_hash.to_string());
        if let Some(hit) = self.blacklist_cache.get(&cache_key) {
            return Ok(hit);
        }
        let result = store::lookup_blacklist(&self.pool, kind, keyed_hash).await?;
        self.blacklist_cache.put(
            cache_key,
            result.clone(),
            Duration::from_secs(self.ttls.blacklist),
        );
        Ok(result)
    }

    pub async fn upsert_blacklist_batch(
        &self,
        kind: BlacklistKind,
        entries: &[BlacklistEntry],
    ) -> Result<(), sqlx::Error> {
        store::upsert_blacklist_batch(&self.pool, kind, entries).await?;
        for entry in entries {
            self.blacklist_cache
                .invalidate(&(kind.into(), entry.keyed_hash.clone()));
        }
        Ok(())
    }

    pub async fn lookup_disposable_domain(
        &self,
        domain: &str,
    ) -> Result<Option<DisposableEmailDomain>, sqlx::Error> {
        let key = domain.to_lowercase();
        if let Some(hit) = self.disposable_cache.get(&key) {
            return Ok(hit);
        }
        let result = store::lookup_disposable_domain(&self.pool, &key).await?;
        self.disposable_cache.put(
            key,
            result.clone(),
            Duration::from_secs(self.ttls.disposable_domain),
        );
        Ok(result)
    }

    pub async fn upsert_disposable_domains_batch(
        &self,
        entries: &[DisposableEmailDomain],
    ) -> Result<(), sqlx::Error> {
        store::upsert_disposable_domains_batch(&self.pool, entries).await?;
        for entry in entries {
            self.disposable_cache.invalidate(&entry.domain.to_lowercase());
        }
        Ok(())
    }

    pub async fn lookup_tor_node(&self, ip: &IpAddr) -> Result<Option<TorExitNode>, sqlx::Error> {
        let key = ip.to_string();
        if let Some(hit) = self.tor_cache.get(&key) {
            return Ok(hit);
        }
        let result = store::lookup_tor_node(&self.pool, &key).await?;
        self.tor_cache
            .put(key, result.clone(), Duration::from_secs(self.ttls.tor_node));
        Ok(result)
    }

    pub async fn upsert_tor_nodes_batch(&self, entries: &[TorExitNode]) -> Result<(), sqlx::Error> {
        store::upsert_tor_nodes_batch(&self.pool, entries).await?;
        for entry in entries {
            self.tor_cache.invalidate(&entry.ip);
        }
        Ok(())
    }

    pub async fn lookup_asn_by_ip(&self, ip: &IpAddr) -> Result<Option<Asn>, sqlx::Error> {
        // ip_ranges membership can't be cached by IP directly without scanning;
        // resolve then cache by ASN number for the common repeat-lookup case.
        let result = store::lookup_asn_by_ip(&self.pool, ip).await?;
        if let Some(asn) = &result {
            self.asn_cache.put(
                asn.asn,
                Some(asn.clone()),
                Duration::from_secs(self.ttls.asn_info),
            );
        }
        Ok(result)
    }

    pub async fn lookup_asn(&self, asn_number: i64) -> Result<Option<Asn>, sqlx::Error> {
        if let Some(hit) = self.asn_cache.get(&asn_number) {
            return Ok(hit);
        }
        let result = store::lookup_asn(&self.pool, asn_number).await?;
        self.asn_cache.put(
            asn_number,
            result.clone(),
            Duration::from_secs(self.ttls.asn_info),
        );
        Ok(result)
    }

    pub async fn upsert_asns_batch(&self, entries: &[Asn]) -> Result<(), sqlx::Error> {
        store::upsert_asns_batch(&self.pool, entries).await?;
        for entry in entries {
            self.asn_cache.invalidate(&entry.asn);
        }
        Ok(())
    }

    pub async fn lookup_known_user_agent(
        &self,
        ua_hash: &str,
    ) -> Result<Option<KnownUserAgent>, sqlx::Error> {
        // Known-UA lookups are keyed by a full sha256 and looked up at most once
        // per distinct UA per request; no dedicated cache layer needed beyond
        // the store's own index, unlike the higher-volume blacklist/tor paths.
        store::lookup_known_user_agent(&self.pool, ua_hash).await
    }

    pub async fn upsert_known_user_agents_batch(
        &self,
        entries: &[KnownUserAgent],
    ) -> Result<(), sqlx::Error> {
        store::upsert_known_user_agents_batch(&self.pool, entries).await
    }
}
