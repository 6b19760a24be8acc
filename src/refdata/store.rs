//! sqlx-backed persistence for the reference tables. All lookups run
//! as runtime-checked queries (no `query!` macro) so the crate builds without
//! a live database at compile time or a `DATABASE_URL` in CI.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use super::models::*;

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations").run(pool).await.map_err(|e| {
        sqlx::Error::Configuration(format!("migration failed: {e}").into())
    })
}

pub async fn lookup_blacklist(
    pool: &SqlitePool,
    kind: BlacklistKind,
    keyed_hash: &str,
) -> Result<Option<BlacklistEntry>, sqlx::Error> {
    let sql = format!(
        "SELECT keyed_hash, reason, risk_weight, last_seen_at, report_count FROM {} WHERE keyed_hash = ? AND is_active = 1",
        kind.table_name()
    );
    sqlx::query_as::<_, BlacklistEntry>(&sql)
        .bind(keyed_hash)
        .fetch_optional(pool)
        .await
}

pub async fn upsert_blacklist_batch(
    pool: &SqlitePool,
    kind: BlacklistKind,
    entries: &[BlacklistEntry],
) -> Result<(), sqlx::Error> {
    let sql = format!(
        "INSERT INTO {} (keyed_hash, reason, risk_weight, last_seen_at, report_count, is_active, updated_at)
         VALUES (?, ?, ?, ?, ?, 1, datetime('now'))
         ON CONFLICT(keyed_hash) DO UPDATE SET
            reason = excluded.reason,
            risk_weight = excluded.risk_weight,
            last_seen_at = excluded.last_seen_at,
            report_count = excluded.report_count,
            is_active = 1,
            updated_at = datetime('now')",
        kind.table_name()
    );
    let mut tx = pool.begin().await?;
    for entry in entries {
        sqlx::query(&sql)
            .bind(&entry.keyed_hash)
            .bind(&entry.reason)
            .bind(entry.risk_weight)
            .bind(entry.last_seen_at)
            .bind(entry.report_count)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await
}

pub async fn lookup_disposable_domain(
    pool: &SqlitePool,
    domain: &str,
) -> Result<Option<DisposableEmailDomain>, sqlx::Error> {
    sqlx::query_as::<_, DisposableEmailDomain>(
        "SELECT domain, source, is_active, risk_weight FROM disposable_email_domains WHERE domain = ? AND is_active = 1",
    )
    .bind(domain.to_lowercase())
    .fetch_optional(pool)
    .await
}

pub async fn upsert_disposable_domains_batch(
    pool: &SqlitePool,
    entries: &[DisposableEmailDomain],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for entry in entries {
        sqlx::query(
            "INSERT INTO disposable_email_domains (domain, source, is_active, risk_weight, updated_at)
             VALUES (?, ?, 1, ?, datetime('now'))
             ON CONFLICT(domain) DO UPDATE SET
                source = excluded.source, risk_weight = excluded.risk_weight,
                is_active = 1, updated_at = datetime('now')",
        )
        .bind(entry.domain.to_lowercase())
        .bind(&entry.source)
        .bind(entry.risk_weight)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await
}

pub async fn lookup_tor_node(
    pool: &SqlitePool,
    ip: &str,
) -> Result<Option<TorExitNode>, sqlx::Error> {
    sqlx::query_as::<_, TorExitNode>(
        "SELECT ip, ip_version, node_id, nickname, is_active, last_seen_at, risk_weight FROM tor_exit_nodes WHERE ip = ? AND is_active = 1",
    )
    .bind(ip)
    .fetch_optional(pool)
    .await
}

pub async fn upsert_tor_nodes_batch(
    pool: &SqlitePool,
    entries: &[TorExitNode],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for entry in entries {
        sqlx::query(
            "INSERT INTO tor_exit_nodes (ip, ip_version, node_id, nickname, is_active, last_seen_at, risk_weight, updated_at)
             VALUES (?, ?, ?, ?, 1, ?, ?, datetime('now'))
             ON CONFLICT(ip) DO UPDATE SET
                ip_version = excluded.ip_version, node_id = excluded.node_id,
                nickname = excluded.nickname, is_active = 1,
                last_seen_at = excluded.last_seen_at, risk_weight = excluded.risk_weight,
                updated_at = datetime('now')",
        )
        .bind(&entry.ip)
        .bind(entry.ip_version)
        .bind(&entry.node_id)
        .bind(&entry.nickname)
        .bind(entry.last_seen_at)
        .bind(entry.risk_weight)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await
}

fn row_to_asn(row: &sqlx::sqlite::SqliteRow) -> Asn {
    let ip_ranges_json: String = row.get("ip_ranges");
    Asn {
        asn: row.get("asn"),
        organization: row.get("organization"),
        country_code: row.get("country_code"),
        asn_type: AsnType::from_str(&row.get::<String, _>("asn_type")),
        is_hosting: row.get("is_hosting"),
        is_vpn: row.get("is_vpn"),
        is_proxy: row.get("is_proxy"),
        ip_ranges: serde_json::from_str(&ip_ranges_json).unwrap_or_default(),
        risk_weight: row.get("risk_weight"),
    }
}

pub async fn lookup_asn(pool: &SqlitePool, asn: i64) -> Result<Option<Asn>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT asn, organization, country_code, asn_type, is_hosting, is_vpn, is_proxy, ip_ranges, risk_weight
         FROM asns WHERE asn = ? AND is_active = 1",
    )
    .bind(asn)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(row_to_asn))
}

/// Linear scan over active ASNs matching the IP against each `ip_ranges` CIDR
/// list. Tried before falling back to the ASN collaborator API.
pub async fn lookup_asn_by_ip(
    pool: &SqlitePool,
    ip: &std::net::IpAddr,
) -> Result<Option<Asn>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT asn, organization, country_code, asn_type, is_hosting, is_vpn, is_proxy, ip_ranges, risk_weight
         FROM asns WHERE is_active = 1",
    )
    .fetch_all(pool)
    .await?;
    for row in &rows {
        let candidate = row_to_asn(row);
        if candidate
            .ip_ranges
            .iter()
            .any(|cidr| crate::netutil::in_range(ip, cidr))
        {
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}

pub async fn upsert_asns_batch(pool: &SqlitePool, entries: &[Asn]) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for entry in entries {
        let ip_ranges_json = serde_json::to_string(&entry.ip_ranges).unwrap_or_else(|_| "[]".to_string());
        sqlx::query(
            "INSERT INTO asns (asn, organization, country_code, asn_type, is_hosting, is_vpn, is_proxy, ip_ranges, risk_weight, is_active, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1, datetime('now'))
             ON CONFLICT(asn) DO UPDATE SET
                organization = excluded.organization, country_code = excluded.country_code,
                asn_type = excluded.asn_type, is_hosting = excluded.is_hosting,
                is_vpn = excluded.is_vpn, is_proxy = excluded.is_proxy,
                ip_ranges = excluded.ip_ranges, risk_weight = excluded.risk_weight,
                is_active = 1, updated_at = datetime('now')",
        )
        .bind(entry.asn)
        .bind(&entry.organization)
        .bind(&entry.country_code)
        .bind(entry.asn_type.as_str())
        .bind(entry.is_hosting)
        .bind(entry.is_vpn)
        .bind(entry.is_proxy)
        .bind(ip_ranges_json)
        .bind(entry.risk_weight)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await
}

fn row_to_known_ua(row: &sqlx::sqlite::SqliteRow) -> KnownUserAgent {
    let ua_type_str: String = row.get("ua_type");
    KnownUserAgent {
        ua_hash: row.get("ua_hash"),
        ua_type: match ua_type_str.as_str() {
            "bot" => UserAgentType::Bot,
            "scraper" => UserAgentType::Scraper,
            "browser" => UserAgentType::Browser,
            "malicious" => UserAgentType::Malicious,
            _ => UserAgentType::Unknown,
        },
        name: row.get("name"),
        version: row.get("version"),
        risk_weight: row.get("risk_weight"),
        is_outdated: row.get("is_outdated"),
        eol_date: row.get::<Option<DateTime<Utc>>, _>("eol_date"),
    }
}

pub async fn lookup_known_user_agent(
    pool: &SqlitePool,
    ua_hash: &str,
) -> Result<Option<KnownUserAgent>, sqlx::Error> {
    let row = sqlx::query(
        "SELECT ua_hash, ua_type, name, version, risk_weight, is_outdated, eol_date
         FROM known_user_agents WHERE ua_hash = ? AND is_active = 1",
    )
    .bind(ua_hash)
    .fetch_optional(pool)
    .await?;
    Ok(row.as_ref().map(row_to_known_ua))
}

pub async fn upsert_known_user_agents_batch(
    pool: &SqlitePool,
    entries: &[KnownUserAgent],
) -> Result<(), sqlx::Error> {
    let ua_type_str = |t: UserAgentType| match t {
        UserAgentType::Bot => "bot",
        UserAgentType::Scraper => "scraper",
        UserAgentType::Browser => "browser",
        UserAgentType::Malicious => "malicious",
        UserAgentType::Unknown => "unknown",
    };
    let mut tx = pool.begin().await?;
    for entry in entries {
        sqlx::query(
            "INSERT INTO known_user_agents (ua_hash, ua_type, name, version, risk_weight, is_outdated, eol_date, is_active, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, 1, datetime('now'))
             ON CONFLICT(ua_hash) DO UPDATE SET
                ua_type = excluded.ua_type, name = excluded.name, version = excluded.version,
                risk_weight = excluded.risk_weight, is_outdated = excluded.is_outdated,
                eol_date = excluded.eol_date, is_active = 1, updated_at = datetime('now')",
        )
        .bind(&entry.ua_hash)
        .bind(ua_type_str(entry.ua_type))
        .bind(&entry.name)
        .bind(&entry.version)
        .bind(entry.risk_weight)
        .bind(entry.is_outdated)
        .bind(entry.eol_date)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await
}

/// Flip `is_active = false` for every row of a reference table before a
/// refresh run's first batch.
pub async fn mark_all_inactive(pool: &SqlitePool, table: &str) -> Result<(), sqlx::Error> {
    let sql = format!("UPDATE {table} SET is_active = 0");
    sqlx::query(&sql).execute(pool).await?;
    Ok(())
}

/// Delete rows left inactive for longer than `older_than_days`. A soft
/// retention window tolerates a single failed source run without losing data.
pub async fn delete_stale_inactive(
    pool: &SqlitePool,
    table: &str,
    older_than_days: i64,
) -> Result<u64, sqlx::Error> {
    let sql = format!(
        "DELETE FROM {table} WHERE is_active = 0 AND updated_at < datetime('now', ?)"
    );
    let cutoff = format!("-{older_than_days} days");
    let result = sqlx::query(&sql).bind(cutoff).execute(pool).await?;
    Ok(result.rows_affected())
}

/// Last successful run timestamp for a refresh source, `None` if it has never run.
pub async fn last_refresh_success(pool: &SqlitePool, source: &str) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    let row: Option<(Option<DateTime<Utc>>,)> =
        sqlx::query_as("SELECT last_success_at FROM refresh_runs WHERE source = ?")
            .bind(source)
            .fetch_optional(pool)
            .await?;
    Ok(row.and_then(|(ts,)| ts))
}

/// Records the outcome of a refresh run, upserting the per-source bookkeeping row.
pub async fn record_refresh_run(pool: &SqlitePool, source: &str, status: &str, succeeded: bool) -> Result<(), sqlx::Error> {
    if succeeded {
        sqlx::query(
            "INSERT INTO refresh_runs (source, last_success_at, last_status) VALUES (?, datetime('now'), ?)
             ON CONFLICT(source) DO UPDATE SET last_success_at = datetime('now'), last_status = excluded.last_status",
        )
        .bind(source)
        .bind(status)
        .execute(pool)
        .await?;
    } else {
        sqlx::query(
            "INSERT INTO refresh_runs (source, last_status) VALUES (?, ?)
             ON CONFLICT(source) DO UPDATE SET last_status = excluded.last_status",
        )
        .bind(source)
        .bind(status)
        .execute(pool)
        .await?;
    }
    Ok(())
}
