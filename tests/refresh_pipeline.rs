//! Exercises the Data-Source Refresh Pipeline end to end against an on-disk
//! SQLite database and a mocked feed server: idempotent re-runs, malformed
//! lines skipped mid-feed, and concurrent refreshes of the same source.

use std::sync::Arc;

use riskguard::config::{CacheTtls, RefreshConfig};
use riskguard::refdata::ReferenceDataLayer;
use riskguard::refresh::{RefreshPipeline, Source};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn test_pool() -> (SqlitePool, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("riskguard-test.db");
    let options = SqliteConnectOptions::new().filename(&db_path).create_if_missing(true);
    let pool = SqlitePoolOptions::new().max_connections(5).connect_with(options).await.unwrap();
    riskguard::refdata::store::run_migrations(&pool).await.unwrap();
    (pool, dir)
}

fn refresh_config(asn_url: String, tor_url: String) -> RefreshConfig {
    RefreshConfig {
        tor_min_interval_hours: 6,
        disposable_min_interval_hours: 24,
        asn_min_interval_days: 7,
        user_agents_min_interval_days: 7,
        batch_size: 500,
        job_deadline_secs: 60,
        retry_attempts: 1,
        tor_feed_url: tor_url,
        disposable_feed_url: "https://disposable-feed.invalid/not-used".to_string(),
        asn_feed_url: asn_url,
        user_agents_feed_url: "https://ua-feed.invalid/not-used".to_string(),
    }
}

fn pipeline(pool: SqlitePool, asn_url: String) -> RefreshPipeline {
    pipeline_full(pool, asn_url, "https://tor-feed.invalid/not-used".to_string())
}

fn pipeline_full(pool: SqlitePool, asn_url: String, tor_url: String) -> RefreshPipeline {
    let refdata = Arc::new(ReferenceDataLayer::new(pool.clone(), CacheTtls {
        blacklist: 60,
        disposable_domain: 60,
        tor_node: 60,
        asn_info: 60,
        geolocation: 60,
    }));
    let http_client = reqwest::Client::builder().timeout(std::time::Duration::from_secs(30)).build().unwrap();
    RefreshPipeline::new(pool, refdata, http_client, refresh_config(asn_url, tor_url))
}

const ASN_FEED: &str = "\
13335 US 1.1.1.0/24 Cloudflare Inc\n\
15169 US 8.8.8.0/24 Google LLC\n\
16509 US 52.0.0.0/8 Amazon Datacenter Services\n";

const ASN_FEED_WITH_GARBAGE: &str = "\
13335 US 1.1.1.0/24 Cloudflare Inc\n\
this line is not a valid asn record\n\
15169 US 8.8.8.0/24 Google LLC\n";

#[tokio::test]
async fn refresh_is_idempotent_across_runs() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/asn-feed"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ASN_FEED))
        .mount(&server)
        .await;

    let (pool, _dir) = test_pool().await;
    let pipe = pipeline(pool.clone(), format!("{}/asn-feed", server.uri()));

    let first = pipe.run_source(Source::Asn, true).await;
    assert!(first.success);
    assert_eq!(first.count, Some(3));

    let second = pipe.run_source(Source::Asn, true).await;
    assert!(second.success);
    assert_eq!(second.count, Some(3));

    let row_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM asns WHERE is_active = 1")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(row_count, 3, "re-running the same snapshot must not duplicate rows");
}

#[tokio::test]
async fn malformed_line_is_skipped_rest_upserted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/asn-feed"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ASN_FEED_WITH_GARBAGE))
        .mount(&server)
        .await;

    let (pool, _dir) = test_pool().await;
    let pipe = pipeline(pool.clone(), format!("{}/asn-feed", server.uri()));

    let report = pipe.run_source(Source::Asn, true).await;
    assert!(report.success);
    assert_eq!(report.count, Some(2), "the garbage line must be skipped, not fail the whole run");

    let orgs: Vec<String> = sqlx::query_scalar("SELECT organization FROM asns ORDER BY asn")
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(orgs, vec!["Cloudflare Inc", "Google LLC"]);
}

#[tokio::test]
async fn concurrent_refresh_of_same_source_is_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/asn-feed"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ASN_FEED).set_delay(std::time::Duration::from_millis(200)))
        .mount(&server)
        .await;

    let (pool, _dir) = test_pool().await;
    let pipe = Arc::new(pipeline(pool.clone(), format!("{}/asn-feed", server.uri())));

    let pipe_a = pipe.clone();
    let pipe_b = pipe.clone();
    let (first, second) = tokio::join!(
        tokio::spawn(async move { pipe_a.run_source(Source::Asn, true).await }),
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            pipe_b.run_source(Source::Asn, true).await
        }),
    );
    let first = first.unwrap();
    let second = second.unwrap();

    let skipped = [&first, &second].into_iter().filter(|r| r.skipped).count();
    assert_eq!(skipped, 1, "exactly one of the two concurrent attempts must be skipped");
    let completed = [&first, &second].into_iter().find(|r| !r.skipped).unwrap();
    assert!(completed.success);
    assert_eq!(completed.count, Some(3));
}

/// Scaled down from a real feed's six- and seven-figure line counts to keep
/// the test fast, but still exercises the streaming path end to end: the
/// pipeline reads this file a line at a time and upserts in `batch_size`
/// chunks rather than collecting the whole parsed feed into one `Vec` first.
#[tokio::test]
async fn large_line_delimited_feed_streams_in_batches() {
    const LINE_COUNT: usize = 50_000;
    let mut body = String::with_capacity(LINE_COUNT * 16);
    for i in 0..LINE_COUNT {
        let ip = format!("{}.{}.{}.{}", (i >> 24) as u8 | 1, (i >> 16) as u8, (i >> 8) as u8, i as u8);
        body.push_str(&ip);
        body.push_str(" node-");
        body.push_str(&i.to_string());
        body.push('\n');
    }

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tor-feed"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let (pool, _dir) = test_pool().await;
    let pipe = pipeline_full(
        pool.clone(),
        "https://asn-feed.invalid/not-used".to_string(),
        format!("{}/tor-feed", server.uri()),
    );

    let report = pipe.run_source(Source::Tor, true).await;
    assert!(report.success);
    assert_eq!(report.count, Some(LINE_COUNT as u64));

    let row_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tor_exit_nodes WHERE is_active = 1")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(row_count, LINE_COUNT as i64);
}

/// A failed fetch (no mocked route, so the request errors) must not blank
/// out a previously-successful snapshot: existing rows stay active until a
/// refresh actually succeeds.
#[tokio::test]
async fn failed_fetch_leaves_previous_snapshot_active() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/asn-feed"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ASN_FEED))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let (pool, _dir) = test_pool().await;
    let pipe = pipeline(pool.clone(), format!("{}/asn-feed", server.uri()));

    let first = pipe.run_source(Source::Asn, true).await;
    assert!(first.success);
    assert_eq!(first.count, Some(3));

    // The mock only answers once; this run's fetch fails outright (no matching route).
    let second = pipe.run_source(Source::Asn, true).await;
    assert!(!second.success, "second run should fail since the mock no longer answers");

    let row_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM asns WHERE is_active = 1")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(row_count, 3, "a failed refresh must not blank out the prior snapshot");
}
