//! Audit record persistence: one row per evaluation, inserted pending before
//! Checks run and updated on completion, so a crash mid-evaluation still
//! leaves a pending trail rather than no trail at all.

use std::collections::HashMap;

use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::checks::{CheckResult, EvaluateInput};
use crate::decision::Decision;
use crate::hashing::{Hasher, Vault};

pub struct PendingAudit {
    pub id: String,
}

/// Inserts a `pending` row, hashing/ciphering identity fields so plaintext never
/// reaches storage in the clear. `user_id`/`api_key_id` are caller-supplied
/// correlation identifiers, opaque to this layer.
pub async fn insert_pending(
    tx: &mut Transaction<'_, Sqlite>,
    hasher: &Hasher,
    vault: &Vault,
    input: &EvaluateInput,
    user_id: Option<&str>,
    api_key_id: Option<&str>,
) -> Result<PendingAudit, anyhow::Error> {
    let id = Uuid::new_v4().to_string();

    let email_hash = input.email.as_deref().map(|v| hasher.hash(v));
    let email_ciphertext = input.email.as_deref().map(|v| vault.encrypt(v)).transpose()?;
    let ip_hash = input.ip.as_deref().map(|v| hasher.hash(v));
    let ip_ciphertext = input.ip.as_deref().map(|v| vault.encrypt(v)).transpose()?;
    let cc_hash = input.credit_card.as_deref().map(|v| hasher.hash(v));
    let cc_ciphertext = input.credit_card.as_deref().map(|v| vault.encrypt(v)).transpose()?;
    let phone_hash = input.phone.as_deref().map(|v| hasher.hash(v));
    let phone_ciphertext = input.phone.as_deref().map(|v| vault.encrypt(v)).transpose()?;
    let headers_json = serde_json::to_string(&input.headers)?;

    sqlx::query(
        "INSERT INTO fraud_checks
            (id, user_id, api_key_id, email_hash, email_ciphertext, ip_hash, ip_ciphertext,
             credit_card_hash, credit_card_ciphertext, phone_hash, phone_ciphertext,
             user_agent, domain, headers, status, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?)",
    )
    .bind(&id)
    .bind(user_id)
    .bind(api_key_id)
    .bind(&email_hash)
    .bind(&email_ciphertext)
    .bind(&ip_hash)
    .bind(&ip_ciphertext)
    .bind(&cc_hash)
    .bind(&cc_ciphertext)
    .bind(&phone_hash)
    .bind(&phone_ciphertext)
    .bind(&input.user_agent)
    .bind(input.effective_domain())
    .bind(&headers_json)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await?;

    Ok(PendingAudit { id })
}

/// Updates a pending row with the completed evaluation outcome.
pub async fn complete(
    tx: &mut Transaction<'_, Sqlite>,
    id: &str,
    risk_score: u32,
    decision: Decision,
    results: &HashMap<String, CheckResult>,
    processing_time_ms: i64,
) -> Result<(), anyhow::Error> {
    let check_results: HashMap<&str, &CheckResult> =
        results.iter().map(|(k, v)| (k.as_str(), v)).collect();
    let failed_checks: Vec<&str> =
        results.iter().filter(|(_, v)| !v.passed).map(|(k, _)| k.as_str()).collect();
    let passed_checks: Vec<&str> =
        results.iter().filter(|(_, v)| v.passed).map(|(k, _)| k.as_str()).collect();

    sqlx::query(
        "UPDATE fraud_checks
         SET risk_score = ?, check_results = ?, failed_checks = ?, passed_checks = ?,
             decision = ?, status = 'completed', processing_time_ms = ?
         WHERE id = ?",
    )
    .bind(risk_score)
    .bind(serde_json::to_string(&check_results)?)
    .bind(serde_json::to_string(&failed_checks)?)
    .bind(serde_json::to_string(&passed_checks)?)
    .bind(decision.as_str())
    .bind(processing_time_ms)
    .bind(id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Deletes completed audit rows older than `retention_days`, run periodically
/// to bound storage growth.
pub async fn cleanup_expired_audit_records(pool: &SqlitePool, retention_days: u32) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM fraud_checks WHERE status = 'completed' AND created_at < datetime('now', ?)",
    )
    .bind(format!("-{retention_days} days"))
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
