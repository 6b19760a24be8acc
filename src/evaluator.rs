//! Orchestrates one evaluation end-to-end: validate, audit, run Checks
//! concurrently under a deadline, score, decide, persist.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::audit;
use crate::checks::{self, CheckContext, CheckResult, EvaluateInput};
use crate::decision::{self, Decision};
use crate::error::{FieldError, RiskError, RiskResult};
use crate::scorer;
use crate::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationOutcome {
    pub id: String,
    pub risk_score: u32,
    pub decision: Decision,
    pub checks: HashMap<String, CheckResult>,
    pub processing_time_ms: i64,
}

pub async fn evaluate(
    state: &AppState,
    input: EvaluateInput,
    user_id: Option<&str>,
    api_key_id: Option<&str>,
) -> RiskResult<EvaluationOutcome> {
    let started = Instant::now();

    if !input.has_identity_field() {
        return Err(RiskError::InvalidInput(vec![FieldError {
            field: "identity".to_string(),
            message: "at least one of email, ip, credit_card, phone is required".to_string(),
        }]));
    }

    let mut tx = state.pool.begin().await?;
    let pending = audit::insert_pending(&mut tx, &state.hasher, &state.vault, &input, user_id, api_key_id)
        .await
        .map_err(RiskError::Internal)?;
    tx.commit().await?;

    let ctx = CheckContext {
        hasher: state.hasher.clone(),
        refdata: state.refdata.clone(),
        velocity: state.velocity.clone(),
        collaborators: state.check_collaborators(),
    };

    let applicable: Vec<Arc<dyn checks::Check>> = checks::registry()
        .into_iter()
        .filter(|c| c.applicable(&input, &state.config.checks))
        .collect();

    let deadline = Duration::from_millis(state.config.evaluation_deadline_ms);
    let mut handles = Vec::with_capacity(applicable.len());
    for check in applicable {
        let input = input.clone();
        let ctx = ctx.clone();
        handles.push((
            check.name(),
            tokio::spawn(async move { tokio::time::timeout(deadline, check.perform(&input, &ctx)).await }),
        ));
    }

    let mut results: HashMap<String, CheckResult> = HashMap::new();
    for (name, handle) in handles {
        let result = match handle.await {
            Ok(Ok(result)) => result,
            Ok(Err(_elapsed)) => {
                warn!(check = name, "check exceeded evaluation deadline");
                CheckResult::timeout()
            }
            Err(join_err) => {
                warn!(check = name, error = %join_err, "check task panicked");
                CheckResult::error("check task failed")
            }
        };
        results.insert(name.to_string(), result);
    }

    let risk_score = scorer::compute(&results);
    let decision = decision::map(risk_score, &state.config.decision_thresholds);
    let processing_time_ms = started.elapsed().as_millis() as i64;

    let mut tx = state.pool.begin().await?;
    audit::complete(&mut tx, &pending.id, risk_score, decision, &results, processing_time_ms)
        .await
        .map_err(RiskError::Internal)?;
    tx.commit().await?;

    state.metrics.record(decision, processing_time_ms);
    if risk_score >= 80 {
        info!(id = %pending.id, risk_score, decision = decision.as_str(), "high-risk evaluation");
    }

    Ok(EvaluationOutcome { id: pending.id, risk_score, decision, checks: results, processing_time_ms })
}
