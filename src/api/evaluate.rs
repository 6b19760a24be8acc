use axum::extract::State;
use axum::response::Json;
use serde::Deserialize;
use serde_json::json;

use crate::checks::EvaluateInput;
use crate::error::RiskResult;
use crate::evaluator;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    #[serde(flatten)]
    pub input: EvaluateInput,
    pub user_id: Option<String>,
    pub api_key_id: Option<String>,
}

pub async fn evaluate(
    State(state): State<AppState>,
    Json(request): Json<EvaluateRequest>,
) -> RiskResult<Json<serde_json::Value>> {
    let outcome = match evaluator::evaluate(
        &state,
        request.input,
        request.user_id.as_deref(),
        request.api_key_id.as_deref(),
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            state.metrics.record_error();
            return Err(err);
        }
    };

    Ok(Json(json!({
        "success": true,
        "data": {
            "id": outcome.id,
            "risk_score": outcome.risk_score,
            "decision": outcome.decision,
            "checks": outcome.checks,
            "processing_time_ms": outcome.processing_time_ms,
        }
    })))
}
