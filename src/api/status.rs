use axum::extract::State;
use axum::response::Json;
use serde_json::json;

use crate::refresh::Source;
use crate::refdata::store;
use crate::AppState;

pub async fn get_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let metrics = state.metrics.snapshot();

    let mut last_refresh = serde_json::Map::new();
    for source in Source::all() {
        let last = store::last_refresh_success(&state.pool, source.as_str()).await.ok().flatten();
        last_refresh.insert(source.as_str().to_string(), json!(last));
    }

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "thresholds": {
            "risk": state.config.risk_thresholds,
            "decision": state.config.decision_thresholds,
        },
        "checks_enabled": state.config.checks,
        "metrics": metrics,
        "last_refresh": last_refresh,
        "timestamp": chrono::Utc::now(),
    }))
}
