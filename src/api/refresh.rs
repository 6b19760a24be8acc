use axum::extract::State;
use axum::response::Json;
use serde::Deserialize;
use serde_json::json;

use crate::refresh::Source;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub source: Option<String>,
    #[serde(default)]
    pub force: bool,
}

pub async fn trigger_refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Json<serde_json::Value> {
    let pipeline = state.refresh_pipeline();

    match request.source.as_deref() {
        None | Some("all") => {
            let report = pipeline.run_all(request.force).await;
            Json(json!({ "success": true, "report": report }))
        }
        Some(name) => match Source::from_str(name) {
            Some(source) => {
                let report = pipeline.run_source(source, request.force).await;
                Json(json!({ "success": report.success, "report": report }))
            }
            None => Json(json!({ "success": false, "error": format!("unknown source: {name}") })),
        },
    }
}
