pub mod evaluate;
pub mod refresh;
pub mod status;

use axum::routing::{get, post};
use axum::Router;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/evaluate", post(evaluate::evaluate))
        .route("/status", get(status::get_status))
        .route("/refresh", post(refresh::trigger_refresh))
}
