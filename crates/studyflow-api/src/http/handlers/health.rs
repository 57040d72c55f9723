//! Liveness endpoint.

use axum::Json;
use axum::extract::State;

use crate::state::AppState;

/// GET /api/v1/health - Simple health check (no auth required).
pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "active_runs": state.interpreter.active_runs().len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_state;

    #[tokio::test]
    async fn reports_ok_with_no_active_runs() {
        let (state, _dir) = test_state().await;
        let Json(body) = health_check(State(state)).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["active_runs"], 0);
    }
}
