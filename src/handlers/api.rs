use axum::{http::StatusCode, response::Json};
use serde_json::{Value, json};

/// Root greeting, also used as a liveness probe by some load balancers
pub async fn root() -> &'static str {
    "Hello ACS Call Automation Service"
}

/// Health check handler
/// Returns a simple JSON response indicating the server is running
pub async fn health_check() -> Result<Json<Value>, StatusCode> {
    Ok(Json(json!({
        "status": "OK"
    })))
}

/// App Service warm-up probe
pub async fn robots_probe() -> &'static str {
    "Healthy"
}
