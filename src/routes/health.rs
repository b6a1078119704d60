use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::state::AppState;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/health").route(web::get().to(health)));
}

/// Liveness plus a round trip to the database.
async fn health(state: web::Data<AppState>) -> HttpResponse {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(&state.db).await {
        Ok(_) => HttpResponse::Ok().json(json!({ "status": "ok" })),
        Err(err) => {
            log::error!("health check failed: {err}");
            HttpResponse::ServiceUnavailable().json(json!({ "status": "error", "db": "unavailable" }))
        }
    }
}
