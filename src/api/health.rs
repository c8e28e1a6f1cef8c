use actix_web::{get, web, HttpResponse, Responder};
use serde::Serialize;
use sqlx::{Pool, Postgres};
use tracing::error;

use crate::api::import::ImportService;

/// Health check response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: String,
    database: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    queue: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pending_tasks: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Status of each dependency; `errors` is empty when everything answered.
struct DependencyReport {
    database: &'static str,
    queue: &'static str,
    pending_tasks: Option<i64>,
    errors: Vec<String>,
}

/// Ping the database (when one is registered) and read the queue depth.
async fn check_dependencies(
    pool: Option<&Pool<Postgres>>,
    service: &ImportService,
) -> DependencyReport {
    let mut errors = Vec::new();

    let database = match pool {
        Some(pool) => match sqlx::query("SELECT 1").fetch_one(pool).await {
            Ok(_) => "connected",
            Err(e) => {
                errors.push(format!("Database error: {}", e));
                "disconnected"
            }
        },
        None => "not_configured",
    };

    let (queue, pending_tasks) = match service.pending_tasks().await {
        Ok(pending) => ("available", Some(pending)),
        Err(e) => {
            errors.push(format!("Queue error: {}", e));
            ("unavailable", None)
        }
    };

    DependencyReport {
        database,
        queue,
        pending_tasks,
        errors,
    }
}

fn dependency_response(report: DependencyReport, ok: &str, failed: &str) -> HttpResponse {
    let healthy = report.errors.is_empty();
    let body = HealthResponse {
        status: (if healthy { ok } else { failed }).to_string(),
        database: report.database.to_string(),
        queue: Some(report.queue.to_string()),
        pending_tasks: report.pending_tasks,
        error: (!healthy).then(|| report.errors.join("; ")),
    };

    if healthy {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}

/// Health check endpoint
///
/// General health check including database connectivity and queue depth.
/// Use for load balancers and uptime monitors.
#[get("/health")]
async fn health_check(
    pool: Option<web::Data<Pool<Postgres>>>,
    service: web::Data<ImportService>,
) -> impl Responder {
    let report = check_dependencies(pool.as_ref().map(|p| p.get_ref()), &service).await;
    if !report.errors.is_empty() {
        error!("Health check failed: {}", report.errors.join("; "));
    }
    dependency_response(report, "healthy", "unhealthy")
}

/// Readiness check endpoint
///
/// Returns 503 while the database or queue is unavailable; the process
/// recovers on its own once they return.
#[get("/ready")]
async fn readiness_check(
    pool: Option<web::Data<Pool<Postgres>>>,
    service: web::Data<ImportService>,
) -> impl Responder {
    let report = check_dependencies(pool.as_ref().map(|p| p.get_ref()), &service).await;
    if !report.errors.is_empty() {
        error!("Readiness check failed: {}", report.errors.join("; "));
    }
    dependency_response(report, "ready", "not_ready")
}

/// Liveness check endpoint
///
/// Simple check that the process is alive. Does not check dependencies.
#[get("/live")]
async fn liveness_check() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "alive".to_string(),
        database: "not_checked".to_string(),
        queue: None,
        pending_tasks: None,
        error: None,
    })
}

pub fn health_config(config: &mut web::ServiceConfig) {
    config
        .service(health_check)
        .service(readiness_check)
        .service(liveness_check);
}
