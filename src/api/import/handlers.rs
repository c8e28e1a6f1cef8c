use actix_web::{
    get, post,
    web::{self, Data, ServiceConfig},
    HttpResponse,
};
use actix_web_validator::Query;

use super::models::ImportLogQuery;
use super::service::{ImportService, ServiceError};

/// Fetch the feeds and queue them for the workers.
///
/// The body is optional: `{ "urls": [...], "sourceLabel": "..." }`.
#[post("/import")]
async fn trigger_import(
    service: Data<ImportService>,
    body: web::Bytes,
) -> Result<HttpResponse, ServiceError> {
    let request = ImportService::parse_request(&body)?;
    let response = service.start_import(request).await?;
    Ok(HttpResponse::Accepted().json(response))
}

/// Import run summaries, newest first
#[get("/import-logs")]
async fn list_import_logs(
    service: Data<ImportService>,
    query: Query<ImportLogQuery>,
) -> Result<HttpResponse, ServiceError> {
    let logs = service.recent_logs(query.limit).await?;
    Ok(HttpResponse::Ok().json(logs))
}

pub fn import_config(config: &mut ServiceConfig) {
    config.service(trigger_import).service(list_import_logs);
}
