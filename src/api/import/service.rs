use std::sync::Arc;

use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;
use tracing::{error, info, warn};
use validator::Validate;

use super::dto::ImportResponse;
use super::models::ImportRequest;
use crate::api::validation::{body_error_fields, field_errors, ErrorResponse};
use crate::db::models::ImportLogRow;
use crate::error::{QueueError, StoreError};
use crate::feed::FeedSource;
use crate::import::{ImportTrigger, SourceFailure, TriggerError};
use crate::queue::ImportQueue;
use crate::store::ImportLogStore;

/// Service-level errors
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Body was not valid JSON for an import request
    #[error("malformed request body")]
    InvalidBody(serde_json::Value),

    #[error("validation failed")]
    Validation(serde_json::Value),

    #[error("all {} feed sources failed", .0.len())]
    AllSourcesFailed(Vec<SourceFailure>),

    #[error("import queue unavailable: {0}")]
    Queue(#[from] QueueError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl From<TriggerError> for ServiceError {
    fn from(err: TriggerError) -> Self {
        match err {
            TriggerError::NoSources => ServiceError::Validation(serde_json::json!({
                "urls": {"errors": ["At least one feed URL is required"]}
            })),
            TriggerError::AllSourcesFailed(failures) => ServiceError::AllSourcesFailed(failures),
            TriggerError::Queue(e) => ServiceError::Queue(e),
        }
    }
}

impl ResponseError for ServiceError {
    fn error_response(&self) -> HttpResponse {
        match self {
            ServiceError::InvalidBody(fields) => {
                warn!("Rejected import request body: {}", fields);
                HttpResponse::BadRequest().json(ErrorResponse {
                    error: "Request validation failed".to_string(),
                    fields: fields.clone(),
                })
            }
            ServiceError::Validation(fields) => {
                warn!("Validation error: {}", fields);
                HttpResponse::BadRequest().json(ErrorResponse {
                    error: "Validation failed".to_string(),
                    fields: fields.clone(),
                })
            }
            ServiceError::AllSourcesFailed(failures) => {
                error!("Import aborted, every feed source failed");
                HttpResponse::BadGateway().json(ErrorResponse {
                    error: "Failed to fetch feeds".to_string(),
                    fields: serde_json::json!({"failedSources": failures}),
                })
            }
            ServiceError::Queue(e) => {
                error!("Queue error: {}", e);
                HttpResponse::ServiceUnavailable().json(ErrorResponse {
                    error: "Import queue unavailable".to_string(),
                    fields: serde_json::json!({
                        "message": "Could not enqueue import, try again later"
                    }),
                })
            }
            ServiceError::Store(e) => {
                error!("Store error: {}", e);
                HttpResponse::InternalServerError().json(ErrorResponse {
                    error: "Failed to process request".to_string(),
                    fields: serde_json::json!({"message": "Database error occurred"}),
                })
            }
        }
    }
}

/// Import trigger and query façade behind the HTTP routes
pub struct ImportService {
    trigger: ImportTrigger,
    queue: Arc<dyn ImportQueue>,
    logs: Arc<dyn ImportLogStore>,
    default_urls: Vec<String>,
    default_label: String,
}

impl ImportService {
    pub fn new(
        source: Arc<dyn FeedSource>,
        queue: Arc<dyn ImportQueue>,
        logs: Arc<dyn ImportLogStore>,
        default_urls: Vec<String>,
        default_label: impl Into<String>,
    ) -> Self {
        Self {
            trigger: ImportTrigger::new(source, queue.clone()),
            queue,
            logs,
            default_urls,
            default_label: default_label.into(),
        }
    }

    /// An empty body means "import the configured feeds".
    pub fn parse_request(body: &[u8]) -> Result<ImportRequest, ServiceError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(ImportRequest::default());
        }

        let request: ImportRequest = serde_json::from_slice(body)
            .map_err(|e| ServiceError::InvalidBody(body_error_fields(&e)))?;

        request
            .validate()
            .map_err(|e| ServiceError::Validation(field_errors(&e)))?;

        if let Some(urls) = &request.urls {
            let invalid: Vec<String> = urls
                .iter()
                .filter(|u| !(u.starts_with("http://") || u.starts_with("https://")))
                .map(|u| format!("Not an http(s) URL: {}", u))
                .collect();
            if !invalid.is_empty() {
                return Err(ServiceError::Validation(
                    serde_json::json!({"urls": {"errors": invalid}}),
                ));
            }
        }

        Ok(request)
    }

    /// Fetch the requested (or configured) feeds and queue them as one batch.
    pub async fn start_import(
        &self,
        request: ImportRequest,
    ) -> Result<ImportResponse, ServiceError> {
        let urls = request.urls.unwrap_or_else(|| self.default_urls.clone());
        let label = request
            .source_label
            .unwrap_or_else(|| self.default_label.clone());

        info!("Service: Import requested for {} feeds, label={}", urls.len(), label);

        let details = self.trigger.trigger(&urls, &label).await?;

        Ok(ImportResponse {
            success: true,
            message: format!(
                "Fetched {} jobs from {} feeds, queued for import",
                details.total_fetched, details.sources_succeeded
            ),
            details,
        })
    }

    /// Import logs newest first, optionally capped at `limit` entries.
    pub async fn recent_logs(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<ImportLogRow>, ServiceError> {
        Ok(self.logs.list_recent(limit).await?)
    }

    pub async fn pending_tasks(&self) -> Result<i64, QueueError> {
        self.queue.pending_count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_body_uses_configured_defaults() {
        let request = ImportService::parse_request(b"  \n").expect("blank body accepted");
        assert!(request.urls.is_none());
        assert!(request.source_label.is_none());
    }

    #[test]
    fn body_with_overrides_is_parsed() {
        let request = ImportService::parse_request(
            br#"{"urls": ["https://a.test/feed"], "sourceLabel": "design"}"#,
        )
        .expect("valid body");
        assert_eq!(request.urls, Some(vec!["https://a.test/feed".to_string()]));
        assert_eq!(request.source_label.as_deref(), Some("design"));
    }

    #[test]
    fn empty_url_list_is_rejected() {
        let err = ImportService::parse_request(br#"{"urls": []}"#).expect_err("invalid");
        match err {
            ServiceError::Validation(fields) => assert!(fields.get("urls").is_some()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn non_http_url_is_rejected() {
        let err = ImportService::parse_request(br#"{"urls": ["ftp://a.test/feed"]}"#)
            .expect_err("invalid");
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn garbage_body_is_reported_as_malformed() {
        let err = ImportService::parse_request(b"{not json").expect_err("invalid");
        assert!(matches!(err, ServiceError::InvalidBody(_)));
    }
}
