//! HTTP routes against in-memory stores, queue and feeds.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use actix_web::{http::StatusCode, test, web, App};
use async_trait::async_trait;
use feed_importer::api::health::health_config;
use feed_importer::api::import::{import_config, ImportService};
use feed_importer::api::validation;
use feed_importer::error::{FeedError, QueueError};
use feed_importer::feed::FeedSource;
use feed_importer::import::QueuedTask;
use feed_importer::queue::{Delivery, ImportQueue, MemoryQueue, TaskId};
use feed_importer::store::MemoryStore;
use feed_importer::worker::ImportWorker;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;

const FEED_URL: &str = "https://feeds.test/jobs";
const FEED: &str = "<rss><channel>\
    <item><title>Platform Engineer</title><link>https://jobs.test/1</link></item>\
    <item><title>Support Lead</title><link>https://jobs.test/2</link></item>\
    </channel></rss>";

struct StaticFeeds(HashMap<String, String>);

#[async_trait]
impl FeedSource for StaticFeeds {
    async fn fetch(&self, url: &str) -> Result<String, FeedError> {
        self.0.get(url).cloned().ok_or_else(|| FeedError::HttpStatus {
            status: 503,
            url: url.to_string(),
        })
    }
}

struct DownQueue;

#[async_trait]
impl ImportQueue for DownQueue {
    async fn enqueue(&self, _task: QueuedTask) -> Result<TaskId, QueueError> {
        Err(QueueError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn claim(&self, _worker_id: &str) -> Result<Option<Delivery>, QueueError> {
        Err(QueueError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        Err(QueueError::UnknownDelivery(delivery.id))
    }

    async fn release(&self, delivery: &Delivery, _reason: &str) -> Result<(), QueueError> {
        Err(QueueError::UnknownDelivery(delivery.id))
    }

    async fn pending_count(&self) -> Result<i64, QueueError> {
        Err(QueueError::Database(sqlx::Error::PoolTimedOut))
    }
}

fn feeds() -> Arc<StaticFeeds> {
    Arc::new(StaticFeeds(HashMap::from([(
        FEED_URL.to_string(),
        FEED.to_string(),
    )])))
}

fn service(queue: Arc<dyn ImportQueue>, store: Arc<MemoryStore>) -> web::Data<ImportService> {
    web::Data::new(ImportService::new(
        feeds(),
        queue,
        store,
        vec![FEED_URL.to_string()],
        "job_feed",
    ))
}

macro_rules! app {
    ($service:expr) => {
        test::init_service(
            App::new()
                .app_data($service.clone())
                .app_data(validation::query_config())
                .configure(health_config)
                .configure(import_config),
        )
        .await
    };
}

#[actix_web::test]
async fn import_without_body_queues_configured_feeds() {
    let queue = Arc::new(MemoryQueue::new());
    let store = Arc::new(MemoryStore::new());
    let app = app!(service(queue.clone(), store));

    let req = test::TestRequest::post().uri("/import").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["details"]["totalFetched"], 2);
    assert_eq!(body["details"]["sourcesSucceeded"], 1);
    assert!(body["details"]["queuedAt"].is_string());
    assert_eq!(queue.pending_count().await.expect("count"), 1);
}

#[actix_web::test]
async fn import_with_body_overrides_label() {
    let queue = Arc::new(MemoryQueue::new());
    let store = Arc::new(MemoryStore::new());
    let app = app!(service(queue.clone(), store));

    let req = test::TestRequest::post()
        .uri("/import")
        .set_json(serde_json::json!({"urls": [FEED_URL], "sourceLabel": "design"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let delivery = queue.claim("w").await.expect("claim").expect("queued");
    assert_eq!(delivery.task.source_label, "design");
}

#[actix_web::test]
async fn import_rejects_invalid_body() {
    let queue = Arc::new(MemoryQueue::new());
    let app = app!(service(queue.clone(), Arc::new(MemoryStore::new())));

    let req = test::TestRequest::post()
        .uri("/import")
        .set_json(serde_json::json!({"urls": []}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Validation failed");
    assert!(body["fields"]["urls"]["errors"].is_array());
    assert_eq!(queue.pending_count().await.expect("count"), 0);
}

#[actix_web::test]
async fn import_fails_with_bad_gateway_when_every_feed_fails() {
    let queue = Arc::new(MemoryQueue::new());
    let app = app!(service(queue.clone(), Arc::new(MemoryStore::new())));

    let req = test::TestRequest::post()
        .uri("/import")
        .set_json(serde_json::json!({"urls": ["https://down.test/feed"]}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["fields"]["failedSources"][0]["url"], "https://down.test/feed");
    assert_eq!(queue.pending_count().await.expect("count"), 0);
}

#[actix_web::test]
async fn import_reports_unavailable_queue() {
    let app = app!(service(Arc::new(DownQueue), Arc::new(MemoryStore::new())));

    let req = test::TestRequest::post().uri("/import").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[actix_web::test]
async fn import_logs_are_listed_newest_first() {
    let queue = Arc::new(MemoryQueue::new());
    let store = Arc::new(MemoryStore::new());
    let app = app!(service(queue.clone(), store.clone()));
    let worker = ImportWorker::new(store.clone(), store.clone());

    for _ in 0..2 {
        let req = test::TestRequest::post().uri("/import").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::ACCEPTED);

        let delivery = queue.claim("w").await.expect("claim").expect("queued");
        worker.process(&delivery.task).await.expect("run completes");
        queue.ack(&delivery).await.expect("ack");
    }

    let req = test::TestRequest::get().uri("/import-logs").to_request();
    let logs: Value = test::call_and_read_body_json(&app, req).await;
    let logs = logs.as_array().expect("array of logs");
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0]["newCount"], 0);
    assert_eq!(logs[0]["updatedCount"], 2);
    assert_eq!(logs[1]["newCount"], 2);
    assert_eq!(logs[1]["sourceLabel"], "job_feed");

    let req = test::TestRequest::get().uri("/import-logs?limit=1").to_request();
    let limited: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(limited.as_array().map(Vec::len), Some(1));

    let req = test::TestRequest::get().uri("/import-logs?limit=0").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn health_reports_queue_depth() {
    let queue = Arc::new(MemoryQueue::new());
    let app = app!(service(queue.clone(), Arc::new(MemoryStore::new())));

    let req = test::TestRequest::post().uri("/import").to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "not_configured");
    assert_eq!(body["queue"], "available");
    assert_eq!(body["pendingTasks"], 1);

    let req = test::TestRequest::get().uri("/live").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
}

#[actix_web::test]
async fn readiness_fails_when_queue_is_down() {
    let app = app!(service(Arc::new(DownQueue), Arc::new(MemoryStore::new())));

    let req = test::TestRequest::get().uri("/ready").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "not_ready");
    assert_eq!(body["database"], "not_configured");
    assert_eq!(body["queue"], "unavailable");
    assert!(body["error"]
        .as_str()
        .is_some_and(|e| e.starts_with("Queue error")));
}

#[actix_web::test]
async fn health_pings_registered_pool() {
    // Nothing listens on port 1, so the ping fails while the queue still answers.
    let pool = PgPoolOptions::new()
        .acquire_timeout(Duration::from_secs(2))
        .connect_lazy("postgres://importer@127.0.0.1:1/importer")
        .expect("lazy pool");
    let service = service(Arc::new(MemoryQueue::new()), Arc::new(MemoryStore::new()));
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(pool))
            .app_data(service.clone())
            .configure(health_config),
    )
    .await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["database"], "disconnected");
    assert_eq!(body["queue"], "available");
    assert_eq!(body["pendingTasks"], 0);
}
