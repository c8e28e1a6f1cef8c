pub mod connection;
pub mod import_log_repository;
pub mod job_repository;
pub mod migrations;
pub mod models;
pub mod queue;
pub mod store;
pub mod task_repository;

pub use queue::PgImportQueue;
pub use store::PgStore;
