pub mod dto;
pub mod handlers;
pub mod models;
pub mod service;

// Re-export commonly used types
pub use handlers::import_config;
pub use models::ImportRequest;
pub use service::{ImportService, ServiceError};
