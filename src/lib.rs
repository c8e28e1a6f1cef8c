//! RSS job-feed import pipeline.
//!
//! Feeds are fetched and normalized by [`import::ImportTrigger`], queued as
//! one batch per trigger on an [`queue::ImportQueue`], and consumed by
//! [`worker::ImportWorker`]s that upsert every posting and record one import
//! log per run.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod import;
pub mod queue;
pub mod shutdown;
pub mod store;
pub mod telemetry;
pub mod worker;
