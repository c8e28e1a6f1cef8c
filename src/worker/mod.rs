pub mod import_worker;

pub use import_worker::{ImportStats, ImportWorker, WorkerState};
