pub mod mapper;
pub mod models;
pub mod trigger;

pub use mapper::map_item;
pub use models::{JobRecord, NewImportLog, QueuedTask, UpsertOutcome};
pub use trigger::{ImportTrigger, SourceFailure, TriggerError, TriggerOutcome};
