use serde::Serialize;

use crate::import::TriggerOutcome;

/// Response for an accepted import trigger
#[derive(Serialize)]
pub struct ImportResponse {
    pub success: bool,
    pub message: String,
    pub details: TriggerOutcome,
}
