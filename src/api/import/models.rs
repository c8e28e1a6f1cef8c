use serde::Deserialize;
use validator::Validate;

/// Optional body of `POST /import`; missing fields fall back to the
/// configured feeds and label.
#[derive(Deserialize, Debug, Default, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ImportRequest {
    #[validate(length(min = 1, max = 20, message = "urls must list between 1 and 20 feeds"))]
    pub urls: Option<Vec<String>>,

    #[validate(length(
        min = 1,
        max = 64,
        message = "sourceLabel must be between 1 and 64 characters"
    ))]
    pub source_label: Option<String>,
}

/// Query string of `GET /import-logs`
#[derive(Deserialize, Debug, Validate)]
pub struct ImportLogQuery {
    #[validate(range(min = 1, max = 1000, message = "limit must be between 1 and 1000"))]
    pub limit: Option<usize>,
}
