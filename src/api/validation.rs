use actix_web::HttpResponse;
use serde::Serialize;
use validator::ValidationErrors;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub fields: serde_json::Value,
}

/// `{ "<field>": { "errors": [..messages] } }` for every failed field
pub fn field_errors(validation_errors: &ValidationErrors) -> serde_json::Value {
    let mut fields = serde_json::Map::new();

    for (field, errors) in validation_errors.field_errors() {
        let messages: Vec<String> = errors
            .iter()
            .map(|e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Validation error in field: {}", field))
            })
            .collect();
        fields.insert(field.to_string(), serde_json::json!({"errors": messages}));
    }

    serde_json::Value::Object(fields)
}

/// Describe a JSON body that failed to deserialize without echoing serde internals
pub fn body_error_fields(err: &serde_json::Error) -> serde_json::Value {
    let err_string = err.to_string();

    let message = if err_string.contains("EOF while parsing") {
        "Request body is truncated. Expected JSON payload"
    } else if err_string.contains("invalid type") {
        "Invalid field type. Check the expected type for each field"
    } else if err_string.contains("unknown field") {
        "Unknown field. Allowed fields are urls and sourceLabel"
    } else {
        "Invalid JSON format"
    };

    serde_json::json!({"message": message})
}

/// Creates a configured QueryConfig with standardized error handling for the entire project
pub fn query_config() -> actix_web_validator::QueryConfig {
    actix_web_validator::QueryConfig::default().error_handler(|err, _req| {
        let error_response = match err {
            actix_web_validator::Error::Validate(validation_errors) => ErrorResponse {
                error: "Validation failed".to_string(),
                fields: field_errors(&validation_errors),
            },
            actix_web_validator::Error::Deserialize(_) => ErrorResponse {
                error: "Request validation failed".to_string(),
                fields: serde_json::json!({"message": "Invalid query string"}),
            },
            _ => ErrorResponse {
                error: "Validation failed".to_string(),
                fields: serde_json::json!({"message": "Validation error"}),
            },
        };

        actix_web::error::InternalError::from_response(
            "",
            HttpResponse::BadRequest().json(error_response),
        )
        .into()
    })
}
