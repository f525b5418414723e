use thiserror::Error;

/// Errors raised while decomposing a post payload.
///
/// Only the outermost call surfaces these; failures inside an embedded
/// repost are logged and the repost is skipped.
#[derive(Debug, Error)]
pub enum MeltError {
    #[error("invalid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("expected a JSON object after unwrapping, found {found}")]
    NotAnObject { found: &'static str },

    #[error("payload nesting exceeds the limit of {limit} levels")]
    DepthExceeded { limit: usize },

    #[error("invalid field registry: {0}")]
    Registry(String),
}

pub type Result<T> = std::result::Result<T, MeltError>;

/// Name of the JSON type of `value`, for error messages.
pub(crate) fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
