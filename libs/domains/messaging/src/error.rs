use thiserror::Error;

/// Errors raised while admitting inbound messages.
#[derive(Error, Debug)]
pub enum MessagingError {
    /// A required payload field is absent.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// The payload carries a value that violates an invariant.
    #[error("Invalid field '{field}': {details}")]
    InvalidField {
        field: &'static str,
        details: String,
    },

    /// Redis operation failed.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// JSON (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MessagingError::MissingField("key.id");
        assert_eq!(err.to_string(), "Missing required field: key.id");

        let err = MessagingError::InvalidField {
            field: "phone",
            details: "too short".to_string(),
        };
        assert!(err.to_string().contains("phone"));
        assert!(err.to_string().contains("too short"));
    }
}
