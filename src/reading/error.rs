//! Reading decode errors

use thiserror::Error;

/// Errors raised while turning raw bytes into a [`Reading`](super::Reading)
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Payload is not syntactically valid JSON
    #[error("Invalid JSON: {0}")]
    InvalidJson(serde_json::Error),

    /// Payload is JSON but a field is missing or has the wrong type
    #[error("Invalid field: {0}")]
    InvalidField(serde_json::Error),

    /// Capture timestamp cannot be represented as an instant
    #[error("Timestamp out of range: {0} ms")]
    TimestampOutOfRange(i64),
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        match err.classify() {
            serde_json::error::Category::Data => DecodeError::InvalidField(err),
            _ => DecodeError::InvalidJson(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_error_classified_as_invalid_json() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(matches!(DecodeError::from(err), DecodeError::InvalidJson(_)));
    }

    #[test]
    fn test_out_of_range_display() {
        let err = DecodeError::TimestampOutOfRange(i64::MAX);
        assert!(err.to_string().starts_with("Timestamp out of range"));
    }
}
