use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconError {
    #[error("Resource object '{0}' does not exist")]
    ResourceNotFound(String),

    #[error("File has no header line. Valid header names are: {0}")]
    MissingHeader(String),

    #[error("Bad file format: {0}")]
    BadFormat(String),

    #[error("'{0}' is a required attribute to be specified in file")]
    MissingRequiredField(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unexpected document structure: {0}")]
    DocumentStructure(String),

    #[error("XML error: {0}")]
    Xml(String),

    /// Export or import failure. `payload` holds the document that was being
    /// submitted, if any, so it can be recovered by hand.
    #[error("Metadata transaction '{operation}' failed: {message}")]
    Transaction {
        operation: String,
        message: String,
        payload: Option<String>,
    },

    #[error("Metadata store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ReconError {
    pub fn transaction(operation: &str, message: impl Into<String>) -> Self {
        ReconError::Transaction {
            operation: operation.to_string(),
            message: message.into(),
            payload: None,
        }
    }

    /// Attach the attempted payload to a transaction failure. Other kinds are
    /// converted into a transaction failure carrying the payload.
    pub fn with_payload(self, operation: &str, xml: String) -> Self {
        match self {
            ReconError::Transaction {
                operation, message, ..
            } => ReconError::Transaction {
                operation,
                message,
                payload: Some(xml),
            },
            other => ReconError::Transaction {
                operation: operation.to_string(),
                message: other.to_string(),
                payload: Some(xml),
            },
        }
    }

    pub fn payload(&self) -> Option<&str> {
        match self {
            ReconError::Transaction { payload, .. } => payload.as_deref(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_payload_keeps_transaction_message() {
        let err = ReconError::transaction("import", "lock held").with_payload("import", "<x/>".into());
        assert_eq!(err.payload(), Some("<x/>"));
        assert_eq!(err.to_string(), "Metadata transaction 'import' failed: lock held");
    }

    #[test]
    fn test_with_payload_wraps_other_kinds() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = ReconError::from(io).with_payload("import", "<x/>".into());
        match err {
            ReconError::Transaction { operation, message, payload } => {
                assert_eq!(operation, "import");
                assert!(message.contains("disk full"));
                assert_eq!(payload.as_deref(), Some("<x/>"));
            }
            other => panic!("unexpected error kind: {other:?}"),
        }
    }
}
