use thiserror::Error;

/// Errors surfaced by the stream-processing core.
///
/// Per-message variants (`Decode`, `TransientBus`) never escape the ingest
/// loop; they are logged and reflected in the metrics registry. `FatalBus`
/// escalates to the shutdown path. `Config` aborts the process at startup.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("failed to decode message payload: {reason}")]
    Decode { reason: String },

    #[error("transient bus error while publishing alert: {reason}")]
    TransientBus { reason: String },

    #[error("fatal bus error, subscription lost: {reason}")]
    FatalBus { reason: String },

    #[error("invalid configuration for {field}: {reason}")]
    Config { field: String, reason: String },
}

pub type ProcessorResult<T> = Result<T, ProcessorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_display() {
        let err = ProcessorError::Decode {
            reason: "missing field".into(),
        };
        assert_eq!(
            err.to_string(),
            "failed to decode message payload: missing field"
        );
    }

    #[test]
    fn config_error_display() {
        let err = ProcessorError::Config {
            field: "WINDOW_SIZE_SECONDS".into(),
            reason: "not a number".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid configuration for WINDOW_SIZE_SECONDS: not a number"
        );
    }

    #[test]
    fn errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ProcessorError>();
    }
}
