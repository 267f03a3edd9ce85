//! Dispatch errors and their mapping onto response envelopes.

use nado_core::{CodecError, ErrorCode, FrameError, ResponseEnvelope};

use super::registry::LookupError;
use super::scheduler::SchedulerError;

/// Everything that can stop a command before a unit produces its envelope.
///
/// Every variant is terminal for its own request only; none is retried.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Malformed header, undecodable body, bad or missing signature, missing
    /// service/method. The detail is logged, never sent to the caller.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
    #[error(transparent)]
    UnknownService(#[from] LookupError),
    #[error("declared body length {declared} exceeds limit {max}")]
    OutOfBounds { declared: usize, max: usize },
    #[error("scheduler is shut down")]
    SchedulerClosed,
    /// The consumer dropped the response sink without delivering.
    #[error("unit did not deliver a response")]
    Undelivered,
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}

impl DispatchError {
    /// The envelope written back for this error.
    #[must_use]
    pub fn into_envelope(self) -> ResponseEnvelope {
        match self {
            Self::InvalidParams(_) => ResponseEnvelope::error(ErrorCode::InvalidParams, ""),
            Self::UnknownService(e) => ResponseEnvelope::error(ErrorCode::AccessFailed, &e.to_string()),
            Self::OutOfBounds { .. } => ResponseEnvelope::error(ErrorCode::ServerError, "out of bounds"),
            Self::SchedulerClosed => ResponseEnvelope::error(ErrorCode::ServerError, "scheduler closed"),
            Self::Undelivered => ResponseEnvelope::error(ErrorCode::ServerError, "unit aborted"),
            Self::Transport(_) => ResponseEnvelope::error(ErrorCode::ServerError, "transport error"),
        }
    }
}

impl From<SchedulerError> for DispatchError {
    fn from(e: SchedulerError) -> Self {
        match e {
            SchedulerError::Closed => Self::SchedulerClosed,
        }
    }
}

impl From<CodecError> for DispatchError {
    fn from(e: CodecError) -> Self {
        Self::InvalidParams(e.to_string())
    }
}

impl From<FrameError> for DispatchError {
    fn from(e: FrameError) -> Self {
        Self::InvalidParams(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_errors_hide_their_detail() {
        let env = DispatchError::InvalidParams("signature mismatch".into()).into_envelope();
        assert!(!env.success);
        assert_eq!(env.code, 0);
        assert_eq!(env.message, "[10004]");
    }

    #[test]
    fn unknown_service_carries_reason() {
        let err: DispatchError = LookupError {
            namespace: "billing".into(),
            operation: "refund".into(),
        }
        .into();
        assert_eq!(
            err.into_envelope().message,
            "[10001]can not find service billing[refund]"
        );
    }

    #[test]
    fn bounds_and_scheduler_errors_are_server_errors() {
        let env = DispatchError::OutOfBounds { declared: 10, max: 5 }.into_envelope();
        assert_eq!(env.message, "[10005]out of bounds");

        let err: DispatchError = SchedulerError::Closed.into();
        assert_eq!(err.into_envelope().message, "[10005]scheduler closed");
    }

    #[test]
    fn codec_and_frame_errors_become_invalid_params() {
        let err: DispatchError = CodecError::Decode("eof".into()).into();
        assert!(matches!(err, DispatchError::InvalidParams(_)));

        let err: DispatchError = FrameError::InvalidHeader("xx".into()).into();
        assert_eq!(err.into_envelope().message, "[10004]");
    }
}
