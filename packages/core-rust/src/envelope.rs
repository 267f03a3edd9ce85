//! Response envelope and the server-wide error code table.
//!
//! Every reply written back to a caller, success or failure, is a
//! [`ResponseEnvelope`]. Failures carry a bracketed error code at the start of
//! `message` (e.g. `"[10004]"`), while the numeric `code` field stays `0`,
//! which is what existing clients key on.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Error codes rendered into envelope messages as `[{code}]{detail}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The requested service could not be reached (unknown namespace/operation).
    AccessFailed,
    /// The caller presented no identity.
    IllegalAccess,
    /// The caller exceeded its admission allowance.
    TooManyRequests,
    /// Malformed request: bad header, undecodable body, bad or missing signature.
    InvalidParams,
    /// Server-side failure, including oversized requests.
    ServerError,
    /// Storage failure reported by a unit.
    DatabaseError,
    /// Anything else a unit wants to report.
    Other,
}

impl ErrorCode {
    /// Numeric value of the code.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::AccessFailed => 10001,
            Self::IllegalAccess => 10002,
            Self::TooManyRequests => 10003,
            Self::InvalidParams => 10004,
            Self::ServerError => 10005,
            Self::DatabaseError => 10006,
            Self::Other => 10007,
        }
    }

    /// Human-readable meaning of the code.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::AccessFailed => "access failed",
            Self::IllegalAccess => "illegal access",
            Self::TooManyRequests => "too many requests",
            Self::InvalidParams => "invalid parameters",
            Self::ServerError => "server error",
            Self::DatabaseError => "database error",
            Self::Other => "other error",
        }
    }

    /// Formats `detail` with this code's bracketed prefix.
    ///
    /// ```
    /// use nado_core::ErrorCode;
    ///
    /// assert_eq!(ErrorCode::InvalidParams.tag(""), "[10004]");
    /// assert_eq!(ErrorCode::ServerError.tag("out of bounds"), "[10005]out of bounds");
    /// ```
    #[must_use]
    pub fn tag(self, detail: &str) -> String {
        format!("[{}]{detail}", self.code())
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code(), self.description())
    }
}

// ---------------------------------------------------------------------------
// ResponseEnvelope
// ---------------------------------------------------------------------------

/// The uniform `{code, success, data, message}` result shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub code: i64,
    pub success: bool,
    pub data: rmpv::Value,
    pub message: String,
}

impl ResponseEnvelope {
    /// Successful envelope carrying `data` verbatim.
    #[must_use]
    pub fn success(data: rmpv::Value) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    /// Failed envelope with an empty data sequence.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            ..Self::default()
        }
    }

    /// Failed envelope whose message is `code` tagged onto `detail`.
    #[must_use]
    pub fn error(code: ErrorCode, detail: &str) -> Self {
        Self::failure(code.tag(detail))
    }
}

impl Default for ResponseEnvelope {
    fn default() -> Self {
        Self {
            code: 0,
            success: true,
            data: rmpv::Value::Array(Vec::new()),
            message: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_table() {
        assert_eq!(ErrorCode::AccessFailed.code(), 10001);
        assert_eq!(ErrorCode::IllegalAccess.code(), 10002);
        assert_eq!(ErrorCode::TooManyRequests.code(), 10003);
        assert_eq!(ErrorCode::InvalidParams.code(), 10004);
        assert_eq!(ErrorCode::ServerError.code(), 10005);
        assert_eq!(ErrorCode::DatabaseError.code(), 10006);
        assert_eq!(ErrorCode::Other.code(), 10007);
    }

    #[test]
    fn default_envelope_is_empty_success() {
        let env = ResponseEnvelope::default();
        assert!(env.success);
        assert_eq!(env.code, 0);
        assert_eq!(env.data, rmpv::Value::Array(Vec::new()));
        assert!(env.message.is_empty());
    }

    #[test]
    fn error_envelope_keeps_numeric_code_zero() {
        let env = ResponseEnvelope::error(ErrorCode::InvalidParams, "");
        assert!(!env.success);
        assert_eq!(env.code, 0);
        assert_eq!(env.message, "[10004]");
        assert_eq!(env.data, rmpv::Value::Array(Vec::new()));
    }

    #[test]
    fn success_envelope_carries_data_verbatim() {
        let data = rmpv::Value::Map(vec![(
            rmpv::Value::from("action"),
            rmpv::Value::from("view"),
        )]);
        let env = ResponseEnvelope::success(data.clone());
        assert!(env.success);
        assert_eq!(env.data, data);
    }

    #[test]
    fn display_includes_description() {
        assert_eq!(
            ErrorCode::TooManyRequests.to_string(),
            "10003 (too many requests)"
        );
    }
}
