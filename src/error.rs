// error.rs - Idiomatic Rust error type for the matcher.
//
// Groups the i32 engine result codes into semantic variants while keeping
// the numeric code available for callers that log or compare codes.

use std::fmt;

use crate::oniguruma::*;
use crate::regerror::{onig_error_code_to_format, onig_error_code_to_str};

/// Error returned by match, search and scan.
///
/// A plain mismatch is not an error: the entry points return `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegexError {
    /// Allocation size overflow (match cache sizing).
    Memory,
    /// The frame stack reached the configured limit.
    MatchStackLimitOver,
    /// Backtrack count within one `match_at` call exceeded its limit.
    RetryLimitInMatchOver,
    /// Backtrack count across one search exceeded its limit.
    RetryLimitInSearchOver,
    /// Deadline passed.
    TimeLimitOver,
    /// The interrupt callback asked the matcher to stop.
    Interrupted,
    /// Invalid argument passed to a function.
    InvalidArgument,
    /// Inconsistent program or stack (should not occur with well-formed programs).
    InternalBug { code: i32, message: String },
    /// Subject bytes are not valid in the program's encoding.
    Encoding { code: i32, message: String },
    /// Other error not covered by specific variants.
    Other(i32),
}

impl RegexError {
    pub(crate) fn internal(code: i32) -> Self {
        RegexError::InternalBug {
            code,
            message: onig_error_code_to_format(code).to_string(),
        }
    }

    pub(crate) fn invalid_string(at: usize) -> Self {
        RegexError::Encoding {
            code: ONIGERR_INVALID_CODE_POINT_VALUE,
            message: onig_error_code_to_str(ONIGERR_INVALID_CODE_POINT_VALUE, Some(at)),
        }
    }

    /// Returns the engine result code for this error.
    pub fn code(&self) -> i32 {
        match self {
            RegexError::Memory => ONIGERR_MEMORY,
            RegexError::MatchStackLimitOver => ONIGERR_MATCH_STACK_LIMIT_OVER,
            RegexError::RetryLimitInMatchOver => ONIGERR_RETRY_LIMIT_IN_MATCH_OVER,
            RegexError::RetryLimitInSearchOver => ONIGERR_RETRY_LIMIT_IN_SEARCH_OVER,
            RegexError::TimeLimitOver => ONIGERR_TIME_LIMIT_OVER,
            RegexError::Interrupted => ONIG_ABORT,
            RegexError::InvalidArgument => ONIGERR_INVALID_ARGUMENT,
            RegexError::InternalBug { code, .. } => *code,
            RegexError::Encoding { code, .. } => *code,
            RegexError::Other(code) => *code,
        }
    }

    /// True for the limit and deadline errors a caller may retry with
    /// looser settings.
    pub fn is_resource_limit(&self) -> bool {
        matches!(
            self,
            RegexError::MatchStackLimitOver
                | RegexError::RetryLimitInMatchOver
                | RegexError::RetryLimitInSearchOver
                | RegexError::TimeLimitOver
                | RegexError::Interrupted
        )
    }
}

impl fmt::Display for RegexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegexError::Memory => f.write_str("match cache too large to allocate"),
            RegexError::MatchStackLimitOver
            | RegexError::RetryLimitInMatchOver
            | RegexError::RetryLimitInSearchOver
            | RegexError::TimeLimitOver
            | RegexError::InvalidArgument => f.write_str(onig_error_code_to_format(self.code())),
            RegexError::Interrupted => f.write_str("interrupted by callback"),
            RegexError::InternalBug { code, message } => write!(f, "malformed program ({}): {}", code, message),
            RegexError::Encoding { message, .. } => write!(f, "invalid subject: {}", message),
            RegexError::Other(code) => write!(f, "engine error {}", code),
        }
    }
}

impl std::error::Error for RegexError {}

impl From<i32> for RegexError {
    fn from(code: i32) -> Self {
        match code {
            ONIGERR_MEMORY => RegexError::Memory,
            ONIGERR_MATCH_STACK_LIMIT_OVER => RegexError::MatchStackLimitOver,
            ONIGERR_RETRY_LIMIT_IN_MATCH_OVER => RegexError::RetryLimitInMatchOver,
            ONIGERR_RETRY_LIMIT_IN_SEARCH_OVER => RegexError::RetryLimitInSearchOver,
            ONIGERR_TIME_LIMIT_OVER => RegexError::TimeLimitOver,
            ONIG_ABORT => RegexError::Interrupted,
            ONIGERR_INVALID_ARGUMENT => RegexError::InvalidArgument,

            ONIGERR_TYPE_BUG
            | ONIGERR_STACK_BUG
            | ONIGERR_UNDEFINED_BYTECODE
            | ONIGERR_UNEXPECTED_BYTECODE => RegexError::internal(code),

            ONIGERR_INVALID_CODE_POINT_VALUE | ONIGERR_TOO_BIG_WIDE_CHAR_VALUE => {
                RegexError::Encoding {
                    code,
                    message: onig_error_code_to_format(code).to_string(),
                }
            }

            _ => RegexError::Other(code),
        }
    }
}
