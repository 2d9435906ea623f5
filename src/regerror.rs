// regerror.rs - Error code to message conversion.

use crate::oniguruma::*;

/// Static message for an engine result code.
pub fn onig_error_code_to_format(code: i32) -> &'static str {
    match code {
        ONIG_NORMAL => "success",
        ONIG_MISMATCH => "mismatch",
        ONIG_NO_SUPPORT_CONFIG => "no support in this configuration",
        ONIG_ABORT => "abort",
        ONIGERR_MEMORY => "fail to memory allocation",
        ONIGERR_TYPE_BUG => "undefined type (bug)",
        ONIGERR_STACK_BUG => "stack error (bug)",
        ONIGERR_UNDEFINED_BYTECODE => "undefined bytecode (bug)",
        ONIGERR_UNEXPECTED_BYTECODE => "unexpected bytecode (bug)",
        ONIGERR_MATCH_STACK_LIMIT_OVER => "match-stack limit over",
        ONIGERR_RETRY_LIMIT_IN_MATCH_OVER => "retry-limit-in-match over",
        ONIGERR_RETRY_LIMIT_IN_SEARCH_OVER => "retry-limit-in-search over",
        ONIGERR_TIME_LIMIT_OVER => "time limit over",
        ONIGERR_INVALID_ARGUMENT => "invalid argument",
        ONIGERR_INVALID_CODE_POINT_VALUE => "invalid code point value",
        ONIGERR_TOO_BIG_WIDE_CHAR_VALUE => "too big wide-char value",
        _ => "undefined error code",
    }
}

/// Owned message for `code`. When `at` is given (a byte offset into the
/// subject), it is appended for encoding errors.
pub fn onig_error_code_to_str(code: i32, at: Option<usize>) -> String {
    let fmt = onig_error_code_to_format(code);
    match (code, at) {
        (ONIGERR_INVALID_CODE_POINT_VALUE | ONIGERR_TOO_BIG_WIDE_CHAR_VALUE, Some(pos)) => {
            format!("{} at byte {}", fmt, pos)
        }
        _ => fmt.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_engine_code_has_a_message() {
        let codes = [
            ONIG_MISMATCH,
            ONIG_ABORT,
            ONIGERR_MEMORY,
            ONIGERR_STACK_BUG,
            ONIGERR_UNDEFINED_BYTECODE,
            ONIGERR_UNEXPECTED_BYTECODE,
            ONIGERR_MATCH_STACK_LIMIT_OVER,
            ONIGERR_RETRY_LIMIT_IN_MATCH_OVER,
            ONIGERR_RETRY_LIMIT_IN_SEARCH_OVER,
            ONIGERR_TIME_LIMIT_OVER,
            ONIGERR_INVALID_ARGUMENT,
            ONIGERR_INVALID_CODE_POINT_VALUE,
        ];
        for code in codes {
            assert_ne!(onig_error_code_to_format(code), "undefined error code", "code {}", code);
        }
        assert_eq!(onig_error_code_to_str(-9999, None), "undefined error code");
    }

    #[test]
    fn subject_offset_only_for_encoding_errors() {
        assert_eq!(
            onig_error_code_to_str(ONIGERR_INVALID_CODE_POINT_VALUE, Some(7)),
            "invalid code point value at byte 7"
        );
        assert_eq!(onig_error_code_to_str(ONIGERR_STACK_BUG, Some(7)), "stack error (bug)");
    }
}
