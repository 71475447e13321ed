//! Shared error-code contract.
//!
//! Every layer's error enum implements [`ErrorCode`] so the HTTP layer can
//! attach a grepable code to error bodies and log whether a caller may retry.

/// Grepable error code and retryable flag for structured error responses.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}
