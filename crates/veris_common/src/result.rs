//! Common result and error types for the Veris toolchain.

/// The standard result type for fallible internal operations.
///
/// `Ok` contains the result value (which may be partial or degraded after
/// error recovery). `Err` indicates an unrecoverable internal error (a bug
/// in Veris), not a user-facing error. User errors are counted and
/// reported through diagnostics or the design error counter, and the
/// operation still returns `Ok`.
pub type VerisResult<T> = Result<T, InternalError>;

/// An internal error indicating a bug in Veris, not a user input problem.
///
/// These errors should never occur during normal operation. If one does
/// occur, it means there is a logic error in the toolchain that should be
/// fixed.
#[derive(Debug, thiserror::Error)]
#[error("internal error: {message}")]
pub struct InternalError {
    /// Description of the internal error.
    pub message: String,
}

impl InternalError {
    /// Creates a new internal error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for InternalError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format() {
        let err = InternalError::new("pin ring corrupted");
        assert_eq!(format!("{err}"), "internal error: pin ring corrupted");
    }

    #[test]
    fn ok_path() {
        let r: VerisResult<i32> = Ok(42);
        assert_eq!(r.ok(), Some(42));
    }

    #[test]
    fn from_string() {
        let err: InternalError = "from string".to_string().into();
        assert_eq!(err.message, "from string");
    }
}
