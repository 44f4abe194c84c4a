//! Error type shared across the core.

use thiserror::Error;

/// Errors produced by the core library.
///
/// Transform passes distinguish two situations: a loop that merely fails an
/// eligibility check is *not* an error (the pass reports `changed: false`
/// and leaves the IR untouched); a structural precondition breach — the
/// canonicalization passes did not run, or a prior transform corrupted the
/// graph — is `Precondition` and aborts the compilation unit, since
/// continuing would miscompile it.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("function `{function}`: {message}")]
    Precondition { function: String, message: String },

    #[error("invalid symbol name `{name}`")]
    InvalidSymbol { name: String },

    #[error("unknown function `{name}`")]
    UnknownFunction { name: String },

    #[error("evaluation error: {message}")]
    Eval { message: String },
}

impl CoreError {
    pub(crate) fn precondition(function: &str, message: impl Into<String>) -> Self {
        CoreError::Precondition {
            function: function.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn eval(message: impl Into<String>) -> Self {
        CoreError::Eval {
            message: message.into(),
        }
    }
}
