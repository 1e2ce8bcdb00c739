use std::error::Error;
use std::fmt;

/// Errors reported at the circuit boundary: text that fails to parse, and
/// instructions whose shape is incompatible with their gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CircuitError {
    /// The text failed to parse. `line` is 1-based.
    Parse { line: usize, message: String },
    /// An instruction was structurally valid but semantically wrong.
    Validation { message: String },
}

impl CircuitError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        CircuitError::Validation {
            message: message.into(),
        }
    }
}

impl fmt::Display for CircuitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitError::Parse { line, message } => {
                write!(f, "Circuit parse error at line {line}: {message}")
            }
            CircuitError::Validation { message } => {
                write!(f, "Invalid circuit instruction: {message}")
            }
        }
    }
}

impl Error for CircuitError {}
