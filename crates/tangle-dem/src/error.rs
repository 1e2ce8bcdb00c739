use std::error::Error;
use std::fmt;

use tangle_circuit::CircuitError;

/// Failures raised while converting a circuit into a detector error model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyzerError {
    /// A detector or observable anticommuted with a measurement or reset and
    /// gauge detectors are disallowed.
    GaugeDetector { message: String },
    /// The instruction has no independent-error semantics in the analyzer.
    UnsupportedGate { message: String },
    /// A composite error could not be reduced to graphlike components.
    DecompositionFailed { message: String },
    /// A noise channel argument is outside the analyzable range.
    InvalidProbability { message: String },
    /// The circuit itself was malformed.
    InvalidCircuit(CircuitError),
}

impl fmt::Display for AnalyzerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalyzerError::GaugeDetector { message }
            | AnalyzerError::UnsupportedGate { message }
            | AnalyzerError::DecompositionFailed { message }
            | AnalyzerError::InvalidProbability { message } => write!(f, "{message}"),
            AnalyzerError::InvalidCircuit(e) => write!(f, "{e}"),
        }
    }
}

impl Error for AnalyzerError {}

impl From<CircuitError> for AnalyzerError {
    fn from(e: CircuitError) -> Self {
        AnalyzerError::InvalidCircuit(e)
    }
}
