// Copyright 2025 The Tangle Developers
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use this file except
// in compliance with the License.You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software distributed under the License
// is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express
// or implied. See the License for the specific language governing permissions and limitations under
// the License.

//! A high-performance simulator and analyzer for stabilizer circuits with
//! noise: Clifford gates, Pauli channels, measurements, resets, detector and
//! observable annotations, and repeat blocks.
//!
//! The crate answers three questions about such circuits:
//! - what a noiseless deterministic execution measures (reference sample),
//! - what many noisy shots measure (measurement / detection sampling),
//! - which independent error mechanisms flip which detectors (the detector
//!   error model a decoder consumes).

pub mod prelude;

pub use tangle_circuit::{Circuit, CircuitError, DetectorsAndObservables, GateId, GateTarget};
pub use tangle_core::{seeded_rng, BitTable, BitVec, SimRng};
pub use tangle_dem::{
    circuit_to_detector_error_model, AnalyzerError, DetectorErrorModel, ErrorAnalysisOptions,
};
pub use tangle_qsim::{
    detector_samples_out, reference_sample, run_repl, sample_measurements_out, FrameSimulator,
    PauliString, SampleFormat, Tableau, TableauSimulator,
};
