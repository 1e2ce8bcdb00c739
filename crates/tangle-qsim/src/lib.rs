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

pub mod detection;
pub mod frame_sim;
pub mod measurement_record;
pub mod pauli_string;
pub mod result_writer;
pub mod sampling;
pub mod tableau;
pub mod tableau_sim;
mod transposed;

pub use detection::{detector_samples, detector_samples_out};
pub use frame_sim::FrameSimulator;
pub use measurement_record::{BatchMeasurementRecord, MeasurementRecord};
pub use pauli_string::{Basis, PauliRef, PauliString};
pub use result_writer::{BatchResultWriter, ResultWriter, SampleFormat};
pub use sampling::{reference_sample, run_repl, sample_measurements_out};
pub use tableau::Tableau;
pub use tableau_sim::TableauSimulator;
