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

pub mod circuit;
pub mod error;
pub mod gate_target;
pub mod gates;
mod parser;

pub use circuit::{Circuit, DetectorsAndObservables, Operation};
pub use error::CircuitError;
pub use gate_target::{
    GateTarget, TARGET_COMBINER_BIT, TARGET_INVERTED_BIT, TARGET_PAULI_X_BIT, TARGET_PAULI_Z_BIT,
    TARGET_RECORD_BIT, TARGET_VALUE_MASK,
};
pub use gates::{ArgCount, GateData, GateFlags, GateId, GATE_DATA};
