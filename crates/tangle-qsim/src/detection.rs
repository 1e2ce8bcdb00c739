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

use std::error::Error;
use std::io::Write;

use tangle_circuit::{Circuit, CircuitError, DetectorsAndObservables};
use tangle_core::bits::word;
use tangle_core::{BitTable, SimRng};

use crate::frame_sim::FrameSimulator;
use crate::result_writer::{BatchResultWriter, SampleFormat};

/// How many detection-event rows a sample table will have.
fn num_result_rows(
    dets: &DetectorsAndObservables,
    prepend_observables: bool,
    append_observables: bool,
) -> usize {
    dets.detectors.len()
        + dets.observables.len()
            * (usize::from(prepend_observables) + usize::from(append_observables))
}

fn xor_observables_into(
    dets: &DetectorsAndObservables,
    frame_samples: &BitTable,
    result: &mut BitTable,
    offset: &mut usize,
) {
    for obs in &dets.observables {
        for &m in obs {
            word::xor_into(result.row_mut(*offset), frame_samples.row(m as usize));
        }
        *offset += 1;
    }
}

/// Samples a (detectors + optional observables) x shots table of detection
/// events by XORing frame-flip rows per detector.
///
/// # Errors
/// Fails when the circuit's record lookbacks are invalid.
pub fn detector_samples(
    circuit: &Circuit,
    dets: &DetectorsAndObservables,
    num_shots: usize,
    prepend_observables: bool,
    append_observables: bool,
    rng: &mut SimRng,
) -> Result<BitTable, CircuitError> {
    let frame_samples = FrameSimulator::sample_flipped_measurements(circuit, num_shots, rng)?;
    let num_results = num_result_rows(dets, prepend_observables, append_observables);
    let mut result = BitTable::new(num_results.max(1), num_shots);

    let mut offset = 0;
    if prepend_observables {
        xor_observables_into(dets, &frame_samples, &mut result, &mut offset);
    }
    for k in 0..dets.detectors.len() {
        for &m in dets.detector_indices(k) {
            word::xor_into(result.row_mut(offset), frame_samples.row(m as usize));
        }
        offset += 1;
    }
    if append_observables {
        xor_observables_into(dets, &frame_samples, &mut result, &mut offset);
    }
    Ok(result)
}

/// Streams detection-event shots to a writer in blocks of 1024.
///
/// # Errors
/// Fails on circuit validation problems or I/O failures.
pub fn detector_samples_out(
    circuit: &Circuit,
    num_shots: usize,
    prepend_observables: bool,
    append_observables: bool,
    out: &mut dyn Write,
    format: SampleFormat,
    rng: &mut SimRng,
) -> Result<(), Box<dyn Error>> {
    const GOOD_BLOCK_SIZE: usize = 1024;
    let dets = DetectorsAndObservables::new(circuit)?;
    let num_detectors = dets.detectors.len();
    let num_observables = dets.observables.len();

    let mut remaining = num_shots;
    while remaining > 0 {
        let shots = remaining.min(GOOD_BLOCK_SIZE);
        let table = detector_samples(
            circuit,
            &dets,
            shots,
            prepend_observables,
            append_observables,
            rng,
        )?;
        let mut writer = BatchResultWriter::new(out, shots, format)?;
        let mut row = 0;
        if prepend_observables {
            writer.set_result_type('L');
            for _ in 0..num_observables {
                writer.write_bit_batch(table.row(row))?;
                row += 1;
            }
        }
        writer.set_result_type('D');
        for _ in 0..num_detectors {
            writer.write_bit_batch(table.row(row))?;
            row += 1;
        }
        if append_observables {
            writer.set_result_type('L');
            for _ in 0..num_observables {
                writer.write_bit_batch(table.row(row))?;
                row += 1;
            }
        }
        writer.write_end()?;
        remaining -= shots;
    }
    Ok(())
}
