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
use std::io::{BufRead, Write};

use tangle_circuit::{Circuit, CircuitError, GateFlags, GateId};
use tangle_core::{seeded_rng, BitVec};

use crate::frame_sim::FrameSimulator;
use crate::result_writer::{BatchResultWriter, ResultWriter, SampleFormat};
use crate::tableau_sim::TableauSimulator;

/// The deterministic noiseless measurement outcomes of a circuit: noise
/// channels are skipped and every random collapse is biased toward 0.
///
/// # Errors
/// Fails on invalid record lookbacks.
pub fn reference_sample(circuit: &Circuit) -> Result<BitVec, CircuitError> {
    let mut sim = TableauSimulator::new(circuit.count_qubits(), seeded_rng(Some(0)), 1);
    sim.suppress_noise = true;
    sim.run_circuit(circuit)?;
    let bits = &sim.measurement_record.storage;
    let mut result = BitVec::zeros(bits.len());
    for (k, &b) in bits.iter().enumerate() {
        if b {
            result.set(k, true);
        }
    }
    Ok(result)
}

fn run_streaming(
    sim: &mut FrameSimulator,
    circuit: &Circuit,
    writer: &mut BatchResultWriter<'_>,
    reference: &BitVec,
) -> Result<(), Box<dyn Error>> {
    for op in &circuit.operations {
        if op.gate == GateId::Repeat {
            let (block, reps) = circuit.repeat_params(op);
            for _ in 0..reps {
                run_streaming(sim, &circuit.blocks[block], writer, reference)?;
            }
        } else {
            sim.apply_op(circuit, op)?;
            if op.gate.flags().contains(GateFlags::PRODUCES_RESULTS) {
                sim.m_record
                    .intermediate_write_unwritten_results_to(writer, reference)?;
            }
        }
    }
    Ok(())
}

fn stream_one_block(
    sim: &mut FrameSimulator,
    circuit: &Circuit,
    reference: &BitVec,
    out: &mut dyn Write,
    format: SampleFormat,
) -> Result<(), Box<dyn Error>> {
    let mut writer = BatchResultWriter::new(out, sim.batch_size, format)?;
    sim.reset_all();
    run_streaming(sim, circuit, &mut writer, reference)?;
    sim.m_record
        .final_write_unwritten_results_to(&mut writer, reference)?;
    writer.write_end()?;
    Ok(())
}

/// Samples noisy measurement shots and streams them to `out`.
///
/// Shots run in blocks of 1024 so deep circuits stay within a bounded
/// memory footprint; the record drains fully-committed prefixes as it goes.
/// The same seed, shot count and format always produce identical output.
///
/// # Errors
/// Fails on circuit validation problems or I/O failures.
pub fn sample_measurements_out(
    circuit: &Circuit,
    num_shots: usize,
    format: SampleFormat,
    seed: Option<u64>,
    skip_reference_sample: bool,
    out: &mut dyn Write,
) -> Result<(), Box<dyn Error>> {
    const GOOD_BLOCK_SIZE: usize = 1024;
    let mut rng = seeded_rng(seed);
    log::debug!("sampling {num_shots} shots in blocks of {GOOD_BLOCK_SIZE}");
    let num_measurements = circuit.count_measurements() as usize;
    let reference = if skip_reference_sample {
        BitVec::zeros(num_measurements)
    } else {
        reference_sample(circuit)?
    };
    let max_lookback = circuit.max_lookback();
    let num_qubits = circuit.count_qubits();

    let mut remaining = num_shots;
    if remaining >= GOOD_BLOCK_SIZE {
        let mut sim = FrameSimulator::new(num_qubits, GOOD_BLOCK_SIZE, max_lookback, rng.clone());
        while remaining >= GOOD_BLOCK_SIZE {
            stream_one_block(&mut sim, circuit, &reference, out, format)?;
            remaining -= GOOD_BLOCK_SIZE;
        }
        rng = sim.rng.clone();
    }
    if remaining > 0 {
        let mut sim = FrameSimulator::new(num_qubits, remaining, max_lookback, rng);
        stream_one_block(&mut sim, circuit, &reference, out, format)?;
    }
    Ok(())
}

/// Interactive sampling: parses instructions as they arrive and emits each
/// measurement result as soon as it is computed. Only the `01` format makes
/// sense here, so that is what is produced.
///
/// # Errors
/// Fails on parse errors, invalid lookbacks, and I/O failures.
pub fn run_repl<R: BufRead, W: Write>(input: R, mut out: W) -> Result<(), Box<dyn Error>> {
    let mut sim = TableauSimulator::new(1, seeded_rng(None), 0);
    let mut pending = String::new();
    let mut depth: i64 = 0;
    for line in input.lines() {
        let line = line?;
        depth += line.matches('{').count() as i64;
        depth -= line.matches('}').count() as i64;
        pending.push_str(&line);
        pending.push('\n');
        if depth > 0 {
            continue;
        }
        let fragment = Circuit::from_text(&pending)?;
        pending.clear();
        let num_qubits = fragment.count_qubits();
        if num_qubits > 0 {
            sim.ensure_large_enough_for_qubit(num_qubits - 1);
        }
        let before = sim.measurement_record.len();
        fragment.try_for_each_flat_op(&mut |c, op| sim.apply_op(c, op))?;
        if sim.measurement_record.len() > before {
            let mut writer = ResultWriter::new(SampleFormat::F01, &mut out)?;
            sim.measurement_record
                .write_unwritten_results_to(&mut writer)?;
            writer.write_end()?;
            out.flush()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_sample_ignores_noise() {
        let circuit = Circuit::from_text("X 0\nX_ERROR(1) 1\nM 0 1\nM(1) 0").unwrap();
        let reference = reference_sample(&circuit).unwrap();
        assert!(reference.get(0));
        assert!(!reference.get(1));
        assert!(reference.get(2));
    }

    #[test]
    fn ghz_shots_are_all_zero_or_all_one() {
        let circuit = Circuit::from_text("H 0\nCX 0 1\nCX 0 2\nM 0 1 2").unwrap();
        let mut out = Vec::new();
        sample_measurements_out(&circuit, 10, SampleFormat::F01, Some(5), false, &mut out)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        for line in text.lines() {
            assert!(line == "000" || line == "111", "{line}");
        }
        assert_eq!(text.lines().count(), 10);
    }

    #[test]
    fn deterministic_given_seed() {
        let circuit =
            Circuit::from_text("H 0\nCX 0 1\nDEPOLARIZE1(0.2) 0 1\nM 0 1\nX_ERROR(0.1) 0\nM 0")
                .unwrap();
        let run = |seed| {
            let mut out = Vec::new();
            sample_measurements_out(&circuit, 30, SampleFormat::F01, Some(seed), false, &mut out)
                .unwrap();
            out
        };
        assert_eq!(run(4), run(4));
        assert_ne!(run(4), run(5));
    }

    #[test]
    fn inverted_measurements_show_in_output() {
        let circuit = Circuit::from_text("M !0 0").unwrap();
        let mut out = Vec::new();
        sample_measurements_out(&circuit, 3, SampleFormat::F01, Some(0), false, &mut out)
            .unwrap();
        assert_eq!(out, b"10\n10\n10\n");
    }

    #[test]
    fn ptb64_layout_is_bit_position_major() {
        let circuit = Circuit::from_text("X 0\nM 0\nM 1\nM 2\nM 3").unwrap();
        let mut out = Vec::new();
        sample_measurements_out(&circuit, 128, SampleFormat::Ptb64, Some(0), false, &mut out)
            .unwrap();
        assert_eq!(out.len(), 4 * 16);
        assert_eq!(&out[..16], &[0xFF; 16]);
        assert!(out[16..].iter().all(|&b| b == 0));
    }

    #[test]
    fn skip_reference_sample_reports_raw_flips() {
        let circuit = Circuit::from_text("X 0\nM 0").unwrap();
        let mut out = Vec::new();
        sample_measurements_out(&circuit, 2, SampleFormat::F01, Some(0), true, &mut out).unwrap();
        // The X is absorbed by the (skipped) reference, so raw flips are 0.
        assert_eq!(out, b"0\n0\n");
    }

    #[test]
    fn repl_streams_measurements_line_by_line() {
        let input = b"X 0\nM 0\nM 1\nREPEAT 2 {\n M 0\n}\n" as &[u8];
        let mut out = Vec::new();
        run_repl(input, &mut out).unwrap();
        assert_eq!(out, b"1\n0\n11\n");
    }
}
