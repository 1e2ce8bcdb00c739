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

use rand::SeedableRng;
use tangle_circuit::{Circuit, DetectorsAndObservables};
use tangle_core::SimRng;
use tangle_qsim::{
    detector_samples, detector_samples_out, reference_sample, sample_measurements_out,
    SampleFormat,
};

#[test]
fn ghz_reference_and_shots() {
    let circuit = Circuit::from_text("H 0\nCX 0 1\nCX 0 2\nM 0 1 2").unwrap();
    let reference = reference_sample(&circuit).unwrap();
    assert_eq!(
        (reference.get(0), reference.get(1), reference.get(2)),
        (false, false, false)
    );
    for seed in 0..4 {
        let mut out = Vec::new();
        sample_measurements_out(&circuit, 10, SampleFormat::F01, Some(seed), false, &mut out)
            .unwrap();
        for line in String::from_utf8(out).unwrap().lines() {
            assert!(line == "000" || line == "111", "{line}");
        }
    }
}

#[test]
fn certain_bit_flip_detection_shots() {
    let circuit = Circuit::from_text("X_ERROR(1) 0\nM 0\nDETECTOR rec[-1]").unwrap();
    for seed in [0, 1, 17] {
        let mut out = Vec::new();
        let mut rng = SimRng::seed_from_u64(seed);
        detector_samples_out(
            &circuit,
            5,
            false,
            false,
            &mut out,
            SampleFormat::F01,
            &mut rng,
        )
        .unwrap();
        assert_eq!(out, b"1\n1\n1\n1\n1\n");
    }
}

/// A distance-3 repetition-code memory experiment, 10 rounds, no noise.
/// Data qubits 0/2/4, measure qubits 1/3.
fn rep_code_circuit(rounds: u64) -> Circuit {
    let mut text = String::new();
    text.push_str("R 0 1 2 3 4\n");
    text.push_str("CX 0 1 2 3\nCX 2 1 4 3\nMR 1 3\n");
    text.push_str("DETECTOR rec[-2]\nDETECTOR rec[-1]\n");
    text.push_str(&format!("REPEAT {} {{\n", rounds - 1));
    text.push_str("    CX 0 1 2 3\n    CX 2 1 4 3\n    MR 1 3\n");
    text.push_str("    DETECTOR rec[-2] rec[-4]\n    DETECTOR rec[-1] rec[-3]\n");
    text.push_str("}\n");
    text.push_str("M 0 2 4\n");
    text.push_str("DETECTOR rec[-2] rec[-3] rec[-5]\n");
    text.push_str("DETECTOR rec[-1] rec[-2] rec[-4]\n");
    text.push_str("OBSERVABLE_INCLUDE(0) rec[-1]\n");
    Circuit::from_text(&text).unwrap()
}

#[test]
fn noiseless_repetition_code_has_silent_detectors() {
    let circuit = rep_code_circuit(10);
    let dets = DetectorsAndObservables::new(&circuit).unwrap();
    assert_eq!(dets.detectors.len() as u64, circuit.count_detectors());
    let mut rng = SimRng::seed_from_u64(11);
    let table = detector_samples(&circuit, &dets, 256, false, true, &mut rng).unwrap();
    let num_rows = dets.detectors.len() + dets.observables.len();
    for r in 0..num_rows {
        assert!(
            tangle_core::bits::word::is_zero_slice(table.row(r)),
            "row {r} fired"
        );
    }
}

#[test]
fn noisy_repetition_code_detection_parity() {
    // With bit-flip noise on the data qubits between rounds, each detector
    // equals the XOR of the measurements it references, shot by shot.
    let mut text = String::new();
    text.push_str("R 0 1 2 3 4\n");
    for _ in 0..4 {
        text.push_str("X_ERROR(0.2) 0 2 4\n");
        text.push_str("CX 0 1 2 3\nCX 2 1 4 3\nMR 1 3\n");
    }
    text.push_str("DETECTOR rec[-1] rec[-3]\nDETECTOR rec[-2] rec[-4]\n");
    let circuit = Circuit::from_text(&text).unwrap();
    let dets = DetectorsAndObservables::new(&circuit).unwrap();

    let mut rng = SimRng::seed_from_u64(3);
    let flips = tangle_qsim::FrameSimulator::sample_flipped_measurements(
        &circuit,
        128,
        &mut rng.clone(),
    )
    .unwrap();
    let table = detector_samples(&circuit, &dets, 128, false, false, &mut rng).unwrap();
    for (d, indices) in (0..dets.detectors.len()).map(|k| (k, dets.detector_indices(k))) {
        for s in 0..128 {
            let mut expected = false;
            for &m in indices {
                expected ^= flips.get(m as usize, s);
            }
            assert_eq!(table.get(d, s), expected, "detector {d} shot {s}");
        }
    }
}

#[test]
fn b8_and_hits_formats_round_trip_against_01() {
    let circuit =
        Circuit::from_text("X 0\nX_ERROR(0.5) 1\nM 0 1 2 3 4 5 6 7 8").unwrap();
    let mut out01 = Vec::new();
    sample_measurements_out(&circuit, 7, SampleFormat::F01, Some(9), false, &mut out01).unwrap();
    let mut out_b8 = Vec::new();
    sample_measurements_out(&circuit, 7, SampleFormat::B8, Some(9), false, &mut out_b8).unwrap();
    let mut out_hits = Vec::new();
    sample_measurements_out(&circuit, 7, SampleFormat::Hits, Some(9), false, &mut out_hits)
        .unwrap();

    let lines: Vec<&str> = std::str::from_utf8(&out01).unwrap().lines().collect();
    assert_eq!(lines.len(), 7);
    // 9 measurements -> 2 bytes per shot in b8.
    assert_eq!(out_b8.len(), 7 * 2);
    let hit_lines: Vec<&str> = std::str::from_utf8(&out_hits).unwrap().lines().collect();
    for (k, line) in lines.iter().enumerate() {
        let mut expected_bytes = [0u8; 2];
        let mut expected_hits = Vec::new();
        for (m, c) in line.bytes().enumerate() {
            if c == b'1' {
                expected_bytes[m / 8] |= 1 << (m % 8);
                expected_hits.push(m.to_string());
            }
        }
        assert_eq!(&out_b8[k * 2..k * 2 + 2], &expected_bytes, "shot {k}");
        assert_eq!(hit_lines[k], expected_hits.join(","), "shot {k}");
    }
}

#[test]
fn streaming_matches_single_block() {
    // More than one 1024-shot block, deep enough to trigger record drains.
    let mut text = String::new();
    text.push_str("X 0\n");
    text.push_str("REPEAT 1100 {\n    X_ERROR(0.01) 0\n    M 0\n}\n");
    let circuit = Circuit::from_text(&text).unwrap();
    let mut a = Vec::new();
    sample_measurements_out(&circuit, 3, SampleFormat::B8, Some(1), false, &mut a).unwrap();
    let mut b = Vec::new();
    sample_measurements_out(&circuit, 3, SampleFormat::B8, Some(1), false, &mut b).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.len(), 3 * 1100usize.div_ceil(8));
}
