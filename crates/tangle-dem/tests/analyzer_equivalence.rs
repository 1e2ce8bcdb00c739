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

use tangle_circuit::Circuit;
use tangle_dem::{
    circuit_to_detector_error_model, DemInstructionType, DetectorErrorModel, ErrorAnalysisOptions,
};

fn analyze(text: &str, options: &ErrorAnalysisOptions) -> DetectorErrorModel {
    circuit_to_detector_error_model(&Circuit::from_text(text).unwrap(), options).unwrap()
}

/// Expands repeat blocks and shifts into flat (probability, symptoms) rows.
fn flatten(model: &DetectorErrorModel) -> Vec<(u64, Vec<String>)> {
    fn walk(model: &DetectorErrorModel, base: &mut u64, out: &mut Vec<(u64, Vec<String>)>) {
        for inst in &model.instructions {
            match inst.kind {
                DemInstructionType::ShiftDetectors => {
                    *base += model.targets_of(inst)[0].data;
                }
                DemInstructionType::Error | DemInstructionType::ReducibleError => {
                    let p = (model.args_of(inst)[0] * 1e12).round() as u64;
                    let ids = model
                        .targets_of(inst)
                        .iter()
                        .map(|t| {
                            if t.is_separator() {
                                "^".to_string()
                            } else if t.is_observable_id() {
                                format!("L{}", t.raw_id())
                            } else {
                                format!("D{}", t.raw_id() + *base)
                            }
                        })
                        .collect();
                    out.push((p, ids));
                }
                DemInstructionType::RepeatBlock => {
                    let (reps, block) = model.repeat_params(inst);
                    for _ in 0..reps {
                        walk(&model.blocks[block], base, out);
                    }
                }
                DemInstructionType::Detector | DemInstructionType::LogicalObservable => {}
            }
        }
    }
    let mut out = Vec::new();
    let mut base = 0;
    walk(model, &mut base, &mut out);
    out.sort();
    out
}

#[test]
fn repeat_block_equals_manual_unrolling() {
    let body = "X_ERROR(0.125) 0\nDEPOLARIZE1(0.1) 1\nCX 0 1\nMR 1\nDETECTOR rec[-1] rec[-2]\n";
    for reps in [2u64, 3, 7] {
        let looped = format!("MR 1\nREPEAT {reps} {{\n{body}}}\nM 0\nOBSERVABLE_INCLUDE(0) rec[-1]");
        let unrolled = format!(
            "MR 1\n{}M 0\nOBSERVABLE_INCLUDE(0) rec[-1]",
            body.repeat(reps as usize)
        );
        let a = analyze(&looped, &ErrorAnalysisOptions::default());
        let b = analyze(&unrolled, &ErrorAnalysisOptions::default());
        assert_eq!(flatten(&a), flatten(&b), "reps = {reps}");
    }
}

#[test]
fn folded_loops_match_unfolded() {
    let text = "MR 1\nREPEAT 500 {\n    X_ERROR(0.25) 0\n    CX 0 1\n    MR 1\n    DETECTOR rec[-2] rec[-1]\n}\nM 0\nOBSERVABLE_INCLUDE(9) rec[-1]";
    let folded = analyze(
        text,
        &ErrorAnalysisOptions {
            fold_loops: true,
            ..Default::default()
        },
    );
    let unfolded = analyze(text, &ErrorAnalysisOptions::default());
    assert_eq!(flatten(&folded), flatten(&unfolded));
    assert!(folded.to_string().contains("repeat"), "{folded}");
}

#[test]
fn analyzer_output_text_round_trips() {
    let text = "MR 1\nREPEAT 60 {\n    X_ERROR(0.25) 0\n    DEPOLARIZE1(0.2) 1\n    CX 0 1\n    MR 1\n    DETECTOR(0, 1) rec[-2] rec[-1]\n}\nM 0\nOBSERVABLE_INCLUDE(3) rec[-1]";
    let model = analyze(
        text,
        &ErrorAnalysisOptions {
            fold_loops: true,
            ..Default::default()
        },
    );
    let printed = model.to_string();
    let reparsed = DetectorErrorModel::from_text(&printed).unwrap();
    assert!(model.approx_equals(&reparsed, 1e-9), "{printed}");
}

#[test]
fn graphlike_decomposition_emits_separated_components() {
    // Three rounds of Z and X parity checks on a Bell pair, with a two-qubit
    // depolarizing error straddling a data qubit and a check ancilla in the
    // middle round. The XZ-type cases flip three detectors and must split
    // into graphlike pieces.
    let round = "CX 0 2\nCX 1 2\nMR 2\nH 3\nCX 3 0\nCX 3 1\nH 3\nMR 3\n";
    let noisy_round = "CX 0 2\nCX 1 2\nDEPOLARIZE2(0.1) 0 2\nMR 2\nH 3\nCX 3 0\nCX 3 1\nH 3\nMR 3\n";
    let text = format!(
        "R 0 1 2 3\nH 0\nCX 0 1\n{round}{noisy_round}{round}\
         DETECTOR rec[-4] rec[-6]\nDETECTOR rec[-2] rec[-4]\n\
         DETECTOR rec[-3] rec[-5]\nDETECTOR rec[-1] rec[-3]"
    );
    let model = analyze(
        &text,
        &ErrorAnalysisOptions {
            decompose_errors: true,
            ..Default::default()
        },
    );
    let printed = model.to_string();
    let has_reducible = model
        .instructions
        .iter()
        .any(|i| i.kind == DemInstructionType::ReducibleError);
    assert!(has_reducible, "expected reducible errors in:\n{printed}");
    // Components between separators stay sorted and duplicate-free.
    for inst in &model.instructions {
        if inst.kind == DemInstructionType::Error || inst.kind == DemInstructionType::ReducibleError
        {
            for component in model
                .targets_of(inst)
                .split(|t| t.is_separator())
            {
                for pair in component.windows(2) {
                    assert!(pair[0] < pair[1], "unsorted component in {printed}");
                }
            }
        }
    }
}

#[test]
fn sorted_unique_error_targets() {
    let model = analyze(
        "DEPOLARIZE1(0.1) 0\nCX 0 1\nM 0 1\nDETECTOR rec[-1]\nDETECTOR rec[-2]\nOBSERVABLE_INCLUDE(1) rec[-1]",
        &ErrorAnalysisOptions::default(),
    );
    for inst in &model.instructions {
        if inst.kind == DemInstructionType::Error {
            let targets = model.targets_of(inst);
            for pair in targets.windows(2) {
                assert!(pair[0] < pair[1], "{model}");
            }
        }
    }
}

#[test]
fn shift_coords_pass_through() {
    let model = analyze(
        "SHIFT_COORDS(0, 1)\nX_ERROR(0.25) 0\nM 0\nDETECTOR(2, 3) rec[-1]",
        &ErrorAnalysisOptions::default(),
    );
    let printed = model.to_string();
    assert!(printed.contains("shift_detectors(0, 1) 0"), "{printed}");
    assert!(printed.contains("detector(2, 3) D0"), "{printed}");
    assert!(printed.contains("error(0.25) D0"), "{printed}");
}
