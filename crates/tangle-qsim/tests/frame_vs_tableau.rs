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
use tangle_circuit::{Circuit, GateFlags, GateId};
use tangle_core::SimRng;
use tangle_qsim::{FrameSimulator, PauliString, Tableau, TableauSimulator};

fn unitary_gates() -> Vec<GateId> {
    use GateId::*;
    vec![
        I, X, Y, Z, H, HXY, HYZ, CXYZ, CZYX, SqrtX, SqrtXDag, SqrtY, SqrtYDag, S, SDag, CX, CY,
        CZ, XCX, XCY, XCZ, YCX, YCY, YCZ, Swap, ISwap, ISwapDag, SqrtXX, SqrtXXDag, SqrtYY,
        SqrtYYDag, SqrtZZ, SqrtZZDag,
    ]
}

/// For every Clifford gate and every input Pauli, the frame simulator's
/// bit-parallel row update must agree with the tableau's Heisenberg image
/// (up to sign, which frames do not track).
#[test]
fn frame_updates_match_tableau_conjugation() {
    for gate in unitary_gates() {
        let two_qubit = gate.flags().contains(GateFlags::TARGETS_PAIRS);
        let n = if two_qubit { 2 } else { 1 };
        let tableau = Tableau::for_gate(gate).unwrap();
        let num_cases = 1usize << (2 * n);
        for case in 1..num_cases {
            let mut pauli = PauliString::identity(n);
            for q in 0..n {
                let x = (case >> (2 * q)) & 1 != 0;
                let z = (case >> (2 * q + 1)) & 1 != 0;
                pauli.set_pauli(q, x, z);
            }
            let expected = tableau.apply_to(&pauli);

            let mut circuit = Circuit::new();
            let targets: Vec<_> = (0..n as u32)
                .map(tangle_circuit::GateTarget::qubit)
                .collect();
            circuit.append_operation(gate, &targets, &[]).unwrap();
            let mut sim = FrameSimulator::new(n, 8, usize::MAX, SimRng::seed_from_u64(0));
            sim.set_frame(3, &pauli);
            sim.run_circuit(&circuit).unwrap();
            let got = sim.get_frame(3);

            assert_eq!(
                (got.xs.clone(), got.zs.clone()),
                (expected.xs.clone(), expected.zs.clone()),
                "gate {gate:?} on {pauli} gave {got}, tableau says {expected}"
            );
        }
    }
}

/// With all noise probabilities pinned to 0 or 1 the noise outcomes are
/// forced, so a tableau run and any frame shot XOR the reference must agree
/// exactly. This pins the sign conventions linking the two engines.
#[test]
fn forced_noise_shots_match_tableau_runs() {
    // Every measurement here is deterministic given the (forced) noise, so
    // the correspondence must hold bit for bit, not just in parity.
    let cases = [
        "X_ERROR(1) 0\nM 0",
        "Y_ERROR(1) 0\nM 0",
        "H 0\nZ_ERROR(1) 0\nH 0\nM 0",
        "X 0\nCX 0 1\nX_ERROR(1) 1\nM 0 1",
        "E(1) X0 Y1 Z2\nM 0 1 2",
        "E(1) X0\nELSE_CORRELATED_ERROR(1) X1\nM 0 1",
        "E(0) X0\nELSE_CORRELATED_ERROR(1) Y1\nM 1",
        "X_ERROR(1) 0\nMR 0\nM 0",
        "X_ERROR(1) 0\nM 0\nCX rec[-1] 1\nM 1",
        "X_ERROR(1) 0\nM 0\nCY rec[-1] 1\nM 1",
        "RX 0\nZ_ERROR(1) 0\nMRX 0\nMX 0",
    ];
    for text in cases {
        let circuit = Circuit::from_text(text).unwrap();
        let num_measurements = circuit.count_measurements() as usize;

        let reference = tangle_qsim::reference_sample(&circuit).unwrap();

        let tableau_bits =
            TableauSimulator::sample_circuit(&circuit, SimRng::seed_from_u64(99), 1).unwrap();

        let mut rng = SimRng::seed_from_u64(5);
        let flips =
            FrameSimulator::sample_flipped_measurements(&circuit, 16, &mut rng).unwrap();
        for s in 0..16 {
            for m in 0..num_measurements {
                let shot_bit = reference.get(m) ^ flips.get(m, s);
                assert_eq!(
                    shot_bit, tableau_bits[m],
                    "{text}: measurement {m} shot {s}"
                );
            }
        }
    }
}

/// Measurements and resets agree between the engines on deterministic
/// circuits in all three bases.
#[test]
fn deterministic_basis_circuits_agree() {
    let cases = [
        "RX 0\nMX 0",
        "RY 0\nMY 0",
        "R 0\nM 0",
        "RX 0\nZ_ERROR(1) 0\nMX 0",
        "RY 0\nX_ERROR(1) 0\nMY 0",
        "RY 0\nZ_ERROR(1) 0\nMY 0",
        "X 0\nMR 0\nM 0",
        "H 0\nS 0\nMY 0",
    ];
    for text in cases {
        let circuit = Circuit::from_text(text).unwrap();
        let num_measurements = circuit.count_measurements() as usize;
        let reference = tangle_qsim::reference_sample(&circuit).unwrap();
        let tableau_bits =
            TableauSimulator::sample_circuit(&circuit, SimRng::seed_from_u64(7), 1).unwrap();
        let mut rng = SimRng::seed_from_u64(8);
        let flips = FrameSimulator::sample_flipped_measurements(&circuit, 8, &mut rng).unwrap();
        for m in 0..num_measurements {
            for s in 0..8 {
                assert_eq!(
                    reference.get(m) ^ flips.get(m, s),
                    tableau_bits[m],
                    "{text}: m={m} s={s}"
                );
            }
        }
    }
}

/// Random Clifford round trip: applying a random tableau via scatter
/// composition then its inverse leaves the identity behind.
#[test]
fn random_tableau_prepend_inverse_is_identity() {
    let mut rng = SimRng::seed_from_u64(21);
    for n in [1, 2, 3, 6] {
        let t = Tableau::random(n, &mut rng);
        let mut composed = t.clone();
        let inv = t.inverse(false);
        let qubits: Vec<usize> = (0..n).collect();
        composed.inplace_scatter_append(&inv, &qubits);
        assert_eq!(composed, Tableau::identity(n), "n={n}");
    }
}
