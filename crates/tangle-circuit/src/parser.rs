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

use crate::circuit::{validate_shape, Circuit, Operation};
use crate::error::CircuitError;
use crate::gate_target::GateTarget;
use crate::gates::{ArgCount, GateFlags, GateId};
use tangle_core::Span;

#[derive(Copy, Clone, PartialEq, Eq)]
enum ReadCondition {
    UntilEndOfFile,
    UntilEndOfBlock,
}

/// Single-pass character reader with line tracking.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    line: usize,
}

impl<'a> Reader<'a> {
    fn new(text: &'a str) -> Self {
        Reader {
            bytes: text.as_bytes(),
            pos: 0,
            line: 1,
        }
    }

    #[inline]
    fn cur(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    #[inline]
    fn advance(&mut self) {
        if let Some(b'\n') = self.cur() {
            self.line += 1;
        }
        if self.pos < self.bytes.len() {
            self.pos += 1;
        }
    }

    fn err(&self, message: impl Into<String>) -> CircuitError {
        CircuitError::Parse {
            line: self.line,
            message: message.into(),
        }
    }
}

fn is_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn is_double_char(b: u8) -> bool {
    b.is_ascii_digit() || b == b'.' || b == b'e' || b == b'E' || b == b'+' || b == b'-'
}

fn skip_within_line_whitespace(r: &mut Reader) {
    while matches!(r.cur(), Some(b' ') | Some(b'\t')) {
        r.advance();
    }
}

fn skip_dead_space_between_commands(r: &mut Reader) {
    loop {
        while matches!(r.cur(), Some(b) if b.is_ascii_whitespace()) {
            r.advance();
        }
        match r.cur() {
            Some(b'#') => {
                while !matches!(r.cur(), None | Some(b'\n')) {
                    r.advance();
                }
            }
            _ => return,
        }
    }
}

/// Skips to the next target on the line. Returns false once the line (or the
/// enclosing block header) ends.
fn read_until_next_line_arg(r: &mut Reader) -> Result<bool, CircuitError> {
    match r.cur() {
        Some(b' ') | Some(b'#') | Some(b'\t') | Some(b'\n') | Some(b'{') | None => {}
        _ => return Err(r.err("Gate targets must be separated by spacing.")),
    }
    skip_within_line_whitespace(r);
    if r.cur() == Some(b'#') {
        while !matches!(r.cur(), None | Some(b'\n')) {
            r.advance();
        }
    }
    Ok(!matches!(r.cur(), None | Some(b'\n') | Some(b'{')))
}

fn read_name(r: &mut Reader) -> String {
    let mut name = String::new();
    while let Some(b) = r.cur() {
        if !is_name_char(b) {
            break;
        }
        name.push(b as char);
        r.advance();
    }
    name
}

fn read_non_negative_double(r: &mut Reader) -> Result<f64, CircuitError> {
    let mut buf = String::new();
    while let Some(b) = r.cur() {
        if !is_double_char(b) || buf.len() >= 63 {
            break;
        }
        buf.push(b as char);
        r.advance();
    }
    match buf.parse::<f64>() {
        Ok(v) if v >= 0.0 => Ok(v),
        _ => Err(r.err(format!("Not a non-negative real number: '{buf}'."))),
    }
}

fn read_uint24(r: &mut Reader) -> Result<u32, CircuitError> {
    let Some(b) = r.cur() else {
        return Err(r.err("Expected a digit."));
    };
    if !b.is_ascii_digit() {
        return Err(r.err(format!("Expected a digit but got '{}'.", b as char)));
    }
    let mut result: u32 = 0;
    while let Some(b) = r.cur() {
        if !b.is_ascii_digit() {
            break;
        }
        result = result * 10 + u32::from(b - b'0');
        if result >= 1 << 24 {
            return Err(r.err("Number too large."));
        }
        r.advance();
    }
    Ok(result)
}

fn read_uint63(r: &mut Reader) -> Result<u64, CircuitError> {
    let Some(b) = r.cur() else {
        return Err(r.err("Expected a digit."));
    };
    if !b.is_ascii_digit() {
        return Err(r.err(format!("Expected a digit but got '{}'.", b as char)));
    }
    let mut result: u64 = 0;
    while let Some(b) = r.cur() {
        if !b.is_ascii_digit() {
            break;
        }
        result = result
            .checked_mul(10)
            .and_then(|v| v.checked_add(u64::from(b - b'0')))
            .filter(|&v| v < 1 << 63)
            .ok_or_else(|| r.err("Number too large."))?;
        r.advance();
    }
    Ok(result)
}

fn read_parens_arguments(
    r: &mut Reader,
    gate: GateId,
    out: &mut Vec<f64>,
) -> Result<(), CircuitError> {
    let arity = gate.data().arg_count;
    if r.cur() != Some(b'(') {
        return match arity {
            ArgCount::Fixed(n) if n > 0 => Err(r.err(format!(
                "Expected {n} parens argument(s) for '{}'.",
                gate.name()
            ))),
            _ => Ok(()),
        };
    }
    if arity == ArgCount::Fixed(0) {
        return Err(r.err(format!(
            "Gate '{}' doesn't take parens arguments.",
            gate.name()
        )));
    }
    r.advance();
    loop {
        skip_within_line_whitespace(r);
        out.push(read_non_negative_double(r)?);
        skip_within_line_whitespace(r);
        match r.cur() {
            Some(b',') => r.advance(),
            Some(b')') => {
                r.advance();
                break;
            }
            _ => {
                return Err(r.err(format!(
                    "Missing ')' for arguments of '{}'.",
                    gate.name()
                )))
            }
        }
    }
    match arity {
        ArgCount::Fixed(n) if out.len() != n as usize => Err(r.err(format!(
            "Expected {n} parens argument(s) for '{}' but got {}.",
            gate.name(),
            out.len()
        ))),
        ArgCount::Optional if out.len() > 1 => Err(r.err(format!(
            "Gate '{}' takes at most one parens argument.",
            gate.name()
        ))),
        _ => Ok(()),
    }
}

fn read_record_target(r: &mut Reader) -> Result<GateTarget, CircuitError> {
    for expected in *b"rec[-" {
        if r.cur() != Some(expected) {
            return Err(r.err("Expected a record argument like 'rec[-1]'."));
        }
        r.advance();
    }
    let lookback = read_uint24(r)?;
    if lookback == 0 {
        return Err(r.err("Record lookback must be at least 1."));
    }
    if r.cur() != Some(b']') {
        return Err(r.err("Expected a record argument like 'rec[-1]'."));
    }
    r.advance();
    Ok(GateTarget::rec(lookback))
}

fn read_targets_into(
    r: &mut Reader,
    gate: GateId,
    circuit: &mut Circuit,
) -> Result<(), CircuitError> {
    let flags = gate.flags();
    while read_until_next_line_arg(r)? {
        let target = if flags.contains(GateFlags::IS_BLOCK) {
            // A repetition count, stored as two raw 32-bit words.
            let reps = read_uint63(r)?;
            circuit
                .target_buf
                .append_tail(GateTarget::raw((reps & 0xFFFF_FFFF) as u32));
            GateTarget::raw((reps >> 32) as u32)
        } else if flags.contains(GateFlags::ONLY_TARGETS_MEASUREMENT_RECORD) {
            read_record_target(r)?
        } else if flags.contains(GateFlags::CAN_TARGET_MEASUREMENT_RECORD) && r.cur() == Some(b'r')
        {
            read_record_target(r)?
        } else if flags.contains(GateFlags::TARGETS_PAULI_STRING) {
            let mask = match r.cur() {
                Some(b'X') | Some(b'x') => GateTarget::pauli_x,
                Some(b'Y') | Some(b'y') => GateTarget::pauli_y,
                Some(b'Z') | Some(b'z') => GateTarget::pauli_z,
                _ => {
                    return Err(
                        r.err("Expected a Pauli target (like X1, Y2, or Z3).")
                    )
                }
            };
            r.advance();
            if r.cur() == Some(b' ') {
                return Err(r.err("Unexpected space after Pauli before target qubit index."));
            }
            mask(read_uint24(r)?)
        } else if flags.contains(GateFlags::PRODUCES_RESULTS) && r.cur() == Some(b'!') {
            r.advance();
            GateTarget::inverted_qubit(read_uint24(r)?)
        } else {
            GateTarget::qubit(read_uint24(r)?)
        };
        circuit.target_buf.append_tail(target);
    }
    Ok(())
}

fn read_single_operation(circuit: &mut Circuit, r: &mut Reader) -> Result<(), CircuitError> {
    let line = r.line;
    let name = read_name(r);
    let Some(gate) = GateId::from_name(&name) else {
        return Err(CircuitError::Parse {
            line,
            message: format!("Gate not found: '{name}'."),
        });
    };
    skip_within_line_whitespace(r);
    let mut args = Vec::new();
    read_parens_arguments(r, gate, &mut args)?;
    read_targets_into(r, gate, circuit)?;

    let is_block = gate.flags().contains(GateFlags::IS_BLOCK);
    if r.cur() != Some(b'{') && is_block {
        return Err(r.err(format!("Missing '{{' at start of {} block.", gate.name())));
    }
    if r.cur() == Some(b'{') && !is_block {
        return Err(r.err(format!(
            "Unexpected '{{' after non-block command {}.",
            gate.name()
        )));
    }

    let targets = circuit.target_buf.commit_tail();
    circuit.arg_buf.extend_tail(&args);
    let args_span = circuit.arg_buf.commit_tail();

    if !is_block {
        let view = circuit.target_buf.view(targets);
        validate_shape(gate, view, circuit.arg_buf.view(args_span)).map_err(|message| {
            CircuitError::Parse { line, message }
        })?;
    }

    circuit.operations.push(Operation {
        gate,
        args: args_span,
        targets,
    });
    Ok(())
}

fn read_operations(
    circuit: &mut Circuit,
    r: &mut Reader,
    condition: ReadCondition,
) -> Result<(), CircuitError> {
    loop {
        skip_dead_space_between_commands(r);
        match r.cur() {
            None => {
                if condition == ReadCondition::UntilEndOfBlock {
                    return Err(r.err("Unterminated block. Got a '{' without an eventual '}'."));
                }
                return Ok(());
            }
            Some(b'}') => {
                if condition != ReadCondition::UntilEndOfBlock {
                    return Err(r.err("Uninitiated block. Got a '}' without a '{'."));
                }
                r.advance();
                return Ok(());
            }
            _ => {}
        }
        read_single_operation(circuit, r)?;

        let new_op = *circuit.operations.last().unwrap();
        if new_op.gate == GateId::Repeat {
            if new_op.targets.len() != 2 {
                return Err(r.err("Invalid instruction. Expected one repetition arg like `REPEAT 100 {`."));
            }
            let words = circuit.target_buf.view(new_op.targets);
            let (low, high) = (words[0], words[1]);
            if low.data == 0 && high.data == 0 {
                return Err(r.err("Repeating 0 times is not supported."));
            }
            log::debug!(
                "parsing REPEAT block with {} repetitions",
                u64::from(low.data) | (u64::from(high.data) << 32)
            );
            // Consume the '{' and recursively parse the block body.
            r.advance();
            let block_id = circuit.blocks.len() as u32;
            circuit.blocks.push(Circuit::new());
            let mut block = std::mem::take(circuit.blocks.last_mut().unwrap());
            read_operations(&mut block, r, ReadCondition::UntilEndOfBlock)?;
            *circuit.blocks.last_mut().unwrap() = block;

            // Rewrite the target data to reference the parsed block.
            circuit.target_buf.append_tail(GateTarget::raw(block_id));
            circuit.target_buf.append_tail(low);
            circuit.target_buf.append_tail(high);
            let span: Span = circuit.target_buf.commit_tail();
            circuit.operations.last_mut().unwrap().targets = span;
        }

        circuit.fuse_tail();
    }
}

impl Circuit {
    /// Grows the circuit by parsing more instruction text.
    ///
    /// Adjacent compatible operations are fused automatically.
    ///
    /// # Errors
    /// Returns the first parse or validation problem, tagged with its line.
    pub fn append_from_text(&mut self, text: &str) -> Result<(), CircuitError> {
        let mut reader = Reader::new(text);
        read_operations(self, &mut reader, ReadCondition::UntilEndOfFile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_circuit() {
        let c = Circuit::from_text("H 0\nCX 0 1\nM 0 1\n").unwrap();
        assert_eq!(c.operations.len(), 3);
        assert_eq!(c.operations[0].gate, GateId::H);
        assert_eq!(c.operations[1].gate, GateId::CX);
        assert_eq!(c.operations[2].gate, GateId::MZ);
        assert_eq!(c.count_qubits(), 2);
        assert_eq!(c.count_measurements(), 2);
    }

    #[test]
    fn auto_fusion_matches_multi_target_line() {
        let a = Circuit::from_text("H 0 1 2").unwrap();
        let b = Circuit::from_text("H 0\nH 1\nH 2").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.operations.len(), 1);
    }

    #[test]
    fn comments_and_blank_lines() {
        let c = Circuit::from_text("# leading comment\n\nH 0 # trailing\n\n# done\n").unwrap();
        assert_eq!(c.operations.len(), 1);
    }

    #[test]
    fn correlated_error_pauli_targets() {
        let c = Circuit::from_text("CORRELATED_ERROR(0.125) X90 Y91 Z92 X93").unwrap();
        assert_eq!(c.operations.len(), 1);
        let op = &c.operations[0];
        assert_eq!(op.gate, GateId::CorrelatedError);
        assert_eq!(c.args_of(op), &[0.125]);
        let t = c.targets_of(op);
        assert_eq!(t.len(), 4);
        assert!(t[0].has_pauli_x() && !t[0].has_pauli_z());
        assert_eq!(t[0].value(), 90);
        assert!(t[1].has_pauli_x() && t[1].has_pauli_z());
        assert_eq!(t[1].value(), 91);
        assert!(!t[2].has_pauli_x() && t[2].has_pauli_z());
        assert_eq!(t[2].value(), 92);
        assert!(t[3].has_pauli_x() && !t[3].has_pauli_z());
        assert_eq!(t[3].value(), 93);
    }

    #[test]
    fn repeat_blocks_nest() {
        let c = Circuit::from_text(
            "REPEAT 2 {\n    X 0\n    REPEAT 3 {\n        Y 1\n    }\n}\nM 0",
        )
        .unwrap();
        assert_eq!(c.operations.len(), 2);
        assert_eq!(c.blocks.len(), 1);
        assert_eq!(c.blocks[0].blocks.len(), 1);
        let (block, reps) = c.repeat_params(&c.operations[0]);
        assert_eq!((block, reps), (0, 2));
        let inner = &c.blocks[0];
        let (iblock, ireps) = inner.repeat_params(&inner.operations[1]);
        assert_eq!((iblock, ireps), (0, 3));
    }

    #[test]
    fn large_repeat_count() {
        let c = Circuit::from_text("REPEAT 12345678987654321 {\n    X 0\n}").unwrap();
        let (_, reps) = c.repeat_params(&c.operations[0]);
        assert_eq!(reps, 12_345_678_987_654_321);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(Circuit::from_text("NOT_A_GATE 0").is_err());
        assert!(Circuit::from_text("H 0 1 2 }").is_err());
        assert!(Circuit::from_text("REPEAT 0 {\nX 0\n}").is_err());
        assert!(Circuit::from_text("REPEAT 5 {\nX 0\n").is_err());
        assert!(Circuit::from_text("REPEAT 5\nX 0\n}").is_err());
        assert!(Circuit::from_text("H 0 {").is_err());
        assert!(Circuit::from_text("X_ERROR(1.5) 0").is_err());
        assert!(Circuit::from_text("X_ERROR 0").is_err());
        assert!(Circuit::from_text("H(0.1) 0").is_err());
        assert!(Circuit::from_text("CX 0 0").is_err());
        assert!(Circuit::from_text("CX 0").is_err());
        assert!(Circuit::from_text("M 16777216").is_err());
        assert!(Circuit::from_text("DETECTOR rec[0]").is_err());
        assert!(Circuit::from_text("DETECTOR 0").is_err());
        assert!(Circuit::from_text("E(0.1) 0").is_err());
        assert!(Circuit::from_text("PAULI_CHANNEL_1(0.5, 0.4, 0.3) 0").is_err());
        assert!(Circuit::from_text("OBSERVABLE_INCLUDE(1.5) rec[-1]").is_err());
    }

    #[test]
    fn inverted_measurement_targets() {
        let c = Circuit::from_text("M !0 1").unwrap();
        let t = c.targets_of(&c.operations[0]);
        assert!(t[0].is_inverted_result());
        assert!(!t[1].is_inverted_result());
        assert!(Circuit::from_text("H !0").is_err());
    }

    #[test]
    fn classical_control_targets() {
        let c = Circuit::from_text("M 0\nCX rec[-1] 1").unwrap();
        let t = c.targets_of(&c.operations[1]);
        assert!(t[0].is_measurement_record());
        assert_eq!(t[0].value(), 1);
        assert!(t[1].is_qubit());
        assert!(Circuit::from_text("M 0\nCX 1 rec[-1]").is_err());
        assert!(Circuit::from_text("M 0\nCZ 1 rec[-1]").is_ok());
    }

    #[test]
    fn round_trips_through_text() {
        let text = "H 0 1\nCX 0 2\nX_ERROR(0.125) 0 1\nM(0.25) 0 !1\nDETECTOR(1, 2) rec[-1]\nOBSERVABLE_INCLUDE(3) rec[-2]\nREPEAT 42 {\n    MR 2\n    DETECTOR rec[-1] rec[-2]\n}\nTICK\nE(0.25) X0 Z1";
        let c = Circuit::from_text(text).unwrap();
        let printed = c.to_string();
        let reparsed = Circuit::from_text(&printed).unwrap();
        assert_eq!(c, reparsed, "round trip failed:\n{printed}");
    }

    #[test]
    fn detectors_and_observables_resolution() {
        let c = Circuit::from_text("M 0 1 2\nDETECTOR rec[-1] rec[-3]\nOBSERVABLE_INCLUDE(1) rec[-2]")
            .unwrap();
        let d = crate::circuit::DetectorsAndObservables::new(&c).unwrap();
        assert_eq!(d.detectors.len(), 1);
        assert_eq!(d.detector_indices(0), &[2, 0]);
        assert_eq!(d.observables.len(), 2);
        assert!(d.observables[0].is_empty());
        assert_eq!(d.observables[1], vec![1]);

        let bad = Circuit::from_text("M 0\nDETECTOR rec[-2]").unwrap();
        assert!(crate::circuit::DetectorsAndObservables::new(&bad).is_err());
    }
}
