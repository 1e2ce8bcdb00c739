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

use std::fmt;
use std::ops::{Add, AddAssign, Mul};

use tangle_core::{add_saturate, mul_saturate, MonoBuffer, Span};

use crate::error::CircuitError;
use crate::gate_target::{GateTarget, TARGET_INVERTED_BIT, TARGET_PAULI_X_BIT, TARGET_PAULI_Z_BIT, TARGET_RECORD_BIT, TARGET_VALUE_MASK};
use crate::gates::{ArgCount, GateFlags, GateId};

/// A gate applied to targets.
///
/// The `args` and `targets` spans index into the owning circuit's monotonic
/// buffers; an `Operation` is not self-sufficient.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Operation {
    pub gate: GateId,
    pub args: Span,
    pub targets: Span,
}

/// A description of a stabilizer computation.
///
/// Targets and parens arguments live in per-circuit monotonic buffers so
/// operations stay two words plus spans. `REPEAT` bodies are child circuits
/// in `blocks`; the repeat operation's three target words are the block
/// index and the 64-bit repetition count split into two 32-bit halves.
#[derive(Clone, Debug, Default)]
pub struct Circuit {
    pub target_buf: MonoBuffer<GateTarget>,
    pub arg_buf: MonoBuffer<f64>,
    pub operations: Vec<Operation>,
    pub blocks: Vec<Circuit>,
}

impl Circuit {
    #[must_use]
    pub fn new() -> Self {
        Circuit::default()
    }

    /// Parses a circuit from text.
    ///
    /// # Errors
    /// Returns a parse error with the offending line number for malformed
    /// text, and a validation error for structurally invalid instructions.
    pub fn from_text(text: &str) -> Result<Circuit, CircuitError> {
        let mut circuit = Circuit::new();
        circuit.append_from_text(text)?;
        Ok(circuit)
    }

    #[inline]
    #[must_use]
    pub fn targets_of(&self, op: &Operation) -> &[GateTarget] {
        self.target_buf.view(op.targets)
    }

    #[inline]
    #[must_use]
    pub fn args_of(&self, op: &Operation) -> &[f64] {
        self.arg_buf.view(op.args)
    }

    /// Decodes a `REPEAT` operation's packed (block index, repetition count).
    #[must_use]
    pub fn repeat_params(&self, op: &Operation) -> (usize, u64) {
        debug_assert_eq!(op.gate, GateId::Repeat);
        let t = self.targets_of(op);
        debug_assert_eq!(t.len(), 3);
        let low = t[1].data as u64;
        let high = t[2].data as u64;
        (t[0].data as usize, low | (high << 32))
    }

    /// Appends an operation, copying its data into this circuit's buffers,
    /// fusing with the previous operation when permitted.
    ///
    /// # Errors
    /// Returns a validation error when the targets or arguments do not fit
    /// the gate.
    pub fn append_operation(
        &mut self,
        gate: GateId,
        targets: &[GateTarget],
        args: &[f64],
    ) -> Result<(), CircuitError> {
        if gate.flags().contains(GateFlags::IS_BLOCK) {
            return Err(CircuitError::validation(
                "Can't append a REPEAT block as a plain operation.",
            ));
        }
        validate_shape(gate, targets, args).map_err(CircuitError::validation)?;
        self.arg_buf.extend_tail(args);
        let args_span = self.arg_buf.commit_tail();
        self.target_buf.extend_tail(targets);
        let targets_span = self.target_buf.commit_tail();
        self.operations.push(Operation {
            gate,
            args: args_span,
            targets: targets_span,
        });
        self.fuse_tail();
        Ok(())
    }

    /// Appends a `REPEAT` block with the given body.
    ///
    /// # Errors
    /// Rejects zero repetitions.
    pub fn append_repeat_block(
        &mut self,
        repetitions: u64,
        body: Circuit,
    ) -> Result<(), CircuitError> {
        if repetitions == 0 {
            return Err(CircuitError::validation("Repeating 0 times is not supported."));
        }
        let block_id = self.blocks.len() as u32;
        self.blocks.push(body);
        self.target_buf.append_tail(GateTarget::raw(block_id));
        self.target_buf
            .append_tail(GateTarget::raw((repetitions & 0xFFFF_FFFF) as u32));
        self.target_buf
            .append_tail(GateTarget::raw((repetitions >> 32) as u32));
        let targets = self.target_buf.commit_tail();
        self.operations.push(Operation {
            gate: GateId::Repeat,
            args: Span::default(),
            targets,
        });
        Ok(())
    }

    /// Fuses the last operation into its predecessor while they are the same
    /// gate with the same arguments and fusion is allowed.
    pub(crate) fn fuse_tail(&mut self) {
        while self.operations.len() > 1 {
            let b = self.operations[self.operations.len() - 1];
            let a = self.operations[self.operations.len() - 2];
            if !self.can_fuse(&a, &b) {
                break;
            }
            let merged = if a.targets.end() == b.targets.offset as usize {
                Span {
                    offset: a.targets.offset,
                    len: a.targets.len + b.targets.len,
                }
            } else {
                // Not contiguous; rebuild both target runs back to back.
                self.target_buf.append_tail_copy(a.targets);
                self.target_buf.append_tail_copy(b.targets);
                self.target_buf.commit_tail()
            };
            let n = self.operations.len();
            self.operations[n - 2].targets = merged;
            self.operations.pop();
        }
    }

    fn can_fuse(&self, a: &Operation, b: &Operation) -> bool {
        a.gate == b.gate
            && !a.gate.flags().contains(GateFlags::NOT_FUSABLE)
            && self.args_of(a) == self.args_of(b)
    }

    pub fn clear(&mut self) {
        self.target_buf.clear();
        self.arg_buf.clear();
        self.operations.clear();
        self.blocks.clear();
    }

    /// Visits every operation in execution order, expanding `REPEAT` blocks.
    /// The callback receives the circuit that owns the operation's buffers.
    pub fn try_for_each_flat_op<F>(&self, f: &mut F) -> Result<(), CircuitError>
    where
        F: FnMut(&Circuit, &Operation) -> Result<(), CircuitError>,
    {
        for op in &self.operations {
            if op.gate == GateId::Repeat {
                let (block, reps) = self.repeat_params(op);
                let body = &self.blocks[block];
                for _ in 0..reps {
                    body.try_for_each_flat_op(f)?;
                }
            } else {
                f(self, op)?;
            }
        }
        Ok(())
    }

    /// Infallible variant of `try_for_each_flat_op`.
    pub fn for_each_flat_op<F: FnMut(&Circuit, &Operation)>(&self, f: &mut F) {
        let result = self.try_for_each_flat_op(&mut |c, op| {
            f(c, op);
            Ok(())
        });
        debug_assert!(result.is_ok());
    }

    fn max_op_property<F: Fn(&Circuit, &Operation) -> u64>(&self, f: &F) -> u64 {
        let mut best = 0;
        for block in &self.blocks {
            best = best.max(block.max_op_property(f));
        }
        for op in &self.operations {
            if op.gate.flags().contains(GateFlags::IS_BLOCK) {
                continue;
            }
            best = best.max(f(self, op));
        }
        best
    }

    fn flat_count_ops<F: Fn(&Circuit, &Operation) -> u64>(&self, f: &F) -> u64 {
        let mut n: u64 = 0;
        for op in &self.operations {
            if op.gate == GateId::Repeat {
                let (block, reps) = self.repeat_params(op);
                let sub = self.blocks[block].flat_count_ops(f);
                n = add_saturate(n, mul_saturate(sub, reps));
            } else {
                n = add_saturate(n, f(self, op));
            }
        }
        n
    }

    /// One more than the largest qubit index mentioned anywhere.
    #[must_use]
    pub fn count_qubits(&self) -> usize {
        self.max_op_property(&|c, op| {
            let mut best = 0;
            for t in c.targets_of(op) {
                if !t.is_measurement_record() {
                    best = best.max(u64::from(t.value()) + 1);
                }
            }
            best
        }) as usize
    }

    /// Total number of recorded measurement results, saturating at `u64::MAX`.
    #[must_use]
    pub fn count_measurements(&self) -> u64 {
        self.flat_count_ops(&|c, op| {
            if op.gate.flags().contains(GateFlags::PRODUCES_RESULTS) {
                c.targets_of(op).len() as u64
            } else {
                0
            }
        })
    }

    #[must_use]
    pub fn count_detectors(&self) -> u64 {
        self.flat_count_ops(&|_, op| u64::from(op.gate == GateId::Detector))
    }

    /// One more than the largest observable index mentioned.
    #[must_use]
    pub fn num_observables(&self) -> u64 {
        self.max_op_property(&|c, op| {
            if op.gate == GateId::ObservableInclude {
                c.args_of(op)[0] as u64 + 1
            } else {
                0
            }
        })
    }

    /// The deepest measurement-record lookback used anywhere.
    #[must_use]
    pub fn max_lookback(&self) -> usize {
        self.max_op_property(&|c, op| {
            let mut best = 0;
            for t in c.targets_of(op) {
                if t.is_measurement_record() {
                    best = best.max(u64::from(t.value()));
                }
            }
            best
        }) as usize
    }

    /// Concatenation, rebasing block indices from `other`.
    pub fn concat_assign(&mut self, other: &Circuit) {
        let block_offset = self.blocks.len() as u32;
        self.blocks.extend(other.blocks.iter().cloned());
        for op in &other.operations {
            self.arg_buf.extend_tail(other.args_of(op));
            let args = self.arg_buf.commit_tail();
            self.target_buf.extend_tail(other.targets_of(op));
            let targets = self.target_buf.commit_tail();
            self.operations.push(Operation {
                gate: op.gate,
                args,
                targets,
            });
            if op.gate == GateId::Repeat {
                // Rebase the block index word against this circuit's blocks.
                let idx = self.operations.last().unwrap().targets;
                let words = self.target_buf.view(idx);
                let (block_word, low, high) =
                    (words[0].data + block_offset, words[1], words[2]);
                self.target_buf.append_tail(GateTarget::raw(block_word));
                self.target_buf.append_tail(low);
                self.target_buf.append_tail(high);
                let rebased = self.target_buf.commit_tail();
                self.operations.last_mut().unwrap().targets = rebased;
            }
        }
    }

    /// The circuit repeated `repetitions` times, as a `REPEAT` wrapper (or a
    /// rescaled one when the circuit is already a single repeat block).
    ///
    /// # Errors
    /// Fails when an existing repeat count would overflow.
    pub fn repeated(&self, repetitions: u64) -> Result<Circuit, CircuitError> {
        if repetitions == 0 {
            return Ok(Circuit::new());
        }
        if repetitions == 1 {
            return Ok(self.clone());
        }
        if self.operations.len() == 1 && self.operations[0].gate == GateId::Repeat {
            let (block, old_reps) = self.repeat_params(&self.operations[0]);
            let new_reps = old_reps.checked_mul(repetitions).ok_or_else(|| {
                CircuitError::validation("Fused repetition count is too large.")
            })?;
            let mut result = Circuit::new();
            result.append_repeat_block(new_reps, self.blocks[block].clone())?;
            return Ok(result);
        }
        let mut result = Circuit::new();
        result.append_repeat_block(repetitions, self.clone())?;
        Ok(result)
    }

    /// Equality within an absolute tolerance on parens arguments.
    #[must_use]
    pub fn approx_equals(&self, other: &Circuit, atol: f64) -> bool {
        if self.operations.len() != other.operations.len() || self.blocks.len() != other.blocks.len()
        {
            return false;
        }
        for (a, b) in self.operations.iter().zip(&other.operations) {
            if a.gate != b.gate || self.targets_of(a) != other.targets_of(b) {
                return false;
            }
            let (aa, ba) = (self.args_of(a), other.args_of(b));
            if aa.len() != ba.len() || aa.iter().zip(ba).any(|(x, y)| (x - y).abs() > atol) {
                return false;
            }
        }
        self.blocks
            .iter()
            .zip(&other.blocks)
            .all(|(a, b)| a.approx_equals(b, atol))
    }
}

impl PartialEq for Circuit {
    fn eq(&self, other: &Self) -> bool {
        self.operations.len() == other.operations.len()
            && self.blocks == other.blocks
            && self.operations.iter().zip(&other.operations).all(|(a, b)| {
                a.gate == b.gate
                    && self.targets_of(a) == other.targets_of(b)
                    && self.args_of(a) == other.args_of(b)
            })
    }
}

impl AddAssign<&Circuit> for Circuit {
    fn add_assign(&mut self, other: &Circuit) {
        self.concat_assign(other);
    }
}

impl Add<&Circuit> for &Circuit {
    type Output = Circuit;
    fn add(self, other: &Circuit) -> Circuit {
        let mut result = self.clone();
        result.concat_assign(other);
        result
    }
}

impl Mul<u64> for &Circuit {
    type Output = Circuit;
    fn mul(self, repetitions: u64) -> Circuit {
        self.repeated(repetitions)
            .expect("repetition count overflow")
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[f64]) -> fmt::Result {
    if args.is_empty() {
        return Ok(());
    }
    write!(f, "(")?;
    for (k, a) in args.iter().enumerate() {
        if k > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{a}")?;
    }
    write!(f, ")")
}

fn write_indented(f: &mut fmt::Formatter<'_>, c: &Circuit, indent: &str) -> fmt::Result {
    let mut first = true;
    for op in &c.operations {
        if first {
            first = false;
        } else {
            writeln!(f)?;
        }
        if op.gate == GateId::Repeat {
            let (block, reps) = c.repeat_params(op);
            writeln!(f, "{indent}REPEAT {reps} {{")?;
            let deeper = format!("{indent}    ");
            write_indented(f, &c.blocks[block], &deeper)?;
            write!(f, "\n{indent}}}")?;
            continue;
        }
        write!(f, "{indent}{}", op.gate.name())?;
        write_args(f, c.args_of(op))?;
        for t in c.targets_of(op) {
            write!(f, " {t}")?;
        }
    }
    Ok(())
}

impl fmt::Display for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_indented(f, self, "")
    }
}

/// Lists which measurement indices feed each detector and each logical
/// observable of a circuit.
pub struct DetectorsAndObservables {
    pub detector_data: MonoBuffer<u64>,
    pub detectors: Vec<Span>,
    pub observables: Vec<Vec<u64>>,
}

impl DetectorsAndObservables {
    /// Resolves every `rec[-k]` of every `DETECTOR` / `OBSERVABLE_INCLUDE`
    /// into an absolute measurement index.
    ///
    /// # Errors
    /// Fails when a lookback reaches before the start of the circuit.
    pub fn new(circuit: &Circuit) -> Result<Self, CircuitError> {
        let mut result = DetectorsAndObservables {
            detector_data: MonoBuffer::new(),
            detectors: Vec::new(),
            observables: Vec::new(),
        };
        let mut tick: u64 = 0;
        circuit.try_for_each_flat_op(&mut |c, op| {
            if op.gate.flags().contains(GateFlags::PRODUCES_RESULTS) {
                tick += c.targets_of(op).len() as u64;
                return Ok(());
            }
            if op.gate == GateId::Detector {
                for t in c.targets_of(op) {
                    let dt = u64::from(t.value());
                    if dt == 0 {
                        return Err(CircuitError::validation(
                            "Record lookback can't be 0 (unspecified).",
                        ));
                    }
                    if dt > tick {
                        return Err(CircuitError::validation(
                            "Referred to a measurement result before the beginning of time.",
                        ));
                    }
                    result.detector_data.append_tail(tick - dt);
                }
                let span = result.detector_data.commit_tail();
                result.detectors.push(span);
            } else if op.gate == GateId::ObservableInclude {
                let obs = c.args_of(op)[0] as usize;
                while result.observables.len() <= obs {
                    result.observables.push(Vec::new());
                }
                for t in c.targets_of(op) {
                    let dt = u64::from(t.value());
                    if dt == 0 {
                        return Err(CircuitError::validation(
                            "Record lookback can't be 0 (unspecified).",
                        ));
                    }
                    if dt > tick {
                        return Err(CircuitError::validation(
                            "Referred to a measurement result before the beginning of time.",
                        ));
                    }
                    result.observables[obs].push(tick - dt);
                }
            }
            Ok(())
        })?;
        Ok(result)
    }

    #[must_use]
    pub fn detector_indices(&self, k: usize) -> &[u64] {
        self.detector_data.view(self.detectors[k])
    }
}

/// Checks that targets and parens arguments fit the gate's declared shape.
pub(crate) fn validate_shape(
    gate: GateId,
    targets: &[GateTarget],
    args: &[f64],
) -> Result<(), String> {
    let data = gate.data();

    match data.arg_count {
        ArgCount::Fixed(n) => {
            if args.len() != n as usize {
                return Err(format!(
                    "Gate {} expects {} parens argument(s) but got {}.",
                    data.name,
                    n,
                    args.len()
                ));
            }
        }
        ArgCount::Optional => {
            if args.len() > 1 {
                return Err(format!(
                    "Gate {} takes at most one parens argument.",
                    data.name
                ));
            }
        }
        ArgCount::Variable => {}
    }

    if data.flags.contains(GateFlags::ARGS_ARE_DISJOINT_PROBABILITIES) {
        let mut total = 0.0;
        for &a in args {
            if !(0.0..=1.0).contains(&a) {
                return Err(format!(
                    "Gate {} has a probability argument outside [0, 1]: {a}.",
                    data.name
                ));
            }
            total += a;
        }
        let is_channel = matches!(gate, GateId::PauliChannel1 | GateId::PauliChannel2);
        if is_channel && total > 1.0 {
            return Err(format!(
                "Gate {} has case probabilities summing to more than 1.",
                data.name
            ));
        }
    }

    if gate == GateId::ObservableInclude {
        let obs = args[0];
        if obs < 0.0 || obs.fract() != 0.0 {
            return Err("Observable index must be a non-negative integer.".to_string());
        }
    }

    if data.flags.contains(GateFlags::TAKES_NO_TARGETS) && !targets.is_empty() {
        return Err(format!("Gate {} takes no targets.", data.name));
    }

    let mut valid_mask = TARGET_VALUE_MASK;
    if data.flags.contains(GateFlags::PRODUCES_RESULTS) {
        valid_mask |= TARGET_INVERTED_BIT;
    }
    if data.flags.contains(GateFlags::TARGETS_PAULI_STRING) {
        valid_mask |= TARGET_PAULI_X_BIT | TARGET_PAULI_Z_BIT;
    }
    if data.flags.intersects(
        GateFlags::ONLY_TARGETS_MEASUREMENT_RECORD.union(GateFlags::CAN_TARGET_MEASUREMENT_RECORD),
    ) {
        valid_mask |= TARGET_RECORD_BIT;
    }
    for t in targets {
        if t.data & !valid_mask != 0 {
            return Err(format!(
                "Target {} has flags incompatible with gate {}.",
                t, data.name
            ));
        }
    }

    if data.flags.contains(GateFlags::TARGETS_PAULI_STRING) {
        for t in targets {
            if !t.is_pauli() {
                return Err(format!(
                    "Gate {} requires Pauli targets like X1, Y2, Z3.",
                    data.name
                ));
            }
        }
    }

    if data.flags.contains(GateFlags::ONLY_TARGETS_MEASUREMENT_RECORD) {
        for t in targets {
            if !t.is_measurement_record() || t.value() == 0 {
                return Err(format!(
                    "Gate {} only takes rec[-k] targets with k >= 1.",
                    data.name
                ));
            }
        }
    }

    if data.flags.contains(GateFlags::TARGETS_PAIRS) {
        if targets.len() % 2 != 0 {
            return Err(format!(
                "Two qubit gate {} applied to an odd number of targets.",
                data.name
            ));
        }
        for pair in targets.chunks_exact(2) {
            if pair[0] == pair[1] {
                return Err(format!(
                    "Interacting a target with itself ({}) using gate {}.",
                    pair[0].value(),
                    data.name
                ));
            }
        }
        // Only CZ is symmetric enough to accept a record on either side; CX
        // and CY accept one only as the control.
        if matches!(gate, GateId::CX | GateId::CY) {
            for pair in targets.chunks_exact(2) {
                if pair[1].is_measurement_record() {
                    return Err(format!(
                        "Gate {} can't target the measurement record with its second qubit.",
                        data.name
                    ));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_fuse() {
        let mut c = Circuit::new();
        c.append_operation(GateId::H, &[GateTarget::qubit(0)], &[]).unwrap();
        c.append_operation(GateId::H, &[GateTarget::qubit(1)], &[]).unwrap();
        assert_eq!(c.operations.len(), 1);
        assert_eq!(c.targets_of(&c.operations[0]).len(), 2);

        // Different args block fusion.
        c.append_operation(GateId::XError, &[GateTarget::qubit(0)], &[0.25])
            .unwrap();
        c.append_operation(GateId::XError, &[GateTarget::qubit(1)], &[0.5])
            .unwrap();
        assert_eq!(c.operations.len(), 3);

        // Same args fuse.
        c.append_operation(GateId::XError, &[GateTarget::qubit(2)], &[0.5])
            .unwrap();
        assert_eq!(c.operations.len(), 3);
    }

    #[test]
    fn validation_rejects_bad_shapes() {
        let mut c = Circuit::new();
        assert!(c
            .append_operation(GateId::CX, &[GateTarget::qubit(0)], &[])
            .is_err());
        assert!(c
            .append_operation(
                GateId::CX,
                &[GateTarget::qubit(1), GateTarget::qubit(1)],
                &[]
            )
            .is_err());
        assert!(c
            .append_operation(GateId::XError, &[GateTarget::qubit(0)], &[1.5])
            .is_err());
        assert!(c
            .append_operation(GateId::H, &[GateTarget::rec(1)], &[])
            .is_err());
        assert!(c
            .append_operation(GateId::Tick, &[GateTarget::qubit(0)], &[])
            .is_err());
        assert!(c
            .append_operation(
                GateId::CX,
                &[GateTarget::qubit(0), GateTarget::rec(1)],
                &[]
            )
            .is_err());
        assert!(c
            .append_operation(
                GateId::CX,
                &[GateTarget::rec(1), GateTarget::qubit(0)],
                &[]
            )
            .is_ok());
    }

    #[test]
    fn counts() {
        let mut c = Circuit::new();
        c.append_operation(GateId::H, &[GateTarget::qubit(9)], &[]).unwrap();
        c.append_operation(
            GateId::MZ,
            &[GateTarget::qubit(0), GateTarget::qubit(9)],
            &[],
        )
        .unwrap();
        let mut body = Circuit::new();
        body.append_operation(GateId::MZ, &[GateTarget::qubit(3)], &[])
            .unwrap();
        c.append_repeat_block(5, body).unwrap();
        assert_eq!(c.count_qubits(), 10);
        assert_eq!(c.count_measurements(), 2 + 5);
    }

    #[test]
    fn repeat_param_packing_round_trips() {
        let mut c = Circuit::new();
        let reps = 12_345_678_987_654_321u64;
        c.append_repeat_block(reps, Circuit::new()).unwrap();
        let (block, n) = c.repeat_params(&c.operations[0]);
        assert_eq!(block, 0);
        assert_eq!(n, reps);
    }

    #[test]
    fn concat_rebases_blocks() {
        let mut a = Circuit::new();
        let mut body_a = Circuit::new();
        body_a
            .append_operation(GateId::X, &[GateTarget::qubit(0)], &[])
            .unwrap();
        a.append_repeat_block(2, body_a).unwrap();

        let mut b = Circuit::new();
        let mut body_b = Circuit::new();
        body_b
            .append_operation(GateId::Z, &[GateTarget::qubit(1)], &[])
            .unwrap();
        b.append_repeat_block(3, body_b).unwrap();

        let joined = &a + &b;
        assert_eq!(joined.blocks.len(), 2);
        let (idx0, n0) = joined.repeat_params(&joined.operations[0]);
        let (idx1, n1) = joined.repeat_params(&joined.operations[1]);
        assert_eq!((idx0, n0), (0, 2));
        assert_eq!((idx1, n1), (1, 3));
    }

    #[test]
    fn repeated_rescales_single_block() {
        let mut c = Circuit::new();
        let mut body = Circuit::new();
        body.append_operation(GateId::X, &[GateTarget::qubit(0)], &[])
            .unwrap();
        c.append_repeat_block(4, body).unwrap();
        let r = c.repeated(3).unwrap();
        assert_eq!(r.operations.len(), 1);
        let (_, n) = r.repeat_params(&r.operations[0]);
        assert_eq!(n, 12);
    }
}
