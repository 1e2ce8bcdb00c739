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

use tangle_core::{MonoBuffer, Span};

const OBSERVABLE_BIT: u64 = 1 << 63;
const SEPARATOR_SYGIL: u64 = u64::MAX;

/// One symptom in a detector error model: a relative detector id, a logical
/// observable id, or the `^` separator between graphlike components.
///
/// Detector ids sort before observable ids, which sort before the
/// separator, so a sorted target set lists detectors first.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DemTarget {
    pub data: u64,
}

impl DemTarget {
    #[must_use]
    pub fn relative_detector_id(id: u64) -> Self {
        debug_assert!(id < OBSERVABLE_BIT - 1);
        DemTarget { data: id }
    }

    #[must_use]
    pub fn observable_id(id: u64) -> Self {
        debug_assert!(id < 1 << 32);
        DemTarget {
            data: id | OBSERVABLE_BIT,
        }
    }

    #[must_use]
    pub fn separator() -> Self {
        DemTarget {
            data: SEPARATOR_SYGIL,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_separator(self) -> bool {
        self.data == SEPARATOR_SYGIL
    }

    #[inline]
    #[must_use]
    pub fn is_observable_id(self) -> bool {
        self.data & OBSERVABLE_BIT != 0 && !self.is_separator()
    }

    #[inline]
    #[must_use]
    pub fn is_relative_detector_id(self) -> bool {
        self.data & OBSERVABLE_BIT == 0
    }

    /// The detector or observable index, without the tag bit.
    #[inline]
    #[must_use]
    pub fn raw_id(self) -> u64 {
        self.data & !OBSERVABLE_BIT
    }

    /// Offsets detector ids, leaving observables and separators alone.
    pub fn shift_if_detector_id(&mut self, offset: i64) {
        if self.is_relative_detector_id() {
            self.data = self.data.wrapping_add_signed(offset);
        }
    }
}

impl fmt::Display for DemTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_separator() {
            write!(f, "^")
        } else if self.is_observable_id() {
            write!(f, "L{}", self.raw_id())
        } else {
            write!(f, "D{}", self.raw_id())
        }
    }
}

impl fmt::Debug for DemTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DemTarget({self})")
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum DemInstructionType {
    /// An independent error mechanism flipping its targets.
    Error,
    /// An error whose targets are split into graphlike components by `^`.
    ReducibleError,
    /// Advances the absolute detector id base (and coordinate offsets).
    ShiftDetectors,
    /// Declares a detector, optionally with coordinates.
    Detector,
    /// Declares a logical observable.
    LogicalObservable,
    /// A repeated sub-model.
    RepeatBlock,
}

/// One instruction. Args and targets index the owning model's buffers.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct DemInstruction {
    pub kind: DemInstructionType,
    pub args: Span,
    pub targets: Span,
}

/// A detector error model: a probabilistic hypergraph over detector and
/// observable indices, with repeat blocks for periodic structure.
#[derive(Clone, Debug, Default)]
pub struct DetectorErrorModel {
    pub target_buf: MonoBuffer<DemTarget>,
    pub arg_buf: MonoBuffer<f64>,
    pub instructions: Vec<DemInstruction>,
    pub blocks: Vec<DetectorErrorModel>,
}

impl DetectorErrorModel {
    #[must_use]
    pub fn new() -> Self {
        DetectorErrorModel::default()
    }

    /// Parses a model from its text format.
    ///
    /// # Errors
    /// Returns a message describing the first malformed instruction.
    pub fn from_text(text: &str) -> Result<Self, String> {
        let mut model = DetectorErrorModel::new();
        model.append_from_text(text)?;
        Ok(model)
    }

    #[inline]
    #[must_use]
    pub fn targets_of(&self, inst: &DemInstruction) -> &[DemTarget] {
        self.target_buf.view(inst.targets)
    }

    #[inline]
    #[must_use]
    pub fn args_of(&self, inst: &DemInstruction) -> &[f64] {
        self.arg_buf.view(inst.args)
    }

    fn push(&mut self, kind: DemInstructionType, args: &[f64], targets: &[DemTarget]) {
        self.arg_buf.extend_tail(args);
        let args = self.arg_buf.commit_tail();
        self.target_buf.extend_tail(targets);
        let targets = self.target_buf.commit_tail();
        self.instructions.push(DemInstruction {
            kind,
            args,
            targets,
        });
    }

    /// Appends an error (or reducible error, when the targets contain
    /// separators) with the given probability.
    pub fn append_error_instruction(&mut self, probability: f64, targets: &[DemTarget]) {
        let kind = if targets.iter().any(|t| t.is_separator()) {
            DemInstructionType::ReducibleError
        } else {
            DemInstructionType::Error
        };
        self.push(kind, &[probability], targets);
    }

    pub fn append_shift_detectors_instruction(&mut self, args: &[f64], shift: u64) {
        self.push(
            DemInstructionType::ShiftDetectors,
            args,
            &[DemTarget { data: shift }],
        );
    }

    pub fn append_detector_instruction(&mut self, args: &[f64], target: DemTarget) {
        debug_assert!(target.is_relative_detector_id());
        self.push(DemInstructionType::Detector, args, &[target]);
    }

    pub fn append_logical_observable_instruction(&mut self, target: DemTarget) {
        debug_assert!(target.is_observable_id());
        self.push(DemInstructionType::LogicalObservable, &[], &[target]);
    }

    pub fn append_repeat_block(&mut self, repeat_count: u64, body: DetectorErrorModel) {
        let block_id = self.blocks.len() as u64;
        self.blocks.push(body);
        self.push(
            DemInstructionType::RepeatBlock,
            &[],
            &[
                DemTarget { data: repeat_count },
                DemTarget { data: block_id },
            ],
        );
    }

    /// Decodes a repeat block's (repetitions, block index).
    #[must_use]
    pub fn repeat_params(&self, inst: &DemInstruction) -> (u64, usize) {
        debug_assert_eq!(inst.kind, DemInstructionType::RepeatBlock);
        let t = self.targets_of(inst);
        (t[0].data, t[1].data as usize)
    }

    /// Ensures the model starts with a detector shift of at least `extra`,
    /// merging into an existing leading shift when present.
    pub fn add_detector_shift_at_start(&mut self, extra: u64) {
        if extra == 0 {
            return;
        }
        if let Some(first) = self.instructions.first().copied() {
            if first.kind == DemInstructionType::ShiftDetectors {
                let new_shift = self.targets_of(&first)[0].data + extra;
                self.target_buf.append_tail(DemTarget { data: new_shift });
                let targets = self.target_buf.commit_tail();
                self.instructions[0].targets = targets;
                return;
            }
        }
        self.target_buf.append_tail(DemTarget { data: extra });
        let targets = self.target_buf.commit_tail();
        self.instructions.insert(
            0,
            DemInstruction {
                kind: DemInstructionType::ShiftDetectors,
                args: Span::default(),
                targets,
            },
        );
    }

    /// The total detector id shift applied by the model, repeat blocks
    /// included.
    #[must_use]
    pub fn total_detector_shift(&self) -> u64 {
        let mut total = 0;
        for inst in &self.instructions {
            match inst.kind {
                DemInstructionType::ShiftDetectors => {
                    total += self.targets_of(inst)[0].data;
                }
                DemInstructionType::RepeatBlock => {
                    let (reps, block) = self.repeat_params(inst);
                    total += reps * self.blocks[block].total_detector_shift();
                }
                _ => {}
            }
        }
        total
    }

    pub fn clear(&mut self) {
        self.target_buf.clear();
        self.arg_buf.clear();
        self.instructions.clear();
        self.blocks.clear();
    }

    /// Equality within an absolute tolerance on probabilities.
    #[must_use]
    pub fn approx_equals(&self, other: &DetectorErrorModel, atol: f64) -> bool {
        if self.instructions.len() != other.instructions.len()
            || self.blocks.len() != other.blocks.len()
        {
            return false;
        }
        for (a, b) in self.instructions.iter().zip(&other.instructions) {
            if a.kind != b.kind || self.targets_of(a) != other.targets_of(b) {
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

impl PartialEq for DetectorErrorModel {
    fn eq(&self, other: &Self) -> bool {
        self.instructions.len() == other.instructions.len()
            && self.blocks == other.blocks
            && self.instructions.iter().zip(&other.instructions).all(|(a, b)| {
                a.kind == b.kind
                    && self.targets_of(a) == other.targets_of(b)
                    && self.args_of(a) == other.args_of(b)
            })
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

fn write_indented(
    f: &mut fmt::Formatter<'_>,
    model: &DetectorErrorModel,
    indent: &str,
) -> fmt::Result {
    for inst in &model.instructions {
        match inst.kind {
            DemInstructionType::RepeatBlock => {
                let (reps, block) = model.repeat_params(inst);
                writeln!(f, "{indent}repeat {reps} {{")?;
                let deeper = format!("{indent}    ");
                write_indented(f, &model.blocks[block], &deeper)?;
                writeln!(f, "{indent}}}")?;
            }
            DemInstructionType::Error | DemInstructionType::ReducibleError => {
                let name = if inst.kind == DemInstructionType::Error {
                    "error"
                } else {
                    "reducible_error"
                };
                write!(f, "{indent}{name}({})", model.args_of(inst)[0])?;
                for t in model.targets_of(inst) {
                    write!(f, " {t}")?;
                }
                writeln!(f)?;
            }
            DemInstructionType::ShiftDetectors => {
                write!(f, "{indent}shift_detectors")?;
                write_args(f, model.args_of(inst))?;
                writeln!(f, " {}", model.targets_of(inst)[0].data)?;
            }
            DemInstructionType::Detector => {
                write!(f, "{indent}detector")?;
                write_args(f, model.args_of(inst))?;
                writeln!(f, " {}", model.targets_of(inst)[0])?;
            }
            DemInstructionType::LogicalObservable => {
                writeln!(f, "{indent}logical_observable {}", model.targets_of(inst)[0])?;
            }
        }
    }
    Ok(())
}

impl fmt::Display for DetectorErrorModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_indented(f, self, "")
    }
}

// ---------------------------------------------------------------------------
// Text parsing.

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn cur(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn advance(&mut self) {
        if self.pos < self.bytes.len() {
            self.pos += 1;
        }
    }

    fn skip_line_whitespace(&mut self) {
        while matches!(self.cur(), Some(b' ') | Some(b'\t')) {
            self.advance();
        }
    }

    fn skip_dead_space(&mut self) {
        loop {
            while matches!(self.cur(), Some(b) if b.is_ascii_whitespace()) {
                self.advance();
            }
            if self.cur() == Some(b'#') {
                while !matches!(self.cur(), None | Some(b'\n')) {
                    self.advance();
                }
            } else {
                return;
            }
        }
    }

    fn read_name(&mut self) -> String {
        let mut name = String::new();
        while let Some(b) = self.cur() {
            if !(b.is_ascii_alphanumeric() || b == b'_') {
                break;
            }
            name.push(b.to_ascii_lowercase() as char);
            self.advance();
        }
        name
    }

    fn read_uint(&mut self) -> Result<u64, String> {
        let Some(b) = self.cur() else {
            return Err("Expected a digit.".to_string());
        };
        if !b.is_ascii_digit() {
            return Err(format!("Expected a digit but got '{}'.", b as char));
        }
        let mut result: u64 = 0;
        while let Some(b) = self.cur() {
            if !b.is_ascii_digit() {
                break;
            }
            result = result
                .checked_mul(10)
                .and_then(|v| v.checked_add(u64::from(b - b'0')))
                .filter(|&v| v < 1 << 62)
                .ok_or_else(|| "Number too large.".to_string())?;
            self.advance();
        }
        Ok(result)
    }

    fn read_double(&mut self) -> Result<f64, String> {
        let mut buf = String::new();
        while let Some(b) = self.cur() {
            if !(b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-')) {
                break;
            }
            buf.push(b as char);
            self.advance();
        }
        match buf.parse::<f64>() {
            Ok(v) if v >= 0.0 => Ok(v),
            _ => Err(format!("Not a non-negative real number: '{buf}'.")),
        }
    }

    fn read_parens_args(&mut self) -> Result<Vec<f64>, String> {
        let mut args = Vec::new();
        if self.cur() != Some(b'(') {
            return Ok(args);
        }
        self.advance();
        loop {
            self.skip_line_whitespace();
            args.push(self.read_double()?);
            self.skip_line_whitespace();
            match self.cur() {
                Some(b',') => self.advance(),
                Some(b')') => {
                    self.advance();
                    return Ok(args);
                }
                _ => return Err("Missing ')' for instruction arguments.".to_string()),
            }
        }
    }

    fn at_line_end(&mut self) -> bool {
        self.skip_line_whitespace();
        if self.cur() == Some(b'#') {
            while !matches!(self.cur(), None | Some(b'\n')) {
                self.advance();
            }
        }
        matches!(self.cur(), None | Some(b'\n') | Some(b'{'))
    }
}

fn read_targets(
    r: &mut Reader<'_>,
    allow_separators: bool,
) -> Result<Vec<DemTarget>, String> {
    let mut targets = Vec::new();
    while !r.at_line_end() {
        match r.cur() {
            Some(b'D') => {
                r.advance();
                targets.push(DemTarget::relative_detector_id(r.read_uint()?));
            }
            Some(b'L') => {
                r.advance();
                targets.push(DemTarget::observable_id(r.read_uint()?));
            }
            Some(b'^') => {
                if !allow_separators {
                    return Err(
                        "`error` with `^` separators (needs `reducible_error`).".to_string()
                    );
                }
                r.advance();
                targets.push(DemTarget::separator());
            }
            _ => return Err("Expected a target like D0, L1 or '^'.".to_string()),
        }
    }
    Ok(targets)
}

fn read_block(model: &mut DetectorErrorModel, r: &mut Reader<'_>, in_block: bool) -> Result<(), String> {
    loop {
        r.skip_dead_space();
        match r.cur() {
            None => {
                if in_block {
                    return Err("Unterminated block. Got a '{' without an eventual '}'.".to_string());
                }
                return Ok(());
            }
            Some(b'}') => {
                if !in_block {
                    return Err("Uninitiated block. Got a '}' without a '{'.".to_string());
                }
                r.advance();
                return Ok(());
            }
            _ => {}
        }
        let name = r.read_name();
        r.skip_line_whitespace();
        match name.as_str() {
            "error" | "reducible_error" => {
                let args = r.read_parens_args()?;
                if args.len() != 1 {
                    return Err(format!("Expected a probability argument for '{name}'."));
                }
                if args[0] > 1.0 {
                    return Err(format!("Probability out of range for '{name}'."));
                }
                let targets = read_targets(r, name == "reducible_error")?;
                let kind = if name == "error" {
                    DemInstructionType::Error
                } else {
                    DemInstructionType::ReducibleError
                };
                model.push(kind, &args, &targets);
            }
            "shift_detectors" => {
                let args = r.read_parens_args()?;
                r.skip_line_whitespace();
                let shift = r.read_uint()?;
                model.append_shift_detectors_instruction(&args, shift);
            }
            "detector" => {
                let args = r.read_parens_args()?;
                r.skip_line_whitespace();
                if r.cur() != Some(b'D') {
                    return Err("Expected a detector target like D0.".to_string());
                }
                r.advance();
                model.append_detector_instruction(&args, DemTarget::relative_detector_id(r.read_uint()?));
            }
            "logical_observable" => {
                r.skip_line_whitespace();
                if r.cur() != Some(b'L') {
                    return Err("Expected an observable target like L0.".to_string());
                }
                r.advance();
                model.append_logical_observable_instruction(DemTarget::observable_id(r.read_uint()?));
            }
            "repeat" => {
                let reps = r.read_uint()?;
                r.skip_line_whitespace();
                if r.cur() != Some(b'{') {
                    return Err("Missing '{' at start of repeat block.".to_string());
                }
                r.advance();
                let mut body = DetectorErrorModel::new();
                read_block(&mut body, r, true)?;
                model.append_repeat_block(reps, body);
            }
            other => return Err(format!("Unrecognized instruction name: '{other}'.")),
        }
    }
}

impl DetectorErrorModel {
    /// Grows the model by parsing more instruction text.
    ///
    /// # Errors
    /// Returns a message describing the first malformed instruction.
    pub fn append_from_text(&mut self, text: &str) -> Result<(), String> {
        let mut reader = Reader {
            bytes: text.as_bytes(),
            pos: 0,
        };
        read_block(self, &mut reader, false)
    }
}
