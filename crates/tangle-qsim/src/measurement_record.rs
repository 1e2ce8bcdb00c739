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

use std::io::{self, Write};

use tangle_circuit::CircuitError;
use tangle_core::bits::word;
use tangle_core::{BitTable, BitVec};

use crate::result_writer::{BatchResultWriter, ResultWriter};

fn lookback_error(message: &str) -> CircuitError {
    CircuitError::Validation {
        message: message.to_string(),
    }
}

fn check_lookback(lookback: usize, stored: usize, max_lookback: usize) -> Result<(), CircuitError> {
    if lookback == 0 {
        return Err(lookback_error("Lookback must be non-zero."));
    }
    if lookback > stored {
        return Err(lookback_error(
            "Referred to a measurement record before the beginning of time.",
        ));
    }
    if lookback > max_lookback {
        return Err(lookback_error(
            "Referred to a measurement record past the lookback limit.",
        ));
    }
    Ok(())
}

/// The tableau simulator's measurement record: one growing bit sequence.
#[derive(Clone, Debug)]
pub struct MeasurementRecord {
    pub storage: Vec<bool>,
    max_lookback: usize,
    unwritten: usize,
}

impl Default for MeasurementRecord {
    fn default() -> Self {
        MeasurementRecord::new(usize::MAX)
    }
}

impl MeasurementRecord {
    #[must_use]
    pub fn new(max_lookback: usize) -> Self {
        MeasurementRecord {
            storage: Vec::new(),
            max_lookback,
            unwritten: 0,
        }
    }

    pub fn record_result(&mut self, result: bool) {
        self.storage.push(result);
        self.unwritten += 1;
    }

    /// The `lookback`-from-last result (1-indexed).
    ///
    /// # Errors
    /// Rejects zero lookbacks and lookbacks past the start of the record.
    pub fn lookback(&self, lookback: usize) -> Result<bool, CircuitError> {
        check_lookback(lookback, self.storage.len(), self.max_lookback)?;
        Ok(self.storage[self.storage.len() - lookback])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Streams results that have not yet been written, trimming storage back
    /// to the lookback window when it has grown far past it.
    pub fn write_unwritten_results_to<W: Write>(
        &mut self,
        writer: &mut ResultWriter<W>,
    ) -> io::Result<()> {
        let n = self.storage.len();
        for k in n - self.unwritten..n {
            writer.write_bit(self.storage[k])?;
        }
        self.unwritten = 0;
        if self.max_lookback < usize::MAX && (n >> 1) > self.max_lookback {
            self.storage.drain(..n - self.max_lookback);
        }
        Ok(())
    }
}

/// The frame simulator's measurement record: one row of bits per
/// measurement, one column per shot.
#[derive(Clone, Debug)]
pub struct BatchMeasurementRecord {
    max_lookback: usize,
    unwritten: usize,
    stored: usize,
    written: usize,
    shot_mask: BitVec,
    storage: BitTable,
    num_shots: usize,
}

impl BatchMeasurementRecord {
    #[must_use]
    pub fn new(num_shots: usize, max_lookback: usize, initial_capacity: usize) -> Self {
        let mut shot_mask = BitVec::zeros(num_shots);
        shot_mask.invert_bits();
        BatchMeasurementRecord {
            max_lookback,
            unwritten: 0,
            stored: 0,
            written: 0,
            shot_mask,
            storage: BitTable::new(initial_capacity.max(1), num_shots),
            num_shots,
        }
    }

    #[must_use]
    pub fn num_recorded(&self) -> usize {
        self.stored
    }

    #[must_use]
    pub fn num_shots(&self) -> usize {
        self.num_shots
    }

    /// Appends one measurement's flip bits (one bit per shot).
    pub fn record_result(&mut self, bits: &[u64]) {
        if self.stored >= self.storage.num_major() {
            let mut grown = BitTable::new(self.storage.num_major() * 2, self.num_shots);
            let n = self.storage.u64s().len();
            grown.u64s_mut()[..n].copy_from_slice(self.storage.u64s());
            self.storage = grown;
        }
        let row = self.storage.row_mut(self.stored);
        row.copy_from_slice(bits);
        word::and_into(row, self.shot_mask.u64s());
        self.stored += 1;
        self.unwritten += 1;
    }

    /// The row recorded `lookback` measurements ago (1-indexed).
    ///
    /// # Errors
    /// Rejects zero lookbacks and lookbacks past the start of the record.
    pub fn lookback(&self, lookback: usize) -> Result<&[u64], CircuitError> {
        check_lookback(lookback, self.stored, self.max_lookback)?;
        Ok(self.storage.row(self.stored - lookback))
    }

    /// The most recently recorded row.
    pub fn last_row_mut(&mut self) -> &mut [u64] {
        debug_assert!(self.stored > 0);
        self.storage.row_mut(self.stored - 1)
    }

    /// Streams any fully-committed 1024-measurement prefixes to the writer,
    /// then compacts storage down to the lookback window.
    pub fn intermediate_write_unwritten_results_to(
        &mut self,
        writer: &mut BatchResultWriter<'_>,
        reference_sample: &BitVec,
    ) -> io::Result<()> {
        const BLOCK: usize = 1024;
        while self.unwritten >= BLOCK {
            let start = self.stored - self.unwritten;
            let mut slice = BitTable::new(BLOCK, self.num_shots);
            for k in 0..BLOCK {
                let row = self.storage.row(start + k);
                slice.row_mut(k).copy_from_slice(row);
                let j = self.written + k;
                if j < reference_sample.len() && reference_sample.get(j) {
                    word::xor_into(slice.row_mut(k), self.shot_mask.u64s());
                }
            }
            writer.write_table_batch(&slice, 0..BLOCK)?;
            self.unwritten -= BLOCK;
            self.written += BLOCK;
        }

        let keep = self.max_lookback.max(self.unwritten);
        if (self.stored >> 1) > keep {
            let w = self.storage.u64s_per_row();
            let src = (self.stored - keep) * w;
            let len = keep * w;
            self.storage.u64s_mut().copy_within(src..src + len, 0);
            self.stored = keep;
        }
        Ok(())
    }

    /// Streams every remaining unwritten row and terminates the shots.
    pub fn final_write_unwritten_results_to(
        &mut self,
        writer: &mut BatchResultWriter<'_>,
        reference_sample: &BitVec,
    ) -> io::Result<()> {
        let n = self.stored;
        for k in n - self.unwritten..n {
            let invert = self.written < reference_sample.len() && reference_sample.get(self.written);
            if invert {
                word::xor_into(self.storage.row_mut(k), self.shot_mask.u64s());
            }
            writer.write_bit_batch(self.storage.row(k))?;
            if invert {
                word::xor_into(self.storage.row_mut(k), self.shot_mask.u64s());
            }
            self.written += 1;
        }
        self.unwritten = 0;
        Ok(())
    }

    /// Direct access to the recorded rows (used by in-memory sampling).
    #[must_use]
    pub fn storage(&self) -> &BitTable {
        &self.storage
    }

    pub fn clear(&mut self) {
        self.stored = 0;
        self.unwritten = 0;
        self.written = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_record_lookback() {
        let mut r = MeasurementRecord::default();
        r.record_result(true);
        r.record_result(false);
        r.record_result(true);
        assert_eq!(r.lookback(1).unwrap(), true);
        assert_eq!(r.lookback(2).unwrap(), false);
        assert_eq!(r.lookback(3).unwrap(), true);
        assert!(r.lookback(0).is_err());
        assert!(r.lookback(4).is_err());
    }

    #[test]
    fn batch_record_masks_and_grows() {
        let mut r = BatchMeasurementRecord::new(70, usize::MAX, 1);
        let width = BitVec::zeros(70).u64s().len();
        let mut bits = vec![u64::MAX; width];
        for _ in 0..5 {
            r.record_result(&bits);
        }
        assert_eq!(r.num_recorded(), 5);
        // Shots past 70 are masked off.
        let row = r.lookback(1).unwrap();
        assert_eq!(row.len(), width);
        assert_eq!(row[1] >> 6, 0);
        assert_eq!(row[0], u64::MAX);
        bits[0] = 0;
        r.record_result(&bits);
        assert_eq!(r.lookback(1).unwrap()[0], 0);
        assert_eq!(r.lookback(2).unwrap()[0], u64::MAX);
    }
}
