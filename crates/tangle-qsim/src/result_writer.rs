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
use std::ops::Range;
use std::str::FromStr;

use tangle_core::BitTable;

/// The supported shot output encodings.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SampleFormat {
    /// '0'/'1' per bit, newline per shot.
    F01,
    /// Bits packed little-endian into bytes, per shot.
    B8,
    /// Byte run-lengths of 0s between 1s; 255 continues a run.
    R8,
    /// Comma-separated decimal indices of set bits, newline per shot.
    Hits,
    /// "shot D3 L1" style records, newline per shot.
    Dets,
    /// Transposed: per bit position, 64-shot groups as little-endian u64s.
    Ptb64,
}

impl FromStr for SampleFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "01" => Ok(SampleFormat::F01),
            "b8" => Ok(SampleFormat::B8),
            "r8" => Ok(SampleFormat::R8),
            "hits" => Ok(SampleFormat::Hits),
            "dets" => Ok(SampleFormat::Dets),
            "ptb64" => Ok(SampleFormat::Ptb64),
            other => Err(format!("Unrecognized output format: '{other}'.")),
        }
    }
}

/// Streams one shot's results in a chosen format.
///
/// `write_bytes` consumes whole bytes of bits (LSB first); `write_end`
/// terminates the shot. `set_result_type` switches the letter used by the
/// `dets` format and resets its position counter.
pub struct ResultWriter<W: Write> {
    format: SampleFormat,
    out: W,
    payload: u8,
    count: u8,
    position: u64,
    first: bool,
    run_length: u16,
    result_type: char,
}

impl<W: Write> ResultWriter<W> {
    /// # Errors
    /// `ptb64` cannot be streamed bit-by-bit and is rejected here.
    pub fn new(format: SampleFormat, mut out: W) -> io::Result<Self> {
        if format == SampleFormat::Ptb64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "ptb64 format is incompatible with per-shot result streaming",
            ));
        }
        if format == SampleFormat::Dets {
            out.write_all(b"shot")?;
        }
        Ok(ResultWriter {
            format,
            out,
            payload: 0,
            count: 0,
            position: 0,
            first: true,
            run_length: 0,
            result_type: 'M',
        })
    }

    pub fn set_result_type(&mut self, result_type: char) {
        self.result_type = result_type;
        self.position = 0;
    }

    pub fn write_bit(&mut self, bit: bool) -> io::Result<()> {
        match self.format {
            SampleFormat::F01 => self.out.write_all(if bit { b"1" } else { b"0" }),
            SampleFormat::B8 => {
                self.payload |= u8::from(bit) << self.count;
                self.count += 1;
                if self.count == 8 {
                    let b = self.payload;
                    self.payload = 0;
                    self.count = 0;
                    self.out.write_all(&[b])?;
                }
                Ok(())
            }
            SampleFormat::R8 => {
                if bit {
                    let b = self.run_length as u8;
                    self.run_length = 0;
                    self.out.write_all(&[b])
                } else {
                    self.run_length += 1;
                    if self.run_length == 255 {
                        self.run_length = 0;
                        self.out.write_all(&[255])?;
                    }
                    Ok(())
                }
            }
            SampleFormat::Hits => {
                if bit {
                    if self.first {
                        self.first = false;
                    } else {
                        self.out.write_all(b",")?;
                    }
                    write!(self.out, "{}", self.position)?;
                }
                self.position += 1;
                Ok(())
            }
            SampleFormat::Dets => {
                if bit {
                    write!(self.out, " {}{}", self.result_type, self.position)?;
                }
                self.position += 1;
                Ok(())
            }
            SampleFormat::Ptb64 => unreachable!(),
        }
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> io::Result<()> {
        match self.format {
            SampleFormat::B8 if self.count == 0 => self.out.write_all(data),
            SampleFormat::Hits | SampleFormat::Dets => {
                for &b in data {
                    if b == 0 {
                        self.position += 8;
                    } else {
                        for k in 0..8 {
                            self.write_bit((b >> k) & 1 != 0)?;
                        }
                    }
                }
                Ok(())
            }
            SampleFormat::R8 => {
                for &b in data {
                    if b == 0 {
                        self.run_length += 8;
                        if self.run_length >= 255 {
                            self.run_length -= 255;
                            self.out.write_all(&[255])?;
                        }
                    } else {
                        for k in 0..8 {
                            self.write_bit((b >> k) & 1 != 0)?;
                        }
                    }
                }
                Ok(())
            }
            _ => {
                for &b in data {
                    for k in 0..8 {
                        self.write_bit((b >> k) & 1 != 0)?;
                    }
                }
                Ok(())
            }
        }
    }

    pub fn write_end(&mut self) -> io::Result<()> {
        match self.format {
            SampleFormat::F01 | SampleFormat::Hits | SampleFormat::Dets => {
                self.out.write_all(b"\n")?;
            }
            SampleFormat::B8 => {
                if self.count > 0 {
                    let b = self.payload;
                    self.payload = 0;
                    self.count = 0;
                    self.out.write_all(&[b])?;
                }
            }
            SampleFormat::R8 => {
                let b = self.run_length as u8;
                self.run_length = 0;
                self.out.write_all(&[b])?;
            }
            SampleFormat::Ptb64 => unreachable!(),
        }
        self.position = 0;
        self.first = true;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Writes a batch of shots at once, transposing measurement-major data into
/// the per-shot formats (or emitting `ptb64` directly).
pub struct BatchResultWriter<'w> {
    format: SampleFormat,
    out: &'w mut dyn Write,
    num_shots: usize,
    shot_writers: Vec<ResultWriter<Vec<u8>>>,
}

impl<'w> BatchResultWriter<'w> {
    /// # Errors
    /// Propagates writer construction failures.
    pub fn new(
        out: &'w mut dyn Write,
        num_shots: usize,
        format: SampleFormat,
    ) -> io::Result<Self> {
        let mut shot_writers = Vec::new();
        if format != SampleFormat::Ptb64 {
            shot_writers.reserve(num_shots);
            for _ in 0..num_shots {
                shot_writers.push(ResultWriter::new(format, Vec::new())?);
            }
        }
        Ok(BatchResultWriter {
            format,
            out,
            num_shots,
            shot_writers,
        })
    }

    pub fn set_result_type(&mut self, result_type: char) {
        for w in &mut self.shot_writers {
            w.set_result_type(result_type);
        }
    }

    /// Writes one bit position across all shots. `row` is a shot-indexed bit
    /// row whose bits beyond `num_shots` are zero.
    pub fn write_bit_batch(&mut self, row: &[u64]) -> io::Result<()> {
        if self.format == SampleFormat::Ptb64 {
            let groups = self.num_shots.div_ceil(64);
            for g in 0..groups {
                self.out.write_all(&row[g].to_le_bytes())?;
            }
            return Ok(());
        }
        for (s, writer) in self.shot_writers.iter_mut().enumerate() {
            let bit = (row[s >> 6] >> (s & 63)) & 1 != 0;
            writer.write_bit(bit)?;
        }
        Ok(())
    }

    /// Writes a run of bit positions across all shots. The number of rows
    /// must be a multiple of 8 for the byte-oriented formats.
    pub fn write_table_batch(&mut self, table: &BitTable, rows: Range<usize>) -> io::Result<()> {
        if self.format == SampleFormat::Ptb64 {
            for r in rows {
                self.write_bit_batch(table.row(r))?;
            }
            return Ok(());
        }
        debug_assert_eq!(rows.len() % 8, 0);
        let num_bytes = rows.len() / 8;
        let transposed = table.transposed();
        let mut bytes = Vec::with_capacity(num_bytes + 8);
        for (s, writer) in self.shot_writers.iter_mut().enumerate() {
            bytes.clear();
            for w in transposed.row(s) {
                bytes.extend_from_slice(&w.to_le_bytes());
            }
            writer.write_bytes(&bytes[rows.start / 8..rows.start / 8 + num_bytes])?;
        }
        Ok(())
    }

    /// Finishes every shot and flushes the buffered shot data in order.
    pub fn write_end(mut self) -> io::Result<()> {
        for mut writer in self.shot_writers.drain(..) {
            writer.write_end()?;
            let bytes = writer.into_inner();
            self.out.write_all(&bytes)?;
        }
        self.out.flush()
    }
}
