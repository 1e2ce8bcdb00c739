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

/// The bottom 24 bits of a target word hold the value (qubit index or record
/// lookback distance).
pub const TARGET_VALUE_MASK: u32 = (1 << 24) - 1;
/// Set on measurement targets whose recorded result should be inverted.
pub const TARGET_INVERTED_BIT: u32 = 1 << 31;
/// The target Pauli has an X component.
pub const TARGET_PAULI_X_BIT: u32 = 1 << 30;
/// The target Pauli has a Z component.
pub const TARGET_PAULI_Z_BIT: u32 = 1 << 29;
/// The value is a lookback distance into the measurement record.
pub const TARGET_RECORD_BIT: u32 = 1 << 28;
/// A combiner between adjacent targets. Reserved; no current gate produces it.
pub const TARGET_COMBINER_BIT: u32 = 1 << 27;

/// One instruction target, packed into 32 bits.
///
/// A plain qubit target is just the qubit index. The top byte carries flag
/// bits for inverted results, Pauli components (X|Z together denote Y), and
/// measurement-record lookbacks.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct GateTarget {
    pub data: u32,
}

impl GateTarget {
    #[must_use]
    pub fn qubit(q: u32) -> Self {
        debug_assert!(q <= TARGET_VALUE_MASK);
        GateTarget { data: q }
    }

    #[must_use]
    pub fn inverted_qubit(q: u32) -> Self {
        GateTarget {
            data: q | TARGET_INVERTED_BIT,
        }
    }

    #[must_use]
    pub fn pauli_x(q: u32) -> Self {
        GateTarget {
            data: q | TARGET_PAULI_X_BIT,
        }
    }

    #[must_use]
    pub fn pauli_y(q: u32) -> Self {
        GateTarget {
            data: q | TARGET_PAULI_X_BIT | TARGET_PAULI_Z_BIT,
        }
    }

    #[must_use]
    pub fn pauli_z(q: u32) -> Self {
        GateTarget {
            data: q | TARGET_PAULI_Z_BIT,
        }
    }

    /// A `rec[-lookback]` target. `lookback` must be at least 1.
    #[must_use]
    pub fn rec(lookback: u32) -> Self {
        debug_assert!(lookback >= 1 && lookback <= TARGET_VALUE_MASK);
        GateTarget {
            data: lookback | TARGET_RECORD_BIT,
        }
    }

    /// A raw data word (used by `REPEAT`'s packed block parameters).
    #[must_use]
    pub fn raw(data: u32) -> Self {
        GateTarget { data }
    }

    /// The low 24-bit value field.
    #[inline]
    #[must_use]
    pub fn value(self) -> u32 {
        self.data & TARGET_VALUE_MASK
    }

    /// The value field as a qubit index.
    #[inline]
    #[must_use]
    pub fn qubit_value(self) -> usize {
        self.value() as usize
    }

    #[inline]
    #[must_use]
    pub fn is_inverted_result(self) -> bool {
        self.data & TARGET_INVERTED_BIT != 0
    }

    #[inline]
    #[must_use]
    pub fn is_measurement_record(self) -> bool {
        self.data & TARGET_RECORD_BIT != 0
    }

    #[inline]
    #[must_use]
    pub fn has_pauli_x(self) -> bool {
        self.data & TARGET_PAULI_X_BIT != 0
    }

    #[inline]
    #[must_use]
    pub fn has_pauli_z(self) -> bool {
        self.data & TARGET_PAULI_Z_BIT != 0
    }

    #[inline]
    #[must_use]
    pub fn is_pauli(self) -> bool {
        self.data & (TARGET_PAULI_X_BIT | TARGET_PAULI_Z_BIT) != 0
    }

    #[inline]
    #[must_use]
    pub fn is_combiner(self) -> bool {
        self.data & TARGET_COMBINER_BIT != 0
    }

    /// True when the target is a plain qubit (possibly result-inverted).
    #[inline]
    #[must_use]
    pub fn is_qubit(self) -> bool {
        self.data & (TARGET_PAULI_X_BIT | TARGET_PAULI_Z_BIT | TARGET_RECORD_BIT | TARGET_COMBINER_BIT)
            == 0
    }
}

impl fmt::Display for GateTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_inverted_result() {
            write!(f, "!")?;
        }
        if self.is_pauli() {
            let x = self.has_pauli_x();
            let z = self.has_pauli_z();
            let c = match (x, z) {
                (true, false) => 'X',
                (false, true) => 'Z',
                (true, true) => 'Y',
                (false, false) => unreachable!(),
            };
            write!(f, "{c}")?;
        }
        if self.is_measurement_record() {
            write!(f, "rec[-{}]", self.value())
        } else {
            write!(f, "{}", self.value())
        }
    }
}

impl fmt::Debug for GateTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GateTarget({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packing() {
        let q = GateTarget::qubit(17);
        assert_eq!(q.value(), 17);
        assert!(q.is_qubit() && !q.is_pauli() && !q.is_measurement_record());

        let r = GateTarget::rec(3);
        assert!(r.is_measurement_record());
        assert_eq!(r.value(), 3);

        let y = GateTarget::pauli_y(90);
        assert!(y.has_pauli_x() && y.has_pauli_z());
        assert_eq!(y.value(), 90);

        let inv = GateTarget::inverted_qubit(2);
        assert!(inv.is_inverted_result() && inv.is_qubit());
    }

    #[test]
    fn display() {
        assert_eq!(GateTarget::qubit(5).to_string(), "5");
        assert_eq!(GateTarget::inverted_qubit(5).to_string(), "!5");
        assert_eq!(GateTarget::rec(2).to_string(), "rec[-2]");
        assert_eq!(GateTarget::pauli_x(90).to_string(), "X90");
        assert_eq!(GateTarget::pauli_y(91).to_string(), "Y91");
        assert_eq!(GateTarget::pauli_z(92).to_string(), "Z92");
    }
}
