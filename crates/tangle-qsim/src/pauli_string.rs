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

use tangle_core::BitVec;

/// A single-qubit measurement/reset basis.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Basis {
    X,
    Y,
    Z,
}

/// A borrowed view of a Pauli product: sign plus x/z bit rows.
#[derive(Copy, Clone)]
pub struct PauliRef<'a> {
    pub num_qubits: usize,
    pub sign: bool,
    pub xs: &'a [u64],
    pub zs: &'a [u64],
}

/// A dense Pauli product over `num_qubits` qubits with a ±1 sign.
///
/// Qubit k is I/X/Z/Y according to the (x, z) bit pair; Y is encoded as both
/// bits set and carries an implicit `i` factor (Y = iXZ), which the
/// multiplication routine accounts for.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PauliString {
    pub sign: bool,
    pub xs: BitVec,
    pub zs: BitVec,
}

/// Multiplies the Pauli data in (`dst_x`, `dst_z`) on the right by
/// (`src_x`, `src_z`), returning the base-i exponent of the resulting phase
/// (signs excluded), mod 4.
pub(crate) fn right_mul_slices(
    dst_x: &mut [u64],
    dst_z: &mut [u64],
    src_x: &[u64],
    src_z: &[u64],
) -> u8 {
    debug_assert_eq!(dst_x.len(), src_x.len());
    debug_assert_eq!(dst_z.len(), src_z.len());
    let mut exponent: u64 = 0;
    for i in 0..dst_x.len() {
        let x1 = dst_x[i];
        let z1 = dst_z[i];
        let x2 = src_x[i];
        let z2 = src_z[i];
        let x3 = x1 ^ x2;
        let z3 = z1 ^ z2;
        // Per-qubit phase of A(x1,z1)*A(x2,z2) relative to A(x3,z3), where
        // A(x,z) = i^(xz) X^x Z^z. Contributions are x1z1 + x2z2 + 2*z1x2
        // - x3z3 (mod 4).
        exponent += u64::from((x1 & z1).count_ones());
        exponent += u64::from((x2 & z2).count_ones());
        exponent += 2 * u64::from((z1 & x2).count_ones());
        exponent += 3 * u64::from((x3 & z3).count_ones());
        dst_x[i] = x3;
        dst_z[i] = z3;
    }
    (exponent % 4) as u8
}

impl PauliString {
    /// The identity Pauli on `num_qubits` qubits.
    #[must_use]
    pub fn identity(num_qubits: usize) -> Self {
        PauliString {
            sign: false,
            xs: BitVec::zeros(num_qubits),
            zs: BitVec::zeros(num_qubits),
        }
    }

    /// Parses text like "+XYZ_" or "-_XZ".
    ///
    /// # Errors
    /// Rejects characters outside `+-_IXYZ`.
    pub fn from_str(text: &str) -> Result<Self, String> {
        let mut chars = text.chars().peekable();
        let sign = match chars.peek() {
            Some('+') => {
                chars.next();
                false
            }
            Some('-') => {
                chars.next();
                true
            }
            _ => false,
        };
        let body: Vec<char> = chars.collect();
        let mut result = PauliString::identity(body.len());
        result.sign = sign;
        for (k, c) in body.iter().enumerate() {
            match c {
                '_' | 'I' => {}
                'X' => result.xs.set(k, true),
                'Z' => result.zs.set(k, true),
                'Y' => {
                    result.xs.set(k, true);
                    result.zs.set(k, true);
                }
                other => return Err(format!("Unexpected Pauli character '{other}'.")),
            }
        }
        Ok(result)
    }

    #[must_use]
    pub fn num_qubits(&self) -> usize {
        self.xs.len()
    }

    #[must_use]
    pub fn as_ref(&self) -> PauliRef<'_> {
        PauliRef {
            num_qubits: self.num_qubits(),
            sign: self.sign,
            xs: self.xs.u64s(),
            zs: self.zs.u64s(),
        }
    }

    /// The (x, z) bit pair at qubit `k`.
    #[must_use]
    pub fn xz(&self, k: usize) -> (bool, bool) {
        (self.xs.get(k), self.zs.get(k))
    }

    pub fn set_pauli(&mut self, k: usize, x: bool, z: bool) {
        self.xs.set(k, x);
        self.zs.set(k, z);
    }

    /// Right-multiplies by `other`, returning the base-i phase exponent of
    /// the product (including `other`'s sign but not this string's own sign).
    pub fn right_mul(&mut self, other: PauliRef<'_>) -> u8 {
        debug_assert_eq!(self.num_qubits(), other.num_qubits);
        let exponent = right_mul_slices(
            self.xs.u64s_mut(),
            self.zs.u64s_mut(),
            other.xs,
            other.zs,
        );
        (exponent + u8::from(other.sign) * 2) % 4
    }

    /// Right-multiplies by `other`, folding the resulting phase into the
    /// sign. The phase must be real.
    pub fn mul_assign_checked(&mut self, other: PauliRef<'_>) {
        let log_i = self.right_mul(other);
        debug_assert_eq!(log_i & 1, 0, "product of Paulis had an imaginary phase");
        self.sign ^= (log_i >> 1) & 1 != 0;
    }

    #[must_use]
    pub fn commutes(&self, other: PauliRef<'_>) -> bool {
        debug_assert_eq!(self.num_qubits(), other.num_qubits);
        let mut anticommutations: u32 = 0;
        let (xs, zs) = (self.xs.u64s(), self.zs.u64s());
        for i in 0..xs.len() {
            anticommutations ^= ((xs[i] & other.zs[i]) ^ (zs[i] & other.xs[i])).count_ones() & 1;
        }
        anticommutations & 1 == 0
    }

    /// Collects the components at `indices` into a smaller Pauli string.
    #[must_use]
    pub fn gathered(&self, indices: &[usize]) -> PauliString {
        let mut out = PauliString::identity(indices.len());
        out.sign = self.sign;
        for (k, &q) in indices.iter().enumerate() {
            let (x, z) = self.xz(q);
            out.set_pauli(k, x, z);
        }
        out
    }

    /// Writes this (small) string's components out to `indices` of `target`.
    pub fn scatter_into(&self, target: &mut PauliString, indices: &[usize]) {
        debug_assert_eq!(self.num_qubits(), indices.len());
        for (k, &q) in indices.iter().enumerate() {
            let (x, z) = self.xz(k);
            target.set_pauli(q, x, z);
        }
        target.sign = self.sign;
    }

    /// Support size (number of non-identity qubits).
    #[must_use]
    pub fn weight(&self) -> usize {
        let (xs, zs) = (self.xs.u64s(), self.zs.u64s());
        xs.iter()
            .zip(zs)
            .map(|(x, z)| (x | z).count_ones() as usize)
            .sum()
    }
}

impl fmt::Display for PauliString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", if self.sign { '-' } else { '+' })?;
        for k in 0..self.num_qubits() {
            let c = match self.xz(k) {
                (false, false) => '_',
                (true, false) => 'X',
                (false, true) => 'Z',
                (true, true) => 'Y',
            };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}
