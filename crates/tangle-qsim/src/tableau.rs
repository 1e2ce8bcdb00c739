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

use rand::Rng;
use tangle_circuit::{GateFlags, GateId};
use tangle_core::bits::word;
use tangle_core::{BitTable, BitVec, SimRng};

use crate::pauli_string::{right_mul_slices, PauliRef, PauliString};

/// One half of a tableau: where each qubit's X (or Z) observable maps to.
///
/// Row k of `xt`/`zt` holds the X/Z components of the image of the k'th
/// generator; `signs` holds the image signs.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TableauHalf {
    pub xt: BitTable,
    pub zt: BitTable,
    pub signs: BitVec,
}

impl TableauHalf {
    fn new(num_qubits: usize) -> Self {
        TableauHalf {
            xt: BitTable::square(num_qubits),
            zt: BitTable::square(num_qubits),
            signs: BitVec::zeros(num_qubits),
        }
    }

    /// A borrowed Pauli view of row `q`.
    #[must_use]
    pub fn pauli_ref(&self, q: usize) -> PauliRef<'_> {
        PauliRef {
            num_qubits: self.signs.len(),
            sign: self.signs.get(q),
            xs: self.xt.row(q),
            zs: self.zt.row(q),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
pub(crate) enum Half {
    X,
    Z,
}

/// A 2n x 2n symplectic representation of an n-qubit Clifford operator.
///
/// The `xs` half stores the images of the single-qubit X observables, the
/// `zs` half the images of the Z observables. All mutating gate methods are
/// "prepend" operations: `T <- T . G`, i.e. the gate acts before the
/// operator the tableau already represents.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Tableau {
    pub num_qubits: usize,
    pub xs: TableauHalf,
    pub zs: TableauHalf,
}

impl Tableau {
    #[must_use]
    pub fn identity(num_qubits: usize) -> Self {
        let mut result = Tableau {
            num_qubits,
            xs: TableauHalf::new(num_qubits),
            zs: TableauHalf::new(num_qubits),
        };
        for q in 0..num_qubits {
            result.xs.xt.set(q, q, true);
            result.zs.zt.set(q, q, true);
        }
        result
    }

    /// The tableau of the given Pauli operator: identity action, with signs
    /// flipped on the anticommuting generators.
    #[must_use]
    pub fn from_pauli_string(pauli: &PauliString) -> Self {
        let mut result = Tableau::identity(pauli.num_qubits());
        result.xs.signs.copy_from(&pauli.zs);
        result.zs.signs.copy_from(&pauli.xs);
        result
    }

    fn half(&self, h: Half) -> &TableauHalf {
        match h {
            Half::X => &self.xs,
            Half::Z => &self.zs,
        }
    }

    fn half_mut(&mut self, h: Half) -> &mut TableauHalf {
        match h {
            Half::X => &mut self.xs,
            Half::Z => &mut self.zs,
        }
    }

    pub(crate) fn row_copy(&self, h: Half, q: usize) -> PauliString {
        let half = self.half(h);
        let mut result = PauliString::identity(self.num_qubits);
        result.sign = half.signs.get(q);
        result.xs.u64s_mut().copy_from_slice(half.xt.row(q));
        result.zs.u64s_mut().copy_from_slice(half.zt.row(q));
        result
    }

    pub(crate) fn set_row(&mut self, h: Half, q: usize, value: &PauliString) {
        let half = self.half_mut(h);
        half.xt.row_mut(q).copy_from_slice(value.xs.u64s());
        half.zt.row_mut(q).copy_from_slice(value.zs.u64s());
        half.signs.set(q, value.sign);
    }

    /// `row <- i^extra_log_i * row * src`, folding the phase into the sign.
    fn row_mul(&mut self, h: Half, q: usize, src: &PauliString, extra_log_i: u8) {
        let half = self.half_mut(h);
        let exponent = right_mul_slices(
            half.xt.row_mut(q),
            half.zt.row_mut(q),
            src.xs.u64s(),
            src.zs.u64s(),
        );
        let total = exponent + extra_log_i;
        debug_assert_eq!(total % 2, 0, "tableau row product had an imaginary phase");
        if (total & 2 != 0) ^ src.sign {
            half.signs.toggle(q);
        }
    }

    fn swap_rows_xz(&mut self, q: usize) {
        word::swap_slices(self.xs.xt.row_mut(q), self.zs.xt.row_mut(q));
        word::swap_slices(self.xs.zt.row_mut(q), self.zs.zt.row_mut(q));
        let (a, b) = (self.xs.signs.get(q), self.zs.signs.get(q));
        self.xs.signs.set(q, b);
        self.zs.signs.set(q, a);
    }

    // Single-qubit prepends. Each comment gives the gate's conjugation flow.

    /// X -> X, Z -> -Z
    pub fn prepend_x(&mut self, q: usize) {
        self.zs.signs.toggle(q);
    }

    /// X -> -X, Z -> -Z
    pub fn prepend_y(&mut self, q: usize) {
        self.xs.signs.toggle(q);
        self.zs.signs.toggle(q);
    }

    /// X -> -X, Z -> Z
    pub fn prepend_z(&mut self, q: usize) {
        self.xs.signs.toggle(q);
    }

    /// X -> Z, Z -> X, Y -> -Y
    pub fn prepend_h_xz(&mut self, q: usize) {
        self.swap_rows_xz(q);
    }

    /// X -> Y, Y -> X, Z -> -Z
    pub fn prepend_h_xy(&mut self, q: usize) {
        let z_row = self.row_copy(Half::Z, q);
        self.row_mul(Half::X, q, &z_row, 1);
        self.zs.signs.toggle(q);
    }

    /// X -> -X, Z -> Y, Y -> Z
    pub fn prepend_h_yz(&mut self, q: usize) {
        let x_row = self.row_copy(Half::X, q);
        self.row_mul(Half::Z, q, &x_row, 3);
        self.xs.signs.toggle(q);
    }

    /// X -> Y, Z -> Z
    pub fn prepend_sqrt_z(&mut self, q: usize) {
        let z_row = self.row_copy(Half::Z, q);
        self.row_mul(Half::X, q, &z_row, 1);
    }

    /// X -> -Y, Z -> Z
    pub fn prepend_sqrt_z_dag(&mut self, q: usize) {
        let z_row = self.row_copy(Half::Z, q);
        self.row_mul(Half::X, q, &z_row, 3);
    }

    /// X -> X, Z -> -Y
    pub fn prepend_sqrt_x(&mut self, q: usize) {
        let x_row = self.row_copy(Half::X, q);
        self.row_mul(Half::Z, q, &x_row, 1);
    }

    /// X -> X, Z -> Y
    pub fn prepend_sqrt_x_dag(&mut self, q: usize) {
        let x_row = self.row_copy(Half::X, q);
        self.row_mul(Half::Z, q, &x_row, 3);
    }

    /// X -> -Z, Z -> X
    pub fn prepend_sqrt_y(&mut self, q: usize) {
        self.swap_rows_xz(q);
        self.xs.signs.toggle(q);
    }

    /// X -> Z, Z -> -X
    pub fn prepend_sqrt_y_dag(&mut self, q: usize) {
        self.swap_rows_xz(q);
        self.zs.signs.toggle(q);
    }

    /// X -> Y -> Z -> X
    pub fn prepend_c_xyz(&mut self, q: usize) {
        self.prepend_h_xz(q);
        self.prepend_sqrt_z_dag(q);
    }

    /// X -> Z -> Y -> X
    pub fn prepend_c_zyx(&mut self, q: usize) {
        self.prepend_sqrt_z(q);
        self.prepend_h_xz(q);
    }

    // Two-qubit prepends.

    /// XI -> XX, IZ -> ZZ
    pub fn prepend_zcx(&mut self, c: usize, t: usize) {
        let x_t = self.row_copy(Half::X, t);
        self.row_mul(Half::X, c, &x_t, 0);
        let z_c = self.row_copy(Half::Z, c);
        self.row_mul(Half::Z, t, &z_c, 0);
    }

    /// XI -> XY, IX -> ZX, IZ -> ZZ
    pub fn prepend_zcy(&mut self, c: usize, t: usize) {
        let x_t = self.row_copy(Half::X, t);
        let z_t = self.row_copy(Half::Z, t);
        self.row_mul(Half::X, c, &x_t, 0);
        self.row_mul(Half::X, c, &z_t, 1);
        let z_c = self.row_copy(Half::Z, c);
        self.row_mul(Half::X, t, &z_c, 0);
        self.row_mul(Half::Z, t, &z_c, 0);
    }

    /// XI -> XZ, IX -> ZX
    pub fn prepend_zcz(&mut self, a: usize, b: usize) {
        let z_b = self.row_copy(Half::Z, b);
        self.row_mul(Half::X, a, &z_b, 0);
        let z_a = self.row_copy(Half::Z, a);
        self.row_mul(Half::X, b, &z_a, 0);
    }

    /// ZI -> ZX, IZ -> XZ
    pub fn prepend_xcx(&mut self, a: usize, b: usize) {
        let x_b = self.row_copy(Half::X, b);
        self.row_mul(Half::Z, a, &x_b, 0);
        let x_a = self.row_copy(Half::X, a);
        self.row_mul(Half::Z, b, &x_a, 0);
    }

    /// ZI -> ZY, IX -> XX, IZ -> XZ
    pub fn prepend_xcy(&mut self, a: usize, b: usize) {
        let x_b = self.row_copy(Half::X, b);
        let z_b = self.row_copy(Half::Z, b);
        self.row_mul(Half::Z, a, &x_b, 0);
        self.row_mul(Half::Z, a, &z_b, 1);
        let x_a = self.row_copy(Half::X, a);
        self.row_mul(Half::X, b, &x_a, 0);
        self.row_mul(Half::Z, b, &x_a, 0);
    }

    pub fn prepend_xcz(&mut self, a: usize, b: usize) {
        self.prepend_zcx(b, a);
    }

    pub fn prepend_ycx(&mut self, a: usize, b: usize) {
        self.prepend_xcy(b, a);
    }

    pub fn prepend_ycz(&mut self, a: usize, b: usize) {
        self.prepend_zcy(b, a);
    }

    /// XI -> XY, ZI -> ZY, IX -> YX, IZ -> YZ
    pub fn prepend_ycy(&mut self, a: usize, b: usize) {
        let x_a = self.row_copy(Half::X, a);
        let z_a = self.row_copy(Half::Z, a);
        let x_b = self.row_copy(Half::X, b);
        let z_b = self.row_copy(Half::Z, b);
        self.row_mul(Half::X, a, &x_b, 0);
        self.row_mul(Half::X, a, &z_b, 1);
        self.row_mul(Half::Z, a, &x_b, 0);
        self.row_mul(Half::Z, a, &z_b, 1);
        self.row_mul(Half::X, b, &x_a, 0);
        self.row_mul(Half::X, b, &z_a, 1);
        self.row_mul(Half::Z, b, &x_a, 0);
        self.row_mul(Half::Z, b, &z_a, 1);
    }

    pub fn prepend_swap(&mut self, a: usize, b: usize) {
        self.xs.xt.swap_rows(a, b);
        self.xs.zt.swap_rows(a, b);
        self.zs.xt.swap_rows(a, b);
        self.zs.zt.swap_rows(a, b);
        let (sa, sb) = (self.xs.signs.get(a), self.xs.signs.get(b));
        self.xs.signs.set(a, sb);
        self.xs.signs.set(b, sa);
        let (sa, sb) = (self.zs.signs.get(a), self.zs.signs.get(b));
        self.zs.signs.set(a, sb);
        self.zs.signs.set(b, sa);
    }

    /// X_ -> ZY, Z_ -> _Z, _X -> YZ, _Z -> Z_
    pub fn prepend_iswap(&mut self, a: usize, b: usize) {
        self.prepend_zcz(a, b);
        self.prepend_sqrt_z(a);
        self.prepend_sqrt_z(b);
        self.prepend_swap(a, b);
    }

    /// X_ -> -ZY, Z_ -> _Z, _X -> -YZ, _Z -> Z_
    pub fn prepend_iswap_dag(&mut self, a: usize, b: usize) {
        self.prepend_swap(a, b);
        self.prepend_sqrt_z_dag(a);
        self.prepend_sqrt_z_dag(b);
        self.prepend_zcz(a, b);
    }

    /// Z_ -> -YX, _Z -> -XY
    pub fn prepend_sqrt_xx(&mut self, a: usize, b: usize) {
        let x_a = self.row_copy(Half::X, a);
        let x_b = self.row_copy(Half::X, b);
        self.row_mul(Half::Z, a, &x_a, 1);
        self.row_mul(Half::Z, a, &x_b, 0);
        self.row_mul(Half::Z, b, &x_b, 1);
        self.row_mul(Half::Z, b, &x_a, 0);
    }

    /// Z_ -> YX, _Z -> XY
    pub fn prepend_sqrt_xx_dag(&mut self, a: usize, b: usize) {
        let x_a = self.row_copy(Half::X, a);
        let x_b = self.row_copy(Half::X, b);
        self.row_mul(Half::Z, a, &x_a, 3);
        self.row_mul(Half::Z, a, &x_b, 0);
        self.row_mul(Half::Z, b, &x_b, 3);
        self.row_mul(Half::Z, b, &x_a, 0);
    }

    /// X_ -> -ZY, _X -> -YZ, Z_ -> XY, _Z -> YX
    pub fn prepend_sqrt_yy(&mut self, a: usize, b: usize) {
        let x_a = self.row_copy(Half::X, a);
        let z_a = self.row_copy(Half::Z, a);
        let x_b = self.row_copy(Half::X, b);
        let z_b = self.row_copy(Half::Z, b);
        self.set_row(Half::X, a, &z_a);
        self.row_mul(Half::X, a, &x_b, 3);
        self.row_mul(Half::X, a, &z_b, 0);
        self.set_row(Half::X, b, &x_a);
        self.row_mul(Half::X, b, &z_a, 3);
        self.row_mul(Half::X, b, &z_b, 0);
        self.set_row(Half::Z, a, &x_a);
        self.row_mul(Half::Z, a, &x_b, 1);
        self.row_mul(Half::Z, a, &z_b, 0);
        self.set_row(Half::Z, b, &x_a);
        self.row_mul(Half::Z, b, &z_a, 1);
        self.row_mul(Half::Z, b, &x_b, 0);
    }

    /// X_ -> ZY, _X -> YZ, Z_ -> -XY, _Z -> -YX
    pub fn prepend_sqrt_yy_dag(&mut self, a: usize, b: usize) {
        let x_a = self.row_copy(Half::X, a);
        let z_a = self.row_copy(Half::Z, a);
        let x_b = self.row_copy(Half::X, b);
        let z_b = self.row_copy(Half::Z, b);
        self.set_row(Half::X, a, &z_a);
        self.row_mul(Half::X, a, &x_b, 1);
        self.row_mul(Half::X, a, &z_b, 0);
        self.set_row(Half::X, b, &x_a);
        self.row_mul(Half::X, b, &z_a, 1);
        self.row_mul(Half::X, b, &z_b, 0);
        self.set_row(Half::Z, a, &x_a);
        self.row_mul(Half::Z, a, &x_b, 3);
        self.row_mul(Half::Z, a, &z_b, 0);
        self.set_row(Half::Z, b, &x_a);
        self.row_mul(Half::Z, b, &z_a, 3);
        self.row_mul(Half::Z, b, &x_b, 0);
    }

    /// X_ -> YZ, _X -> ZY
    pub fn prepend_sqrt_zz(&mut self, a: usize, b: usize) {
        let z_a = self.row_copy(Half::Z, a);
        let z_b = self.row_copy(Half::Z, b);
        self.row_mul(Half::X, a, &z_a, 1);
        self.row_mul(Half::X, a, &z_b, 0);
        self.row_mul(Half::X, b, &z_b, 1);
        self.row_mul(Half::X, b, &z_a, 0);
    }

    /// X_ -> -YZ, _X -> -ZY
    pub fn prepend_sqrt_zz_dag(&mut self, a: usize, b: usize) {
        let z_a = self.row_copy(Half::Z, a);
        let z_b = self.row_copy(Half::Z, b);
        self.row_mul(Half::X, a, &z_a, 3);
        self.row_mul(Half::X, a, &z_b, 0);
        self.row_mul(Half::X, b, &z_b, 3);
        self.row_mul(Half::X, b, &z_a, 0);
    }

    /// Dispatches a single-qubit unitary prepend by gate id.
    pub fn prepend_gate1(&mut self, gate: GateId, q: usize) {
        match gate {
            GateId::I => {}
            GateId::X => self.prepend_x(q),
            GateId::Y => self.prepend_y(q),
            GateId::Z => self.prepend_z(q),
            GateId::H => self.prepend_h_xz(q),
            GateId::HXY => self.prepend_h_xy(q),
            GateId::HYZ => self.prepend_h_yz(q),
            GateId::CXYZ => self.prepend_c_xyz(q),
            GateId::CZYX => self.prepend_c_zyx(q),
            GateId::S => self.prepend_sqrt_z(q),
            GateId::SDag => self.prepend_sqrt_z_dag(q),
            GateId::SqrtX => self.prepend_sqrt_x(q),
            GateId::SqrtXDag => self.prepend_sqrt_x_dag(q),
            GateId::SqrtY => self.prepend_sqrt_y(q),
            GateId::SqrtYDag => self.prepend_sqrt_y_dag(q),
            _ => panic!("not a single-qubit unitary: {:?}", gate),
        }
    }

    /// Dispatches a two-qubit unitary prepend by gate id.
    pub fn prepend_gate2(&mut self, gate: GateId, a: usize, b: usize) {
        match gate {
            GateId::CX => self.prepend_zcx(a, b),
            GateId::CY => self.prepend_zcy(a, b),
            GateId::CZ => self.prepend_zcz(a, b),
            GateId::XCX => self.prepend_xcx(a, b),
            GateId::XCY => self.prepend_xcy(a, b),
            GateId::XCZ => self.prepend_xcz(a, b),
            GateId::YCX => self.prepend_ycx(a, b),
            GateId::YCY => self.prepend_ycy(a, b),
            GateId::YCZ => self.prepend_ycz(a, b),
            GateId::Swap => self.prepend_swap(a, b),
            GateId::ISwap => self.prepend_iswap(a, b),
            GateId::ISwapDag => self.prepend_iswap_dag(a, b),
            GateId::SqrtXX => self.prepend_sqrt_xx(a, b),
            GateId::SqrtXXDag => self.prepend_sqrt_xx_dag(a, b),
            GateId::SqrtYY => self.prepend_sqrt_yy(a, b),
            GateId::SqrtYYDag => self.prepend_sqrt_yy_dag(a, b),
            GateId::SqrtZZ => self.prepend_sqrt_zz(a, b),
            GateId::SqrtZZDag => self.prepend_sqrt_zz_dag(a, b),
            _ => panic!("not a two-qubit unitary: {:?}", gate),
        }
    }

    /// The tableau of a named unitary gate (1 or 2 qubits), if it has one.
    #[must_use]
    pub fn for_gate(gate: GateId) -> Option<Tableau> {
        if !gate.flags().contains(GateFlags::UNITARY) {
            return None;
        }
        if gate.flags().contains(GateFlags::TARGETS_PAIRS) {
            let mut t = Tableau::identity(2);
            t.prepend_gate2(gate, 0, 1);
            Some(t)
        } else {
            let mut t = Tableau::identity(1);
            t.prepend_gate1(gate, 0);
            Some(t)
        }
    }

    /// The image of the k'th X observable.
    #[must_use]
    pub fn x_output(&self, q: usize) -> PauliString {
        self.row_copy(Half::X, q)
    }

    /// The image of the k'th Z observable.
    #[must_use]
    pub fn z_output(&self, q: usize) -> PauliString {
        self.row_copy(Half::Z, q)
    }

    /// The image of the k'th Y observable, via Y = iXZ.
    #[must_use]
    pub fn y_output(&self, q: usize) -> PauliString {
        let mut result = self.row_copy(Half::X, q);
        let mut log_i = 1;
        log_i += result.right_mul(self.zs.pauli_ref(q));
        debug_assert_eq!(log_i & 1, 0);
        if log_i & 2 != 0 {
            result.sign ^= true;
        }
        result
    }

    /// Evaluates the image of a smaller Pauli product whose k'th component
    /// acts on qubit `scattered_indices[k]`.
    #[must_use]
    pub fn scatter_eval(&self, gathered: &PauliString, scattered_indices: &[usize]) -> PauliString {
        debug_assert_eq!(gathered.num_qubits(), scattered_indices.len());
        let mut result = PauliString::identity(self.num_qubits);
        result.sign = gathered.sign;
        for (k, &q) in scattered_indices.iter().enumerate() {
            let (x, z) = gathered.xz(k);
            if x && z {
                // Multiply by the Y image using Y = i*X*Z.
                let mut log_i: u8 = 1;
                log_i += result.right_mul(self.xs.pauli_ref(q));
                log_i += result.right_mul(self.zs.pauli_ref(q));
                debug_assert_eq!(log_i & 1, 0);
                result.sign ^= log_i & 2 != 0;
            } else if x {
                result.mul_assign_checked(self.xs.pauli_ref(q));
            } else if z {
                result.mul_assign_checked(self.zs.pauli_ref(q));
            }
        }
        result
    }

    /// Conjugates `pauli` by this Clifford.
    #[must_use]
    pub fn apply_to(&self, pauli: &PauliString) -> PauliString {
        assert_eq!(pauli.num_qubits(), self.num_qubits);
        let indices: Vec<usize> = (0..self.num_qubits).collect();
        self.scatter_eval(pauli, &indices)
    }

    /// Conjugates the components of `target` at `target_qubits` by this
    /// (smaller) Clifford, in place.
    pub fn apply_within(&self, target: &mut PauliString, target_qubits: &[usize]) {
        debug_assert_eq!(self.num_qubits, target_qubits.len());
        let gathered = target.gathered(target_qubits);
        let out = self.apply_to(&gathered);
        out.scatter_into(target, target_qubits);
    }

    /// Composes a smaller operation onto specific qubits, after the current
    /// operator.
    pub fn inplace_scatter_append(&mut self, operation: &Tableau, target_qubits: &[usize]) {
        assert_eq!(operation.num_qubits, target_qubits.len());
        for q in 0..self.num_qubits {
            let mut x = self.x_output(q);
            operation.apply_within(&mut x, target_qubits);
            self.set_row(Half::X, q, &x);
            let mut z = self.z_output(q);
            operation.apply_within(&mut z, target_qubits);
            self.set_row(Half::Z, q, &z);
        }
    }

    /// Composes a smaller operation onto specific qubits, before the current
    /// operator.
    pub fn inplace_scatter_prepend(&mut self, operation: &Tableau, target_qubits: &[usize]) {
        assert_eq!(operation.num_qubits, target_qubits.len());
        let mut new_x = Vec::with_capacity(operation.num_qubits);
        let mut new_z = Vec::with_capacity(operation.num_qubits);
        for q in 0..operation.num_qubits {
            new_x.push(self.scatter_eval(&operation.x_output(q), target_qubits));
            new_z.push(self.scatter_eval(&operation.z_output(q), target_qubits));
        }
        for (k, &q) in target_qubits.iter().enumerate() {
            self.set_row(Half::X, q, &new_x[k]);
            self.set_row(Half::Z, q, &new_z[k]);
        }
    }

    /// `self` then `second` as a composed operator.
    #[must_use]
    pub fn then(&self, second: &Tableau) -> Tableau {
        assert_eq!(self.num_qubits, second.num_qubits);
        let mut result = Tableau::identity(self.num_qubits);
        for q in 0..self.num_qubits {
            result.set_row(Half::X, q, &second.apply_to(&self.x_output(q)));
            result.set_row(Half::Z, q, &second.apply_to(&self.z_output(q)));
        }
        result
    }

    pub fn do_transpose_quadrants(&mut self) {
        self.xs.xt.square_transpose();
        self.xs.zt.square_transpose();
        self.zs.xt.square_transpose();
        self.zs.zt.square_transpose();
    }

    /// The inverse Clifford: transposed quadrants with the xx and zz
    /// quadrants exchanged, then signs recomputed so T . T^-1 = I.
    #[must_use]
    pub fn inverse(&self, skip_signs: bool) -> Tableau {
        let n = self.num_qubits;
        let mut result = Tableau {
            num_qubits: n,
            xs: TableauHalf {
                xt: self.zs.zt.clone(),
                zt: self.xs.zt.clone(),
                signs: BitVec::zeros(n),
            },
            zs: TableauHalf {
                xt: self.zs.xt.clone(),
                zt: self.xs.xt.clone(),
                signs: BitVec::zeros(n),
            },
        };
        result.do_transpose_quadrants();

        if !skip_signs {
            // Fix signs by checking for consistent round trips.
            let mut singleton = PauliString::identity(n);
            for k in 0..n {
                singleton.xs.set(k, true);
                let x_round_trip = self.apply_to(&result.apply_to(&singleton)).sign;
                singleton.xs.set(k, false);
                singleton.zs.set(k, true);
                let z_round_trip = self.apply_to(&result.apply_to(&singleton)).sign;
                singleton.zs.set(k, false);
                if x_round_trip {
                    result.xs.signs.toggle(k);
                }
                if z_round_trip {
                    result.zs.signs.toggle(k);
                }
            }
        }
        result
    }

    /// Square-and-multiply exponentiation; negative powers go through the
    /// inverse.
    #[must_use]
    pub fn raised_to(&self, exponent: i64) -> Tableau {
        let mut result = Tableau::identity(self.num_qubits);
        if exponent == 0 {
            return result;
        }
        let mut square = if exponent < 0 {
            self.inverse(false)
        } else {
            self.clone()
        };
        let mut e = exponent.unsigned_abs();
        loop {
            if e & 1 != 0 {
                result = result.then(&square);
            }
            e >>= 1;
            if e == 0 {
                return result;
            }
            square = square.then(&square);
        }
    }

    /// Grows the tableau in place, appending identity action on new qubits.
    pub fn expand(&mut self, new_num_qubits: usize) {
        assert!(new_num_qubits >= self.num_qubits);
        if new_num_qubits == self.num_qubits {
            return;
        }
        let old = std::mem::replace(self, Tableau::identity(new_num_qubits));
        let w = old.xs.xt.u64s_per_row();
        for q in 0..old.num_qubits {
            self.xs.xt.row_mut(q)[..w].copy_from_slice(old.xs.xt.row(q));
            self.xs.zt.row_mut(q)[..w].copy_from_slice(old.xs.zt.row(q));
            self.zs.xt.row_mut(q)[..w].copy_from_slice(old.zs.xt.row(q));
            self.zs.zt.row_mut(q)[..w].copy_from_slice(old.zs.zt.row(q));
            self.xs.signs.set(q, old.xs.signs.get(q));
            self.zs.signs.set(q, old.zs.signs.get(q));
        }
    }

    /// Appends another operator as a tensor factor on fresh qubits.
    pub fn tensor_assign(&mut self, second: &Tableau) {
        let n = self.num_qubits;
        self.expand(n + second.num_qubits);
        for i in 0..second.num_qubits {
            self.xs.signs.set(n + i, second.xs.signs.get(i));
            self.zs.signs.set(n + i, second.zs.signs.get(i));
            for j in 0..second.num_qubits {
                self.xs.xt.set(n + i, n + j, second.xs.xt.get(i, j));
                self.xs.zt.set(n + i, n + j, second.xs.zt.get(i, j));
                self.zs.xt.set(n + i, n + j, second.zs.xt.get(i, j));
                self.zs.zt.set(n + i, n + j, second.zs.zt.get(i, j));
            }
        }
    }

    /// Checks the symplectic commutation structure of the rows.
    #[must_use]
    pub fn satisfies_invariants(&self) -> bool {
        for q1 in 0..self.num_qubits {
            let x1 = self.x_output(q1);
            let z1 = self.z_output(q1);
            if x1.commutes(self.zs.pauli_ref(q1)) {
                return false;
            }
            for q2 in q1 + 1..self.num_qubits {
                if !x1.commutes(self.xs.pauli_ref(q2))
                    || !x1.commutes(self.zs.pauli_ref(q2))
                    || !z1.commutes(self.xs.pauli_ref(q2))
                    || !z1.commutes(self.zs.pauli_ref(q2))
                {
                    return false;
                }
            }
        }
        true
    }

    /// Uniformly samples an n-qubit Clifford (mod global phase) using the
    /// canonical-form construction of Bravyi and Maslov,
    /// "Hadamard-free circuits expose the structure of the Clifford group"
    /// <https://arxiv.org/abs/2003.09412>.
    #[must_use]
    pub fn random(num_qubits: usize, rng: &mut SimRng) -> Tableau {
        let raw = random_stabilizer_tableau_raw(num_qubits, rng);
        let n = num_qubits;
        let mut result = Tableau::identity(n);
        for row in 0..n {
            for col in 0..n {
                result.xs.xt.set(row, col, raw.get(row, col));
                result.xs.zt.set(row, col, raw.get(row, col + n));
                result.zs.xt.set(row, col, raw.get(row + n, col));
                result.zs.zt.set(row, col, raw.get(row + n, col + n));
            }
        }
        result.xs.signs.randomize(n, rng);
        result.zs.signs.randomize(n, rng);
        result
    }
}

/// Samples a bit vector and permutation from the quantum Mallows
/// distribution.
fn sample_qmallows(n: usize, rng: &mut SimRng) -> (Vec<bool>, Vec<usize>) {
    let mut hada = Vec::with_capacity(n);
    let mut permutation = Vec::with_capacity(n);
    let mut remaining: Vec<usize> = (0..n).collect();
    for _ in 0..n {
        let m = remaining.len();
        let u: f64 = rng.random();
        let eps = 4f64.powi(-(m as i32));
        let mut k = (-((u + (1.0 - u) * eps).log2().ceil())) as usize;
        k = k.min(2 * m - 1);
        hada.push(k < m);
        if k >= m {
            k = 2 * m - k - 1;
        }
        permutation.push(remaining.remove(k));
    }
    (hada, permutation)
}

/// Samples a random 2n x 2n symplectic bit matrix.
fn random_stabilizer_tableau_raw(n: usize, rng: &mut SimRng) -> BitTable {
    let (hada, perm) = sample_qmallows(n, rng);

    let mut symmetric = BitTable::square(n);
    for row in 0..n {
        symmetric.randomize_row(row, row + 1, rng);
        for col in 0..row {
            let b = symmetric.get(row, col);
            symmetric.set(col, row, b);
        }
    }

    let mut symmetric_m = BitTable::square(n);
    for row in 0..n {
        symmetric_m.randomize_row(row, row + 1, rng);
        let d = symmetric_m.get(row, row) && hada[row];
        symmetric_m.set(row, row, d);
        for col in 0..row {
            let mut b = hada[row] && hada[col];
            b |= hada[row] > hada[col] && perm[row] < perm[col];
            b |= hada[row] < hada[col] && perm[row] > perm[col];
            let v = symmetric_m.get(row, col) && b;
            symmetric_m.set(row, col, v);
            symmetric_m.set(col, row, v);
        }
    }

    let mut lower = BitTable::square_identity(n);
    for row in 0..n {
        lower.randomize_row(row, row, rng);
    }

    let mut lower_m = BitTable::square_identity(n);
    for row in 0..n {
        lower_m.randomize_row(row, row, rng);
        for col in 0..row {
            let mut b = hada[row] < hada[col];
            b |= hada[row] && hada[col] && perm[row] > perm[col];
            b |= !hada[row] && !hada[col] && perm[row] < perm[col];
            let v = lower_m.get(row, col) && b;
            lower_m.set(row, col, v);
        }
    }

    let prod = symmetric.square_mat_mul(&lower, n);
    let prod_m = symmetric_m.square_mat_mul(&lower_m, n);

    let mut inv = lower.inverse_assuming_lower_triangular(n);
    let mut inv_m = lower_m.inverse_assuming_lower_triangular(n);
    inv.square_transpose();
    inv_m.square_transpose();

    let zero = BitTable::square(n);
    let fused = BitTable::from_quadrants(n, &lower, &zero, &prod, &inv);
    let fused_m = BitTable::from_quadrants(n, &lower_m, &zero, &prod_m, &inv_m);

    let mut u = BitTable::square(2 * n);
    for row in 0..n {
        u.row_mut(row).copy_from_slice(fused.row(perm[row]));
        u.row_mut(row + n).copy_from_slice(fused.row(perm[row] + n));
    }
    for row in 0..n {
        if hada[row] {
            u.swap_rows(row, row + n);
        }
    }

    fused_m.square_mat_mul(&u, 2 * n)
}

impl fmt::Display for Tableau {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+-")?;
        for _ in 0..self.num_qubits {
            write!(f, "xz-")?;
        }
        write!(f, "\n|")?;
        for k in 0..self.num_qubits {
            let sx = if self.xs.signs.get(k) { '-' } else { '+' };
            let sz = if self.zs.signs.get(k) { '-' } else { '+' };
            write!(f, " {sx}{sz}")?;
        }
        for q in 0..self.num_qubits {
            write!(f, "\n|")?;
            for k in 0..self.num_qubits {
                let xc = pauli_char(self.xs.xt.get(k, q), self.xs.zt.get(k, q));
                let zc = pauli_char(self.zs.xt.get(k, q), self.zs.zt.get(k, q));
                write!(f, " {xc}{zc}")?;
            }
        }
        Ok(())
    }
}

fn pauli_char(x: bool, z: bool) -> char {
    match (x, z) {
        (false, false) => '_',
        (true, false) => 'X',
        (false, true) => 'Z',
        (true, true) => 'Y',
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn identity_shape() {
        let t = Tableau::identity(3);
        assert_eq!(t.x_output(0).to_string(), "+X__");
        assert_eq!(t.z_output(2).to_string(), "+__Z");
        assert!(t.satisfies_invariants());
    }

    #[test]
    fn single_qubit_flows() {
        let mut t = Tableau::identity(1);
        t.prepend_h_xz(0);
        assert_eq!(t.x_output(0).to_string(), "+Z");
        assert_eq!(t.z_output(0).to_string(), "+X");

        let mut t = Tableau::identity(1);
        t.prepend_sqrt_z(0);
        assert_eq!(t.x_output(0).to_string(), "+Y");
        assert_eq!(t.z_output(0).to_string(), "+Z");

        let mut t = Tableau::identity(1);
        t.prepend_sqrt_z_dag(0);
        assert_eq!(t.x_output(0).to_string(), "-Y");

        let mut t = Tableau::identity(1);
        t.prepend_sqrt_x(0);
        assert_eq!(t.z_output(0).to_string(), "-Y");
        assert_eq!(t.x_output(0).to_string(), "+X");

        let mut t = Tableau::identity(1);
        t.prepend_h_xy(0);
        assert_eq!(t.x_output(0).to_string(), "+Y");
        assert_eq!(t.z_output(0).to_string(), "-Z");

        let mut t = Tableau::identity(1);
        t.prepend_h_yz(0);
        assert_eq!(t.x_output(0).to_string(), "-X");
        assert_eq!(t.z_output(0).to_string(), "+Y");

        let mut t = Tableau::identity(1);
        t.prepend_c_xyz(0);
        assert_eq!(t.x_output(0).to_string(), "+Y");
        assert_eq!(t.z_output(0).to_string(), "+X");
        assert_eq!(t.y_output(0).to_string(), "+Z");
    }

    #[test]
    fn two_qubit_flows() {
        let mut t = Tableau::identity(2);
        t.prepend_zcx(0, 1);
        assert_eq!(t.x_output(0).to_string(), "+XX");
        assert_eq!(t.z_output(0).to_string(), "+Z_");
        assert_eq!(t.x_output(1).to_string(), "+_X");
        assert_eq!(t.z_output(1).to_string(), "+ZZ");

        let mut t = Tableau::identity(2);
        t.prepend_sqrt_xx(0, 1);
        assert_eq!(t.x_output(0).to_string(), "+X_");
        assert_eq!(t.z_output(0).to_string(), "-YX");
        assert_eq!(t.z_output(1).to_string(), "-XY");

        let mut t = Tableau::identity(2);
        t.prepend_sqrt_zz(0, 1);
        assert_eq!(t.x_output(0).to_string(), "+YZ");
        assert_eq!(t.x_output(1).to_string(), "+ZY");
        assert_eq!(t.z_output(0).to_string(), "+Z_");

        let mut t = Tableau::identity(2);
        t.prepend_iswap(0, 1);
        assert_eq!(t.x_output(0).to_string(), "+ZY");
        assert_eq!(t.z_output(0).to_string(), "+_Z");
        assert_eq!(t.x_output(1).to_string(), "+YZ");
        assert_eq!(t.z_output(1).to_string(), "+Z_");
    }

    #[test]
    fn all_gates_keep_invariants_and_invert() {
        use tangle_circuit::gates::GateId::*;
        let one_qubit = [I, X, Y, Z, H, HXY, HYZ, CXYZ, CZYX, SqrtX, SqrtXDag, SqrtY, SqrtYDag, S, SDag];
        for gate in one_qubit {
            let t = Tableau::for_gate(gate).unwrap();
            assert!(t.satisfies_invariants(), "{gate:?}");
            let inv_gate = gate.inverse_id().unwrap();
            let ti = Tableau::for_gate(inv_gate).unwrap();
            assert_eq!(t.then(&ti), Tableau::identity(1), "{gate:?}");
            assert_eq!(t.then(&t.inverse(false)), Tableau::identity(1), "{gate:?}");
        }
        let two_qubit = [
            CX, CY, CZ, XCX, XCY, XCZ, YCX, YCY, YCZ, Swap, ISwap, ISwapDag, SqrtXX, SqrtXXDag,
            SqrtYY, SqrtYYDag, SqrtZZ, SqrtZZDag,
        ];
        for gate in two_qubit {
            let t = Tableau::for_gate(gate).unwrap();
            assert!(t.satisfies_invariants(), "{gate:?}");
            let inv_gate = gate.inverse_id().unwrap();
            let ti = Tableau::for_gate(inv_gate).unwrap();
            assert_eq!(t.then(&ti), Tableau::identity(2), "{gate:?}");
            assert_eq!(t.then(&t.inverse(false)), Tableau::identity(2), "{gate:?}");
        }
    }

    #[test]
    fn inverse_round_trips_on_random_tableaus() {
        let mut rng = SimRng::seed_from_u64(11);
        for n in [1, 2, 5, 9] {
            let t = Tableau::random(n, &mut rng);
            assert!(t.satisfies_invariants(), "n={n}");
            let inv = t.inverse(false);
            assert_eq!(t.then(&inv), Tableau::identity(n), "n={n}");
            assert_eq!(inv.then(&t), Tableau::identity(n), "n={n}");
        }
    }

    #[test]
    fn raised_to_matches_composition() {
        let mut rng = SimRng::seed_from_u64(12);
        let t = Tableau::random(4, &mut rng);
        let t3 = t.then(&t).then(&t);
        assert_eq!(t.raised_to(3), t3);
        assert_eq!(t.raised_to(1), t);
        assert_eq!(t.raised_to(0), Tableau::identity(4));
        assert_eq!(t.raised_to(-1), t.inverse(false));
        assert_eq!(t.raised_to(-3), t3.inverse(false));
    }

    #[test]
    fn apply_to_conjugates() {
        let mut t = Tableau::identity(2);
        t.prepend_zcx(0, 1);
        let p = PauliString::from_str("+X_").unwrap();
        assert_eq!(t.apply_to(&p).to_string(), "+XX");
        let p = PauliString::from_str("+_Z").unwrap();
        assert_eq!(t.apply_to(&p).to_string(), "+ZZ");
        let p = PauliString::from_str("-Y_").unwrap();
        // CX conjugates Y_a to Y_a X_b.
        assert_eq!(t.apply_to(&p).to_string(), "-YX");
    }

    #[test]
    fn expand_preserves_action() {
        let mut t = Tableau::identity(1);
        t.prepend_sqrt_z(0);
        t.expand(300);
        assert_eq!(t.num_qubits, 300);
        assert_eq!(t.x_output(0).xz(0), (true, true));
        assert_eq!(t.x_output(299).xz(299), (true, false));
        assert!(t.satisfies_invariants());
    }

    #[test]
    fn scatter_prepend_matches_direct_prepend() {
        let mut rng = SimRng::seed_from_u64(13);
        let base = Tableau::random(4, &mut rng);
        let cx = Tableau::for_gate(GateId::CX).unwrap();
        let mut a = base.clone();
        a.inplace_scatter_prepend(&cx, &[2, 0]);
        let mut b = base.clone();
        b.prepend_zcx(2, 0);
        assert_eq!(a, b);
    }

    #[test]
    fn from_pauli_string_signs() {
        let p = PauliString::from_str("+XZY").unwrap();
        let t = Tableau::from_pauli_string(&p);
        // Conjugating by X flips Z and vice versa; Y flips both.
        assert_eq!(t.x_output(0).sign, false);
        assert_eq!(t.z_output(0).sign, true);
        assert_eq!(t.x_output(1).sign, true);
        assert_eq!(t.z_output(1).sign, false);
        assert_eq!(t.x_output(2).sign, true);
        assert_eq!(t.z_output(2).sign, true);
    }

    #[test]
    fn random_tableaus_differ() {
        let mut rng = SimRng::seed_from_u64(14);
        let a = Tableau::random(6, &mut rng);
        let b = Tableau::random(6, &mut rng);
        assert_ne!(a, b);
    }
}
