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

use tangle_core::bits::word;

use crate::tableau::{Tableau, TableauHalf};

/// Guard that keeps a tableau's quadrants transposed for its lifetime.
///
/// While transposed, a quadrant row holds one qubit's column of the original
/// layout, which turns per-row sign updates of start-of-time ("append")
/// operations into single vectorized row sweeps. The quadrants are
/// re-transposed when the guard drops.
pub struct TransposedTableau<'a> {
    pub tableau: &'a mut Tableau,
}

fn half_append_zcx(h: &mut TableauHalf, c: usize, t: usize) {
    let w = h.xt.u64s_per_row();
    for i in 0..w {
        let x_c = h.xt.row(c)[i];
        let z_t = h.zt.row(t)[i];
        let x_t = h.xt.row(t)[i];
        let z_c = h.zt.row(c)[i];
        h.signs.u64s_mut()[i] ^= x_c & z_t & !(x_t ^ z_c);
    }
    h.zt.xor_row_into(t, c);
    h.xt.xor_row_into(c, t);
}

fn half_append_h_xz(h: &mut TableauHalf, q: usize) {
    let w = h.xt.u64s_per_row();
    for i in 0..w {
        let x = h.xt.row(q)[i];
        let z = h.zt.row(q)[i];
        h.signs.u64s_mut()[i] ^= x & z;
    }
    word::swap_slices(h.xt.row_mut(q), h.zt.row_mut(q));
}

fn half_append_h_yz(h: &mut TableauHalf, q: usize) {
    let w = h.xt.u64s_per_row();
    for i in 0..w {
        let x = h.xt.row(q)[i];
        let z = h.zt.row(q)[i];
        h.signs.u64s_mut()[i] ^= x & !z;
    }
    word::xor_into(h.xt.row_mut(q), h.zt.row(q));
}

fn half_append_x(h: &mut TableauHalf, q: usize) {
    let w = h.xt.u64s_per_row();
    for i in 0..w {
        let z = h.zt.row(q)[i];
        h.signs.u64s_mut()[i] ^= z;
    }
}

impl<'a> TransposedTableau<'a> {
    pub fn new(tableau: &'a mut Tableau) -> Self {
        tableau.do_transpose_quadrants();
        TransposedTableau { tableau }
    }

    /// Conjugates every generator image by a CX at the start of time.
    pub fn append_zcx(&mut self, control: usize, target: usize) {
        half_append_zcx(&mut self.tableau.xs, control, target);
        half_append_zcx(&mut self.tableau.zs, control, target);
    }

    /// Conjugates every generator image by an H at the start of time.
    pub fn append_h_xz(&mut self, q: usize) {
        half_append_h_xz(&mut self.tableau.xs, q);
        half_append_h_xz(&mut self.tableau.zs, q);
    }

    /// Conjugates every generator image by an H_YZ at the start of time.
    pub fn append_h_yz(&mut self, q: usize) {
        half_append_h_yz(&mut self.tableau.xs, q);
        half_append_h_yz(&mut self.tableau.zs, q);
    }

    /// Conjugates every generator image by an X at the start of time.
    pub fn append_x(&mut self, q: usize) {
        half_append_x(&mut self.tableau.xs, q);
        half_append_x(&mut self.tableau.zs, q);
    }
}

impl Drop for TransposedTableau<'_> {
    fn drop(&mut self) {
        self.tableau.do_transpose_quadrants();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use tangle_core::SimRng;

    #[test]
    fn guard_restores_layout() {
        let mut rng = SimRng::seed_from_u64(3);
        let t = Tableau::random(5, &mut rng);
        let mut copy = t.clone();
        {
            let _guard = TransposedTableau::new(&mut copy);
        }
        assert_eq!(copy, t);
    }

    #[test]
    fn transposed_append_matches_scatter_append() {
        use tangle_circuit::GateId;
        let mut rng = SimRng::seed_from_u64(4);
        let base = Tableau::random(4, &mut rng);

        // append CX via the transposed fast path
        let mut a = base.clone();
        {
            let mut guard = TransposedTableau::new(&mut a);
            guard.append_zcx(1, 3);
        }
        // versus the generic composition path
        let mut b = base.clone();
        b.inplace_scatter_append(&Tableau::for_gate(GateId::CX).unwrap(), &[1, 3]);
        assert_eq!(a, b);

        let mut a = base.clone();
        {
            let mut guard = TransposedTableau::new(&mut a);
            guard.append_h_xz(2);
        }
        let mut b = base.clone();
        b.inplace_scatter_append(&Tableau::for_gate(GateId::H).unwrap(), &[2]);
        assert_eq!(a, b);

        let mut a = base.clone();
        {
            let mut guard = TransposedTableau::new(&mut a);
            guard.append_h_yz(0);
        }
        let mut b = base.clone();
        b.inplace_scatter_append(&Tableau::for_gate(GateId::HYZ).unwrap(), &[0]);
        assert_eq!(a, b);

        let mut a = base.clone();
        {
            let mut guard = TransposedTableau::new(&mut a);
            guard.append_x(2);
        }
        let mut b = base.clone();
        b.inplace_scatter_append(&Tableau::for_gate(GateId::X).unwrap(), &[2]);
        assert_eq!(a, b);
    }
}
