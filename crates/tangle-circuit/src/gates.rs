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

use std::collections::HashMap;

use lazy_static::lazy_static;

/// Every gate the parser and the three engines understand.
///
/// The enum discriminant doubles as the index into the registry's gate
/// table, so the simulators can dispatch with a plain `match` and the
/// registry can look metadata up in O(1).
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[repr(u8)]
pub enum GateId {
    // Paulis.
    I,
    X,
    Y,
    Z,
    // Hadamard-like.
    H,
    HXY,
    HYZ,
    // Period 3.
    CXYZ,
    CZYX,
    // Period 4.
    SqrtX,
    SqrtXDag,
    SqrtY,
    SqrtYDag,
    S,
    SDag,
    // Two-qubit Cliffords.
    CX,
    CY,
    CZ,
    XCX,
    XCY,
    XCZ,
    YCX,
    YCY,
    YCZ,
    Swap,
    ISwap,
    ISwapDag,
    SqrtXX,
    SqrtXXDag,
    SqrtYY,
    SqrtYYDag,
    SqrtZZ,
    SqrtZZDag,
    // Collapsing gates.
    MX,
    MY,
    MZ,
    RX,
    RY,
    RZ,
    MRX,
    MRY,
    MRZ,
    // Noise channels.
    XError,
    YError,
    ZError,
    Depolarize1,
    Depolarize2,
    PauliChannel1,
    PauliChannel2,
    CorrelatedError,
    ElseCorrelatedError,
    // Annotations.
    Detector,
    ObservableInclude,
    Tick,
    QubitCoords,
    ShiftCoords,
    // Blocks.
    Repeat,
}

pub const NUM_GATES: usize = GateId::Repeat as usize + 1;

/// Behavioral flag bits attached to each gate.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct GateFlags(pub u16);

impl GateFlags {
    pub const NONE: GateFlags = GateFlags(0);
    /// A Clifford unitary; has a tableau and frame update.
    pub const UNITARY: GateFlags = GateFlags(1 << 0);
    /// Omitted when computing a reference sample.
    pub const NOISE: GateFlags = GateFlags(1 << 1);
    /// Pushes results into the measurement record.
    pub const PRODUCES_RESULTS: GateFlags = GateFlags(1 << 2);
    /// Adjacent same-gate lines must not be merged.
    pub const NOT_FUSABLE: GateFlags = GateFlags(1 << 3);
    /// A block instruction (`REPEAT`).
    pub const IS_BLOCK: GateFlags = GateFlags(1 << 4);
    /// Targets come in pairs and a pair must not repeat a target.
    pub const TARGETS_PAIRS: GateFlags = GateFlags(1 << 5);
    /// Targets are Pauli-product components like `X1 Y2 Z3`.
    pub const TARGETS_PAULI_STRING: GateFlags = GateFlags(1 << 6);
    /// Targets are exclusively `rec[-k]` lookbacks.
    pub const ONLY_TARGETS_MEASUREMENT_RECORD: GateFlags = GateFlags(1 << 7);
    /// A `rec[-k]` control is accepted in place of a qubit (CX/CY/CZ).
    pub const CAN_TARGET_MEASUREMENT_RECORD: GateFlags = GateFlags(1 << 8);
    /// Parens arguments are probabilities of disjoint cases.
    pub const ARGS_ARE_DISJOINT_PROBABILITIES: GateFlags = GateFlags(1 << 9);
    /// The instruction takes no targets at all.
    pub const TAKES_NO_TARGETS: GateFlags = GateFlags(1 << 10);

    #[must_use]
    pub const fn union(self, other: GateFlags) -> GateFlags {
        GateFlags(self.0 | other.0)
    }

    #[inline]
    #[must_use]
    pub const fn contains(self, other: GateFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    #[must_use]
    pub const fn intersects(self, other: GateFlags) -> bool {
        self.0 & other.0 != 0
    }
}

/// How many parens arguments a gate takes.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ArgCount {
    Fixed(u8),
    /// Zero or one argument (measurement error probability).
    Optional,
    /// Any number of arguments (coordinates).
    Variable,
}

/// Registry metadata for one gate.
#[derive(Clone, Debug)]
pub struct GateData {
    pub id: GateId,
    pub name: &'static str,
    pub flags: GateFlags,
    pub arg_count: ArgCount,
}

/// The fixed gate set, with case-insensitive name and alias lookup.
pub struct GateRegistry {
    gates: Vec<GateData>,
    by_name: HashMap<&'static str, GateId>,
}

impl GateRegistry {
    fn add(&mut self, id: GateId, name: &'static str, flags: GateFlags, arg_count: ArgCount) {
        debug_assert_eq!(self.gates.len(), id as usize);
        self.gates.push(GateData {
            id,
            name,
            flags,
            arg_count,
        });
        let prior = self.by_name.insert(name, id);
        debug_assert!(prior.is_none());
    }

    fn add_alias(&mut self, alias: &'static str, id: GateId) {
        let prior = self.by_name.insert(alias, id);
        debug_assert!(prior.is_none());
    }

    fn build() -> Self {
        use GateFlags as F;
        let mut reg = GateRegistry {
            gates: Vec::with_capacity(NUM_GATES),
            by_name: HashMap::new(),
        };
        let u = F::UNITARY;
        let u2 = F::UNITARY.union(F::TARGETS_PAIRS);
        let noise1 = F::NOISE.union(F::ARGS_ARE_DISJOINT_PROBABILITIES);
        let m = F::PRODUCES_RESULTS.union(F::ARGS_ARE_DISJOINT_PROBABILITIES);

        reg.add(GateId::I, "I", u, ArgCount::Fixed(0));
        reg.add(GateId::X, "X", u, ArgCount::Fixed(0));
        reg.add(GateId::Y, "Y", u, ArgCount::Fixed(0));
        reg.add(GateId::Z, "Z", u, ArgCount::Fixed(0));

        reg.add(GateId::H, "H", u, ArgCount::Fixed(0));
        reg.add(GateId::HXY, "H_XY", u, ArgCount::Fixed(0));
        reg.add(GateId::HYZ, "H_YZ", u, ArgCount::Fixed(0));

        reg.add(GateId::CXYZ, "C_XYZ", u, ArgCount::Fixed(0));
        reg.add(GateId::CZYX, "C_ZYX", u, ArgCount::Fixed(0));

        reg.add(GateId::SqrtX, "SQRT_X", u, ArgCount::Fixed(0));
        reg.add(GateId::SqrtXDag, "SQRT_X_DAG", u, ArgCount::Fixed(0));
        reg.add(GateId::SqrtY, "SQRT_Y", u, ArgCount::Fixed(0));
        reg.add(GateId::SqrtYDag, "SQRT_Y_DAG", u, ArgCount::Fixed(0));
        reg.add(GateId::S, "S", u, ArgCount::Fixed(0));
        reg.add(GateId::SDag, "S_DAG", u, ArgCount::Fixed(0));

        let record_control = u2.union(F::CAN_TARGET_MEASUREMENT_RECORD);
        reg.add(GateId::CX, "CX", record_control, ArgCount::Fixed(0));
        reg.add(GateId::CY, "CY", record_control, ArgCount::Fixed(0));
        reg.add(GateId::CZ, "CZ", record_control, ArgCount::Fixed(0));
        reg.add(GateId::XCX, "XCX", u2, ArgCount::Fixed(0));
        reg.add(GateId::XCY, "XCY", u2, ArgCount::Fixed(0));
        reg.add(GateId::XCZ, "XCZ", u2, ArgCount::Fixed(0));
        reg.add(GateId::YCX, "YCX", u2, ArgCount::Fixed(0));
        reg.add(GateId::YCY, "YCY", u2, ArgCount::Fixed(0));
        reg.add(GateId::YCZ, "YCZ", u2, ArgCount::Fixed(0));
        reg.add(GateId::Swap, "SWAP", u2, ArgCount::Fixed(0));
        reg.add(GateId::ISwap, "ISWAP", u2, ArgCount::Fixed(0));
        reg.add(GateId::ISwapDag, "ISWAP_DAG", u2, ArgCount::Fixed(0));
        reg.add(GateId::SqrtXX, "SQRT_XX", u2, ArgCount::Fixed(0));
        reg.add(GateId::SqrtXXDag, "SQRT_XX_DAG", u2, ArgCount::Fixed(0));
        reg.add(GateId::SqrtYY, "SQRT_YY", u2, ArgCount::Fixed(0));
        reg.add(GateId::SqrtYYDag, "SQRT_YY_DAG", u2, ArgCount::Fixed(0));
        reg.add(GateId::SqrtZZ, "SQRT_ZZ", u2, ArgCount::Fixed(0));
        reg.add(GateId::SqrtZZDag, "SQRT_ZZ_DAG", u2, ArgCount::Fixed(0));

        reg.add(GateId::MX, "MX", m, ArgCount::Optional);
        reg.add(GateId::MY, "MY", m, ArgCount::Optional);
        reg.add(GateId::MZ, "M", m, ArgCount::Optional);
        reg.add(GateId::RX, "RX", F::NONE, ArgCount::Fixed(0));
        reg.add(GateId::RY, "RY", F::NONE, ArgCount::Fixed(0));
        reg.add(GateId::RZ, "R", F::NONE, ArgCount::Fixed(0));
        reg.add(GateId::MRX, "MRX", m, ArgCount::Optional);
        reg.add(GateId::MRY, "MRY", m, ArgCount::Optional);
        reg.add(GateId::MRZ, "MR", m, ArgCount::Optional);

        reg.add(GateId::XError, "X_ERROR", noise1, ArgCount::Fixed(1));
        reg.add(GateId::YError, "Y_ERROR", noise1, ArgCount::Fixed(1));
        reg.add(GateId::ZError, "Z_ERROR", noise1, ArgCount::Fixed(1));
        reg.add(GateId::Depolarize1, "DEPOLARIZE1", noise1, ArgCount::Fixed(1));
        reg.add(
            GateId::Depolarize2,
            "DEPOLARIZE2",
            noise1.union(F::TARGETS_PAIRS),
            ArgCount::Fixed(1),
        );
        reg.add(
            GateId::PauliChannel1,
            "PAULI_CHANNEL_1",
            noise1,
            ArgCount::Fixed(3),
        );
        reg.add(
            GateId::PauliChannel2,
            "PAULI_CHANNEL_2",
            noise1.union(F::TARGETS_PAIRS),
            ArgCount::Fixed(15),
        );
        let correlated = noise1.union(F::TARGETS_PAULI_STRING).union(F::NOT_FUSABLE);
        reg.add(GateId::CorrelatedError, "E", correlated, ArgCount::Fixed(1));
        reg.add(
            GateId::ElseCorrelatedError,
            "ELSE_CORRELATED_ERROR",
            correlated,
            ArgCount::Fixed(1),
        );

        let record_only = F::ONLY_TARGETS_MEASUREMENT_RECORD.union(F::NOT_FUSABLE);
        reg.add(GateId::Detector, "DETECTOR", record_only, ArgCount::Variable);
        reg.add(
            GateId::ObservableInclude,
            "OBSERVABLE_INCLUDE",
            record_only,
            ArgCount::Fixed(1),
        );
        reg.add(
            GateId::Tick,
            "TICK",
            F::NOT_FUSABLE.union(F::TAKES_NO_TARGETS),
            ArgCount::Fixed(0),
        );
        reg.add(
            GateId::QubitCoords,
            "QUBIT_COORDS",
            F::NOT_FUSABLE,
            ArgCount::Variable,
        );
        reg.add(
            GateId::ShiftCoords,
            "SHIFT_COORDS",
            F::NOT_FUSABLE.union(F::TAKES_NO_TARGETS),
            ArgCount::Variable,
        );

        reg.add(
            GateId::Repeat,
            "REPEAT",
            F::IS_BLOCK.union(F::NOT_FUSABLE),
            ArgCount::Fixed(0),
        );

        reg.add_alias("H_XZ", GateId::H);
        reg.add_alias("SQRT_Z", GateId::S);
        reg.add_alias("SQRT_Z_DAG", GateId::SDag);
        reg.add_alias("CNOT", GateId::CX);
        reg.add_alias("ZCX", GateId::CX);
        reg.add_alias("ZCY", GateId::CY);
        reg.add_alias("ZCZ", GateId::CZ);
        reg.add_alias("MZ", GateId::MZ);
        reg.add_alias("RZ", GateId::RZ);
        reg.add_alias("MRZ", GateId::MRZ);
        reg.add_alias("CORRELATED_ERROR", GateId::CorrelatedError);

        reg
    }

    /// Case-insensitive name or alias lookup.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<GateId> {
        if let Some(&id) = self.by_name.get(name) {
            return Some(id);
        }
        let upper = name.to_ascii_uppercase();
        self.by_name.get(upper.as_str()).copied()
    }

    #[must_use]
    pub fn data(&self, id: GateId) -> &GateData {
        &self.gates[id as usize]
    }
}

lazy_static! {
    /// The process-wide gate registry, built once on first use.
    pub static ref GATE_DATA: GateRegistry = GateRegistry::build();
}

impl GateId {
    #[must_use]
    pub fn data(self) -> &'static GateData {
        GATE_DATA.data(self)
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        self.data().name
    }

    #[must_use]
    pub fn flags(self) -> GateFlags {
        self.data().flags
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<GateId> {
        GATE_DATA.lookup(name)
    }

    /// The inverse of a unitary gate. `None` for non-unitary instructions.
    #[must_use]
    pub fn inverse_id(self) -> Option<GateId> {
        if !self.flags().contains(GateFlags::UNITARY) {
            return None;
        }
        Some(match self {
            GateId::S => GateId::SDag,
            GateId::SDag => GateId::S,
            GateId::SqrtX => GateId::SqrtXDag,
            GateId::SqrtXDag => GateId::SqrtX,
            GateId::SqrtY => GateId::SqrtYDag,
            GateId::SqrtYDag => GateId::SqrtY,
            GateId::CXYZ => GateId::CZYX,
            GateId::CZYX => GateId::CXYZ,
            GateId::ISwap => GateId::ISwapDag,
            GateId::ISwapDag => GateId::ISwap,
            GateId::SqrtXX => GateId::SqrtXXDag,
            GateId::SqrtXXDag => GateId::SqrtXX,
            GateId::SqrtYY => GateId::SqrtYYDag,
            GateId::SqrtYYDag => GateId::SqrtYY,
            GateId::SqrtZZ => GateId::SqrtZZDag,
            GateId::SqrtZZDag => GateId::SqrtZZ,
            self_inverse => self_inverse,
        })
    }
}
