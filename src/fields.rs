// Here reside the definitions of the operand fields shared across operation classes; rather than
// have magic numbers everywhere, we opt for rich types wherever it is not too ridiculous.
// The codec's decode/encode paths then become the naturally messy code responsible for
// constructing and tearing down these types.

use crate::binary::{rotate_left_u32, rotate_right_u32};
use crate::instructions::CoreRegister;

/// How the second ALU/compare/transfer-offset operand is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShifterMode {
    ImmediateConstant,
    Register,
    ShiftByRegister,
    ShiftByConstant,
    RotateWithExtend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftType {
    Lsl,
    Lsr,
    Asr,
    Ror,
    Rrx,
    None,
}

/// The "operand 2" of a data-processing instruction, or the offset of an addressing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShifterOperand {
    pub mode: ShifterMode,
    pub shift: ShiftType,
    pub rm: CoreRegister,
    pub rs: CoreRegister,
    pub immediate: u32,
}

impl ShifterOperand {
    /// A plain register with no shift: `<Rm>`.
    pub fn register(rm: CoreRegister) -> Self {
        ShifterOperand { mode: ShifterMode::Register, shift: ShiftType::None, rm, rs: CoreRegister::R0, immediate: 0 }
    }

    /// A rotated 8-bit immediate constant, as carried by data-processing immediate encodings.
    pub fn immediate_constant(value: u32) -> Self {
        ShifterOperand {
            mode: ShifterMode::ImmediateConstant,
            shift: ShiftType::None,
            rm: CoreRegister::R0,
            rs: CoreRegister::R0,
            immediate: value,
        }
    }

    /// `<Rm>, <shift> #<amount>`.
    pub fn shift_by_constant(rm: CoreRegister, shift: ShiftType, amount: u32) -> Self {
        ShifterOperand { mode: ShifterMode::ShiftByConstant, shift, rm, rs: CoreRegister::R0, immediate: amount }
    }

    /// `<Rm>, <shift> <Rs>`.
    pub fn shift_by_register(rm: CoreRegister, shift: ShiftType, rs: CoreRegister) -> Self {
        ShifterOperand { mode: ShifterMode::ShiftByRegister, shift, rm, rs, immediate: 0 }
    }

    /// `<Rm>, RRX`.
    pub fn rotate_with_extend(rm: CoreRegister) -> Self {
        ShifterOperand { mode: ShifterMode::RotateWithExtend, shift: ShiftType::Rrx, rm, rs: CoreRegister::R0, immediate: 0 }
    }

    /// Canonicalise decode-time quirks: `LSL #0` collapses to a bare register; `LSR/ASR #0`
    /// (which the encoding cannot otherwise represent) means `#32`; `ROR #0` means `RRX`.
    pub fn canonicalise(self) -> Self {
        if self.mode != ShifterMode::ShiftByConstant {
            return self;
        }
        match (self.shift, self.immediate) {
            (ShiftType::Lsl, 0) => ShifterOperand::register(self.rm),
            (ShiftType::Lsr, 0) => ShifterOperand::shift_by_constant(self.rm, ShiftType::Lsr, 32),
            (ShiftType::Asr, 0) => ShifterOperand::shift_by_constant(self.rm, ShiftType::Asr, 32),
            (ShiftType::Ror, 0) => ShifterOperand::rotate_with_extend(self.rm),
            _ => self,
        }
    }

    /// Evaluate a decoded `ImmediateConstant` operand's encoded rotated-byte representation
    /// into its 32-bit value: `value = ROR(imm8, rotate * 2)`.
    pub fn decode_immediate_constant(encoded: u32) -> u32 {
        let imm8 = encoded & 0xFF;
        let rotate = (encoded >> 8) & 0xF;
        rotate_right_u32(imm8, rotate * 2)
    }

    /// Find a rotation `0..=30` (even) such that rotating `value` left by that amount fits in
    /// 8 bits. Returns `(imm8, rotate_field)` where `rotate_field = rotation / 2`, matching the
    /// 4-bit rotate field of the immediate-constant encoding.
    pub fn encode_immediate_constant(value: u32) -> Option<(u32, u32)> {
        for rotate in (0..32).step_by(2) {
            let rotated = rotate_left_u32(value, rotate);
            if rotated <= 0xFF {
                return Some((rotated, rotate / 2));
            }
        }
        None
    }
}

macro_rules! bitflags_fields {
    (
        pub struct $name:ident: $repr:ty {
            $(const $variant:ident = $value:expr;)*
        }
    ) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name(pub $repr);

        impl $name {
            $(pub const $variant: $name = $name($value);)*

            pub fn contains(self, other: $name) -> bool {
                (self.0 & other.0) == other.0
            }
        }

        impl std::ops::BitOr for $name {
            type Output = $name;
            fn bitor(self, rhs: $name) -> $name {
                $name(self.0 | rhs.0)
            }
        }
    };
}

bitflags_fields! {
    pub struct AddrOperandFlags: u32 {
        const NONE = 0x00;
        const PRE_INDEXED = 0x01;
        const WRITEBACK = 0x02;
        const NEGATIVE_OFFSET = 0x04;
    }
}

/// The addressing-mode operand shared by `LDR`/`STR`, block transfer base, and co-processor
/// transfers: a base register plus a shifter-operand offset and a handful of mode flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddrOperand {
    pub rn: CoreRegister,
    pub offset: ShifterOperand,
    pub flags: AddrOperandFlags,
}

impl AddrOperand {
    pub fn is_pre_indexed(&self) -> bool {
        self.flags.contains(AddrOperandFlags::PRE_INDEXED)
    }

    pub fn has_writeback(&self) -> bool {
        self.flags.contains(AddrOperandFlags::WRITEBACK)
    }

    pub fn is_negative(&self) -> bool {
        self.flags.contains(AddrOperandFlags::NEGATIVE_OFFSET)
    }

    /// Post-indexed addressing always updates the base register; pre-indexed addressing updates
    /// it only when `Writeback` is set.
    pub fn updates_base(&self) -> bool {
        !self.is_pre_indexed() || self.has_writeback()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immediate_constant_round_trips_for_encodable_values() {
        for &value in &[0u32, 0xFF, 0x3FC, 0xFF00_0000, 0x000F_0000, 1] {
            let (imm8, rotate_field) = ShifterOperand::encode_immediate_constant(value)
                .expect("value should be encodable");
            let encoded = imm8 | (rotate_field << 8);
            assert_eq!(ShifterOperand::decode_immediate_constant(encoded), value);
        }
    }

    #[test]
    fn non_rotatable_value_is_not_encodable() {
        assert_eq!(ShifterOperand::encode_immediate_constant(0x0001_0001), None);
    }

    #[test]
    fn canonicalisation_collapses_lsl_zero() {
        let op = ShifterOperand::shift_by_constant(CoreRegister::R3, ShiftType::Lsl, 0);
        assert_eq!(op.canonicalise(), ShifterOperand::register(CoreRegister::R3));
    }

    #[test]
    fn canonicalisation_expands_lsr_zero_to_32() {
        let op = ShifterOperand::shift_by_constant(CoreRegister::R3, ShiftType::Lsr, 0);
        assert_eq!(op.canonicalise(), ShifterOperand::shift_by_constant(CoreRegister::R3, ShiftType::Lsr, 32));
    }

    #[test]
    fn canonicalisation_turns_ror_zero_into_rrx() {
        let op = ShifterOperand::shift_by_constant(CoreRegister::R3, ShiftType::Ror, 0);
        assert_eq!(op.canonicalise(), ShifterOperand::rotate_with_extend(CoreRegister::R3));
    }

    #[test]
    fn post_indexed_always_updates_base() {
        let addr = AddrOperand {
            rn: CoreRegister::R0,
            offset: ShifterOperand::immediate_constant(4),
            flags: AddrOperandFlags::NONE,
        };
        assert!(!addr.is_pre_indexed());
        assert!(addr.updates_base());
    }

    #[test]
    fn pre_indexed_without_writeback_does_not_update_base() {
        let addr = AddrOperand {
            rn: CoreRegister::R0,
            offset: ShifterOperand::immediate_constant(4),
            flags: AddrOperandFlags::PRE_INDEXED,
        };
        assert!(addr.is_pre_indexed());
        assert!(!addr.updates_base());
    }
}
