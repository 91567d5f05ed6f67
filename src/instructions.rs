//! The instruction descriptor: a tagged union over ARM operation classes, plus the small
//! register/condition/mnemonic enumerations every class is built from.

use crate::fields::{AddrOperand, ShifterOperand};

/// General-purpose and special registers, `R0..R15` plus the two banked status registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreRegister {
    R0, R1, R2, R3, R4, R5, R6, R7, R8, R9, R10, R11, R12, R13, R14, R15, Cpsr, Spsr,
}

impl CoreRegister {
    pub fn from_index(index: u32) -> CoreRegister {
        use CoreRegister::*;
        match index & 0xF {
            0 => R0, 1 => R1, 2 => R2, 3 => R3, 4 => R4, 5 => R5, 6 => R6, 7 => R7,
            8 => R8, 9 => R9, 10 => R10, 11 => R11, 12 => R12, 13 => R13, 14 => R14, 15 => R15,
            _ => unreachable!(),
        }
    }

    pub fn index(self) -> u32 {
        use CoreRegister::*;
        match self {
            R0 => 0, R1 => 1, R2 => 2, R3 => 3, R4 => 4, R5 => 5, R6 => 6, R7 => 7,
            R8 => 8, R9 => 9, R10 => 10, R11 => 11, R12 => 12, R13 => 13, R14 => 14, R15 => 15,
            Cpsr | Spsr => 16,
        }
    }

    pub fn is_pc(self) -> bool {
        self == CoreRegister::R15
    }
}

/// FPA co-processor floating-point registers `F0..F7`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpaRegister {
    F0, F1, F2, F3, F4, F5, F6, F7,
}

impl FpaRegister {
    pub fn from_index(index: u32) -> FpaRegister {
        use FpaRegister::*;
        match index & 0x7 {
            0 => F0, 1 => F1, 2 => F2, 3 => F3, 4 => F4, 5 => F5, 6 => F6, 7 => F7,
            _ => unreachable!(),
        }
    }
}

/// Generic co-processor identifiers `CP0..CP15`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoProcId(pub u8);

/// Generic co-processor registers `CR0..CR15`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoProcRegister(pub u8);

/// The 4-bit condition field every instruction carries. `Al` always executes; `Nv` never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionCode {
    Eq, Ne, Cs, Cc, Mi, Pl, Vs, Vc, Hi, Ls, Ge, Lt, Gt, Le, Al, Nv,
}

impl ConditionCode {
    /// `Hs` is an alias for `Cs`, `Lo` an alias for `Cc`; both encode identically.
    pub const HS: ConditionCode = ConditionCode::Cs;
    pub const LO: ConditionCode = ConditionCode::Cc;

    pub fn from_bits(bits: u32) -> ConditionCode {
        use ConditionCode::*;
        match bits & 0xF {
            0 => Eq, 1 => Ne, 2 => Cs, 3 => Cc, 4 => Mi, 5 => Pl, 6 => Vs, 7 => Vc,
            8 => Hi, 9 => Ls, 10 => Ge, 11 => Lt, 12 => Gt, 13 => Le, 14 => Al, 15 => Nv,
            _ => unreachable!(),
        }
    }

    pub fn bits(self) -> u32 {
        use ConditionCode::*;
        match self {
            Eq => 0, Ne => 1, Cs => 2, Cc => 3, Mi => 4, Pl => 5, Vs => 6, Vc => 7,
            Hi => 8, Ls => 9, Ge => 10, Lt => 11, Gt => 12, Le => 13, Al => 14, Nv => 15,
        }
    }

    /// Evaluate against the CPSR `N,Z,C,V` flags. Mirrors the textbook ARM condition truth table.
    pub fn evaluate(self, n: bool, z: bool, c: bool, v: bool) -> bool {
        use ConditionCode::*;
        match self {
            Eq => z,
            Ne => !z,
            Cs => c,
            Cc => !c,
            Mi => n,
            Pl => !n,
            Vs => v,
            Vc => !v,
            Hi => c && !z,
            Ls => !c || z,
            Ge => n == v,
            Lt => n != v,
            Gt => !z && (n == v),
            Le => z || (n != v),
            Al => true,
            Nv => false,
        }
    }
}

/// The mnemonic, ordered to roughly track the hardware encoding groups it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionMnemonic {
    And, Eor, Sub, Rsb, Add, Adc, Sbc, Rsc, Tst, Teq, Cmp, Cmn, Orr, Mov, Bic, Mvn,
    Mul, Mla,
    B, Bl, Bx,
    Ldr, Str,
    Ldm, Stm,
    Swi, Swp,
    Mcr, Mrc, Cdp, Ldc, Stc,
    Mrs, Msr,
    Umull, Umlal, Smull, Smlal,
    Bkpt,
    Ldf, Stf, Lfm, Sfm,
    Adf, Muf, Suf, Rsf, Dvf, Rdf, Pow, Rpw, Rmf, Fml, Fdv, Frd, Pol,
    Mvf, Mnf, Abs, Rnd, Sqt, Log, Lgn, Exp, Sin, Cos, Tan, Asn, Acs, Atn, Urd, Nrm,
    Flt, Fix, Wfs, Rfs, Wfc, Rfc,
    Cmf, Cnf, Cmfe, Cnfe,
    Adr,
}

/// A data word that failed to decode as any recognised class. Rendered by a caller as a data
/// directive of the given width (the width choice belongs to the caller, not this crate).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UndecodedWord {
    pub value: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreAlu {
    pub rd: CoreRegister,
    pub rn: CoreRegister,
    pub operand2: ShifterOperand,
    pub set_flags: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreCompare {
    pub rn: CoreRegister,
    pub operand2: ShifterOperand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreMultiply {
    pub rd: CoreRegister,
    pub rn: CoreRegister,
    pub rm: CoreRegister,
    pub rs: CoreRegister,
    pub accumulate: bool,
    pub set_flags: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LongMultiply {
    pub rd_hi: CoreRegister,
    pub rd_lo: CoreRegister,
    pub rm: CoreRegister,
    pub rs: CoreRegister,
    pub is_signed: bool,
    pub accumulate: bool,
    pub set_flags: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDataType {
    Word,
    UnsignedByte,
    SignedByte,
    UnsignedHalfWord,
    SignedHalfWord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreDataTransfer {
    pub rd: CoreRegister,
    pub addr: AddrOperand,
    pub is_load: bool,
    pub data_type: TransferDataType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiTransferMode {
    IncrementAfter,
    IncrementBefore,
    DecrementAfter,
    DecrementBefore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreMultiTransfer {
    pub rn: CoreRegister,
    pub register_list: u16,
    pub mode: MultiTransferMode,
    pub writeback: bool,
    pub is_load: bool,
    pub load_psr_or_force_user: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Branch {
    pub target_address: u32,
    pub link: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftwareIrq {
    pub comment: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breakpoint {
    pub comment: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomicSwap {
    pub rd: CoreRegister,
    pub rm: CoreRegister,
    pub rn: CoreRegister,
    pub is_byte: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PsrComponent {
    Control,
    Flags,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveFromPsr {
    pub rd: CoreRegister,
    pub use_spsr: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveToPsr {
    pub operand: ShifterOperand,
    pub use_spsr: bool,
    pub component: PsrComponent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchExchange {
    pub rm: CoreRegister,
    pub link: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoProcDataTransfer {
    pub coproc: CoProcId,
    pub cr_d: CoProcRegister,
    pub addr: AddrOperand,
    pub is_load: bool,
    pub long_transfer: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoProcRegisterTransfer {
    pub coproc: CoProcId,
    pub opcode: u8,
    pub rd: CoreRegister,
    pub cr_n: CoProcRegister,
    pub cr_m: CoProcRegister,
    pub info: u8,
    pub is_move_from_coproc: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoProcDataProcessing {
    pub coproc: CoProcId,
    pub opcode: u8,
    pub cr_d: CoProcRegister,
    pub cr_n: CoProcRegister,
    pub cr_m: CoProcRegister,
    pub info: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpaPrecision {
    Single,
    Double,
    Extended,
    Packed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpaRoundMode {
    Nearest,
    Plus,
    Minus,
    Zero,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpaDataTransfer {
    pub fd: FpaRegister,
    pub addr: AddrOperand,
    pub is_load: bool,
    pub precision: FpaPrecision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpaMultiTransfer {
    pub fd: FpaRegister,
    pub addr: AddrOperand,
    pub is_load: bool,
    pub register_count: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpaDyadicOperation {
    pub fd: FpaRegister,
    pub fn_: FpaRegister,
    pub fm: FpaRegister,
    pub immediate: Option<u8>,
    pub precision: FpaPrecision,
    pub rounding: FpaRoundMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpaMonadicOperation {
    pub fd: FpaRegister,
    pub fm: FpaRegister,
    pub immediate: Option<u8>,
    pub precision: FpaPrecision,
    pub rounding: FpaRoundMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpaRegisterTransfer {
    pub rd: CoreRegister,
    pub fn_: FpaRegister,
    pub immediate: Option<u8>,
    pub rounding: FpaRoundMode,
    pub is_move_from_fpa: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpaComparison {
    pub fn_: FpaRegister,
    pub fm: FpaRegister,
    pub immediate: Option<u8>,
    pub signal_exceptions: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdrPseudo {
    pub rd: CoreRegister,
    pub target_address: u32,
}

/// One instruction's full payload: the condition field is separate ([`ConditionCode`] in
/// [`Instruction`]) since almost every variant carries one; the rest is class-specific.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperationClass {
    None(UndecodedWord),
    CoreAlu(CoreAlu),
    CoreCompare(CoreCompare),
    CoreMultiply(CoreMultiply),
    LongMultiply(LongMultiply),
    CoreDataTransfer(CoreDataTransfer),
    CoreMultiTransfer(CoreMultiTransfer),
    Branch(Branch),
    SoftwareIrq(SoftwareIrq),
    Breakpoint(Breakpoint),
    AtomicSwap(AtomicSwap),
    MoveFromPsr(MoveFromPsr),
    MoveToPsr(MoveToPsr),
    BranchExchange(BranchExchange),
    CoProcDataTransfer(CoProcDataTransfer),
    CoProcRegisterTransfer(CoProcRegisterTransfer),
    CoProcDataProcessing(CoProcDataProcessing),
    FpaDataTransfer(FpaDataTransfer),
    FpaMultiTransfer(FpaMultiTransfer),
    FpaDyadicOperation(FpaDyadicOperation),
    FpaMonadicOperation(FpaMonadicOperation),
    FpaRegisterTransfer(FpaRegisterTransfer),
    FpaComparison(FpaComparison),
    Adr(AdrPseudo),
}

/// A complete decoded or to-be-encoded instruction: condition, mnemonic, and operation class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Instruction {
    pub condition: ConditionCode,
    pub mnemonic: InstructionMnemonic,
    pub class: OperationClass,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn al_always_true_nv_always_false() {
        for n in [false, true] {
            for z in [false, true] {
                for c in [false, true] {
                    for v in [false, true] {
                        assert!(ConditionCode::Al.evaluate(n, z, c, v));
                        assert!(!ConditionCode::Nv.evaluate(n, z, c, v));
                    }
                }
            }
        }
    }

    #[test]
    fn hs_lo_are_aliases() {
        assert_eq!(ConditionCode::HS, ConditionCode::Cs);
        assert_eq!(ConditionCode::LO, ConditionCode::Cc);
    }

    #[test]
    fn condition_bits_round_trip() {
        for bits in 0..16u32 {
            let c = ConditionCode::from_bits(bits);
            assert_eq!(c.bits(), bits);
        }
    }

    #[test]
    fn ge_matches_signed_comparison_definition() {
        // GE: N == V, covering both "both clear" and "both set" cases.
        assert!(ConditionCode::Ge.evaluate(false, false, false, false));
        assert!(ConditionCode::Ge.evaluate(true, false, false, true));
        assert!(!ConditionCode::Ge.evaluate(true, false, false, false));
    }
}
