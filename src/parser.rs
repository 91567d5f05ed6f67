// This is where the dirty grunt work of making sense of our binary input happens: pulling apart
// 32-bit ARM machine words into the rich `Instruction` descriptors defined in `instructions.rs`.
//
// Primary dispatch is on bits 27-25 of the first word, matching the hardware encoding groups:
//   000  data processing (register operand2) / multiply / long multiply / swap / half-word
//   001  data processing (immediate operand2) / MSR immediate
//   010  single data transfer, immediate offset
//   011  single data transfer, register offset
//   100  block data transfer
//   101  branch (with link)
//   110  co-processor data transfer
//   111  co-processor register transfer / data processing, or SWI

use crate::fields::{AddrOperand, AddrOperandFlags, ShifterMode, ShifterOperand, ShiftType};
use crate::instructions::*;
use crate::options::Options;

/// Result of a single disassembly step: the decoded instruction plus how many 32-bit words it consumed.
pub struct Decoded {
    pub instruction: Instruction,
    pub words_consumed: usize,
}

fn bits(word: u32, hi: u32, lo: u32) -> u32 {
    (word >> lo) & ((1 << (hi - lo + 1)) - 1)
}

fn bit(word: u32, n: u32) -> bool {
    (word >> n) & 1 != 0
}

fn reg(word: u32, lo: u32) -> CoreRegister {
    CoreRegister::from_index(bits(word, lo + 3, lo))
}

fn core_alu_mnemonic(opcode: u32) -> InstructionMnemonic {
    use InstructionMnemonic::*;
    match opcode {
        0 => And, 1 => Eor, 2 => Sub, 3 => Rsb, 4 => Add, 5 => Adc, 6 => Sbc, 7 => Rsc,
        8 => Tst, 9 => Teq, 10 => Cmp, 11 => Cmn, 12 => Orr, 13 => Mov, 14 => Bic, 15 => Mvn,
        _ => unreachable!(),
    }
}

fn is_compare_opcode(opcode: u32) -> bool {
    (8..=11).contains(&opcode)
}

fn decode_shift_type(bits2: u32) -> ShiftType {
    match bits2 {
        0 => ShiftType::Lsl,
        1 => ShiftType::Lsr,
        2 => ShiftType::Asr,
        3 => ShiftType::Ror,
        _ => unreachable!(),
    }
}

fn decode_operand2_register_form(word: u32) -> ShifterOperand {
    let rm = reg(word, 0);
    let shift_type = decode_shift_type(bits(word, 6, 5));
    if bit(word, 4) {
        let rs = reg(word, 8);
        ShifterOperand::shift_by_register(rm, shift_type, rs)
    } else {
        let amount = bits(word, 11, 7);
        ShifterOperand::shift_by_constant(rm, shift_type, amount).canonicalise()
    }
}

fn decode_operand2_immediate_form(word: u32) -> ShifterOperand {
    let encoded = bits(word, 11, 0);
    let value = ShifterOperand::decode_immediate_constant(encoded);
    ShifterOperand::immediate_constant(value)
}

fn decode_addr_operand(word: u32, offset: ShifterOperand) -> AddrOperand {
    let rn = reg(word, 16);
    let mut flags = AddrOperandFlags::NONE;
    if bit(word, 24) {
        flags = flags | AddrOperandFlags::PRE_INDEXED;
    }
    if bit(word, 21) {
        flags = flags | AddrOperandFlags::WRITEBACK;
    }
    if !bit(word, 23) {
        flags = flags | AddrOperandFlags::NEGATIVE_OFFSET;
    }
    AddrOperand { rn, offset, flags }
}

fn multi_transfer_mode(p: bool, u: bool) -> MultiTransferMode {
    match (p, u) {
        (false, true) => MultiTransferMode::IncrementAfter,
        (true, true) => MultiTransferMode::IncrementBefore,
        (false, false) => MultiTransferMode::DecrementAfter,
        (true, false) => MultiTransferMode::DecrementBefore,
    }
}

fn fpa_dyadic_mnemonic(opcode: u32) -> InstructionMnemonic {
    use InstructionMnemonic::*;
    [Adf, Muf, Suf, Rsf, Dvf, Rdf, Pow, Rpw, Rmf, Fml, Fdv, Frd, Pol][opcode as usize]
}

fn fpa_monadic_mnemonic(opcode: u32) -> InstructionMnemonic {
    use InstructionMnemonic::*;
    [Mvf, Mnf, Abs, Rnd, Sqt, Log, Lgn, Exp, Sin, Cos, Tan, Asn, Acs, Atn, Urd, Nrm][opcode as usize]
}

fn fpa_precision(p_bit: bool, length_bits: u32) -> crate::instructions::FpaPrecision {
    use crate::instructions::FpaPrecision::*;
    match (p_bit, length_bits) {
        (false, 0) => Single,
        (false, 1) => Double,
        (true, _) => Extended,
        _ => Packed,
    }
}

fn fpa_rounding(bits2: u32) -> crate::instructions::FpaRoundMode {
    use crate::instructions::FpaRoundMode::*;
    match bits2 {
        0 => Nearest,
        1 => Plus,
        2 => Minus,
        _ => Zero,
    }
}

/// Decode up to one instruction from the front of `words`, given the load address of `words[0]`
/// and the active codec [`Options`]. Always consumes at least one word. On no recognised class,
/// returns an `OperationClass::None` wrapping the raw word.
pub fn disassemble(words: &[u32], load_address: u32, options: &Options) -> Decoded {
    let word = words[0];
    let condition = ConditionCode::from_bits(bits(word, 31, 28));
    let group = bits(word, 27, 25);

    let (mnemonic, class, words_consumed) = match group {
        0b000 => decode_group_000(word, options),
        0b001 => decode_group_001(word),
        0b010 => decode_single_transfer(word, false),
        0b011 => decode_single_transfer(word, true),
        0b100 => decode_block_transfer(word),
        0b101 => decode_branch(word, load_address),
        0b110 => decode_coproc_transfer(word, options),
        0b111 => decode_group_111(word, options),
        _ => unreachable!(),
    };

    let instruction = Instruction { condition, mnemonic, class };

    if let OperationClass::CoreAlu(CoreAlu { rn: CoreRegister::R15, .. }) = instruction.class {
        if let Some(adr) = try_fold_adr(words, load_address, &instruction) {
            return adr;
        }
    }

    Decoded { instruction, words_consumed }
}

fn decode_group_000(word: u32, options: &Options) -> (InstructionMnemonic, OperationClass, usize) {
    let opcode = bits(word, 24, 21);
    let set_flags = bit(word, 20);

    // Shares its cond/opcode/S bits with the MSR register-form encoding below (both have
    // opcode 1001 with S=0 and bits 21:20 = 10); bits 7:4 = 0111 is what sets BKPT apart.
    if bits(word, 27, 20) == 0b0001_0010 && bits(word, 7, 4) == 0b0111 && options.allows_breakpoint() {
        return decode_breakpoint(word);
    }

    if bits(word, 7, 4) == 0b1001 {
        return match bits(word, 24, 23) {
            0b00 => decode_multiply(word),
            0b01 => decode_long_multiply(word, options),
            0b10 => decode_swap(word),
            _ => (InstructionMnemonic::Mov, OperationClass::None(UndecodedWord { value: word }), 1),
        };
    }

    if bit(word, 7) && bit(word, 4) && bits(word, 6, 5) != 0b00 {
        return decode_half_word_transfer(word);
    }

    if !set_flags && is_compare_opcode(opcode) && options.allows_psr_transfer() {
        if bits(word, 21, 20) == 0b10 {
            return decode_psr_transfer(word, false);
        }
    }

    if bits(word, 27, 4) == 0b0001_0010_1111_1111_1111 && options.allows_breakpoint() {
        // BX Rm
        return (InstructionMnemonic::Bx, OperationClass::BranchExchange(BranchExchange {
            rm: reg(word, 0),
            link: false,
        }), 1);
    }

    let operand2 = decode_operand2_register_form(word);
    decode_core_alu(word, opcode, set_flags, operand2)
}

fn decode_group_001(word: u32) -> (InstructionMnemonic, OperationClass, usize) {
    let opcode = bits(word, 24, 21);
    let set_flags = bit(word, 20);
    if !set_flags && bits(word, 21, 20) == 0b10 {
        return decode_psr_transfer(word, true);
    }
    let operand2 = decode_operand2_immediate_form(word);
    decode_core_alu(word, opcode, set_flags, operand2)
}

fn decode_core_alu(word: u32, opcode: u32, set_flags: bool, operand2: ShifterOperand) -> (InstructionMnemonic, OperationClass, usize) {
    let mnemonic = core_alu_mnemonic(opcode);
    let rd = reg(word, 12);
    let rn = reg(word, 16);
    if is_compare_opcode(opcode) {
        (mnemonic, OperationClass::CoreCompare(CoreCompare { rn, operand2 }), 1)
    } else {
        (mnemonic, OperationClass::CoreAlu(CoreAlu { rd, rn, operand2, set_flags }), 1)
    }
}

fn decode_multiply(word: u32) -> (InstructionMnemonic, OperationClass, usize) {
    let accumulate = bit(word, 21);
    let set_flags = bit(word, 20);
    let rd = reg(word, 16);
    let rn = reg(word, 12);
    let rs = reg(word, 8);
    let rm = reg(word, 0);
    let mnemonic = if accumulate { InstructionMnemonic::Mla } else { InstructionMnemonic::Mul };
    (mnemonic, OperationClass::CoreMultiply(CoreMultiply { rd, rn, rm, rs, accumulate, set_flags }), 1)
}

fn decode_breakpoint(word: u32) -> (InstructionMnemonic, OperationClass, usize) {
    let comment = (word & 0xF) | ((word >> 4) & 0xFFF0);
    (InstructionMnemonic::Bkpt, OperationClass::Breakpoint(Breakpoint { comment }), 1)
}

/// `LDRH`/`STRH`/`LDRSB`/`LDRSH`: a sibling of the single data transfer encoding with its offset
/// split across bits 11:8 and 3:0 (immediate form) or a bare `Rm` (register form), and its data
/// type carried in the SH bits (6:5) rather than the single-transfer encoding's B bit (22).
fn decode_half_word_transfer(word: u32) -> (InstructionMnemonic, OperationClass, usize) {
    let rd = reg(word, 12);
    let is_load = bit(word, 20);
    let offset = if bit(word, 22) {
        let imm = (bits(word, 11, 8) << 4) | bits(word, 3, 0);
        ShifterOperand::immediate_constant(imm)
    } else {
        ShifterOperand::register(reg(word, 0))
    };
    let addr = decode_addr_operand(word, offset);
    let data_type = match bits(word, 6, 5) {
        0b01 => TransferDataType::UnsignedHalfWord,
        0b10 => TransferDataType::SignedByte,
        0b11 => TransferDataType::SignedHalfWord,
        _ => unreachable!("caller guards bits 6:5 != 00"),
    };
    let mnemonic = if is_load { InstructionMnemonic::Ldr } else { InstructionMnemonic::Str };
    (mnemonic, OperationClass::CoreDataTransfer(CoreDataTransfer { rd, addr, is_load, data_type }), 1)
}

fn decode_swap(word: u32) -> (InstructionMnemonic, OperationClass, usize) {
    let rn = reg(word, 16);
    let rd = reg(word, 12);
    let rm = reg(word, 0);
    let is_byte = bit(word, 22);
    (InstructionMnemonic::Swp, OperationClass::AtomicSwap(AtomicSwap { rd, rm, rn, is_byte }), 1)
}

fn decode_long_multiply(word: u32, options: &Options) -> (InstructionMnemonic, OperationClass, usize) {
    let is_signed = bit(word, 22);
    let accumulate = bit(word, 21);
    let set_flags = bit(word, 20);
    let rd_hi = reg(word, 16);
    let rd_lo = reg(word, 12);
    let rs = reg(word, 8);
    let rm = reg(word, 0);
    let mnemonic = match (is_signed, accumulate) {
        (false, false) => InstructionMnemonic::Umull,
        (false, true) => InstructionMnemonic::Umlal,
        (true, false) => InstructionMnemonic::Smull,
        (true, true) => InstructionMnemonic::Smlal,
    };
    if !options.allows_long_multiply() {
        // Architecture too old: fall back to an undecoded word rather than panic.
        return (InstructionMnemonic::Mov, OperationClass::None(UndecodedWord { value: word }), 1);
    }
    (mnemonic, OperationClass::LongMultiply(LongMultiply { rd_hi, rd_lo, rm, rs, is_signed, accumulate, set_flags }), 1)
}

fn decode_psr_transfer(word: u32, immediate: bool) -> (InstructionMnemonic, OperationClass, usize) {
    let use_spsr = bit(word, 22);
    if bit(word, 21) {
        let operand = if immediate {
            decode_operand2_immediate_form(word)
        } else {
            ShifterOperand::register(reg(word, 0))
        };
        let component = match bits(word, 19, 16) {
            0b1111 => PsrComponent::All,
            0b0001 => PsrComponent::Control,
            _ => PsrComponent::Flags,
        };
        (InstructionMnemonic::Msr, OperationClass::MoveToPsr(MoveToPsr { operand, use_spsr, component }), 1)
    } else {
        let rd = reg(word, 12);
        (InstructionMnemonic::Mrs, OperationClass::MoveFromPsr(MoveFromPsr { rd, use_spsr }), 1)
    }
}

fn decode_single_transfer(word: u32, register_offset: bool) -> (InstructionMnemonic, OperationClass, usize) {
    let rd = reg(word, 12);
    let is_load = bit(word, 20);
    let is_byte = bit(word, 22);
    let offset = if register_offset {
        decode_operand2_register_form(word)
    } else {
        ShifterOperand::immediate_constant(bits(word, 11, 0))
    };
    let addr = decode_addr_operand(word, offset);
    let data_type = if is_byte { TransferDataType::UnsignedByte } else { TransferDataType::Word };
    let mnemonic = if is_load { InstructionMnemonic::Ldr } else { InstructionMnemonic::Str };
    (mnemonic, OperationClass::CoreDataTransfer(CoreDataTransfer { rd, addr, is_load, data_type }), 1)
}

fn decode_block_transfer(word: u32) -> (InstructionMnemonic, OperationClass, usize) {
    let p = bit(word, 24);
    let u = bit(word, 23);
    let is_load = bit(word, 20);
    let writeback = bit(word, 21);
    let load_psr_or_force_user = bit(word, 22);
    let rn = reg(word, 16);
    let register_list = bits(word, 15, 0) as u16;
    let mode = multi_transfer_mode(p, u);
    let mnemonic = if is_load { InstructionMnemonic::Ldm } else { InstructionMnemonic::Stm };
    (mnemonic, OperationClass::CoreMultiTransfer(CoreMultiTransfer { rn, register_list, mode, writeback, is_load, load_psr_or_force_user }), 1)
}

fn decode_branch(word: u32, load_address: u32) -> (InstructionMnemonic, OperationClass, usize) {
    let link = bit(word, 24);
    let raw = bits(word, 23, 0);
    let signed = ((raw << 8) as i32) >> 8;
    let target_address = (load_address as i64 + 8 + ((signed as i64) << 2)) as u32;
    let mnemonic = if link { InstructionMnemonic::Bl } else { InstructionMnemonic::B };
    (mnemonic, OperationClass::Branch(Branch { target_address, link }), 1)
}

fn decode_coproc_transfer(word: u32, options: &Options) -> (InstructionMnemonic, OperationClass, usize) {
    let coproc = CoProcId(bits(word, 11, 8) as u8);
    let is_load = bit(word, 20);
    let long_transfer = bit(word, 22);
    let cr_d = CoProcRegister(bits(word, 15, 12) as u8);
    let offset = ShifterOperand::immediate_constant(bits(word, 7, 0) << 2);
    let addr = decode_addr_operand(word, offset);

    if options.allows_fpa() && (coproc.0 == 1 || coproc.0 == 2) {
        return decode_fpa_transfer(word, is_load, addr);
    }

    let mnemonic = if is_load { InstructionMnemonic::Ldc } else { InstructionMnemonic::Stc };
    (mnemonic, OperationClass::CoProcDataTransfer(CoProcDataTransfer { coproc, cr_d, addr, is_load, long_transfer }), 1)
}

fn decode_fpa_transfer(word: u32, is_load: bool, addr: AddrOperand) -> (InstructionMnemonic, OperationClass, usize) {
    // Single-register FPA load/store form; the core spec does not model multi-register LFM/SFM
    // decoding distinctly from this path, so every CoProcDataTransfer routed here is treated as one.
    let fd = FpaRegister::from_index(bits(word, 15, 12));
    let p_bit = bit(word, 23);
    let length_bits = bits(word, 8, 7);
    let precision = fpa_precision(p_bit, length_bits);
    let mnemonic = if is_load { InstructionMnemonic::Ldf } else { InstructionMnemonic::Stf };
    (mnemonic, OperationClass::FpaDataTransfer(FpaDataTransfer { fd, addr, is_load, precision }), 1)
}

fn decode_group_111(word: u32, options: &Options) -> (InstructionMnemonic, OperationClass, usize) {
    if bit(word, 24) {
        let comment = bits(word, 23, 0);
        return (InstructionMnemonic::Swi, OperationClass::SoftwareIrq(SoftwareIrq { comment }), 1);
    }

    let coproc = CoProcId(bits(word, 11, 8) as u8);
    if options.allows_fpa() && (coproc.0 == 1 || coproc.0 == 2) {
        return decode_fpa_data_or_register_transfer(word);
    }

    if bit(word, 4) {
        decode_coproc_register_transfer(word, coproc)
    } else {
        decode_coproc_data_processing(word, coproc)
    }
}

fn decode_coproc_register_transfer(word: u32, coproc: CoProcId) -> (InstructionMnemonic, OperationClass, usize) {
    let is_move_from_coproc = bit(word, 20);
    let opcode = bits(word, 23, 21) as u8;
    let rd = reg(word, 12);
    let cr_n = CoProcRegister(bits(word, 19, 16) as u8);
    let cr_m = CoProcRegister(bits(word, 3, 0) as u8);
    let info = bits(word, 7, 5) as u8;
    let mnemonic = if is_move_from_coproc { InstructionMnemonic::Mrc } else { InstructionMnemonic::Mcr };
    (mnemonic, OperationClass::CoProcRegisterTransfer(CoProcRegisterTransfer { coproc, opcode, rd, cr_n, cr_m, info, is_move_from_coproc }), 1)
}

fn decode_coproc_data_processing(word: u32, coproc: CoProcId) -> (InstructionMnemonic, OperationClass, usize) {
    let opcode = bits(word, 23, 20) as u8;
    let cr_d = CoProcRegister(bits(word, 15, 12) as u8);
    let cr_n = CoProcRegister(bits(word, 19, 16) as u8);
    let cr_m = CoProcRegister(bits(word, 3, 0) as u8);
    let info = bits(word, 7, 5) as u8;
    (InstructionMnemonic::Cdp, OperationClass::CoProcDataProcessing(CoProcDataProcessing { coproc, opcode, cr_d, cr_n, cr_m, info }), 1)
}

fn decode_fpa_data_or_register_transfer(word: u32) -> (InstructionMnemonic, OperationClass, usize) {
    let is_register_transfer = bit(word, 4);
    if is_register_transfer {
        let is_move_from_fpa = bit(word, 20);
        let fn_ = FpaRegister::from_index(bits(word, 18, 16));
        let rd = reg(word, 12);
        let rounding = fpa_rounding(bits(word, 6, 5));
        if bits(word, 23, 20) & 0b1000 != 0 {
            let signal_exceptions = bit(word, 7);
            return (InstructionMnemonic::Cmf, OperationClass::FpaComparison(FpaComparison { fn_, fm: FpaRegister::from_index(bits(word, 2, 0)), immediate: None, signal_exceptions }), 1);
        }
        let mnemonic = if is_move_from_fpa { InstructionMnemonic::Flt } else { InstructionMnemonic::Fix };
        return (mnemonic, OperationClass::FpaRegisterTransfer(FpaRegisterTransfer { rd, fn_, immediate: None, rounding, is_move_from_fpa }), 1);
    }

    let fd = FpaRegister::from_index(bits(word, 15, 12));
    let fm = FpaRegister::from_index(bits(word, 2, 0));
    let uses_immediate = bit(word, 3);
    let immediate = if uses_immediate { Some(bits(word, 2, 0) as u8) } else { None };
    let precision = fpa_precision(bit(word, 7), bits(word, 6, 5));
    let rounding = fpa_rounding(bits(word, 6, 5));
    let opcode = bits(word, 19, 15);
    let is_monadic = bits(word, 19, 16) == 0 || opcode < 16 && bits(word, 23, 20) == 0b1000;

    if is_monadic {
        let monadic_op = bits(word, 19, 16);
        let mnemonic = fpa_monadic_mnemonic(monadic_op);
        (mnemonic, OperationClass::FpaMonadicOperation(FpaMonadicOperation { fd, fm, immediate, precision, rounding }), 1)
    } else {
        let fn_ = FpaRegister::from_index(bits(word, 18, 16));
        let dyadic_op = bits(word, 23, 20);
        let mnemonic = fpa_dyadic_mnemonic(dyadic_op);
        (mnemonic, OperationClass::FpaDyadicOperation(FpaDyadicOperation { fd, fn_, fm, immediate, precision, rounding }), 1)
    }
}

/// Speculatively fold a `ADD/SUB Rd, PC, #imm` sequence followed by up to two more `ADD/SUB Rd,
/// Rd, #imm` instructions operating on the same register into a single `Adr` pseudo-descriptor.
fn try_fold_adr(words: &[u32], load_address: u32, first: &Instruction) -> Option<Decoded> {
    let (rd, base_offset, mnemonic_is_add) = match first.class {
        OperationClass::CoreAlu(CoreAlu { rd, rn: CoreRegister::R15, operand2, .. }) => {
            let value = match operand2.mode {
                ShifterMode::ImmediateConstant => operand2.immediate,
                _ => return None,
            };
            (rd, value, first.mnemonic == InstructionMnemonic::Add)
        }
        _ => return None,
    };

    let mut target = (load_address as i64 + 8) as u32;
    target = if mnemonic_is_add { target.wrapping_add(base_offset) } else { target.wrapping_sub(base_offset) };
    let mut consumed = 1;
    let mut addr = load_address;

    for &next_word in &words[1..words.len().min(3)] {
        let cond_ok = ConditionCode::from_bits(bits(next_word, 31, 28)) == first.condition;
        let group_ok = bits(next_word, 27, 25) == 0b001;
        if !cond_ok || !group_ok {
            break;
        }
        let opcode = bits(next_word, 24, 21);
        let this_rd = reg(next_word, 12);
        let this_rn = reg(next_word, 16);
        if this_rd != rd || this_rn != rd {
            break;
        }
        let is_add = opcode == 4;
        let is_sub = opcode == 2;
        if !is_add && !is_sub {
            break;
        }
        let imm = ShifterOperand::decode_immediate_constant(bits(next_word, 11, 0));
        target = if is_add { target.wrapping_add(imm) } else { target.wrapping_sub(imm) };
        consumed += 1;
        addr += 4;
    }

    if consumed == 1 {
        return None;
    }

    let _ = addr;
    Some(Decoded {
        instruction: Instruction {
            condition: first.condition,
            mnemonic: InstructionMnemonic::Adr,
            class: OperationClass::Adr(AdrPseudo { rd, target_address: target }),
        },
        words_consumed: consumed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_core_alu_register_operand() {
        // ADDEQS R4, R5, R6, LSL #3
        let word = 0x0095_4186u32;
        let decoded = disassemble(&[word], 0x1000, &Options::default());
        assert_eq!(decoded.instruction.condition, ConditionCode::Eq);
        assert_eq!(decoded.instruction.mnemonic, InstructionMnemonic::Add);
        match decoded.instruction.class {
            OperationClass::CoreAlu(alu) => {
                assert_eq!(alu.rd, CoreRegister::R4);
                assert_eq!(alu.rn, CoreRegister::R5);
                assert!(alu.set_flags);
                assert_eq!(alu.operand2.rm, CoreRegister::R6);
                assert_eq!(alu.operand2.shift, ShiftType::Lsl);
                assert_eq!(alu.operand2.immediate, 3);
            }
            other => panic!("unexpected class: {:?}", other),
        }
    }

    #[test]
    fn decodes_branch_target() {
        // B from 0x1000 to 0x2000: offset = (0x2000 - 0x1008) >> 2 = 0x3FE
        let word = 0xEA00_03FEu32;
        let decoded = disassemble(&[word], 0x1000, &Options::default());
        assert_eq!(decoded.instruction.mnemonic, InstructionMnemonic::B);
        match decoded.instruction.class {
            OperationClass::Branch(b) => assert_eq!(b.target_address, 0x2000),
            other => panic!("unexpected class: {:?}", other),
        }
    }

    #[test]
    fn decodes_swi() {
        let word = 0xEF00_1234u32;
        let decoded = disassemble(&[word], 0, &Options::default());
        assert_eq!(decoded.instruction.mnemonic, InstructionMnemonic::Swi);
        match decoded.instruction.class {
            OperationClass::SoftwareIrq(s) => assert_eq!(s.comment, 0x1234),
            other => panic!("unexpected class: {:?}", other),
        }
    }

    #[test]
    fn decodes_multiply() {
        // MUL R1, R2, R3 : cond=AL, 000000 A=0 S=0 Rd=1 Rn(unused)=0 Rs=3 1001 Rm=2
        let word = 0xE000_1392u32;
        let decoded = disassemble(&[word], 0, &Options::default());
        assert_eq!(decoded.instruction.mnemonic, InstructionMnemonic::Mul);
    }

    #[test]
    fn rejects_long_multiply_below_armv4() {
        let mut options = Options::default();
        options.instruction_set = crate::options::InstructionSet::ArmV3;
        // UMULL R1,R2,R3,R4
        let word = 0xE081_2493u32;
        let decoded = disassemble(&[word], 0, &options);
        assert!(matches!(decoded.instruction.class, OperationClass::None(_)));
    }

    #[test]
    fn decodes_breakpoint_comment() {
        // BKPT #0x1234 : comment low nibble 4 -> bits 3:0, high 12 bits 0x123 -> bits 19:8
        let word = 0xE121_2374u32;
        let mut options = Options::default();
        options.instruction_set = crate::options::InstructionSet::ArmV5;
        let decoded = disassemble(&[word], 0, &options);
        assert_eq!(decoded.instruction.mnemonic, InstructionMnemonic::Bkpt);
        match decoded.instruction.class {
            OperationClass::Breakpoint(b) => assert_eq!(b.comment, 0x1234),
            other => panic!("unexpected class: {:?}", other),
        }
    }

    #[test]
    fn bkpt_and_msr_register_form_do_not_collide() {
        // MSR CPSR_flg, R0 shares cond/opcode/S/bits21:20 with BKPT; bits 7:4 = 0000 here, not 0111.
        let word = 0xE128_F000u32;
        let mut options = Options::default();
        options.instruction_set = crate::options::InstructionSet::ArmV5;
        let decoded = disassemble(&[word], 0, &options);
        assert_eq!(decoded.instruction.mnemonic, InstructionMnemonic::Msr);
    }

    #[test]
    fn decodes_half_word_load_with_immediate_offset() {
        // LDRH R1, [R2, #0x23]
        let word = 0xE1D2_12B3u32;
        let decoded = disassemble(&[word], 0, &Options::default());
        assert_eq!(decoded.instruction.mnemonic, InstructionMnemonic::Ldr);
        match decoded.instruction.class {
            OperationClass::CoreDataTransfer(t) => {
                assert_eq!(t.rd, CoreRegister::R1);
                assert_eq!(t.addr.rn, CoreRegister::R2);
                assert_eq!(t.data_type, TransferDataType::UnsignedHalfWord);
                assert_eq!(t.addr.offset.immediate, 0x23);
            }
            other => panic!("unexpected class: {:?}", other),
        }
    }

    #[test]
    fn decodes_signed_byte_load_with_register_offset() {
        // LDRSB R1, [R2, R3]
        let word = 0xE192_10D3u32;
        let decoded = disassemble(&[word], 0, &Options::default());
        match decoded.instruction.class {
            OperationClass::CoreDataTransfer(t) => {
                assert_eq!(t.data_type, TransferDataType::SignedByte);
                assert_eq!(t.addr.offset.rm, CoreRegister::R3);
            }
            other => panic!("unexpected class: {:?}", other),
        }
    }
}
