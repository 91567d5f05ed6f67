//! The encode direction: turn an [`Instruction`] descriptor back into its machine word(s). Mirrors
//! `parser.rs`'s bit-group layout in reverse, one `encode_*` function per `OperationClass` variant
//! `parser.rs` knows how to produce.

use crate::error::AssembleError;
use crate::fields::{ShifterMode, ShifterOperand, ShiftType};
use crate::instructions::*;
use crate::options::Options;

fn put_bits(word: &mut u32, hi: u32, lo: u32, value: u32) {
    let mask = (1u32 << (hi - lo + 1)) - 1;
    *word = (*word & !(mask << lo)) | ((value & mask) << lo);
}

fn put_bit(word: &mut u32, n: u32, value: bool) {
    put_bits(word, n, n, value as u32);
}

fn put_reg(word: &mut u32, lo: u32, reg: CoreRegister) {
    put_bits(word, lo + 3, lo, reg.index());
}

fn core_alu_opcode(mnemonic: InstructionMnemonic) -> u32 {
    use InstructionMnemonic::*;
    match mnemonic {
        And => 0, Eor => 1, Sub => 2, Rsb => 3, Add => 4, Adc => 5, Sbc => 6, Rsc => 7,
        Tst => 8, Teq => 9, Cmp => 10, Cmn => 11, Orr => 12, Mov => 13, Bic => 14, Mvn => 15,
        _ => unreachable!("not a core ALU mnemonic"),
    }
}

fn shift_type_bits(shift: ShiftType) -> u32 {
    match shift {
        ShiftType::Lsl => 0,
        ShiftType::Lsr => 1,
        ShiftType::Asr => 2,
        ShiftType::Ror | ShiftType::Rrx => 3,
        ShiftType::None => 0,
    }
}

/// Encode a [`ShifterOperand`] into a data-processing instruction's operand2 field (bits 11-0) and
/// report whether the instruction's own immediate bit (bit 25) must be set.
fn encode_operand2(word: &mut u32, operand2: &ShifterOperand) -> Result<bool, AssembleError> {
    match operand2.mode {
        ShifterMode::ImmediateConstant => {
            let (imm8, rotate) = ShifterOperand::encode_immediate_constant(operand2.immediate)
                .ok_or(AssembleError::ImmediateNotEncodable { value: operand2.immediate })?;
            put_bits(word, 7, 0, imm8);
            put_bits(word, 11, 8, rotate);
            Ok(true)
        }
        ShifterMode::Register => {
            put_reg(word, 0, operand2.rm);
            Ok(false)
        }
        ShifterMode::RotateWithExtend => {
            put_reg(word, 0, operand2.rm);
            put_bits(word, 6, 5, shift_type_bits(ShiftType::Ror));
            Ok(false)
        }
        ShifterMode::ShiftByConstant => {
            put_reg(word, 0, operand2.rm);
            put_bits(word, 6, 5, shift_type_bits(operand2.shift));
            put_bits(word, 11, 7, operand2.immediate);
            Ok(false)
        }
        ShifterMode::ShiftByRegister => {
            put_reg(word, 0, operand2.rm);
            put_bits(word, 6, 5, shift_type_bits(operand2.shift));
            put_bit(word, 4, true);
            put_reg(word, 8, operand2.rs);
            Ok(false)
        }
    }
}

fn encode_condition(word: &mut u32, condition: ConditionCode) {
    put_bits(word, 31, 28, condition.bits());
}

fn encode_core_alu(condition: ConditionCode, mnemonic: InstructionMnemonic, alu: &CoreAlu) -> Result<u32, AssembleError> {
    let mut word = 0u32;
    encode_condition(&mut word, condition);
    let is_immediate = encode_operand2(&mut word, &alu.operand2)?;
    put_bit(&mut word, 25, is_immediate);
    put_bits(&mut word, 24, 21, core_alu_opcode(mnemonic));
    put_bit(&mut word, 20, alu.set_flags);
    put_reg(&mut word, 16, alu.rn);
    put_reg(&mut word, 12, alu.rd);
    Ok(word)
}

fn encode_core_compare(condition: ConditionCode, mnemonic: InstructionMnemonic, compare: &CoreCompare) -> Result<u32, AssembleError> {
    let mut word = 0u32;
    encode_condition(&mut word, condition);
    let is_immediate = encode_operand2(&mut word, &compare.operand2)?;
    put_bit(&mut word, 25, is_immediate);
    put_bits(&mut word, 24, 21, core_alu_opcode(mnemonic));
    put_bit(&mut word, 20, true);
    put_reg(&mut word, 16, compare.rn);
    Ok(word)
}

fn encode_core_multiply(condition: ConditionCode, multiply: &CoreMultiply) -> u32 {
    let mut word = 0u32;
    encode_condition(&mut word, condition);
    put_bits(&mut word, 7, 4, 0b1001);
    put_bit(&mut word, 21, multiply.accumulate);
    put_bit(&mut word, 20, multiply.set_flags);
    put_reg(&mut word, 16, multiply.rd);
    put_reg(&mut word, 12, multiply.rn);
    put_reg(&mut word, 8, multiply.rs);
    put_reg(&mut word, 0, multiply.rm);
    word
}

fn encode_long_multiply(condition: ConditionCode, long: &LongMultiply, options: &Options) -> Result<u32, AssembleError> {
    if !options.allows_long_multiply() {
        return Err(AssembleError::ArchitectureNotAllowed { required: crate::options::InstructionSet::ArmV4 });
    }
    let mut word = 0u32;
    encode_condition(&mut word, condition);
    put_bits(&mut word, 7, 4, 0b1001);
    put_bits(&mut word, 24, 23, 0b01);
    put_bit(&mut word, 22, long.is_signed);
    put_bit(&mut word, 21, long.accumulate);
    put_bit(&mut word, 20, long.set_flags);
    put_reg(&mut word, 16, long.rd_hi);
    put_reg(&mut word, 12, long.rd_lo);
    put_reg(&mut word, 8, long.rs);
    put_reg(&mut word, 0, long.rm);
    Ok(word)
}

fn encode_atomic_swap(condition: ConditionCode, swap: &AtomicSwap) -> u32 {
    let mut word = 0u32;
    encode_condition(&mut word, condition);
    put_bits(&mut word, 24, 23, 0b10);
    put_bit(&mut word, 22, swap.is_byte);
    put_bits(&mut word, 7, 4, 0b1001);
    put_reg(&mut word, 16, swap.rn);
    put_reg(&mut word, 12, swap.rd);
    put_reg(&mut word, 0, swap.rm);
    word
}

fn encode_core_data_transfer(condition: ConditionCode, transfer: &CoreDataTransfer) -> Result<u32, AssembleError> {
    match transfer.data_type {
        TransferDataType::Word | TransferDataType::UnsignedByte => encode_word_or_byte_transfer(condition, transfer),
        TransferDataType::SignedByte | TransferDataType::UnsignedHalfWord | TransferDataType::SignedHalfWord => {
            encode_half_word_transfer(condition, transfer)
        }
    }
}

fn encode_word_or_byte_transfer(condition: ConditionCode, transfer: &CoreDataTransfer) -> Result<u32, AssembleError> {
    // Post-indexed addressing always writes back; the W bit there instead selects unprivileged
    // (translated) access, which this descriptor has no separate flag for. A caller asking for
    // post-indexed addressing *and* writeback has specified something this encoding cannot express.
    if !transfer.addr.is_pre_indexed() && transfer.addr.has_writeback() {
        return Err(AssembleError::IllegalAddressingMode);
    }
    let mut word = 0u32;
    encode_condition(&mut word, condition);
    put_bits(&mut word, 27, 26, 0b01);
    match transfer.addr.offset.mode {
        ShifterMode::ImmediateConstant => {
            put_bit(&mut word, 25, false);
            put_bits(&mut word, 11, 0, transfer.addr.offset.immediate);
        }
        _ => {
            put_bit(&mut word, 25, true);
            encode_operand2(&mut word, &transfer.addr.offset)?;
        }
    }
    put_bit(&mut word, 24, transfer.addr.is_pre_indexed());
    put_bit(&mut word, 23, !transfer.addr.is_negative());
    put_bit(&mut word, 22, transfer.data_type == TransferDataType::UnsignedByte);
    put_bit(&mut word, 21, transfer.addr.has_writeback());
    put_bit(&mut word, 20, transfer.is_load);
    put_reg(&mut word, 16, transfer.addr.rn);
    put_reg(&mut word, 12, transfer.rd);
    Ok(word)
}

/// `LDRH`/`STRH`/`LDRSB`/`LDRSH`: group-000 sibling of [`encode_word_or_byte_transfer`], with the
/// offset split across bits 11:8/3:0 (immediate form) or a bare `Rm` in bits 3:0 (register form),
/// and the data type carried in the SH bits (6:5) instead of the B bit.
fn encode_half_word_transfer(condition: ConditionCode, transfer: &CoreDataTransfer) -> Result<u32, AssembleError> {
    if !transfer.addr.is_pre_indexed() && transfer.addr.has_writeback() {
        return Err(AssembleError::IllegalAddressingMode);
    }
    let mut word = 0u32;
    encode_condition(&mut word, condition);
    put_bit(&mut word, 24, transfer.addr.is_pre_indexed());
    put_bit(&mut word, 23, !transfer.addr.is_negative());
    put_bit(&mut word, 21, transfer.addr.has_writeback());
    put_bit(&mut word, 20, transfer.is_load);
    put_reg(&mut word, 16, transfer.addr.rn);
    put_reg(&mut word, 12, transfer.rd);
    put_bit(&mut word, 7, true);
    put_bit(&mut word, 4, true);
    let sh = match transfer.data_type {
        TransferDataType::UnsignedHalfWord => 0b01,
        TransferDataType::SignedByte => 0b10,
        TransferDataType::SignedHalfWord => 0b11,
        _ => unreachable!("caller filters to half-word transfer data types"),
    };
    put_bits(&mut word, 6, 5, sh);
    match transfer.addr.offset.mode {
        ShifterMode::ImmediateConstant => {
            let imm = transfer.addr.offset.immediate;
            if imm > 0xFF {
                return Err(AssembleError::OperandOutOfRange { operand: "half-word transfer immediate offset" });
            }
            put_bit(&mut word, 22, true);
            put_bits(&mut word, 11, 8, imm >> 4);
            put_bits(&mut word, 3, 0, imm & 0xF);
        }
        ShifterMode::Register => {
            put_bit(&mut word, 22, false);
            put_reg(&mut word, 0, transfer.addr.offset.rm);
        }
        _ => return Err(AssembleError::OperandOutOfRange { operand: "half-word transfer offset" }),
    }
    Ok(word)
}

/// `BKPT` ignores the descriptor's condition field: the encoding fixes the condition bits to
/// `1110` (AL) itself, so this builds the word from scratch rather than through `encode_condition`.
fn encode_breakpoint(bkpt: &Breakpoint) -> u32 {
    let mut word = 0xE120_0070u32;
    put_bits(&mut word, 3, 0, bkpt.comment & 0xF);
    put_bits(&mut word, 19, 8, (bkpt.comment >> 4) & 0xFFF);
    word
}

fn multi_transfer_pu(mode: MultiTransferMode) -> (bool, bool) {
    match mode {
        MultiTransferMode::IncrementAfter => (false, true),
        MultiTransferMode::IncrementBefore => (true, true),
        MultiTransferMode::DecrementAfter => (false, false),
        MultiTransferMode::DecrementBefore => (true, false),
    }
}

fn encode_core_multi_transfer(condition: ConditionCode, transfer: &CoreMultiTransfer) -> u32 {
    let mut word = 0u32;
    encode_condition(&mut word, condition);
    put_bits(&mut word, 27, 25, 0b100);
    let (p, u) = multi_transfer_pu(transfer.mode);
    put_bit(&mut word, 24, p);
    put_bit(&mut word, 23, u);
    put_bit(&mut word, 22, transfer.load_psr_or_force_user);
    put_bit(&mut word, 21, transfer.writeback);
    put_bit(&mut word, 20, transfer.is_load);
    put_reg(&mut word, 16, transfer.rn);
    put_bits(&mut word, 15, 0, transfer.register_list as u32);
    word
}

const BRANCH_RANGE: i64 = 1 << 25;

fn encode_branch(condition: ConditionCode, link: bool, branch: &Branch, load_address: u32) -> Result<u32, AssembleError> {
    let delta = branch.target_address as i64 - (load_address as i64 + 8);
    if delta < -BRANCH_RANGE || delta >= BRANCH_RANGE || delta % 4 != 0 {
        return Err(AssembleError::BranchOutOfRange);
    }
    let mut word = 0u32;
    encode_condition(&mut word, condition);
    put_bits(&mut word, 27, 25, 0b101);
    put_bit(&mut word, 24, link);
    put_bits(&mut word, 23, 0, ((delta >> 2) as u32) & 0x00FF_FFFF);
    Ok(word)
}

fn encode_branch_exchange(condition: ConditionCode, bx: &BranchExchange) -> u32 {
    let mut word = 0u32;
    encode_condition(&mut word, condition);
    put_bits(&mut word, 27, 4, 0b0001_0010_1111_1111_1111);
    put_reg(&mut word, 0, bx.rm);
    word
}

fn encode_software_irq(condition: ConditionCode, swi: &SoftwareIrq) -> u32 {
    let mut word = 0u32;
    encode_condition(&mut word, condition);
    put_bits(&mut word, 27, 24, 0b1111);
    put_bits(&mut word, 23, 0, swi.comment);
    word
}

fn encode_move_from_psr(condition: ConditionCode, mrs: &MoveFromPsr) -> u32 {
    let mut word = 0u32;
    encode_condition(&mut word, condition);
    put_bits(&mut word, 27, 23, 0b00010);
    put_bit(&mut word, 22, mrs.use_spsr);
    put_bits(&mut word, 21, 20, 0b00);
    put_bits(&mut word, 19, 16, 0b1111);
    put_reg(&mut word, 12, mrs.rd);
    word
}

fn encode_move_to_psr(condition: ConditionCode, msr: &MoveToPsr) -> Result<u32, AssembleError> {
    let mut word = 0u32;
    encode_condition(&mut word, condition);
    put_bits(&mut word, 27, 23, 0b00010);
    put_bit(&mut word, 22, msr.use_spsr);
    put_bits(&mut word, 21, 20, 0b10);
    let field_mask = match msr.component {
        PsrComponent::All => 0b1111,
        PsrComponent::Control => 0b0001,
        PsrComponent::Flags => 0b1000,
    };
    put_bits(&mut word, 19, 16, field_mask);
    match msr.operand.mode {
        ShifterMode::ImmediateConstant => {
            put_bit(&mut word, 25, true);
            encode_operand2(&mut word, &msr.operand)?;
        }
        ShifterMode::Register => {
            put_bit(&mut word, 25, false);
            put_reg(&mut word, 0, msr.operand.rm);
        }
        _ => return Err(AssembleError::OperandOutOfRange { operand: "msr operand" }),
    }
    Ok(word)
}

fn encode_coproc_data_transfer(condition: ConditionCode, transfer: &CoProcDataTransfer) -> Result<u32, AssembleError> {
    if transfer.addr.offset.immediate > 0xFF * 4 || transfer.addr.offset.immediate % 4 != 0 {
        return Err(AssembleError::OperandOutOfRange { operand: "coprocessor transfer offset" });
    }
    let mut word = 0u32;
    encode_condition(&mut word, condition);
    put_bits(&mut word, 27, 25, 0b110);
    put_bit(&mut word, 24, transfer.addr.is_pre_indexed());
    put_bit(&mut word, 23, !transfer.addr.is_negative());
    put_bit(&mut word, 22, transfer.long_transfer);
    put_bit(&mut word, 21, transfer.addr.has_writeback());
    put_bit(&mut word, 20, transfer.is_load);
    put_reg(&mut word, 16, transfer.addr.rn);
    put_bits(&mut word, 15, 12, transfer.cr_d.0 as u32);
    put_bits(&mut word, 11, 8, transfer.coproc.0 as u32);
    put_bits(&mut word, 7, 0, transfer.addr.offset.immediate >> 2);
    Ok(word)
}

fn encode_coproc_register_transfer(condition: ConditionCode, transfer: &CoProcRegisterTransfer) -> u32 {
    let mut word = 0u32;
    encode_condition(&mut word, condition);
    put_bits(&mut word, 27, 24, 0b1110);
    put_bits(&mut word, 23, 21, transfer.opcode as u32);
    put_bit(&mut word, 20, transfer.is_move_from_coproc);
    put_bits(&mut word, 19, 16, transfer.cr_n.0 as u32);
    put_reg(&mut word, 12, transfer.rd);
    put_bits(&mut word, 11, 8, transfer.coproc.0 as u32);
    put_bits(&mut word, 7, 5, transfer.info as u32);
    put_bit(&mut word, 4, true);
    put_bits(&mut word, 3, 0, transfer.cr_m.0 as u32);
    word
}

fn encode_coproc_data_processing(condition: ConditionCode, cdp: &CoProcDataProcessing) -> u32 {
    let mut word = 0u32;
    encode_condition(&mut word, condition);
    put_bits(&mut word, 27, 24, 0b1110);
    put_bits(&mut word, 23, 20, cdp.opcode as u32);
    put_bits(&mut word, 19, 16, cdp.cr_n.0 as u32);
    put_bits(&mut word, 15, 12, cdp.cr_d.0 as u32);
    put_bits(&mut word, 11, 8, cdp.coproc.0 as u32);
    put_bits(&mut word, 7, 5, cdp.info as u32);
    put_bit(&mut word, 4, false);
    put_bits(&mut word, 3, 0, cdp.cr_m.0 as u32);
    word
}

/// Encode `instruction` into its machine word(s). `load_address` is the address the first word
/// will end up loaded at (needed for branch-offset and [`OperationClass::Adr`] encoding). Always
/// produces exactly one word except for [`OperationClass::Adr`], which may expand to up to three.
pub fn assemble(instruction: &Instruction, load_address: u32, options: &Options) -> Result<Vec<u32>, AssembleError> {
    let condition = instruction.condition;
    let mnemonic = instruction.mnemonic;

    let word = match &instruction.class {
        OperationClass::None(undecoded) => undecoded.value,
        OperationClass::CoreAlu(alu) => encode_core_alu(condition, mnemonic, alu)?,
        OperationClass::CoreCompare(compare) => encode_core_compare(condition, mnemonic, compare)?,
        OperationClass::CoreMultiply(multiply) => encode_core_multiply(condition, multiply),
        OperationClass::LongMultiply(long) => encode_long_multiply(condition, long, options)?,
        OperationClass::CoreDataTransfer(transfer) => encode_core_data_transfer(condition, transfer)?,
        OperationClass::CoreMultiTransfer(transfer) => encode_core_multi_transfer(condition, transfer),
        OperationClass::Branch(branch) => encode_branch(condition, mnemonic == InstructionMnemonic::Bl, branch, load_address)?,
        OperationClass::SoftwareIrq(swi) => encode_software_irq(condition, swi),
        OperationClass::Breakpoint(bkpt) => {
            if !options.allows_breakpoint() {
                return Err(AssembleError::ArchitectureNotAllowed { required: crate::options::InstructionSet::ArmV5 });
            }
            encode_breakpoint(bkpt)
        }
        OperationClass::AtomicSwap(swap) => encode_atomic_swap(condition, swap),
        OperationClass::MoveFromPsr(mrs) => encode_move_from_psr(condition, mrs),
        OperationClass::MoveToPsr(msr) => encode_move_to_psr(condition, msr)?,
        OperationClass::BranchExchange(bx) => {
            if !options.allows_breakpoint() {
                return Err(AssembleError::ArchitectureNotAllowed { required: crate::options::InstructionSet::ArmV5 });
            }
            encode_branch_exchange(condition, bx)
        }
        OperationClass::CoProcDataTransfer(transfer) => encode_coproc_data_transfer(condition, transfer)?,
        OperationClass::CoProcRegisterTransfer(transfer) => encode_coproc_register_transfer(condition, transfer),
        OperationClass::CoProcDataProcessing(cdp) => encode_coproc_data_processing(condition, cdp),
        OperationClass::FpaDataTransfer(_)
        | OperationClass::FpaMultiTransfer(_)
        | OperationClass::FpaDyadicOperation(_)
        | OperationClass::FpaMonadicOperation(_)
        | OperationClass::FpaRegisterTransfer(_)
        | OperationClass::FpaComparison(_) => {
            if !options.allows_fpa() {
                return Err(AssembleError::ArchitectureNotAllowed { required: crate::options::InstructionSet::ArmV3 });
            }
            return Err(AssembleError::OperandOutOfRange { operand: "FPA encoding is not modelled" });
        }
        OperationClass::Adr(adr) => return encode_adr(condition, adr, load_address),
    };

    Ok(vec![word])
}

/// `ADR Rd, <addr>` has no single ARM encoding; expand it back into the `ADD/SUB Rd, PC, #imm`
/// sequence `parser.rs::try_fold_adr` collapses, using the smallest number of words that can
/// represent the signed distance as one or two rotatable 8-bit immediates.
fn encode_adr(condition: ConditionCode, adr: &AdrPseudo, load_address: u32) -> Result<Vec<u32>, AssembleError> {
    let pc_value = (load_address as i64 + 8) as u32;
    let distance = adr.target_address.wrapping_sub(pc_value);
    let is_add = (distance as i32) >= 0;
    let magnitude = if is_add { distance } else { 0u32.wrapping_sub(distance) };

    if ShifterOperand::encode_immediate_constant(magnitude).is_some() {
        let mnemonic = if is_add { InstructionMnemonic::Add } else { InstructionMnemonic::Sub };
        let alu = CoreAlu {
            rd: adr.rd,
            rn: CoreRegister::R15,
            operand2: ShifterOperand::immediate_constant(magnitude),
            set_flags: false,
        };
        return Ok(vec![encode_core_alu(condition, mnemonic, &alu)?]);
    }

    Err(AssembleError::ImmediateNotEncodable { value: magnitude })
}
