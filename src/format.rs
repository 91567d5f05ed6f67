//! Rendering a decoded [`Instruction`] back to text: a classified token stream for callers that
//! want to pick the pieces apart (syntax highlighters, interactive disassemblers), and a flat
//! [`std::fmt::Display`] view built by concatenating that stream, for everyone else.
//!
//! A small descriptor-to-text helper plus a `Display` impl that just writes the helper's output.
//! The token stream carries the classification a flat string throws away, for callers that need
//! it back once formatted.

use std::fmt;

use crate::fields::{AddrOperand, ShiftType, ShifterMode, ShifterOperand};
use crate::instructions::*;
use crate::options::{FormatterFlags, FormatterOptions};

/// The syntactic role a [`Token`]'s text plays, so a caller can restyle or re-tokenize without
/// re-parsing the flat string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    CoreMnemonic,
    CoProcMnemonic,
    FpaMnemonic,
    DataDirectiveMnemonic,
    Separator,
    WritebackMarker,
    ModifyPsrMarker,
    CoreRegister,
    BeginAddrOperand,
    EndAddrOperand,
    CoreRegList,
    CoProcessorId,
    CoProcessorRegister,
    FpaRegister,
    Shift,
    ImmediateConstant,
    Label,
    DataValue,
}

/// One piece of formatted text plus its classification and the raw numeric value it renders,
/// where one exists (register index, immediate value, branch target...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub value: u32,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, value: u32) -> Token {
        Token { kind, text: text.into(), value }
    }
}

/// The result of formatting one instruction: its token stream. A flat string view is always
/// available via [`Display`](fmt::Display).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedInstruction {
    pub tokens: Vec<Token>,
}

impl fmt::Display for FormattedInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in &self.tokens {
            f.write_str(&token.text)?;
        }
        Ok(())
    }
}

/// Accumulates tokens for one instruction, tracking whether a comma separator is needed before
/// the next operand (mnemonics and addressing-mode brackets manage their own spacing directly).
struct Builder {
    tokens: Vec<Token>,
    pending_operand: bool,
}

impl Builder {
    fn new() -> Builder {
        Builder { tokens: Vec::new(), pending_operand: false }
    }

    fn mnemonic(&mut self, kind: TokenKind, text: String) {
        self.tokens.push(Token::new(kind, text, 0));
        self.tokens.push(Token::new(TokenKind::Separator, " ", 0));
        self.pending_operand = false;
    }

    fn operand_sep(&mut self) {
        if self.pending_operand {
            self.tokens.push(Token::new(TokenKind::Separator, ", ", 0));
        }
        self.pending_operand = true;
    }

    fn push(&mut self, kind: TokenKind, text: String, value: u32) {
        self.operand_sep();
        self.tokens.push(Token::new(kind, text, value));
    }

    fn raw(&mut self, kind: TokenKind, text: impl Into<String>, value: u32) {
        self.tokens.push(Token::new(kind, text, value));
    }

    fn finish(self) -> FormattedInstruction {
        FormattedInstruction { tokens: self.tokens }
    }
}

fn mnemonic_text(mnemonic: InstructionMnemonic) -> String {
    format!("{:?}", mnemonic).to_uppercase()
}

fn condition_suffix(condition: ConditionCode) -> &'static str {
    use ConditionCode::*;
    match condition {
        Eq => "EQ", Ne => "NE", Cs => "CS", Cc => "CC", Mi => "MI", Pl => "PL", Vs => "VS", Vc => "VC",
        Hi => "HI", Ls => "LS", Ge => "GE", Lt => "LT", Gt => "GT", Le => "LE", Al => "", Nv => "NV",
    }
}

/// Renders a core register honouring the two alias schemes a caller may request. APCS aliases
/// take priority if both flags are set (they're the more specific convention).
fn core_register_name(reg: CoreRegister, flags: FormatterFlags) -> String {
    use CoreRegister::*;
    if flags.contains(FormatterFlags::USE_APCS_REG_ALIASES) {
        return match reg {
            R0 => "a1", R1 => "a2", R2 => "a3", R3 => "a4",
            R4 => "v1", R5 => "v2", R6 => "v3", R7 => "v4", R8 => "v5", R9 => "v6",
            R10 => "sl", R11 => "fp", R12 => "ip", R13 => "sp", R14 => "lk", R15 => "pc",
            Cpsr => "CPSR", Spsr => "SPSR",
        }
        .to_string();
    }
    if flags.contains(FormatterFlags::USE_CORE_REG_ALIASES) {
        return match reg {
            R13 => "SP".to_string(),
            R14 => "Link".to_string(),
            R15 => "PC".to_string(),
            Cpsr => "CPSR".to_string(),
            Spsr => "SPSR".to_string(),
            other => format!("R{}", other.index()),
        };
    }
    match reg {
        Cpsr => "CPSR".to_string(),
        Spsr => "SPSR".to_string(),
        other => format!("R{}", other.index()),
    }
}

fn fpa_register_name(reg: FpaRegister) -> String {
    use FpaRegister::*;
    match reg {
        F0 => "F0", F1 => "F1", F2 => "F2", F3 => "F3", F4 => "F4", F5 => "F5", F6 => "F6", F7 => "F7",
    }
    .to_string()
}

fn format_unsigned(value: u32, flags: FormatterFlags, decimal_flag: FormatterFlags) -> String {
    if flags.contains(decimal_flag) {
        format!("{}", value)
    } else if flags.contains(FormatterFlags::USE_BASIC_STYLE_HEX) {
        format!("&{:X}", value)
    } else {
        format!("0x{:X}", value)
    }
}

/// Compress a 16-bit register mask into `{R0,R2-R5,Link}` style, collapsing runs of three or
/// more consecutive registers into a `first-last` range.
fn register_list_text(mask: u16, flags: FormatterFlags) -> String {
    let mut parts = Vec::new();
    let mut i: u32 = 0;
    while i < 16 {
        if mask & (1 << i) == 0 {
            i += 1;
            continue;
        }
        let start = i;
        let mut end = i;
        while end + 1 < 16 && mask & (1 << (end + 1)) != 0 {
            end += 1;
        }
        if end == start {
            parts.push(core_register_name(CoreRegister::from_index(start), flags));
        } else if end == start + 1 {
            parts.push(core_register_name(CoreRegister::from_index(start), flags));
            parts.push(core_register_name(CoreRegister::from_index(end), flags));
        } else {
            parts.push(format!(
                "{}-{}",
                core_register_name(CoreRegister::from_index(start), flags),
                core_register_name(CoreRegister::from_index(end), flags)
            ));
        }
        i = end + 1;
    }
    format!("{{{}}}", parts.join(","))
}

/// `<shift-name> #<amount>` / `<shift-name> <Rs>` / `RRX`, as its own comma-separated operand.
/// Shift amounts are always decimal (ARM disassembly convention; unlike operand immediates they
/// are never rendered in hex).
fn push_shift(b: &mut Builder, shift: ShiftType, immediate: u32) {
    let name = match shift {
        ShiftType::Lsl => "LSL",
        ShiftType::Lsr => "LSR",
        ShiftType::Asr => "ASR",
        ShiftType::Ror => "ROR",
        ShiftType::Rrx => {
            b.push(TokenKind::Shift, "RRX".to_string(), 0);
            return;
        }
        ShiftType::None => return,
    };
    b.push(TokenKind::Shift, format!("{} #{}", name, immediate), immediate);
}

fn push_shift_by_register(b: &mut Builder, shift: ShiftType, rs: CoreRegister, flags: FormatterFlags) {
    let name = match shift {
        ShiftType::Lsl => "LSL",
        ShiftType::Lsr => "LSR",
        ShiftType::Asr => "ASR",
        ShiftType::Ror => "ROR",
        ShiftType::Rrx | ShiftType::None => return,
    };
    let text = format!("{} {}", name, core_register_name(rs, flags));
    b.push(TokenKind::Shift, text, rs.index());
}

/// Pushes a shifter operand (ALU operand2 or an addressing-mode offset) as one or two
/// comma-separated operands: the register (if any) followed by its shift clause.
fn push_shifter_operand(b: &mut Builder, op: &ShifterOperand, flags: FormatterFlags, decimal_flag: FormatterFlags) {
    match op.mode {
        ShifterMode::ImmediateConstant => {
            let text = format!("#{}", format_unsigned(op.immediate, flags, decimal_flag));
            b.push(TokenKind::ImmediateConstant, text, op.immediate);
        }
        ShifterMode::Register => {
            b.push(TokenKind::CoreRegister, core_register_name(op.rm, flags), op.rm.index());
        }
        ShifterMode::ShiftByConstant => {
            b.push(TokenKind::CoreRegister, core_register_name(op.rm, flags), op.rm.index());
            push_shift(b, op.shift, op.immediate);
        }
        ShifterMode::ShiftByRegister => {
            b.push(TokenKind::CoreRegister, core_register_name(op.rm, flags), op.rm.index());
            push_shift_by_register(b, op.shift, op.rs, flags);
        }
        ShifterMode::RotateWithExtend => {
            b.push(TokenKind::CoreRegister, core_register_name(op.rm, flags), op.rm.index());
            b.push(TokenKind::Shift, "RRX".to_string(), 0);
        }
    }
}

/// `[Rn, <offset>]!` (pre-indexed) or `[Rn], <offset>` (post-indexed), as a single comma-separated
/// operand. An immediate-zero offset is elided, matching the usual disassembly convention of not
/// cluttering a bare `[Rn]` with a redundant `#0`.
fn push_addr_operand(b: &mut Builder, addr: &AddrOperand, flags: FormatterFlags) {
    b.operand_sep();
    b.raw(TokenKind::BeginAddrOperand, "[", 0);
    b.raw(TokenKind::CoreRegister, core_register_name(addr.rn, flags), addr.rn.index());

    let has_offset = !(addr.offset.mode == ShifterMode::ImmediateConstant && addr.offset.immediate == 0);
    let sign = if addr.is_negative() { "-" } else { "" };

    if addr.is_pre_indexed() {
        if has_offset {
            b.raw(TokenKind::Separator, ", ", 0);
            if !sign.is_empty() {
                b.raw(TokenKind::Separator, sign, 0);
            }
            b.pending_operand = false;
            push_shifter_operand(b, &addr.offset, flags, FormatterFlags::USE_DECIMAL_OFFSETS);
        }
        b.raw(TokenKind::EndAddrOperand, "]", 0);
        if addr.has_writeback() {
            b.raw(TokenKind::WritebackMarker, "!", 0);
        }
    } else {
        b.raw(TokenKind::EndAddrOperand, "]", 0);
        if has_offset {
            b.raw(TokenKind::Separator, ", ", 0);
            if !sign.is_empty() {
                b.raw(TokenKind::Separator, sign, 0);
            }
            b.pending_operand = false;
            push_shifter_operand(b, &addr.offset, flags, FormatterFlags::USE_DECIMAL_OFFSETS);
        }
    }
    b.pending_operand = true;
}

/// A branch/ADR target: a symbolic [`Token::Label`] if the caller's callback resolves one,
/// otherwise the bare address rendered according to the usual numeric-style flags.
fn push_address_target(b: &mut Builder, target: u32, options: &FormatterOptions) {
    if let Some(resolve) = options.append_address_symbol {
        if let Some(name) = resolve(target) {
            b.push(TokenKind::Label, name, target);
            return;
        }
    }
    let text = format_unsigned(target, options.flags, FormatterFlags::USE_DECIMAL_OFFSETS);
    b.push(TokenKind::Label, text, target);
}

fn psr_name(use_spsr: bool) -> &'static str {
    if use_spsr { "SPSR" } else { "CPSR" }
}

fn psr_component_suffix(component: PsrComponent) -> &'static str {
    match component {
        PsrComponent::Control => "_ctl",
        PsrComponent::Flags => "_flg",
        PsrComponent::All => "_all",
    }
}

fn fpa_precision_suffix(precision: FpaPrecision) -> &'static str {
    match precision {
        FpaPrecision::Single => "S",
        FpaPrecision::Double => "D",
        FpaPrecision::Extended => "E",
        FpaPrecision::Packed => "P",
    }
}

fn fpa_rounding_suffix(rounding: FpaRoundMode) -> &'static str {
    match rounding {
        FpaRoundMode::Nearest => "",
        FpaRoundMode::Plus => "P",
        FpaRoundMode::Minus => "M",
        FpaRoundMode::Zero => "Z",
    }
}

fn push_fpa_operand(b: &mut Builder, fm: FpaRegister, immediate: Option<u8>, flags: FormatterFlags) {
    match immediate {
        Some(value) => {
            let text = format!("#{}", format_unsigned(value as u32, flags, FormatterFlags::USE_DECIMAL_IMMEDIATES));
            b.push(TokenKind::ImmediateConstant, text, value as u32);
        }
        None => b.push(TokenKind::FpaRegister, fpa_register_name(fm), 0),
    }
}

/// Classifies and renders `instruction` into a token stream, honouring `options`'s alias,
/// radix, and symbol-resolution choices. Always succeeds: every [`OperationClass`] variant,
/// including ones this crate declines to assemble (FPA, breakpoints), has a textual form.
pub fn format(instruction: &Instruction, options: &FormatterOptions) -> FormattedInstruction {
    let flags = options.flags;
    let cond = condition_suffix(instruction.condition);
    let mut b = Builder::new();

    match &instruction.class {
        OperationClass::None(word) => {
            b.mnemonic(TokenKind::DataDirectiveMnemonic, "EQUD".to_string());
            let text = format_unsigned(word.value, flags, FormatterFlags::USE_DECIMAL_IMMEDIATES);
            b.push(TokenKind::DataValue, text, word.value);
        }

        OperationClass::CoreAlu(alu) => {
            let s = if alu.set_flags { "S" } else { "" };
            b.mnemonic(TokenKind::CoreMnemonic, format!("{}{}{}", mnemonic_text(instruction.mnemonic), cond, s));
            b.push(TokenKind::CoreRegister, core_register_name(alu.rd, flags), alu.rd.index());
            if !matches!(instruction.mnemonic, InstructionMnemonic::Mov | InstructionMnemonic::Mvn) {
                b.push(TokenKind::CoreRegister, core_register_name(alu.rn, flags), alu.rn.index());
            }
            push_shifter_operand(&mut b, &alu.operand2, flags, FormatterFlags::USE_DECIMAL_IMMEDIATES);
        }

        OperationClass::CoreCompare(cmp) => {
            b.mnemonic(TokenKind::CoreMnemonic, format!("{}{}", mnemonic_text(instruction.mnemonic), cond));
            b.push(TokenKind::CoreRegister, core_register_name(cmp.rn, flags), cmp.rn.index());
            push_shifter_operand(&mut b, &cmp.operand2, flags, FormatterFlags::USE_DECIMAL_IMMEDIATES);
        }

        OperationClass::Adr(adr) => {
            b.mnemonic(TokenKind::CoreMnemonic, format!("ADR{}", cond));
            b.push(TokenKind::CoreRegister, core_register_name(adr.rd, flags), adr.rd.index());
            push_address_target(&mut b, adr.target_address, options);
        }

        OperationClass::CoreMultiply(mul) => {
            let s = if mul.set_flags { "S" } else { "" };
            b.mnemonic(TokenKind::CoreMnemonic, format!("{}{}{}", mnemonic_text(instruction.mnemonic), cond, s));
            b.push(TokenKind::CoreRegister, core_register_name(mul.rd, flags), mul.rd.index());
            b.push(TokenKind::CoreRegister, core_register_name(mul.rm, flags), mul.rm.index());
            b.push(TokenKind::CoreRegister, core_register_name(mul.rs, flags), mul.rs.index());
            if mul.accumulate {
                b.push(TokenKind::CoreRegister, core_register_name(mul.rn, flags), mul.rn.index());
            }
        }

        OperationClass::LongMultiply(long) => {
            let s = if long.set_flags { "S" } else { "" };
            b.mnemonic(TokenKind::CoreMnemonic, format!("{}{}{}", mnemonic_text(instruction.mnemonic), cond, s));
            b.push(TokenKind::CoreRegister, core_register_name(long.rd_lo, flags), long.rd_lo.index());
            b.push(TokenKind::CoreRegister, core_register_name(long.rd_hi, flags), long.rd_hi.index());
            b.push(TokenKind::CoreRegister, core_register_name(long.rm, flags), long.rm.index());
            b.push(TokenKind::CoreRegister, core_register_name(long.rs, flags), long.rs.index());
        }

        OperationClass::CoreDataTransfer(transfer) => {
            let width = match transfer.data_type {
                TransferDataType::Word => "",
                TransferDataType::UnsignedByte => "B",
                TransferDataType::SignedByte => "SB",
                TransferDataType::UnsignedHalfWord => "H",
                TransferDataType::SignedHalfWord => "SH",
            };
            b.mnemonic(TokenKind::CoreMnemonic, format!("{}{}{}", mnemonic_text(instruction.mnemonic), cond, width));
            b.push(TokenKind::CoreRegister, core_register_name(transfer.rd, flags), transfer.rd.index());
            push_addr_operand(&mut b, &transfer.addr, flags);
        }

        OperationClass::CoreMultiTransfer(transfer) => {
            use MultiTransferMode::*;
            let mode_suffix = match transfer.mode {
                IncrementAfter => "IA",
                IncrementBefore => "IB",
                DecrementAfter => "DA",
                DecrementBefore => "DB",
            };
            b.mnemonic(TokenKind::CoreMnemonic, format!("{}{}{}", mnemonic_text(instruction.mnemonic), cond, mode_suffix));
            let base_text = format!("{}{}", core_register_name(transfer.rn, flags), if transfer.writeback { "!" } else { "" });
            b.push(TokenKind::CoreRegister, base_text, transfer.rn.index());
            b.push(TokenKind::CoreRegList, register_list_text(transfer.register_list, flags), transfer.register_list as u32);
            if transfer.load_psr_or_force_user {
                b.raw(TokenKind::ModifyPsrMarker, "^", 0);
            }
        }

        OperationClass::Branch(branch) => {
            b.mnemonic(TokenKind::CoreMnemonic, format!("{}{}", mnemonic_text(instruction.mnemonic), cond));
            push_address_target(&mut b, branch.target_address, options);
        }

        OperationClass::SoftwareIrq(swi) => {
            b.mnemonic(TokenKind::CoreMnemonic, format!("{}{}", mnemonic_text(instruction.mnemonic), cond));
            let mut text = format!("#{}", format_unsigned(swi.comment, flags, FormatterFlags::USE_DECIMAL_COMMENTS));
            if let Some(annotate) = options.append_swi_comment {
                if let Some(comment) = annotate(swi.comment) {
                    text.push_str("  ; ");
                    text.push_str(&comment);
                }
            }
            b.push(TokenKind::ImmediateConstant, text, swi.comment);
        }

        OperationClass::Breakpoint(bkpt) => {
            b.mnemonic(TokenKind::CoreMnemonic, format!("{}{}", mnemonic_text(instruction.mnemonic), cond));
            let text = format!("#{}", format_unsigned(bkpt.comment, flags, FormatterFlags::USE_DECIMAL_COMMENTS));
            b.push(TokenKind::ImmediateConstant, text, bkpt.comment);
        }

        OperationClass::AtomicSwap(swap) => {
            let width = if swap.is_byte { "B" } else { "" };
            b.mnemonic(TokenKind::CoreMnemonic, format!("{}{}{}", mnemonic_text(instruction.mnemonic), cond, width));
            b.push(TokenKind::CoreRegister, core_register_name(swap.rd, flags), swap.rd.index());
            b.push(TokenKind::CoreRegister, core_register_name(swap.rm, flags), swap.rm.index());
            b.operand_sep();
            b.raw(TokenKind::BeginAddrOperand, "[", 0);
            b.raw(TokenKind::CoreRegister, core_register_name(swap.rn, flags), swap.rn.index());
            b.raw(TokenKind::EndAddrOperand, "]", 0);
        }

        OperationClass::MoveFromPsr(mrs) => {
            b.mnemonic(TokenKind::CoreMnemonic, format!("{}{}", mnemonic_text(instruction.mnemonic), cond));
            b.push(TokenKind::CoreRegister, core_register_name(mrs.rd, flags), mrs.rd.index());
            b.push(TokenKind::CoreRegister, psr_name(mrs.use_spsr).to_string(), 0);
        }

        OperationClass::MoveToPsr(msr) => {
            b.mnemonic(TokenKind::CoreMnemonic, format!("{}{}", mnemonic_text(instruction.mnemonic), cond));
            let psr_text = format!("{}{}", psr_name(msr.use_spsr), psr_component_suffix(msr.component));
            b.push(TokenKind::CoreRegister, psr_text, 0);
            push_shifter_operand(&mut b, &msr.operand, flags, FormatterFlags::USE_DECIMAL_IMMEDIATES);
        }

        OperationClass::BranchExchange(bx) => {
            let mnemonic = if bx.link { "BLX" } else { "BX" };
            b.mnemonic(TokenKind::CoreMnemonic, format!("{}{}", mnemonic, cond));
            b.push(TokenKind::CoreRegister, core_register_name(bx.rm, flags), bx.rm.index());
        }

        OperationClass::CoProcDataTransfer(transfer) => {
            let suffix = if transfer.long_transfer { "L" } else { "" };
            b.mnemonic(TokenKind::CoProcMnemonic, format!("{}{}{}", mnemonic_text(instruction.mnemonic), cond, suffix));
            b.push(TokenKind::CoProcessorId, format!("P{}", transfer.coproc.0), transfer.coproc.0 as u32);
            b.push(TokenKind::CoProcessorRegister, format!("C{}", transfer.cr_d.0), transfer.cr_d.0 as u32);
            push_addr_operand(&mut b, &transfer.addr, flags);
        }

        OperationClass::CoProcRegisterTransfer(transfer) => {
            b.mnemonic(TokenKind::CoProcMnemonic, format!("{}{}", mnemonic_text(instruction.mnemonic), cond));
            b.push(TokenKind::CoProcessorId, format!("P{}", transfer.coproc.0), transfer.coproc.0 as u32);
            let text = format_unsigned(transfer.opcode as u32, flags, FormatterFlags::USE_DECIMAL_IMMEDIATES);
            b.push(TokenKind::ImmediateConstant, text, transfer.opcode as u32);
            b.push(TokenKind::CoreRegister, core_register_name(transfer.rd, flags), transfer.rd.index());
            b.push(TokenKind::CoProcessorRegister, format!("C{}", transfer.cr_n.0), transfer.cr_n.0 as u32);
            b.push(TokenKind::CoProcessorRegister, format!("C{}", transfer.cr_m.0), transfer.cr_m.0 as u32);
            let info_text = format_unsigned(transfer.info as u32, flags, FormatterFlags::USE_DECIMAL_IMMEDIATES);
            b.push(TokenKind::ImmediateConstant, format!("{{{}}}", info_text), transfer.info as u32);
        }

        OperationClass::CoProcDataProcessing(cdp) => {
            b.mnemonic(TokenKind::CoProcMnemonic, format!("{}{}", mnemonic_text(instruction.mnemonic), cond));
            b.push(TokenKind::CoProcessorId, format!("P{}", cdp.coproc.0), cdp.coproc.0 as u32);
            let opcode_text = format_unsigned(cdp.opcode as u32, flags, FormatterFlags::USE_DECIMAL_IMMEDIATES);
            b.push(TokenKind::ImmediateConstant, opcode_text, cdp.opcode as u32);
            b.push(TokenKind::CoProcessorRegister, format!("C{}", cdp.cr_d.0), cdp.cr_d.0 as u32);
            b.push(TokenKind::CoProcessorRegister, format!("C{}", cdp.cr_n.0), cdp.cr_n.0 as u32);
            b.push(TokenKind::CoProcessorRegister, format!("C{}", cdp.cr_m.0), cdp.cr_m.0 as u32);
            let info_text = format_unsigned(cdp.info as u32, flags, FormatterFlags::USE_DECIMAL_IMMEDIATES);
            b.push(TokenKind::ImmediateConstant, format!("{{{}}}", info_text), cdp.info as u32);
        }

        OperationClass::FpaDataTransfer(transfer) => {
            let mnemonic = format!("{}{}{}", mnemonic_text(instruction.mnemonic), cond, fpa_precision_suffix(transfer.precision));
            b.mnemonic(TokenKind::FpaMnemonic, mnemonic);
            b.push(TokenKind::FpaRegister, fpa_register_name(transfer.fd), 0);
            push_addr_operand(&mut b, &transfer.addr, flags);
        }

        OperationClass::FpaMultiTransfer(transfer) => {
            b.mnemonic(TokenKind::FpaMnemonic, format!("{}{}", mnemonic_text(instruction.mnemonic), cond));
            b.push(TokenKind::FpaRegister, fpa_register_name(transfer.fd), 0);
            let count_text = format_unsigned(transfer.register_count as u32, flags, FormatterFlags::USE_DECIMAL_IMMEDIATES);
            b.push(TokenKind::ImmediateConstant, count_text, transfer.register_count as u32);
            push_addr_operand(&mut b, &transfer.addr, flags);
        }

        OperationClass::FpaDyadicOperation(op) => {
            let mnemonic = format!(
                "{}{}{}{}",
                mnemonic_text(instruction.mnemonic),
                cond,
                fpa_precision_suffix(op.precision),
                fpa_rounding_suffix(op.rounding)
            );
            b.mnemonic(TokenKind::FpaMnemonic, mnemonic);
            b.push(TokenKind::FpaRegister, fpa_register_name(op.fd), 0);
            b.push(TokenKind::FpaRegister, fpa_register_name(op.fn_), 0);
            push_fpa_operand(&mut b, op.fm, op.immediate, flags);
        }

        OperationClass::FpaMonadicOperation(op) => {
            let mnemonic = format!(
                "{}{}{}{}",
                mnemonic_text(instruction.mnemonic),
                cond,
                fpa_precision_suffix(op.precision),
                fpa_rounding_suffix(op.rounding)
            );
            b.mnemonic(TokenKind::FpaMnemonic, mnemonic);
            b.push(TokenKind::FpaRegister, fpa_register_name(op.fd), 0);
            push_fpa_operand(&mut b, op.fm, op.immediate, flags);
        }

        OperationClass::FpaRegisterTransfer(transfer) => {
            let mnemonic = format!("{}{}{}", mnemonic_text(instruction.mnemonic), cond, fpa_rounding_suffix(transfer.rounding));
            b.mnemonic(TokenKind::FpaMnemonic, mnemonic);
            if transfer.is_move_from_fpa {
                b.push(TokenKind::CoreRegister, core_register_name(transfer.rd, flags), transfer.rd.index());
                push_fpa_operand(&mut b, transfer.fn_, transfer.immediate, flags);
            } else {
                push_fpa_operand(&mut b, transfer.fn_, transfer.immediate, flags);
                b.push(TokenKind::CoreRegister, core_register_name(transfer.rd, flags), transfer.rd.index());
            }
        }

        OperationClass::FpaComparison(cmp) => {
            let suffix = if cmp.signal_exceptions { "E" } else { "" };
            b.mnemonic(TokenKind::FpaMnemonic, format!("{}{}{}", mnemonic_text(instruction.mnemonic), cond, suffix));
            b.push(TokenKind::FpaRegister, fpa_register_name(cmp.fn_), 0);
            push_fpa_operand(&mut b, cmp.fm, cmp.immediate, flags);
        }
    }

    b.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{AddrOperand, AddrOperandFlags};

    fn opts(address: u32) -> FormatterOptions<'static> {
        FormatterOptions::new(address)
    }

    #[test]
    fn core_alu_with_register_shift_matches_the_canonical_example() {
        let instruction = Instruction {
            condition: ConditionCode::Eq,
            mnemonic: InstructionMnemonic::Add,
            class: OperationClass::CoreAlu(CoreAlu {
                rd: CoreRegister::R4,
                rn: CoreRegister::R5,
                operand2: ShifterOperand::shift_by_constant(CoreRegister::R6, ShiftType::Lsl, 3),
                set_flags: true,
            }),
        };
        let formatted = format(&instruction, &opts(0));
        assert_eq!(formatted.to_string(), "ADDEQS R4, R5, R6, LSL #3");
    }

    #[test]
    fn al_condition_is_elided() {
        let instruction = Instruction {
            condition: ConditionCode::Al,
            mnemonic: InstructionMnemonic::Mov,
            class: OperationClass::CoreAlu(CoreAlu {
                rd: CoreRegister::R0,
                rn: CoreRegister::R0,
                operand2: ShifterOperand::immediate_constant(5),
                set_flags: false,
            }),
        };
        let formatted = format(&instruction, &opts(0));
        assert_eq!(formatted.to_string(), "MOV R0, #0x5");
    }

    #[test]
    fn decimal_immediates_flag_drops_the_hex_prefix() {
        let instruction = Instruction {
            condition: ConditionCode::Al,
            mnemonic: InstructionMnemonic::Mov,
            class: OperationClass::CoreAlu(CoreAlu {
                rd: CoreRegister::R0,
                rn: CoreRegister::R0,
                operand2: ShifterOperand::immediate_constant(42),
                set_flags: false,
            }),
        };
        let mut options = opts(0);
        options.flags = FormatterFlags::USE_DECIMAL_IMMEDIATES;
        assert_eq!(format(&instruction, &options).to_string(), "MOV R0, #42");
    }

    #[test]
    fn basic_style_hex_uses_ampersand_prefix() {
        let instruction = Instruction {
            condition: ConditionCode::Al,
            mnemonic: InstructionMnemonic::Mov,
            class: OperationClass::CoreAlu(CoreAlu {
                rd: CoreRegister::R0,
                rn: CoreRegister::R0,
                operand2: ShifterOperand::immediate_constant(0xFF),
                set_flags: false,
            }),
        };
        let mut options = opts(0);
        options.flags = FormatterFlags::USE_BASIC_STYLE_HEX;
        assert_eq!(format(&instruction, &options).to_string(), "MOV R0, #&FF");
    }

    #[test]
    fn core_reg_aliases_rename_sp_link_pc() {
        let instruction = Instruction {
            condition: ConditionCode::Al,
            mnemonic: InstructionMnemonic::Mov,
            class: OperationClass::CoreAlu(CoreAlu {
                rd: CoreRegister::R13,
                rn: CoreRegister::R0,
                operand2: ShifterOperand::register(CoreRegister::R15),
                set_flags: false,
            }),
        };
        let mut options = opts(0);
        options.flags = FormatterFlags::USE_CORE_REG_ALIASES;
        assert_eq!(format(&instruction, &options).to_string(), "MOV SP, PC");
    }

    #[test]
    fn apcs_aliases_rename_argument_and_variable_registers() {
        let instruction = Instruction {
            condition: ConditionCode::Al,
            mnemonic: InstructionMnemonic::Add,
            class: OperationClass::CoreAlu(CoreAlu {
                rd: CoreRegister::R4,
                rn: CoreRegister::R0,
                operand2: ShifterOperand::register(CoreRegister::R1),
                set_flags: false,
            }),
        };
        let mut options = opts(0);
        options.flags = FormatterFlags::USE_APCS_REG_ALIASES;
        assert_eq!(format(&instruction, &options).to_string(), "ADD v1, a1, a2");
    }

    #[test]
    fn branch_with_no_symbol_callback_shows_the_absolute_target() {
        let instruction = Instruction {
            condition: ConditionCode::Al,
            mnemonic: InstructionMnemonic::B,
            class: OperationClass::Branch(Branch { target_address: 0x2000, link: false }),
        };
        assert_eq!(format(&instruction, &opts(0)).to_string(), "B 0x2000");
    }

    #[test]
    fn branch_with_a_resolving_symbol_callback_shows_the_label() {
        let instruction = Instruction {
            condition: ConditionCode::Al,
            mnemonic: InstructionMnemonic::Bl,
            class: OperationClass::Branch(Branch { target_address: 0x2000, link: true }),
        };
        let resolve = |addr: u32| if addr == 0x2000 { Some("reset_vector".to_string()) } else { None };
        let mut options = opts(0);
        options.append_address_symbol = Some(&resolve);
        assert_eq!(format(&instruction, &options).to_string(), "BL reset_vector");
    }

    #[test]
    fn data_transfer_elides_a_zero_immediate_offset() {
        let instruction = Instruction {
            condition: ConditionCode::Al,
            mnemonic: InstructionMnemonic::Ldr,
            class: OperationClass::CoreDataTransfer(CoreDataTransfer {
                rd: CoreRegister::R0,
                addr: AddrOperand { rn: CoreRegister::R1, offset: ShifterOperand::immediate_constant(0), flags: AddrOperandFlags::PRE_INDEXED },
                is_load: true,
                data_type: TransferDataType::Word,
            }),
        };
        assert_eq!(format(&instruction, &opts(0)).to_string(), "LDR R0, [R1]");
    }

    #[test]
    fn data_transfer_with_pre_indexed_writeback_shows_the_bang() {
        let instruction = Instruction {
            condition: ConditionCode::Al,
            mnemonic: InstructionMnemonic::Str,
            class: OperationClass::CoreDataTransfer(CoreDataTransfer {
                rd: CoreRegister::R2,
                addr: AddrOperand {
                    rn: CoreRegister::R3,
                    offset: ShifterOperand::immediate_constant(4),
                    flags: AddrOperandFlags::PRE_INDEXED | AddrOperandFlags::WRITEBACK,
                },
                is_load: false,
                data_type: TransferDataType::UnsignedByte,
            }),
        };
        assert_eq!(format(&instruction, &opts(0)).to_string(), "STRB R2, [R3, #0x4]!");
    }

    #[test]
    fn data_transfer_post_indexed_shows_offset_outside_the_brackets() {
        let instruction = Instruction {
            condition: ConditionCode::Al,
            mnemonic: InstructionMnemonic::Ldr,
            class: OperationClass::CoreDataTransfer(CoreDataTransfer {
                rd: CoreRegister::R0,
                addr: AddrOperand { rn: CoreRegister::R1, offset: ShifterOperand::immediate_constant(8), flags: AddrOperandFlags::NONE },
                is_load: true,
                data_type: TransferDataType::Word,
            }),
        };
        assert_eq!(format(&instruction, &opts(0)).to_string(), "LDR R0, [R1], #0x8");
    }

    #[test]
    fn multi_transfer_renders_a_compressed_register_list_with_writeback_and_psr_marker() {
        let instruction = Instruction {
            condition: ConditionCode::Al,
            mnemonic: InstructionMnemonic::Ldm,
            class: OperationClass::CoreMultiTransfer(CoreMultiTransfer {
                rn: CoreRegister::R13,
                register_list: 0b1111_0000_0000_0111,
                mode: MultiTransferMode::IncrementAfter,
                writeback: true,
                is_load: true,
                load_psr_or_force_user: true,
            }),
        };
        assert_eq!(format(&instruction, &opts(0)).to_string(), "LDMIA R13!, {R0-R2,R12-R15}^");
    }

    #[test]
    fn software_interrupt_shows_a_resolved_comment() {
        let instruction = Instruction {
            condition: ConditionCode::Al,
            mnemonic: InstructionMnemonic::Swi,
            class: OperationClass::SoftwareIrq(SoftwareIrq { comment: 0x11 }),
        };
        let annotate = |comment: u32| if comment == 0x11 { Some("OS_WriteC".to_string()) } else { None };
        let mut options = opts(0);
        options.append_swi_comment = Some(&annotate);
        assert_eq!(format(&instruction, &options).to_string(), "SWI #0x11  ; OS_WriteC");
    }

    #[test]
    fn branch_exchange_and_link_variant() {
        let instruction = Instruction {
            condition: ConditionCode::Ne,
            mnemonic: InstructionMnemonic::Bx,
            class: OperationClass::BranchExchange(BranchExchange { rm: CoreRegister::R0, link: true }),
        };
        assert_eq!(format(&instruction, &opts(0)).to_string(), "BLXNE R0");
    }

    #[test]
    fn undecoded_word_renders_as_a_data_directive() {
        let instruction = Instruction {
            condition: ConditionCode::Al,
            mnemonic: InstructionMnemonic::Adr,
            class: OperationClass::None(UndecodedWord { value: 0xDEAD_BEEF }),
        };
        assert_eq!(format(&instruction, &opts(0)).to_string(), "EQUD 0xDEADBEEF");
    }

    #[test]
    fn move_to_psr_shows_the_component_suffix() {
        let instruction = Instruction {
            condition: ConditionCode::Al,
            mnemonic: InstructionMnemonic::Msr,
            class: OperationClass::MoveToPsr(MoveToPsr {
                operand: ShifterOperand::register(CoreRegister::R1),
                use_spsr: false,
                component: PsrComponent::Flags,
            }),
        };
        assert_eq!(format(&instruction, &opts(0)).to_string(), "MSR CPSR_flg, R1");
    }
}
