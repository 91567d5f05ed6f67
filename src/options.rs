//! Configuration enumerations shared by the instruction codec: which architecture level and
//! extensions are recognised, how registers and immediates are rendered, and the data-directive
//! widths the codec's fallback "undecoded word" path can be rendered as.

/// A minimal, hand-rolled bitflags-style macro: plain `const` associated values on a newtype,
/// rather than pulling in the `bitflags` crate for a handful of small fixed masks each used in
/// one or two places.
macro_rules! bitflags_like {
    (
        $(#[$meta:meta])*
        pub struct $name:ident: $repr:ty {
            $(const $variant:ident = $value:expr;)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name(pub $repr);

        impl $name {
            $(pub const $variant: $name = $name($value);)*

            pub fn contains(self, other: $name) -> bool {
                (self.0 & other.0) == other.0
            }

            pub fn union(self, other: $name) -> $name {
                $name(self.0 | other.0)
            }
        }

        impl std::ops::BitOr for $name {
            type Output = $name;
            fn bitor(self, rhs: $name) -> $name {
                self.union(rhs)
            }
        }
    };
}

/// Architecture level the codec should assume when decoding or encoding. Higher levels are
/// supersets of lower ones (an `ArmV4` decoder also accepts everything an `ArmV2` decoder does).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InstructionSet {
    ArmV2 = 1,
    ArmV2a = 2,
    ArmV3 = 3,
    ArmV4 = 4,
    ArmV5 = 5,
    ArmV6 = 6,
    ArmV7 = 7,
}

impl InstructionSet {
    pub fn allows(self, required: InstructionSet) -> bool {
        self >= required
    }
}

bitflags_like! {
    /// Optional instruction groups layered on top of the base integer set.
    pub struct ArchExtensionFlag: u32 {
        const NONE = 0x00;
        const FPA = 0x01;
        const VFP_V1 = 0x02;
        const VFP_V2 = 0x04;
        const VFP_V3 = 0x08;
        const VFP_V4 = 0x10;
        const NEON = 0x20;
        const THUMB_V1 = 0x40;
        const THUMB_V2 = 0x80;
        const BREAK_PT = 0x100;
        const MASK = 0x1FF;
    }
}

bitflags_like! {
    /// Flags controlling disassembly-time formatting choices, layered on top of
    /// [`ArchExtensionFlag`] and [`InstructionSet`] gating.
    pub struct DisasmFlag: u32 {
        const NONE = 0x00;
        const ALLOW_FPA = 0x08;
        const ALLOW_THUMB = 0x10;
        const USE_STACK_MODES_ON_R13 = 0x20;
        const USE_STACK_MODES_ALWAYS = 0x40;
        const ALL = 0x7F;
    }
}

bitflags_like! {
    pub struct AssemblyFlag: u32 {
        const NONE = 0x0000;
        const POSITION_INDEPENDENT_CODE = 0x0001;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorMode {
    Arm,
    Thumb,
    Jazelle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveDataType {
    Byte,
    HalfWord,
    Word,
    LongWord,
    NativeString,
    Utf8String,
    Utf16String,
    Utf32String,
    Real32,
    Real64,
    Real96,
}

/// Configuration passed to the instruction codec: which architecture level, which optional
/// extensions, and (for the disassembler) how to render ambiguous forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    pub instruction_set: InstructionSet,
    pub extensions: ArchExtensionFlag,
    pub disasm_flags: DisasmFlag,
    pub processor_mode: ProcessorMode,
    pub assembly_flags: AssemblyFlag,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            instruction_set: InstructionSet::ArmV3,
            extensions: ArchExtensionFlag::NONE,
            disasm_flags: DisasmFlag::USE_STACK_MODES_ON_R13,
            processor_mode: ProcessorMode::Arm,
            assembly_flags: AssemblyFlag::NONE,
        }
    }
}

impl Options {
    pub fn allows_fpa(&self) -> bool {
        self.extensions.contains(ArchExtensionFlag::FPA) && self.disasm_flags.contains(DisasmFlag::ALLOW_FPA)
    }

    pub fn allows_long_multiply(&self) -> bool {
        self.instruction_set.allows(InstructionSet::ArmV4)
    }

    pub fn allows_breakpoint(&self) -> bool {
        self.instruction_set.allows(InstructionSet::ArmV5)
    }

    pub fn allows_psr_transfer(&self) -> bool {
        self.instruction_set.allows(InstructionSet::ArmV3)
    }
}

/// Flags controlling how a formatted instruction is rendered as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatterFlags(pub u32);

impl FormatterFlags {
    pub const NONE: FormatterFlags = FormatterFlags(0x00);
    pub const SHOW_OFFSETS: FormatterFlags = FormatterFlags(0x01);
    pub const USE_CORE_REG_ALIASES: FormatterFlags = FormatterFlags(0x02);
    pub const USE_APCS_REG_ALIASES: FormatterFlags = FormatterFlags(0x04);
    pub const USE_DECIMAL_IMMEDIATES: FormatterFlags = FormatterFlags(0x08);
    pub const USE_DECIMAL_OFFSETS: FormatterFlags = FormatterFlags(0x10);
    pub const USE_DECIMAL_COMMENTS: FormatterFlags = FormatterFlags(0x20);
    pub const USE_BASIC_STYLE_HEX: FormatterFlags = FormatterFlags(0x40);

    pub fn contains(self, other: FormatterFlags) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for FormatterFlags {
    type Output = FormatterFlags;
    fn bitor(self, rhs: FormatterFlags) -> FormatterFlags {
        FormatterFlags(self.0 | rhs.0)
    }
}

/// Per-formatting-call options: which flags are active, the address the instruction is loaded
/// at (needed to resolve PC-relative targets), and the two textual-annotation callbacks a
/// consumer (e.g. a disassembler UI) may supply.
pub struct FormatterOptions<'a> {
    pub instruction_address: u32,
    pub flags: FormatterFlags,
    pub append_address_symbol: Option<&'a dyn Fn(u32) -> Option<String>>,
    pub append_swi_comment: Option<&'a dyn Fn(u32) -> Option<String>>,
}

impl<'a> FormatterOptions<'a> {
    pub fn new(instruction_address: u32) -> Self {
        FormatterOptions {
            instruction_address,
            flags: FormatterFlags::NONE,
            append_address_symbol: None,
            append_swi_comment: None,
        }
    }
}
