//! Crate-wide error taxonomy. Translation/permission failures are expressed as plain booleans or
//! outcome enums at the call site (never as `Err`; they're routine guest-visible events, not
//! host-side bugs); these types cover the handful of cases that genuinely are exceptional:
//! malformed assembly input, and fatal host-side misconfiguration.

use thiserror::Error;

/// Failures encoding an [`crate::instructions::Instruction`] into machine words.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum AssembleError {
    #[error("operand {operand} out of range for its field")]
    OperandOutOfRange { operand: &'static str },

    #[error("branch target is out of range of a 26-bit signed word offset")]
    BranchOutOfRange,

    #[error("value {value:#010x} cannot be encoded as a rotated 8-bit immediate constant")]
    ImmediateNotEncodable { value: u32 },

    #[error("illegal combination of writeback and post-indexed addressing")]
    IllegalAddressingMode,

    #[error("instruction requires {required:?} but codec is configured for an earlier architecture")]
    ArchitectureNotAllowed { required: crate::options::InstructionSet },
}

/// Fatal, session-terminating failures raised by the memory controller or at configuration time.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum OperationError {
    #[error("MEMC test mode was enabled by the guest; this halts DRAM refresh on real hardware")]
    TestModeRejected,

    #[error("low ROM image is {size} bytes, exceeding the 4 MiB limit")]
    LowRomTooLarge { size: usize },

    #[error("high ROM image is {size} bytes, exceeding the 8 MiB limit")]
    HighRomTooLarge { size: usize },

    #[error("address region {name} at {base:#010x}..{end:#010x} overlaps an existing mapping")]
    RegionOverlap { name: &'static str, base: u32, end: u32 },
}
