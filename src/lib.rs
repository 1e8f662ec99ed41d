//! Session-based, multi-architecture disassembly engine.
//!
//! This library drives pluggable architecture decoders over in-memory byte
//! buffers and turns what they produce into fixed-layout instruction records.
//! The engine owns everything that is not architecture specific: session
//! configuration, the batch instruction cache, skip-data recovery, text
//! post-processing and the read-only queries over instruction details.
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! use decay_engine::{Arch, Mode, Session, SessionOption};
//!
//! let code = [0x55, 0x48, 0x8b, 0x05, 0xb8, 0x13, 0x00, 0x00, 0xc3];
//!
//! let mut session = Session::open(Arch::X86, Mode::MODE_64).unwrap();
//! session.configure(SessionOption::Detail(true)).unwrap();
//!
//! for insn in session.disasm_all(&code, 0x1000).unwrap().iter() {
//!     println!("0x{:x}:\t{}\t{}", insn.address, insn.mnemonic, insn.op_str);
//! }
//!
//! session.close().unwrap();
//! ```

pub mod arch;
pub mod insn;
pub mod memory;
pub mod session;
pub mod text;

mod cache;
mod detail;
mod disasm;
mod fill;
mod iter;
mod skipdata;

pub use detail::RegsAccess;
pub use disasm::Insns;
pub use insn::{Access, ArchDetail, Detail, Insn, INSN_BYTES_MAX, MNEMONIC_SIZE, OP_STR_SIZE};
pub use iter::{Cursor, InsnIter};
pub use memory::{MemoryPrimitives, SystemMemory};
pub use session::{Session, SessionOption, SkipDataCallback, SkipDataSetup};

use std::fmt;

use bitflags::bitflags;
use clap::ValueEnum;

/// Represents an address in memory
pub type Address = u64;

/// Major version of the engine API.
pub const API_MAJOR: u32 = 4;
/// Minor version of the engine API.
pub const API_MINOR: u32 = 0;

/// Supported architectures.
///
/// The discriminants are stable and index the engine's per-architecture
/// tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, serde::Serialize)]
#[repr(u8)]
pub enum Arch {
    /// ARM (A32 and Thumb)
    Arm = 0,
    /// ARMv8 64-bit
    Arm64 = 1,
    /// MIPS
    Mips = 2,
    /// x86 and x86-64
    X86 = 3,
    /// PowerPC
    Ppc = 4,
    /// SPARC
    Sparc = 5,
    /// SystemZ
    Sysz = 6,
    /// XCore
    Xcore = 7,
    /// Motorola 68000 family
    M68k = 8,
    /// TMS320C64x DSP
    Tms320c64x = 9,
    /// Motorola 6800 family
    M680x = 10,
    /// Ethereum virtual machine
    Evm = 11,
}

impl Arch {
    /// Number of architecture slots in the engine tables.
    pub const COUNT: usize = 12;

    /// Every architecture, in table order.
    pub const ALL: [Arch; Arch::COUNT] = [
        Arch::Arm,
        Arch::Arm64,
        Arch::Mips,
        Arch::X86,
        Arch::Ppc,
        Arch::Sparc,
        Arch::Sysz,
        Arch::Xcore,
        Arch::M68k,
        Arch::Tms320c64x,
        Arch::M680x,
        Arch::Evm,
    ];

    /// Table index of this architecture.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arch::Arm => write!(f, "ARM"),
            Arch::Arm64 => write!(f, "ARM64"),
            Arch::Mips => write!(f, "MIPS"),
            Arch::X86 => write!(f, "x86"),
            Arch::Ppc => write!(f, "PowerPC"),
            Arch::Sparc => write!(f, "SPARC"),
            Arch::Sysz => write!(f, "SystemZ"),
            Arch::Xcore => write!(f, "XCore"),
            Arch::M68k => write!(f, "M68K"),
            Arch::Tms320c64x => write!(f, "TMS320C64x"),
            Arch::M680x => write!(f, "M680X"),
            Arch::Evm => write!(f, "EVM"),
        }
    }
}

bitflags! {
    /// Decoding mode: bit width, endianness and architecture sub-variants.
    ///
    /// Several architectures reuse the same bits for different meanings, so
    /// a mode is only meaningful together with its [`Arch`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Mode: u32 {
        const LITTLE_ENDIAN = 0;
        const ARM = 0;
        const MODE_16 = 1 << 1;
        const MODE_32 = 1 << 2;
        const MODE_64 = 1 << 3;
        const THUMB = 1 << 4;
        const MCLASS = 1 << 5;
        const V8 = 1 << 6;
        const MICRO = 1 << 4;
        const MIPS3 = 1 << 5;
        const MIPS32R6 = 1 << 6;
        const MIPS2 = 1 << 7;
        const V9 = 1 << 4;
        const QPX = 1 << 4;
        const M68K_000 = 1 << 1;
        const M68K_010 = 1 << 2;
        const M68K_020 = 1 << 3;
        const M68K_030 = 1 << 4;
        const M68K_040 = 1 << 5;
        const M68K_060 = 1 << 6;
        const BIG_ENDIAN = 1 << 31;
        const MIPS32 = 1 << 2;
        const MIPS64 = 1 << 3;
        const M680X_6301 = 1 << 1;
        const M680X_6309 = 1 << 2;
        const M680X_6800 = 1 << 3;
        const M680X_6801 = 1 << 4;
        const M680X_6805 = 1 << 5;
        const M680X_6808 = 1 << 6;
        const M680X_6809 = 1 << 7;
        const M680X_6811 = 1 << 8;
        const M680X_CPU12 = 1 << 9;
        const M680X_HCS08 = 1 << 10;
    }
}

/// Assembly syntax used by an architecture printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum Syntax {
    /// Architecture default
    Default,
    /// Intel syntax (x86)
    Intel,
    /// AT&T syntax (x86)
    Att,
    /// Register names printed as plain numbers
    NoRegName,
    /// MASM syntax (x86)
    Masm,
}

/// Error type for engine operations.
///
/// Running out of decodable bytes is never an error: decode calls simply
/// return fewer instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum Error {
    /// An allocation was refused
    #[error("Out of memory")]
    OutOfMemory,

    /// No decoder is registered for the architecture
    #[error("Invalid/unsupported architecture")]
    UnsupportedArchitecture,

    /// The session handle was closed or never opened
    #[error("Invalid handle")]
    InvalidHandle,

    /// The mode has bits the architecture does not allow
    #[error("Invalid mode")]
    InvalidMode,

    /// The option or its value is not accepted
    #[error("Invalid option")]
    InvalidOption,

    /// Detail mode is off or the record has no detail block
    #[error("Details are unavailable")]
    DetailUnavailable,

    /// No memory primitives were installed before opening a session
    #[error("Dynamic memory management uninitialized")]
    MemoryPrimitivesUnconfigured,

    /// Caller was built against a different API major version
    #[error("Different API version between core & binding")]
    ApiVersionMismatch,

    /// The feature was stripped from this build
    #[error("Information irrelevant in diet engine")]
    DietModeUnsupported,

    /// Skipped data records carry no detail
    #[error("Information irrelevant for 'data' instruction in SKIPDATA mode")]
    SkippedDataHasNoDetail,

    /// AT&T syntax was not built into the x86 printer
    #[error("AT&T syntax is unavailable")]
    X86AttUnavailable,

    /// Intel syntax was not built into the x86 printer
    #[error("INTEL syntax is unavailable")]
    X86IntelUnavailable,

    /// MASM syntax was not built into the x86 printer
    #[error("MASM syntax is unavailable")]
    X86MasmUnavailable,
}

impl Error {
    /// Numeric error code, stable across releases.
    pub fn code(self) -> u32 {
        match self {
            Error::OutOfMemory => 1,
            Error::UnsupportedArchitecture => 2,
            Error::InvalidHandle => 3,
            Error::InvalidMode => 5,
            Error::InvalidOption => 6,
            Error::DetailUnavailable => 7,
            Error::MemoryPrimitivesUnconfigured => 8,
            Error::ApiVersionMismatch => 9,
            Error::DietModeUnsupported => 10,
            Error::SkippedDataHasNoDetail => 11,
            Error::X86AttUnavailable => 12,
            Error::X86IntelUnavailable => 13,
            Error::X86MasmUnavailable => 14,
        }
    }
}

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;

/// Engine API version as `(major, minor)`.
pub fn version() -> (u32, u32) {
    (API_MAJOR, API_MINOR)
}

/// Engine API version packed as `(major << 8) + minor`.
pub fn version_code() -> u32 {
    (API_MAJOR << 8) + API_MINOR
}

/// Check that a caller built against `major.minor` can use this engine.
///
/// Only the major version has to match.
pub fn check_version(major: u32, _minor: u32) -> Result<()> {
    if major == API_MAJOR {
        Ok(())
    } else {
        Err(Error::ApiVersionMismatch)
    }
}

/// Build capabilities that can be queried with [`support`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Support {
    /// A decoder for this architecture is compiled in
    Arch(Arch),
    /// Decoders for every architecture are compiled in
    All,
    /// The engine was built with text and register access stripped
    Diet,
    /// The x86 decoder was built without its rarely used instruction sets
    X86Reduce,
}

/// Query what this build of the engine supports.
pub fn support(query: Support) -> bool {
    match query {
        Support::Arch(arch) => arch::module(arch).is_some(),
        Support::All => Arch::ALL.iter().all(|a| arch::module(*a).is_some()),
        Support::Diet => cfg!(feature = "diet"),
        Support::X86Reduce => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arch_index_matches_table_order() {
        for (i, arch) in Arch::ALL.iter().enumerate() {
            assert_eq!(arch.index(), i);
        }
    }

    #[test]
    fn test_arch_from_name() {
        assert_eq!(Arch::from_str("x86", true), Ok(Arch::X86));
        assert_eq!(Arch::from_str("MIPS", true), Ok(Arch::Mips));
        assert_eq!(Arch::from_str("tms320c64x", true), Ok(Arch::Tms320c64x));
        assert!(Arch::from_str("z80", true).is_err());
    }

    #[test]
    fn test_error_codes_and_messages() {
        assert_eq!(Error::OutOfMemory.code(), 1);
        assert_eq!(Error::InvalidMode.code(), 5);
        assert_eq!(Error::SkippedDataHasNoDetail.code(), 11);
        assert_eq!(Error::DetailUnavailable.to_string(), "Details are unavailable");
    }

    #[test]
    fn test_version() {
        assert_eq!(version(), (API_MAJOR, API_MINOR));
        assert_eq!(version_code(), (API_MAJOR << 8) + API_MINOR);
        assert!(check_version(API_MAJOR, 7).is_ok());
        assert_eq!(check_version(API_MAJOR + 1, 0), Err(Error::ApiVersionMismatch));
    }

    #[test]
    fn test_support_queries() {
        assert_eq!(support(Support::Arch(Arch::X86)), cfg!(feature = "x86"));
        assert!(!support(Support::Arch(Arch::Sparc)));
        assert!(!support(Support::All));
        assert_eq!(support(Support::Diet), cfg!(feature = "diet"));
    }

    #[test]
    fn test_mode_bits_overlap_between_archs() {
        assert_eq!(Mode::THUMB.bits(), Mode::MICRO.bits());
        assert_eq!(Mode::MIPS32, Mode::MODE_32);
        assert!(Mode::ARM.is_empty());
    }
}
