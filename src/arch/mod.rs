//! Architecture modules and the engine's per-architecture tables.
//!
//! Decoding itself is delegated to an [`ArchModule`]. The engine keeps a fixed
//! registry of the modules compiled into this build, plus two tables that
//! exist for every architecture whether or not a module is registered: the
//! disallowed mode bits and the default skip-data width.

use std::any::Any;
use std::fmt;

use crate::insn::{Detail, Insn};
use crate::{Address, Arch, Error, Mode, Result, Syntax};

#[cfg(feature = "evm")]
pub mod evm;
#[cfg(feature = "mips")]
pub mod mips;
#[cfg(feature = "x86")]
pub mod x86;

/// The part of a session an architecture module is allowed to see.
pub struct ArchState {
    pub mode: Mode,
    /// Detail blocks are being filled
    pub detail: bool,
    /// Immediates are printed as unsigned values
    pub imm_unsigned: bool,
    /// Printer configuration owned by the module
    pub printer_info: Option<Box<dyn Any + Send>>,
}

impl ArchState {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            detail: false,
            imm_unsigned: false,
            printer_info: None,
        }
    }

    /// Module printer configuration, if it is of type `T`.
    pub fn printer_info<T: 'static>(&self) -> Option<&T> {
        self.printer_info.as_ref()?.downcast_ref()
    }
}

impl fmt::Debug for ArchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchState")
            .field("mode", &self.mode)
            .field("detail", &self.detail)
            .field("imm_unsigned", &self.imm_unsigned)
            .field("printer_info", &self.printer_info.is_some())
            .finish()
    }
}

/// Session options the engine does not handle itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchOption {
    /// The session mode changed; already validated against the mode mask
    Mode(Mode),
    Syntax(Syntax),
}

/// A memory reference as decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct MemRef {
    pub segment: u16,
    pub base: u16,
    pub index: u16,
    pub scale: u8,
    pub disp: i64,
}

/// An operand of a machine instruction, before printing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McOperand {
    Reg { reg: u16, size: u8 },
    Imm { value: i64, size: u8 },
    Mem { mem: MemRef, size: u8 },
}

/// A machine instruction as produced by a module's decoder.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct McInst {
    /// Module-internal opcode
    pub opcode: u32,
    /// Public alias id overriding the mapped id, 0 for none
    pub opcode_pub: u32,
    /// Bytes consumed
    pub size: usize,
    pub address: Address,
    pub operands: Vec<McOperand>,
    /// Added to the public id after post-processing (x86 only)
    pub popcode_adjust: u32,
    /// Module-defined prefix and encoding flags
    pub flags: u32,
}

/// A pluggable architecture decoder.
///
/// The engine drives each decode in a fixed order: [`disassemble`],
/// [`insn_id`], [`print`], then [`post_printer`] on the raw text before it is
/// split into mnemonic and operands.
///
/// [`disassemble`]: ArchModule::disassemble
/// [`insn_id`]: ArchModule::insn_id
/// [`print`]: ArchModule::print
/// [`post_printer`]: ArchModule::post_printer
pub trait ArchModule: Send + Sync {
    fn arch(&self) -> Arch;

    /// Called once when a session is opened.
    fn global_init(&self, _state: &mut ArchState) -> Result<()> {
        Ok(())
    }

    /// Apply an option the engine forwarded.
    fn option(&self, state: &mut ArchState, option: &ArchOption) -> Result<()> {
        match option {
            ArchOption::Mode(mode) => {
                state.mode = *mode;
                Ok(())
            }
            ArchOption::Syntax(_) => Err(Error::InvalidOption),
        }
    }

    /// Decode one instruction at the start of `code`.
    ///
    /// When detail is on the module also fills the architecture part of the
    /// record's detail block. `None` means the bytes do not decode.
    fn disassemble(
        &self,
        state: &ArchState,
        code: &[u8],
        address: Address,
        insn: &mut Insn,
    ) -> Option<McInst>;

    /// Map an internal opcode to the public id, adding implicit registers
    /// and groups to the detail block.
    fn insn_id(&self, state: &ArchState, insn: &mut Insn, opcode: u32);

    /// Render the instruction as raw text: mnemonic, whitespace, operands.
    fn print(&self, mc: &McInst, state: &ArchState, out: &mut String);

    /// Fix up the raw text for corner cases the printer cannot express.
    fn post_printer(&self, _insn: &mut Insn, _text: &mut String, _mc: &McInst) {}

    fn reg_name(&self, reg: u32) -> Option<&'static str>;

    fn insn_name(&self, id: u32) -> Option<&'static str>;

    fn group_name(&self, group: u32) -> Option<&'static str>;

    /// Every register read and written, explicit and implicit.
    ///
    /// `None` when the module cannot compute register access.
    fn regs_access(&self, _insn: &Insn) -> Option<(Vec<u16>, Vec<u16>)> {
        None
    }
}

/// Registered module for `arch`, if one was compiled in.
pub fn module(arch: Arch) -> Option<&'static dyn ArchModule> {
    match arch {
        #[cfg(feature = "x86")]
        Arch::X86 => Some(&x86::X86Module),
        #[cfg(feature = "mips")]
        Arch::Mips => Some(&mips::MipsModule),
        #[cfg(feature = "evm")]
        Arch::Evm => Some(&evm::EvmModule),
        _ => None,
    }
}

/// Mode bits `arch` does not accept.
pub fn disallowed_mode_mask(arch: Arch) -> Mode {
    let allowed = match arch {
        Arch::Arm => Mode::ARM | Mode::V8 | Mode::MCLASS | Mode::THUMB | Mode::BIG_ENDIAN,
        Arch::Arm64 => Mode::BIG_ENDIAN,
        Arch::Mips => {
            Mode::MODE_32
                | Mode::MODE_64
                | Mode::MICRO
                | Mode::MIPS32R6
                | Mode::BIG_ENDIAN
                | Mode::MIPS2
                | Mode::MIPS3
        }
        Arch::X86 => Mode::MODE_16 | Mode::MODE_32 | Mode::MODE_64,
        Arch::Ppc => Mode::MODE_32 | Mode::MODE_64 | Mode::BIG_ENDIAN | Mode::QPX,
        Arch::Sparc => Mode::BIG_ENDIAN | Mode::V9,
        Arch::Sysz | Arch::Xcore | Arch::Tms320c64x => Mode::BIG_ENDIAN,
        Arch::M68k => {
            Mode::BIG_ENDIAN
                | Mode::M68K_000
                | Mode::M68K_010
                | Mode::M68K_020
                | Mode::M68K_030
                | Mode::M68K_040
                | Mode::M68K_060
        }
        Arch::M680x => {
            Mode::M680X_6301
                | Mode::M680X_6309
                | Mode::M680X_6800
                | Mode::M680X_6801
                | Mode::M680X_6805
                | Mode::M680X_6808
                | Mode::M680X_6809
                | Mode::M680X_6811
                | Mode::M680X_CPU12
                | Mode::M680X_HCS08
        }
        Arch::Evm => return Mode::empty(),
    };
    Mode::from_bits_retain(!allowed.bits())
}

/// Bytes skipped per data record when no callback decides.
pub fn default_skip_width(arch: Arch, mode: Mode) -> u8 {
    match arch {
        Arch::Arm if mode.contains(Mode::THUMB) => 2,
        Arch::Arm => 4,
        Arch::Arm64 | Arch::Mips | Arch::Ppc | Arch::Sparc | Arch::Tms320c64x => 4,
        Arch::Sysz | Arch::Xcore | Arch::M68k => 2,
        Arch::X86 | Arch::M680x | Arch::Evm => 1,
    }
}

/// The record's detail block, if detail is on and one was provided.
pub(crate) fn detail_mut<'a>(state: &ArchState, insn: &'a mut Insn) -> Option<&'a mut Detail> {
    if state.detail {
        insn.detail.as_deref_mut()
    } else {
        None
    }
}

const HEX_THRESHOLD: i64 = 9;

/// Append an immediate: small values in decimal, larger ones in hex.
///
/// With `unsigned` set, negative values are shown as their `size`-byte
/// two's complement.
pub(crate) fn write_imm(out: &mut String, value: i64, size: u8, unsigned: bool) {
    use std::fmt::Write;

    if unsigned && value < 0 {
        let masked = match size {
            1 => value as u64 & 0xff,
            2 => value as u64 & 0xffff,
            4 => value as u64 & 0xffff_ffff,
            _ => value as u64,
        };
        let _ = write!(out, "0x{:x}", masked);
    } else if value > HEX_THRESHOLD {
        let _ = write!(out, "0x{:x}", value);
    } else if value < -HEX_THRESHOLD {
        let _ = write!(out, "-0x{:x}", value.unsigned_abs());
    } else {
        let _ = write!(out, "{}", value);
    }
}
