//! Instruction records and their optional detail blocks.
//!
//! Both types keep a fixed layout: raw bytes, text and register lists live in
//! bounded inline buffers so callers can rely on field offsets instead of
//! accessor calls.

use std::fmt;

use bitflags::bitflags;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::text::BoundedStr;
use crate::Address;

#[cfg(feature = "evm")]
use crate::arch::evm::EvmDetail;
#[cfg(feature = "mips")]
use crate::arch::mips::MipsDetail;
#[cfg(feature = "x86")]
use crate::arch::x86::X86Detail;

/// Maximum number of raw bytes kept per instruction.
pub const INSN_BYTES_MAX: usize = 16;
/// Width of the mnemonic field, terminator included.
pub const MNEMONIC_SIZE: usize = 32;
/// Width of the operand text field, terminator included.
pub const OP_STR_SIZE: usize = 160;
/// Capacity of the implicit register-read list.
pub const REGS_READ_MAX: usize = 12;
/// Capacity of the implicit register-write list.
pub const REGS_WRITE_MAX: usize = 20;
/// Capacity of the group list.
pub const GROUPS_MAX: usize = 8;

/// One decoded instruction.
///
/// An `id` of 0 marks a run of bytes that was skipped as data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[repr(C)]
pub struct Insn {
    /// Public instruction id, 0 for skipped data
    pub id: u32,
    /// Address of the instruction
    pub address: Address,
    /// Number of bytes in `bytes`
    pub size: u16,
    /// Raw bytes (the trailing ones if the encoding was longer than the field)
    pub bytes: [u8; INSN_BYTES_MAX],
    /// Instruction mnemonic (e.g., "mov", "add")
    pub mnemonic: BoundedStr<MNEMONIC_SIZE>,
    /// Instruction operands as string representation
    pub op_str: BoundedStr<OP_STR_SIZE>,
    /// Present only when the session had detail mode on
    pub detail: Option<Box<Detail>>,
}

impl Insn {
    /// An empty record without a detail block.
    pub fn new() -> Self {
        Self {
            id: 0,
            address: 0,
            size: 0,
            bytes: [0; INSN_BYTES_MAX],
            mnemonic: BoundedStr::new(),
            op_str: BoundedStr::new(),
            detail: None,
        }
    }

    /// An empty record with a zeroed detail block.
    pub fn with_detail() -> Self {
        Self {
            detail: Some(Box::default()),
            ..Self::new()
        }
    }

    /// Returns the instruction bytes, up to the recorded size.
    ///
    /// A data record may cover more bytes than the field holds; only the
    /// first [`INSN_BYTES_MAX`] are kept.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..(self.size as usize).min(INSN_BYTES_MAX)]
    }

    /// True for a skipped-data pseudo-instruction.
    pub fn is_data(&self) -> bool {
        self.id == 0
    }

    pub(crate) fn set_bytes(&mut self, bytes: &[u8]) {
        let n = bytes.len().min(INSN_BYTES_MAX);
        self.bytes = [0; INSN_BYTES_MAX];
        self.bytes[..n].copy_from_slice(&bytes[..n]);
        self.size = n as u16;
    }
}

impl Default for Insn {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.op_str.is_empty() {
            write!(f, "{}", self.mnemonic)
        } else {
            write!(f, "{}\t{}", self.mnemonic, self.op_str)
        }
    }
}

bitflags! {
    /// How an operand is accessed. The empty set means not accessed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Access: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

impl Serialize for Access {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let name = match (self.contains(Access::READ), self.contains(Access::WRITE)) {
            (true, true) => "read_write",
            (true, false) => "read",
            (false, true) => "write",
            (false, false) => "none",
        };
        serializer.serialize_str(name)
    }
}

/// Architecture-specific part of a detail block.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchDetail {
    /// Not filled in by any decoder yet
    #[default]
    None,
    #[cfg(feature = "x86")]
    X86(X86Detail),
    #[cfg(feature = "mips")]
    Mips(MipsDetail),
    #[cfg(feature = "evm")]
    Evm(EvmDetail),
}

impl ArchDetail {
    /// Type tags of the explicit operands, in operand order.
    ///
    /// `None` when no decoder filled this block.
    pub fn operand_types(&self) -> Option<Vec<u8>> {
        match self {
            ArchDetail::None => None,
            #[cfg(feature = "x86")]
            ArchDetail::X86(d) => Some(d.operands().iter().map(|op| op.ty as u8).collect()),
            #[cfg(feature = "mips")]
            ArchDetail::Mips(d) => Some(d.operands().iter().map(|op| op.ty as u8).collect()),
            #[cfg(feature = "evm")]
            ArchDetail::Evm(_) => Some(Vec::new()),
        }
    }
}

/// Per-instruction semantic breakdown, owned by its [`Insn`].
#[derive(Debug, Clone, PartialEq, Default)]
#[repr(C)]
pub struct Detail {
    pub regs_read: [u16; REGS_READ_MAX],
    pub regs_read_count: u8,
    pub regs_write: [u16; REGS_WRITE_MAX],
    pub regs_write_count: u8,
    pub groups: [u8; GROUPS_MAX],
    pub groups_count: u8,
    pub arch: ArchDetail,
}

impl Detail {
    /// Registers implicitly read.
    pub fn regs_read(&self) -> &[u16] {
        &self.regs_read[..self.regs_read_count as usize]
    }

    /// Registers implicitly written.
    pub fn regs_write(&self) -> &[u16] {
        &self.regs_write[..self.regs_write_count as usize]
    }

    /// Groups this instruction belongs to.
    pub fn groups(&self) -> &[u8] {
        &self.groups[..self.groups_count as usize]
    }

    /// Append an implicitly read register; ignored once the list is full.
    pub fn push_reg_read(&mut self, reg: u16) {
        let n = self.regs_read_count as usize;
        if n < REGS_READ_MAX {
            self.regs_read[n] = reg;
            self.regs_read_count += 1;
        }
    }

    /// Append an implicitly written register; ignored once the list is full.
    pub fn push_reg_write(&mut self, reg: u16) {
        let n = self.regs_write_count as usize;
        if n < REGS_WRITE_MAX {
            self.regs_write[n] = reg;
            self.regs_write_count += 1;
        }
    }

    /// Append a group; ignored once the list is full.
    pub fn push_group(&mut self, group: u8) {
        let n = self.groups_count as usize;
        if n < GROUPS_MAX {
            self.groups[n] = group;
            self.groups_count += 1;
        }
    }
}

impl Serialize for Detail {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Detail", 4)?;
        s.serialize_field("regs_read", self.regs_read())?;
        s.serialize_field("regs_write", self.regs_write())?;
        s.serialize_field("groups", self.groups())?;
        s.serialize_field("arch", &self.arch)?;
        s.end()
    }
}
