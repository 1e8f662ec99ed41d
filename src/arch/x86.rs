//! x86 and x86-64 decoder.
//!
//! Covers the general-purpose core of the one-byte opcode map (ALU forms,
//! moves, stack, branches, string stores and moves) and a few two-byte
//! opcodes, in 16, 32 and 64-bit mode. Memory operands use 32 and 64-bit
//! addressing; 16-bit memory forms and the address-size prefix do not decode.
//!
//! Output follows Intel syntax by default. AT&T syntax can be selected with
//! [`SessionOption::Syntax`](crate::SessionOption::Syntax).

use std::fmt::Write;

use bitflags::bitflags;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use super::{detail_mut, write_imm, ArchModule, ArchOption, ArchState, McInst, McOperand, MemRef};
use crate::insn::{Access, ArchDetail, Insn};
use crate::{Address, Arch, Error, Mode, Result, Syntax};

/// Longest encoding the processor accepts.
pub const MAX_INSN_LEN: usize = 15;

/// x86 register ids.
pub mod reg {
    pub const INVALID: u16 = 0;
    pub const AL: u16 = 1;
    pub const CL: u16 = 2;
    pub const DL: u16 = 3;
    pub const BL: u16 = 4;
    pub const AH: u16 = 17;
    pub const AX: u16 = 21;
    pub const CX: u16 = 22;
    pub const SP: u16 = 25;
    pub const SI: u16 = 27;
    pub const DI: u16 = 28;
    pub const EAX: u16 = 37;
    pub const ECX: u16 = 38;
    pub const EDX: u16 = 39;
    pub const EBX: u16 = 40;
    pub const ESP: u16 = 41;
    pub const EBP: u16 = 42;
    pub const ESI: u16 = 43;
    pub const EDI: u16 = 44;
    pub const RAX: u16 = 53;
    pub const RCX: u16 = 54;
    pub const RDX: u16 = 55;
    pub const RBX: u16 = 56;
    pub const RSP: u16 = 57;
    pub const RBP: u16 = 58;
    pub const RSI: u16 = 59;
    pub const RDI: u16 = 60;
    pub const R8: u16 = 61;
    pub const RIP: u16 = 69;
    pub const EIP: u16 = 70;
    pub const IP: u16 = 71;
    pub const EFLAGS: u16 = 72;
    pub const ES: u16 = 73;
    pub const CS: u16 = 74;
    pub const SS: u16 = 75;
    pub const DS: u16 = 76;
    pub const FS: u16 = 77;
    pub const GS: u16 = 78;
    pub const XMM0: u16 = 79;
    pub const ENDING: u16 = 95;
}

/// x86 group ids.
pub mod group {
    pub const JUMP: u8 = 1;
    pub const CALL: u8 = 2;
    pub const RET: u8 = 3;
    pub const INT: u8 = 4;
    pub const IRET: u8 = 5;
    pub const PRIVILEGE: u8 = 6;
    pub const BRANCH_RELATIVE: u8 = 7;
    pub const SSE1: u8 = 128;
    pub const MODE64: u8 = 129;
    pub const NOT64BITMODE: u8 = 130;
}

const GPR8: [&str; 16] = [
    "al", "cl", "dl", "bl", "spl", "bpl", "sil", "dil", "r8b", "r9b", "r10b", "r11b", "r12b",
    "r13b", "r14b", "r15b",
];
const HIGH8: [&str; 4] = ["ah", "ch", "dh", "bh"];
const GPR16: [&str; 16] = [
    "ax", "cx", "dx", "bx", "sp", "bp", "si", "di", "r8w", "r9w", "r10w", "r11w", "r12w", "r13w",
    "r14w", "r15w",
];
const GPR32: [&str; 16] = [
    "eax", "ecx", "edx", "ebx", "esp", "ebp", "esi", "edi", "r8d", "r9d", "r10d", "r11d", "r12d",
    "r13d", "r14d", "r15d",
];
const GPR64: [&str; 16] = [
    "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11", "r12", "r13",
    "r14", "r15",
];
const SEGMENTS: [&str; 6] = ["es", "cs", "ss", "ds", "fs", "gs"];
const XMM: [&str; 16] = [
    "xmm0", "xmm1", "xmm2", "xmm3", "xmm4", "xmm5", "xmm6", "xmm7", "xmm8", "xmm9", "xmm10",
    "xmm11", "xmm12", "xmm13", "xmm14", "xmm15",
];

macro_rules! x86_insns {
    ($($variant:ident => $name:literal,)+) => {
        /// Public x86 instruction ids.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u32)]
        pub enum X86Insn {
            Invalid = 0,
            $($variant,)+
        }

        impl X86Insn {
            const ALL: &'static [X86Insn] = &[X86Insn::Invalid, $(X86Insn::$variant,)+];
            const NAMES: &'static [&'static str] = &["invalid", $($name,)+];
        }
    };
}

x86_insns! {
    Add => "add",
    Or => "or",
    And => "and",
    Sub => "sub",
    Xor => "xor",
    Cmp => "cmp",
    Test => "test",
    Mov => "mov",
    Movabs => "movabs",
    Lea => "lea",
    Inc => "inc",
    Dec => "dec",
    Push => "push",
    Pop => "pop",
    Nop => "nop",
    Pause => "pause",
    Ret => "ret",
    Int3 => "int3",
    Int => "int",
    Hlt => "hlt",
    Jmp => "jmp",
    Call => "call",
    Jo => "jo",
    Jno => "jno",
    Jb => "jb",
    Jae => "jae",
    Je => "je",
    Jne => "jne",
    Jbe => "jbe",
    Ja => "ja",
    Js => "js",
    Jns => "jns",
    Jp => "jp",
    Jnp => "jnp",
    Jl => "jl",
    Jge => "jge",
    Jle => "jle",
    Jg => "jg",
    Movsb => "movsb",
    Movsw => "movsw",
    Movsd => "movsd",
    Movsq => "movsq",
    Stosb => "stosb",
    Stosw => "stosw",
    Stosd => "stosd",
    Stosq => "stosq",
    Syscall => "syscall",
    Ud2 => "ud2",
    Cmpps => "cmpps",
    Cmpeqps => "cmpeqps",
    Cmpltps => "cmpltps",
    Cmpleps => "cmpleps",
    Cmpunordps => "cmpunordps",
    Cmpneqps => "cmpneqps",
    Cmpnltps => "cmpnltps",
    Cmpnleps => "cmpnleps",
    Cmpordps => "cmpordps",
}

impl X86Insn {
    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    pub fn name(self) -> &'static str {
        Self::NAMES[self as usize]
    }

    fn is_jcc(self) -> bool {
        (X86Insn::Jo as u32..=X86Insn::Jg as u32).contains(&(self as u32))
    }

    fn is_branch(self) -> bool {
        self.is_jcc() || matches!(self, X86Insn::Jmp | X86Insn::Call)
    }

    fn is_string(self) -> bool {
        (X86Insn::Movsb as u32..=X86Insn::Stosq as u32).contains(&(self as u32))
    }

    fn jcc(cond: u8) -> Self {
        Self::ALL[X86Insn::Jo as usize + usize::from(cond & 0xf)]
    }
}

bitflags! {
    /// How an instruction affects the flags register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EFlags: u64 {
        const MODIFY_AF = 1 << 0;
        const MODIFY_CF = 1 << 1;
        const MODIFY_SF = 1 << 2;
        const MODIFY_ZF = 1 << 3;
        const MODIFY_PF = 1 << 4;
        const MODIFY_OF = 1 << 5;
        const RESET_OF = 1 << 6;
        const RESET_CF = 1 << 7;
        const UNDEFINED_AF = 1 << 8;
        const TEST_OF = 1 << 9;
        const TEST_SF = 1 << 10;
        const TEST_ZF = 1 << 11;
        const TEST_PF = 1 << 12;
        const TEST_CF = 1 << 13;
        const TEST_DF = 1 << 14;
    }
}

bitflags! {
    /// Prefixes and encoding facts carried in [`McInst::flags`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Encoding: u32 {
        const OPSIZE = 1 << 0;
        const LOCK = 1 << 1;
        const REP = 1 << 2;
        const REPNE = 1 << 3;
        const REX = 1 << 4;
    }
}

/// Operand size in bytes lives above the prefix bits.
const OPSIZE_SHIFT: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum X86OpType {
    #[default]
    Invalid = 0,
    Reg = 1,
    Imm = 2,
    Mem = 3,
}

/// An explicit operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct X86Op {
    pub ty: X86OpType,
    pub reg: u16,
    pub imm: i64,
    pub mem: MemRef,
    /// Size in bytes
    pub size: u8,
    pub access: Access,
}

impl X86Op {
    fn from_mc(op: &McOperand, access: Access) -> Self {
        match *op {
            McOperand::Reg { reg, size } => X86Op {
                ty: X86OpType::Reg,
                reg,
                size,
                access,
                ..X86Op::default()
            },
            McOperand::Imm { value, size } => X86Op {
                ty: X86OpType::Imm,
                imm: value,
                size,
                access,
                ..X86Op::default()
            },
            McOperand::Mem { mem, size } => X86Op {
                ty: X86OpType::Mem,
                mem,
                size,
                access,
                ..X86Op::default()
            },
        }
    }
}

/// The x86 part of a detail block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct X86Detail {
    /// Lock/rep, segment, operand-size and address-size prefix slots
    pub prefix: [u8; 4],
    pub opcode: [u8; 4],
    pub rex: u8,
    pub addr_size: u8,
    pub modrm: u8,
    pub sib: u8,
    pub disp: i64,
    pub eflags: EFlags,
    pub op_count: u8,
    pub operands: [X86Op; 8],
}

impl X86Detail {
    pub fn operands(&self) -> &[X86Op] {
        &self.operands[..self.op_count as usize]
    }

    fn push_operand(&mut self, op: X86Op) {
        if let Some(slot) = self.operands.get_mut(self.op_count as usize) {
            *slot = op;
            self.op_count += 1;
        }
    }
}

impl Serialize for X86Detail {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("X86Detail", 9)?;
        s.serialize_field("prefix", &self.prefix)?;
        s.serialize_field("opcode", &self.opcode)?;
        s.serialize_field("rex", &self.rex)?;
        s.serialize_field("addr_size", &self.addr_size)?;
        s.serialize_field("modrm", &self.modrm)?;
        s.serialize_field("sib", &self.sib)?;
        s.serialize_field("disp", &self.disp)?;
        s.serialize_field("eflags", &self.eflags.bits())?;
        s.serialize_field("operands", self.operands())?;
        s.end()
    }
}

/// The x86 module.
#[derive(Debug, Clone, Copy, Default)]
pub struct X86Module;

fn width(mode: Mode) -> u8 {
    if mode.contains(Mode::MODE_64) {
        64
    } else if mode.contains(Mode::MODE_32) {
        32
    } else {
        16
    }
}

fn gpr(index: u8, size: u8, rex: bool) -> u16 {
    let i = u16::from(index & 0xf);
    match size {
        1 if !rex && (4..8).contains(&i) => reg::AH + (i - 4),
        1 => reg::AL + i,
        2 => reg::AX + i,
        4 => reg::EAX + i,
        _ => reg::RAX + i,
    }
}

fn stack_reg(width: u8) -> u16 {
    match width {
        64 => reg::RSP,
        32 => reg::ESP,
        _ => reg::SP,
    }
}

fn ip_reg(width: u8) -> u16 {
    match width {
        64 => reg::RIP,
        32 => reg::EIP,
        _ => reg::IP,
    }
}

struct Reader<'a> {
    code: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn peek(&self) -> Option<u8> {
        self.code.get(self.pos).copied()
    }

    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes = self.code.get(self.pos..self.pos + N)?;
        self.pos += N;
        bytes.try_into().ok()
    }

    fn u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|b| b[0])
    }

    fn imm(&mut self, size: u8) -> Option<i64> {
        Some(match size {
            1 => i64::from(i8::from_le_bytes(self.take()?)),
            2 => i64::from(i16::from_le_bytes(self.take()?)),
            8 => i64::from_le_bytes(self.take()?),
            _ => i64::from(i32::from_le_bytes(self.take()?)),
        })
    }
}

#[derive(Default)]
struct Prefixes {
    opsize: bool,
    lock: bool,
    rep: bool,
    repne: bool,
    segment: u16,
    rex: u8,
    raw: [u8; 4],
}

impl Prefixes {
    fn rex_w(&self) -> bool {
        self.rex & 0x08 != 0
    }

    fn rex_r(&self) -> u8 {
        (self.rex & 0x04) << 1
    }

    fn rex_x(&self) -> u8 {
        (self.rex & 0x02) << 2
    }

    fn rex_b(&self) -> u8 {
        (self.rex & 0x01) << 3
    }
}

struct ModRm {
    reg: u8,
    rm: u8,
    mem: Option<MemRef>,
}

/// Decoder state for one instruction.
struct Decoder<'a> {
    r: Reader<'a>,
    p: Prefixes,
    width: u8,
    osize: u8,
    address: Address,
    mc: McInst,
    detail: X86Detail,
}

impl<'a> Decoder<'a> {
    fn new(code: &'a [u8], address: Address, mode: Mode) -> Self {
        let width = width(mode);
        let code = &code[..code.len().min(MAX_INSN_LEN)];
        Self {
            r: Reader { code, pos: 0 },
            p: Prefixes::default(),
            width,
            osize: 0,
            address,
            mc: McInst {
                address,
                ..McInst::default()
            },
            detail: X86Detail {
                addr_size: width / 8,
                ..X86Detail::default()
            },
        }
    }

    fn prefixes(&mut self) -> Option<()> {
        while let Some(b) = self.r.peek() {
            match b {
                0xf0 => self.p.lock = true,
                0xf3 => {
                    self.p.rep = true;
                    self.p.repne = false;
                }
                0xf2 => {
                    self.p.repne = true;
                    self.p.rep = false;
                }
                0x66 => self.p.opsize = true,
                0x26 | 0x2e | 0x36 | 0x3e | 0x64 | 0x65 => {
                    self.p.segment = match b {
                        0x26 => reg::ES,
                        0x2e => reg::CS,
                        0x36 => reg::SS,
                        0x3e => reg::DS,
                        0x64 => reg::FS,
                        _ => reg::GS,
                    };
                }
                0x67 => return None,
                _ => break,
            }
            let slot = match b {
                0xf0 | 0xf2 | 0xf3 => 0,
                0x66 => 2,
                _ => 1,
            };
            self.p.raw[slot] = b;
            self.r.pos += 1;
        }
        if self.width == 64 {
            while let Some(b @ 0x40..=0x4f) = self.r.peek() {
                self.p.rex = b;
                self.r.pos += 1;
            }
        }
        self.osize = match (self.width, self.p.opsize) {
            (64, _) if self.p.rex_w() => 8,
            (16, false) | (32, true) | (64, true) => 2,
            _ => 4,
        };
        Some(())
    }

    fn modrm(&mut self) -> Option<ModRm> {
        let raw = self.r.u8()?;
        self.detail.modrm = raw;
        let md = raw >> 6;
        let reg = (raw >> 3) & 7 | self.p.rex_r();
        let rm = raw & 7 | self.p.rex_b();
        if md == 3 {
            return Some(ModRm {
                reg,
                rm,
                mem: None,
            });
        }
        if self.width == 16 {
            return None;
        }

        let asize = self.width / 8;
        let mut mem = MemRef {
            segment: self.p.segment,
            scale: 1,
            ..MemRef::default()
        };
        let mut disp_size = match md {
            1 => 1,
            2 => 4,
            _ => 0,
        };
        if raw & 7 == 4 {
            let sib = self.r.u8()?;
            self.detail.sib = sib;
            let index = (sib >> 3) & 7 | self.p.rex_x();
            let base = sib & 7 | self.p.rex_b();
            mem.scale = 1 << (sib >> 6);
            if index != 4 {
                mem.index = gpr(index, asize, true);
            }
            if base & 7 == 5 && md == 0 {
                disp_size = 4;
            } else {
                mem.base = gpr(base, asize, true);
            }
        } else if raw & 7 == 5 && md == 0 {
            disp_size = 4;
            if self.width == 64 {
                mem.base = reg::RIP;
            }
        } else {
            mem.base = gpr(rm, asize, true);
        }
        if disp_size > 0 {
            mem.disp = self.r.imm(disp_size)?;
            self.detail.disp = mem.disp;
        }
        Some(ModRm {
            reg,
            rm,
            mem: Some(mem),
        })
    }

    fn operand(&mut self, op: McOperand, access: Access) {
        self.detail.push_operand(X86Op::from_mc(&op, access));
        self.mc.operands.push(op);
    }

    fn reg(&mut self, index: u8, size: u8, access: Access) {
        let reg = gpr(index, size, self.p.rex != 0);
        self.operand(McOperand::Reg { reg, size }, access);
    }

    fn rm(&mut self, m: &ModRm, size: u8, access: Access) {
        match m.mem {
            Some(mem) => self.operand(McOperand::Mem { mem, size }, access),
            None => self.reg(m.rm, size, access),
        }
    }

    fn imm(&mut self, encoded: u8, size: u8) -> Option<()> {
        let value = self.r.imm(encoded)?;
        self.operand(McOperand::Imm { value, size }, Access::empty());
        Some(())
    }

    fn branch(&mut self, rel_size: u8) -> Option<()> {
        let rel = self.r.imm(rel_size)?;
        let next = self.address.wrapping_add(self.r.pos as u64);
        let target = next.wrapping_add(rel as u64);
        let target = match self.width {
            16 => target & 0xffff,
            32 => target & 0xffff_ffff,
            _ => target,
        };
        self.operand(
            McOperand::Imm {
                value: target as i64,
                size: self.width / 8,
            },
            Access::empty(),
        );
        Some(())
    }

    fn rel_size(&self) -> u8 {
        if self.osize == 2 {
            2
        } else {
            4
        }
    }

    fn string_operands(&mut self, size: u8, load: bool) {
        let asize = self.width / 8;
        let es = if self.width == 64 { reg::INVALID } else { reg::ES };
        let dest = MemRef {
            segment: es,
            base: gpr(7, asize, true),
            scale: 1,
            ..MemRef::default()
        };
        self.operand(McOperand::Mem { mem: dest, size }, Access::WRITE);
        if load {
            let src = MemRef {
                segment: self.p.segment,
                base: gpr(6, asize, true),
                scale: 1,
                ..MemRef::default()
            };
            self.operand(McOperand::Mem { mem: src, size }, Access::READ);
        } else {
            self.reg(0, size, Access::READ);
        }
    }

    fn decode(mut self) -> Option<(McInst, X86Detail)> {
        self.prefixes()?;
        let op = self.r.u8()?;
        self.detail.opcode[0] = op;
        let osize = self.osize;

        let insn = match op {
            0x00..=0x3f if matches!(op & 7, 1 | 3 | 5) && ALU[usize::from(op >> 3)].is_some() => {
                let insn = ALU[usize::from(op >> 3)]?;
                let dest = if insn == X86Insn::Cmp {
                    Access::READ
                } else {
                    Access::READ_WRITE
                };
                match op & 7 {
                    1 => {
                        let m = self.modrm()?;
                        self.rm(&m, osize, dest);
                        self.reg(m.reg, osize, Access::READ);
                    }
                    3 => {
                        let m = self.modrm()?;
                        self.reg(m.reg, osize, dest);
                        self.rm(&m, osize, Access::READ);
                    }
                    _ => {
                        self.reg(0, osize, dest);
                        self.imm(osize.min(4), osize)?;
                    }
                }
                insn
            }
            0x40..=0x4f if self.width != 64 => {
                self.reg(op & 7, osize, Access::READ_WRITE);
                if op < 0x48 {
                    X86Insn::Inc
                } else {
                    X86Insn::Dec
                }
            }
            0x50..=0x5f => {
                let size = self.stack_operand_size();
                let access = if op < 0x58 { Access::READ } else { Access::WRITE };
                self.reg(op & 7 | self.p.rex_b(), size, access);
                if op < 0x58 {
                    X86Insn::Push
                } else {
                    X86Insn::Pop
                }
            }
            0x70..=0x7f => {
                self.branch(1)?;
                X86Insn::jcc(op)
            }
            0x83 => {
                let m = self.modrm()?;
                let insn = ALU[usize::from(m.reg & 7)]?;
                let dest = if insn == X86Insn::Cmp {
                    Access::READ
                } else {
                    Access::READ_WRITE
                };
                self.rm(&m, osize, dest);
                self.imm(1, osize)?;
                insn
            }
            0x85 => {
                let m = self.modrm()?;
                self.rm(&m, osize, Access::READ);
                self.reg(m.reg, osize, Access::READ);
                X86Insn::Test
            }
            0x89 => {
                let m = self.modrm()?;
                self.rm(&m, osize, Access::WRITE);
                self.reg(m.reg, osize, Access::READ);
                X86Insn::Mov
            }
            0x8b => {
                let m = self.modrm()?;
                self.reg(m.reg, osize, Access::WRITE);
                self.rm(&m, osize, Access::READ);
                X86Insn::Mov
            }
            0x8d => {
                let m = self.modrm()?;
                let mem = m.mem?;
                self.reg(m.reg, osize, Access::WRITE);
                self.operand(McOperand::Mem { mem, size: 0 }, Access::empty());
                X86Insn::Lea
            }
            0x90 if self.p.rex_b() != 0 => return None,
            0x90 if self.p.rep => X86Insn::Pause,
            0x90 => X86Insn::Nop,
            0xa4 | 0xa5 | 0xaa | 0xab => {
                if self.p.repne {
                    return None;
                }
                let size = if op & 1 == 0 { 1 } else { osize };
                let movs = op < 0xaa;
                self.string_operands(size, movs);
                let base = if movs { X86Insn::Movsb } else { X86Insn::Stosb };
                let step = match size {
                    1 => 0,
                    2 => 1,
                    4 => 2,
                    _ => 3,
                };
                X86Insn::ALL[base as usize + step]
            }
            0xb8..=0xbf => {
                let index = op & 7 | self.p.rex_b();
                self.reg(index, osize, Access::WRITE);
                self.imm(osize, osize)?;
                if osize == 8 {
                    X86Insn::Movabs
                } else {
                    X86Insn::Mov
                }
            }
            0xc2 => {
                self.imm(2, 2)?;
                X86Insn::Ret
            }
            0xc3 => X86Insn::Ret,
            0xcc => X86Insn::Int3,
            0xcd => {
                let n = self.r.u8()?;
                self.operand(
                    McOperand::Imm {
                        value: i64::from(n),
                        size: 1,
                    },
                    Access::empty(),
                );
                X86Insn::Int
            }
            0xe8 => {
                self.branch(self.rel_size())?;
                X86Insn::Call
            }
            0xe9 => {
                self.branch(self.rel_size())?;
                X86Insn::Jmp
            }
            0xeb => {
                self.branch(1)?;
                X86Insn::Jmp
            }
            0xf4 => X86Insn::Hlt,
            0x0f => self.decode_0f()?,
            _ => return None,
        };

        if self.p.lock && !self.lockable(insn) {
            return None;
        }

        self.detail.prefix = self.p.raw;
        self.detail.rex = self.p.rex;
        self.detail.eflags = eflags(insn);

        let mut enc = Encoding::empty();
        enc.set(Encoding::OPSIZE, self.p.opsize);
        enc.set(Encoding::LOCK, self.p.lock);
        enc.set(Encoding::REP, self.p.rep);
        enc.set(Encoding::REPNE, self.p.repne);
        enc.set(Encoding::REX, self.p.rex != 0);
        let opsize = match insn {
            X86Insn::Push | X86Insn::Pop => self.stack_operand_size(),
            X86Insn::Ret | X86Insn::Call => self.width / 8,
            _ => osize,
        };
        self.mc.flags = enc.bits() | u32::from(opsize) << OPSIZE_SHIFT;
        self.mc.opcode = insn as u32;
        self.mc.size = self.r.pos;
        Some((self.mc, self.detail))
    }

    fn decode_0f(&mut self) -> Option<X86Insn> {
        let op = self.r.u8()?;
        self.detail.opcode[0] = 0x0f;
        self.detail.opcode[1] = op;
        match op {
            0x05 => Some(X86Insn::Syscall),
            0x0b => Some(X86Insn::Ud2),
            0x1f => {
                let m = self.modrm()?;
                if m.reg & 7 != 0 {
                    return None;
                }
                self.rm(&m, self.osize, Access::empty());
                Some(X86Insn::Nop)
            }
            0x80..=0x8f => {
                self.branch(self.rel_size())?;
                Some(X86Insn::jcc(op))
            }
            0xc2 if !(self.p.opsize || self.p.rep || self.p.repne) => {
                let m = self.modrm()?;
                let dest = reg::XMM0 + u16::from(m.reg);
                self.operand(McOperand::Reg { reg: dest, size: 16 }, Access::READ_WRITE);
                match m.mem {
                    Some(mem) => self.operand(McOperand::Mem { mem, size: 16 }, Access::READ),
                    None => self.operand(
                        McOperand::Reg {
                            reg: reg::XMM0 + u16::from(m.rm),
                            size: 16,
                        },
                        Access::READ,
                    ),
                }
                let pred = self.r.u8()?;
                if pred < 8 {
                    self.mc.popcode_adjust = u32::from(pred) + 1;
                } else {
                    self.operand(
                        McOperand::Imm {
                            value: i64::from(pred),
                            size: 1,
                        },
                        Access::empty(),
                    );
                }
                Some(X86Insn::Cmpps)
            }
            _ => None,
        }
    }

    fn stack_operand_size(&self) -> u8 {
        match (self.width, self.p.opsize) {
            (64, true) => 2,
            (64, false) => 8,
            _ => self.osize,
        }
    }

    fn lockable(&self, insn: X86Insn) -> bool {
        matches!(
            insn,
            X86Insn::Add | X86Insn::Or | X86Insn::And | X86Insn::Sub | X86Insn::Xor
        ) && matches!(self.mc.operands.first(), Some(McOperand::Mem { .. }))
    }
}

/// Arithmetic opcodes by `opcode >> 3`, or by the ModRM reg field of 0x83.
const ALU: [Option<X86Insn>; 8] = [
    Some(X86Insn::Add),
    Some(X86Insn::Or),
    None,
    None,
    Some(X86Insn::And),
    Some(X86Insn::Sub),
    Some(X86Insn::Xor),
    Some(X86Insn::Cmp),
];

fn eflags(insn: X86Insn) -> EFlags {
    let arith = EFlags::MODIFY_AF
        | EFlags::MODIFY_CF
        | EFlags::MODIFY_SF
        | EFlags::MODIFY_ZF
        | EFlags::MODIFY_PF
        | EFlags::MODIFY_OF;
    let logic = EFlags::RESET_OF
        | EFlags::RESET_CF
        | EFlags::MODIFY_SF
        | EFlags::MODIFY_ZF
        | EFlags::MODIFY_PF
        | EFlags::UNDEFINED_AF;
    match insn {
        X86Insn::Add | X86Insn::Sub | X86Insn::Cmp => arith,
        X86Insn::Or | X86Insn::And | X86Insn::Xor | X86Insn::Test => logic,
        X86Insn::Inc | X86Insn::Dec => arith - EFlags::MODIFY_CF,
        X86Insn::Jo | X86Insn::Jno => EFlags::TEST_OF,
        X86Insn::Jb | X86Insn::Jae => EFlags::TEST_CF,
        X86Insn::Je | X86Insn::Jne => EFlags::TEST_ZF,
        X86Insn::Jbe | X86Insn::Ja => EFlags::TEST_CF | EFlags::TEST_ZF,
        X86Insn::Js | X86Insn::Jns => EFlags::TEST_SF,
        X86Insn::Jp | X86Insn::Jnp => EFlags::TEST_PF,
        X86Insn::Jl | X86Insn::Jge => EFlags::TEST_SF | EFlags::TEST_OF,
        X86Insn::Jle | X86Insn::Jg => EFlags::TEST_ZF | EFlags::TEST_SF | EFlags::TEST_OF,
        i if i.is_string() => EFlags::TEST_DF,
        _ => EFlags::empty(),
    }
}

fn push_unique(list: &mut Vec<u16>, reg: u16) {
    if reg != reg::INVALID && !list.contains(&reg) {
        list.push(reg);
    }
}

fn write_target(out: &mut String, target: i64) {
    let target = target as u64;
    if target > 9 {
        let _ = write!(out, "0x{:x}", target);
    } else {
        let _ = write!(out, "{}", target);
    }
}

fn reg_text(reg: u16) -> &'static str {
    X86Module.reg_name(u32::from(reg)).unwrap_or("")
}

fn ptr_name(size: u8) -> Option<&'static str> {
    match size {
        1 => Some("byte ptr "),
        2 => Some("word ptr "),
        4 => Some("dword ptr "),
        8 => Some("qword ptr "),
        16 => Some("xmmword ptr "),
        _ => None,
    }
}

fn write_disp_term(out: &mut String, disp: i64) {
    if disp < 0 {
        out.push_str(" - ");
        write_imm(out, disp.wrapping_neg(), 8, false);
    } else if disp > 0 {
        out.push_str(" + ");
        write_imm(out, disp, 8, false);
    }
}

fn print_intel(insn: X86Insn, mc: &McInst, state: &ArchState, out: &mut String) {
    for (i, op) in mc.operands.iter().enumerate() {
        out.push_str(if i == 0 { " " } else { ", " });
        match *op {
            McOperand::Reg { reg, .. } => out.push_str(reg_text(reg)),
            McOperand::Imm { value, .. } if insn.is_branch() => write_target(out, value),
            McOperand::Imm { value, size } => write_imm(out, value, size, state.imm_unsigned),
            McOperand::Mem { mem, size } => {
                if let Some(ptr) = ptr_name(size) {
                    out.push_str(ptr);
                }
                if mem.segment != reg::INVALID {
                    out.push_str(reg_text(mem.segment));
                    out.push(':');
                }
                out.push('[');
                if mem.base == reg::INVALID && mem.index == reg::INVALID {
                    write_imm(out, mem.disp, 8, false);
                } else {
                    let mut first = true;
                    if mem.base != reg::INVALID {
                        out.push_str(reg_text(mem.base));
                        first = false;
                    }
                    if mem.index != reg::INVALID {
                        if !first {
                            out.push_str(" + ");
                        }
                        out.push_str(reg_text(mem.index));
                        if mem.scale != 1 {
                            let _ = write!(out, "*{}", mem.scale);
                        }
                    }
                    write_disp_term(out, mem.disp);
                }
                out.push(']');
            }
        }
    }
}

fn att_suffix(size: u8) -> &'static str {
    match size {
        1 => "b",
        2 => "w",
        4 => "l",
        _ => "q",
    }
}

fn att_mnemonic(insn: X86Insn, opsize: u8, out: &mut String) {
    match insn {
        X86Insn::Movsd => out.push_str("movsl"),
        X86Insn::Stosd => out.push_str("stosl"),
        X86Insn::Add
        | X86Insn::Or
        | X86Insn::And
        | X86Insn::Sub
        | X86Insn::Xor
        | X86Insn::Cmp
        | X86Insn::Test
        | X86Insn::Mov
        | X86Insn::Movabs
        | X86Insn::Lea
        | X86Insn::Inc
        | X86Insn::Dec
        | X86Insn::Push
        | X86Insn::Pop
        | X86Insn::Ret
        | X86Insn::Call => {
            out.push_str(insn.name());
            out.push_str(att_suffix(opsize));
        }
        _ => out.push_str(insn.name()),
    }
}

fn print_att(insn: X86Insn, mc: &McInst, state: &ArchState, out: &mut String) {
    for (i, op) in mc.operands.iter().rev().enumerate() {
        out.push_str(if i == 0 { " " } else { ", " });
        match *op {
            McOperand::Reg { reg, .. } => {
                out.push('%');
                out.push_str(reg_text(reg));
            }
            McOperand::Imm { value, .. } if insn.is_branch() => write_target(out, value),
            McOperand::Imm { value, size } => {
                out.push('$');
                write_imm(out, value, size, state.imm_unsigned);
            }
            McOperand::Mem { mem, .. } => {
                if mem.segment != reg::INVALID {
                    let _ = write!(out, "%{}:", reg_text(mem.segment));
                }
                let has_regs = mem.base != reg::INVALID || mem.index != reg::INVALID;
                if mem.disp != 0 || !has_regs {
                    write_imm(out, mem.disp, 8, false);
                }
                if has_regs {
                    out.push('(');
                    if mem.base != reg::INVALID {
                        let _ = write!(out, "%{}", reg_text(mem.base));
                    }
                    if mem.index != reg::INVALID {
                        let _ = write!(out, ",%{}", reg_text(mem.index));
                        if mem.scale != 1 {
                            let _ = write!(out, ",{}", mem.scale);
                        }
                    }
                    out.push(')');
                }
            }
        }
    }
}

impl ArchModule for X86Module {
    fn arch(&self) -> Arch {
        Arch::X86
    }

    fn global_init(&self, state: &mut ArchState) -> Result<()> {
        state.printer_info = Some(Box::new(Syntax::Intel));
        Ok(())
    }

    fn option(&self, state: &mut ArchState, option: &ArchOption) -> Result<()> {
        match option {
            ArchOption::Mode(mode) => {
                state.mode = *mode;
                Ok(())
            }
            ArchOption::Syntax(Syntax::Default | Syntax::Intel) => {
                state.printer_info = Some(Box::new(Syntax::Intel));
                Ok(())
            }
            ArchOption::Syntax(Syntax::Att) => {
                state.printer_info = Some(Box::new(Syntax::Att));
                Ok(())
            }
            ArchOption::Syntax(Syntax::Masm) => Err(Error::X86MasmUnavailable),
            ArchOption::Syntax(Syntax::NoRegName) => Err(Error::InvalidOption),
        }
    }

    fn disassemble(
        &self,
        state: &ArchState,
        code: &[u8],
        address: Address,
        insn: &mut Insn,
    ) -> Option<McInst> {
        let (mc, x86) = Decoder::new(code, address, state.mode).decode()?;
        if let Some(detail) = detail_mut(state, insn) {
            detail.arch = ArchDetail::X86(x86);
        }
        Some(mc)
    }

    fn insn_id(&self, state: &ArchState, insn: &mut Insn, opcode: u32) {
        insn.id = opcode;
        let Some(kind) = X86Insn::from_id(opcode) else {
            return;
        };
        let width = width(state.mode);
        let Some(detail) = detail_mut(state, insn) else {
            return;
        };
        let rep = match &detail.arch {
            ArchDetail::X86(x86) => x86.prefix[0] == 0xf3,
            _ => false,
        };
        let sp = stack_reg(width);
        let asize = width / 8;

        match kind {
            X86Insn::Add
            | X86Insn::Or
            | X86Insn::And
            | X86Insn::Sub
            | X86Insn::Xor
            | X86Insn::Cmp
            | X86Insn::Test => detail.push_reg_write(reg::EFLAGS),
            X86Insn::Inc | X86Insn::Dec => {
                detail.push_reg_write(reg::EFLAGS);
                detail.push_group(group::NOT64BITMODE);
            }
            X86Insn::Push | X86Insn::Pop => {
                detail.push_reg_read(sp);
                detail.push_reg_write(sp);
                if width == 64 {
                    detail.push_group(group::MODE64);
                }
            }
            X86Insn::Call => {
                detail.push_reg_read(sp);
                detail.push_reg_read(ip_reg(width));
                detail.push_reg_write(sp);
                detail.push_group(group::CALL);
                detail.push_group(group::BRANCH_RELATIVE);
            }
            X86Insn::Ret => {
                detail.push_reg_read(sp);
                detail.push_reg_write(sp);
                detail.push_group(group::RET);
            }
            X86Insn::Jmp => {
                detail.push_group(group::JUMP);
                detail.push_group(group::BRANCH_RELATIVE);
            }
            k if k.is_jcc() => {
                detail.push_reg_read(reg::EFLAGS);
                detail.push_group(group::JUMP);
                detail.push_group(group::BRANCH_RELATIVE);
            }
            X86Insn::Int | X86Insn::Int3 | X86Insn::Syscall => detail.push_group(group::INT),
            X86Insn::Hlt => detail.push_group(group::PRIVILEGE),
            k if k.is_string() => {
                let movs = (X86Insn::Movsb as u32..=X86Insn::Movsq as u32).contains(&opcode);
                detail.push_reg_read(reg::EFLAGS);
                detail.push_reg_read(gpr(7, asize, true));
                detail.push_reg_write(gpr(7, asize, true));
                if movs {
                    detail.push_reg_read(gpr(6, asize, true));
                    detail.push_reg_write(gpr(6, asize, true));
                }
                if rep {
                    detail.push_reg_read(gpr(1, asize, true));
                    detail.push_reg_write(gpr(1, asize, true));
                }
            }
            X86Insn::Cmpps => detail.push_group(group::SSE1),
            _ => {}
        }
    }

    fn print(&self, mc: &McInst, state: &ArchState, out: &mut String) {
        let Some(insn) = X86Insn::from_id(mc.opcode) else {
            return;
        };
        let shown = X86Insn::from_id(mc.opcode + mc.popcode_adjust).unwrap_or(insn);
        let enc = Encoding::from_bits_truncate(mc.flags);
        let opsize = (mc.flags >> OPSIZE_SHIFT) as u8;
        let syntax = state
            .printer_info::<Syntax>()
            .copied()
            .unwrap_or(Syntax::Intel);

        if enc.contains(Encoding::LOCK) {
            out.push_str("lock|");
        }
        if enc.contains(Encoding::REP) && insn.is_string() {
            out.push_str("rep|");
        }
        if syntax == Syntax::Att {
            att_mnemonic(shown, opsize, out);
            print_att(insn, mc, state, out);
        } else {
            out.push_str(shown.name());
            print_intel(insn, mc, state, out);
        }
    }

    fn post_printer(&self, _insn: &mut Insn, text: &mut String, mc: &McInst) {
        // 66 90 is still a one-byte nop, but the prefix must stay visible
        let enc = Encoding::from_bits_truncate(mc.flags);
        if mc.opcode == X86Insn::Nop as u32 && mc.operands.is_empty() && enc.contains(Encoding::OPSIZE) {
            text.clear();
            text.push_str("data16|nop");
        }
    }

    fn reg_name(&self, reg: u32) -> Option<&'static str> {
        let r = reg as usize;
        match r {
            1..=16 => Some(GPR8[r - 1]),
            17..=20 => Some(HIGH8[r - 17]),
            21..=36 => Some(GPR16[r - 21]),
            37..=52 => Some(GPR32[r - 37]),
            53..=68 => Some(GPR64[r - 53]),
            69 => Some("rip"),
            70 => Some("eip"),
            71 => Some("ip"),
            72 => Some("flags"),
            73..=78 => Some(SEGMENTS[r - 73]),
            79..=94 => Some(XMM[r - 79]),
            _ => None,
        }
    }

    fn insn_name(&self, id: u32) -> Option<&'static str> {
        match X86Insn::from_id(id)? {
            X86Insn::Invalid => None,
            insn => Some(insn.name()),
        }
    }

    fn group_name(&self, group: u32) -> Option<&'static str> {
        let id = u8::try_from(group).ok()?;
        match id {
            group::JUMP => Some("jump"),
            group::CALL => Some("call"),
            group::RET => Some("ret"),
            group::INT => Some("int"),
            group::IRET => Some("iret"),
            group::PRIVILEGE => Some("privilege"),
            group::BRANCH_RELATIVE => Some("branch_relative"),
            group::SSE1 => Some("sse1"),
            group::MODE64 => Some("mode64"),
            group::NOT64BITMODE => Some("not64bitmode"),
            _ => None,
        }
    }

    fn regs_access(&self, insn: &Insn) -> Option<(Vec<u16>, Vec<u16>)> {
        let detail = insn.detail.as_deref()?;
        let ArchDetail::X86(x86) = &detail.arch else {
            return None;
        };
        let mut read = detail.regs_read().to_vec();
        let mut write = detail.regs_write().to_vec();
        for op in x86.operands() {
            match op.ty {
                X86OpType::Reg => {
                    if op.access.contains(Access::READ) {
                        push_unique(&mut read, op.reg);
                    }
                    if op.access.contains(Access::WRITE) {
                        push_unique(&mut write, op.reg);
                    }
                }
                X86OpType::Mem => {
                    push_unique(&mut read, op.mem.segment);
                    push_unique(&mut read, op.mem.base);
                    push_unique(&mut read, op.mem.index);
                }
                _ => {}
            }
        }
        Some((read, write))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insn::Detail;

    fn decode(mode: Mode, syntax: Syntax, code: &[u8], address: Address) -> Option<(Insn, String)> {
        let mut state = ArchState::new(mode);
        state.detail = true;
        X86Module.global_init(&mut state).unwrap();
        X86Module
            .option(&mut state, &ArchOption::Syntax(syntax))
            .unwrap();
        let mut insn = Insn::with_detail();
        let mc = X86Module.disassemble(&state, code, address, &mut insn)?;
        insn.size = mc.size as u16;
        X86Module.insn_id(&state, &mut insn, mc.opcode);
        let mut text = String::new();
        X86Module.print(&mc, &state, &mut text);
        X86Module.post_printer(&mut insn, &mut text, &mc);
        insn.id += mc.popcode_adjust;
        Some((insn, text))
    }

    fn intel(mode: Mode, code: &[u8]) -> Option<String> {
        decode(mode, Syntax::Intel, code, 0x1000).map(|(_, t)| t)
    }

    fn att(mode: Mode, code: &[u8]) -> Option<String> {
        decode(mode, Syntax::Att, code, 0x1000).map(|(_, t)| t)
    }

    fn x86_detail(insn: &Insn) -> &X86Detail {
        match &insn.detail.as_deref().unwrap().arch {
            ArchDetail::X86(d) => d,
            other => panic!("unexpected detail {:?}", other),
        }
    }

    #[test]
    fn test_basic_64bit_sequence() {
        assert_eq!(intel(Mode::MODE_64, &[0x55]).unwrap(), "push rbp");
        assert_eq!(
            intel(Mode::MODE_64, &[0x48, 0x8b, 0x05, 0xb8, 0x13, 0x00, 0x00]).unwrap(),
            "mov rax, qword ptr [rip + 0x13b8]"
        );
        assert_eq!(intel(Mode::MODE_64, &[0xc3]).unwrap(), "ret");
        assert_eq!(intel(Mode::MODE_64, &[0x48, 0x83, 0xec, 0x10]).unwrap(), "sub rsp, 0x10");
    }

    #[test]
    fn test_intel_and_att_syntax() {
        assert_eq!(intel(Mode::MODE_32, &[0x01, 0xd8]).unwrap(), "add eax, ebx");
        assert_eq!(att(Mode::MODE_32, &[0x01, 0xd8]).unwrap(), "addl %ebx, %eax");
        assert_eq!(att(Mode::MODE_64, &[0x55]).unwrap(), "pushq %rbp");
        assert_eq!(
            att(Mode::MODE_32, &[0x8b, 0x44, 0x24, 0x08]).unwrap(),
            "movl 8(%esp), %eax"
        );
        assert_eq!(att(Mode::MODE_32, &[0xb8, 0x10, 0, 0, 0]).unwrap(), "movl $0x10, %eax");
    }

    #[test]
    fn test_memory_operands() {
        assert_eq!(
            intel(Mode::MODE_32, &[0x8b, 0x44, 0x24, 0x08]).unwrap(),
            "mov eax, dword ptr [esp + 8]"
        );
        assert_eq!(
            intel(Mode::MODE_64, &[0x48, 0x89, 0x45, 0xf8]).unwrap(),
            "mov qword ptr [rbp - 8], rax"
        );
        assert_eq!(
            intel(Mode::MODE_32, &[0x8b, 0x04, 0x98]).unwrap(),
            "mov eax, dword ptr [eax + ebx*4]"
        );
        assert_eq!(
            intel(Mode::MODE_32, &[0x8b, 0x05, 0x00, 0x10, 0x00, 0x00]).unwrap(),
            "mov eax, dword ptr [0x1000]"
        );
        assert_eq!(
            intel(Mode::MODE_64, &[0x48, 0x8d, 0x05, 0x10, 0, 0, 0]).unwrap(),
            "lea rax, [rip + 0x10]"
        );
        assert_eq!(
            intel(Mode::MODE_64, &[0x64, 0x48, 0x8b, 0x04, 0x25, 0x28, 0, 0, 0]).unwrap(),
            "mov rax, qword ptr fs:[0x28]"
        );
    }

    #[test]
    fn test_branch_targets() {
        assert_eq!(intel(Mode::MODE_64, &[0xe8, 0, 0, 0, 0]).unwrap(), "call 0x1005");
        assert_eq!(intel(Mode::MODE_64, &[0xeb, 0xfe]).unwrap(), "jmp 0x1000");
        assert_eq!(intel(Mode::MODE_32, &[0x74, 0x02]).unwrap(), "je 0x1004");
        assert_eq!(intel(Mode::MODE_32, &[0x0f, 0x85, 0x10, 0, 0, 0]).unwrap(), "jne 0x1016");
        assert_eq!(att(Mode::MODE_64, &[0xe8, 0, 0, 0, 0]).unwrap(), "callq 0x1005");
        // 16-bit targets wrap
        assert_eq!(
            decode(Mode::MODE_16, Syntax::Intel, &[0xeb, 0x00], 0xfffe).unwrap().1,
            "jmp 0"
        );
    }

    #[test]
    fn test_prefixed_forms() {
        assert_eq!(
            intel(Mode::MODE_64, &[0xf3, 0xa4]).unwrap(),
            "rep|movsb byte ptr [rdi], byte ptr [rsi]"
        );
        assert_eq!(
            intel(Mode::MODE_32, &[0xab]).unwrap(),
            "stosd dword ptr es:[edi], eax"
        );
        assert_eq!(
            intel(Mode::MODE_64, &[0xf0, 0x01, 0x18]).unwrap(),
            "lock|add dword ptr [rax], ebx"
        );
        assert!(intel(Mode::MODE_64, &[0xf0, 0x01, 0xd8]).is_none());
        assert!(intel(Mode::MODE_64, &[0xf0, 0x39, 0x18]).is_none());
        assert_eq!(intel(Mode::MODE_64, &[0xf3, 0x90]).unwrap(), "pause");
        assert_eq!(intel(Mode::MODE_64, &[0x66, 0x90]).unwrap(), "data16|nop");
    }

    #[test]
    fn test_mode_dependent_encodings() {
        assert_eq!(intel(Mode::MODE_32, &[0x40]).unwrap(), "inc eax");
        // 0x48 is REX.W in 64-bit mode
        assert_eq!(intel(Mode::MODE_64, &[0x48, 0x31, 0xc0]).unwrap(), "xor rax, rax");
        assert_eq!(intel(Mode::MODE_16, &[0x89, 0xd8]).unwrap(), "mov ax, bx");
        assert!(intel(Mode::MODE_16, &[0x89, 0x07]).is_none());
        assert_eq!(
            intel(Mode::MODE_64, &[0x48, 0xb8, 1, 0, 0, 0, 0, 0, 0, 0]).unwrap(),
            "movabs rax, 1"
        );
        assert_eq!(intel(Mode::MODE_64, &[0x41, 0x50]).unwrap(), "push r8");
    }

    #[test]
    fn test_length_limit() {
        let mut code = vec![0x66; 14];
        code.push(0x90);
        assert!(intel(Mode::MODE_64, &code).is_some());
        let mut code = vec![0x66; 15];
        code.push(0x90);
        assert!(intel(Mode::MODE_64, &code).is_none());
    }

    #[test]
    fn test_undecodable() {
        assert!(intel(Mode::MODE_64, &[]).is_none());
        assert!(intel(Mode::MODE_64, &[0x06]).is_none());
        assert!(intel(Mode::MODE_64, &[0x0f, 0xff]).is_none());
        assert!(intel(Mode::MODE_64, &[0xe8, 0x00]).is_none());
        assert!(intel(Mode::MODE_64, &[0x67, 0x8b, 0x00]).is_none());
    }

    #[test]
    fn test_cmpps_pseudo_opcodes() {
        let (insn, text) = decode(Mode::MODE_64, Syntax::Intel, &[0x0f, 0xc2, 0xc1, 0x00], 0).unwrap();
        assert_eq!(text, "cmpeqps xmm0, xmm1");
        assert_eq!(insn.id, X86Insn::Cmpeqps as u32);

        let (insn, text) = decode(Mode::MODE_64, Syntax::Intel, &[0x0f, 0xc2, 0xc1, 0x08], 0).unwrap();
        assert_eq!(text, "cmpps xmm0, xmm1, 8");
        assert_eq!(insn.id, X86Insn::Cmpps as u32);
    }

    #[test]
    fn test_detail_operands_and_implicit_regs() {
        let (insn, _) = decode(Mode::MODE_64, Syntax::Intel, &[0x55], 0).unwrap();
        let detail: &Detail = insn.detail.as_deref().unwrap();
        assert_eq!(detail.regs_read(), &[reg::RSP]);
        assert_eq!(detail.regs_write(), &[reg::RSP]);
        assert!(detail.groups().contains(&group::MODE64));

        let x86 = x86_detail(&insn);
        assert_eq!(x86.operands().len(), 1);
        assert_eq!(x86.operands()[0].ty, X86OpType::Reg);
        assert_eq!(x86.operands()[0].reg, reg::RBP);

        let (insn, _) = decode(Mode::MODE_32, Syntax::Intel, &[0x01, 0xd8], 0).unwrap();
        let x86 = x86_detail(&insn);
        assert_eq!(x86.operands()[0].access, Access::READ_WRITE);
        assert_eq!(x86.operands()[1].access, Access::READ);
        assert!(x86.eflags.contains(EFlags::MODIFY_CF));
        assert_eq!(x86.modrm, 0xd8);
    }

    #[test]
    fn test_regs_access_merges_operands() {
        let (insn, _) = decode(Mode::MODE_32, Syntax::Intel, &[0x01, 0xd8], 0).unwrap();
        let (read, write) = X86Module.regs_access(&insn).unwrap();
        assert_eq!(read, vec![reg::EAX, reg::EBX]);
        assert_eq!(write, vec![reg::EFLAGS, reg::EAX]);

        let (insn, _) = decode(Mode::MODE_64, Syntax::Intel, &[0xf3, 0xa4], 0).unwrap();
        let (read, write) = X86Module.regs_access(&insn).unwrap();
        assert!(read.contains(&reg::RCX));
        assert!(write.contains(&reg::RSI));
    }

    #[test]
    fn test_unsigned_immediates() {
        let mut state = ArchState::new(Mode::MODE_32);
        X86Module.global_init(&mut state).unwrap();
        state.imm_unsigned = true;
        let mut insn = Insn::new();
        let mc = X86Module
            .disassemble(&state, &[0x83, 0xc4, 0xf8], 0, &mut insn)
            .unwrap();
        let mut text = String::new();
        X86Module.print(&mc, &state, &mut text);
        assert_eq!(text, "add esp, 0xfffffff8");
    }

    #[test]
    fn test_syntax_options() {
        let mut state = ArchState::new(Mode::MODE_32);
        assert_eq!(
            X86Module.option(&mut state, &ArchOption::Syntax(Syntax::Masm)),
            Err(Error::X86MasmUnavailable)
        );
        assert_eq!(
            X86Module.option(&mut state, &ArchOption::Syntax(Syntax::NoRegName)),
            Err(Error::InvalidOption)
        );
    }

    #[test]
    fn test_names() {
        assert_eq!(X86Module.reg_name(u32::from(reg::RAX)), Some("rax"));
        assert_eq!(X86Module.reg_name(u32::from(reg::AH)), Some("ah"));
        assert_eq!(X86Module.reg_name(u32::from(reg::XMM0) + 15), Some("xmm15"));
        assert_eq!(X86Module.reg_name(u32::from(reg::ENDING)), None);
        assert_eq!(X86Module.insn_name(X86Insn::Syscall as u32), Some("syscall"));
        assert_eq!(X86Module.insn_name(0), None);
        assert_eq!(X86Module.group_name(u32::from(group::JUMP)), Some("jump"));
    }
}
