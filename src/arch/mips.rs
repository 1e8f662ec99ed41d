//! MIPS32 decoder for the base R, I and J encodings.
//!
//! Byte order follows the session mode. microMIPS is accepted as a mode but
//! nothing decodes in it. The printer emits the common assembler aliases
//! (`move`, `nop`, `b`, `beqz`, `bnez`) and reports them through the alias id.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use super::{detail_mut, write_imm, ArchModule, ArchOption, ArchState, McInst, McOperand, MemRef};
use crate::insn::{ArchDetail, Insn};
use crate::{Address, Arch, Error, Mode, Result, Syntax};

/// MIPS register ids: general purpose register `n` has id `n + 1`.
pub mod reg {
    pub const INVALID: u16 = 0;
    pub const ZERO: u16 = 1;
    pub const AT: u16 = 2;
    pub const V0: u16 = 3;
    pub const A0: u16 = 5;
    pub const T0: u16 = 9;
    pub const S0: u16 = 17;
    pub const GP: u16 = 29;
    pub const SP: u16 = 30;
    pub const FP: u16 = 31;
    pub const RA: u16 = 32;
}

/// MIPS group ids.
pub mod group {
    pub const JUMP: u8 = 1;
    pub const CALL: u8 = 2;
    pub const RET: u8 = 3;
    pub const INT: u8 = 4;
    pub const BRANCH_RELATIVE: u8 = 7;
}

const GPR: [&str; 32] = [
    "zero", "at", "v0", "v1", "a0", "a1", "a2", "a3", "t0", "t1", "t2", "t3", "t4", "t5", "t6",
    "t7", "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "t8", "t9", "k0", "k1", "gp", "sp",
    "fp", "ra",
];

const GPR_NUMERIC: [&str; 32] = [
    "0", "1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11", "12", "13", "14", "15", "16",
    "17", "18", "19", "20", "21", "22", "23", "24", "25", "26", "27", "28", "29", "30", "31",
];

/// Public MIPS instruction ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MipsInsn {
    Invalid = 0,
    Addu,
    Subu,
    And,
    Or,
    Xor,
    Nor,
    Slt,
    Sltu,
    Sll,
    Srl,
    Sra,
    Jr,
    Jalr,
    Syscall,
    Break,
    Addiu,
    Slti,
    Andi,
    Ori,
    Xori,
    Lui,
    Lb,
    Lbu,
    Lh,
    Lw,
    Sb,
    Sh,
    Sw,
    Beq,
    Bne,
    J,
    Jal,
    Move,
    Nop,
    B,
    Beqz,
    Bnez,
}

impl MipsInsn {
    const ALL: [MipsInsn; 38] = [
        MipsInsn::Invalid,
        MipsInsn::Addu,
        MipsInsn::Subu,
        MipsInsn::And,
        MipsInsn::Or,
        MipsInsn::Xor,
        MipsInsn::Nor,
        MipsInsn::Slt,
        MipsInsn::Sltu,
        MipsInsn::Sll,
        MipsInsn::Srl,
        MipsInsn::Sra,
        MipsInsn::Jr,
        MipsInsn::Jalr,
        MipsInsn::Syscall,
        MipsInsn::Break,
        MipsInsn::Addiu,
        MipsInsn::Slti,
        MipsInsn::Andi,
        MipsInsn::Ori,
        MipsInsn::Xori,
        MipsInsn::Lui,
        MipsInsn::Lb,
        MipsInsn::Lbu,
        MipsInsn::Lh,
        MipsInsn::Lw,
        MipsInsn::Sb,
        MipsInsn::Sh,
        MipsInsn::Sw,
        MipsInsn::Beq,
        MipsInsn::Bne,
        MipsInsn::J,
        MipsInsn::Jal,
        MipsInsn::Move,
        MipsInsn::Nop,
        MipsInsn::B,
        MipsInsn::Beqz,
        MipsInsn::Bnez,
    ];

    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            MipsInsn::Invalid => "invalid",
            MipsInsn::Addu => "addu",
            MipsInsn::Subu => "subu",
            MipsInsn::And => "and",
            MipsInsn::Or => "or",
            MipsInsn::Xor => "xor",
            MipsInsn::Nor => "nor",
            MipsInsn::Slt => "slt",
            MipsInsn::Sltu => "sltu",
            MipsInsn::Sll => "sll",
            MipsInsn::Srl => "srl",
            MipsInsn::Sra => "sra",
            MipsInsn::Jr => "jr",
            MipsInsn::Jalr => "jalr",
            MipsInsn::Syscall => "syscall",
            MipsInsn::Break => "break",
            MipsInsn::Addiu => "addiu",
            MipsInsn::Slti => "slti",
            MipsInsn::Andi => "andi",
            MipsInsn::Ori => "ori",
            MipsInsn::Xori => "xori",
            MipsInsn::Lui => "lui",
            MipsInsn::Lb => "lb",
            MipsInsn::Lbu => "lbu",
            MipsInsn::Lh => "lh",
            MipsInsn::Lw => "lw",
            MipsInsn::Sb => "sb",
            MipsInsn::Sh => "sh",
            MipsInsn::Sw => "sw",
            MipsInsn::Beq => "beq",
            MipsInsn::Bne => "bne",
            MipsInsn::J => "j",
            MipsInsn::Jal => "jal",
            MipsInsn::Move => "move",
            MipsInsn::Nop => "nop",
            MipsInsn::B => "b",
            MipsInsn::Beqz => "beqz",
            MipsInsn::Bnez => "bnez",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum MipsOpType {
    #[default]
    Invalid = 0,
    Reg = 1,
    Imm = 2,
    Mem = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MipsOp {
    pub ty: MipsOpType,
    pub reg: u16,
    pub imm: i64,
    /// Base register and displacement
    pub mem: MemRef,
}

/// The MIPS part of a detail block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MipsDetail {
    pub op_count: u8,
    pub operands: [MipsOp; 8],
}

impl MipsDetail {
    pub fn operands(&self) -> &[MipsOp] {
        &self.operands[..self.op_count as usize]
    }
}

impl Serialize for MipsDetail {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("MipsDetail", 1)?;
        s.serialize_field("operands", self.operands())?;
        s.end()
    }
}

/// The MIPS module.
#[derive(Debug, Clone, Copy, Default)]
pub struct MipsModule;

fn gpr(n: u32) -> McOperand {
    McOperand::Reg {
        reg: (n & 31) as u16 + 1,
        size: 4,
    }
}

fn imm(value: i64) -> McOperand {
    McOperand::Imm { value, size: 4 }
}

fn simm16(word: u32) -> i64 {
    i64::from(word as u16 as i16)
}

fn uimm16(word: u32) -> i64 {
    i64::from(word as u16)
}

fn address_mask(mode: Mode) -> u64 {
    if mode.contains(Mode::MODE_64) {
        u64::MAX
    } else {
        0xffff_ffff
    }
}

/// Decode one word into the primary instruction, its alias and its operands.
fn decode(word: u32, address: Address, mode: Mode) -> Option<(MipsInsn, Option<MipsInsn>, Vec<McOperand>)> {
    let op = word >> 26;
    let rs = (word >> 21) & 31;
    let rt = (word >> 16) & 31;
    let rd = (word >> 11) & 31;
    let sa = (word >> 6) & 31;
    let mask = address_mask(mode);
    let branch = |word: u32| {
        let target = address.wrapping_add(4).wrapping_add((simm16(word) << 2) as u64) & mask;
        imm(target as i64)
    };

    let decoded = match op {
        0x00 => {
            let funct = word & 0x3f;
            match funct {
                0x00 if word == 0 => (MipsInsn::Sll, Some(MipsInsn::Nop), vec![]),
                0x00 => (MipsInsn::Sll, None, vec![gpr(rd), gpr(rt), imm(i64::from(sa))]),
                0x02 => (MipsInsn::Srl, None, vec![gpr(rd), gpr(rt), imm(i64::from(sa))]),
                0x03 => (MipsInsn::Sra, None, vec![gpr(rd), gpr(rt), imm(i64::from(sa))]),
                0x08 => (MipsInsn::Jr, None, vec![gpr(rs)]),
                0x09 if rd == 31 => (MipsInsn::Jalr, None, vec![gpr(rs)]),
                0x09 => (MipsInsn::Jalr, None, vec![gpr(rd), gpr(rs)]),
                0x0c => (MipsInsn::Syscall, None, vec![]),
                0x0d => (MipsInsn::Break, None, vec![]),
                0x21 | 0x25 if rt == 0 => {
                    let primary = if funct == 0x21 { MipsInsn::Addu } else { MipsInsn::Or };
                    (primary, Some(MipsInsn::Move), vec![gpr(rd), gpr(rs)])
                }
                0x21..=0x27 | 0x2a | 0x2b => {
                    let insn = match funct {
                        0x21 => MipsInsn::Addu,
                        0x23 => MipsInsn::Subu,
                        0x24 => MipsInsn::And,
                        0x25 => MipsInsn::Or,
                        0x26 => MipsInsn::Xor,
                        0x27 => MipsInsn::Nor,
                        0x2a => MipsInsn::Slt,
                        0x2b => MipsInsn::Sltu,
                        _ => return None,
                    };
                    (insn, None, vec![gpr(rd), gpr(rs), gpr(rt)])
                }
                _ => return None,
            }
        }
        0x02 | 0x03 => {
            let region = address.wrapping_add(4) & 0xffff_ffff_f000_0000;
            let target = (region | (u64::from(word & 0x03ff_ffff) << 2)) & mask;
            let insn = if op == 0x02 { MipsInsn::J } else { MipsInsn::Jal };
            (insn, None, vec![imm(target as i64)])
        }
        0x04 if rs == 0 && rt == 0 => (MipsInsn::Beq, Some(MipsInsn::B), vec![branch(word)]),
        0x04 if rt == 0 => (MipsInsn::Beq, Some(MipsInsn::Beqz), vec![gpr(rs), branch(word)]),
        0x05 if rt == 0 => (MipsInsn::Bne, Some(MipsInsn::Bnez), vec![gpr(rs), branch(word)]),
        0x04 => (MipsInsn::Beq, None, vec![gpr(rs), gpr(rt), branch(word)]),
        0x05 => (MipsInsn::Bne, None, vec![gpr(rs), gpr(rt), branch(word)]),
        0x09 => (MipsInsn::Addiu, None, vec![gpr(rt), gpr(rs), imm(simm16(word))]),
        0x0a => (MipsInsn::Slti, None, vec![gpr(rt), gpr(rs), imm(simm16(word))]),
        0x0c => (MipsInsn::Andi, None, vec![gpr(rt), gpr(rs), imm(uimm16(word))]),
        0x0d => (MipsInsn::Ori, None, vec![gpr(rt), gpr(rs), imm(uimm16(word))]),
        0x0e => (MipsInsn::Xori, None, vec![gpr(rt), gpr(rs), imm(uimm16(word))]),
        0x0f => (MipsInsn::Lui, None, vec![gpr(rt), imm(uimm16(word))]),
        0x20 | 0x21 | 0x23 | 0x24 | 0x28 | 0x29 | 0x2b => {
            let (insn, size) = match op {
                0x20 => (MipsInsn::Lb, 1),
                0x21 => (MipsInsn::Lh, 2),
                0x23 => (MipsInsn::Lw, 4),
                0x24 => (MipsInsn::Lbu, 1),
                0x28 => (MipsInsn::Sb, 1),
                0x29 => (MipsInsn::Sh, 2),
                _ => (MipsInsn::Sw, 4),
            };
            let mem = MemRef {
                base: (rs as u16) + 1,
                disp: simm16(word),
                scale: 1,
                ..MemRef::default()
            };
            (insn, None, vec![gpr(rt), McOperand::Mem { mem, size }])
        }
        _ => return None,
    };
    Some(decoded)
}

fn numeric_regs(state: &ArchState) -> bool {
    state.printer_info::<Syntax>() == Some(&Syntax::NoRegName)
}

impl ArchModule for MipsModule {
    fn arch(&self) -> Arch {
        Arch::Mips
    }

    fn option(&self, state: &mut ArchState, option: &ArchOption) -> Result<()> {
        match option {
            ArchOption::Mode(mode) => {
                state.mode = *mode;
                Ok(())
            }
            ArchOption::Syntax(syntax @ (Syntax::Default | Syntax::NoRegName)) => {
                state.printer_info = Some(Box::new(*syntax));
                Ok(())
            }
            ArchOption::Syntax(_) => Err(Error::InvalidOption),
        }
    }

    fn disassemble(
        &self,
        state: &ArchState,
        code: &[u8],
        address: Address,
        insn: &mut Insn,
    ) -> Option<McInst> {
        if state.mode.contains(Mode::MICRO) {
            return None;
        }
        let bytes: [u8; 4] = code.get(..4)?.try_into().ok()?;
        let word = if state.mode.contains(Mode::BIG_ENDIAN) {
            u32::from_be_bytes(bytes)
        } else {
            u32::from_le_bytes(bytes)
        };
        let (primary, alias, operands) = decode(word, address, state.mode)?;

        if let Some(detail) = detail_mut(state, insn) {
            let mut mips = MipsDetail::default();
            for (slot, op) in mips.operands.iter_mut().zip(&operands) {
                *slot = match *op {
                    McOperand::Reg { reg, .. } => MipsOp {
                        ty: MipsOpType::Reg,
                        reg,
                        ..MipsOp::default()
                    },
                    McOperand::Imm { value, .. } => MipsOp {
                        ty: MipsOpType::Imm,
                        imm: value,
                        ..MipsOp::default()
                    },
                    McOperand::Mem { mem, .. } => MipsOp {
                        ty: MipsOpType::Mem,
                        mem,
                        ..MipsOp::default()
                    },
                };
                mips.op_count += 1;
            }
            detail.arch = ArchDetail::Mips(mips);
        }

        Some(McInst {
            opcode: primary as u32,
            opcode_pub: alias.map_or(0, |a| a as u32),
            size: 4,
            address,
            operands,
            ..McInst::default()
        })
    }

    fn insn_id(&self, state: &ArchState, insn: &mut Insn, opcode: u32) {
        insn.id = opcode;
        let Some(kind) = MipsInsn::from_id(opcode) else {
            return;
        };
        let Some(detail) = detail_mut(state, insn) else {
            return;
        };
        let first_reg = match &detail.arch {
            ArchDetail::Mips(m) => m.operands().first().map(|op| op.reg),
            _ => None,
        };
        match kind {
            MipsInsn::J => detail.push_group(group::JUMP),
            MipsInsn::Jal => {
                detail.push_reg_write(reg::RA);
                detail.push_group(group::CALL);
            }
            MipsInsn::Jalr => {
                detail.push_reg_write(reg::RA);
                detail.push_group(group::CALL);
            }
            MipsInsn::Jr => {
                detail.push_group(group::JUMP);
                if first_reg == Some(reg::RA) {
                    detail.push_group(group::RET);
                }
            }
            MipsInsn::Beq | MipsInsn::Bne => {
                detail.push_group(group::JUMP);
                detail.push_group(group::BRANCH_RELATIVE);
            }
            MipsInsn::Syscall | MipsInsn::Break => detail.push_group(group::INT),
            _ => {}
        }
    }

    fn print(&self, mc: &McInst, state: &ArchState, out: &mut String) {
        let shown = if mc.opcode_pub != 0 { mc.opcode_pub } else { mc.opcode };
        let Some(insn) = MipsInsn::from_id(shown) else {
            return;
        };
        let names = if numeric_regs(state) { &GPR_NUMERIC } else { &GPR };
        let reg_text = |reg: u16| names[usize::from(reg.saturating_sub(1)) & 31];

        out.push_str(insn.name());
        for (i, op) in mc.operands.iter().enumerate() {
            out.push_str(if i == 0 { "\t" } else { ", " });
            match *op {
                McOperand::Reg { reg, .. } => {
                    out.push('$');
                    out.push_str(reg_text(reg));
                }
                McOperand::Imm { value, size } => write_imm(out, value, size, state.imm_unsigned),
                McOperand::Mem { mem, .. } => {
                    write_imm(out, mem.disp, 2, state.imm_unsigned);
                    out.push_str("($");
                    out.push_str(reg_text(mem.base));
                    out.push(')');
                }
            }
        }
    }

    fn reg_name(&self, reg: u32) -> Option<&'static str> {
        match reg {
            1..=32 => Some(GPR[reg as usize - 1]),
            _ => None,
        }
    }

    fn insn_name(&self, id: u32) -> Option<&'static str> {
        match MipsInsn::from_id(id)? {
            MipsInsn::Invalid => None,
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
            group::BRANCH_RELATIVE => Some("branch_relative"),
            _ => None,
        }
    }
}
