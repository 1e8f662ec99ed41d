//! Ethereum virtual machine decoder.
//!
//! Every defined opcode decodes; `PUSHn` carries its `n` immediate bytes.
//! Public ids are the opcode byte plus one, so that id 0 keeps meaning
//! skipped data.

use std::fmt::Write;

use serde::Serialize;

use super::{detail_mut, ArchModule, ArchState, McInst, McOperand};
use crate::insn::{ArchDetail, Insn};
use crate::{Address, Arch};

/// EVM group ids.
pub mod group {
    pub const JUMP: u8 = 1;
    pub const MATH: u8 = 8;
    pub const STACK_WRITE: u8 = 9;
    pub const STACK_READ: u8 = 10;
    pub const MEM_WRITE: u8 = 11;
    pub const MEM_READ: u8 = 12;
    pub const STORE_WRITE: u8 = 13;
    pub const STORE_READ: u8 = 14;
    pub const HALT: u8 = 15;
}

/// The EVM part of a detail block: stack effect and base gas fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EvmDetail {
    /// Stack items consumed
    pub pop: u8,
    /// Stack items produced
    pub push: u8,
    /// Base gas cost
    pub fee: u32,
}

#[derive(Debug, Clone, Copy)]
struct OpInfo {
    name: &'static str,
    pop: u8,
    push: u8,
    fee: u32,
    group: Option<u8>,
}

const fn op(name: &'static str, pop: u8, push: u8, fee: u32, group: Option<u8>) -> OpInfo {
    OpInfo {
        name,
        pop,
        push,
        fee,
        group,
    }
}

const PUSH: [&str; 32] = [
    "push1", "push2", "push3", "push4", "push5", "push6", "push7", "push8", "push9", "push10",
    "push11", "push12", "push13", "push14", "push15", "push16", "push17", "push18", "push19",
    "push20", "push21", "push22", "push23", "push24", "push25", "push26", "push27", "push28",
    "push29", "push30", "push31", "push32",
];
const DUP: [&str; 16] = [
    "dup1", "dup2", "dup3", "dup4", "dup5", "dup6", "dup7", "dup8", "dup9", "dup10", "dup11",
    "dup12", "dup13", "dup14", "dup15", "dup16",
];
const SWAP: [&str; 16] = [
    "swap1", "swap2", "swap3", "swap4", "swap5", "swap6", "swap7", "swap8", "swap9", "swap10",
    "swap11", "swap12", "swap13", "swap14", "swap15", "swap16",
];
const LOG: [&str; 5] = ["log0", "log1", "log2", "log3", "log4"];

fn info(opcode: u8) -> Option<OpInfo> {
    use group::*;

    let math = Some(MATH);
    Some(match opcode {
        0x00 => op("stop", 0, 0, 0, Some(HALT)),
        0x01 => op("add", 2, 1, 3, math),
        0x02 => op("mul", 2, 1, 5, math),
        0x03 => op("sub", 2, 1, 3, math),
        0x04 => op("div", 2, 1, 5, math),
        0x05 => op("sdiv", 2, 1, 5, math),
        0x06 => op("mod", 2, 1, 5, math),
        0x07 => op("smod", 2, 1, 5, math),
        0x08 => op("addmod", 3, 1, 8, math),
        0x09 => op("mulmod", 3, 1, 8, math),
        0x0a => op("exp", 2, 1, 10, math),
        0x0b => op("signextend", 2, 1, 5, math),
        0x10 => op("lt", 2, 1, 3, math),
        0x11 => op("gt", 2, 1, 3, math),
        0x12 => op("slt", 2, 1, 3, math),
        0x13 => op("sgt", 2, 1, 3, math),
        0x14 => op("eq", 2, 1, 3, math),
        0x15 => op("iszero", 1, 1, 3, math),
        0x16 => op("and", 2, 1, 3, math),
        0x17 => op("or", 2, 1, 3, math),
        0x18 => op("xor", 2, 1, 3, math),
        0x19 => op("not", 1, 1, 3, math),
        0x1a => op("byte", 2, 1, 3, math),
        0x1b => op("shl", 2, 1, 3, math),
        0x1c => op("shr", 2, 1, 3, math),
        0x1d => op("sar", 2, 1, 3, math),
        0x20 => op("sha3", 2, 1, 30, math),
        0x30 => op("address", 0, 1, 2, None),
        0x31 => op("balance", 1, 1, 400, None),
        0x32 => op("origin", 0, 1, 2, None),
        0x33 => op("caller", 0, 1, 2, None),
        0x34 => op("callvalue", 0, 1, 2, None),
        0x35 => op("calldataload", 1, 1, 3, None),
        0x36 => op("calldatasize", 0, 1, 2, None),
        0x37 => op("calldatacopy", 3, 0, 3, Some(MEM_WRITE)),
        0x38 => op("codesize", 0, 1, 2, None),
        0x39 => op("codecopy", 3, 0, 3, Some(MEM_WRITE)),
        0x3a => op("gasprice", 0, 1, 2, None),
        0x3b => op("extcodesize", 1, 1, 700, None),
        0x3c => op("extcodecopy", 4, 0, 700, Some(MEM_WRITE)),
        0x3d => op("returndatasize", 0, 1, 2, None),
        0x3e => op("returndatacopy", 3, 0, 3, Some(MEM_WRITE)),
        0x3f => op("extcodehash", 1, 1, 400, None),
        0x40 => op("blockhash", 1, 1, 20, None),
        0x41 => op("coinbase", 0, 1, 2, None),
        0x42 => op("timestamp", 0, 1, 2, None),
        0x43 => op("number", 0, 1, 2, None),
        0x44 => op("difficulty", 0, 1, 2, None),
        0x45 => op("gaslimit", 0, 1, 2, None),
        0x50 => op("pop", 1, 0, 2, Some(STACK_READ)),
        0x51 => op("mload", 1, 1, 3, Some(MEM_READ)),
        0x52 => op("mstore", 2, 0, 3, Some(MEM_WRITE)),
        0x53 => op("mstore8", 2, 0, 3, Some(MEM_WRITE)),
        0x54 => op("sload", 1, 1, 200, Some(STORE_READ)),
        0x55 => op("sstore", 2, 0, 5000, Some(STORE_WRITE)),
        0x56 => op("jump", 1, 0, 8, Some(JUMP)),
        0x57 => op("jumpi", 2, 0, 10, Some(JUMP)),
        0x58 => op("pc", 0, 1, 2, None),
        0x59 => op("msize", 0, 1, 2, None),
        0x5a => op("gas", 0, 1, 2, None),
        0x5b => op("jumpdest", 0, 0, 1, None),
        0x60..=0x7f => op(PUSH[usize::from(opcode - 0x60)], 0, 1, 3, Some(STACK_WRITE)),
        0x80..=0x8f => {
            let n = opcode - 0x80 + 1;
            op(DUP[usize::from(n - 1)], n, n + 1, 3, Some(STACK_WRITE))
        }
        0x90..=0x9f => {
            let n = opcode - 0x90 + 1;
            op(SWAP[usize::from(n - 1)], n + 1, n + 1, 3, Some(STACK_WRITE))
        }
        0xa0..=0xa4 => {
            let n = opcode - 0xa0;
            op(LOG[usize::from(n)], n + 2, 0, 375 * (u32::from(n) + 1), Some(MEM_READ))
        }
        0xf0 => op("create", 3, 1, 32000, None),
        0xf1 => op("call", 7, 1, 700, None),
        0xf2 => op("callcode", 7, 1, 700, None),
        0xf3 => op("return", 2, 0, 0, Some(HALT)),
        0xf4 => op("delegatecall", 6, 1, 700, None),
        0xf5 => op("create2", 4, 1, 32000, None),
        0xfa => op("staticcall", 6, 1, 700, None),
        0xfd => op("revert", 2, 0, 0, Some(HALT)),
        0xff => op("selfdestruct", 1, 0, 5000, Some(HALT)),
        _ => return None,
    })
}

fn opcode_of(id: u32) -> Option<u8> {
    u8::try_from(id.checked_sub(1)?).ok()
}

/// The EVM module.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvmModule;

impl ArchModule for EvmModule {
    fn arch(&self) -> Arch {
        Arch::Evm
    }

    fn disassemble(
        &self,
        state: &ArchState,
        code: &[u8],
        address: Address,
        insn: &mut Insn,
    ) -> Option<McInst> {
        let opcode = *code.first()?;
        let info = info(opcode)?;
        let mut size = 1;
        let mut operands = Vec::new();
        if (0x60..=0x7f).contains(&opcode) {
            let n = usize::from(opcode - 0x60) + 1;
            let data = code.get(1..1 + n)?;
            size += n;
            // big-endian chunks of at most 8 bytes, most significant first
            let (head, tail) = data.split_at(n % 8);
            let chunks = Some(head)
                .filter(|h| !h.is_empty())
                .into_iter()
                .chain(tail.chunks(8));
            for chunk in chunks {
                let value = chunk.iter().fold(0u64, |acc, b| acc << 8 | u64::from(*b));
                operands.push(McOperand::Imm {
                    value: value as i64,
                    size: chunk.len() as u8,
                });
            }
        }

        if let Some(detail) = detail_mut(state, insn) {
            detail.arch = ArchDetail::Evm(EvmDetail {
                pop: info.pop,
                push: info.push,
                fee: info.fee,
            });
        }

        Some(McInst {
            opcode: u32::from(opcode) + 1,
            size,
            address,
            operands,
            ..McInst::default()
        })
    }

    fn insn_id(&self, state: &ArchState, insn: &mut Insn, opcode: u32) {
        insn.id = opcode;
        let Some(info) = opcode_of(opcode).and_then(info) else {
            return;
        };
        if let (Some(detail), Some(group)) = (detail_mut(state, insn), info.group) {
            detail.push_group(group);
        }
    }

    fn print(&self, mc: &McInst, _state: &ArchState, out: &mut String) {
        let Some(info) = opcode_of(mc.opcode).and_then(info) else {
            return;
        };
        out.push_str(info.name);
        if !mc.operands.is_empty() {
            out.push_str("\t0x");
        }
        for op in &mc.operands {
            if let McOperand::Imm { value, size } = *op {
                let _ = write!(out, "{:0width$x}", value as u64, width = usize::from(size) * 2);
            }
        }
    }

    fn reg_name(&self, _reg: u32) -> Option<&'static str> {
        None
    }

    fn insn_name(&self, id: u32) -> Option<&'static str> {
        opcode_of(id).and_then(info).map(|i| i.name)
    }

    fn group_name(&self, group: u32) -> Option<&'static str> {
        let id = u8::try_from(group).ok()?;
        match id {
            group::JUMP => Some("jump"),
            group::MATH => Some("math"),
            group::STACK_WRITE => Some("stack_write"),
            group::STACK_READ => Some("stack_read"),
            group::MEM_WRITE => Some("mem_write"),
            group::MEM_READ => Some("mem_read"),
            group::STORE_WRITE => Some("store_write"),
            group::STORE_READ => Some("store_read"),
            group::HALT => Some("halt"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Mode;

    fn render(code: &[u8]) -> Option<(Insn, McInst, String)> {
        let mut state = ArchState::new(Mode::empty());
        state.detail = true;
        let mut insn = Insn::with_detail();
        let mc = EvmModule.disassemble(&state, code, 0, &mut insn)?;
        EvmModule.insn_id(&state, &mut insn, mc.opcode);
        let mut text = String::new();
        EvmModule.print(&mc, &state, &mut text);
        Some((insn, mc, text))
    }

    #[test]
    fn test_push_immediates() {
        let (_, mc, text) = render(&[0x60, 0x80]).unwrap();
        assert_eq!(text, "push1\t0x80");
        assert_eq!(mc.size, 2);

        let (_, _, text) = render(&[0x61, 0x01, 0x00]).unwrap();
        assert_eq!(text, "push2\t0x0100");

        let mut code = vec![0x7f];
        code.extend(1..=32u8);
        let (_, mc, text) = render(&code).unwrap();
        assert_eq!(mc.size, 33);
        assert_eq!(mc.operands.len(), 4);
        let expected: String = (1..=32u8).map(|b| format!("{:02x}", b)).collect();
        assert_eq!(text, format!("push32\t0x{}", expected));

        let mut code = vec![0x6a];
        code.extend([0xaa; 11]);
        let (_, mc, text) = render(&code).unwrap();
        assert_eq!(mc.operands.len(), 2);
        assert_eq!(text, format!("push11\t0x{}", "aa".repeat(11)));
    }

    #[test]
    fn test_truncated_push_does_not_decode() {
        assert!(render(&[0x61, 0x01]).is_none());
    }

    #[test]
    fn test_ids_reserve_zero() {
        let (insn, _, text) = render(&[0x00]).unwrap();
        assert_eq!(text, "stop");
        assert_eq!(insn.id, 1);
        assert_eq!(EvmModule.insn_name(insn.id), Some("stop"));
        assert_eq!(EvmModule.insn_name(0), None);
    }

    #[test]
    fn test_detail_stack_effect_and_groups() {
        let (insn, _, _) = render(&[0x57]).unwrap();
        let detail = insn.detail.as_deref().unwrap();
        assert_eq!(detail.groups(), &[group::JUMP]);
        assert_eq!(
            detail.arch,
            ArchDetail::Evm(EvmDetail {
                pop: 2,
                push: 0,
                fee: 10
            })
        );
        assert_eq!(detail.arch.operand_types(), Some(vec![]));

        let (insn, _, text) = render(&[0x93]).unwrap();
        assert_eq!(text, "swap4");
        assert_eq!(
            insn.detail.unwrap().arch,
            ArchDetail::Evm(EvmDetail {
                pop: 5,
                push: 5,
                fee: 3
            })
        );
    }

    #[test]
    fn test_unknown_opcodes() {
        for opcode in [0x0c, 0x21, 0x46, 0x5c, 0xa5, 0xef, 0xfe] {
            assert!(render(&[opcode]).is_none(), "0x{:02x} decoded", opcode);
        }
        assert!(render(&[]).is_none());
    }

    #[test]
    fn test_group_names() {
        assert_eq!(EvmModule.group_name(u32::from(group::HALT)), Some("halt"));
        assert_eq!(EvmModule.group_name(2), None);
        assert_eq!(EvmModule.reg_name(1), None);
    }
}
