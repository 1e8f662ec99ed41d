//! Read-only queries over a record's detail block.
//!
//! Every query is gated the same way, and each failure is also recorded as
//! the session's last error:
//!
//! 1. the session must be open ([`Error::InvalidHandle`]),
//! 2. detail mode must be on ([`Error::DetailUnavailable`]),
//! 3. the record must not be skipped data ([`Error::SkippedDataHasNoDetail`]),
//! 4. the record must carry a detail block ([`Error::DetailUnavailable`]).

use serde::Serialize;

use crate::insn::{Detail, Insn};
use crate::session::SessionState;
use crate::{Error, Result, Session};

/// Every register an instruction reads and writes, explicit and implicit.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RegsAccess {
    pub read: Vec<u16>,
    pub write: Vec<u16>,
}

impl Session {
    fn gated<'i>(&self, insn: &'i Insn) -> Result<(&SessionState, &'i Detail)> {
        let state = self.state()?;
        if !state.ctx.detail {
            return Err(state.fail(Error::DetailUnavailable));
        }
        if insn.is_data() {
            return Err(state.fail(Error::SkippedDataHasNoDetail));
        }
        let detail = insn
            .detail
            .as_deref()
            .ok_or_else(|| state.fail(Error::DetailUnavailable))?;
        Ok((state, detail))
    }

    fn operand_types(&self, insn: &Insn) -> Result<Vec<u8>> {
        let (state, detail) = self.gated(insn)?;
        detail
            .arch
            .operand_types()
            .ok_or_else(|| state.fail(Error::UnsupportedArchitecture))
    }

    /// Whether `insn` belongs to group `group`.
    pub fn insn_group(&self, insn: &Insn, group: u8) -> Result<bool> {
        let (_, detail) = self.gated(insn)?;
        Ok(detail.groups().contains(&group))
    }

    /// Whether `insn` implicitly reads register `reg`.
    pub fn reg_read(&self, insn: &Insn, reg: u16) -> Result<bool> {
        let (_, detail) = self.gated(insn)?;
        Ok(detail.regs_read().contains(&reg))
    }

    /// Whether `insn` implicitly writes register `reg`.
    pub fn reg_write(&self, insn: &Insn, reg: u16) -> Result<bool> {
        let (_, detail) = self.gated(insn)?;
        Ok(detail.regs_write().contains(&reg))
    }

    /// Number of explicit operands of type `op_type`.
    pub fn op_count(&self, insn: &Insn, op_type: u8) -> Result<usize> {
        let types = self.operand_types(insn)?;
        Ok(types.iter().filter(|&&t| t == op_type).count())
    }

    /// Index of the `position`-th (1-based) operand of type `op_type`.
    pub fn op_index(&self, insn: &Insn, op_type: u8, position: usize) -> Result<Option<usize>> {
        let types = self.operand_types(insn)?;
        if position == 0 {
            return Ok(None);
        }
        Ok(types
            .iter()
            .enumerate()
            .filter(|(_, t)| **t == op_type)
            .nth(position - 1)
            .map(|(i, _)| i))
    }

    /// All registers read and written by `insn`.
    pub fn regs_access(&self, insn: &Insn) -> Result<RegsAccess> {
        if cfg!(feature = "diet") {
            if let Some(state) = self.state.as_deref() {
                state.fail(Error::DietModeUnsupported);
            }
            return Err(Error::DietModeUnsupported);
        }
        let (state, _) = self.gated(insn)?;
        let (read, write) = state
            .module
            .regs_access(insn)
            .ok_or_else(|| state.fail(Error::UnsupportedArchitecture))?;
        Ok(RegsAccess { read, write })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::x86::{group, reg, X86OpType};
    use crate::{Arch, Mode, SessionOption};

    fn x86_detail_session() -> Session {
        let mut session = Session::open(Arch::X86, Mode::MODE_64).unwrap();
        session.configure(SessionOption::Detail(true)).unwrap();
        session
    }

    #[test]
    fn test_gating_order() {
        let mut session = Session::open(Arch::X86, Mode::MODE_64).unwrap();
        let plain = session.disasm_all(&[0xc3], 0).unwrap();
        assert_eq!(session.insn_group(&plain[0], group::RET), Err(Error::DetailUnavailable));
        assert_eq!(session.errno(), Some(Error::DetailUnavailable));

        session.configure(SessionOption::Detail(true)).unwrap();
        // decoded without detail, queried with detail on
        assert_eq!(session.reg_read(&plain[0], reg::RSP), Err(Error::DetailUnavailable));

        let data = Insn::with_detail();
        assert_eq!(session.op_count(&data, 1), Err(Error::SkippedDataHasNoDetail));
        assert_eq!(session.errno(), Some(Error::SkippedDataHasNoDetail));

        session.close().unwrap();
        assert_eq!(session.reg_write(&plain[0], reg::RSP), Err(Error::InvalidHandle));
    }

    #[test]
    fn test_groups_and_implicit_registers() {
        let mut session = x86_detail_session();
        // call rel32; ret
        let insns = session.disasm_all(&[0xe8, 0, 0, 0, 0, 0xc3], 0x1000).unwrap();
        let call = &insns[0];
        assert_eq!(session.insn_group(call, group::CALL), Ok(true));
        assert_eq!(session.insn_group(call, group::JUMP), Ok(false));
        assert_eq!(session.reg_read(call, reg::RSP), Ok(true));
        assert_eq!(session.reg_write(call, reg::RSP), Ok(true));
        assert_eq!(session.reg_write(call, reg::RAX), Ok(false));
        assert_eq!(session.insn_group(&insns[1], group::RET), Ok(true));
    }

    #[test]
    fn test_operand_counting() {
        let mut session = x86_detail_session();
        // mov rax, [rip + 0x13b8]
        let insns = session
            .disasm_all(&[0x48, 0x8b, 0x05, 0xb8, 0x13, 0x00, 0x00], 0)
            .unwrap();
        let mov = &insns[0];
        let reg_ty = X86OpType::Reg as u8;
        let mem_ty = X86OpType::Mem as u8;

        assert_eq!(session.op_count(mov, reg_ty), Ok(1));
        assert_eq!(session.op_count(mov, mem_ty), Ok(1));
        assert_eq!(session.op_count(mov, X86OpType::Imm as u8), Ok(0));
        assert_eq!(session.op_index(mov, mem_ty, 1), Ok(Some(1)));
        assert_eq!(session.op_index(mov, reg_ty, 1), Ok(Some(0)));
        assert_eq!(session.op_index(mov, reg_ty, 2), Ok(None));
        assert_eq!(session.op_index(mov, reg_ty, 0), Ok(None));
    }

    #[test]
    fn test_block_without_arch_part() {
        let session = x86_detail_session();
        let mut insn = Insn::with_detail();
        insn.id = 1;
        assert_eq!(session.op_count(&insn, 1), Err(Error::UnsupportedArchitecture));
        assert_eq!(session.insn_group(&insn, 1), Ok(false));
    }

    #[cfg(not(feature = "diet"))]
    #[test]
    fn test_regs_access() {
        let mut session = x86_detail_session();
        // add eax, ebx
        let insns = session.disasm_all(&[0x01, 0xd8], 0).unwrap();
        let access = session.regs_access(&insns[0]).unwrap();
        assert!(access.read.contains(&reg::EAX));
        assert!(access.read.contains(&reg::EBX));
        assert!(access.write.contains(&reg::EAX));
        assert!(access.write.contains(&reg::EFLAGS));
        assert!(!access.write.contains(&reg::EBX));
    }

    #[cfg(not(feature = "diet"))]
    #[test]
    fn test_regs_access_unsupported_module() {
        let mut session = Session::open(Arch::Mips, Mode::MODE_32).unwrap();
        session.configure(SessionOption::Detail(true)).unwrap();
        // addiu $sp, $sp, -0x20
        let insns = session.disasm_all(&[0xe0, 0xff, 0xbd, 0x27], 0).unwrap();
        assert_eq!(
            session.regs_access(&insns[0]),
            Err(Error::UnsupportedArchitecture)
        );
        assert_eq!(session.errno(), Some(Error::UnsupportedArchitecture));
    }
}
