//! Decoding one instruction at a time into a caller-owned record.

use crate::disasm::decode_one;
use crate::insn::Insn;
use crate::skipdata;
use crate::{Address, Session};

/// Position of the iterative decoder in a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor<'a> {
    /// Bytes not yet decoded
    pub code: &'a [u8],
    /// Address of `code[0]`
    pub address: Address,
}

impl<'a> Cursor<'a> {
    pub fn new(code: &'a [u8], address: Address) -> Self {
        Self { code, address }
    }

    fn advance(&mut self, n: usize) {
        self.code = &self.code[n..];
        self.address = self.address.wrapping_add(n as u64);
    }
}

impl Session {
    /// Decode the instruction at `cursor` into `insn` and move past it.
    ///
    /// Returns `false`, leaving the cursor where it was, when the bytes
    /// neither decode nor can be skipped as data, when the buffer is empty,
    /// or when the session is closed. `insn` is decoded with detail only if
    /// it carries a detail block; with detail mode off its block is dropped.
    pub fn disasm_iter(&mut self, cursor: &mut Cursor<'_>, insn: &mut Insn) -> bool {
        let Some(state) = self.state.as_deref_mut() else {
            return false;
        };
        state.errnum.set(None);
        if cursor.code.is_empty() {
            return false;
        }

        let mut text = String::new();
        if let Some(size) = decode_one(state, cursor.code, cursor.address, insn, &mut text) {
            cursor.advance(size);
            return true;
        }

        // Here the callback sees only what is left, at offset 0
        let Some(width) = skipdata::skip_width(state, cursor.code, 0, cursor.code.len()) else {
            return false;
        };
        skipdata::fill_data(state, insn, &cursor.code[..width], cursor.address);
        cursor.advance(width);
        true
    }

    /// Iterate over the instructions of `code`, each in a fresh record.
    pub fn iter<'s, 'c>(&'s mut self, code: &'c [u8], address: Address) -> InsnIter<'s, 'c> {
        InsnIter {
            session: self,
            cursor: Cursor::new(code, address),
        }
    }
}

/// Iterator returned by [`Session::iter`].
#[derive(Debug)]
pub struct InsnIter<'s, 'c> {
    session: &'s mut Session,
    cursor: Cursor<'c>,
}

impl InsnIter<'_, '_> {
    /// Where the next instruction would be decoded.
    pub fn cursor(&self) -> Cursor<'_> {
        self.cursor
    }
}

impl Iterator for InsnIter<'_, '_> {
    type Item = Insn;

    fn next(&mut self) -> Option<Insn> {
        let mut insn = self.session.alloc_insn().ok()?;
        if self.session.disasm_iter(&mut self.cursor, &mut insn) {
            Some(insn)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SkipDataSetup;
    use crate::{Arch, Error, Mode, SessionOption};

    #[test]
    fn test_cursor_advances() {
        let mut session = Session::open(Arch::X86, Mode::MODE_64).unwrap();
        let code = [0x55, 0xc3];
        let mut cursor = Cursor::new(&code, 0x1000);
        let mut insn = session.alloc_insn().unwrap();

        assert!(session.disasm_iter(&mut cursor, &mut insn));
        assert_eq!(insn.address, 0x1000);
        assert_eq!(cursor.address, 0x1001);
        assert_eq!(cursor.code, &[0xc3]);

        assert!(session.disasm_iter(&mut cursor, &mut insn));
        assert!(cursor.code.is_empty());
        assert!(!session.disasm_iter(&mut cursor, &mut insn));
        assert_eq!(cursor.address, 0x1002);
    }

    #[test]
    fn test_failure_leaves_cursor() {
        let mut session = Session::open(Arch::Mips, Mode::MODE_32).unwrap();
        let code = [0xde, 0xad, 0xbe, 0xef];
        let mut cursor = Cursor::new(&code, 0);
        let mut insn = Insn::new();

        assert!(!session.disasm_iter(&mut cursor, &mut insn));
        assert_eq!(cursor, Cursor::new(&code, 0));
    }

    #[test]
    fn test_callback_sees_remaining_bytes_at_offset_zero() {
        let mut session = Session::open(Arch::X86, Mode::MODE_64).unwrap();
        session.configure(SessionOption::SkipData(true)).unwrap();
        session
            .configure(SessionOption::SkipDataSetup(SkipDataSetup {
                mnemonic: Some("db".into()),
                callback: Some(Box::new(|buffer: &[u8], offset: usize| {
                    assert_eq!(offset, 0);
                    buffer.len().min(2)
                })),
            }))
            .unwrap();
        // 0x06 (push es) is invalid in 64-bit mode
        let code = [0x90, 0x06, 0x06, 0x06];
        let mut cursor = Cursor::new(&code, 0);
        let mut insn = Insn::new();

        assert!(session.disasm_iter(&mut cursor, &mut insn));
        assert!(session.disasm_iter(&mut cursor, &mut insn));
        assert_eq!(insn.id, 0);
        assert_eq!(insn.size, 2);
        assert_eq!(cursor.code, &[0x06]);
        if !cfg!(feature = "diet") {
            assert_eq!(insn.mnemonic, "db");
        }
    }

    #[test]
    fn test_iterator_collects_records() {
        let mut session = Session::open(Arch::Evm, Mode::empty()).unwrap();
        session.configure(SessionOption::Detail(true)).unwrap();
        // push1 0x80; push1 0x40; mstore
        let code = [0x60, 0x80, 0x60, 0x40, 0x52];
        let insns: Vec<Insn> = session.iter(&code, 0).collect();
        assert_eq!(insns.len(), 3);
        assert!(insns.iter().all(|i| i.detail.is_some()));
        assert_eq!(insns[2].address, 4);
    }

    #[test]
    fn test_reused_record_drops_detail_when_detail_is_off() {
        use crate::arch::x86::group;

        let mut session = Session::open(Arch::X86, Mode::MODE_64).unwrap();
        session.configure(SessionOption::Detail(true)).unwrap();
        let mut insn = session.alloc_insn().unwrap();

        // call rel32
        let call = [0xe8, 0, 0, 0, 0];
        assert!(session.disasm_iter(&mut Cursor::new(&call, 0), &mut insn));
        assert_eq!(session.insn_group(&insn, group::CALL), Ok(true));

        session.configure(SessionOption::Detail(false)).unwrap();
        // add eax, ebx
        let add = [0x01, 0xd8];
        assert!(session.disasm_iter(&mut Cursor::new(&add, 0), &mut insn));
        assert!(insn.detail.is_none());

        session.configure(SessionOption::Detail(true)).unwrap();
        assert_eq!(
            session.insn_group(&insn, group::CALL),
            Err(Error::DetailUnavailable)
        );
    }

    #[test]
    fn test_closed_session_yields_nothing() {
        let mut session = Session::open(Arch::X86, Mode::MODE_64).unwrap();
        session.close().unwrap();
        let mut cursor = Cursor::new(&[0x90], 0);
        assert!(!session.disasm_iter(&mut cursor, &mut Insn::new()));
        assert_eq!(session.iter(&[0x90], 0).count(), 0);
    }
}
