//! Turns a decoded machine instruction and its raw text into a record.

use crate::arch::McInst;
use crate::insn::{Insn, INSN_BYTES_MAX};
use crate::session::SessionState;

/// Complete `insn` from the decoder's output.
///
/// `code` starts at the instruction. `text` is the printer's raw output,
/// which the module's post-printer may still rewrite.
pub(crate) fn fill_insn(state: &SessionState, insn: &mut Insn, text: &mut String, mc: &McInst, code: &[u8]) {
    // Prefixes beyond the field width are dropped from the front
    let size = mc.size.min(code.len());
    let keep = size.min(INSN_BYTES_MAX);
    insn.set_bytes(&code[size - keep..size]);

    if mc.opcode_pub != 0 {
        insn.id = mc.opcode_pub;
    }

    state.module.post_printer(insn, text, mc);

    insn.mnemonic.clear();
    insn.op_str.clear();
    if cfg!(feature = "diet") {
        return;
    }

    let (mnemonic, operands) = split_text(text);
    insn.mnemonic.set(&mnemonic);
    if let Some(custom) = state.mnemonics.get(&insn.id) {
        insn.mnemonic = *custom;
    }
    insn.op_str.set(operands);
}

/// Split at the first space or tab. Prefix separators (`|`) in the mnemonic
/// become spaces; leading blanks are trimmed from the operands.
fn split_text(text: &str) -> (String, &str) {
    let (head, tail) = match text.find([' ', '\t']) {
        Some(at) => (&text[..at], &text[at + 1..]),
        None => (text, ""),
    };
    (head.replace('|', " "), tail.trim_start_matches([' ', '\t']))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Arch, Mode, Session, SessionOption};

    #[test]
    fn test_split_text() {
        assert_eq!(split_text("add\teax, ebx"), ("add".to_string(), "eax, ebx"));
        assert_eq!(split_text("ret"), ("ret".to_string(), ""));
        assert_eq!(split_text("nop \t  "), ("nop".to_string(), ""));
        assert_eq!(
            split_text("rep|movsb byte ptr [rdi], byte ptr [rsi]"),
            ("rep movsb".to_string(), "byte ptr [rdi], byte ptr [rsi]")
        );
        assert_eq!(split_text(""), (String::new(), ""));
    }

    fn mc(size: usize) -> McInst {
        McInst {
            opcode: 42,
            size,
            ..McInst::default()
        }
    }

    #[test]
    fn test_long_encoding_keeps_tail_bytes() {
        let session = Session::open(Arch::X86, Mode::MODE_64).unwrap();
        let state = session.state().unwrap();
        let code: Vec<u8> = (0u8..20).collect();
        let mut insn = Insn::new();
        let mut text = String::from("nop");

        fill_insn(state, &mut insn, &mut text, &mc(18), &code);
        assert_eq!(insn.size, 16);
        assert_eq!(insn.bytes(), &code[2..18]);
    }

    #[test]
    fn test_alias_id_and_override() {
        let mut session = Session::open(Arch::X86, Mode::MODE_64).unwrap();
        session
            .configure(SessionOption::Mnemonic { id: 7, mnemonic: Some("alias") })
            .unwrap();
        let state = session.state().unwrap();
        let mut insn = Insn::new();
        insn.id = 42;
        let mut text = String::from("orig\t1, 2");
        let mut alias = mc(1);
        alias.opcode_pub = 7;

        fill_insn(state, &mut insn, &mut text, &alias, &[0x90]);
        assert_eq!(insn.id, 7);
        if !cfg!(feature = "diet") {
            assert_eq!(insn.mnemonic, "alias");
            assert_eq!(insn.op_str, "1, 2");
        }
    }

    #[cfg(not(feature = "diet"))]
    #[test]
    fn test_operands_are_bounded() {
        use crate::insn::OP_STR_SIZE;

        let session = Session::open(Arch::X86, Mode::MODE_64).unwrap();
        let state = session.state().unwrap();
        let mut insn = Insn::new();
        let mut text = format!("op {}", "a".repeat(300));

        fill_insn(state, &mut insn, &mut text, &mc(1), &[0x90]);
        assert_eq!(insn.mnemonic, "op");
        assert_eq!(insn.op_str.len(), OP_STR_SIZE - 1);
    }
}
