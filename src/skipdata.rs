//! Skip-data recovery: turning undecodable bytes into data records.

use crate::insn::Insn;
use crate::session::SessionState;
use crate::Address;

/// How many bytes to skip at `offset` into `buffer`, or `None` to stop.
///
/// `remaining` is the number of bytes left from the failure point.
pub(crate) fn skip_width(
    state: &mut SessionState,
    buffer: &[u8],
    offset: usize,
    remaining: usize,
) -> Option<usize> {
    if !state.skipdata || usize::from(state.skipdata_size) > remaining {
        return None;
    }
    let width = match state.skipdata_setup.callback.as_mut() {
        Some(callback) => callback(buffer, offset),
        None => usize::from(state.skipdata_size),
    };
    if width == 0 || width > remaining {
        log::debug!("skip-data stops at offset {} (width {})", offset, width);
        return None;
    }
    log::trace!("skipping {} data bytes at offset {}", width, offset);
    Some(width)
}

/// Overwrite `insn` with a data record for `data` at `address`.
///
/// The detail block, if any, is left alone; data records never expose one.
pub(crate) fn fill_data(state: &SessionState, insn: &mut Insn, data: &[u8], address: Address) {
    insn.id = 0;
    insn.address = address;
    insn.set_bytes(data);
    insn.size = data.len() as u16;
    insn.mnemonic.clear();
    insn.op_str.clear();
    if cfg!(feature = "diet") {
        return;
    }

    insn.mnemonic.set(state.skipdata_setup.mnemonic());
    for (i, byte) in data.iter().enumerate() {
        let item = if i == 0 {
            state.memory.render(format_args!("0x{:02x}", byte))
        } else {
            state.memory.render(format_args!(", 0x{:02x}", byte))
        };
        if !insn.op_str.try_push_str(&item) {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insn::OP_STR_SIZE;
    use crate::session::SkipDataSetup;
    use crate::{Arch, Mode, Session, SessionOption};

    fn mips() -> Session {
        let mut session = Session::open(Arch::Mips, Mode::MODE_32).unwrap();
        session.configure(SessionOption::SkipData(true)).unwrap();
        session
    }

    #[test]
    fn test_default_width_needs_enough_bytes() {
        let mut session = mips();
        let state = session.state.as_deref_mut().unwrap();
        assert_eq!(skip_width(state, &[0; 8], 0, 8), Some(4));
        assert_eq!(skip_width(state, &[0; 8], 5, 3), None);

        state.skipdata = false;
        assert_eq!(skip_width(state, &[0; 8], 0, 8), None);
    }

    #[test]
    fn test_callback_decides_width() {
        let mut session = mips();
        session
            .configure(SessionOption::SkipDataSetup(SkipDataSetup {
                mnemonic: None,
                callback: Some(Box::new(|buffer: &[u8], offset: usize| {
                    if buffer[offset] == 0xff {
                        0
                    } else {
                        offset + 1
                    }
                })),
            }))
            .unwrap();
        let state = session.state.as_deref_mut().unwrap();
        let buffer = [0u8, 0, 0, 0, 0, 0, 0xff, 0];

        assert_eq!(skip_width(state, &buffer, 0, 8), Some(1));
        assert_eq!(skip_width(state, &buffer, 2, 6), Some(3));
        assert_eq!(skip_width(state, &buffer, 6, 2), None);
        // Asking for more than is left also stops
        assert_eq!(skip_width(state, &buffer, 4, 4), None);
    }

    #[cfg(not(feature = "diet"))]
    #[test]
    fn test_data_record_text() {
        let session = mips();
        let state = session.state().unwrap();
        let mut insn = Insn::with_detail();

        fill_data(state, &mut insn, &[0xde, 0xad, 0xbe, 0xef], 0x400);
        assert_eq!(insn.id, 0);
        assert_eq!(insn.address, 0x400);
        assert_eq!(insn.size, 4);
        assert_eq!(insn.bytes(), &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(insn.mnemonic, ".byte");
        assert_eq!(insn.op_str, "0xde, 0xad, 0xbe, 0xef");
    }

    #[cfg(not(feature = "diet"))]
    #[test]
    fn test_wide_data_record_is_bounded() {
        let session = mips();
        let state = session.state().unwrap();
        let mut insn = Insn::new();
        let data = [0xabu8; 64];

        fill_data(state, &mut insn, &data, 0);
        assert_eq!(insn.size, 64);
        assert_eq!(insn.bytes().len(), 16);
        // "0xab" then 25 more ", 0xab" fit into 159 bytes
        assert_eq!(insn.op_str.len(), 4 + 25 * 6);
        assert!(insn.op_str.len() <= OP_STR_SIZE - 1);
        assert!(insn.op_str.as_str().ends_with("0xab"));
    }
}
