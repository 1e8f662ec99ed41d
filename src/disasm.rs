//! Batch decoding into an owned array of records.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::cache::{self, InsnCache, DETAIL_BYTES, INSN_BYTES};
use crate::fill::fill_insn;
use crate::insn::{Detail, Insn};
use crate::memory::MemoryPrimitives;
use crate::session::SessionState;
use crate::skipdata;
use crate::{Address, Arch, Error, Result, Session};

/// Records produced by one [`Session::disasm`] call.
///
/// Dropping the value releases the array and every detail block through the
/// memory primitives of the session that produced it.
pub struct Insns {
    records: Vec<Insn>,
    /// Records accounted for, 0 when no array is held
    capacity: usize,
    memory: Arc<dyn MemoryPrimitives>,
}

impl Insns {
    pub(crate) fn new(records: Vec<Insn>, capacity: usize, memory: Arc<dyn MemoryPrimitives>) -> Self {
        Self {
            records,
            capacity,
            memory,
        }
    }

    pub(crate) fn empty(memory: Arc<dyn MemoryPrimitives>) -> Self {
        Self::new(Vec::new(), 0, memory)
    }

    /// Take the records out; they are no longer accounted for.
    pub fn into_vec(mut self) -> Vec<Insn> {
        self.release();
        std::mem::take(&mut self.records)
    }

    fn release(&mut self) {
        if self.capacity == 0 {
            return;
        }
        for insn in &self.records {
            if insn.detail.is_some() {
                self.memory.release(DETAIL_BYTES);
            }
        }
        self.memory.release(self.capacity * INSN_BYTES);
        self.capacity = 0;
    }
}

impl Deref for Insns {
    type Target = [Insn];

    fn deref(&self) -> &[Insn] {
        &self.records
    }
}

impl<'a> IntoIterator for &'a Insns {
    type Item = &'a Insn;
    type IntoIter = std::slice::Iter<'a, Insn>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl Drop for Insns {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Insns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.records.iter()).finish()
    }
}

impl Serialize for Insns {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.records.serialize(serializer)
    }
}

impl Session {
    /// Decode up to `count` instructions from `code` (0 for no limit),
    /// the first at `address`.
    ///
    /// Decoding stops at the first byte sequence that neither decodes nor
    /// can be skipped as data. If the records cannot be stored, nothing is
    /// returned and the error is also recorded for [`Session::errno`].
    pub fn disasm(&mut self, code: &[u8], address: Address, count: usize) -> Result<Insns> {
        let state = self.state.as_deref_mut().ok_or(Error::InvalidHandle)?;
        state.errnum.set(None);
        log::debug!(
            "disassembling {} bytes at 0x{:x} ({} session, count {})",
            code.len(),
            address,
            state.arch,
            count
        );

        let mut cache = InsnCache::with_capacity(cache::initial_capacity(count), state.memory.clone())
            .map_err(|err| state.fail(err))?;
        if let Err(err) = decode_into(state, &mut cache, code, address, count) {
            cache.rollback();
            return Err(state.fail(err));
        }
        if cache.len() > 0 {
            if let Err(err) = cache.shrink_to_fit() {
                cache.rollback();
                return Err(state.fail(err));
            }
        }
        log::debug!("decoded {} records", cache.len());
        Ok(cache.finish())
    }

    /// Decode every instruction in `code`.
    pub fn disasm_all(&mut self, code: &[u8], address: Address) -> Result<Insns> {
        self.disasm(code, address, 0)
    }
}

fn decode_into(
    state: &mut SessionState,
    cache: &mut InsnCache,
    code: &[u8],
    address: Address,
    count: usize,
) -> Result<()> {
    let mut text = String::new();
    let mut offset = 0;

    while offset < code.len() {
        let rest = &code[offset..];
        let pc = address.wrapping_add(offset as u64);
        let mut insn = Insn::new();
        if state.ctx.detail {
            insn.detail = Some(cache.alloc_detail()?);
        }

        let advance = match decode_one(state, rest, pc, &mut insn, &mut text) {
            Some(size) => size,
            None => {
                cache.release_detail(&mut insn);
                let Some(width) = skipdata::skip_width(state, code, offset, rest.len()) else {
                    break;
                };
                skipdata::fill_data(state, &mut insn, &rest[..width], pc);
                width
            }
        };
        cache.push(insn);

        if count > 0 && cache.len() == count {
            break;
        }
        if cache.is_full() {
            cache.grow()?;
        }
        offset += advance;
    }
    Ok(())
}

/// Decode and post-process one instruction at the start of `code`.
///
/// Returns the number of bytes consumed, `None` if the bytes do not decode.
pub(crate) fn decode_one(
    state: &SessionState,
    code: &[u8],
    address: Address,
    insn: &mut Insn,
    text: &mut String,
) -> Option<usize> {
    if state.ctx.detail {
        if let Some(detail) = insn.detail.as_deref_mut() {
            *detail = Detail::default();
        }
    } else {
        // a record decoded without detail carries no block
        insn.detail = None;
    }
    insn.address = address;

    let mc = state
        .module
        .disassemble(&state.ctx, code, address, insn)
        .filter(|mc| mc.size > 0 && mc.size <= code.len())?;
    state.module.insn_id(&state.ctx, insn, mc.opcode);

    text.clear();
    state.module.print(&mc, &state.ctx, text);
    fill_insn(state, insn, text, &mc, code);

    if state.arch == Arch::X86 {
        insn.id += mc.popcode_adjust;
    }
    log::trace!("0x{:x}: {}", address, insn);
    Some(mc.size)
}
