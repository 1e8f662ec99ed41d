//! Sessions: one configured decoder for one architecture and mode.

use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::arch::{self, ArchModule, ArchOption, ArchState};
use crate::insn::{Insn, MNEMONIC_SIZE};
use crate::memory::{self, MemoryPrimitives};
use crate::text::BoundedStr;
use crate::{Arch, Error, Mode, Result, Syntax};

/// Mnemonic given to skipped-data records unless configured otherwise.
pub const DEFAULT_SKIPDATA_MNEMONIC: &str = ".byte";

/// Decides how many bytes to skip when decoding fails.
///
/// Receives the buffer being decoded and the offset of the failure within
/// it. Returning 0, or more than the bytes left, stops decoding.
pub type SkipDataCallback = Box<dyn FnMut(&[u8], usize) -> usize + Send>;

/// Skip-data configuration, replaced as a whole.
#[derive(Default)]
pub struct SkipDataSetup {
    /// Mnemonic of data records, `.byte` when `None`
    pub mnemonic: Option<String>,
    /// Skip width policy, the architecture default when `None`
    pub callback: Option<SkipDataCallback>,
}

impl SkipDataSetup {
    pub(crate) fn mnemonic(&self) -> &str {
        self.mnemonic.as_deref().unwrap_or(DEFAULT_SKIPDATA_MNEMONIC)
    }
}

impl fmt::Debug for SkipDataSetup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SkipDataSetup")
            .field("mnemonic", &self.mnemonic())
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// A runtime option for [`Session::configure`].
pub enum SessionOption<'a> {
    /// Print immediates as unsigned values
    Unsigned(bool),
    /// Fill a detail block for every decoded instruction
    Detail(bool),
    /// Turn undecodable bytes into data records instead of stopping
    SkipData(bool),
    /// Replace the data-record mnemonic and width callback together
    SkipDataSetup(SkipDataSetup),
    /// Override the mnemonic printed for an instruction id; `None` removes
    /// the override
    Mnemonic { id: u32, mnemonic: Option<&'a str> },
    /// Switch mode on an open session
    Mode(Mode),
    /// Select the printer syntax; handled by the architecture module
    Syntax(Syntax),
}

impl fmt::Debug for SessionOption<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionOption::Unsigned(on) => f.debug_tuple("Unsigned").field(on).finish(),
            SessionOption::Detail(on) => f.debug_tuple("Detail").field(on).finish(),
            SessionOption::SkipData(on) => f.debug_tuple("SkipData").field(on).finish(),
            SessionOption::SkipDataSetup(setup) => {
                f.debug_tuple("SkipDataSetup").field(setup).finish()
            }
            SessionOption::Mnemonic { id, mnemonic } => f
                .debug_struct("Mnemonic")
                .field("id", id)
                .field("mnemonic", mnemonic)
                .finish(),
            SessionOption::Mode(mode) => f.debug_tuple("Mode").field(mode).finish(),
            SessionOption::Syntax(syntax) => f.debug_tuple("Syntax").field(syntax).finish(),
        }
    }
}

pub(crate) struct SessionState {
    pub(crate) module: &'static dyn ArchModule,
    pub(crate) arch: Arch,
    pub(crate) ctx: ArchState,
    pub(crate) skipdata: bool,
    pub(crate) skipdata_size: u8,
    pub(crate) skipdata_setup: SkipDataSetup,
    pub(crate) mnemonics: HashMap<u32, BoundedStr<MNEMONIC_SIZE>>,
    pub(crate) memory: Arc<dyn MemoryPrimitives>,
    pub(crate) errnum: Cell<Option<Error>>,
}

impl SessionState {
    pub(crate) fn fail(&self, err: Error) -> Error {
        self.errnum.set(Some(err));
        err
    }
}

/// An open disassembly session.
///
/// Closing a session leaves it in place as a closed handle: every further
/// call fails with [`Error::InvalidHandle`], or returns `false`/`None` where
/// the call has no error channel.
pub struct Session {
    pub(crate) state: Option<Box<SessionState>>,
}

impl Session {
    /// Open a session using the process-wide memory primitives.
    pub fn open(arch: Arch, mode: Mode) -> Result<Session> {
        Self::open_with_memory(arch, mode, memory::current()?)
    }

    /// Open a session whose allocations all go through `memory`.
    pub fn open_with_memory(
        arch: Arch,
        mode: Mode,
        memory: Arc<dyn MemoryPrimitives>,
    ) -> Result<Session> {
        let Some(module) = arch::module(arch) else {
            log::debug!("no decoder registered for {}", arch);
            return Err(Error::UnsupportedArchitecture);
        };
        if mode.intersects(arch::disallowed_mode_mask(arch)) {
            log::debug!("mode {:?} is not valid for {}", mode, arch);
            return Err(Error::InvalidMode);
        }
        if !memory.allocate_zeroed(1, std::mem::size_of::<SessionState>()) {
            return Err(Error::OutOfMemory);
        }

        let mut state = Box::new(SessionState {
            module,
            arch,
            ctx: ArchState::new(mode),
            skipdata: false,
            skipdata_size: 0,
            skipdata_setup: SkipDataSetup::default(),
            mnemonics: HashMap::new(),
            memory,
            errnum: Cell::new(None),
        });
        if let Err(err) = module.global_init(&mut state.ctx) {
            log::debug!("{} decoder failed to initialise: {}", arch, err);
            state.memory.release(std::mem::size_of::<SessionState>());
            return Err(err);
        }

        log::debug!("opened {} session, mode {:?}", arch, mode);
        Ok(Session { state: Some(state) })
    }

    /// Change a runtime option.
    pub fn configure(&mut self, option: SessionOption<'_>) -> Result<()> {
        let state = self.state.as_deref_mut().ok_or(Error::InvalidHandle)?;
        log::debug!("{} session option {:?}", state.arch, option);

        match option {
            SessionOption::Unsigned(on) => state.ctx.imm_unsigned = on,
            SessionOption::Detail(on) => state.ctx.detail = on,
            SessionOption::SkipData(on) => {
                state.skipdata = on;
                if on && state.skipdata_size == 0 {
                    state.skipdata_size = arch::default_skip_width(state.arch, state.ctx.mode);
                }
            }
            SessionOption::SkipDataSetup(setup) => state.skipdata_setup = setup,
            SessionOption::Mnemonic { id: 0, .. } => {}
            SessionOption::Mnemonic {
                id,
                mnemonic: Some(text),
            } => {
                state
                    .mnemonics
                    .insert(id, BoundedStr::from_str_truncated(text));
            }
            SessionOption::Mnemonic { id, mnemonic: None } => {
                state.mnemonics.remove(&id);
            }
            SessionOption::Mode(mode) => {
                if mode.intersects(arch::disallowed_mode_mask(state.arch)) {
                    return Err(Error::InvalidOption);
                }
                state.module.option(&mut state.ctx, &ArchOption::Mode(mode))?;
            }
            SessionOption::Syntax(syntax) => {
                state
                    .module
                    .option(&mut state.ctx, &ArchOption::Syntax(syntax))?;
            }
        }
        Ok(())
    }

    /// Release the session. The value stays behind as a closed handle.
    pub fn close(&mut self) -> Result<()> {
        let state = self.state.take().ok_or(Error::InvalidHandle)?;
        log::debug!("closing {} session", state.arch);
        release(state);
        Ok(())
    }

    /// Whether the session is still open.
    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    /// The error recorded by the last failing operation, if any.
    pub fn errno(&self) -> Option<Error> {
        match &self.state {
            Some(state) => state.errnum.get(),
            None => Some(Error::InvalidHandle),
        }
    }

    /// Architecture of the session; `None` once closed.
    pub fn arch(&self) -> Option<Arch> {
        self.state.as_ref().map(|s| s.arch)
    }

    /// Current decoding mode; `None` once closed.
    pub fn mode(&self) -> Option<Mode> {
        self.state.as_ref().map(|s| s.ctx.mode)
    }

    /// Name of register `reg`; `None` in diet builds.
    pub fn reg_name(&self, reg: u32) -> Option<&'static str> {
        if cfg!(feature = "diet") {
            return None;
        }
        self.state.as_ref()?.module.reg_name(reg)
    }

    /// Name of instruction `id`; `None` in diet builds.
    pub fn insn_name(&self, id: u32) -> Option<&'static str> {
        if cfg!(feature = "diet") {
            return None;
        }
        self.state.as_ref()?.module.insn_name(id)
    }

    /// Name of group `group`; `None` in diet builds.
    pub fn group_name(&self, group: u32) -> Option<&'static str> {
        if cfg!(feature = "diet") {
            return None;
        }
        self.state.as_ref()?.module.group_name(group)
    }

    /// A record ready for [`Session::disasm_iter`], with a detail block when
    /// detail mode is on.
    pub fn alloc_insn(&self) -> Result<Insn> {
        let state = self.state.as_ref().ok_or(Error::InvalidHandle)?;
        Ok(if state.ctx.detail {
            Insn::with_detail()
        } else {
            Insn::new()
        })
    }

    pub(crate) fn state(&self) -> Result<&SessionState> {
        self.state.as_deref().ok_or(Error::InvalidHandle)
    }
}

fn release(state: Box<SessionState>) {
    let memory = state.memory.clone();
    drop(state);
    memory.release(std::mem::size_of::<SessionState>());
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            release(state);
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            Some(state) => f
                .debug_struct("Session")
                .field("arch", &state.arch)
                .field("ctx", &state.ctx)
                .field("skipdata", &state.skipdata)
                .field("skipdata_size", &state.skipdata_size)
                .field("skipdata_setup", &state.skipdata_setup)
                .field("mnemonics", &state.mnemonics.len())
                .finish(),
            None => f.write_str("Session(closed)"),
        }
    }
}
