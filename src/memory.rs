//! Memory primitives used for every allocation the engine makes.
//!
//! The engine never calls into the host allocator on its own initiative: each
//! session, batch instruction cache and detail block is first cleared with a
//! [`MemoryPrimitives`] object, and released through it again. This lets an
//! embedder account for, cap, or deliberately fail allocations.
//!
//! A process-wide set of primitives can be installed once with [`install`],
//! before the first session is opened. Sessions can also be given their own
//! primitives at construction with [`Session::open_with_memory`].
//!
//! [`Session::open_with_memory`]: crate::Session::open_with_memory

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::{Error, Result};

/// Allocation policy consulted by the engine.
///
/// Each method is asked before the engine grows its own storage; returning
/// `false` makes the engine report [`Error::OutOfMemory`]. Sizes are in bytes.
pub trait MemoryPrimitives: Send + Sync + fmt::Debug {
    /// A fresh block of `size` bytes.
    fn allocate(&self, size: usize) -> bool;

    /// A fresh, zero-filled block of `count * size` bytes.
    fn allocate_zeroed(&self, count: usize, size: usize) -> bool {
        self.allocate(count.saturating_mul(size))
    }

    /// Resize a block from `old_size` to `new_size` bytes, keeping its contents.
    fn reallocate(&self, old_size: usize, new_size: usize) -> bool;

    /// A block of `size` bytes is no longer used.
    fn release(&self, size: usize);

    /// Render formatted text.
    fn render(&self, args: fmt::Arguments<'_>) -> String {
        fmt::format(args)
    }
}

/// Primitives backed by the global Rust allocator; never refuses.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemMemory;

impl MemoryPrimitives for SystemMemory {
    fn allocate(&self, _size: usize) -> bool {
        true
    }

    fn reallocate(&self, _old_size: usize, _new_size: usize) -> bool {
        true
    }

    fn release(&self, _size: usize) {}
}

static INSTALLED: OnceLock<Arc<dyn MemoryPrimitives>> = OnceLock::new();

/// Install the process-wide memory primitives.
///
/// This must happen before any session is opened with [`Session::open`]. The
/// primitives cannot be replaced afterwards; a second call, or a call after
/// the defaults were already picked up, fails with [`Error::InvalidOption`].
///
/// [`Session::open`]: crate::Session::open
pub fn install(memory: Arc<dyn MemoryPrimitives>) -> Result<()> {
    INSTALLED.set(memory).map_err(|_| {
        log::debug!("memory primitives already in use, refusing to replace them");
        Error::InvalidOption
    })
}

/// The process-wide primitives, falling back to [`SystemMemory`].
#[cfg(feature = "sys-dyn-mem")]
pub fn current() -> Result<Arc<dyn MemoryPrimitives>> {
    Ok(INSTALLED
        .get_or_init(|| Arc::new(SystemMemory))
        .clone())
}

/// The process-wide primitives; fails if none were installed.
#[cfg(not(feature = "sys-dyn-mem"))]
pub fn current() -> Result<Arc<dyn MemoryPrimitives>> {
    INSTALLED
        .get()
        .cloned()
        .ok_or(Error::MemoryPrimitivesUnconfigured)
}
