//! The batch decoder's growable instruction array.
//!
//! Every block the cache holds is accounted through the session's
//! [`MemoryPrimitives`]: the array itself, sized in whole records, and one
//! block per detail. Growth is atomic; a refused step leaves the cache as it
//! was, and the caller decides whether to [`rollback`](InsnCache::rollback).

use std::mem::size_of;
use std::sync::Arc;

use crate::disasm::Insns;
use crate::insn::{Detail, Insn};
use crate::memory::MemoryPrimitives;
use crate::{Error, Result};

/// Records the cache starts with when no smaller count was requested.
#[cfg(not(feature = "small-cache"))]
pub(crate) const INSN_CACHE_SIZE: usize = 32;
#[cfg(feature = "small-cache")]
pub(crate) const INSN_CACHE_SIZE: usize = 8;

pub(crate) const INSN_BYTES: usize = size_of::<Insn>();
pub(crate) const DETAIL_BYTES: usize = size_of::<Detail>();

/// Initial capacity for a request of `count` records (0 for unbounded).
pub(crate) fn initial_capacity(count: usize) -> usize {
    if count > 0 && count <= INSN_CACHE_SIZE {
        count
    } else {
        INSN_CACHE_SIZE
    }
}

/// Capacity after one growth step: a factor of 1.6, at least one more slot.
pub(crate) fn next_capacity(capacity: usize) -> usize {
    (capacity.saturating_mul(8) / 5).max(capacity + 1)
}

pub(crate) struct InsnCache {
    records: Vec<Insn>,
    /// Records accounted for through the primitives
    capacity: usize,
    /// Capacity reached by each growth step, in order
    growth: Vec<usize>,
    memory: Arc<dyn MemoryPrimitives>,
}

impl InsnCache {
    pub(crate) fn with_capacity(capacity: usize, memory: Arc<dyn MemoryPrimitives>) -> Result<Self> {
        let mut records = Vec::new();
        if records.try_reserve_exact(capacity).is_err() || !memory.allocate(capacity * INSN_BYTES) {
            log::debug!("instruction cache of {} records refused", capacity);
            return Err(Error::OutOfMemory);
        }
        Ok(Self {
            records,
            capacity,
            growth: Vec::new(),
            memory,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn growth(&self) -> &[usize] {
        &self.growth
    }

    pub(crate) fn is_full(&self) -> bool {
        self.records.len() >= self.capacity
    }

    pub(crate) fn push(&mut self, insn: Insn) {
        debug_assert!(!self.is_full());
        self.records.push(insn);
    }

    /// A zeroed detail block for the next record.
    pub(crate) fn alloc_detail(&self) -> Result<Box<Detail>> {
        if self.memory.allocate(DETAIL_BYTES) {
            Ok(Box::default())
        } else {
            log::debug!("detail block refused after {} records", self.records.len());
            Err(Error::OutOfMemory)
        }
    }

    /// Drop the detail block of a record that never entered the cache.
    pub(crate) fn release_detail(&self, insn: &mut Insn) {
        if insn.detail.take().is_some() {
            self.memory.release(DETAIL_BYTES);
        }
    }

    /// Make room for more records.
    pub(crate) fn grow(&mut self) -> Result<()> {
        let old = self.capacity;
        let new = next_capacity(old);
        if self.records.try_reserve_exact(new - self.records.len()).is_err()
            || !self.memory.reallocate(old * INSN_BYTES, new * INSN_BYTES)
        {
            log::debug!("instruction cache growth {} -> {} refused", old, new);
            return Err(Error::OutOfMemory);
        }
        log::debug!("instruction cache grows {} -> {}", old, new);
        self.capacity = new;
        self.growth.push(new);
        Ok(())
    }

    /// Give back the unused tail of the array.
    pub(crate) fn shrink_to_fit(&mut self) -> Result<()> {
        let len = self.records.len();
        if len >= self.capacity {
            return Ok(());
        }
        if !self.memory.reallocate(self.capacity * INSN_BYTES, len * INSN_BYTES) {
            log::debug!("instruction cache shrink {} -> {} refused", self.capacity, len);
            return Err(Error::OutOfMemory);
        }
        self.records.shrink_to_fit();
        self.capacity = len;
        Ok(())
    }

    /// Release every detail block and the array itself.
    pub(crate) fn rollback(self) {
        log::debug!("rolling back {} decoded records", self.records.len());
        for insn in &self.records {
            if insn.detail.is_some() {
                self.memory.release(DETAIL_BYTES);
            }
        }
        self.memory.release(self.capacity * INSN_BYTES);
    }

    /// Hand the records over to the caller; an empty cache is released.
    pub(crate) fn finish(self) -> Insns {
        if self.records.is_empty() {
            self.memory.release(self.capacity * INSN_BYTES);
            return Insns::empty(self.memory);
        }
        Insns::new(self.records, self.capacity, self.memory)
    }
}
