//! Sources of raw heap bytes.
//!
//! The allocator never gives memory back: a [`MemorySource`] only grows.
use std::{alloc, ptr::NonNull};

use libc::{c_void, intptr_t, sbrk};
use log::debug;

use crate::{align::is_aligned, block::DSIZE};

/// The single primitive the allocator grows its heap with.
///
/// Successive successful calls must hand out adjacent regions, and the first
/// region must start on a double-word boundary.
pub trait MemorySource {
  /// Grows the region by `increment` bytes and returns the start of the new
  /// bytes, or `None` when no more memory is available.
  fn extend(
    &mut self,
    increment: usize,
  ) -> Option<NonNull<u8>>;
}

/// Grows the process data segment with `sbrk(2)`.
///
/// Not thread-safe, and it assumes nothing else in the process moves the
/// program break while the heap is alive. A single foreign move leaves a gap
/// that the heap reports as [`Error::Discontiguous`](crate::Error::Discontiguous),
/// and from then on every extension fails: growth is disabled for good, while
/// blocks already in the heap stay usable.
#[derive(Debug, Default)]
pub struct Sbrk {
  aligned: bool,
}

impl Sbrk {
  pub const fn new() -> Self {
    Self { aligned: false }
  }

  /// Current program break.
  pub fn program_break() -> *mut u8 {
    unsafe { sbrk(0) as *mut u8 }
  }

  fn grow(increment: usize) -> Option<NonNull<u8>> {
    let increment = intptr_t::try_from(increment).ok()?;
    let address = unsafe { sbrk(increment) };

    if address == usize::MAX as *mut c_void {
      return None;
    }
    NonNull::new(address as *mut u8)
  }
}

impl MemorySource for Sbrk {
  fn extend(
    &mut self,
    increment: usize,
  ) -> Option<NonNull<u8>> {
    if !self.aligned {
      let brk = Self::program_break() as usize;
      let padding = crate::align!(brk) - brk;
      if padding != 0 {
        debug!("sbrk: padding program break {:#x} by {} bytes", brk, padding);
        Self::grow(padding)?;
      }
      self.aligned = true;
    }
    Self::grow(increment)
  }
}

/// A fixed-capacity region carved out of the global allocator.
///
/// Behaves like a simulated `sbrk`: a break pointer moves through a buffer of
/// `capacity` bytes and requests past the end fail. Each arena is independent,
/// so several heaps can live side by side.
#[derive(Debug)]
pub struct Arena {
  start: NonNull<u8>,
  layout: alloc::Layout,
  brk: usize,
}

impl Arena {
  /// Default arena capacity, 20 MiB.
  pub const DEFAULT_CAPACITY: usize = 20 * (1 << 20);

  /// Reserves `capacity` bytes. Returns `None` if `capacity` is zero or the
  /// global allocator refuses the buffer.
  pub fn new(capacity: usize) -> Option<Self> {
    if capacity == 0 {
      return None;
    }
    let layout = alloc::Layout::from_size_align(capacity, DSIZE).ok()?;
    let start = NonNull::new(unsafe { alloc::alloc(layout) })?;

    Some(Self { start, layout, brk: 0 })
  }

  pub fn capacity(&self) -> usize {
    self.layout.size()
  }

  /// Bytes handed out so far.
  pub fn used(&self) -> usize {
    self.brk
  }

  pub fn start(&self) -> NonNull<u8> {
    self.start
  }
}

impl MemorySource for Arena {
  fn extend(
    &mut self,
    increment: usize,
  ) -> Option<NonNull<u8>> {
    let end = self.brk.checked_add(increment)?;
    if end > self.capacity() {
      debug!(
        "arena: refusing {} bytes, {} of {} used",
        increment,
        self.brk,
        self.capacity()
      );
      return None;
    }

    let old = unsafe { self.start.add(self.brk) };
    debug_assert!(is_aligned(self.start.as_ptr() as usize));
    self.brk = end;
    Some(old)
  }
}

impl Drop for Arena {
  fn drop(&mut self) {
    unsafe { alloc::dealloc(self.start.as_ptr(), self.layout) };
  }
}
