//! The heap region and boundary-tag arithmetic.
//!
//! Blocks are addressed by the byte offset of their payload from the heap
//! base. Layout of a block at offset `bp`:
//!
//! ```text
//!   bp - WSIZE        bp                         bp + size - DSIZE
//!   ┌──────────┬──────────────────────────────┬──────────┐
//!   │  header  │  payload (+ padding)         │  footer  │
//!   └──────────┴──────────────────────────────┴──────────┘
//!              ◄──── size - DSIZE bytes ─────►
//! ```
use std::ptr::{self, NonNull};

use log::debug;

use crate::{
  align::is_aligned,
  block::{BlockInfo, DSIZE, Tag, WSIZE},
  error::{Error, Result},
  memory::MemorySource,
};

/// A contiguous, grow-only region obtained from a [`MemorySource`].
pub struct Heap<M> {
  source: M,
  base: Option<NonNull<u8>>,
  len: usize,
}

impl<M: MemorySource> Heap<M> {
  pub const fn new(source: M) -> Self {
    Self { source, base: None, len: 0 }
  }

  /// Grows the heap by `bytes` and returns the offset where the new bytes
  /// start. Nothing is written on failure.
  ///
  /// A region that does not continue the heap is rejected with
  /// [`Error::Discontiguous`]; the heap keeps its current length and stays
  /// usable, it just cannot grow past that point.
  pub fn grow(
    &mut self,
    bytes: usize,
  ) -> Result<usize> {
    let region = self
      .source
      .extend(bytes)
      .ok_or(Error::OutOfMemory { requested: bytes })?;
    let start = self.len;

    match self.base {
      None => {
        if !is_aligned(region.as_ptr() as usize) {
          return Err(Error::Discontiguous {
            expected: crate::align!(region.as_ptr() as usize),
            got: region.as_ptr() as usize,
          });
        }
        self.base = Some(region);
      },
      Some(base) => {
        let expected = base.as_ptr() as usize + self.len;
        if region.as_ptr() as usize != expected {
          return Err(Error::Discontiguous { expected, got: region.as_ptr() as usize });
        }
      },
    }

    self.len += bytes;
    debug!("heap: grew by {} bytes to {}", bytes, self.len);
    Ok(start)
  }
}

impl<M> Heap<M> {
  pub fn len(&self) -> usize {
    self.len
  }

  pub fn source(&self) -> &M {
    &self.source
  }

  fn base(&self) -> NonNull<u8> {
    debug_assert!(self.base.is_some(), "heap used before it was grown");
    self.base.unwrap_or(NonNull::dangling())
  }

  /// Whether a word starting at `offset` lies inside the heap.
  pub fn word_in_bounds(
    &self,
    offset: usize,
  ) -> bool {
    offset.checked_add(WSIZE).is_some_and(|end| end <= self.len)
  }

  pub fn get(
    &self,
    offset: usize,
  ) -> usize {
    debug_assert!(
      self.word_in_bounds(offset),
      "read at {offset:#x} past heap end {:#x}",
      self.len
    );
    debug_assert!(offset % WSIZE == 0);
    unsafe { self.base().add(offset).cast::<usize>().read() }
  }

  pub fn put(
    &mut self,
    offset: usize,
    word: usize,
  ) {
    debug_assert!(
      self.word_in_bounds(offset),
      "write at {offset:#x} past heap end {:#x}",
      self.len
    );
    debug_assert!(offset % WSIZE == 0);
    unsafe { self.base().add(offset).cast::<usize>().write(word) }
  }

  pub fn header(
    &self,
    bp: usize,
  ) -> Tag {
    Tag::from_word(self.get(bp - WSIZE))
  }

  /// Footer of the block at `bp`, located through its header size.
  pub fn footer(
    &self,
    bp: usize,
  ) -> Tag {
    Tag::from_word(self.get(self.footer_offset(bp)))
  }

  pub fn footer_offset(
    &self,
    bp: usize,
  ) -> usize {
    bp + self.header(bp).size() - DSIZE
  }

  /// Writes `tag` as the header at `bp` and as the footer `tag.size()` later.
  pub fn set_tags(
    &mut self,
    bp: usize,
    tag: Tag,
  ) {
    self.put(bp - WSIZE, tag.word());
    self.put(bp + tag.size() - DSIZE, tag.word());
  }

  pub fn next_block(
    &self,
    bp: usize,
  ) -> usize {
    bp + self.header(bp).size()
  }

  /// Payload offset of the physically preceding block, read from its footer.
  pub fn prev_block(
    &self,
    bp: usize,
  ) -> usize {
    bp - Tag::from_word(self.get(bp - DSIZE)).size()
  }

  pub fn info(
    &self,
    bp: usize,
  ) -> BlockInfo {
    let tag = self.header(bp);
    BlockInfo { offset: bp, size: tag.size(), allocated: tag.is_allocated() }
  }

  pub fn pointer(
    &self,
    offset: usize,
  ) -> NonNull<u8> {
    unsafe { self.base().add(offset) }
  }

  /// Payload offset of a pointer previously returned by [`Heap::pointer`].
  pub fn offset_of(
    &self,
    ptr: NonNull<u8>,
  ) -> usize {
    debug_assert!(self.contains(ptr), "pointer {ptr:?} does not belong to this heap");
    ptr.as_ptr() as usize - self.base().as_ptr() as usize
  }

  pub fn contains(
    &self,
    ptr: NonNull<u8>,
  ) -> bool {
    match self.base {
      Some(base) => {
        let start = base.as_ptr() as usize;
        (start..start + self.len).contains(&(ptr.as_ptr() as usize))
      },
      None => false,
    }
  }

  /// Copies `count` payload bytes between two distinct blocks.
  pub fn copy_payload(
    &mut self,
    from: usize,
    to: usize,
    count: usize,
  ) {
    debug_assert!(from + count <= self.len && to + count <= self.len);
    debug_assert!(from + count <= to || to + count <= from, "payloads overlap");
    unsafe {
      ptr::copy_nonoverlapping(
        self.base().add(from).as_ptr(),
        self.base().add(to).as_ptr(),
        count,
      );
    }
  }
}
