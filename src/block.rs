use std::{fmt, mem};

/// Word size: one header or footer, one free-list link.
pub const WSIZE: usize = mem::size_of::<usize>();
/// Double-word size, the alignment of every payload and block size.
pub const DSIZE: usize = 2 * WSIZE;
/// Smallest block: header, footer and the two free-list links.
pub const MIN_BLOCK_SIZE: usize = 2 * DSIZE;
/// Default amount the heap grows by on a free-list miss.
pub const CHUNK_SIZE: usize = 1 << 12;

const ALLOCATED: usize = 0x1;
const SIZE_MASK: usize = !(DSIZE - 1);

/// A boundary tag: block size with the allocated flag packed in the low bit.
///
/// Sizes are multiples of [`DSIZE`], so the low bits of the word are free
/// to carry the flag. The same word is written as the header and footer.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag(usize);

impl Tag {
  /// Tag of the epilogue: zero-sized and allocated.
  pub const EPILOGUE: Tag = Tag::pack(0, true);

  pub const fn pack(
    size: usize,
    allocated: bool,
  ) -> Self {
    debug_assert!(size & !SIZE_MASK == 0);
    Self(size | allocated as usize)
  }

  pub const fn from_word(word: usize) -> Self {
    Self(word)
  }

  pub const fn word(self) -> usize {
    self.0
  }

  pub const fn size(self) -> usize {
    self.0 & SIZE_MASK
  }

  pub const fn is_allocated(self) -> bool {
    self.0 & ALLOCATED != 0
  }

  pub const fn is_free(self) -> bool {
    !self.is_allocated()
  }
}

impl fmt::Debug for Tag {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Tag")
      .field("size", &self.size())
      .field("allocated", &self.is_allocated())
      .finish()
  }
}

/// Snapshot of one block, as seen by a heap-order walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  /// Payload offset from the heap base.
  pub offset: usize,
  /// Whole block size, header and footer included.
  pub size: usize,
  pub allocated: bool,
}

impl BlockInfo {
  /// Bytes usable by the caller.
  pub const fn payload_size(&self) -> usize {
    self.size - DSIZE
  }
}

/// Block size needed to serve a `size`-byte request.
///
/// Small requests get [`MIN_BLOCK_SIZE`] so the block can hold the free-list
/// links once freed; anything else is payload plus tags, rounded up.
pub const fn adjusted_size(size: usize) -> Option<usize> {
  if size <= DSIZE {
    return Some(MIN_BLOCK_SIZE);
  }
  match size.checked_add(DSIZE + DSIZE - 1) {
    Some(padded) => Some(DSIZE * (padded / DSIZE)),
    None => None,
  }
}
