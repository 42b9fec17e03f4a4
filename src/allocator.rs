use std::ptr::NonNull;

use log::{debug, trace, warn};

use crate::{
  block::{DSIZE, MIN_BLOCK_SIZE, Tag, WSIZE, adjusted_size},
  config::Config,
  error::{Error, Result},
  free_list::{CLASS_COUNT, SizeClasses, classify},
  heap::Heap,
  memory::MemorySource,
};

/// Where a block handed to [`SegregatedAllocator::place`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
  /// Found by the free-list search, still linked in its class list.
  FreeList,
  /// Fresh from heap extension, never linked.
  Extension,
}

/// Segregated free-list allocator with boundary-tag coalescing.
///
/// One instance owns one heap. It is strictly single-threaded: callers that
/// share it across threads must serialize access themselves.
pub struct SegregatedAllocator<M> {
  pub(crate) heap: Heap<M>,
  pub(crate) classes: SizeClasses,
  /// Payload offset of the prologue block.
  pub(crate) prologue: usize,
  config: Config,
}

impl<M: MemorySource> SegregatedAllocator<M> {
  /// Lays down the sentinel blocks with the default [`Config`].
  pub fn init(source: M) -> Result<Self> {
    Self::with_config(source, Config::default())
  }

  pub fn with_config(
    source: M,
    config: Config,
  ) -> Result<Self> {
    config.validate()?;

    let mut heap = Heap::new(source);
    let requested = 4 * WSIZE;
    let start = heap.grow(requested).map_err(|err| {
      warn!("init: {}", err);
      Error::InitializationFailure { requested }
    })?;

    let prologue = Tag::pack(DSIZE, true);
    heap.put(start, 0);
    heap.put(start + WSIZE, prologue.word());
    heap.put(start + 2 * WSIZE, prologue.word());
    heap.put(start + 3 * WSIZE, Tag::EPILOGUE.word());
    debug!("init: heap ready, chunk size {}", config.chunk_size);

    Ok(Self {
      heap,
      classes: SizeClasses::new(),
      prologue: start + 2 * WSIZE,
      config,
    })
  }

  /// Allocates a block with at least `size` bytes of payload, aligned to
  /// the double-word boundary.
  ///
  /// Returns `Ok(None)` for a zero-sized request.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<Option<NonNull<u8>>> {
    if size == 0 {
      return Ok(None);
    }
    let asize = adjusted_size(size).ok_or(Error::OutOfMemory { requested: size })?;

    let bp = match self.find_fit(asize) {
      Some(bp) => {
        self.place(bp, asize, Origin::FreeList);
        bp
      },
      None => {
        let extend = asize.max(self.config.chunk_size);
        let bp = self.extend_heap(extend / WSIZE).inspect_err(|err| {
          warn!("allocate({}): {}", size, err);
        })?;
        self.place(bp, asize, Origin::Extension);
        bp
      },
    };

    trace!("allocate({}) -> {:#x} [{} bytes]", size, bp, self.heap.header(bp).size());
    Ok(Some(self.heap.pointer(bp)))
  }

  /// Resizes the allocation at `ptr`, moving it to a fresh block.
  ///
  /// A null `ptr` behaves like [`allocate`](Self::allocate); a zero `size`
  /// frees `ptr` and returns `Ok(None)`. On failure the original block is
  /// left untouched.
  ///
  /// # Safety
  ///
  /// `ptr` must be null or a live pointer returned by this allocator.
  pub unsafe fn reallocate(
    &mut self,
    ptr: Option<NonNull<u8>>,
    size: usize,
  ) -> Result<Option<NonNull<u8>>> {
    if size == 0 {
      unsafe { self.free(ptr) };
      return Ok(None);
    }
    let Some(old) = ptr else {
      return self.allocate(size);
    };

    let old_bp = self.heap.offset_of(old);
    let Some(new) = self.allocate(size)? else {
      return Ok(None);
    };
    let new_bp = self.heap.offset_of(new);

    let count = self.heap.info(old_bp).payload_size().min(size);
    self.heap.copy_payload(old_bp, new_bp, count);
    unsafe { self.free(Some(old)) };

    trace!("reallocate({:#x}, {}) -> {:#x}", old_bp, size, new_bp);
    Ok(Some(new))
  }

  /// Best fit within the first class, at or above the class of `asize`,
  /// that has any block large enough.
  fn find_fit(
    &self,
    asize: usize,
  ) -> Option<usize> {
    (classify(asize)..CLASS_COUNT).find_map(|class| {
      self
        .classes
        .iter(&self.heap, class, usize::MAX)
        .map(|bp| (self.heap.header(bp).size(), bp))
        .filter(|&(size, _)| size >= asize)
        .min_by_key(|&(size, _)| size)
        .map(|(_, bp)| bp)
    })
  }

  /// Grows the heap by `words` (rounded up to even) as one free block and
  /// moves the epilogue behind it. The block is not coalesced.
  fn extend_heap(
    &mut self,
    words: usize,
  ) -> Result<usize> {
    let words = words + words % 2;
    let size = words
      .checked_mul(WSIZE)
      .ok_or(Error::OutOfMemory { requested: usize::MAX })?;

    // The old epilogue header becomes the new block's header.
    let bp = self.heap.grow(size)?;
    self.heap.set_tags(bp, Tag::pack(size, false));
    let epilogue = self.heap.next_block(bp) - WSIZE;
    self.heap.put(epilogue, Tag::EPILOGUE.word());

    debug!("extend_heap: {} bytes at {:#x}", size, bp);
    Ok(bp)
  }

  /// Marks `asize` bytes of the free block at `bp` allocated, splitting off
  /// the remainder when it can stand as a block of its own.
  fn place(
    &mut self,
    bp: usize,
    asize: usize,
    origin: Origin,
  ) {
    let csize = self.heap.header(bp).size();
    if origin == Origin::FreeList {
      self.classes.delete(&mut self.heap, bp);
    }

    if csize - asize >= MIN_BLOCK_SIZE {
      self.heap.set_tags(bp, Tag::pack(asize, true));
      let rest = self.heap.next_block(bp);
      self.heap.set_tags(rest, Tag::pack(csize - asize, false));
      self.classes.insert(&mut self.heap, rest);
      debug!("place: split {} at {:#x} into {} + {}", csize, bp, asize, csize - asize);
    } else {
      self.heap.set_tags(bp, Tag::pack(csize, true));
    }
  }
}

impl<M> SegregatedAllocator<M> {
  /// Releases the block at `ptr` and merges it with free neighbours.
  ///
  /// A null `ptr` is ignored.
  ///
  /// # Safety
  ///
  /// `ptr` must be null or a live pointer returned by this allocator.
  pub unsafe fn free(
    &mut self,
    ptr: Option<NonNull<u8>>,
  ) {
    let Some(ptr) = ptr else {
      return;
    };
    let bp = self.heap.offset_of(ptr);
    let tag = self.heap.header(bp);
    debug_assert!(tag.is_allocated(), "double free of {bp:#x}");

    self.heap.set_tags(bp, Tag::pack(tag.size(), false));
    let merged = self.coalesce(bp);
    trace!("free({:#x}) -> free block {:#x}", bp, merged);
  }

  /// Boundary-tag coalescing. Returns the payload offset of the merged block,
  /// which is linked into its class list exactly once.
  fn coalesce(
    &mut self,
    bp: usize,
  ) -> usize {
    let prev_alloc = Tag::from_word(self.heap.get(bp - DSIZE)).is_allocated();
    let next = self.heap.next_block(bp);
    let next_alloc = self.heap.header(next).is_allocated();
    let mut size = self.heap.header(bp).size();

    let bp = match (prev_alloc, next_alloc) {
      (true, true) => bp,
      (true, false) => {
        self.classes.delete(&mut self.heap, next);
        size += self.heap.header(next).size();
        bp
      },
      (false, true) => {
        let prev = self.heap.prev_block(bp);
        self.classes.delete(&mut self.heap, prev);
        size += self.heap.header(prev).size();
        prev
      },
      (false, false) => {
        let prev = self.heap.prev_block(bp);
        self.classes.delete(&mut self.heap, prev);
        self.classes.delete(&mut self.heap, next);
        size += self.heap.header(prev).size() + self.heap.header(next).size();
        prev
      },
    };

    self.heap.set_tags(bp, Tag::pack(size, false));
    self.classes.insert(&mut self.heap, bp);
    bp
  }

  /// Payload capacity of the block behind `ptr`.
  ///
  /// # Safety
  ///
  /// `ptr` must be a live pointer returned by this allocator.
  pub unsafe fn usable_size(
    &self,
    ptr: NonNull<u8>,
  ) -> usize {
    self.heap.info(self.heap.offset_of(ptr)).payload_size()
  }

  /// Bytes obtained from the memory source so far.
  pub fn heap_size(&self) -> usize {
    self.heap.len()
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn source(&self) -> &M {
    self.heap.source()
  }
}
