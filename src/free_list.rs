//! Segregated free lists.
//!
//! Free blocks are threaded through unordered, doubly linked lists, one per
//! size class. The links live in the first two payload words of each free
//! block and are only meaningful while the block is free:
//!
//! ```text
//!   ┌──────────┬───────────┬───────────┬─────────────┬──────────┐
//!   │  header  │ next_free │ prev_free │   unused    │  footer  │
//!   └──────────┴───────────┴───────────┴─────────────┴──────────┘
//!              ▲
//!              bp
//! ```
use crate::{
  block::WSIZE,
  heap::Heap,
};

/// Number of size classes.
pub const CLASS_COUNT: usize = 10;

/// Inclusive upper bounds of classes `0..CLASS_COUNT - 1`; the last class
/// takes everything larger.
const CLASS_LIMITS: [usize; CLASS_COUNT - 1] =
  [64, 128, 256, 512, 1024, 2048, 4096, 8192, 16384];

/// Stored link value meaning "no block". Offset zero is the heap's alignment
/// padding and never a payload.
const NIL: usize = 0;

/// Size class of a block of `size` bytes.
pub fn classify(size: usize) -> usize {
  CLASS_LIMITS
    .iter()
    .position(|&limit| size <= limit)
    .unwrap_or(CLASS_COUNT - 1)
}

/// View over the link words of a free block.
///
/// Constructing one asserts that the block is free: an allocated block's
/// payload belongs to the caller and must never be read as links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeBlock(usize);

impl FreeBlock {
  pub fn new<M>(
    heap: &Heap<M>,
    bp: usize,
  ) -> Self {
    debug_assert!(heap.header(bp).is_free(), "block at {bp:#x} is allocated");
    Self(bp)
  }

  /// View without the free-flag assertion, for walking lists that may be
  /// corrupted.
  pub(crate) const fn at(bp: usize) -> Self {
    Self(bp)
  }

  pub fn next<M>(
    self,
    heap: &Heap<M>,
  ) -> Option<usize> {
    link(heap.get(self.0))
  }

  pub fn prev<M>(
    self,
    heap: &Heap<M>,
  ) -> Option<usize> {
    link(heap.get(self.0 + WSIZE))
  }

  pub fn set_next<M>(
    self,
    heap: &mut Heap<M>,
    next: Option<usize>,
  ) {
    heap.put(self.0, next.unwrap_or(NIL));
  }

  pub fn set_prev<M>(
    self,
    heap: &mut Heap<M>,
    prev: Option<usize>,
  ) {
    heap.put(self.0 + WSIZE, prev.unwrap_or(NIL));
  }
}

fn link(word: usize) -> Option<usize> {
  (word != NIL).then_some(word)
}

/// Heads of the segregated lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SizeClasses {
  heads: [Option<usize>; CLASS_COUNT],
}

impl SizeClasses {
  pub const fn new() -> Self {
    Self { heads: [None; CLASS_COUNT] }
  }

  pub fn head(
    &self,
    class: usize,
  ) -> Option<usize> {
    self.heads[class]
  }

  /// Pushes the free block at `bp` onto the head of its class list.
  pub fn insert<M>(
    &mut self,
    heap: &mut Heap<M>,
    bp: usize,
  ) {
    let class = classify(heap.header(bp).size());
    let block = FreeBlock::new(heap, bp);
    let head = self.heads[class];

    block.set_next(heap, head);
    block.set_prev(heap, None);
    if let Some(head) = head {
      FreeBlock::new(heap, head).set_prev(heap, Some(bp));
    }
    self.heads[class] = Some(bp);
  }

  /// Unlinks the free block at `bp` from its class list.
  ///
  /// Must run while the header still carries the size the block was inserted
  /// with, and before its payload is reused.
  pub fn delete<M>(
    &mut self,
    heap: &mut Heap<M>,
    bp: usize,
  ) {
    let class = classify(heap.header(bp).size());
    let block = FreeBlock::new(heap, bp);
    let next = block.next(heap);
    let prev = block.prev(heap);

    match prev {
      Some(prev) => FreeBlock(prev).set_next(heap, next),
      None => self.heads[class] = next,
    }
    if let Some(next) = next {
      FreeBlock(next).set_prev(heap, prev);
    }
  }

  /// Offsets in the list of `class`, head to tail.
  ///
  /// Stops after `limit` entries so a corrupted, cyclic list cannot hang the
  /// caller.
  pub fn iter<'a, M>(
    &self,
    heap: &'a Heap<M>,
    class: usize,
    limit: usize,
  ) -> impl Iterator<Item = usize> + 'a {
    let mut cursor = self.heads[class];
    std::iter::from_fn(move || {
      let bp = cursor?;
      cursor = FreeBlock(bp).next(heap);
      Some(bp)
    })
    .take(limit)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    block::{DSIZE, MIN_BLOCK_SIZE, Tag},
    memory::Arena,
  };

  #[test]
  fn test_classify_breakpoints() {
    assert_eq!(classify(MIN_BLOCK_SIZE), 0);
    assert_eq!(classify(64), 0);
    assert_eq!(classify(65), 1);
    assert_eq!(classify(128), 1);
    assert_eq!(classify(256), 2);
    assert_eq!(classify(512), 3);
    assert_eq!(classify(1024), 4);
    assert_eq!(classify(2048), 5);
    assert_eq!(classify(4096), 6);
    assert_eq!(classify(4097), 7);
    assert_eq!(classify(8192), 7);
    assert_eq!(classify(16384), 8);
    assert_eq!(classify(16385), 9);
    assert_eq!(classify(usize::MAX & !(DSIZE - 1)), 9);
  }

  /// Lays out `sizes` as consecutive free blocks and returns their offsets.
  fn free_blocks(
    heap: &mut Heap<Arena>,
    sizes: &[usize],
  ) -> Vec<usize> {
    let mut bp = DSIZE;
    let mut blocks = Vec::new();
    for &size in sizes {
      heap.set_tags(bp, Tag::pack(size, false));
      blocks.push(bp);
      bp += size;
    }
    blocks
  }

  fn list(
    classes: &SizeClasses,
    heap: &Heap<Arena>,
    class: usize,
  ) -> Vec<usize> {
    classes.iter(heap, class, usize::MAX).collect()
  }

  #[test]
  fn test_insert_is_lifo() {
    let mut heap = Heap::new(Arena::new(1024).unwrap());
    heap.grow(512).unwrap();
    let blocks = free_blocks(&mut heap, &[32, 48, 64, 128]);
    let mut classes = SizeClasses::new();

    for &bp in &blocks {
      classes.insert(&mut heap, bp);
    }

    assert_eq!(list(&classes, &heap, 0), vec![blocks[2], blocks[1], blocks[0]]);
    assert_eq!(list(&classes, &heap, 1), vec![blocks[3]]);
    assert_eq!(FreeBlock::new(&heap, blocks[2]).prev(&heap), None);
    assert_eq!(FreeBlock::new(&heap, blocks[1]).prev(&heap), Some(blocks[2]));
    assert_eq!(FreeBlock::new(&heap, blocks[0]).next(&heap), None);
  }

  #[test]
  fn test_delete_head_middle_tail() {
    let mut heap = Heap::new(Arena::new(1024).unwrap());
    heap.grow(512).unwrap();
    let blocks = free_blocks(&mut heap, &[32, 32, 32, 32]);
    let mut classes = SizeClasses::new();
    for &bp in &blocks {
      classes.insert(&mut heap, bp);
    }

    classes.delete(&mut heap, blocks[2]);
    assert_eq!(list(&classes, &heap, 0), vec![blocks[3], blocks[1], blocks[0]]);
    assert_eq!(FreeBlock::new(&heap, blocks[1]).prev(&heap), Some(blocks[3]));

    classes.delete(&mut heap, blocks[3]);
    assert_eq!(classes.head(0), Some(blocks[1]));
    assert_eq!(FreeBlock::new(&heap, blocks[1]).prev(&heap), None);

    classes.delete(&mut heap, blocks[0]);
    assert_eq!(list(&classes, &heap, 0), vec![blocks[1]]);
    assert_eq!(FreeBlock::new(&heap, blocks[1]).next(&heap), None);

    classes.delete(&mut heap, blocks[1]);
    assert_eq!(classes, SizeClasses::new());
  }

  #[test]
  fn test_iter_stops_at_limit() {
    let mut heap = Heap::new(Arena::new(1024).unwrap());
    heap.grow(256).unwrap();
    let blocks = free_blocks(&mut heap, &[32, 32]);
    let mut classes = SizeClasses::new();
    for &bp in &blocks {
      classes.insert(&mut heap, bp);
    }

    FreeBlock::new(&heap, blocks[0]).set_next(&mut heap, Some(blocks[1]));
    assert_eq!(classes.iter(&heap, 0, 5).count(), 5);
  }
}
