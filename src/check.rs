//! Heap consistency checking and inspection.
//!
//! The checker walks every free list, then the heap in address order, and
//! cross-validates the two. It is a diagnostic: no allocator operation runs it
//! on its own.
use log::error;

use crate::{
  allocator::SegregatedAllocator,
  block::{BlockInfo, DSIZE, MIN_BLOCK_SIZE, Tag, WSIZE},
  error::ConsistencyViolation,
  free_list::{CLASS_COUNT, FreeBlock, classify},
};

type Check<T = ()> = core::result::Result<T, ConsistencyViolation>;

/// Aggregate numbers from a heap walk. Sentinel blocks are not counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
  /// Bytes obtained from the memory source.
  pub heap_size: usize,
  pub allocated_blocks: usize,
  /// Sum of allocated block sizes, tags included.
  pub allocated_bytes: usize,
  pub free_blocks: usize,
  pub free_bytes: usize,
  pub largest_free: usize,
}

impl<M> SegregatedAllocator<M> {
  /// Runs [`verify`](Self::verify) and logs the first violation found.
  pub fn check(&self) -> bool {
    match self.verify() {
      Ok(()) => true,
      Err(violation) => {
        error!("heap check failed: {}", violation);
        false
      },
    }
  }

  /// Validates the heap and free lists, returning the first broken invariant.
  pub fn verify(&self) -> Check {
    let in_lists = self.verify_free_lists()?;
    let in_heap = self.verify_blocks()?;

    if in_heap != in_lists {
      return Err(ConsistencyViolation::FreeCountMismatch { in_heap, in_lists });
    }
    Ok(())
  }

  /// Every listed block is free, correctly classed and symmetrically linked.
  fn verify_free_lists(&self) -> Check<usize> {
    let heap = &self.heap;
    // No list can hold more blocks than fit in the heap.
    let limit = heap.len() / MIN_BLOCK_SIZE + 1;
    let mut count = 0;

    for class in 0..CLASS_COUNT {
      let mut walked = 0;
      for bp in self.classes.iter(heap, class, limit + 1) {
        walked += 1;
        if walked > limit {
          return Err(ConsistencyViolation::ListCycle { class });
        }
        self.verify_link_target(bp)?;

        let tag = heap.header(bp);
        if tag.is_allocated() {
          return Err(ConsistencyViolation::AllocatedInFreeList { offset: bp, class });
        }
        self.verify_links(bp, class)?;

        let expected = classify(tag.size());
        if expected != class {
          return Err(ConsistencyViolation::WrongClass {
            offset: bp,
            size: tag.size(),
            class,
            expected,
          });
        }
        count += 1;
      }
    }
    Ok(count)
  }

  fn verify_links(
    &self,
    bp: usize,
    class: usize,
  ) -> Check {
    let heap = &self.heap;
    let block = FreeBlock::at(bp);
    let prev = block.prev(heap);
    let is_head = self.classes.head(class) == Some(bp);

    if is_head != prev.is_none() {
      return Err(ConsistencyViolation::BrokenLink { offset: bp });
    }
    if let Some(prev) = prev {
      self.verify_link_target(prev)?;
      if FreeBlock::at(prev).next(heap) != Some(bp) {
        return Err(ConsistencyViolation::BrokenLink { offset: bp });
      }
    }
    if let Some(next) = block.next(heap) {
      self.verify_link_target(next)?;
      if FreeBlock::at(next).prev(heap) != Some(bp) {
        return Err(ConsistencyViolation::BrokenLink { offset: bp });
      }
    }
    Ok(())
  }

  /// A link must name a payload whose header and link words are readable.
  fn verify_link_target(
    &self,
    bp: usize,
  ) -> Check {
    if bp <= self.prologue || !self.heap.word_in_bounds(bp + WSIZE) {
      return Err(ConsistencyViolation::OutOfBounds { offset: bp });
    }
    if bp % DSIZE != 0 {
      return Err(ConsistencyViolation::Misaligned { offset: bp });
    }
    Ok(())
  }

  /// Heap-order walk from the prologue to the epilogue; returns the number
  /// of free blocks seen.
  fn verify_blocks(&self) -> Check<usize> {
    let heap = &self.heap;
    let mut bp = self.prologue;
    let mut prev_free: Option<usize> = None;
    let mut free = 0;

    loop {
      if !heap.word_in_bounds(bp - WSIZE) {
        return Err(ConsistencyViolation::OutOfBounds { offset: bp });
      }
      let header = heap.header(bp);
      if header.size() == 0 {
        break;
      }

      if !crate::align::is_aligned(heap.pointer(bp).as_ptr() as usize) {
        return Err(ConsistencyViolation::Misaligned { offset: bp });
      }
      self.verify_size(bp, header)?;

      let footer = heap.footer(bp);
      if header != footer {
        return Err(ConsistencyViolation::TagMismatch {
          offset: bp,
          header: header.word(),
          footer: footer.word(),
        });
      }

      if header.is_free() {
        if let Some(prev) = prev_free {
          return Err(ConsistencyViolation::AdjacentFree { offset: prev, next: bp });
        }
        prev_free = Some(bp);
        free += 1;
      } else {
        prev_free = None;
      }
      bp += header.size();
    }

    // The epilogue header is the last word of the heap.
    if bp != heap.len() {
      return Err(ConsistencyViolation::OutOfBounds { offset: bp });
    }
    Ok(free)
  }

  fn verify_size(
    &self,
    bp: usize,
    tag: Tag,
  ) -> Check {
    let size = tag.size();
    let min = if bp == self.prologue { DSIZE } else { MIN_BLOCK_SIZE };
    let fits = bp
      .checked_add(size)
      .is_some_and(|end| self.heap.word_in_bounds(end - WSIZE));

    if size < min || !fits {
      return Err(ConsistencyViolation::BadSize { offset: bp, size });
    }
    Ok(())
  }

  /// Blocks between the sentinels, in address order.
  ///
  /// Assumes a consistent heap; run [`verify`](Self::verify) first when in
  /// doubt.
  pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
    let heap = &self.heap;
    let mut bp = heap.next_block(self.prologue);
    std::iter::from_fn(move || {
      let info = heap.info(bp);
      if info.size == 0 {
        return None;
      }
      bp += info.size;
      Some(info)
    })
  }

  pub fn stats(&self) -> HeapStats {
    self.blocks().fold(
      HeapStats { heap_size: self.heap.len(), ..HeapStats::default() },
      |mut stats, block| {
        if block.allocated {
          stats.allocated_blocks += 1;
          stats.allocated_bytes += block.size;
        } else {
          stats.free_blocks += 1;
          stats.free_bytes += block.size;
          stats.largest_free = stats.largest_free.max(block.size);
        }
        stats
      },
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::memory::Arena;

  fn allocator() -> SegregatedAllocator<Arena> {
    SegregatedAllocator::init(Arena::new(1 << 16).unwrap()).unwrap()
  }

  /// Allocator with blocks: allocated, free, allocated, free remainder.
  fn fragmented() -> (SegregatedAllocator<Arena>, Vec<usize>) {
    let mut allocator = allocator();
    let ptrs: Vec<_> = (0..3).map(|_| allocator.allocate(40).unwrap()).collect();
    unsafe { allocator.free(ptrs[1]) };
    let offsets = ptrs.iter().map(|p| allocator.heap.offset_of(p.unwrap())).collect();
    (allocator, offsets)
  }

  #[test]
  fn test_healthy_heap_passes() {
    let (allocator, _) = fragmented();
    assert_eq!(allocator.verify(), Ok(()));
    assert!(allocator.check());
  }

  #[test]
  fn test_detects_allocated_block_in_list() {
    let (mut allocator, offsets) = fragmented();
    let size = allocator.heap.header(offsets[1]).size();
    allocator.heap.set_tags(offsets[1], Tag::pack(size, true));

    assert!(matches!(
      allocator.verify(),
      Err(ConsistencyViolation::AllocatedInFreeList { offset, .. }) if offset == offsets[1]
    ));
    assert!(!allocator.check());
  }

  #[test]
  fn test_detects_broken_link() {
    let (mut allocator, offsets) = fragmented();
    FreeBlock::at(offsets[1]).set_prev(&mut allocator.heap, Some(offsets[1]));

    assert_eq!(
      allocator.verify(),
      Err(ConsistencyViolation::BrokenLink { offset: offsets[1] })
    );
  }

  #[test]
  fn test_detects_tag_mismatch() {
    let (mut allocator, offsets) = fragmented();
    let footer = allocator.heap.footer_offset(offsets[0]);
    allocator.heap.put(footer, 0xdead_0);

    assert!(matches!(
      allocator.verify(),
      Err(ConsistencyViolation::TagMismatch { offset, footer: 0xdead_0, .. })
        if offset == offsets[0]
    ));
  }

  #[test]
  fn test_detects_adjacent_free_blocks() {
    let (mut allocator, offsets) = fragmented();
    // Free the block by hand, skipping coalescing and the free list.
    let size = allocator.heap.header(offsets[2]).size();
    allocator.heap.set_tags(offsets[2], Tag::pack(size, false));

    assert_eq!(
      allocator.verify(),
      Err(ConsistencyViolation::AdjacentFree { offset: offsets[1], next: offsets[2] })
    );
  }

  #[test]
  fn test_detects_unlisted_free_block() {
    let (mut allocator, offsets) = fragmented();
    allocator.classes.delete(&mut allocator.heap, offsets[1]);

    assert_eq!(
      allocator.verify(),
      Err(ConsistencyViolation::FreeCountMismatch { in_heap: 2, in_lists: 1 })
    );
  }

  #[test]
  fn test_detects_cycle() {
    let (mut allocator, offsets) = fragmented();
    FreeBlock::at(offsets[1]).set_next(&mut allocator.heap, Some(offsets[1]));

    assert!(matches!(
      allocator.verify(),
      Err(ConsistencyViolation::BrokenLink { .. } | ConsistencyViolation::ListCycle { .. })
    ));
  }

  #[test]
  fn test_detects_link_outside_heap() {
    let (mut allocator, offsets) = fragmented();
    let past_end = allocator.heap.len() + DSIZE;
    FreeBlock::at(offsets[1]).set_next(&mut allocator.heap, Some(past_end));

    assert_eq!(
      allocator.verify(),
      Err(ConsistencyViolation::OutOfBounds { offset: past_end })
    );
  }

  #[test]
  fn test_blocks_and_stats() {
    let (allocator, offsets) = fragmented();
    let blocks: Vec<_> = allocator.blocks().collect();

    assert_eq!(blocks.len(), 4);
    assert_eq!(blocks[0].offset, offsets[0]);
    assert!(blocks[0].allocated);
    assert!(!blocks[1].allocated);
    assert!(!blocks[3].allocated);

    let stats = allocator.stats();
    assert_eq!(stats.allocated_blocks, 2);
    assert_eq!(stats.free_blocks, 2);
    assert_eq!(
      stats.allocated_bytes + stats.free_bytes + 4 * WSIZE,
      stats.heap_size
    );
    assert_eq!(stats.largest_free, blocks[3].size);
  }
}
