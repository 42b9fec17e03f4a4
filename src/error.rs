use thiserror::Error;

/// Failures surfaced by the allocator's public operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
  /// The memory source could not provide the initial sentinel words.
  #[error("heap initialization failed: memory source refused {requested} bytes")]
  InitializationFailure { requested: usize },
  /// The memory source could not grow the heap.
  #[error("out of memory: memory source refused {requested} bytes")]
  OutOfMemory { requested: usize },
  /// The memory source handed back bytes that do not continue the heap.
  #[error("memory source returned a region at {got:#x}, expected {expected:#x}")]
  Discontiguous { expected: usize, got: usize },
  #[error("invalid chunk size {0}: must be a positive multiple of the double-word size")]
  InvalidConfig(usize),
}

pub type Result<T> = core::result::Result<T, Error>;

/// A broken heap invariant, reported by the consistency checker.
///
/// Offsets are payload offsets from the heap base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConsistencyViolation {
  #[error("block at {offset:#x} is in free list {class} but marked allocated")]
  AllocatedInFreeList { offset: usize, class: usize },
  #[error("free-list links around block at {offset:#x} are not symmetric")]
  BrokenLink { offset: usize },
  #[error("block at {offset:#x} is not double-word aligned")]
  Misaligned { offset: usize },
  #[error("block at {offset:#x}: header {header:#x} does not match footer {footer:#x}")]
  TagMismatch { offset: usize, header: usize, footer: usize },
  #[error("blocks at {offset:#x} and {next:#x} are both free")]
  AdjacentFree { offset: usize, next: usize },
  #[error("{in_heap} free blocks in the heap but {in_lists} in the free lists")]
  FreeCountMismatch { in_heap: usize, in_lists: usize },
  #[error("block at {offset:#x} has invalid size {size}")]
  BadSize { offset: usize, size: usize },
  #[error("block at {offset:#x} of size {size} is in free list {class}, expected {expected}")]
  WrongClass { offset: usize, size: usize, class: usize, expected: usize },
  #[error("offset {offset:#x} lies outside the heap")]
  OutOfBounds { offset: usize },
  #[error("free list {class} does not terminate")]
  ListCycle { class: usize },
}
