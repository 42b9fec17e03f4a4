//! # segalloc - A Segregated Free-List Allocator
//!
//! This crate provides a general-purpose dynamic memory allocator that manages
//! a single, grow-only heap region obtained through an `sbrk`-style primitive.
//! Free blocks are kept in size-class buckets and merged with their neighbours
//! as soon as they are released.
//!
//! ## Overview
//!
//! ```text
//!   Heap Layout:
//!
//!   ┌─────┬──────┬──────┬───────────────┬──────────────────┬─────┬──────┐
//!   │ pad │ pro  │ pro  │   block A     │     block B      │ ... │ epi  │
//!   │     │ hdr  │ ftr  │ hdr│...│ftr   │ hdr│ ...    │ftr  │     │ hdr  │
//!   └─────┴──────┴──────┴───────────────┴──────────────────┴─────┴──────┘
//!         ◄─ prologue ─►                                          ▲
//!          (allocated)                               epilogue: size 0,
//!                                                    allocated, moved on
//!                                                    every heap extension
//!
//!   Size-class index (unordered, doubly linked, LIFO):
//!
//!   [0] ≤64     ──► B ──► F ──► ∅
//!   [1] ≤128    ──► ∅
//!   [2] ≤256    ──► D ──► ∅
//!    ...
//!   [9] >16384  ──► ∅
//! ```
//!
//! Every block carries the same boundary tag (size | allocated bit) in its
//! header and footer, so both physical neighbours are reachable in O(1) and
//! adjacent free blocks can be merged immediately.
//!
//! ## Crate Structure
//!
//! ```text
//!   segalloc
//!   ├── align      - Double-word alignment (align!)
//!   ├── block      - Boundary tags and layout constants
//!   ├── memory     - Memory sources: Sbrk, Arena
//!   ├── heap       - Heap region and block arithmetic (internal)
//!   ├── free_list  - Size classes and free-list links (internal)
//!   ├── allocator  - SegregatedAllocator
//!   ├── check      - Consistency checker and heap statistics
//!   ├── config     - Config
//!   └── error      - Error, ConsistencyViolation
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use segalloc::{Arena, SegregatedAllocator};
//!
//! let mut allocator = SegregatedAllocator::init(Arena::new(1 << 20).unwrap()).unwrap();
//!
//! let ptr = allocator.allocate(100).unwrap();
//! assert!(ptr.is_some());
//!
//! unsafe {
//!   let ptr = allocator.reallocate(ptr, 200).unwrap();
//!   allocator.free(ptr);
//! }
//!
//! assert!(allocator.check());
//! ```
//!
//! ## How It Works
//!
//! - **allocate**: the request is rounded to a double-word multiple with room
//!   for the tags. The lists from the request's class upwards are scanned and
//!   the tightest block of the first class holding any fit is taken; on a miss
//!   the heap grows by at least one chunk. Oversized blocks are split and the
//!   remainder goes back to its list.
//! - **free**: the block is marked free and coalesced with free neighbours
//!   before being pushed onto its class list.
//! - **reallocate**: allocate, copy, free.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: No synchronization primitives
//! - **Grow-only**: Memory is never returned to the operating system
//! - **Double-word alignment**: Stricter alignments are not supported
//!
//! ## Safety
//!
//! Pointers handed to `free`, `reallocate` and `usable_size` must come from the
//! same allocator instance, which is why those operations are `unsafe`.

pub mod align;
pub mod block;
mod allocator;
mod check;
pub mod config;
pub mod error;
mod free_list;
mod heap;
pub mod memory;

pub use allocator::SegregatedAllocator;
pub use block::BlockInfo;
pub use check::HeapStats;
pub use config::Config;
pub use error::{ConsistencyViolation, Error, Result};
pub use free_list::{CLASS_COUNT, classify};
pub use memory::{Arena, MemorySource, Sbrk};
