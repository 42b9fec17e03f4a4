use std::{io::Read, ptr::NonNull};

use segalloc::{Error, Sbrk, SegregatedAllocator};

/// Pauses between steps so the heap can be inspected from outside, e.g. the
/// `[heap]` mapping in `/proc/<pid>/maps`.
fn pause() {
  println!("\n-- ENTER for the next step --");
  let _ = std::io::stdin().bytes().next();
}

/// Shows where the segregated heap currently ends.
fn show_heap_end(
  allocator: Option<&SegregatedAllocator<Sbrk>>,
  step: &str,
) {
  let heap = allocator.map_or(0, |allocator| allocator.heap_size());
  println!(
    "({}) pid {}: break at {:?}, heap {} bytes",
    step,
    std::process::id(),
    Sbrk::program_break(),
    heap,
  );
}

fn print_alloc(
  allocator: &SegregatedAllocator<Sbrk>,
  label: &str,
  size: usize,
  ptr: Option<NonNull<u8>>,
) {
  match ptr {
    Some(ptr) => println!(
      "{} {} bytes, address = {:?}, usable = {}, heap = {} bytes",
      label,
      size,
      ptr,
      unsafe { allocator.usable_size(ptr) },
      allocator.heap_size(),
    ),
    None => println!("{} {} bytes -> null", label, size),
  }
}

fn print_blocks(allocator: &SegregatedAllocator<Sbrk>) {
  for block in allocator.blocks() {
    println!(
      "    {:#08x}  {:>6} bytes  {}",
      block.offset,
      block.size,
      if block.allocated { "allocated" } else { "free" }
    );
  }
  println!("    heap consistent: {}", allocator.check());
}

fn main() -> Result<(), Error> {
  show_heap_end(None, "start");
  let mut allocator = SegregatedAllocator::init(Sbrk::new())?;
  show_heap_end(Some(&allocator), "after init");
  pause();

  // --------------------------------------------------------------------
  // 1) Two 100-byte blocks. The first request grows the heap by a chunk
  //    and splits it; the second is carved out of the remainder.
  // --------------------------------------------------------------------
  let p1 = allocator.allocate(100)?;
  print_alloc(&allocator, "\n[1] Allocate", 100, p1);
  let p2 = allocator.allocate(100)?;
  print_alloc(&allocator, "[1] Allocate", 100, p2);
  print_blocks(&allocator);
  show_heap_end(Some(&allocator), "after first chunk");
  pause();

  // --------------------------------------------------------------------
  // 2) Free the first block and ask for less: the freed block is reused.
  // --------------------------------------------------------------------
  unsafe { allocator.free(p1) };
  let p3 = allocator.allocate(50)?;
  print_alloc(&allocator, "\n[2] Allocate", 50, p3);
  println!(
    "[2] p3 == p1? {}",
    if p3 == p1 { "Yes, it reused the freed block" } else { "No, it allocated somewhere else" }
  );
  print_blocks(&allocator);
  pause();

  // --------------------------------------------------------------------
  // 3) Grow p2 with reallocate; the contents move to a larger block.
  // --------------------------------------------------------------------
  if let Some(ptr) = p2 {
    unsafe { ptr.as_ptr().write_bytes(0xAB, 100) };
  }
  let p2 = unsafe { allocator.reallocate(p2, 1000)? };
  print_alloc(&allocator, "\n[3] Reallocate to", 1000, p2);
  if let Some(ptr) = p2 {
    println!("[3] First byte after move = {:#X}", unsafe { ptr.as_ptr().read() });
  }
  print_blocks(&allocator);
  pause();

  // --------------------------------------------------------------------
  // 4) A large block grows the heap by exactly what it needs.
  // --------------------------------------------------------------------
  show_heap_end(Some(&allocator), "before large alloc");
  let big = allocator.allocate(64 * 1024)?;
  print_alloc(&allocator, "\n[4] Allocate", 64 * 1024, big);
  show_heap_end(Some(&allocator), "after large alloc");
  pause();

  // --------------------------------------------------------------------
  // 5) Free everything: all blocks coalesce into one.
  // --------------------------------------------------------------------
  unsafe {
    allocator.free(p3);
    allocator.free(p2);
    allocator.free(big);
  }
  println!("\n[5] Freed everything");
  print_blocks(&allocator);
  println!("[5] {:?}", allocator.stats());

  println!("\nEnd of example. The heap is never shrunk; the OS reclaims it at exit.");
  Ok(())
}
