/// Rounds `value` up to the next multiple of the double-word size.
///
/// Every block size and payload address in the heap sits on this boundary.
///
/// # Examples
///
/// ```rust
/// use segalloc::{align, block::DSIZE};
///
/// assert_eq!(align!(1), DSIZE);
/// assert_eq!(align!(DSIZE), DSIZE);
/// assert_eq!(align!(DSIZE + 1), 2 * DSIZE);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + $crate::block::DSIZE - 1) & !($crate::block::DSIZE - 1)
  };
}

/// Returns `true` when `value` sits on a double-word boundary.
pub const fn is_aligned(value: usize) -> bool {
  value & (crate::block::DSIZE - 1) == 0
}
