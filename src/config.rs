use crate::{
  align::is_aligned,
  block::CHUNK_SIZE,
  error::{Error, Result},
};

/// Tunables for a [`SegregatedAllocator`](crate::SegregatedAllocator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
  /// Minimum number of bytes requested from the memory source on a miss.
  pub chunk_size: usize,
}

impl Config {
  pub const fn new() -> Self {
    Self { chunk_size: CHUNK_SIZE }
  }

  pub const fn chunk_size(
    mut self,
    chunk_size: usize,
  ) -> Self {
    self.chunk_size = chunk_size;
    self
  }

  /// Rejects chunk sizes that would break heap alignment.
  pub fn validate(&self) -> Result<()> {
    if self.chunk_size == 0 || !is_aligned(self.chunk_size) {
      return Err(Error::InvalidConfig(self.chunk_size));
    }
    Ok(())
  }
}

impl Default for Config {
  fn default() -> Self {
    Self::new()
  }
}
