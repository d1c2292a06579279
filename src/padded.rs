//! Cache-line padding for per-shard state.
//!
//! Each shard lock is hammered by a different set of threads; keeping the
//! locks on separate cache lines stops a writer on one shard from
//! invalidating the line a reader of the neighbouring shard is spinning on.

use core::fmt::Debug;
use core::fmt::Formatter;
use core::fmt::Result;
use core::ops::Deref;

/// Aligns a value to its own cache line.
///
/// Targets that prefetch cache lines in adjacent pairs get 128 bytes, all
/// others get 64.
#[cfg_attr(
  any(target_arch = "x86_64", target_arch = "aarch64", target_arch = "powerpc64"),
  repr(align(128))
)]
#[cfg_attr(
  not(any(target_arch = "x86_64", target_arch = "aarch64", target_arch = "powerpc64")),
  repr(align(64))
)]
#[derive(Default)]
pub(crate) struct CachePadded<T>(T);

impl<T> CachePadded<T> {
  #[inline]
  pub(crate) const fn new(value: T) -> Self {
    Self(value)
  }
}

impl<T> Deref for CachePadded<T> {
  type Target = T;

  #[inline]
  fn deref(&self) -> &T {
    &self.0
  }
}

impl<T> Debug for CachePadded<T>
where
  T: Debug,
{
  fn fmt(&self, f: &mut Formatter<'_>) -> Result {
    self.0.fmt(f)
  }
}
