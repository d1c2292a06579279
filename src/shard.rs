//! Shard selection and per-shard storage.
//!
//! Provides [`ShardIndex`], the public shard identifier, and [`Shards`], the
//! fixed-size array backing every per-shard structure.

use core::fmt::Debug;
use core::fmt::Display;
use core::fmt::Formatter;
use core::fmt::Result as FmtResult;
use core::iter::FusedIterator;

use crate::error::Error;
use crate::padded::CachePadded;

/// The number of shards in every table.
pub const SHARDS: usize = 16;

/// The mask selecting a shard from the low bits of a hash.
pub const SHARD_MASK: u64 = SHARDS as u64 - 1;

const _: () = assert!(
  SHARDS.is_power_of_two(),
  "invalid shards: `SHARDS` must be a power of two",
);

const _: () = assert!(
  SHARD_MASK.count_ones() == SHARDS.trailing_zeros() && SHARD_MASK.trailing_ones() == 4,
  "invalid shards: `SHARD_MASK` must select exactly the low 4 bits",
);

const _: () = assert!(
  SHARDS <= u8::MAX as usize,
  "invalid shards: `SHARDS` must fit a `u8` index",
);

// -----------------------------------------------------------------------------
// Shard Index
// -----------------------------------------------------------------------------

/// Identifies one of the [`SHARDS`] partitions of a table.
///
/// A `ShardIndex` is always in `0..SHARDS`; values outside that range cannot
/// be represented.
///
/// # Examples
///
/// ```
/// use shard_table::{ShardIndex, SHARDS};
///
/// let index: ShardIndex = ShardIndex::from_hash(0xDEAD_BEEF);
/// assert_eq!(index.get(), 0xF);
///
/// assert!(ShardIndex::new(SHARDS).is_err());
/// assert_eq!(ShardIndex::all().count(), SHARDS);
/// ```
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ShardIndex {
  index: u8,
}

impl ShardIndex {
  /// The first shard.
  pub const MIN: Self = Self { index: 0 };

  /// The last shard.
  pub const MAX: Self = Self {
    index: (SHARDS - 1) as u8,
  };

  /// Selects the shard for a 64-bit hash.
  ///
  /// Uses the low four bits, so every hash maps to exactly one shard and
  /// every shard is reachable.
  #[inline]
  pub const fn from_hash(hash: u64) -> Self {
    Self {
      index: (hash & SHARD_MASK) as u8,
    }
  }

  /// Creates a shard index from a raw position.
  ///
  /// # Errors
  ///
  /// Returns [`Error::InvalidShardIndex`] if `index >= SHARDS`.
  #[inline]
  pub const fn new(index: usize) -> Result<Self, Error> {
    if index < SHARDS {
      Ok(Self { index: index as u8 })
    } else {
      Err(Error::InvalidShardIndex(index))
    }
  }

  /// Returns the raw position of the shard.
  #[inline]
  pub const fn get(self) -> usize {
    self.index as usize
  }

  /// Returns every shard index in ascending order.
  ///
  /// Ascending order is the global acquisition order used whenever more than
  /// one shard is locked.
  #[inline]
  pub fn all() -> Iter {
    Iter { range: 0..SHARDS as u8 }
  }
}

impl TryFrom<usize> for ShardIndex {
  type Error = Error;

  #[inline]
  fn try_from(other: usize) -> Result<Self, Self::Error> {
    Self::new(other)
  }
}

impl From<ShardIndex> for usize {
  #[inline]
  fn from(other: ShardIndex) -> Self {
    other.get()
  }
}

impl Debug for ShardIndex {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    Debug::fmt(&self.index, f)
  }
}

impl Display for ShardIndex {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    Display::fmt(&self.index, f)
  }
}

/// Iterator over shard indices, returned by [`ShardIndex::all`].
#[derive(Clone, Debug)]
pub struct Iter {
  range: core::ops::Range<u8>,
}

impl Iterator for Iter {
  type Item = ShardIndex;

  #[inline]
  fn next(&mut self) -> Option<Self::Item> {
    self.range.next().map(|index| ShardIndex { index })
  }

  #[inline]
  fn size_hint(&self) -> (usize, Option<usize>) {
    self.range.size_hint()
  }
}

impl DoubleEndedIterator for Iter {
  #[inline]
  fn next_back(&mut self) -> Option<Self::Item> {
    self.range.next_back().map(|index| ShardIndex { index })
  }
}

impl ExactSizeIterator for Iter {}

impl FusedIterator for Iter {}

// -----------------------------------------------------------------------------
// Shards
// -----------------------------------------------------------------------------

/// One cache-padded value per shard.
pub(crate) struct Shards<T> {
  slots: [CachePadded<T>; SHARDS],
}

impl<T> Shards<T> {
  /// Creates a new array, initializing each shard with the given function.
  #[inline]
  pub(crate) fn new<F>(mut init: F) -> Self
  where
    F: FnMut(ShardIndex) -> T,
  {
    Self {
      slots: core::array::from_fn(|index| {
        CachePadded::new(init(ShardIndex {
          index: index as u8,
        }))
      }),
    }
  }

  /// Returns a reference to the value of the given shard.
  #[inline]
  pub(crate) fn get(&self, index: ShardIndex) -> &T {
    // SAFETY: `ShardIndex` values are always less than `SHARDS`.
    unsafe { self.slots.get_unchecked(index.get()) }
  }

  /// Returns the values of all shards in ascending shard order.
  #[inline]
  pub(crate) fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
    self.slots.iter().map(|slot| &**slot)
  }
}

impl<T> Default for Shards<T>
where
  T: Default,
{
  #[inline]
  fn default() -> Self {
    Self::new(|_| T::default())
  }
}
