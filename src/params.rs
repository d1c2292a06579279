use core::any;
use core::fmt::Debug;
use core::fmt::Formatter;
use core::fmt::Result as FmtResult;
use core::hash::BuildHasher;
use core::hash::BuildHasherDefault;
use core::hash::Hasher;
use core::marker::PhantomData;
use std::hash::RandomState;

use crate::padded::CachePadded;
use crate::shard::SHARDS;

// -----------------------------------------------------------------------------
// Cache-line Properties
// -----------------------------------------------------------------------------

/// The size of a cache line in bytes.
///
/// Every shard lock is padded to this size to avoid false sharing between
/// shards.
pub const CACHE_LINE: usize = size_of::<CachePadded<u8>>();

const _: () = assert!(
  CACHE_LINE.is_power_of_two(),
  "invalid params: `CACHE_LINE` must be a power of two",
);

// -----------------------------------------------------------------------------
// Configurable Params
// -----------------------------------------------------------------------------

/// Configuration parameters for a [`ShardTable`].
///
/// Selects the hasher that routes keys to shards and the capacity reserved
/// at construction. The simplest approach is [`ConstParams`]:
///
/// ```no_run
/// use shard_table::{ConstParams, ShardTable};
///
/// type AssetTable<K, V> = ShardTable<K, V, ConstParams<4096>>;
/// ```
///
/// # Implementing `Params`
///
/// ```no_run
/// use shard_table::{Params, ShardTable};
/// use std::hash::{BuildHasherDefault, DefaultHasher};
///
/// struct Deterministic;
///
/// impl Params for Deterministic {
///   type Hasher = BuildHasherDefault<DefaultHasher>;
///
///   const CAPACITY: usize = 1 << 10;
/// }
///
/// let table: ShardTable<String, u32, Deterministic> = ShardTable::new();
/// ```
///
/// The routing hasher is built once per table, so a key keeps its shard for
/// the lifetime of the table.
///
/// [`ShardTable`]: crate::public::ShardTable
pub trait Params {
  /// Builds the hasher whose output selects a key's shard.
  type Hasher: BuildHasher + Default;

  /// The number of entries to reserve space for at construction.
  ///
  /// Spread evenly across shards; see [`ParamsExt::SHARD_CAPACITY`].
  const CAPACITY: usize = 0;
}

// -----------------------------------------------------------------------------
// Configurable Params - Extensions
// -----------------------------------------------------------------------------

/// Derived parameters computed from [`Params`].
///
/// Automatically implemented for all [`Params`] types.
///
/// # Example
///
/// ```no_run
/// use shard_table::{ConstParams, ParamsExt};
///
/// println!("{:#?}", <ConstParams<1024> as ParamsExt>::debug());
/// ```
pub trait ParamsExt: Params + Sealed {
  /// The number of entries reserved in each shard at construction.
  const SHARD_CAPACITY: usize = Self::CAPACITY.div_ceil(SHARDS);

  #[inline]
  fn debug() -> DebugParams<Self> {
    DebugParams {
      marker: PhantomData,
    }
  }
}

// -----------------------------------------------------------------------------
// Debug Params
// -----------------------------------------------------------------------------

/// A helper type for displaying [`Params`] configuration.
///
/// Returned by [`ParamsExt::debug`].
#[derive(Clone, Copy)]
pub struct DebugParams<P>
where
  P: ?Sized,
{
  marker: PhantomData<fn(P)>,
}

impl<P> Debug for DebugParams<P>
where
  P: Params + ?Sized,
{
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct(any::type_name::<P>())
      .field("Hasher", &any::type_name::<P::Hasher>())
      .field("CAPACITY", &P::CAPACITY)
      .field("SHARD_CAPACITY", &P::SHARD_CAPACITY)
      .field("SHARDS", &SHARDS)
      .field("CACHE_LINE", &CACHE_LINE)
      .finish()
  }
}

// -----------------------------------------------------------------------------
// Default Params
// -----------------------------------------------------------------------------

/// The default table configuration: randomly seeded routing, no reserved
/// capacity.
///
/// Used when creating a [`ShardTable`] without specifying a custom
/// [`Params`] type.
///
/// ```no_run
/// use shard_table::{DefaultParams, ShardTable};
///
/// // These are equivalent:
/// let table1: ShardTable<u64, u64> = ShardTable::new();
/// let table2: ShardTable<u64, u64, DefaultParams> = ShardTable::new();
/// ```
///
/// [`ShardTable`]: crate::public::ShardTable
#[derive(Clone, Copy)]
#[non_exhaustive]
pub struct DefaultParams;

impl Debug for DefaultParams {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    Debug::fmt(&<Self as ParamsExt>::debug(), f)
  }
}

impl Params for DefaultParams {
  type Hasher = RandomState;
}

// -----------------------------------------------------------------------------
// Const-Generic Params
// -----------------------------------------------------------------------------

/// A [`Params`] implementation with compile-time capacity and hasher.
///
/// ```no_run
/// use shard_table::{ConstParams, ShardTable};
///
/// let table: ShardTable<String, u32, ConstParams<4096>> = ShardTable::new();
/// ```
#[non_exhaustive]
pub struct ConstParams<const N: usize, H = RandomState> {
  marker: PhantomData<fn() -> H>,
}

impl<const N: usize, H> Params for ConstParams<N, H>
where
  H: BuildHasher + Default,
{
  type Hasher = H;

  const CAPACITY: usize = N;
}

impl<const N: usize, H> Debug for ConstParams<N, H>
where
  H: BuildHasher + Default,
{
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    Debug::fmt(&<Self as ParamsExt>::debug(), f)
  }
}

/// Routes `u64` content hashes by their own low bits.
///
/// Useful when keys are already well-distributed hashes, e.g. asset content
/// hashes: the shard of a key is then `key & SHARD_MASK`.
///
/// ```
/// use shard_table::{IdentityParams, ShardIndex, ShardTable};
///
/// let table: ShardTable<u64, &str, IdentityParams> = ShardTable::new();
///
/// assert_eq!(table.shard_of(&0x42), ShardIndex::from_hash(0x2));
/// ```
pub type IdentityParams = ConstParams<0, BuildHasherDefault<IdentityHasher>>;

// -----------------------------------------------------------------------------
// Identity Hasher
// -----------------------------------------------------------------------------

/// A [`Hasher`] that passes integer keys through unchanged.
///
/// A single integer write produces that integer as the hash. Byte writes and
/// multiple writes are folded, so composite keys still hash.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityHasher {
  state: u64,
}

impl Hasher for IdentityHasher {
  #[inline]
  fn finish(&self) -> u64 {
    self.state
  }

  #[inline]
  fn write(&mut self, bytes: &[u8]) {
    for byte in bytes {
      self.state = self.state.rotate_left(8) ^ u64::from(*byte);
    }
  }

  #[inline]
  fn write_u8(&mut self, value: u8) {
    self.write_u64(u64::from(value));
  }

  #[inline]
  fn write_u16(&mut self, value: u16) {
    self.write_u64(u64::from(value));
  }

  #[inline]
  fn write_u32(&mut self, value: u32) {
    self.write_u64(u64::from(value));
  }

  #[inline]
  fn write_u64(&mut self, value: u64) {
    self.state = self.state.rotate_left(32) ^ value;
  }

  #[inline]
  fn write_usize(&mut self, value: usize) {
    self.write_u64(value as u64);
  }
}

// -----------------------------------------------------------------------------
// Auto-implement Derive
// -----------------------------------------------------------------------------

mod private {
  pub trait Sealed {}
}

use private::Sealed;

impl<P> Sealed for P where P: Params + ?Sized {}
impl<P> ParamsExt for P where P: Params + ?Sized {}
