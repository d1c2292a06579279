//! A sharded concurrent table guarded by writer-preferring spin locks.
//!
//! `shard_table` provides [`ShardTable`], a key-value registry that many
//! threads can read and write at once. Entries are partitioned across
//! [`SHARDS`] shards by the low bits of their hash, and every shard has its
//! own shared/exclusive [`RawSpinLock`]. Threads touching different shards
//! never contend; threads touching the same shard are serialized by its lock.
//!
//! # Usage
//!
//! ```
//! use shard_table::{Error, ShardTable};
//!
//! let table: ShardTable<String, u32> = ShardTable::new();
//!
//! // Insert or overwrite an entry
//! table.put("albedo.png".to_owned(), 7);
//!
//! // Look it up
//! assert_eq!(table.get("albedo.png"), Ok(7));
//!
//! // Remove it; erasing a missing key is not an error
//! assert!(table.erase("albedo.png"));
//! assert!(!table.erase("albedo.png"));
//!
//! // The entry is gone
//! assert_eq!(table.get("albedo.png"), Err(Error::NotFound));
//! ```
//!
//! # Whole-table Access
//!
//! [`ShardTable::lock_all`] acquires every shard and returns a
//! [`TableGuard`]. While it is alive, the table cannot change, so iteration
//! through the guard sees one consistent state:
//!
//! ```
//! use shard_table::ShardTable;
//!
//! let table: ShardTable<u32, u32> = (0..64).map(|key| (key, key * key)).collect();
//!
//! let guard = table.lock_all();
//! let sum: u32 = guard.values().sum();
//!
//! assert_eq!(guard.len(), 64);
//! assert_eq!(sum, (0..64).map(|key: u32| key * key).sum::<u32>());
//! ```
//!
//! Acquisition is all-or-nothing: a failed attempt releases everything it
//! took before waiting again, so concurrent `lock_all` callers and
//! single-shard callers cannot deadlock. While a `lock_all` is pending, new
//! point operations wait for it, so readers cannot starve it. See the
//! [`implementation`] notes for details.
//!
//! [`ShardTable::swap`] and [`ShardTable::take_from`] lock two tables in one
//! such step.
//!
//! # Configuration
//!
//! The routing hasher and initial capacity are configured at compile time
//! through the [`Params`] trait:
//!
//! ```
//! use shard_table::{ConstParams, DefaultParams, ShardTable};
//!
//! // These are equivalent:
//! let table1: ShardTable<u64, u64> = ShardTable::new();
//! let table2: ShardTable<u64, u64, DefaultParams> = ShardTable::new();
//!
//! // Reserve room for 4096 entries up front:
//! let table3: ShardTable<u64, u64, ConstParams<4096>> = ShardTable::new();
//! ```
//!
//! # Concurrency
//!
//! ```no_run
//! use shard_table::ShardTable;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let table: Arc<ShardTable<u64, u64>> = Arc::new(ShardTable::new());
//!
//! let handles: Vec<_> = (0..4)
//!   .map(|thread_id| {
//!     let table = Arc::clone(&table);
//!     thread::spawn(move || {
//!       for i in 0..100 {
//!         table.put(thread_id * 1000 + i, i);
//!       }
//!     })
//!   })
//!   .collect();
//!
//! for handle in handles {
//!   handle.join().unwrap();
//! }
//!
//! assert_eq!(table.len(), 400);
//! ```
//!
//! The locks spin rather than park, so critical sections should be short.
//! None of the locks are reentrant: taking a shard lock while already
//! holding it on the same thread spins forever. A thread holding an entry
//! guard must not start another operation on the same table either, since a
//! concurrent `lock_all` would then wait on the thread while the thread waits
//! on the `lock_all`.
//!
//! [`Params`]: crate::config::Params

#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

mod error;
mod group;
mod guard;
mod padded;
mod params;
mod public;
mod shard;
mod spin;
mod table;
mod utils;

pub(crate) use crate::utils::cell;
pub(crate) use crate::utils::sync;

pub mod implementation {
  #![doc = include_str!("../IMPLEMENTATION.md")]
}

pub mod config {
  //! Configuration parameters which can be used to override the default table
  //! settings.

  pub use crate::params::CACHE_LINE;
  pub use crate::params::ConstParams;
  pub use crate::params::DebugParams;
  pub use crate::params::DefaultParams;
  pub use crate::params::IdentityHasher;
  pub use crate::params::IdentityParams;
  pub use crate::params::Params;
  pub use crate::params::ParamsExt;
}

pub mod lock {
  //! The lock primitives backing each table.
  //!
  //! These are usable on their own, e.g. to guard state that lives outside a
  //! table but follows the same shard layout.

  pub use crate::group::LockAll;
  pub use crate::group::ShardLockGroup;
  pub use crate::spin::RawSpinLock;
  pub use crate::spin::SpinGuard;
  pub use crate::spin::SpinSharedGuard;
}

#[doc(inline)]
pub use self::config::ConstParams;

#[doc(inline)]
pub use self::config::DefaultParams;

#[doc(inline)]
pub use self::config::IdentityParams;

#[doc(inline)]
pub use self::config::Params;

#[doc(inline)]
pub use self::config::ParamsExt;

#[doc(inline)]
pub use self::lock::LockAll;

#[doc(inline)]
pub use self::lock::RawSpinLock;

#[doc(inline)]
pub use self::lock::ShardLockGroup;

pub use self::error::Error;
pub use self::error::Result;

pub use self::guard::Ref;
pub use self::guard::RefMut;
pub use self::guard::TableGuard;

pub use self::public::ShardTable;

pub use self::shard::Iter as ShardIter;
pub use self::shard::SHARD_MASK;
pub use self::shard::SHARDS;
pub use self::shard::ShardIndex;

#[cfg(test)]
mod tests;
