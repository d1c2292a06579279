//! Error types.

use thiserror::Error;

/// Alias for results returned by table operations.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors reported by [`ShardTable`] and [`ShardIndex`].
///
/// Lock acquisition never fails; every variant describes the state of an
/// entry or a rejected argument.
///
/// [`ShardIndex`]: crate::ShardIndex
/// [`ShardTable`]: crate::ShardTable
#[derive(Clone, Copy, Debug, Error, Hash, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
  /// No entry exists for the requested key.
  #[error("entry not found")]
  NotFound,
  /// An entry already exists for the key being inserted.
  #[error("entry already exists")]
  Occupied,
  /// A raw shard position was outside <code>0..[SHARDS]</code>.
  ///
  /// [SHARDS]: crate::SHARDS
  #[error("invalid shard index {0}")]
  InvalidShardIndex(usize),
}
