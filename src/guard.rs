//! Guards handed out by [`ShardTable`].
//!
//! Every guard borrows the lock it was created under; the referenced entries
//! stay valid exactly as long as the guard is alive.
//!
//! [`ShardTable`]: crate::public::ShardTable

use core::borrow::Borrow;
use core::fmt::Debug;
use core::fmt::Formatter;
use core::fmt::Result as FmtResult;
use core::hash::Hash;
use core::ops::Deref;
use core::ops::DerefMut;
use std::collections::HashMap;

use tracing::debug;

use crate::group::LockAll;
use crate::params::Params;
use crate::shard::SHARDS;
use crate::shard::ShardIndex;
use crate::spin::SpinGuard;
use crate::spin::SpinSharedGuard;
use crate::sync::atomic::AtomicUsize;
use crate::sync::atomic::Ordering::Relaxed;
use crate::table::Table;

// -----------------------------------------------------------------------------
// Entry Guards
// -----------------------------------------------------------------------------

/// Shared access to one entry, holding its shard's shared lock.
///
/// Returned by [`ShardTable::read`]. Other readers of the same shard proceed
/// concurrently; writers to the shard wait until the guard is dropped.
///
/// [`ShardTable::read`]: crate::public::ShardTable::read
#[must_use = "if unused the shard will immediately unlock"]
pub struct Ref<'table, V> {
  value: &'table V,
  _guard: SpinSharedGuard<'table>,
}

impl<'table, V> Ref<'table, V> {
  #[inline]
  pub(crate) fn new(guard: SpinSharedGuard<'table>, value: &'table V) -> Self {
    Self {
      value,
      _guard: guard,
    }
  }
}

impl<V> Deref for Ref<'_, V> {
  type Target = V;

  #[inline]
  fn deref(&self) -> &V {
    self.value
  }
}

impl<V> Debug for Ref<'_, V>
where
  V: Debug,
{
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    Debug::fmt(self.value, f)
  }
}

/// Exclusive access to one entry, holding its shard's exclusive lock.
///
/// Returned by [`ShardTable::write`].
///
/// [`ShardTable::write`]: crate::public::ShardTable::write
#[must_use = "if unused the shard will immediately unlock"]
pub struct RefMut<'table, V> {
  value: &'table mut V,
  _guard: SpinGuard<'table>,
}

impl<'table, V> RefMut<'table, V> {
  #[inline]
  pub(crate) fn new(guard: SpinGuard<'table>, value: &'table mut V) -> Self {
    Self {
      value,
      _guard: guard,
    }
  }
}

impl<V> Deref for RefMut<'_, V> {
  type Target = V;

  #[inline]
  fn deref(&self) -> &V {
    self.value
  }
}

impl<V> DerefMut for RefMut<'_, V> {
  #[inline]
  fn deref_mut(&mut self) -> &mut V {
    self.value
  }
}

impl<V> Debug for RefMut<'_, V>
where
  V: Debug,
{
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    Debug::fmt(&*self.value, f)
  }
}

// -----------------------------------------------------------------------------
// Table Guard
// -----------------------------------------------------------------------------

/// Exclusive access to every shard of a table.
///
/// Returned by [`ShardTable::lock_all`]. While the guard is alive no other
/// thread can read or write any entry, so everything observed through it is
/// a single consistent view of the table. Iteration visits shards in
/// ascending order.
///
/// [`ShardTable::lock_all`]: crate::public::ShardTable::lock_all
#[must_use = "if unused the table will immediately unlock"]
pub struct TableGuard<'table, K, V, P>
where
  P: Params + ?Sized,
{
  table: &'table Table<K, V, P>,
  guard: LockAll<'table>,
}

impl<'table, K, V, P> TableGuard<'table, K, V, P>
where
  K: Eq + Hash,
  P: Params + ?Sized,
{
  #[inline]
  pub(crate) fn new(table: &'table Table<K, V, P>, guard: LockAll<'table>) -> Self {
    debug_assert!(guard.owns_lock(), "TableGuard requires an owning LockAll");

    Self { table, guard }
  }

  /// Returns the exact number of entries.
  pub fn len(&self) -> usize {
    self.maps().map(HashMap::len).sum()
  }

  /// Returns `true` if the table contains no entries.
  pub fn is_empty(&self) -> bool {
    self.maps().all(HashMap::is_empty)
  }

  /// Returns the number of entries stored in one shard.
  pub fn shard_len(&self, index: ShardIndex) -> usize {
    // SAFETY: Every shard is held exclusively by this guard.
    unsafe { self.table.with_map(index, HashMap::len) }
  }

  /// Returns `true` if an entry exists for `key`.
  pub fn contains_key<Q>(&self, key: &Q) -> bool
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self.get(key).is_some()
  }

  /// Returns a reference to the value stored for `key`.
  pub fn get<Q>(&self, key: &Q) -> Option<&V>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    let index: ShardIndex = self.table.shard_of(key);

    // SAFETY: Every shard is held exclusively by this guard.
    unsafe { self.table.map(index) }.get(key)
  }

  /// Returns a mutable reference to the value stored for `key`.
  pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    let index: ShardIndex = self.table.shard_of(key);

    // SAFETY: Every shard is held exclusively by this guard, and `&mut self`
    // rules out any other reference derived from it.
    unsafe { self.table.map_mut(index) }.get_mut(key)
  }

  /// Inserts or overwrites the value for `key`, returning the previous one.
  pub fn insert(&mut self, key: K, value: V) -> Option<V> {
    let index: ShardIndex = self.table.shard_of(&key);

    // SAFETY: Every shard is held exclusively by this guard, and `&mut self`
    // rules out any other reference derived from it.
    let prev: Option<V> = unsafe { self.table.with_map_mut(index, |map| map.insert(key, value)) };

    if prev.is_none() {
      self.table.entries().fetch_add(1, Relaxed);
    }

    prev
  }

  /// Removes the entry for `key`, returning its value.
  pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    let index: ShardIndex = self.table.shard_of(key);

    // SAFETY: Every shard is held exclusively by this guard, and `&mut self`
    // rules out any other reference derived from it.
    let prev: Option<V> = unsafe { self.table.with_map_mut(index, |map| map.remove(key)) };

    if prev.is_some() {
      self.table.entries().fetch_sub(1, Relaxed);
    }

    prev
  }

  /// Returns an iterator over all entries.
  pub fn iter<'guard>(&'guard self) -> impl Iterator<Item = (&'guard K, &'guard V)> {
    self.maps().flat_map(HashMap::iter)
  }

  /// Returns an iterator over all entries with mutable values.
  pub fn iter_mut<'guard>(
    &'guard mut self,
  ) -> impl Iterator<Item = (&'guard K, &'guard mut V)> {
    let table: &'guard Table<K, V, P> = self.table;

    ShardIndex::all().flat_map(move |index| {
      // SAFETY: Every shard is held exclusively by this guard, `&mut self`
      // rules out other references, and each shard is visited once.
      unsafe { table.map_mut(index) }.iter_mut()
    })
  }

  /// Returns an iterator over all keys.
  pub fn keys<'guard>(&'guard self) -> impl Iterator<Item = &'guard K> {
    self.iter().map(|(key, _)| key)
  }

  /// Returns an iterator over all values.
  pub fn values<'guard>(&'guard self) -> impl Iterator<Item = &'guard V> {
    self.iter().map(|(_, value)| value)
  }

  /// Keeps only the entries for which `f` returns `true`.
  ///
  /// Returns the number of removed entries.
  pub fn retain<F>(&mut self, mut f: F) -> usize
  where
    F: FnMut(&K, &mut V) -> bool,
  {
    // Keeps the counter in step with the maps even if `f` panics.
    let mut removed: Removed<'_> = Removed::new(self.table.entries());

    for index in ShardIndex::all() {
      // SAFETY: Every shard is held exclusively by this guard, and `&mut self`
      // rules out any other reference derived from it.
      unsafe {
        self.table.with_map_mut(index, |map| {
          map.retain(|key, value| {
            let keep: bool = f(key, value);

            if !keep {
              removed.count += 1;
            }

            keep
          });
        });
      }
    }

    let count: usize = removed.count;

    drop(removed);

    debug!(removed = count, "retained table entries");

    count
  }

  /// Removes every entry.
  pub fn clear(&mut self) {
    let removed: usize = self.drain().len();

    debug!(removed, "cleared table");
  }

  /// Removes every entry, returning them in ascending shard order.
  pub fn drain(&mut self) -> Vec<(K, V)> {
    let mut entries: Vec<(K, V)> = Vec::with_capacity(self.len());

    for index in ShardIndex::all() {
      // SAFETY: Every shard is held exclusively by this guard, and `&mut self`
      // rules out any other reference derived from it.
      unsafe {
        self.table.with_map_mut(index, |map| entries.extend(map.drain()));
      }
    }

    self.table.entries().fetch_sub(entries.len(), Relaxed);

    entries
  }

  /// Reserves capacity for at least `additional` more entries.
  ///
  /// The reservation is spread evenly across shards.
  pub fn reserve(&mut self, additional: usize) {
    let per_shard: usize = additional.div_ceil(SHARDS);

    for index in ShardIndex::all() {
      // SAFETY: Every shard is held exclusively by this guard, and `&mut self`
      // rules out any other reference derived from it.
      unsafe { self.table.with_map_mut(index, |map| map.reserve(per_shard)) }
    }

    debug!(additional, per_shard, "reserved table capacity");
  }

  /// Releases every shard.
  ///
  /// Equivalent to dropping the guard.
  #[inline]
  pub fn unlock(self) {
    drop(self.guard);
  }

  fn maps(&self) -> impl Iterator<Item = &HashMap<K, V>> {
    let table: &Table<K, V, P> = self.table;

    // SAFETY: Every shard is held exclusively by this guard; only shared
    // references are created here.
    ShardIndex::all().map(move |index| unsafe { table.map(index) })
  }
}

impl<K, V, P> Extend<(K, V)> for TableGuard<'_, K, V, P>
where
  K: Eq + Hash,
  P: Params + ?Sized,
{
  fn extend<I>(&mut self, iter: I)
  where
    I: IntoIterator<Item = (K, V)>,
  {
    for (key, value) in iter {
      self.insert(key, value);
    }
  }
}

impl<K, V, P> Debug for TableGuard<'_, K, V, P>
where
  K: Eq + Hash + Debug,
  V: Debug,
  P: Params + ?Sized,
{
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_map().entries(self.iter()).finish()
  }
}

/// Subtracts removed entries from the table counter when dropped.
struct Removed<'table> {
  entries: &'table AtomicUsize,
  count: usize,
}

impl<'table> Removed<'table> {
  #[inline]
  fn new(entries: &'table AtomicUsize) -> Self {
    Self { entries, count: 0 }
  }
}

impl Drop for Removed<'_> {
  #[inline]
  fn drop(&mut self) {
    self.entries.fetch_sub(self.count, Relaxed);
  }
}
