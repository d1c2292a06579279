//! Core table implementation.
//!
//! Entries live in one [`HashMap`] per shard. Each map is only touched while
//! the matching shard lock of the table's [`ShardLockGroup`] is held: shared
//! for lookups, exclusive for mutation. Table-wide operations go through
//! [`TableGuard`], which holds every shard at once.

use core::borrow::Borrow;
use core::fmt::Debug;
use core::fmt::Formatter;
use core::fmt::Result as FmtResult;
use core::hash::BuildHasher;
use core::hash::Hash;
use core::marker::PhantomData;
use core::ptr;
use std::collections::HashMap;

use tracing::debug;

use crate::cell::UnsafeCell;
use crate::error::Error;
use crate::error::Result;
use crate::group::LockAll;
use crate::group::ShardLockGroup;
use crate::guard::Ref;
use crate::guard::RefMut;
use crate::guard::TableGuard;
use crate::padded::CachePadded;
use crate::params::Params;
use crate::params::ParamsExt;
use crate::shard::ShardIndex;
use crate::shard::Shards;
use crate::spin::SpinGuard;
use crate::spin::SpinSharedGuard;
use crate::sync::atomic::AtomicUsize;
use crate::sync::atomic::Ordering::Relaxed;

// -----------------------------------------------------------------------------
// Table State
// -----------------------------------------------------------------------------

pub(crate) struct Table<K, V, P>
where
  P: Params + ?Sized,
{
  locks: ShardLockGroup,
  shards: Shards<UnsafeCell<HashMap<K, V>>>,
  /// Routes keys to shards. The per-shard maps hash independently, since
  /// every key in a shard shares the low bits of this hash.
  hasher: P::Hasher,
  /// Approximate number of entries, maintained under the shard locks.
  entries: CachePadded<AtomicUsize>,
  phantom: PhantomData<fn(P)>,
}

impl<K, V, P> Table<K, V, P>
where
  P: Params + ?Sized,
{
  #[inline]
  pub(crate) fn new() -> Self {
    Self::with_hasher(P::Hasher::default())
  }

  pub(crate) fn with_hasher(hasher: P::Hasher) -> Self {
    Self {
      locks: ShardLockGroup::new(),
      shards: Shards::new(|_| UnsafeCell::new(HashMap::with_capacity(P::SHARD_CAPACITY))),
      hasher,
      entries: CachePadded::new(AtomicUsize::new(0)),
      phantom: PhantomData,
    }
  }

  #[inline]
  pub(crate) fn len(&self) -> usize {
    self.entries.load(Relaxed)
  }

  #[inline]
  pub(crate) fn is_empty(&self) -> bool {
    self.len() == 0
  }

  #[inline]
  pub(crate) fn hasher(&self) -> &P::Hasher {
    &self.hasher
  }

  #[inline]
  pub(crate) fn entries(&self) -> &AtomicUsize {
    &self.entries
  }

  #[inline]
  pub(crate) fn shard_of<Q>(&self, key: &Q) -> ShardIndex
  where
    Q: Hash + ?Sized,
  {
    ShardIndex::from_hash(self.hasher.hash_one(key))
  }

  pub(crate) fn shard_len(&self, index: ShardIndex) -> usize {
    let _guard: SpinSharedGuard<'_> = self.locks.read(index);

    // SAFETY: The shard is held shared.
    unsafe { self.with_map(index, HashMap::len) }
  }

  #[inline]
  pub(crate) fn lock_all(&self) -> TableGuard<'_, K, V, P>
  where
    K: Eq + Hash,
  {
    TableGuard::new(self, self.locks.lock_all())
  }

  #[inline]
  pub(crate) fn try_lock_all(&self) -> Option<TableGuard<'_, K, V, P>>
  where
    K: Eq + Hash,
  {
    let guard: LockAll<'_> = self.locks.try_lock_all()?;

    Some(TableGuard::new(self, guard))
  }

  /// Calls `f` with the map of one shard.
  ///
  /// # Safety
  ///
  /// The caller must hold the shard in either mode while `f` runs.
  #[inline]
  pub(crate) unsafe fn with_map<F, R>(&self, index: ShardIndex, f: F) -> R
  where
    F: FnOnce(&HashMap<K, V>) -> R,
  {
    // SAFETY: Caller guarantees the shard lock is held, so no exclusive
    // reference to the map exists.
    self.shards.get(index).with(|ptr| f(unsafe { &*ptr }))
  }

  /// Calls `f` with the map of one shard mutably.
  ///
  /// # Safety
  ///
  /// The caller must hold the shard exclusively while `f` runs.
  #[inline]
  pub(crate) unsafe fn with_map_mut<F, R>(&self, index: ShardIndex, f: F) -> R
  where
    F: FnOnce(&mut HashMap<K, V>) -> R,
  {
    // SAFETY: Caller guarantees exclusive access to the map.
    self.shards.get(index).with_mut(|ptr| f(unsafe { &mut *ptr }))
  }

  /// Returns the map of one shard.
  ///
  /// Unlike [`with_map`], the access is not confined to a closure, so a model
  /// checker only observes it at the moment the reference is created.
  ///
  /// # Safety
  ///
  /// The caller must hold the shard in either mode for the lifetime of the
  /// returned reference.
  ///
  /// [`with_map`]: Self::with_map
  #[inline]
  pub(crate) unsafe fn map(&self, index: ShardIndex) -> &HashMap<K, V> {
    // SAFETY: Caller guarantees the shard lock is held, so no exclusive
    // reference to the map exists.
    self.shards.get(index).with(|ptr| unsafe { &*ptr })
  }

  /// Returns the map of one shard mutably.
  ///
  /// # Safety
  ///
  /// The caller must hold the shard exclusively for the lifetime of the
  /// returned reference, and no other reference to the map may exist.
  #[allow(clippy::mut_from_ref, reason = "exclusivity comes from the shard lock")]
  #[inline]
  pub(crate) unsafe fn map_mut(&self, index: ShardIndex) -> &mut HashMap<K, V> {
    // SAFETY: Caller guarantees exclusive access to the map.
    self.shards.get(index).with_mut(|ptr| unsafe { &mut *ptr })
  }
}

impl<K, V, P> Table<K, V, P>
where
  K: Eq + Hash,
  P: Params + ?Sized,
{
  pub(crate) fn contains<Q>(&self, key: &Q) -> bool
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self.with(key, |_| ()).is_ok()
  }

  #[inline]
  pub(crate) fn get<Q>(&self, key: &Q) -> Result<V>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
    V: Clone,
  {
    self.with(key, V::clone)
  }

  pub(crate) fn with<Q, F, R>(&self, key: &Q, f: F) -> Result<R>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
    F: FnOnce(&V) -> R,
  {
    let index: ShardIndex = self.shard_of(key);
    let _guard: SpinSharedGuard<'_> = self.locks.read(index);

    // SAFETY: The shard is held shared until `_guard` drops.
    unsafe { self.with_map(index, |map| map.get(key).map(f).ok_or(Error::NotFound)) }
  }

  pub(crate) fn with_mut<Q, F, R>(&self, key: &Q, f: F) -> Result<R>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
    F: FnOnce(&mut V) -> R,
  {
    let index: ShardIndex = self.shard_of(key);
    let _guard: SpinGuard<'_> = self.locks.write(index);

    // SAFETY: The shard is held exclusively until `_guard` drops.
    unsafe { self.with_map_mut(index, |map| map.get_mut(key).map(f).ok_or(Error::NotFound)) }
  }

  pub(crate) fn read<Q>(&self, key: &Q) -> Result<Ref<'_, V>>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    let index: ShardIndex = self.shard_of(key);
    let guard: SpinSharedGuard<'_> = self.locks.read(index);

    // SAFETY: The shard is held shared for as long as the returned `Ref`,
    // which owns `guard`.
    let map: &HashMap<K, V> = unsafe { self.map(index) };
    let value: &V = map.get(key).ok_or(Error::NotFound)?;

    Ok(Ref::new(guard, value))
  }

  pub(crate) fn write<Q>(&self, key: &Q) -> Result<RefMut<'_, V>>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    let index: ShardIndex = self.shard_of(key);
    let guard: SpinGuard<'_> = self.locks.write(index);

    // SAFETY: The shard is held exclusively for as long as the returned
    // `RefMut`, which owns `guard`.
    let map: &mut HashMap<K, V> = unsafe { self.map_mut(index) };
    let value: &mut V = map.get_mut(key).ok_or(Error::NotFound)?;

    Ok(RefMut::new(guard, value))
  }

  pub(crate) fn put(&self, key: K, value: V) -> Option<V> {
    let index: ShardIndex = self.shard_of(&key);
    let _guard: SpinGuard<'_> = self.locks.write(index);

    // SAFETY: The shard is held exclusively until `_guard` drops.
    let prev: Option<V> = unsafe { self.with_map_mut(index, |map| map.insert(key, value)) };

    if prev.is_none() {
      self.entries.fetch_add(1, Relaxed);
    }

    prev
  }

  pub(crate) fn try_insert(&self, key: K, value: V) -> Result<()> {
    let index: ShardIndex = self.shard_of(&key);
    let _guard: SpinGuard<'_> = self.locks.write(index);

    // SAFETY: The shard is held exclusively until `_guard` drops.
    let inserted: Result<()> = unsafe {
      self.with_map_mut(index, |map| {
        if map.contains_key(&key) {
          return Err(Error::Occupied);
        }

        map.insert(key, value);

        Ok(())
      })
    };

    if inserted.is_ok() {
      self.entries.fetch_add(1, Relaxed);
    }

    inserted
  }

  pub(crate) fn get_or_insert_with<F>(&self, key: K, init: F) -> V
  where
    V: Clone,
    F: FnOnce() -> V,
  {
    let index: ShardIndex = self.shard_of(&key);
    let _guard: SpinGuard<'_> = self.locks.write(index);

    // SAFETY: The shard is held exclusively until `_guard` drops.
    let (value, inserted): (V, bool) = unsafe {
      self.with_map_mut(index, |map| {
        let count: usize = map.len();
        let value: V = map.entry(key).or_insert_with(init).clone();

        (value, map.len() != count)
      })
    };

    if inserted {
      self.entries.fetch_add(1, Relaxed);
    }

    value
  }

  pub(crate) fn remove<Q>(&self, key: &Q) -> Option<V>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    let index: ShardIndex = self.shard_of(key);
    let _guard: SpinGuard<'_> = self.locks.write(index);

    // SAFETY: The shard is held exclusively until `_guard` drops.
    let prev: Option<V> = unsafe { self.with_map_mut(index, |map| map.remove(key)) };

    if prev.is_some() {
      self.entries.fetch_sub(1, Relaxed);
    }

    prev
  }

  #[inline]
  pub(crate) fn erase<Q>(&self, key: &Q) -> bool
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self.remove(key).is_some()
  }

  pub(crate) fn for_each<F>(&self, mut f: F)
  where
    F: FnMut(&K, &V),
  {
    let guard: TableGuard<'_, K, V, P> = self.lock_all();

    for (key, value) in guard.iter() {
      f(key, value);
    }
  }

  pub(crate) fn snapshot(&self) -> Vec<(K, V)>
  where
    K: Clone,
    V: Clone,
  {
    let guard: TableGuard<'_, K, V, P> = self.lock_all();
    let entries: Vec<(K, V)> = guard
      .iter()
      .map(|(key, value)| (key.clone(), value.clone()))
      .collect();

    entries
  }

  pub(crate) fn keys(&self) -> Vec<K>
  where
    K: Clone,
  {
    let guard: TableGuard<'_, K, V, P> = self.lock_all();
    let keys: Vec<K> = guard.keys().cloned().collect();

    keys
  }

  #[inline]
  pub(crate) fn retain<F>(&self, f: F) -> usize
  where
    F: FnMut(&K, &mut V) -> bool,
  {
    self.lock_all().retain(f)
  }

  #[inline]
  pub(crate) fn clear(&self) {
    self.lock_all().clear();
  }

  #[inline]
  pub(crate) fn reserve(&self, additional: usize) {
    self.lock_all().reserve(additional);
  }

  pub(crate) fn swap(&self, other: &Self) {
    if ptr::eq(self, other) {
      return;
    }

    let (mut this, mut that) = self.lock_pair(other);
    let ours: Vec<(K, V)> = this.drain();
    let theirs: Vec<(K, V)> = that.drain();

    debug!(ours = ours.len(), theirs = theirs.len(), "swapping tables");

    // The tables may route keys differently, so every entry is re-inserted.
    this.extend(theirs);
    that.extend(ours);
  }

  pub(crate) fn take_from(&self, other: &Self) -> usize {
    if ptr::eq(self, other) {
      return 0;
    }

    let (mut this, mut that) = self.lock_pair(other);
    let discarded: Vec<(K, V)> = this.drain();
    let moved: Vec<(K, V)> = that.drain();

    debug!(discarded = discarded.len(), moved = moved.len(), "taking table entries");

    this.extend(moved);

    // Discarded values drop after both tables are released.
    drop((this, that));

    discarded.len()
  }

  fn lock_pair<'table>(
    &'table self,
    other: &'table Self,
  ) -> (TableGuard<'table, K, V, P>, TableGuard<'table, K, V, P>) {
    let (this, that): (LockAll<'table>, LockAll<'table>) = self.locks.lock_pair(&other.locks);

    (TableGuard::new(self, this), TableGuard::new(other, that))
  }
}

impl<K, V, P> Debug for Table<K, V, P>
where
  K: Eq + Hash + Debug,
  V: Debug,
  P: Params + ?Sized,
{
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    match self.try_lock_all() {
      Some(guard) => Debug::fmt(&guard, f),
      None => f.write_str("<locked>"),
    }
  }
}
