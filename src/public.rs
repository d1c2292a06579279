use core::borrow::Borrow;
use core::fmt::Debug;
use core::fmt::Formatter;
use core::fmt::Result as FmtResult;
use core::hash::Hash;

use crate::error::Result;
use crate::guard::Ref;
use crate::guard::RefMut;
use crate::guard::TableGuard;
use crate::params::DefaultParams;
use crate::params::Params;
use crate::params::ParamsExt;
use crate::shard::ShardIndex;
use crate::table::Table;

/// A concurrent map partitioned across [`SHARDS`] independently locked shards.
///
/// Each key is routed to one shard by hashing it with `P::Hasher` and taking
/// the low four bits. Operations on a single key lock only that key's shard,
/// so threads working on different shards never contend. Operations that need
/// the whole table at once go through [`lock_all`].
///
/// See the [crate-level documentation][crate] for an overview.
///
/// # Type Parameters
///
/// - `K`: The key type.
/// - `V`: The value type.
/// - `P`: Configuration parameters implementing [`Params`]. Defaults to
///   [`DefaultParams`].
///
/// # Examples
///
/// ```
/// use shard_table::{Error, ShardTable};
///
/// let table: ShardTable<&str, u32> = ShardTable::new();
///
/// table.put("mesh", 1);
/// assert_eq!(table.get("mesh"), Ok(1));
///
/// assert!(table.erase("mesh"));
/// assert_eq!(table.get("mesh"), Err(Error::NotFound));
/// ```
///
/// [`SHARDS`]: crate::SHARDS
/// [`lock_all`]: Self::lock_all
#[repr(transparent)]
pub struct ShardTable<K, V, P = DefaultParams>
where
  P: Params + ?Sized,
{
  inner: Table<K, V, P>,
}

impl<K, V, P> ShardTable<K, V, P>
where
  P: Params + ?Sized,
{
  /// Creates a new, empty table.
  ///
  /// Reserves [`Params::CAPACITY`] entries, spread evenly across shards.
  ///
  /// # Examples
  ///
  /// ```
  /// use shard_table::ShardTable;
  ///
  /// let table: ShardTable<u64, String> = ShardTable::new();
  /// assert!(table.is_empty());
  /// ```
  #[inline]
  pub fn new() -> Self {
    Self {
      inner: Table::new(),
    }
  }

  /// Creates a new, empty table routing keys with the given hasher.
  ///
  /// # Examples
  ///
  /// ```
  /// use shard_table::ShardTable;
  /// use std::hash::RandomState;
  ///
  /// let table: ShardTable<u64, u64> = ShardTable::with_hasher(RandomState::new());
  /// table.put(1, 2);
  /// assert_eq!(table.get(&1), Ok(2));
  /// ```
  #[inline]
  pub fn with_hasher(hasher: P::Hasher) -> Self {
    Self {
      inner: Table::with_hasher(hasher),
    }
  }

  /// Returns the number of entries in the table.
  ///
  /// This value may change immediately after reading due to concurrent
  /// operations in other threads. Use [`TableGuard::len`] for an exact count.
  ///
  /// # Examples
  ///
  /// ```
  /// use shard_table::ShardTable;
  ///
  /// let table: ShardTable<u32, u32> = ShardTable::new();
  /// table.put(1, 10);
  /// table.put(2, 20);
  /// table.put(2, 30);
  /// assert_eq!(table.len(), 2);
  /// ```
  #[inline]
  pub fn len(&self) -> usize {
    self.inner.len()
  }

  /// Returns `true` if the table contains no entries.
  #[inline]
  pub fn is_empty(&self) -> bool {
    self.inner.is_empty()
  }

  /// Returns the hasher used to route keys to shards.
  #[inline]
  pub fn hasher(&self) -> &P::Hasher {
    self.inner.hasher()
  }

  /// Returns the shard that `key` is stored in.
  ///
  /// The result never changes for the lifetime of the table.
  #[inline]
  pub fn shard_of<Q>(&self, key: &Q) -> ShardIndex
  where
    Q: Hash + ?Sized,
  {
    self.inner.shard_of(key)
  }

  /// Returns the number of entries stored in one shard.
  ///
  /// Takes the shard's shared lock.
  ///
  /// # Examples
  ///
  /// ```
  /// use shard_table::{ShardIndex, ShardTable};
  ///
  /// let table: ShardTable<u32, u32> = ShardTable::new();
  /// table.put(7, 7);
  ///
  /// let total: usize = ShardIndex::all().map(|index| table.shard_len(index)).sum();
  /// assert_eq!(total, 1);
  /// assert_eq!(table.shard_len(table.shard_of(&7)), 1);
  /// ```
  #[inline]
  pub fn shard_len(&self, index: ShardIndex) -> usize {
    self.inner.shard_len(index)
  }
}

impl<K, V, P> ShardTable<K, V, P>
where
  K: Eq + Hash,
  P: Params + ?Sized,
{
  /// Returns `true` if an entry exists for `key`.
  ///
  /// # Examples
  ///
  /// ```
  /// use shard_table::ShardTable;
  ///
  /// let table: ShardTable<String, u32> = ShardTable::new();
  /// table.put("shader".to_owned(), 3);
  ///
  /// assert!(table.contains("shader"));
  /// assert!(!table.contains("texture"));
  /// ```
  #[inline]
  pub fn contains<Q>(&self, key: &Q) -> bool
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self.inner.contains(key)
  }

  /// Returns a clone of the value stored for `key`.
  ///
  /// Holds the key's shard in shared mode for the duration of the clone.
  ///
  /// # Errors
  ///
  /// Returns [`Error::NotFound`] if no entry exists for `key`.
  ///
  /// [`Error::NotFound`]: crate::Error::NotFound
  #[inline]
  pub fn get<Q>(&self, key: &Q) -> Result<V>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
    V: Clone,
  {
    self.inner.get(key)
  }

  /// Calls `f` with a reference to the value stored for `key`.
  ///
  /// The key's shard is held in shared mode while `f` runs; `f` must not
  /// write to the same shard.
  ///
  /// # Errors
  ///
  /// Returns [`Error::NotFound`] if no entry exists for `key`.
  ///
  /// # Examples
  ///
  /// ```
  /// use shard_table::ShardTable;
  ///
  /// let table: ShardTable<u32, String> = ShardTable::new();
  /// table.put(1, "hello".to_owned());
  ///
  /// assert_eq!(table.with(&1, |value| value.len()), Ok(5));
  /// ```
  ///
  /// [`Error::NotFound`]: crate::Error::NotFound
  #[inline]
  pub fn with<Q, F, R>(&self, key: &Q, f: F) -> Result<R>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
    F: FnOnce(&V) -> R,
  {
    self.inner.with(key, f)
  }

  /// Calls `f` with a mutable reference to the value stored for `key`.
  ///
  /// The key's shard is held exclusively while `f` runs; `f` must not access
  /// the same shard.
  ///
  /// # Errors
  ///
  /// Returns [`Error::NotFound`] if no entry exists for `key`.
  ///
  /// # Examples
  ///
  /// ```
  /// use shard_table::ShardTable;
  ///
  /// let table: ShardTable<u32, u32> = ShardTable::new();
  /// table.put(1, 10);
  ///
  /// table.with_mut(&1, |value| *value += 1).unwrap();
  /// assert_eq!(table.get(&1), Ok(11));
  /// ```
  ///
  /// [`Error::NotFound`]: crate::Error::NotFound
  #[inline]
  pub fn with_mut<Q, F, R>(&self, key: &Q, f: F) -> Result<R>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
    F: FnOnce(&mut V) -> R,
  {
    self.inner.with_mut(key, f)
  }

  /// Returns a guard with shared access to the value stored for `key`.
  ///
  /// The key's shard stays locked in shared mode until the guard drops.
  /// Writing to the same shard from the holding thread spins forever.
  ///
  /// # Errors
  ///
  /// Returns [`Error::NotFound`] if no entry exists for `key`.
  ///
  /// # Examples
  ///
  /// ```
  /// use shard_table::ShardTable;
  ///
  /// let table: ShardTable<u32, Vec<u8>> = ShardTable::new();
  /// table.put(1, vec![1, 2, 3]);
  ///
  /// let bytes = table.read(&1).unwrap();
  /// assert_eq!(bytes.len(), 3);
  /// ```
  ///
  /// [`Error::NotFound`]: crate::Error::NotFound
  #[inline]
  pub fn read<Q>(&self, key: &Q) -> Result<Ref<'_, V>>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self.inner.read(key)
  }

  /// Returns a guard with exclusive access to the value stored for `key`.
  ///
  /// The key's shard stays locked exclusively until the guard drops.
  ///
  /// # Errors
  ///
  /// Returns [`Error::NotFound`] if no entry exists for `key`.
  ///
  /// # Examples
  ///
  /// ```
  /// use shard_table::ShardTable;
  ///
  /// let table: ShardTable<u32, Vec<u8>> = ShardTable::new();
  /// table.put(1, vec![1, 2, 3]);
  ///
  /// table.write(&1).unwrap().push(4);
  /// assert_eq!(table.get(&1), Ok(vec![1, 2, 3, 4]));
  /// ```
  ///
  /// [`Error::NotFound`]: crate::Error::NotFound
  #[inline]
  pub fn write<Q>(&self, key: &Q) -> Result<RefMut<'_, V>>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self.inner.write(key)
  }

  /// Inserts or overwrites the value for `key`.
  ///
  /// Returns the previous value, if any.
  ///
  /// # Examples
  ///
  /// ```
  /// use shard_table::ShardTable;
  ///
  /// let table: ShardTable<u32, &str> = ShardTable::new();
  ///
  /// assert_eq!(table.put(1, "a"), None);
  /// assert_eq!(table.put(1, "b"), Some("a"));
  /// ```
  #[inline]
  pub fn put(&self, key: K, value: V) -> Option<V> {
    self.inner.put(key, value)
  }

  /// Inserts the value for `key` only if no entry exists yet.
  ///
  /// # Errors
  ///
  /// Returns [`Error::Occupied`], leaving the table unchanged, if an entry
  /// already exists for `key`.
  ///
  /// # Examples
  ///
  /// ```
  /// use shard_table::{Error, ShardTable};
  ///
  /// let table: ShardTable<u32, &str> = ShardTable::new();
  ///
  /// assert_eq!(table.try_insert(1, "a"), Ok(()));
  /// assert_eq!(table.try_insert(1, "b"), Err(Error::Occupied));
  /// assert_eq!(table.get(&1), Ok("a"));
  /// ```
  ///
  /// [`Error::Occupied`]: crate::Error::Occupied
  #[inline]
  pub fn try_insert(&self, key: K, value: V) -> Result<()> {
    self.inner.try_insert(key, value)
  }

  /// Returns a clone of the value for `key`, inserting `init()` first if no
  /// entry exists.
  ///
  /// `init` runs at most once, under the key's exclusive shard lock.
  ///
  /// # Examples
  ///
  /// ```
  /// use shard_table::ShardTable;
  ///
  /// let table: ShardTable<u32, u32> = ShardTable::new();
  ///
  /// assert_eq!(table.get_or_insert_with(1, || 10), 10);
  /// assert_eq!(table.get_or_insert_with(1, || 20), 10);
  /// ```
  #[inline]
  pub fn get_or_insert_with<F>(&self, key: K, init: F) -> V
  where
    V: Clone,
    F: FnOnce() -> V,
  {
    self.inner.get_or_insert_with(key, init)
  }

  /// Removes the entry for `key`, returning its value.
  #[inline]
  pub fn remove<Q>(&self, key: &Q) -> Option<V>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self.inner.remove(key)
  }

  /// Removes the entry for `key` if present.
  ///
  /// Returns `true` if an entry was removed. Erasing a missing key is not an
  /// error.
  ///
  /// # Examples
  ///
  /// ```
  /// use shard_table::ShardTable;
  ///
  /// let table: ShardTable<u32, u32> = ShardTable::new();
  /// table.put(1, 1);
  ///
  /// assert!(table.erase(&1));
  /// assert!(!table.erase(&1));
  /// ```
  #[inline]
  pub fn erase<Q>(&self, key: &Q) -> bool
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self.inner.erase(key)
  }

  /// Acquires every shard and returns a guard over the whole table.
  ///
  /// Waits until no other thread holds any shard. The guard offers a single
  /// consistent view of all entries and releases every shard when dropped.
  ///
  /// Calling this while the current thread holds a [`Ref`], [`RefMut`] or
  /// another [`TableGuard`] of the same table spins forever.
  ///
  /// # Examples
  ///
  /// ```
  /// use shard_table::ShardTable;
  ///
  /// let table: ShardTable<u32, u32> = (0..100).map(|key| (key, key)).collect();
  ///
  /// let mut guard = table.lock_all();
  ///
  /// for (_, value) in guard.iter_mut() {
  ///   *value *= 2;
  /// }
  ///
  /// assert_eq!(guard.len(), 100);
  /// assert_eq!(guard.get(&21), Some(&42));
  /// ```
  #[inline]
  pub fn lock_all(&self) -> TableGuard<'_, K, V, P> {
    self.inner.lock_all()
  }

  /// Attempts to acquire every shard without spinning.
  ///
  /// Returns `None`, holding nothing, if any shard is busy.
  #[inline]
  pub fn try_lock_all(&self) -> Option<TableGuard<'_, K, V, P>> {
    self.inner.try_lock_all()
  }

  /// Calls `f` on every entry while holding all shards.
  ///
  /// Entries are visited in ascending shard order. `f` must not access the
  /// table.
  ///
  /// # Examples
  ///
  /// ```
  /// use shard_table::ShardTable;
  ///
  /// let table: ShardTable<u32, u32> = (1..=4).map(|key| (key, key)).collect();
  /// let mut sum: u32 = 0;
  ///
  /// table.for_each(|_, value| sum += value);
  /// assert_eq!(sum, 10);
  /// ```
  #[inline]
  pub fn for_each<F>(&self, f: F)
  where
    F: FnMut(&K, &V),
  {
    self.inner.for_each(f);
  }

  /// Returns a consistent copy of every entry.
  ///
  /// # Examples
  ///
  /// ```
  /// use shard_table::ShardTable;
  ///
  /// let table: ShardTable<u32, char> = ShardTable::new();
  /// table.put(1, 'a');
  /// table.put(2, 'b');
  ///
  /// let mut entries = table.snapshot();
  /// entries.sort();
  ///
  /// assert_eq!(entries, [(1, 'a'), (2, 'b')]);
  /// ```
  #[inline]
  pub fn snapshot(&self) -> Vec<(K, V)>
  where
    K: Clone,
    V: Clone,
  {
    self.inner.snapshot()
  }

  /// Returns a consistent copy of every key.
  #[inline]
  pub fn keys(&self) -> Vec<K>
  where
    K: Clone,
  {
    self.inner.keys()
  }

  /// Keeps only the entries for which `f` returns `true`.
  ///
  /// Holds every shard while `f` runs. Returns the number of removed entries.
  ///
  /// # Examples
  ///
  /// ```
  /// use shard_table::ShardTable;
  ///
  /// let table: ShardTable<u32, u32> = (0..10).map(|key| (key, key)).collect();
  ///
  /// assert_eq!(table.retain(|key, _| key % 2 == 0), 5);
  /// assert_eq!(table.len(), 5);
  /// ```
  #[inline]
  pub fn retain<F>(&self, f: F) -> usize
  where
    F: FnMut(&K, &mut V) -> bool,
  {
    self.inner.retain(f)
  }

  /// Removes every entry.
  #[inline]
  pub fn clear(&self) {
    self.inner.clear();
  }

  /// Reserves capacity for at least `additional` more entries.
  #[inline]
  pub fn reserve(&self, additional: usize) {
    self.inner.reserve(additional);
  }

  /// Exchanges the contents of `self` and `other`.
  ///
  /// Every shard of both tables is locked in one all-or-nothing step, so
  /// concurrent swaps of the same pair in opposite directions cannot
  /// deadlock. Entries are re-routed with the receiving table's hasher.
  /// Swapping a table with itself does nothing.
  ///
  /// # Examples
  ///
  /// ```
  /// use shard_table::ShardTable;
  ///
  /// let a: ShardTable<u32, &str> = ShardTable::new();
  /// let b: ShardTable<u32, &str> = ShardTable::new();
  ///
  /// a.put(1, "a");
  /// b.put(2, "b");
  /// b.put(3, "b");
  ///
  /// a.swap(&b);
  ///
  /// assert_eq!(a.len(), 2);
  /// assert_eq!(a.get(&2), Ok("b"));
  /// assert_eq!(b.get(&1), Ok("a"));
  /// ```
  pub fn swap(&self, other: &Self) {
    self.inner.swap(&other.inner);
  }

  /// Replaces the contents of `self` with those of `other`, leaving `other`
  /// empty.
  ///
  /// Both tables are locked in one all-or-nothing step, as in [`swap`].
  /// Returns the number of entries `self` held before; they are dropped
  /// after both tables are released.
  ///
  /// # Examples
  ///
  /// ```
  /// use shard_table::ShardTable;
  ///
  /// let live: ShardTable<u32, u32> = ShardTable::new();
  /// let staged: ShardTable<u32, u32> = ShardTable::new();
  ///
  /// live.put(1, 1);
  /// staged.put(2, 2);
  /// staged.put(3, 3);
  ///
  /// assert_eq!(live.take_from(&staged), 1);
  /// assert!(staged.is_empty());
  /// assert_eq!(live.keys().len(), 2);
  /// ```
  ///
  /// [`swap`]: Self::swap
  pub fn take_from(&self, other: &Self) -> usize {
    self.inner.take_from(&other.inner)
  }
}

impl<K, V, P> Debug for ShardTable<K, V, P>
where
  K: Eq + Hash + Debug,
  V: Debug,
  P: Params + ?Sized,
{
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("ShardTable")
      .field("params", &P::debug())
      .field("entries", &self.inner)
      .finish()
  }
}

impl<K, V, P> Default for ShardTable<K, V, P>
where
  P: Params + ?Sized,
{
  #[inline]
  fn default() -> Self {
    Self::new()
  }
}

impl<K, V, P> FromIterator<(K, V)> for ShardTable<K, V, P>
where
  K: Eq + Hash,
  P: Params + ?Sized,
{
  fn from_iter<I>(iter: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
  {
    let mut table: Self = Self::new();
    table.extend(iter);
    table
  }
}

impl<K, V, P> Extend<(K, V)> for ShardTable<K, V, P>
where
  K: Eq + Hash,
  P: Params + ?Sized,
{
  fn extend<I>(&mut self, iter: I)
  where
    I: IntoIterator<Item = (K, V)>,
  {
    let mut guard: TableGuard<'_, K, V, P> = self.lock_all();

    guard.extend(iter);
  }
}

// SAFETY: Every access to an entry happens under its shard lock, so the
// table may be shared when entries may be sent between threads (they are
// inserted and removed by arbitrary threads) and shared between them
// (shared locks admit concurrent readers).
unsafe impl<K, V, P> Sync for ShardTable<K, V, P>
where
  K: Send + Sync,
  V: Send + Sync,
  P: Params + ?Sized,
  P::Hasher: Sync,
{
}
