//! Per-shard locks and table-wide acquisition.
//!
//! [`ShardLockGroup`] owns one [`RawSpinLock`] per shard. Point operations
//! lock a single shard; operations that need a globally consistent view take
//! every shard at once through [`LockAll`].
//!
//! # Lock-all Algorithm
//!
//! Acquiring all shards is all-or-nothing. Each round blocks on one shard,
//! then *tries* every other shard in ascending order. If any attempt fails,
//! every lock taken in that round is released and the next round blocks on
//! the shard that was contended. A thread therefore never waits while holding
//! more than one shard lock, so two lock-all callers, or a lock-all caller and
//! a single-shard caller, cannot deadlock.
//!
//! While a lock-all is pending, new single-shard acquisitions made through the
//! group wait for it to finish. The shards it contends on drain instead of
//! refilling, which carries each lock's writer preference over to the
//! table-wide writer.

use core::array;
use core::fmt::Debug;
use core::fmt::Formatter;
use core::fmt::Result;
use core::marker::PhantomData;
use core::ptr;

use tracing::trace;

use crate::shard::SHARDS;
use crate::shard::ShardIndex;
use crate::shard::Shards;
use crate::spin::RawSpinLock;
use crate::spin::SpinGuard;
use crate::spin::SpinSharedGuard;
use crate::sync::atomic::AtomicU32;
use crate::sync::atomic::Ordering::Relaxed;
use crate::sync::spin_loop;

/// One shared/exclusive lock per shard.
///
/// # Examples
///
/// ```
/// use shard_table::{ShardIndex, ShardLockGroup};
///
/// let group: ShardLockGroup = ShardLockGroup::new();
/// let shard: ShardIndex = ShardIndex::from_hash(7);
///
/// {
///   let _guard = group.write(shard);
///   assert!(group.try_lock_all().is_none());
/// }
///
/// let all = group.lock_all();
/// assert!(all.owns_lock());
/// ```
pub struct ShardLockGroup {
  locks: Shards<RawSpinLock>,
  /// Number of lock-all acquisitions in progress.
  pending: AtomicU32,
}

impl ShardLockGroup {
  /// Creates a new group with every shard unlocked.
  #[inline]
  pub fn new() -> Self {
    Self {
      locks: Shards::new(|_| RawSpinLock::new()),
      pending: AtomicU32::new(0),
    }
  }

  /// Returns the lock of the given shard.
  ///
  /// Acquiring the raw lock directly bypasses the wait for a pending
  /// lock-all.
  #[inline]
  pub fn shard(&self, index: ShardIndex) -> &RawSpinLock {
    self.locks.get(index)
  }

  /// Acquires exclusive access to one shard.
  #[inline]
  pub fn lock_shard(&self, index: ShardIndex) {
    self.wait_for_lock_all();
    self.shard(index).lock();
  }

  /// Releases exclusive access to one shard.
  ///
  /// # Safety
  ///
  /// The caller must hold exclusive access to the shard.
  #[inline]
  pub unsafe fn unlock_shard(&self, index: ShardIndex) {
    // SAFETY: Caller guarantees the shard is held exclusively.
    unsafe { self.shard(index).unlock() }
  }

  /// Acquires shared access to one shard.
  #[inline]
  pub fn lock_shard_shared(&self, index: ShardIndex) {
    self.wait_for_lock_all();
    self.shard(index).lock_shared();
  }

  /// Releases shared access to one shard.
  ///
  /// # Safety
  ///
  /// The caller must hold shared access to the shard.
  #[inline]
  pub unsafe fn unlock_shard_shared(&self, index: ShardIndex) {
    // SAFETY: Caller guarantees the shard is held shared.
    unsafe { self.shard(index).unlock_shared() }
  }

  /// Acquires exclusive access to one shard, released when the guard drops.
  #[inline]
  pub fn write(&self, index: ShardIndex) -> SpinGuard<'_> {
    self.wait_for_lock_all();
    self.shard(index).write()
  }

  /// Acquires shared access to one shard, released when the guard drops.
  #[inline]
  pub fn read(&self, index: ShardIndex) -> SpinSharedGuard<'_> {
    self.wait_for_lock_all();
    self.shard(index).read()
  }

  /// Acquires exclusive access to every shard.
  ///
  /// See the [implementation notes](crate::implementation) for the acquisition
  /// algorithm.
  #[inline]
  pub fn lock_all(&self) -> LockAll<'_> {
    LockAll::new(self)
  }

  /// Attempts to acquire exclusive access to every shard without spinning.
  ///
  /// Returns `None`, holding nothing, if any shard is busy.
  #[inline]
  pub fn try_lock_all(&self) -> Option<LockAll<'_>> {
    let mut guard: LockAll<'_> = LockAll::deferred(self);

    if guard.try_lock() { Some(guard) } else { None }
  }

  /// Acquires exclusive access to every shard of `self` and `other` at once.
  ///
  /// All 32 locks are taken in one all-or-nothing step, so two threads
  /// locking the same pair in opposite order cannot deadlock.
  ///
  /// # Panics
  ///
  /// Panics if `other` is `self`.
  ///
  /// # Examples
  ///
  /// ```
  /// use shard_table::ShardLockGroup;
  ///
  /// let a: ShardLockGroup = ShardLockGroup::new();
  /// let b: ShardLockGroup = ShardLockGroup::new();
  ///
  /// let (guard_a, guard_b) = a.lock_pair(&b);
  /// assert!(guard_a.owns_lock() && guard_b.owns_lock());
  /// assert!(a.try_lock_all().is_none());
  /// assert!(b.try_lock_all().is_none());
  /// ```
  pub fn lock_pair<'group>(
    &'group self,
    other: &'group Self,
  ) -> (LockAll<'group>, LockAll<'group>) {
    assert!(
      !ptr::eq(self, other),
      "ShardLockGroup::lock_pair: cannot lock a group together with itself",
    );

    // Both argument orders scan the locks in the same sequence.
    let (low, high): (&Self, &Self) = if ptr::from_ref(self) < ptr::from_ref(other) {
      (self, other)
    } else {
      (other, self)
    };

    let locks: [&RawSpinLock; SHARDS * 2] = array::from_fn(|slot| {
      let group: &Self = if slot < SHARDS { low } else { high };
      group.shard(ShardIndex::from_hash(slot as u64))
    });

    low.pending.fetch_add(1, Relaxed);
    high.pending.fetch_add(1, Relaxed);

    acquire_each(&locks);

    low.pending.fetch_sub(1, Relaxed);
    high.pending.fetch_sub(1, Relaxed);

    // SAFETY: Every shard of both groups was acquired above.
    unsafe { (LockAll::adopt(self), LockAll::adopt(other)) }
  }

  /// Returns `true` if any shard is held, or being acquired, in any mode.
  ///
  /// The result may be stale immediately.
  pub fn is_locked(&self) -> bool {
    self.locks.iter().any(RawSpinLock::is_locked)
  }

  /// Returns `true` if a lock-all acquisition is in progress.
  ///
  /// The result may be stale immediately.
  #[inline]
  pub fn is_lock_all_pending(&self) -> bool {
    self.pending.load(Relaxed) != 0
  }

  #[inline]
  fn wait_for_lock_all(&self) {
    while self.is_lock_all_pending() {
      spin_loop();
    }
  }

  fn raw_locks(&self) -> [&RawSpinLock; SHARDS] {
    array::from_fn(|slot| self.shard(ShardIndex::from_hash(slot as u64)))
  }

  fn acquire_all(&self) {
    self.pending.fetch_add(1, Relaxed);

    acquire_each(&self.raw_locks());

    self.pending.fetch_sub(1, Relaxed);
  }

  fn try_acquire_all(&self) -> bool {
    let locks: [&RawSpinLock; SHARDS] = self.raw_locks();

    if !locks[0].try_lock() {
      return false;
    }

    if try_acquire_rest(&locks, 0).is_none() {
      return true;
    }

    // SAFETY: The first lock was taken above.
    unsafe {
      locks[0].unlock();
    }

    false
  }

  /// Releases every shard in descending order.
  ///
  /// # Safety
  ///
  /// Every shard must be held exclusively by the caller.
  unsafe fn release_all(&self) {
    for index in ShardIndex::all().rev() {
      // SAFETY: Caller guarantees every shard is held exclusively.
      unsafe {
        self.unlock_shard(index);
      }
    }
  }
}

/// Acquires every lock in `locks` exclusively, or none of them.
fn acquire_each(locks: &[&RawSpinLock]) {
  let mut first: usize = 0;

  loop {
    locks[first].lock();

    let Some(contended) = try_acquire_rest(locks, first) else {
      return;
    };

    // SAFETY: `first` was locked at the start of this round.
    unsafe {
      locks[first].unlock();
    }

    trace!(first, contended, "lock-all round failed");

    first = contended;

    spin_loop();
  }
}

/// Try-locks every lock except `held` in ascending order.
///
/// On failure, releases every lock taken here and returns the position of the
/// one that could not be acquired; `held` is left locked either way.
fn try_acquire_rest(locks: &[&RawSpinLock], held: usize) -> Option<usize> {
  for (index, lock) in locks.iter().enumerate() {
    if index == held || lock.try_lock() {
      continue;
    }

    for taken in (0..index).rev() {
      if taken != held {
        // SAFETY: Every lock below `index` other than `held` was taken by
        // this loop.
        unsafe {
          locks[taken].unlock();
        }
      }
    }

    return Some(index);
  }

  None
}

impl Default for ShardLockGroup {
  #[inline]
  fn default() -> Self {
    Self::new()
  }
}

impl Debug for ShardLockGroup {
  fn fmt(&self, f: &mut Formatter<'_>) -> Result {
    f.debug_list().entries(self.locks.iter()).finish()
  }
}

// -----------------------------------------------------------------------------
// Lock All
// -----------------------------------------------------------------------------

/// Scoped exclusive access to every shard of a [`ShardLockGroup`].
///
/// Dropping the guard, or calling [`unlock`], releases all shards. The guard
/// is bound to the group it was created for and cannot be cloned.
///
/// A guard is created in one of three ways:
///
/// - [`LockAll::new`] acquires every shard immediately.
/// - [`LockAll::adopt`] takes over shards the caller already holds.
/// - [`LockAll::deferred`] holds nothing until [`lock`] or [`try_lock`].
///
/// # Examples
///
/// ```
/// use shard_table::{LockAll, ShardLockGroup};
///
/// let group: ShardLockGroup = ShardLockGroup::new();
/// let mut guard: LockAll<'_> = LockAll::deferred(&group);
///
/// assert!(!guard.owns_lock());
/// assert!(!group.is_locked());
///
/// guard.lock();
/// assert!(group.is_locked());
///
/// guard.unlock();
/// assert!(!group.is_locked());
/// ```
///
/// [`lock`]: Self::lock
/// [`try_lock`]: Self::try_lock
/// [`unlock`]: Self::unlock
#[must_use = "if unused the shards will immediately unlock"]
pub struct LockAll<'group> {
  group: &'group ShardLockGroup,
  owned: bool,
  marker: PhantomData<*const ()>,
}

impl<'group> LockAll<'group> {
  /// Acquires every shard of `group`.
  #[inline]
  pub fn new(group: &'group ShardLockGroup) -> Self {
    group.acquire_all();

    Self {
      group,
      owned: true,
      marker: PhantomData,
    }
  }

  /// Wraps every shard of `group`, which the caller already holds.
  ///
  /// # Safety
  ///
  /// The caller must hold exclusive access to every shard of `group` and
  /// transfer the responsibility of releasing them to the guard.
  #[inline]
  pub unsafe fn adopt(group: &'group ShardLockGroup) -> Self {
    Self {
      group,
      owned: true,
      marker: PhantomData,
    }
  }

  /// Creates a guard for `group` without acquiring anything.
  #[inline]
  pub fn deferred(group: &'group ShardLockGroup) -> Self {
    Self {
      group,
      owned: false,
      marker: PhantomData,
    }
  }

  /// Acquires every shard.
  ///
  /// # Panics
  ///
  /// Panics if the guard already owns the shards.
  pub fn lock(&mut self) {
    assert!(!self.owned, "LockAll::lock: shards are already held");

    self.group.acquire_all();
    self.owned = true;
  }

  /// Attempts to acquire every shard without spinning.
  ///
  /// # Panics
  ///
  /// Panics if the guard already owns the shards.
  pub fn try_lock(&mut self) -> bool {
    assert!(!self.owned, "LockAll::try_lock: shards are already held");

    self.owned = self.group.try_acquire_all();
    self.owned
  }

  /// Releases every shard.
  ///
  /// # Panics
  ///
  /// Panics if the guard does not own the shards.
  pub fn unlock(&mut self) {
    assert!(self.owned, "LockAll::unlock: shards are not held");

    self.owned = false;

    // SAFETY: `owned` was set, so every shard is held by this guard.
    unsafe {
      self.group.release_all();
    }
  }

  /// Returns `true` if the guard currently holds every shard.
  #[inline]
  pub fn owns_lock(&self) -> bool {
    self.owned
  }

  /// Returns the group this guard is bound to.
  #[inline]
  pub fn group(&self) -> &'group ShardLockGroup {
    self.group
  }
}

impl Drop for LockAll<'_> {
  #[inline]
  fn drop(&mut self) {
    if self.owned {
      // SAFETY: `owned` is only set while every shard is held by this guard.
      unsafe {
        self.group.release_all();
      }
    }
  }
}

impl Debug for LockAll<'_> {
  fn fmt(&self, f: &mut Formatter<'_>) -> Result {
    f.debug_struct("LockAll")
      .field("owned", &self.owned)
      .finish_non_exhaustive()
  }
}
