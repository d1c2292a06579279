//! Spin-based shared/exclusive lock.
//!
//! Provides [`RawSpinLock`], the lock guarding each shard, and the RAII
//! guards [`SpinGuard`] and [`SpinSharedGuard`].

use core::fmt::Debug;
use core::fmt::Formatter;
use core::fmt::Result;
use core::marker::PhantomData;

use crate::sync::atomic::AtomicBool;
use crate::sync::atomic::AtomicU32;
use crate::sync::atomic::Ordering::AcqRel;
use crate::sync::atomic::Ordering::Acquire;
use crate::sync::atomic::Ordering::Relaxed;
use crate::sync::atomic::Ordering::Release;
use crate::sync::spin_loop;

/// A writer-preferring shared/exclusive spin lock.
///
/// The lock is built from two atomics: a writer flag and a reader count. A
/// writer raises the flag *before* waiting for readers to drain, and readers
/// refuse to complete entry while the flag is raised, so a steady stream of
/// readers cannot starve a writer.
///
/// Acquisition never blocks in the OS sense; waiting threads spin. This is
/// only appropriate for short critical sections. The lock is not reentrant:
/// acquiring it twice on one thread spins forever.
///
/// # Examples
///
/// ```
/// use shard_table::RawSpinLock;
///
/// let lock: RawSpinLock = RawSpinLock::new();
///
/// {
///   let _a = lock.read();
///   let _b = lock.read();
///   assert_eq!(lock.readers(), 2);
///   assert!(!lock.try_lock());
/// }
///
/// let guard = lock.write();
/// assert!(lock.is_locked_exclusive());
/// drop(guard);
///
/// assert!(!lock.is_locked());
/// ```
pub struct RawSpinLock {
  /// Raised by a writer that holds, or is acquiring, exclusive access.
  writer: AtomicBool,
  /// Number of readers that completed (or are completing) entry.
  readers: AtomicU32,
}

impl RawSpinLock {
  /// Creates a new, unlocked lock.
  #[inline]
  pub fn new() -> Self {
    Self {
      writer: AtomicBool::new(false),
      readers: AtomicU32::new(0),
    }
  }

  /// Acquires exclusive access, spinning until it is available.
  pub fn lock(&self) {
    loop {
      self.wait_for_writer();

      if self
        .writer
        .compare_exchange_weak(false, true, Acquire, Relaxed)
        .is_ok()
      {
        break;
      }
    }

    // The flag is raised; no new reader can complete entry from here on.
    while self.readers.load(Acquire) != 0 {
      spin_loop();
    }
  }

  /// Attempts to acquire exclusive access without spinning.
  ///
  /// Returns `false` if a writer holds the lock or any reader is present.
  pub fn try_lock(&self) -> bool {
    if self
      .writer
      .compare_exchange(false, true, Acquire, Relaxed)
      .is_err()
    {
      return false;
    }

    if self.readers.load(Acquire) == 0 {
      return true;
    }

    self.writer.store(false, Release);

    false
  }

  /// Releases exclusive access.
  ///
  /// # Safety
  ///
  /// The caller must hold exclusive access acquired through [`lock`] or a
  /// successful [`try_lock`].
  ///
  /// [`lock`]: Self::lock
  /// [`try_lock`]: Self::try_lock
  #[inline]
  pub unsafe fn unlock(&self) {
    debug_assert!(
      self.writer.load(Relaxed),
      "RawSpinLock::unlock requires that the lock is held exclusively",
    );

    self.writer.store(false, Release);
  }

  /// Acquires shared access, spinning while a writer holds or awaits the lock.
  pub fn lock_shared(&self) {
    loop {
      self.wait_for_writer();

      if self.enter_shared() {
        return;
      }
    }
  }

  /// Attempts to acquire shared access without spinning.
  ///
  /// Returns `false` if a writer holds or is acquiring the lock.
  pub fn try_lock_shared(&self) -> bool {
    !self.writer.load(Relaxed) && self.enter_shared()
  }

  /// Releases shared access.
  ///
  /// # Safety
  ///
  /// The caller must hold shared access acquired through [`lock_shared`] or a
  /// successful [`try_lock_shared`].
  ///
  /// [`lock_shared`]: Self::lock_shared
  /// [`try_lock_shared`]: Self::try_lock_shared
  #[inline]
  pub unsafe fn unlock_shared(&self) {
    let prev: u32 = self.readers.fetch_sub(1, Release);

    debug_assert!(
      prev != 0,
      "RawSpinLock::unlock_shared requires that the lock is held shared",
    );
  }

  /// Acquires exclusive access and returns a guard releasing it on drop.
  #[inline]
  pub fn write(&self) -> SpinGuard<'_> {
    self.lock();

    // SAFETY: Exclusive access was acquired above.
    unsafe { SpinGuard::adopt(self) }
  }

  /// Acquires shared access and returns a guard releasing it on drop.
  #[inline]
  pub fn read(&self) -> SpinSharedGuard<'_> {
    self.lock_shared();

    // SAFETY: Shared access was acquired above.
    unsafe { SpinSharedGuard::adopt(self) }
  }

  /// Returns `true` if the lock is held, or being acquired, in any mode.
  ///
  /// The result may be stale immediately.
  #[inline]
  pub fn is_locked(&self) -> bool {
    self.is_locked_exclusive() || self.readers() != 0
  }

  /// Returns `true` if a writer holds, or is acquiring, the lock.
  ///
  /// The result may be stale immediately.
  #[inline]
  pub fn is_locked_exclusive(&self) -> bool {
    self.writer.load(Relaxed)
  }

  /// Returns the current reader count.
  ///
  /// Includes readers that are about to back off in favour of a writer. The
  /// result may be stale immediately.
  #[inline]
  pub fn readers(&self) -> u32 {
    self.readers.load(Relaxed)
  }

  #[inline]
  fn wait_for_writer(&self) {
    while self.writer.load(Relaxed) {
      spin_loop();
    }
  }

  /// Registers a reader, backing out again if a writer slipped in.
  ///
  /// The writer check is a read-modify-write: it takes a place in the flag's
  /// modification order, so either it precedes a writer's CAS (and the writer
  /// then sees our count) or it observes the raised flag.
  #[inline]
  fn enter_shared(&self) -> bool {
    self.readers.fetch_add(1, Relaxed);

    if self
      .writer
      .compare_exchange(false, false, AcqRel, Relaxed)
      .is_ok()
    {
      return true;
    }

    self.readers.fetch_sub(1, Release);

    false
  }
}

impl Default for RawSpinLock {
  #[inline]
  fn default() -> Self {
    Self::new()
  }
}

impl Debug for RawSpinLock {
  fn fmt(&self, f: &mut Formatter<'_>) -> Result {
    f.debug_struct("RawSpinLock")
      .field("writer", &self.is_locked_exclusive())
      .field("readers", &self.readers())
      .finish()
  }
}

// -----------------------------------------------------------------------------
// Guards
// -----------------------------------------------------------------------------

/// RAII guard for exclusive access to a [`RawSpinLock`].
///
/// Returned by [`RawSpinLock::write`]. Not `Send`: the lock is released by
/// the same thread that acquired it.
#[must_use = "if unused the lock will immediately unlock"]
pub struct SpinGuard<'lock> {
  lock: &'lock RawSpinLock,
  marker: PhantomData<*const ()>,
}

impl<'lock> SpinGuard<'lock> {
  /// Wraps exclusive access the caller already holds.
  ///
  /// # Safety
  ///
  /// The caller must hold exclusive access to `lock` and transfer the
  /// responsibility of releasing it to the guard.
  #[inline]
  pub unsafe fn adopt(lock: &'lock RawSpinLock) -> Self {
    Self {
      lock,
      marker: PhantomData,
    }
  }

  /// Returns the lock this guard holds.
  #[inline]
  pub fn raw(&self) -> &'lock RawSpinLock {
    self.lock
  }
}

impl Drop for SpinGuard<'_> {
  #[inline]
  fn drop(&mut self) {
    // SAFETY: Guards only exist while exclusive access is held.
    unsafe { self.lock.unlock() }
  }
}

impl Debug for SpinGuard<'_> {
  fn fmt(&self, f: &mut Formatter<'_>) -> Result {
    f.debug_tuple("SpinGuard").field(self.lock).finish()
  }
}

/// RAII guard for shared access to a [`RawSpinLock`].
///
/// Returned by [`RawSpinLock::read`].
#[must_use = "if unused the lock will immediately unlock"]
pub struct SpinSharedGuard<'lock> {
  lock: &'lock RawSpinLock,
  marker: PhantomData<*const ()>,
}

impl<'lock> SpinSharedGuard<'lock> {
  /// Wraps shared access the caller already holds.
  ///
  /// # Safety
  ///
  /// The caller must hold shared access to `lock` and transfer the
  /// responsibility of releasing it to the guard.
  #[inline]
  pub unsafe fn adopt(lock: &'lock RawSpinLock) -> Self {
    Self {
      lock,
      marker: PhantomData,
    }
  }

  /// Returns the lock this guard holds.
  #[inline]
  pub fn raw(&self) -> &'lock RawSpinLock {
    self.lock
  }
}

impl Drop for SpinSharedGuard<'_> {
  #[inline]
  fn drop(&mut self) {
    // SAFETY: Guards only exist while shared access is held.
    unsafe { self.lock.unlock_shared() }
  }
}

impl Debug for SpinSharedGuard<'_> {
  fn fmt(&self, f: &mut Formatter<'_>) -> Result {
    f.debug_tuple("SpinSharedGuard").field(self.lock).finish()
  }
}
