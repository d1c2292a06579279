use std::thread;
use std::thread::ScopedJoinHandle;

use crate::spin::RawSpinLock;
use crate::spin::SpinGuard;
use crate::spin::SpinSharedGuard;

#[test]
fn test_new_is_unlocked() {
  let lock: RawSpinLock = RawSpinLock::new();

  assert!(!lock.is_locked());
  assert!(!lock.is_locked_exclusive());
  assert_eq!(lock.readers(), 0);
}

#[test]
fn test_lock_unlock() {
  let lock: RawSpinLock = RawSpinLock::new();

  lock.lock();

  assert!(lock.is_locked());
  assert!(lock.is_locked_exclusive());
  assert_eq!(lock.readers(), 0);

  // SAFETY: Acquired above.
  unsafe { lock.unlock() };

  assert!(!lock.is_locked());
}

#[test]
fn test_try_lock_excludes_writer() {
  let lock: RawSpinLock = RawSpinLock::new();

  assert!(lock.try_lock());
  assert!(!lock.try_lock());
  assert!(!lock.try_lock_shared());

  // SAFETY: Acquired above.
  unsafe { lock.unlock() };

  assert!(lock.try_lock());

  // SAFETY: Acquired above.
  unsafe { lock.unlock() };
}

#[test]
fn test_shared_readers_coexist() {
  let lock: RawSpinLock = RawSpinLock::new();

  lock.lock_shared();
  lock.lock_shared();
  assert!(lock.try_lock_shared());

  assert_eq!(lock.readers(), 3);
  assert!(lock.is_locked());
  assert!(!lock.is_locked_exclusive());

  // SAFETY: Three shared acquisitions above.
  unsafe {
    lock.unlock_shared();
    lock.unlock_shared();
    lock.unlock_shared();
  }

  assert_eq!(lock.readers(), 0);
  assert!(!lock.is_locked());
}

#[test]
fn test_try_lock_fails_with_readers() {
  let lock: RawSpinLock = RawSpinLock::new();
  let guard: SpinSharedGuard<'_> = lock.read();

  assert!(!lock.try_lock());

  // A failed attempt must not leave the writer flag raised.
  assert!(!lock.is_locked_exclusive());
  assert!(lock.try_lock_shared());

  // SAFETY: Acquired above.
  unsafe { lock.unlock_shared() };

  drop(guard);

  assert!(lock.try_lock());

  // SAFETY: Acquired above.
  unsafe { lock.unlock() };
}

#[test]
fn test_pending_writer_blocks_readers() {
  let lock: RawSpinLock = RawSpinLock::new();
  let guard: SpinSharedGuard<'_> = lock.read();

  thread::scope(|scope| {
    let writer: ScopedJoinHandle<'_, ()> = scope.spawn(|| {
      let _guard: SpinGuard<'_> = lock.write();
    });

    // Wait until the writer has raised its flag and is draining readers.
    while !lock.is_locked_exclusive() {
      thread::yield_now();
    }

    assert!(!lock.try_lock_shared());
    assert_eq!(lock.readers(), 1);
    assert!(!writer.is_finished());

    drop(guard);

    writer.join().unwrap();
  });

  assert!(!lock.is_locked());
  assert!(lock.try_lock_shared());

  // SAFETY: Acquired above.
  unsafe { lock.unlock_shared() };
}

#[test]
fn test_write_guard_releases_on_drop() {
  let lock: RawSpinLock = RawSpinLock::new();

  {
    let guard: SpinGuard<'_> = lock.write();

    assert!(core::ptr::eq(guard.raw(), &lock));
    assert!(lock.is_locked_exclusive());
  }

  assert!(!lock.is_locked());
}

#[test]
fn test_read_guard_releases_on_drop() {
  let lock: RawSpinLock = RawSpinLock::new();

  {
    let a: SpinSharedGuard<'_> = lock.read();
    let b: SpinSharedGuard<'_> = lock.read();

    assert!(core::ptr::eq(a.raw(), b.raw()));
    assert_eq!(lock.readers(), 2);
  }

  assert!(!lock.is_locked());
}

#[test]
fn test_adopt_guard() {
  let lock: RawSpinLock = RawSpinLock::new();

  lock.lock();

  // SAFETY: Exclusive access was acquired above.
  let guard: SpinGuard<'_> = unsafe { SpinGuard::adopt(&lock) };

  assert!(lock.is_locked_exclusive());
  drop(guard);
  assert!(!lock.is_locked());

  lock.lock_shared();

  // SAFETY: Shared access was acquired above.
  let guard: SpinSharedGuard<'_> = unsafe { SpinSharedGuard::adopt(&lock) };

  assert_eq!(lock.readers(), 1);
  drop(guard);
  assert!(!lock.is_locked());
}

#[test]
fn test_debug() {
  let lock: RawSpinLock = RawSpinLock::new();
  let guard: SpinSharedGuard<'_> = lock.read();

  assert_eq!(
    format!("{lock:?}"),
    "RawSpinLock { writer: false, readers: 1 }",
  );

  drop(guard);
}
