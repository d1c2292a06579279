#[cfg(all(loom, shuttle))]
compile_error!("cannot use loom and shuttle at once");

#[cfg(not(any(loom, shuttle)))]
pub(crate) mod sync {
  pub(crate) mod atomic {
    pub(crate) use ::core::sync::atomic::AtomicBool;
    pub(crate) use ::core::sync::atomic::AtomicU32;
    pub(crate) use ::core::sync::atomic::AtomicUsize;
    pub(crate) use ::core::sync::atomic::Ordering;
  }

  #[inline]
  pub(crate) fn spin_loop() {
    ::core::hint::spin_loop();
  }
}

#[cfg(loom)]
pub(crate) mod sync {
  pub(crate) mod atomic {
    pub(crate) use ::loom::sync::atomic::AtomicBool;
    pub(crate) use ::loom::sync::atomic::AtomicU32;
    pub(crate) use ::loom::sync::atomic::AtomicUsize;
    pub(crate) use ::loom::sync::atomic::Ordering;
  }

  // Spinning without yielding would never let loom schedule the lock holder.
  #[inline]
  pub(crate) fn spin_loop() {
    ::loom::thread::yield_now();
  }
}

#[cfg(shuttle)]
pub(crate) mod sync {
  pub(crate) mod atomic {
    pub(crate) use ::shuttle::sync::atomic::AtomicBool;
    pub(crate) use ::shuttle::sync::atomic::AtomicU32;
    pub(crate) use ::shuttle::sync::atomic::AtomicUsize;
    pub(crate) use ::shuttle::sync::atomic::Ordering;
  }

  #[inline]
  pub(crate) fn spin_loop() {
    ::shuttle::thread::yield_now();
  }
}

#[cfg(loom)]
pub(crate) mod cell {
  pub(crate) use ::loom::cell::UnsafeCell;
}

#[cfg(not(loom))]
pub(crate) mod cell {
  /// Mirror of `loom::cell::UnsafeCell` over [`core::cell::UnsafeCell`].
  ///
  /// Access goes through closures so the same code can be model-checked.
  #[repr(transparent)]
  pub(crate) struct UnsafeCell<T> {
    inner: ::core::cell::UnsafeCell<T>,
  }

  impl<T> UnsafeCell<T> {
    #[inline]
    pub(crate) const fn new(value: T) -> Self {
      Self {
        inner: ::core::cell::UnsafeCell::new(value),
      }
    }

    #[inline]
    pub(crate) fn with<F, R>(&self, f: F) -> R
    where
      F: FnOnce(*const T) -> R,
    {
      f(self.inner.get())
    }

    #[inline]
    pub(crate) fn with_mut<F, R>(&self, f: F) -> R
    where
      F: FnOnce(*mut T) -> R,
    {
      f(self.inner.get())
    }
  }
}
