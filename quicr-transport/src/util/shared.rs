use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// A handle to state shared between producer and reader halves.
///
/// Entry into an endpoint is serial (the transport run loop invokes callbacks
/// one at a time), so the lock is never contended by design.
pub struct Shared<T> {
	state: Arc<Mutex<T>>,
}

impl<T> Shared<T> {
	pub fn new(value: T) -> Self {
		Self {
			state: Arc::new(Mutex::new(value)),
		}
	}

	pub fn lock(&self) -> MutexGuard<'_, T> {
		self.state.lock().unwrap()
	}

	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.state, &other.state)
	}
}

impl<T> Clone for Shared<T> {
	fn clone(&self) -> Self {
		Self {
			state: self.state.clone(),
		}
	}
}

impl<T: fmt::Debug> fmt::Debug for Shared<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.state.try_lock() {
			Ok(state) => state.fmt(f),
			Err(_) => write!(f, "<locked>"),
		}
	}
}
