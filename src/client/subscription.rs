//! Event subscription guard

use std::sync::Mutex;

/// Handle for a registered event handler
///
/// `unsubscribe` runs the release closure at most once. Dropping the guard
/// unsubscribes as well.
pub struct Subscription {
    release: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Mutex::new(Some(Box::new(release))),
        }
    }

    /// Subscription with nothing to release
    pub fn noop() -> Self {
        Self {
            release: Mutex::new(None),
        }
    }

    /// Remove the handler; later calls do nothing
    pub fn unsubscribe(&self) {
        let release = match self.release.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(release) = release {
            release();
        }
    }

    pub fn is_active(&self) -> bool {
        self.release.lock().map(|g| g.is_some()).unwrap_or(false)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
