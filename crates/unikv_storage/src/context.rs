//! Cancellation and deadlines threaded through every store call.

use crate::error::{KvError, KvResult};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Longest single sleep while waiting, so cancellation is noticed promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// A cancellation signal with an optional deadline.
///
/// Contexts form a tree: a child is cancelled when its parent is, and
/// inherits the parent's deadline unless it sets an earlier one. Cloning
/// is cheap and clones share the same signal.
///
/// Cancelling a context never rolls anything back. Operations that observe
/// it return [`KvError::Cancelled`] or [`KvError::DeadlineExceeded`], and the
/// caller still owns cleanup of its snapshot or transaction.
///
/// ```
/// use unikv_storage::Context;
///
/// let root = Context::background();
/// let child = root.child();
/// root.cancel();
/// assert!(child.check().unwrap_err().is_cancelled());
/// ```
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
    parent: Option<Context>,
}

impl Context {
    /// Returns a root context that is never cancelled on its own.
    #[must_use]
    pub fn background() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                deadline: None,
                parent: None,
            }),
        }
    }

    /// Returns a child that can be cancelled without affecting `self`.
    #[must_use]
    pub fn child(&self) -> Self {
        self.derive(self.deadline())
    }

    /// Returns a child whose deadline is `timeout` from now.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.child(),
        }
    }

    /// Returns a child with the given deadline, or the inherited one if it
    /// is earlier.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline() {
            Some(inherited) => inherited.min(deadline),
            None => deadline,
        };
        self.derive(Some(deadline))
    }

    fn derive(&self, deadline: Option<Instant>) -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                deadline,
                parent: Some(self.clone()),
            }),
        }
    }

    /// Cancels this context and every context derived from it.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true if this context or an ancestor was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        let mut current = Some(self);
        while let Some(ctx) = current {
            if ctx.inner.cancelled.load(Ordering::SeqCst) {
                return true;
            }
            current = ctx.inner.parent.as_ref();
        }
        false
    }

    /// Returns the effective deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Returns the time left before the deadline, if any.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline()
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Fails if the context is cancelled or past its deadline.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::Cancelled`] or [`KvError::DeadlineExceeded`].
    pub fn check(&self) -> KvResult<()> {
        if self.is_cancelled() {
            return Err(KvError::Cancelled);
        }
        if let Some(deadline) = self.deadline() {
            if Instant::now() >= deadline {
                return Err(KvError::DeadlineExceeded);
            }
        }
        Ok(())
    }

    /// Sleeps for `duration`, waking early if the context ends.
    ///
    /// # Errors
    ///
    /// Returns the cancellation error if the context ends first.
    pub fn sleep(&self, duration: Duration) -> KvResult<()> {
        self.check()?;
        // past the end of representable time: sleep until the context ends
        let Some(until) = Instant::now().checked_add(duration) else {
            loop {
                thread::sleep(SLEEP_SLICE);
                self.check()?;
            }
        };
        loop {
            self.check()?;
            let now = Instant::now();
            if now >= until {
                return Ok(());
            }
            thread::sleep((until - now).min(SLEEP_SLICE));
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("cancelled", &self.is_cancelled())
            .field("deadline", &self.deadline())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_is_live() {
        let ctx = Context::background();
        assert!(ctx.check().is_ok());
        assert!(ctx.deadline().is_none());
    }

    #[test]
    fn cancel_propagates_down_not_up() {
        let parent = Context::background();
        let child = parent.child();
        let grandchild = child.child();

        child.cancel();
        assert!(parent.check().is_ok());
        assert!(matches!(child.check(), Err(KvError::Cancelled)));
        assert!(matches!(grandchild.check(), Err(KvError::Cancelled)));
    }

    #[test]
    fn clones_share_the_signal() {
        let ctx = Context::background();
        let clone = ctx.clone();
        clone.cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn expired_deadline_reported() {
        let ctx = Context::background().with_timeout(Duration::ZERO);
        assert!(matches!(ctx.check(), Err(KvError::DeadlineExceeded)));
    }

    #[test]
    fn child_keeps_earlier_parent_deadline() {
        let parent = Context::background().with_timeout(Duration::from_millis(5));
        let child = parent.with_timeout(Duration::from_secs(3600));
        assert_eq!(child.deadline(), parent.deadline());
    }

    #[test]
    fn sleep_stops_on_cancel() {
        let ctx = Context::background();
        let canceller = ctx.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            canceller.cancel();
        });
        let started = Instant::now();
        let result = ctx.sleep(Duration::from_secs(30));
        handle.join().unwrap();
        assert!(matches!(result, Err(KvError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn unrepresentable_sleep_ends_with_context() {
        let cancelled = Context::background();
        cancelled.cancel();
        assert!(matches!(cancelled.sleep(Duration::MAX), Err(KvError::Cancelled)));

        let ctx = Context::background();
        let canceller = ctx.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            canceller.cancel();
        });
        let result = ctx.sleep(Duration::MAX);
        handle.join().unwrap();
        assert!(matches!(result, Err(KvError::Cancelled)));
    }
}
