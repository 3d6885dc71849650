//! Fault injection for backends.
//!
//! [`FaultyDatabase`] wraps any [`Database`] and can fail the Nth `set`,
//! fail the Nth commit, or lose the reply of the Nth commit. Lost replies go
//! through [`confirm_commit`], the same path a remote adapter uses, so tests
//! can check that a commit is never reported as failed once it landed.
//!
//! ## Usage
//!
//! ```rust
//! use unikv_storage::{Context, MemoryDatabase};
//! use unikv_testkit::faults::FaultyDatabase;
//!
//! let db = FaultyDatabase::new(MemoryDatabase::new());
//! db.fail_commit_at(2);
//! let stream = unikv_testkit::fixtures::record_stream([("a", "1"), ("b", "2"), ("c", "3")]);
//! let ctx = Context::background();
//! let err = unikv_core::restore(&ctx, &db, &stream[..], 1).unwrap_err();
//! assert!(!err.is_conflict());
//! assert_eq!(db.inner().len(), 1);
//! ```

use std::cell::Cell;
use std::io::Read;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use unikv_storage::{
    confirm_commit, CommitAttempt, CommitStatus, Context, Database, Deleter, Getter, KvError,
    KvIter, KvResult, Ranger, RetryConfig, Scanner, Setter, Transaction, ValueReader,
};

const NEVER: u64 = u64::MAX;

/// How a scheduled commit fault behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommitFault {
    /// Rejected without being applied.
    Fail,
    /// Applied, but the acknowledgement never arrives.
    LoseReply,
    /// Never applied, and no answer arrives either.
    LoseRequest,
}

/// Counters of what went through a [`FaultyDatabase`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultStats {
    /// `set` calls, failed ones included.
    pub sets: u64,
    /// Commits that returned success.
    pub commits: u64,
    /// Commits that returned an error.
    pub failed_commits: u64,
    /// Rollbacks that returned success.
    pub rollbacks: u64,
    /// Commits whose reply was lost and had to be confirmed.
    pub unacknowledged: u64,
}

#[derive(Debug)]
struct FaultState {
    fail_set_at: AtomicU64,
    fail_commit_at: AtomicU64,
    lose_reply_at: AtomicU64,
    lose_request_at: AtomicU64,
    unknown_probes: AtomicU32,
    sets: AtomicU64,
    commit_calls: AtomicU64,
    commits: AtomicU64,
    failed_commits: AtomicU64,
    rollbacks: AtomicU64,
    unacknowledged: AtomicU64,
    retry: RetryConfig,
}

impl FaultState {
    fn new(retry: RetryConfig) -> Self {
        Self {
            fail_set_at: AtomicU64::new(NEVER),
            fail_commit_at: AtomicU64::new(NEVER),
            lose_reply_at: AtomicU64::new(NEVER),
            lose_request_at: AtomicU64::new(NEVER),
            unknown_probes: AtomicU32::new(0),
            sets: AtomicU64::new(0),
            commit_calls: AtomicU64::new(0),
            commits: AtomicU64::new(0),
            failed_commits: AtomicU64::new(0),
            rollbacks: AtomicU64::new(0),
            unacknowledged: AtomicU64::new(0),
            retry,
        }
    }

    fn commit_fault(&self, call: u64) -> Option<CommitFault> {
        if call == self.fail_commit_at.load(Ordering::SeqCst) {
            Some(CommitFault::Fail)
        } else if call == self.lose_reply_at.load(Ordering::SeqCst) {
            Some(CommitFault::LoseReply)
        } else if call == self.lose_request_at.load(Ordering::SeqCst) {
            Some(CommitFault::LoseRequest)
        } else {
            None
        }
    }
}

/// A database wrapper that injects failures on a schedule.
///
/// Call numbers are 1-based and counted across every transaction of the
/// database. Snapshots are passed through untouched.
#[derive(Debug, Clone)]
pub struct FaultyDatabase<D> {
    inner: D,
    state: Arc<FaultState>,
}

impl<D: Database> FaultyDatabase<D> {
    /// Wraps `inner` with no faults scheduled.
    pub fn new(inner: D) -> Self {
        let retry = RetryConfig::new(16)
            .with_initial_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(4));
        Self::with_retry(inner, retry)
    }

    /// Wraps `inner`, confirming lost commit replies on the `retry` schedule.
    pub fn with_retry(inner: D, retry: RetryConfig) -> Self {
        Self {
            inner,
            state: Arc::new(FaultState::new(retry)),
        }
    }

    /// The wrapped database.
    pub fn inner(&self) -> &D {
        &self.inner
    }

    /// Makes the `n`th `set` fail.
    pub fn fail_set_at(&self, n: u64) {
        self.state.fail_set_at.store(n, Ordering::SeqCst);
    }

    /// Makes the `n`th commit fail without applying anything.
    pub fn fail_commit_at(&self, n: u64) {
        self.state.fail_commit_at.store(n, Ordering::SeqCst);
    }

    /// Applies the `n`th commit but loses its acknowledgement.
    pub fn lose_commit_reply_at(&self, n: u64) {
        self.state.lose_reply_at.store(n, Ordering::SeqCst);
    }

    /// Drops the `n`th commit on the floor and loses its reply.
    pub fn lose_commit_request_at(&self, n: u64) {
        self.state.lose_request_at.store(n, Ordering::SeqCst);
    }

    /// Number of confirmation probes answered with "unknown" before the
    /// real outcome of a lost commit is revealed.
    pub fn set_unknown_probes(&self, probes: u32) {
        self.state.unknown_probes.store(probes, Ordering::SeqCst);
    }

    /// Clears every scheduled fault and counter.
    pub fn reset(&self) {
        let state = &self.state;
        for at in [
            &state.fail_set_at,
            &state.fail_commit_at,
            &state.lose_reply_at,
            &state.lose_request_at,
        ] {
            at.store(NEVER, Ordering::SeqCst);
        }
        state.unknown_probes.store(0, Ordering::SeqCst);
        for counter in [
            &state.sets,
            &state.commit_calls,
            &state.commits,
            &state.failed_commits,
            &state.rollbacks,
            &state.unacknowledged,
        ] {
            counter.store(0, Ordering::SeqCst);
        }
    }

    /// Current counters.
    pub fn stats(&self) -> FaultStats {
        let state = &self.state;
        FaultStats {
            sets: state.sets.load(Ordering::SeqCst),
            commits: state.commits.load(Ordering::SeqCst),
            failed_commits: state.failed_commits.load(Ordering::SeqCst),
            rollbacks: state.rollbacks.load(Ordering::SeqCst),
            unacknowledged: state.unacknowledged.load(Ordering::SeqCst),
        }
    }
}

impl<D: Database> Database for FaultyDatabase<D> {
    type Transaction = FaultyTransaction<D::Transaction>;
    type Snapshot = D::Snapshot;

    fn new_transaction(&self, ctx: &Context) -> KvResult<Self::Transaction> {
        Ok(FaultyTransaction {
            inner: self.inner.new_transaction(ctx)?,
            state: Arc::clone(&self.state),
        })
    }

    fn new_snapshot(&self, ctx: &Context) -> KvResult<Self::Snapshot> {
        self.inner.new_snapshot(ctx)
    }
}

/// Transaction handle of a [`FaultyDatabase`].
#[derive(Debug)]
pub struct FaultyTransaction<T> {
    inner: T,
    state: Arc<FaultState>,
}

impl<T: Transaction> FaultyTransaction<T> {
    fn send_commit(&mut self, ctx: &Context, fault: Option<CommitFault>) -> KvResult<()> {
        let applied = Cell::new(false);
        let state = &self.state;
        let inner = &mut self.inner;

        let attempt = |ctx: &Context| match fault {
            None => match inner.commit(ctx) {
                Ok(()) => CommitAttempt::Committed,
                Err(err) => CommitAttempt::Rejected(err),
            },
            Some(CommitFault::Fail) => {
                let _ = inner.rollback(ctx);
                CommitAttempt::Rejected(KvError::backend("injected commit failure"))
            }
            Some(CommitFault::LoseReply) => match inner.commit(ctx) {
                Ok(()) => {
                    applied.set(true);
                    CommitAttempt::Unknown(KvError::backend("injected lost commit reply"))
                }
                Err(err) => CommitAttempt::Rejected(err),
            },
            Some(CommitFault::LoseRequest) => {
                let _ = inner.rollback(ctx);
                CommitAttempt::Unknown(KvError::backend("injected lost commit request"))
            }
        };

        let mut probes = 0u32;
        let confirm = |_: &Context| {
            probes += 1;
            if probes <= state.unknown_probes.load(Ordering::SeqCst) {
                return Ok(CommitStatus::Unknown);
            }
            Ok(if applied.get() {
                CommitStatus::Applied
            } else {
                CommitStatus::NotApplied
            })
        };

        confirm_commit(ctx, &state.retry, attempt, confirm)
    }
}

impl<T: Getter> Getter for FaultyTransaction<T> {
    fn get(&self, ctx: &Context, key: &[u8]) -> KvResult<ValueReader> {
        self.inner.get(ctx, key)
    }
}

impl<T: Setter> Setter for FaultyTransaction<T> {
    fn set(&mut self, ctx: &Context, key: &[u8], value: &mut dyn Read) -> KvResult<()> {
        let call = self.state.sets.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.state.fail_set_at.load(Ordering::SeqCst) {
            return Err(KvError::backend(format!("injected failure on set #{call}")));
        }
        self.inner.set(ctx, key, value)
    }
}

impl<T: Deleter> Deleter for FaultyTransaction<T> {
    fn delete(&mut self, ctx: &Context, key: &[u8]) -> KvResult<()> {
        self.inner.delete(ctx, key)
    }
}

impl<T: Ranger> Ranger for FaultyTransaction<T> {
    fn ascend(&self, ctx: &Context, begin: &[u8], end: &[u8]) -> KvIter<'_> {
        self.inner.ascend(ctx, begin, end)
    }

    fn descend(&self, ctx: &Context, begin: &[u8], end: &[u8]) -> KvIter<'_> {
        self.inner.descend(ctx, begin, end)
    }
}

impl<T: Scanner> Scanner for FaultyTransaction<T> {
    fn scan(&self, ctx: &Context) -> KvIter<'_> {
        self.inner.scan(ctx)
    }
}

impl<T: Transaction> Transaction for FaultyTransaction<T> {
    fn rollback(&mut self, ctx: &Context) -> KvResult<()> {
        self.inner.rollback(ctx)?;
        self.state.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn commit(&mut self, ctx: &Context) -> KvResult<()> {
        let call = self.state.commit_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let fault = self.state.commit_fault(call);
        if matches!(fault, Some(CommitFault::LoseReply | CommitFault::LoseRequest)) {
            self.state.unacknowledged.fetch_add(1, Ordering::SeqCst);
        }

        let result = self.send_commit(ctx, fault);
        let counter = if result.is_ok() {
            &self.state.commits
        } else {
            &self.state.failed_commits
        };
        counter.fetch_add(1, Ordering::SeqCst);
        result
    }
}
