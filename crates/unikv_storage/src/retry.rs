//! Commit confirmation for backends whose transport can lose replies.
//!
//! A remote commit that times out may still have been applied on the other
//! side. Reporting that as a failure would make a caller retry work that
//! already happened, so adapters route their commit through
//! [`confirm_commit`]: it keeps probing until the outcome is known.

use crate::config::RetryConfig;
use crate::context::Context;
use crate::error::{KvError, KvResult};
use tracing::{debug, warn};

/// Result of sending a commit.
#[derive(Debug)]
pub enum CommitAttempt {
    /// The backend acknowledged the commit.
    Committed,
    /// The backend definitely did not apply the commit.
    Rejected(KvError),
    /// The commit was sent but no reliable answer came back.
    Unknown(KvError),
}

/// Answer of a confirmation probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStatus {
    /// The commit's writes are durable.
    Applied,
    /// The commit will never be applied.
    NotApplied,
    /// The backend cannot tell yet.
    Unknown,
}

/// Sends a commit and resolves an uncertain outcome.
///
/// `attempt` performs the commit once. If it reports
/// [`CommitAttempt::Unknown`], `confirm` is polled on the `retry` schedule
/// until it answers [`CommitStatus::Applied`] (success) or
/// [`CommitStatus::NotApplied`] (the original error is returned). Probe
/// errors are treated as "cannot tell yet".
///
/// # Errors
///
/// Any error except [`KvError::CommitUnconfirmed`] means the commit was not
/// applied. `CommitUnconfirmed` is returned only when the context ends or the
/// attempt budget runs out before the outcome is known.
pub fn confirm_commit<A, C>(
    ctx: &Context,
    retry: &RetryConfig,
    attempt: A,
    mut confirm: C,
) -> KvResult<()>
where
    A: FnOnce(&Context) -> CommitAttempt,
    C: FnMut(&Context) -> KvResult<CommitStatus>,
{
    let cause = match attempt(ctx) {
        CommitAttempt::Committed => return Ok(()),
        CommitAttempt::Rejected(err) => return Err(err),
        CommitAttempt::Unknown(err) => err,
    };
    debug!(error = %cause, "commit outcome unknown, confirming");

    let mut probe = 0u32;
    loop {
        probe = probe.saturating_add(1);
        if !retry.allows(probe) {
            warn!(probes = probe - 1, error = %cause, "gave up confirming commit");
            return Err(KvError::commit_unconfirmed(format!(
                "no answer after {} probes: {cause}",
                probe - 1
            )));
        }
        if let Err(err) = ctx.sleep(retry.delay_for_attempt(probe)) {
            return Err(KvError::commit_unconfirmed(format!("{err} while confirming: {cause}")));
        }
        match confirm(ctx) {
            Ok(CommitStatus::Applied) => {
                debug!(probes = probe, "commit confirmed applied");
                return Ok(());
            }
            Ok(CommitStatus::NotApplied) => {
                debug!(probes = probe, "commit confirmed not applied");
                return Err(cause);
            }
            Ok(CommitStatus::Unknown) => {}
            Err(err) if err.is_cancelled() => {
                return Err(KvError::commit_unconfirmed(format!(
                    "{err} while confirming: {cause}"
                )));
            }
            Err(err) => debug!(probe, error = %err, "confirmation probe failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast() -> RetryConfig {
        RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(2))
    }

    fn lost_reply() -> KvError {
        KvError::backend("reply timed out")
    }

    #[test]
    fn acknowledged_commit_needs_no_probe() {
        let ctx = Context::background();
        let mut probes = 0;
        confirm_commit(&ctx, &fast(), |_| CommitAttempt::Committed, |_| {
            probes += 1;
            Ok(CommitStatus::Unknown)
        })
        .unwrap();
        assert_eq!(probes, 0);
    }

    #[test]
    fn rejected_commit_returns_its_error() {
        let ctx = Context::background();
        let err = confirm_commit(
            &ctx,
            &fast(),
            |_| CommitAttempt::Rejected(KvError::conflict(b"k".to_vec())),
            |_| Ok(CommitStatus::Applied),
        )
        .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn lost_reply_for_applied_commit_is_success() {
        let ctx = Context::background();
        let mut answers = vec![
            Ok(CommitStatus::Applied),
            Err(KvError::backend("probe failed")),
            Ok(CommitStatus::Unknown),
        ];
        confirm_commit(
            &ctx,
            &fast(),
            |_| CommitAttempt::Unknown(lost_reply()),
            |_| answers.pop().unwrap(),
        )
        .unwrap();
        assert!(answers.is_empty());
    }

    #[test]
    fn lost_reply_for_dropped_commit_is_original_error() {
        let ctx = Context::background();
        let err = confirm_commit(
            &ctx,
            &fast(),
            |_| CommitAttempt::Unknown(lost_reply()),
            |_| Ok(CommitStatus::NotApplied),
        )
        .unwrap_err();
        assert!(matches!(err, KvError::Backend(_)));
    }

    #[test]
    fn exhausted_budget_is_unconfirmed() {
        let ctx = Context::background();
        let mut probes = 0;
        let err = confirm_commit(
            &ctx,
            &fast(),
            |_| CommitAttempt::Unknown(lost_reply()),
            |_| {
                probes += 1;
                Ok(CommitStatus::Unknown)
            },
        )
        .unwrap_err();
        assert!(matches!(err, KvError::CommitUnconfirmed { .. }));
        assert_eq!(probes, 5);
    }

    #[test]
    fn cancelled_context_is_unconfirmed() {
        let ctx = Context::background();
        ctx.cancel();
        let err = confirm_commit(
            &ctx,
            &RetryConfig::unbounded(),
            |_| CommitAttempt::Unknown(lost_reply()),
            |_| Ok(CommitStatus::Unknown),
        )
        .unwrap_err();
        assert!(matches!(err, KvError::CommitUnconfirmed { .. }));
    }

    #[test]
    fn huge_backoff_on_cancelled_context_is_unconfirmed() {
        let ctx = Context::background();
        ctx.cancel();
        let retry = RetryConfig::unbounded()
            .with_initial_delay(Duration::MAX)
            .with_max_delay(Duration::MAX);
        let err = confirm_commit(
            &ctx,
            &retry,
            |_| CommitAttempt::Unknown(lost_reply()),
            |_| Ok(CommitStatus::Applied),
        )
        .unwrap_err();
        assert!(matches!(err, KvError::CommitUnconfirmed { .. }));
    }
}
