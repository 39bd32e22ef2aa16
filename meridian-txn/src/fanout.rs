//! Prepare, commit, and abort fan-out: parallel per-participant RPCs with bounded retry and
//! cooperative cancellation.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use meridian_core::ShardId;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, TransportError};
use crate::transport::{PrepareVote, ShardTransport};
use crate::types::{Decision, TxnId};

/// Drives `prepareTransaction` on every participant in parallel. Any abort vote — explicit
/// or an abort-safe `ShardNotFound`/`NoSuchTransaction` — cancels the remaining outstanding
/// prepares and decides abort. All-commit decides commit at the max prepare timestamp.
/// Exceeding the outer deadline is itself treated as an abort decision.
pub async fn prepare_fanout(
    transport: &Arc<dyn ShardTransport>,
    id: &TxnId,
    participants: &[ShardId],
    config: &CoordinatorConfig,
    cancel: &CancellationToken,
) -> Decision {
    let abort_signal = CancellationToken::new();
    let mut set = JoinSet::new();
    for shard in participants.iter().cloned() {
        let transport = transport.clone();
        let id = *id;
        let config = config.clone();
        let abort_signal = abort_signal.clone();
        let cancel = cancel.clone();
        set.spawn(async move { prepare_one(&transport, &shard, &id, &config, &abort_signal, &cancel).await });
    }

    let deadline = tokio::time::sleep(config.prepare_deadline());
    tokio::pin!(deadline);

    let mut commit_votes: Vec<DateTime<Utc>> = Vec::new();
    let mut decided_abort: Option<String> = None;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled(), if decided_abort.is_none() => {
                decided_abort = Some("coordinator cancelled".to_string());
                abort_signal.cancel();
            }
            _ = &mut deadline, if decided_abort.is_none() => {
                warn!(txn = %id, "prepare fan-out exceeded its deadline, deciding abort");
                decided_abort = Some("prepare deadline exceeded".to_string());
                abort_signal.cancel();
            }
            joined = set.join_next() => {
                match joined {
                    None => break,
                    Some(Ok(PrepareVote::Commit { prepare_timestamp })) => commit_votes.push(prepare_timestamp),
                    Some(Ok(PrepareVote::Abort { reason })) => {
                        debug!(txn = %id, %reason, "participant voted abort");
                        decided_abort.get_or_insert(reason);
                        abort_signal.cancel();
                    }
                    Some(Err(join_err)) => {
                        decided_abort.get_or_insert(format!("prepare task failed: {join_err}"));
                        abort_signal.cancel();
                    }
                }
            }
        }
    }

    match decided_abort {
        Some(reason) => Decision::Abort { reason },
        None => Decision::Commit {
            commit_timestamp: commit_votes.into_iter().max().unwrap_or_else(Utc::now),
        },
    }
}

async fn prepare_one(
    transport: &Arc<dyn ShardTransport>,
    shard: &ShardId,
    id: &TxnId,
    config: &CoordinatorConfig,
    abort_signal: &CancellationToken,
    cancel: &CancellationToken,
) -> PrepareVote {
    let mut delay = config.retry_base_delay();
    for attempt in 1..=config.max_retry_attempts {
        tokio::select! {
            biased;
            _ = abort_signal.cancelled() => return PrepareVote::Abort { reason: "cancelled: another participant voted abort".into() },
            _ = cancel.cancelled() => return PrepareVote::Abort { reason: "cancelled by coordinator".into() },
            result = transport.prepare_transaction(shard, id) => {
                match result {
                    Ok(vote) => return vote,
                    Err(e) if e.is_abort_safe_vote() => return PrepareVote::Abort { reason: e.to_string() },
                    Err(e) if e.is_retryable() && attempt < config.max_retry_attempts => {
                        tokio::select! {
                            biased;
                            _ = abort_signal.cancelled() => return PrepareVote::Abort { reason: "cancelled: another participant voted abort".into() },
                            _ = tokio::time::sleep(delay) => {}
                        }
                        delay = delay.saturating_mul(2);
                    }
                    Err(e) => return PrepareVote::Abort { reason: e.to_string() },
                }
            }
        }
    }
    PrepareVote::Abort { reason: format!("exhausted retries preparing {shard}") }
}

/// Sends `commitTransaction`/`abortTransaction` to every participant until each acknowledges.
/// A terminal "already resolved" reply counts as an acknowledgement when it's consistent with
/// the coordinator's own decision — the shard has already durably settled the transaction the
/// same way, so there's nothing further for the coordinator to wait for from it. This fan-out
/// never gives up on retryable errors, because the decision is already durable and the whole
/// point of this phase is to make sure every participant eventually learns it. A `VoteAbort`
/// inconsistent with a `Commit` decision is collected and returned as an invariant violation
/// rather than retried — retrying won't change a participant's already-settled state.
pub async fn decision_fanout(
    transport: &Arc<dyn ShardTransport>,
    id: &TxnId,
    participants: &[ShardId],
    decision: &Decision,
    config: &CoordinatorConfig,
) -> Result<(), CoordinatorError> {
    let mut set = JoinSet::new();
    for shard in participants.iter().cloned() {
        let transport = transport.clone();
        let id = *id;
        let decision = decision.clone();
        let config = config.clone();
        set.spawn(async move { settle_one(&transport, &shard, &id, &decision, &config).await });
    }
    let mut violation = None;
    while let Some(joined) = set.join_next().await {
        if let Ok(Err(e)) = joined {
            violation.get_or_insert(e);
        }
    }
    match violation {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn settle_one(
    transport: &Arc<dyn ShardTransport>,
    shard: &ShardId,
    id: &TxnId,
    decision: &Decision,
    config: &CoordinatorConfig,
) -> Result<(), CoordinatorError> {
    let mut delay = config.retry_base_delay();
    loop {
        let result = match decision {
            Decision::Commit { commit_timestamp } => transport.commit_transaction(shard, id, *commit_timestamp).await,
            Decision::Abort { .. } => transport.abort_transaction(shard, id).await,
        };
        match result {
            Ok(()) => return Ok(()),
            Err(TransportError::VoteAbort(reason)) if !matches!(decision, Decision::Abort { .. }) => {
                error!(txn = %id, shard = %shard, %reason, "participant voted abort against an already-committed decision");
                return Err(CoordinatorError::InvariantViolation { shard: shard.to_string(), reason });
            }
            Err(e) if e.is_ack_equivalent_for(decision) => {
                debug!(txn = %id, shard = %shard, "participant already settled, treating as ack");
                return Ok(());
            }
            Err(e) => {
                warn!(txn = %id, shard = %shard, error = %e, "retrying decision fan-out");
                tokio::time::sleep(delay).await;
                delay = next_delay(delay);
            }
        }
    }
}

fn next_delay(delay: Duration) -> Duration {
    std::cmp::min(delay.saturating_mul(2), Duration::from_secs(30))
}
