//! Per-document conflict resolution.
//!
//! A [`ConflictResolver`] owns the version counter of exactly one document.
//! Changes declared against the current version apply directly. A change
//! declared one version back, against the same base as the operation that was
//! just accepted, is concurrent with it and goes through the configured
//! [`ConflictStrategy`]. Everything older is stale; anything newer was never
//! issued.
//!
//! ```text
//! version 0 ──A(base 0)──▶ version 1 ──B(base 0)──▶ strategy(A, B)
//!                                                    ├─ A wins ─▶ B rejected (stale)
//!                                                    └─ B wins ─▶ B rebased to base 1 ─▶ version 2
//! ```

use std::{fmt, sync::Arc, time::Duration};

use tandem_shared::operation::Operation;
use thiserror::Error;
use tokio::sync::oneshot;

pub const DEFAULT_MANUAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Rejections; the caller re-fetches the current version and resubmits
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("change is based on version {base} but the document is at {current}")]
    StaleVersion { base: u64, current: u64 },

    #[error("change is based on version {base} which the document (at {current}) never reached")]
    FutureVersion { base: u64, current: u64 },

    #[error("conflicting change was rejected by the manual resolver (document at {current})")]
    UnresolvedConflict { current: u64 },
}

impl ResolveError {
    pub fn current_version(&self) -> u64 {
        match self {
            ResolveError::StaleVersion { current, .. }
            | ResolveError::FutureVersion { current, .. }
            | ResolveError::UnresolvedConflict { current } => *current,
        }
    }
}

/// Combines two concurrent operations. `None` declines, falling back to
/// last-write-wins.
pub trait MergeFn: Send + Sync {
    fn merge(&self, applied: &Operation, incoming: &Operation) -> Option<Operation>;
}

impl<F> MergeFn for F
where
    F: Fn(&Operation, &Operation) -> Option<Operation> + Send + Sync,
{
    fn merge(&self, applied: &Operation, incoming: &Operation) -> Option<Operation> {
        self(applied, incoming)
    }
}

/// Receives conflicts that need a human (or external) decision.
///
/// Implementations must not block; stash or forward the ticket and answer it
/// later through [`PendingConflict::resolve`] / [`PendingConflict::reject`].
pub trait ManualConflictHandler: Send + Sync {
    fn on_conflict(&self, conflict: PendingConflict);
}

impl<F> ManualConflictHandler for F
where
    F: Fn(PendingConflict) + Send + Sync,
{
    fn on_conflict(&self, conflict: PendingConflict) {
        self(conflict)
    }
}

/// A conflict awaiting a manual decision
pub struct PendingConflict {
    pub applied: Operation,
    pub incoming: Operation,
    reply: oneshot::Sender<Option<Operation>>,
}

impl PendingConflict {
    /// Apply `operation` as the winner
    pub fn resolve(self, operation: Operation) {
        let _ = self.reply.send(Some(operation));
    }

    /// Keep the applied operation and reject the incoming one
    pub fn reject(self) {
        let _ = self.reply.send(None);
    }
}

impl fmt::Debug for PendingConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingConflict")
            .field("applied", &self.applied)
            .field("incoming", &self.incoming)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Default)]
pub enum ConflictStrategy {
    #[default]
    LastWriteWins,
    CustomMerge(Arc<dyn MergeFn>),
    Manual {
        handler: Arc<dyn ManualConflictHandler>,
        timeout: Duration,
    },
}

impl ConflictStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            ConflictStrategy::LastWriteWins => "last_write_wins",
            ConflictStrategy::CustomMerge(_) => "custom_merge",
            ConflictStrategy::Manual { .. } => "manual",
        }
    }
}

impl fmt::Debug for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictStrategy::Manual { timeout, .. } => f
                .debug_struct("Manual")
                .field("timeout", timeout)
                .finish_non_exhaustive(),
            other => f.write_str(other.name()),
        }
    }
}

enum Outcome {
    KeepApplied,
    Apply(Operation),
    Rejected,
}

/// Version authority for a single document
#[derive(Debug)]
pub struct ConflictResolver {
    version: u64,
    last_applied: Option<Operation>,
    strategy: ConflictStrategy,
}

impl ConflictResolver {
    pub fn new(strategy: ConflictStrategy) -> Self {
        Self {
            version: 0,
            last_applied: None,
            strategy,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn strategy(&self) -> &ConflictStrategy {
        &self.strategy
    }

    /// Consider one change. Every `Ok` advances the version by exactly one and
    /// returns the operation that was actually applied.
    pub async fn receive_change(&mut self, change: Operation) -> Result<Operation, ResolveError> {
        let current = self.version;
        let base = change.base_version;

        if base > current {
            return Err(ResolveError::FutureVersion { base, current });
        }
        if base == current {
            return Ok(self.apply(change));
        }

        let applied = match &self.last_applied {
            Some(applied) if base + 1 == current && applied.base_version == base => {
                applied.clone()
            }
            _ => return Err(ResolveError::StaleVersion { base, current }),
        };

        tracing::debug!(
            "Conflict at base version {} between '{}' and '{}' ({})",
            base,
            applied.user_id,
            change.user_id,
            self.strategy.name()
        );

        // The manual path suspends; the caller serializes access per document
        // so the version cannot move underneath us.
        match self.decide(&applied, change).await {
            Outcome::Apply(winner) if winner != applied => Ok(self.apply(winner)),
            Outcome::Apply(_) | Outcome::KeepApplied => {
                Err(ResolveError::StaleVersion { base, current })
            }
            Outcome::Rejected => Err(ResolveError::UnresolvedConflict { current }),
        }
    }

    fn apply(&mut self, operation: Operation) -> Operation {
        let applied = operation.rebased(self.version);
        self.version += 1;
        self.last_applied = Some(applied.clone());
        applied
    }

    async fn decide(&self, applied: &Operation, incoming: Operation) -> Outcome {
        match &self.strategy {
            ConflictStrategy::LastWriteWins => last_write_wins(applied, incoming),
            ConflictStrategy::CustomMerge(merge) => match merge.merge(applied, &incoming) {
                Some(merged) => Outcome::Apply(merged),
                None => last_write_wins(applied, incoming),
            },
            ConflictStrategy::Manual { handler, timeout } => {
                let (tx, rx) = oneshot::channel();
                handler.on_conflict(PendingConflict {
                    applied: applied.clone(),
                    incoming: incoming.clone(),
                    reply: tx,
                });
                match tokio::time::timeout(*timeout, rx).await {
                    Ok(Ok(Some(resolved))) => Outcome::Apply(resolved),
                    Ok(Ok(None)) => Outcome::Rejected,
                    Ok(Err(_)) => {
                        tracing::warn!("Manual conflict ticket dropped, using last-write-wins");
                        last_write_wins(applied, incoming)
                    }
                    Err(_) => {
                        tracing::warn!(
                            "Manual conflict resolution timed out after {:?}, using last-write-wins",
                            timeout
                        );
                        last_write_wins(applied, incoming)
                    }
                }
            }
        }
    }
}

/// Later timestamp wins; equal timestamps fall back to the greater user id
fn last_write_wins(applied: &Operation, incoming: Operation) -> Outcome {
    let incoming_key = (incoming.timestamp, incoming.user_id.as_str());
    let applied_key = (applied.timestamp, applied.user_id.as_str());
    if incoming_key > applied_key {
        Outcome::Apply(incoming)
    } else {
        Outcome::KeepApplied
    }
}
