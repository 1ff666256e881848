//! One [`ConflictResolver`] per room, created on the first edit.
//!
//! Each resolver sits behind its own lock, so edits to one document are
//! considered strictly one at a time (including while a manual handler is
//! deciding) while other documents proceed independently.
//!
//! This is the process's document authority: a resolver lives as long as the
//! process, also after every member has left, because dropping it would reset
//! the room to version 0 under clients still holding later versions. Memory
//! grows with the number of distinct rooms ever edited (one version counter
//! and the last accepted operation each).

use std::{collections::HashMap, sync::Arc};

use tandem_shared::operation::Operation;
use tokio::sync::Mutex;

use crate::domain::{ConflictResolver, ConflictStrategy, ResolveError, RoomId};

pub struct DocumentVersions {
    strategy: ConflictStrategy,
    resolvers: Mutex<HashMap<RoomId, Arc<Mutex<ConflictResolver>>>>,
}

impl DocumentVersions {
    pub fn new(strategy: ConflictStrategy) -> Self {
        Self {
            strategy,
            resolvers: Mutex::new(HashMap::new()),
        }
    }

    async fn resolver_for(&self, room_id: &RoomId) -> Arc<Mutex<ConflictResolver>> {
        let mut resolvers = self.resolvers.lock().await;
        resolvers
            .entry(room_id.clone())
            .or_insert_with(|| {
                tracing::debug!(
                    "Created {} resolver for room '{}'",
                    self.strategy.name(),
                    room_id
                );
                Arc::new(Mutex::new(ConflictResolver::new(self.strategy.clone())))
            })
            .clone()
    }

    /// Run `changes` through the room's resolver in order.
    ///
    /// Stops at the first rejection; the operations accepted before it are
    /// returned alongside the error since they already advanced the version.
    pub async fn apply(
        &self,
        room_id: &RoomId,
        changes: Vec<Operation>,
    ) -> (Vec<Operation>, Option<ResolveError>) {
        let resolver = self.resolver_for(room_id).await;
        let mut resolver = resolver.lock().await;

        let mut applied = Vec::with_capacity(changes.len());
        for change in changes {
            match resolver.receive_change(change).await {
                Ok(operation) => applied.push(operation),
                Err(e) => {
                    tracing::debug!("Change for room '{}' rejected: {}", room_id, e);
                    return (applied, Some(e));
                }
            }
        }
        (applied, None)
    }

    /// `None` until the room has seen an edit
    pub async fn version_of(&self, room_id: &RoomId) -> Option<u64> {
        let resolver = self.resolvers.lock().await.get(room_id).cloned()?;
        let version = resolver.lock().await.version();
        Some(version)
    }
}
