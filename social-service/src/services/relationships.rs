use std::sync::Arc;
use std::time::Duration;

use crate::models::{Identity, PairKey, RelationshipState, RelationshipView};
use crate::services::{
    bounded, metrics,
    state_machine::{plan, Action, Transition},
    RelationshipStore, ServiceError,
};

/// How many times a transition is re-planned after losing a compare-and-set race.
const MAX_ATTEMPTS: usize = 3;

const STORE: &str = "relationship";

/// Applies friendship transitions through a [`RelationshipStore`].
///
/// Each operation reads the pair, plans the transition from the actor's point
/// of view and writes it with a compare-and-set conditioned on what was read.
/// A lost race re-reads and re-plans, so the caller sees the error the
/// winning write makes true (e.g. a second accept reports `NotPending`).
#[derive(Clone)]
pub struct RelationshipService {
    store: Arc<dyn RelationshipStore>,
    store_timeout: Duration,
}

impl RelationshipService {
    pub fn new(store: Arc<dyn RelationshipStore>, store_timeout: Duration) -> Self {
        Self {
            store,
            store_timeout,
        }
    }

    pub fn store(&self) -> &Arc<dyn RelationshipStore> {
        &self.store
    }

    /// Send a friend request from `actor` to `other`.
    pub async fn request_link(&self, actor: &Identity, other: &Identity) -> Result<(), ServiceError> {
        self.apply(Action::Request, actor, other).await
    }

    /// Accept the pending request `other` sent to `actor`.
    pub async fn accept_link(&self, actor: &Identity, other: &Identity) -> Result<(), ServiceError> {
        self.apply(Action::Accept, actor, other).await
    }

    /// Discard the pending request `other` sent to `actor`; a no-op when
    /// there is none.
    pub async fn reject_link(&self, actor: &Identity, other: &Identity) -> Result<(), ServiceError> {
        self.apply(Action::Reject, actor, other).await
    }

    /// End a friendship on both sides.
    pub async fn unlink(&self, actor: &Identity, other: &Identity) -> Result<(), ServiceError> {
        self.apply(Action::Unlink, actor, other).await
    }

    pub async fn block(&self, actor: &Identity, other: &Identity) -> Result<(), ServiceError> {
        self.apply(Action::Block, actor, other).await
    }

    pub async fn unblock(&self, actor: &Identity, other: &Identity) -> Result<(), ServiceError> {
        self.apply(Action::Unblock, actor, other).await
    }

    /// True when `other` has blocked `actor`.
    pub async fn is_access_blocked(
        &self,
        actor: &Identity,
        other: &Identity,
    ) -> Result<bool, ServiceError> {
        let key = Self::key(actor, other)?;
        let record = bounded(self.store_timeout, STORE, self.store.fetch(&key)).await?;
        Ok(record.state_from(other) == RelationshipState::Blocked)
    }

    /// The relationship as `actor` sees it.
    pub async fn view(
        &self,
        actor: &Identity,
        other: &Identity,
    ) -> Result<RelationshipView, ServiceError> {
        let key = Self::key(actor, other)?;
        let record = bounded(self.store_timeout, STORE, self.store.fetch(&key)).await?;
        Ok(record.view_from(actor))
    }

    fn key(actor: &Identity, other: &Identity) -> Result<PairKey, ServiceError> {
        PairKey::new(actor, other).ok_or(ServiceError::InvalidTarget)
    }

    async fn apply(
        &self,
        action: Action,
        actor: &Identity,
        other: &Identity,
    ) -> Result<(), ServiceError> {
        let result = self.try_apply(action, actor, other).await;
        let outcome = match &result {
            Ok(()) => "ok",
            Err(e) => e.kind(),
        };
        metrics::record_transition(action.as_str(), outcome);
        match &result {
            Ok(()) => tracing::info!(
                action = action.as_str(),
                actor = %actor,
                other = %other,
                "Relationship transition applied"
            ),
            Err(e) => tracing::debug!(
                action = action.as_str(),
                actor = %actor,
                other = %other,
                error = %e,
                "Relationship transition rejected"
            ),
        }
        result
    }

    async fn try_apply(
        &self,
        action: Action,
        actor: &Identity,
        other: &Identity,
    ) -> Result<(), ServiceError> {
        let key = Self::key(actor, other)?;

        for attempt in 1..=MAX_ATTEMPTS {
            let record = bounded(self.store_timeout, STORE, self.store.fetch(&key)).await?;
            let (forward, backward) = record.sides(actor);

            let written = match plan(action, forward, backward)? {
                Transition::Noop => return Ok(()),
                Transition::Forward { expected, new } => {
                    let write = self.store.cas_set(actor, other, expected, new);
                    bounded(self.store_timeout, STORE, write).await?
                }
                Transition::Backward { expected, new } => {
                    let write = self.store.cas_set(other, actor, expected, new);
                    bounded(self.store_timeout, STORE, write).await?
                }
                Transition::Pair { expected, new } => {
                    let write = self.store.set_pair(actor, other, expected, new);
                    bounded(self.store_timeout, STORE, write).await?
                }
            };

            if written {
                return Ok(());
            }
            tracing::debug!(
                action = action.as_str(),
                attempt,
                "Relationship changed concurrently, re-planning"
            );
        }

        tracing::warn!(
            action = action.as_str(),
            actor = %actor,
            other = %other,
            "Relationship transition kept losing races"
        );
        Err(ServiceError::StoreUnavailable)
    }
}
