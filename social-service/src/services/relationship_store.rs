use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::models::{Identity, PairKey, Relationship, RelationshipState};
use crate::services::ServiceError;

/// Persistence for relationship records, one logical record per unordered
/// pair. Every write is atomic over the whole pair and is refused when it
/// would leave friendship on one side only.
#[async_trait]
pub trait RelationshipStore: Send + Sync {
    /// Both directional states of the pair; never-touched pairs read as `None`.
    async fn fetch(&self, key: &PairKey) -> Result<Relationship, ServiceError>;

    /// State stored at `(from, to)`.
    async fn get(
        &self,
        from: &Identity,
        to: &Identity,
    ) -> Result<RelationshipState, ServiceError> {
        let key = PairKey::new(from, to).ok_or(ServiceError::InvalidTarget)?;
        Ok(self.fetch(&key).await?.state_from(from))
    }

    /// Set `(from, to)` to `new` if it currently holds `expected`.
    async fn cas_set(
        &self,
        from: &Identity,
        to: &Identity,
        expected: RelationshipState,
        new: RelationshipState,
    ) -> Result<bool, ServiceError>;

    /// Set `(a, b)` and `(b, a)` together if both currently hold `expected`.
    async fn set_pair(
        &self,
        a: &Identity,
        b: &Identity,
        expected: (RelationshipState, RelationshipState),
        new: (RelationshipState, RelationshipState),
    ) -> Result<bool, ServiceError>;

    async fn health_check(&self) -> Result<(), ServiceError>;
}

/// Apply a single-side compare-and-set to a locked record.
pub(crate) fn apply_cas(
    record: &mut Relationship,
    from: &Identity,
    expected: RelationshipState,
    new: RelationshipState,
) -> Result<bool, ServiceError> {
    if record.state_from(from) != expected {
        return Ok(false);
    }
    let mut next = record.clone();
    next.set_from(from, new);
    commit(record, next)
}

/// Apply a two-sided compare-and-set to a locked record.
pub(crate) fn apply_pair(
    record: &mut Relationship,
    a: &Identity,
    expected: (RelationshipState, RelationshipState),
    new: (RelationshipState, RelationshipState),
) -> Result<bool, ServiceError> {
    if record.sides(a) != expected {
        return Ok(false);
    }
    let mut next = record.clone();
    next.set_from(a, new.0);
    let b = if a == next.key.low() {
        next.key.high().clone()
    } else {
        next.key.low().clone()
    };
    next.set_from(&b, new.1);
    commit(record, next)
}

fn commit(record: &mut Relationship, mut next: Relationship) -> Result<bool, ServiceError> {
    if !next.is_symmetric() {
        tracing::error!(
            low = %next.key.low(),
            high = %next.key.high(),
            "Rejected write leaving a one-sided friendship"
        );
        return Err(ServiceError::Internal(anyhow::anyhow!(
            "relationship write would break friendship symmetry"
        )));
    }
    next.updated_at = Some(Utc::now());
    *record = next;
    Ok(true)
}

fn pair_key(a: &Identity, b: &Identity) -> Result<PairKey, ServiceError> {
    PairKey::new(a, b).ok_or(ServiceError::InvalidTarget)
}

/// In-process store; a single lock over the pair table serializes writers.
#[derive(Default)]
pub struct MemoryRelationshipStore {
    pairs: Mutex<HashMap<PairKey, Relationship>>,
    latency: Option<Duration>,
}

impl MemoryRelationshipStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call, to simulate a slow backend.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn with_record<T>(
        &self,
        key: PairKey,
        f: impl FnOnce(&mut Relationship) -> Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        let mut pairs = self
            .pairs
            .lock()
            .map_err(|e| anyhow::anyhow!("Relationship store mutex poisoned: {}", e))?;
        let record = pairs
            .entry(key.clone())
            .or_insert_with(|| Relationship::new(key));
        f(record)
    }
}

#[async_trait]
impl RelationshipStore for MemoryRelationshipStore {
    async fn fetch(&self, key: &PairKey) -> Result<Relationship, ServiceError> {
        self.simulate_latency().await;
        let pairs = self
            .pairs
            .lock()
            .map_err(|e| anyhow::anyhow!("Relationship store mutex poisoned: {}", e))?;
        Ok(pairs
            .get(key)
            .cloned()
            .unwrap_or_else(|| Relationship::new(key.clone())))
    }

    async fn cas_set(
        &self,
        from: &Identity,
        to: &Identity,
        expected: RelationshipState,
        new: RelationshipState,
    ) -> Result<bool, ServiceError> {
        self.simulate_latency().await;
        self.with_record(pair_key(from, to)?, |record| {
            apply_cas(record, from, expected, new)
        })
    }

    async fn set_pair(
        &self,
        a: &Identity,
        b: &Identity,
        expected: (RelationshipState, RelationshipState),
        new: (RelationshipState, RelationshipState),
    ) -> Result<bool, ServiceError> {
        self.simulate_latency().await;
        self.with_record(pair_key(a, b)?, |record| {
            apply_pair(record, a, expected, new)
        })
    }

    async fn health_check(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}
