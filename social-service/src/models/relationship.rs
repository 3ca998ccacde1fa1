use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Identity;

/// One directional relationship state, stored from the `from` member's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipState {
    #[default]
    None,
    /// `from` has asked `to` to become friends
    PendingOut,
    Friend,
    /// `from` has blocked `to`
    Blocked,
}

impl RelationshipState {
    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipState::None => "none",
            RelationshipState::PendingOut => "pending_out",
            RelationshipState::Friend => "friend",
            RelationshipState::Blocked => "blocked",
        }
    }

    /// Parse from database string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(RelationshipState::None),
            "pending_out" => Some(RelationshipState::PendingOut),
            "friend" => Some(RelationshipState::Friend),
            "blocked" => Some(RelationshipState::Blocked),
            _ => None,
        }
    }
}

/// Unordered pair of distinct identities; `low < high`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey {
    low: Identity,
    high: Identity,
}

impl PairKey {
    /// Returns `None` for a self-pair or when either side is anonymous.
    pub fn new(a: &Identity, b: &Identity) -> Option<Self> {
        if a == b || a.is_anonymous() || b.is_anonymous() {
            return None;
        }
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        Some(Self {
            low: low.clone(),
            high: high.clone(),
        })
    }

    pub fn low(&self) -> &Identity {
        &self.low
    }

    pub fn high(&self) -> &Identity {
        &self.high
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        &self.low == identity || &self.high == identity
    }
}

/// Both directional states of one pair, kept together so that symmetric
/// invariants can be checked on every write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub key: PairKey,
    pub low_to_high: RelationshipState,
    pub high_to_low: RelationshipState,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Relationship {
    /// Lazily materialized record for a pair that has never interacted.
    pub fn new(key: PairKey) -> Self {
        Self {
            key,
            low_to_high: RelationshipState::None,
            high_to_low: RelationshipState::None,
            updated_at: None,
        }
    }

    /// State stored at `(from, other side)`.
    pub fn state_from(&self, from: &Identity) -> RelationshipState {
        if from == self.key.low() {
            self.low_to_high
        } else {
            self.high_to_low
        }
    }

    pub fn set_from(&mut self, from: &Identity, state: RelationshipState) {
        if from == self.key.low() {
            self.low_to_high = state;
        } else {
            self.high_to_low = state;
        }
    }

    /// `(state(from, to), state(to, from))`
    pub fn sides(&self, from: &Identity) -> (RelationshipState, RelationshipState) {
        if from == self.key.low() {
            (self.low_to_high, self.high_to_low)
        } else {
            (self.high_to_low, self.low_to_high)
        }
    }

    /// Friendship exists on both sides or on neither.
    pub fn is_symmetric(&self) -> bool {
        (self.low_to_high == RelationshipState::Friend)
            == (self.high_to_low == RelationshipState::Friend)
    }

    /// How `viewer` sees the relationship with the other member.
    pub fn view_from(&self, viewer: &Identity) -> RelationshipView {
        let (forward, backward) = self.sides(viewer);
        if backward == RelationshipState::Blocked {
            return RelationshipView::AccessBlocked;
        }
        match forward {
            RelationshipState::Blocked => RelationshipView::Blocked,
            RelationshipState::Friend => RelationshipView::Friend,
            RelationshipState::PendingOut => RelationshipView::PendingOut,
            RelationshipState::None if backward == RelationshipState::PendingOut => {
                RelationshipView::PendingIn
            }
            RelationshipState::None => RelationshipView::None,
        }
    }
}

/// Relationship as seen by one member, including the derived pending-in state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipView {
    None,
    PendingOut,
    PendingIn,
    Friend,
    /// The viewer has blocked the other member
    Blocked,
    /// The other member has blocked the viewer
    AccessBlocked,
}
