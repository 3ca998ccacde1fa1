//! Pure transition table for friendship relationships.
//!
//! Given the two directional states of a pair, seen from the acting member
//! (`forward = state(actor, other)`, `backward = state(other, actor)`), decide
//! whether an action is legal and which write it needs. Nothing here touches
//! a store.

use crate::models::RelationshipState as State;
use crate::services::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Request,
    Accept,
    Reject,
    Unlink,
    Block,
    Unblock,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Request => "request",
            Action::Accept => "accept",
            Action::Reject => "reject",
            Action::Unlink => "unlink",
            Action::Block => "block",
            Action::Unblock => "unblock",
        }
    }
}

/// Write required to carry out a legal action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Legal, nothing to write.
    Noop,
    /// Compare-and-set `(actor, other)`.
    Forward {
        expected: State,
        new: State,
    },
    /// Compare-and-set `(other, actor)`.
    Backward {
        expected: State,
        new: State,
    },
    /// Both sides in one atomic unit, conditioned on both expected states.
    Pair {
        expected: (State, State),
        new: (State, State),
    },
}

pub fn plan(
    action: Action,
    forward: State,
    backward: State,
) -> Result<Transition, ServiceError> {
    match action {
        Action::Request => {
            if backward == State::Blocked || forward == State::Blocked {
                return Err(ServiceError::AccessBlocked);
            }
            match forward {
                State::Friend => Err(ServiceError::AlreadyFriends),
                State::PendingOut => Err(ServiceError::AlreadyPending),
                _ => Ok(Transition::Forward {
                    expected: State::None,
                    new: State::PendingOut,
                }),
            }
        }
        Action::Accept => {
            if backward != State::PendingOut {
                return Err(ServiceError::NotPending);
            }
            if forward == State::Blocked {
                return Err(ServiceError::AccessBlocked);
            }
            Ok(Transition::Pair {
                expected: (forward, State::PendingOut),
                new: (State::Friend, State::Friend),
            })
        }
        Action::Reject => Ok(if backward == State::PendingOut {
            Transition::Backward {
                expected: State::PendingOut,
                new: State::None,
            }
        } else {
            Transition::Noop
        }),
        Action::Unlink => {
            if forward != State::Friend {
                return Err(ServiceError::NotFriends);
            }
            Ok(Transition::Pair {
                expected: (State::Friend, State::Friend),
                new: (State::None, State::None),
            })
        }
        Action::Block => {
            if forward == State::Blocked {
                return Ok(Transition::Noop);
            }
            // Blocking ends any friendship and withdraws requests in both directions.
            let new_backward = match backward {
                State::Friend | State::PendingOut => State::None,
                other => other,
            };
            Ok(Transition::Pair {
                expected: (forward, backward),
                new: (State::Blocked, new_backward),
            })
        }
        Action::Unblock => Ok(if forward == State::Blocked {
            Transition::Forward {
                expected: State::Blocked,
                new: State::None,
            }
        } else {
            Transition::Noop
        }),
    }
}
