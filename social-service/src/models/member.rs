use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Identity;

/// Snapshot of a member account as returned by the member directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub identity: Identity,
    /// Login handle used by the password adapter (usually an email)
    pub login_id: Option<String>,
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,
    pub is_active: bool,
    /// Set while a registration started by invitation is still in progress
    pub register_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Member {
    pub fn new(identity: Identity, login_id: Option<String>, password_hash: Option<String>) -> Self {
        Self {
            identity,
            login_id,
            password_hash,
            is_active: true,
            register_token: None,
            created_at: Utc::now(),
        }
    }

    /// Member handed out for sessions with no bound identity.
    pub fn anonymous() -> Self {
        Self {
            identity: Identity::anonymous(),
            login_id: None,
            password_hash: None,
            is_active: false,
            register_token: None,
            created_at: DateTime::<Utc>::default(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.identity.is_anonymous()
    }
}
