use serde::{Deserialize, Serialize};
use std::fmt;

use crate::services::ServiceError;

const MAX_IDENTITY_LEN: usize = 128;

/// Opaque handle for a member account.
///
/// The empty handle is reserved for the anonymous sentinel, which carries no
/// privileges and is never written to any store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Validate a raw handle coming from a request, a cookie or a store row.
    pub fn parse(raw: impl Into<String>) -> Result<Self, ServiceError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(ServiceError::ValidationError(
                "Identity must not be empty".to_string(),
            ));
        }
        if raw.len() > MAX_IDENTITY_LEN {
            return Err(ServiceError::ValidationError(format!(
                "Identity must be at most {} bytes",
                MAX_IDENTITY_LEN
            )));
        }
        if raw
            .chars()
            .any(|c| c == '|' || c == '.' || c.is_control() || c.is_whitespace())
        {
            return Err(ServiceError::ValidationError(
                "Identity contains reserved characters".to_string(),
            ));
        }
        Ok(Self(raw))
    }

    /// The distinguished no-privilege identity.
    pub fn anonymous() -> Self {
        Self(String::new())
    }

    pub fn is_anonymous(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_anonymous() {
            f.write_str("anonymous")
        } else {
            f.write_str(&self.0)
        }
    }
}
