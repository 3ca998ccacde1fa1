use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::models::Identity;

/// Credential granted to sessions bound to an active member.
pub const MEMBER_CREDENTIAL: &str = "member";

/// Opaque id of a client session, carried in the session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Accept only ids shaped like the ones we mint.
    pub fn parse(raw: &str) -> Option<Self> {
        (raw.len() == 64 && raw.bytes().all(|b| b.is_ascii_hexdigit()))
            .then(|| Self(raw.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Attribute bag scoped to one connected client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub identity: Option<Identity>,
    pub authenticated: bool,
    /// Name of the auth adapter last used; survives logout.
    pub auth_mode: Option<String>,
    #[serde(default)]
    pub credentials: BTreeSet<String>,
    /// Adapter-specific transient fields.
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.authenticated && self.identity.is_some()
    }

    /// Bound identity, or the anonymous sentinel.
    pub fn identity_or_anonymous(&self) -> Identity {
        self.identity.clone().unwrap_or_else(Identity::anonymous)
    }

    pub fn has_credential(&self, name: &str) -> bool {
        self.credentials.contains(name)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.attributes.insert(key.into(), value);
    }

    pub fn attribute(&self, key: &str) -> Option<&serde_json::Value> {
        self.attributes.get(key)
    }

    /// Drop everything except the last used auth mode.
    pub fn clear_preserving_auth_mode(&mut self) {
        let auth_mode = self.auth_mode.take();
        *self = Session {
            auth_mode,
            ..Session::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_keeps_auth_mode_only() {
        let mut session = Session {
            identity: Some(Identity::parse("alice").unwrap()),
            authenticated: true,
            auth_mode: Some("password".to_string()),
            ..Session::default()
        };
        session.credentials.insert(MEMBER_CREDENTIAL.to_string());
        session.set_attribute("register_step", serde_json::json!(2));

        session.clear_preserving_auth_mode();

        assert_eq!(session.auth_mode.as_deref(), Some("password"));
        assert!(session.identity.is_none());
        assert!(!session.authenticated);
        assert!(session.credentials.is_empty());
        assert!(session.attribute("register_step").is_none());
    }

    #[test]
    fn test_session_id_shape() {
        let id = SessionId::generate();
        assert_eq!(SessionId::parse(id.as_str()), Some(id));
        assert!(SessionId::parse("short").is_none());
        assert!(SessionId::parse(&"z".repeat(64)).is_none());
    }

    #[test]
    fn test_authenticated_requires_identity() {
        let session = Session {
            authenticated: true,
            ..Session::default()
        };
        assert!(!session.is_authenticated());
        assert!(session.identity_or_anonymous().is_anonymous());
    }
}
