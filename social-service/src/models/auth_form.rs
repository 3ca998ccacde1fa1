use std::collections::BTreeMap;

/// Default post-login redirect target.
pub const DEFAULT_NEXT_URI: &str = "/";

/// Bound login form handed to an auth adapter.
///
/// `fields` holds the adapter-specific credentials; the remember-me flag and
/// redirect target are common to every adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthForm {
    pub fields: BTreeMap<String, String>,
    pub is_remember_me: bool,
    pub next_uri: String,
}

impl Default for AuthForm {
    fn default() -> Self {
        Self {
            fields: BTreeMap::new(),
            is_remember_me: false,
            next_uri: DEFAULT_NEXT_URI.to_string(),
        }
    }
}

impl AuthForm {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn remember_me(mut self, remember: bool) -> Self {
        self.is_remember_me = remember;
        self
    }

    /// Only same-site relative paths are honoured as redirect targets.
    pub fn next(mut self, next_uri: Option<String>) -> Self {
        self.next_uri = match next_uri {
            Some(uri) if uri.starts_with('/') && !uri.starts_with("//") => uri,
            _ => DEFAULT_NEXT_URI.to_string(),
        };
        self
    }
}

/// Registration form handed to an auth adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterForm {
    pub fields: BTreeMap<String, String>,
}

impl RegisterForm {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }
}
