//! Credential provider seam.
//!
//! The client never reads ambient storage; whoever owns the session hands it a
//! provider at construction. The client only reads, never refreshes.

use std::sync::RwLock;

pub trait CredentialProvider: Send + Sync {
    /// Current opaque token. `None` (or empty) means "no credentials".
    fn token(&self) -> Option<String>;
}

/// Fixed token, e.g. resolved once from the environment.
#[derive(Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn none() -> Self {
        Self(None)
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("StaticToken")
            .field(&self.0.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

impl CredentialProvider for StaticToken {
    fn token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Token that the session owner can replace at runtime (login / logout).
#[derive(Default)]
pub struct SharedToken {
    inner: RwLock<Option<String>>,
}

impl SharedToken {
    pub fn new(initial: Option<String>) -> Self {
        Self {
            inner: RwLock::new(initial),
        }
    }

    pub fn set(&self, token: Option<String>) {
        if let Ok(mut guard) = self.inner.write() {
            *guard = token;
        }
    }
}

impl CredentialProvider for SharedToken {
    fn token(&self) -> Option<String> {
        self.inner.read().ok().and_then(|g| g.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_token_can_be_swapped() {
        let t = SharedToken::new(None);
        assert_eq!(t.token(), None);
        t.set(Some("abc".into()));
        assert_eq!(t.token().as_deref(), Some("abc"));
        t.set(None);
        assert_eq!(t.token(), None);
    }

    #[test]
    fn static_token_debug_is_redacted() {
        let dbg = format!("{:?}", StaticToken::new("secret-abc"));
        assert!(!dbg.contains("secret-abc"));
    }
}
