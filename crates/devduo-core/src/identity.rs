//! Identity collaborator: who is signed in, and whether they hold the admin claim.
//!
//! The console never decides admin status itself; it asks the provider. The
//! bundled [`AllowlistIdentityProvider`] answers from the configured operator
//! email list.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::sync::watch;

use crate::error::ConsoleResult;

/// Authenticated principal as reported by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    /// Opaque address the admin predicate is evaluated against.
    pub email: String,
}

impl Identity {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
        }
    }
}

/// Collaborator-side authentication state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// A stored session is still being restored.
    Restoring,
    Anonymous,
    SignedIn(Identity),
}

impl AuthState {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            AuthState::SignedIn(identity) => Some(identity),
            _ => None,
        }
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Current state plus change notification. Errors mean the collaborator
    /// cannot be reached.
    fn watch(&self) -> ConsoleResult<watch::Receiver<AuthState>>;

    /// Evaluates the collaborator's admin policy for `identity`.
    async fn is_admin(&self, identity: &Identity) -> ConsoleResult<bool>;
}

/// In-process identity collaborator backed by an operator email allowlist.
pub struct AllowlistIdentityProvider {
    state: watch::Sender<AuthState>,
    admins: HashSet<String>,
}

impl AllowlistIdentityProvider {
    /// Provider with no restored session (anonymous).
    pub fn new<I, S>(admin_emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::with_state(admin_emails, AuthState::Anonymous)
    }

    /// Provider that is still restoring a session; resolves on the first
    /// `sign_in` or `sign_out`.
    pub fn restoring<I, S>(admin_emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::with_state(admin_emails, AuthState::Restoring)
    }

    fn with_state<I, S>(admin_emails: I, initial: AuthState) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let admins = admin_emails
            .into_iter()
            .map(|e| normalize_email(e.as_ref()))
            .filter(|e| !e.is_empty())
            .collect();
        let (state, _) = watch::channel(initial);
        Self { state, admins }
    }

    pub fn sign_in(&self, identity: Identity) {
        tracing::info!("[IDENTITY] Session opened for {}", identity.email);
        self.state.send_replace(AuthState::SignedIn(identity));
    }

    pub fn sign_out(&self) {
        tracing::info!("[IDENTITY] Session closed");
        self.state.send_replace(AuthState::Anonymous);
    }

    pub fn current(&self) -> AuthState {
        self.state.borrow().clone()
    }
}

#[async_trait]
impl IdentityProvider for AllowlistIdentityProvider {
    fn watch(&self) -> ConsoleResult<watch::Receiver<AuthState>> {
        Ok(self.state.subscribe())
    }

    async fn is_admin(&self, identity: &Identity) -> ConsoleResult<bool> {
        Ok(self.admins.contains(&normalize_email(&identity.email)))
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}
