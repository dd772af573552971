//! Access Claim Resolver.
//!
//! Follows the identity collaborator and publishes the current [`Session`]
//! (identity + admin claim). Every collaborator emission fully replaces the
//! previous value. While the collaborator is still restoring a session, or an
//! admin lookup is in flight, the published value is [`Resolution::Resolving`].

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::identity::{AuthState, Identity, IdentityProvider};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Session {
    pub identity: Option<Identity>,
    pub is_admin: bool,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolving,
    Resolved(Session),
}

impl Resolution {
    pub fn session(&self) -> Option<&Session> {
        match self {
            Resolution::Resolved(session) => Some(session),
            Resolution::Resolving => None,
        }
    }
}

/// Owns the session for one mounted console. Dropping it stops following the
/// collaborator.
pub struct SessionResolver {
    state: watch::Receiver<Resolution>,
    task: JoinHandle<()>,
}

impl SessionResolver {
    /// Start following `provider`. Must be called inside a tokio runtime.
    pub fn start(provider: Arc<dyn IdentityProvider>) -> Self {
        let (tx, state) = watch::channel(Resolution::Resolving);
        let task = tokio::spawn(follow_identity(provider, tx));
        Self { state, task }
    }

    /// Current session; anonymous while resolution is pending.
    pub fn session(&self) -> Session {
        self.state
            .borrow()
            .session()
            .cloned()
            .unwrap_or_default()
    }

    pub fn resolution(&self) -> Resolution {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Resolution> {
        self.state.clone()
    }
}

impl Drop for SessionResolver {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn follow_identity(provider: Arc<dyn IdentityProvider>, tx: watch::Sender<Resolution>) {
    let mut auth = match provider.watch() {
        Ok(rx) => rx,
        Err(e) => {
            tracing::warn!("[SESSION] Identity collaborator unreachable, continuing anonymous: {}", e);
            tx.send_replace(Resolution::Resolved(Session::anonymous()));
            return;
        }
    };

    loop {
        let current = auth.borrow_and_update().clone();
        match current {
            AuthState::Restoring => {
                tx.send_replace(Resolution::Resolving);
            }
            AuthState::Anonymous => {
                tx.send_replace(Resolution::Resolved(Session::anonymous()));
            }
            AuthState::SignedIn(identity) => {
                tx.send_replace(Resolution::Resolving);
                tokio::select! {
                    verdict = provider.is_admin(&identity) => {
                        let session = match verdict {
                            Ok(is_admin) => Session { identity: Some(identity), is_admin },
                            Err(e) => {
                                tracing::warn!(
                                    "[SESSION] Admin claim lookup failed for {}, treating as signed out: {}",
                                    identity.email, e
                                );
                                Session::anonymous()
                            }
                        };
                        tracing::debug!(
                            "[SESSION] Resolved: authenticated={} admin={}",
                            session.is_authenticated(),
                            session.is_admin
                        );
                        tx.send_replace(Resolution::Resolved(session));
                    }
                    changed = auth.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        // A newer identity superseded this lookup.
                        continue;
                    }
                }
            }
        }

        if auth.changed().await.is_err() {
            tracing::debug!("[SESSION] Identity collaborator closed its channel");
            return;
        }
    }
}
