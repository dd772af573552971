//! View Gate: decides which console view a session may render.
//!
//! States: Unauthenticated, Unauthorized, Authorized, plus the explicit
//! Resolving pseudostate the gate starts in. While the session is still
//! resolving the gate holds its current state, so a half-resolved session can
//! never flash the wrong view.

use serde::Serialize;

use crate::session::{Resolution, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Resolving,
    Unauthenticated,
    Unauthorized,
    Authorized,
}

/// What the console renders for a gate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateView {
    /// Nothing yet; resolution pending.
    Pending,
    /// "Please authenticate" prompt.
    UnlockPrompt,
    /// "No admin access" screen.
    Locked,
    Dashboard,
}

impl GateState {
    pub fn view(&self) -> GateView {
        match self {
            GateState::Resolving => GateView::Pending,
            GateState::Unauthenticated => GateView::UnlockPrompt,
            GateState::Unauthorized => GateView::Locked,
            GateState::Authorized => GateView::Dashboard,
        }
    }

    fn for_session(session: &Session) -> Self {
        match (&session.identity, session.is_admin) {
            (None, _) => GateState::Unauthenticated,
            (Some(_), true) => GateState::Authorized,
            (Some(_), false) => GateState::Unauthorized,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateTransition {
    pub from: GateState,
    pub to: GateState,
    /// Set once, on entering Unauthorized.
    pub redirect: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ViewGate {
    state: GateState,
    public_root: String,
}

impl ViewGate {
    pub fn new(public_root: impl Into<String>) -> Self {
        Self {
            state: GateState::Resolving,
            public_root: public_root.into(),
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn view(&self) -> GateView {
        self.state.view()
    }

    /// Re-evaluates the gate against the latest resolution. Returns the
    /// transition taken, if any.
    pub fn evaluate(&mut self, resolution: &Resolution) -> Option<GateTransition> {
        let session = resolution.session()?;
        let target = GateState::for_session(session);
        if target == self.state {
            return None;
        }

        let from = self.state;
        self.state = target;
        let redirect = (target == GateState::Unauthorized).then(|| self.public_root.clone());
        tracing::info!("[GATE] {:?} -> {:?}", from, target);

        Some(GateTransition {
            from,
            to: target,
            redirect,
        })
    }
}
