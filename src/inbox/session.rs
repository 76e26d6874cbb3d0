//! Per-session orchestration phases.
//!
//! The service keeps no session between calls, so every request rebuilds
//! the phase it enters from and walks the transitions it performs. This
//! keeps the request flows honest about ordering (no send before
//! authentication, listing always returns to idle) and gives each request
//! a traceable history.

use tracing::{debug, error};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Unauthenticated,
    Authenticating,
    Listing,
    Idle,
    Drafting,
    Sending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// An authorization code arrived from the consent redirect.
    CodeReceived,
    /// The code was exchanged; listing starts immediately.
    Authenticated,
    ListRequested,
    DraftRequested,
    SendRequested,
    /// The current action finished successfully.
    Completed,
    /// The current action failed.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Cannot apply {event:?} while {phase:?}")]
pub struct InvalidTransition {
    pub phase: SessionPhase,
    pub event: SessionEvent,
}

impl SessionPhase {
    /// Checked transition.
    pub fn advance(self, event: SessionEvent) -> Result<SessionPhase, InvalidTransition> {
        use SessionEvent as E;
        use SessionPhase as P;

        let next = match (self, event) {
            (P::Unauthenticated, E::CodeReceived) => P::Authenticating,
            (P::Authenticating, E::Authenticated) => P::Listing,
            (P::Authenticating, E::Failed) => P::Unauthenticated,
            (P::Idle, E::ListRequested) => P::Listing,
            (P::Idle, E::DraftRequested) => P::Drafting,
            (P::Idle, E::SendRequested) => P::Sending,
            (P::Listing | P::Drafting | P::Sending, E::Completed | E::Failed) => P::Idle,
            (phase, event) => return Err(InvalidTransition { phase, event }),
        };
        Ok(next)
    }
}

/// One request's walk through the phases.
#[derive(Debug)]
pub struct SessionTrace {
    request_id: Uuid,
    phase: SessionPhase,
}

impl SessionTrace {
    /// A fresh login holding only an authorization code.
    pub fn fresh_login() -> Self {
        Self::starting_at(SessionPhase::Unauthenticated)
    }

    /// A session that already holds a refresh token, or needs none.
    pub fn idle() -> Self {
        Self::starting_at(SessionPhase::Idle)
    }

    fn starting_at(phase: SessionPhase) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            phase,
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Apply `event`. An illegal transition is a programming error; it is
    /// logged and the phase is left unchanged.
    pub fn step(&mut self, event: SessionEvent) {
        match self.phase.advance(event) {
            Ok(next) => {
                debug!(
                    request_id = %self.request_id,
                    from = ?self.phase,
                    to = ?next,
                    "Session transition"
                );
                self.phase = next;
            }
            Err(e) => {
                error!(request_id = %self.request_id, error = %e, "Rejected session transition");
            }
        }
    }

    /// Record the outcome of the current action and pass the result on.
    pub fn finish<T, E>(&mut self, result: Result<T, E>) -> Result<T, E> {
        self.step(if result.is_ok() {
            SessionEvent::Completed
        } else {
            SessionEvent::Failed
        });
        result
    }
}
