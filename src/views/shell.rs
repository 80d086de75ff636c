//! Shell: the authenticated/unauthenticated gate around the dashboard.
//!
//! Two states. `Unauthenticated → Authenticated` happens on mount when a
//! session exists; the reverse is driven from outside (logout, expiry) and
//! can arrive at any time. Every transition to "no session" redirects to the
//! sign-in entry point.

use crate::services::session::SessionUser;

/// Unauthenticated entry point.
pub const SIGNED_OUT_TARGET: &str = "/";
/// Landing page after a successful sign-in.
pub const SIGNED_IN_TARGET: &str = "/dashboard";

const FALLBACK_LABEL: &str = "User";

pub const MSG_SIGNED_OUT: &str = "Logged out successfully";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellState {
    Unauthenticated,
    Authenticated(SessionUser),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Stay,
    Redirect(&'static str),
}

#[derive(Debug, Clone)]
pub struct Shell {
    state: ShellState,
}

impl Shell {
    /// Mount with the current session, if any.
    #[must_use]
    pub fn mount(current: Option<SessionUser>) -> (Self, Navigation) {
        let mut shell = Self { state: ShellState::Unauthenticated };
        let nav = shell.on_session_change(current);
        (shell, nav)
    }

    /// Apply a session-change notification.
    pub fn on_session_change(&mut self, session: Option<SessionUser>) -> Navigation {
        match session {
            Some(user) => {
                self.state = ShellState::Authenticated(user);
                Navigation::Stay
            }
            None => {
                self.state = ShellState::Unauthenticated;
                Navigation::Redirect(SIGNED_OUT_TARGET)
            }
        }
    }

    #[must_use]
    pub fn user(&self) -> Option<&SessionUser> {
        match &self.state {
            ShellState::Authenticated(user) => Some(user),
            ShellState::Unauthenticated => None,
        }
    }

    /// Label shown in the navigation bar.
    #[must_use]
    pub fn display_label(&self) -> &str {
        self.user()
            .and_then(|u| u.email.as_deref())
            .unwrap_or(FALLBACK_LABEL)
    }
}

#[cfg(test)]
#[path = "shell_test.rs"]
mod tests;
