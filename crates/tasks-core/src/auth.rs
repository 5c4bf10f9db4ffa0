//! Authentication state
//!
//! The sync layer only needs to know whether someone is signed in and who.
//! State is published on a watch channel so sign-in transitions can be
//! observed.

use tokio::sync::watch;

/// Signed-in status plus the stable user id when signed in
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthState {
    #[default]
    SignedOut,
    SignedIn { user_id: String },
}

impl AuthState {
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        AuthState::SignedIn {
            user_id: user_id.into(),
        }
    }

    /// Signed in when a user id is present
    pub fn from_user_id(user_id: Option<String>) -> Self {
        match user_id {
            Some(id) if !id.is_empty() => AuthState::SignedIn { user_id: id },
            _ => AuthState::SignedOut,
        }
    }

    pub fn is_signed_in(&self) -> bool {
        matches!(self, AuthState::SignedIn { .. })
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            AuthState::SignedIn { user_id } => Some(user_id),
            AuthState::SignedOut => None,
        }
    }
}

/// Owner side of the auth state
pub struct AuthHandle {
    tx: watch::Sender<AuthState>,
}

impl AuthHandle {
    pub fn new(initial: AuthState) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn signed_out() -> Self {
        Self::new(AuthState::SignedOut)
    }

    pub fn sign_in(&self, user_id: impl Into<String>) {
        self.tx.send_replace(AuthState::signed_in(user_id));
    }

    pub fn sign_out(&self) {
        self.tx.send_replace(AuthState::SignedOut);
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.tx.subscribe()
    }
}

impl Default for AuthHandle {
    fn default() -> Self {
        Self::signed_out()
    }
}
