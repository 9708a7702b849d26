//! Credential check and per-session login state.

use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

/// Username/password pair loaded from configuration at startup.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn verify(&self, submitted_user: &str, submitted_pass: &str) -> bool {
        authenticate(
            submitted_user,
            submitted_pass,
            &self.username,
            &self.password,
        )
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Exact, case-sensitive comparison of both fields.
pub fn authenticate(
    submitted_user: &str,
    submitted_pass: &str,
    configured_user: &str,
    configured_pass: &str,
) -> bool {
    submitted_user == configured_user && submitted_pass == configured_pass
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    #[default]
    LoggedOut,
    LoggedIn,
}

impl SessionState {
    pub fn is_authenticated(self) -> bool {
        self == SessionState::LoggedIn
    }
}

/// Login state per session id. Only authenticated sessions are stored: any
/// id the store has not recorded reads as `LoggedOut`. There is no logout,
/// so a `LoggedIn` entry stays for the life of the process.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<Uuid, SessionState>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints an anonymous session id. Nothing is recorded until a login
    /// succeeds.
    pub fn open(&self) -> Uuid {
        Uuid::new_v4()
    }

    pub fn state(&self, id: &Uuid) -> SessionState {
        self.sessions
            .get(id)
            .map(|entry| *entry.value())
            .unwrap_or_default()
    }

    pub fn is_authenticated(&self, id: &Uuid) -> bool {
        self.state(id).is_authenticated()
    }

    /// Runs the credential check. On success a fresh id is recorded as
    /// `LoggedIn` and returned; the caller's previous id is never promoted.
    /// On failure nothing is stored.
    pub fn login(
        &self,
        credentials: &Credentials,
        submitted_user: &str,
        submitted_pass: &str,
    ) -> Option<Uuid> {
        if !credentials.verify(submitted_user, submitted_pass) {
            return None;
        }
        let id = Uuid::new_v4();
        self.sessions.insert(id, SessionState::LoggedIn);
        Some(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
