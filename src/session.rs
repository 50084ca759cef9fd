//! The session value. One instance exists per runtime, behind a lock: the
//! state machine is the only writer, the composer and transport read.

use std::fmt;
use std::time::Instant;

use zeroize::Zeroizing;

use crate::cipher::SessionCipher;

/// Where the login conversation currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    LoggedOut,
    Authenticating,
    PasswordRequired,
    EncryptionPending,
    Active,
}

/// The identity half of a session, set aside while a user switch is in
/// flight so a failed switch can restore it wholesale.
pub struct LoginSnapshot {
    pub user: String,
    pub password: Option<Zeroizing<String>>,
    pub session_id: Option<String>,
    pub cipher: Option<Box<dyn SessionCipher>>,
    pub phase: SessionPhase,
    pub started: bool,
}

pub struct Session {
    pub user: String,
    /// Held only between the login prompt and the completion of encryption
    /// bootstrap (or activation without encryption), then dropped.
    pub password: Option<Zeroizing<String>>,
    /// Assigned by the server, echoed on every later request until logout
    /// or forced restart.
    pub session_id: Option<String>,
    /// Present exactly while encryption is bootstrapped for this login.
    pub cipher: Option<Box<dyn SessionCipher>>,
    pub phase: SessionPhase,
    pub started: bool,
    /// Set while the server reports the application locked.
    pub waiting: bool,
    pub switching: Option<LoginSnapshot>,
    pub last_activity: Instant,
    pub server_version: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            user: String::new(),
            password: None,
            session_id: None,
            cipher: None,
            phase: SessionPhase::LoggedOut,
            started: false,
            waiting: false,
            switching: None,
            last_activity: Instant::now(),
            server_version: None,
        }
    }

    /// Whether outbound payloads go through the cipher.
    pub fn encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    /// Records a successful round-trip for the idle-gap check.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Captures the current identity for a user switch. The cipher and
    /// password stay in place here; the login submission moves them into
    /// the snapshot at the moment it would otherwise drop them.
    pub fn snapshot(&self) -> LoginSnapshot {
        LoginSnapshot {
            user: self.user.clone(),
            password: None,
            session_id: self.session_id.clone(),
            cipher: None,
            phase: self.phase,
            started: self.started,
        }
    }

    /// Restores a switch snapshot after a failed authentication.
    pub fn restore(&mut self, snapshot: LoginSnapshot) {
        self.user = snapshot.user;
        self.password = snapshot.password;
        self.session_id = snapshot.session_id;
        self.cipher = snapshot.cipher;
        self.phase = snapshot.phase;
        self.started = snapshot.started;
    }

    /// Clears identity, credentials and cipher after logout or restart.
    pub fn reset_identity(&mut self) {
        self.user.clear();
        self.password = None;
        self.session_id = None;
        self.cipher = None;
        self.phase = SessionPhase::LoggedOut;
        self.started = false;
        self.switching = None;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user)
            .field("session_id", &self.session_id)
            .field("phase", &self.phase)
            .field("started", &self.started)
            .field("encrypted", &self.encrypted())
            .field("waiting", &self.waiting)
            .field("switching", &self.switching.is_some())
            .finish()
    }
}
