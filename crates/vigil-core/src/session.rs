//! Process-wide session state.
//!
//! One `SessionContext` exists per process, constructed at startup and
//! shared by `Arc` with every component that reads or writes session
//! state. Operations populate it incrementally as they succeed; a full
//! shutdown resets it. Mutations originating on a host's dispatch task
//! (rather than the sequence's own task) must additionally hold the
//! matching [`Coordinator`](crate::Coordinator) lock.

use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use uuid::Uuid;

/// Settings negotiated for the active exam session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSettings {
    /// Start URL for the exam browser shell.
    pub start_url: Option<String>,
    /// Whether a browser- or server-initiated reconfiguration may replace
    /// this session's configuration.
    pub allow_reconfiguration: bool,
    /// Whether the user may terminate the session without an override.
    pub allow_termination: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            start_url: None,
            allow_reconfiguration: false,
            allow_termination: true,
        }
    }
}

/// The negotiated configuration for a session: settings plus the key
/// material computed by the (external) cryptographic subsystem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfiguration {
    pub settings: SessionSettings,
    /// Configuration key, hex-encoded; identifies the settings payload.
    pub config_key: Option<String>,
    /// Browser exam key, hex-encoded; authenticates the browser build.
    pub browser_exam_key: Option<String>,
}

#[derive(Debug, Default)]
struct SessionState {
    session_id: Option<Uuid>,
    configuration: Option<SessionConfiguration>,
    running: bool,
}

/// Shared, process-wide state describing the currently active session.
///
/// Interior mutability behind an `RwLock`; accessors clone out so no lock
/// is held across await points.
#[derive(Debug, Default)]
pub struct SessionContext {
    inner: RwLock<SessionState>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opaque correlation id of the active session, if one has started.
    pub fn session_id(&self) -> Option<Uuid> {
        self.inner.read().unwrap().session_id
    }

    pub fn set_session_id(&self, id: Uuid) {
        self.inner.write().unwrap().session_id = Some(id);
    }

    /// The negotiated configuration, once an operation has retrieved it.
    pub fn configuration(&self) -> Option<SessionConfiguration> {
        self.inner.read().unwrap().configuration.clone()
    }

    pub fn set_configuration(&self, configuration: SessionConfiguration) {
        self.inner.write().unwrap().configuration = Some(configuration);
    }

    pub fn is_running(&self) -> bool {
        self.inner.read().unwrap().running
    }

    pub fn set_running(&self, running: bool) {
        self.inner.write().unwrap().running = running;
    }

    /// Clear all session state. Called on full shutdown.
    pub fn reset(&self) {
        *self.inner.write().unwrap() = SessionState::default();
    }
}
