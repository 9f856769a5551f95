//! Progress, status, and user-interaction events for operation sequences.
//!
//! An `EventEmitter` is owned by each sequence and handed by reference to
//! every operation call, so one subscription observes every contained
//! operation uniformly. Observers are plain trait objects in an explicit
//! list; there is no global event bus.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Progress delta emitted while a sequence runs.
///
/// Consumed by an external UI; the core only produces these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressUpdate {
    /// One forward step completed.
    Advance,
    /// One step was rolled back.
    Regress,
    /// Total number of forward steps.
    SetMax(usize),
    /// Enter or leave indeterminate mode.
    Indeterminate(bool),
}

/// Observer for sequence progress and status events.
///
/// All methods have empty defaults so observers implement only what they
/// render.
pub trait SequenceObserver: Send + Sync {
    /// A progress delta was emitted.
    fn progress_changed(&self, _update: &ProgressUpdate) {}

    /// The human-readable description of the current step changed.
    fn status_changed(&self, _status: &str) {}
}

/// Why a password is being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PasswordPurpose {
    /// Unlocking locally stored settings.
    LocalSettings,
    /// Administrator override (quit/unlock).
    LocalAdministrator,
    /// Decrypting a downloaded configuration.
    Settings,
}

/// A synchronous user interaction required by an operation.
#[derive(Debug, Clone)]
pub enum ActionRequest {
    /// Prompt the user for a password.
    Password {
        purpose: PasswordPurpose,
        request_id: Uuid,
    },
    /// Ask the user to confirm a step.
    Confirmation { message: String },
}

/// The user's reply to an [`ActionRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionReply {
    Password(String),
    Confirmed,
    /// The user declined, or no handler is registered. Operations map
    /// this to `OperationResult::Aborted`.
    Cancelled,
}

/// Handler for action-required events; implemented by the embedding UI.
pub trait ActionHandler: Send + Sync {
    fn handle(&self, request: &ActionRequest) -> ActionReply;
}

/// Fan-out broadcaster owned by an operation sequence.
///
/// Cloning shares the observer list; operations receive a reference on
/// every `perform`/`revert`/`repeat` call.
#[derive(Clone, Default)]
pub struct EventEmitter {
    observers: Arc<RwLock<Vec<Arc<dyn SequenceObserver>>>>,
    action_handler: Arc<RwLock<Option<Arc<dyn ActionHandler>>>>,
}

impl EventEmitter {
    /// Create an emitter with no observers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer for progress and status events.
    pub fn subscribe(&self, observer: Arc<dyn SequenceObserver>) {
        self.observers.write().unwrap().push(observer);
    }

    /// Register the handler for synchronous user interaction.
    ///
    /// Replaces any previously registered handler.
    pub fn set_action_handler(&self, handler: Arc<dyn ActionHandler>) {
        *self.action_handler.write().unwrap() = Some(handler);
    }

    /// Broadcast a progress delta to every observer.
    pub fn progress(&self, update: ProgressUpdate) {
        for observer in self.observers.read().unwrap().iter() {
            observer.progress_changed(&update);
        }
    }

    /// Broadcast a status text to every observer.
    pub fn status(&self, status: &str) {
        for observer in self.observers.read().unwrap().iter() {
            observer.status_changed(status);
        }
    }

    /// Request a synchronous user interaction.
    ///
    /// Returns [`ActionReply::Cancelled`] when no handler is registered:
    /// interactive steps never proceed on a silent default.
    pub fn request_action(&self, request: &ActionRequest) -> ActionReply {
        let handler = self.action_handler.read().unwrap().clone();
        match handler {
            Some(h) => h.handle(request),
            None => ActionReply::Cancelled,
        }
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("observers", &self.observers.read().unwrap().len())
            .finish()
    }
}
