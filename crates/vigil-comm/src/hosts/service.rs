//! Host handler for the privileged system service.
//!
//! The service host serves only the runtime (capacity 1) and applies
//! session transitions to its own context. A transition is applied only
//! while holding the coordinator's session lock: the lock is acquired on
//! `SessionStart` and held until the matching `SessionStop`, so overlapping
//! starts are denied instead of corrupting state.

use crate::host::HostHandler;
use crate::messages::{Interlocutor, Message, Response, SimplePurport};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use vigil_core::{Coordinator, SessionContext};

pub struct ServiceHostHandler {
    session: Arc<SessionContext>,
    coordinator: Arc<Coordinator>,
    /// Expected bootstrap secret; `None` accepts any local peer.
    expected_token: Option<Uuid>,
}

impl ServiceHostHandler {
    pub fn new(
        session: Arc<SessionContext>,
        coordinator: Arc<Coordinator>,
        expected_token: Option<Uuid>,
    ) -> Self {
        Self {
            session,
            coordinator,
            expected_token,
        }
    }
}

#[async_trait]
impl HostHandler for ServiceHostHandler {
    fn owner(&self) -> Interlocutor {
        Interlocutor::Service
    }

    async fn accept_connection(&self, bootstrap_token: Option<Uuid>) -> bool {
        match self.expected_token {
            Some(expected) => bootstrap_token == Some(expected),
            None => true,
        }
    }

    async fn on_disconnected(&self, interlocutor: Interlocutor) {
        if self.session.is_running() {
            warn!(
                "{} disconnected while a session is active; awaiting reconnect",
                interlocutor
            );
        }
    }

    async fn on_simple_message(&self, purport: SimplePurport) -> Response {
        match purport {
            SimplePurport::Authenticate => Response::Authentication {
                process_id: std::process::id(),
            },
            SimplePurport::Ping => Response::acknowledged(),
            other => {
                warn!("Service host has no handler for {:?}", other);
                Response::unknown_message()
            }
        }
    }

    async fn on_message(&self, message: Message) -> Response {
        match message {
            Message::SessionStart {
                session_id,
                configuration,
                ..
            } => {
                if !self.coordinator.request_session_lock() {
                    warn!(
                        "Denied session start {}: a session transition is already active",
                        session_id
                    );
                    return Response::Session { accepted: false };
                }
                self.session.set_session_id(session_id);
                self.session.set_configuration(configuration);
                self.session.set_running(true);
                info!("Service session {} started", session_id);
                Response::Session { accepted: true }
            }

            Message::SessionStop { session_id, .. } => {
                if self.session.session_id() != Some(session_id) {
                    warn!("Denied session stop {}: unknown session", session_id);
                    return Response::Session { accepted: false };
                }
                self.session.reset();
                self.coordinator.release_session_lock();
                info!("Service session {} stopped", session_id);
                Response::Session { accepted: true }
            }

            other => {
                warn!("Service host has no handler for {:?}", other);
                Response::unknown_message()
            }
        }
    }
}
