//! Host handler for the browser client process.
//!
//! The client host serves exactly one peer, the runtime, and forwards
//! UI-bound requests to the client's controller over an unbounded channel.
//! Responding `Acknowledged` means "accepted for presentation"; the actual
//! user interaction flows back asynchronously via the client's own proxy.

use crate::host::HostHandler;
use crate::messages::{Interlocutor, Message, Response, SimplePurport};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;
use vigil_core::events::PasswordPurpose;

/// UI-bound request forwarded out of the client host.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientHostEvent {
    PasswordRequested {
        purpose: PasswordPurpose,
        request_id: Uuid,
    },
    MessageBoxRequested {
        title: String,
        message: String,
    },
    ShutdownRequested,
    ReconfigurationInstructed {
        url: String,
    },
    RuntimeDisconnected,
}

pub struct ClientHostHandler {
    authentication_token: Uuid,
    events: mpsc::UnboundedSender<ClientHostEvent>,
}

impl ClientHostHandler {
    /// `authentication_token` is the startup token the runtime handed this
    /// client on launch; only a peer presenting it may connect.
    pub fn new(
        authentication_token: Uuid,
    ) -> (Self, mpsc::UnboundedReceiver<ClientHostEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        (
            Self {
                authentication_token,
                events,
            },
            receiver,
        )
    }

    fn forward(&self, event: ClientHostEvent) -> Response {
        if self.events.send(event).is_err() {
            // Controller gone, the client is shutting down
            warn!("Dropped host event: no controller is listening");
        }
        Response::acknowledged()
    }
}

#[async_trait]
impl HostHandler for ClientHostHandler {
    fn owner(&self) -> Interlocutor {
        Interlocutor::Client
    }

    async fn accept_connection(&self, bootstrap_token: Option<Uuid>) -> bool {
        bootstrap_token == Some(self.authentication_token)
    }

    async fn on_disconnected(&self, interlocutor: Interlocutor) {
        info!("{} disconnected from the client host", interlocutor);
        let _ = self.events.send(ClientHostEvent::RuntimeDisconnected);
    }

    async fn on_simple_message(&self, purport: SimplePurport) -> Response {
        match purport {
            SimplePurport::RequestShutdown => self.forward(ClientHostEvent::ShutdownRequested),
            SimplePurport::Authenticate => Response::Authentication {
                process_id: std::process::id(),
            },
            SimplePurport::Ping => Response::acknowledged(),
            other => {
                warn!("Client host has no handler for {:?}", other);
                Response::unknown_message()
            }
        }
    }

    async fn on_message(&self, message: Message) -> Response {
        match message {
            Message::PasswordRequest {
                purpose,
                request_id,
                ..
            } => self.forward(ClientHostEvent::PasswordRequested {
                purpose,
                request_id,
            }),
            Message::MessageBox {
                title, message, ..
            } => self.forward(ClientHostEvent::MessageBoxRequested { title, message }),
            Message::Reconfiguration { url, .. } => {
                self.forward(ClientHostEvent::ReconfigurationInstructed { url });
                Response::Reconfiguration { accepted: true }
            }
            other => {
                warn!("Client host has no handler for {:?}", other);
                Response::unknown_message()
            }
        }
    }
}
