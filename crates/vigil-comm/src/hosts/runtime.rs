//! Host handler for the runtime process.
//!
//! The runtime host serves both the client and the service, so it runs
//! with capacity 2. Peers must present the startup token the runtime
//! passed them out of band (command line) to get a connection.

use crate::host::HostHandler;
use crate::messages::{Interlocutor, Message, Response, SimplePurport};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;
use vigil_core::{Coordinator, SessionContext};

/// A password the client UI collected (or declined) for an earlier
/// password request, correlated by `request_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordReply {
    pub request_id: Uuid,
    /// `None` when the user cancelled the prompt.
    pub password: Option<String>,
}

pub struct RuntimeHostHandler {
    session: Arc<SessionContext>,
    coordinator: Arc<Coordinator>,
    startup_token: Uuid,
    client_ready: AtomicBool,
    shutdown_requested: AtomicBool,
    password_replies: mpsc::UnboundedSender<PasswordReply>,
}

impl RuntimeHostHandler {
    pub fn new(
        session: Arc<SessionContext>,
        coordinator: Arc<Coordinator>,
        startup_token: Uuid,
    ) -> (Self, mpsc::UnboundedReceiver<PasswordReply>) {
        let (password_replies, receiver) = mpsc::unbounded_channel();
        (
            Self {
                session,
                coordinator,
                startup_token,
                client_ready: AtomicBool::new(false),
                shutdown_requested: AtomicBool::new(false),
                password_replies,
            },
            receiver,
        )
    }

    /// Whether the client has announced readiness since it last connected.
    pub fn is_client_ready(&self) -> bool {
        self.client_ready.load(Ordering::SeqCst)
    }

    /// Whether any peer has asked the runtime to shut down.
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    /// Release the reconfiguration lock once the reconfiguration finished
    /// or was abandoned.
    pub fn finish_reconfiguration(&self) {
        self.coordinator.release_reconfiguration_lock();
    }
}

#[async_trait]
impl HostHandler for RuntimeHostHandler {
    fn owner(&self) -> Interlocutor {
        Interlocutor::Runtime
    }

    async fn accept_connection(&self, bootstrap_token: Option<Uuid>) -> bool {
        let accepted = bootstrap_token == Some(self.startup_token);
        if !accepted {
            warn!("Rejected connection without a valid startup token");
        }
        accepted
    }

    async fn on_disconnected(&self, interlocutor: Interlocutor) {
        if interlocutor == Interlocutor::Client {
            self.client_ready.store(false, Ordering::SeqCst);
        }
    }

    async fn on_simple_message(&self, purport: SimplePurport) -> Response {
        match purport {
            SimplePurport::ClientIsReady => {
                info!("Client announced readiness");
                self.client_ready.store(true, Ordering::SeqCst);
                Response::acknowledged()
            }
            SimplePurport::ConfigurationNeeded => Response::Configuration {
                configuration: self.session.configuration(),
            },
            SimplePurport::RequestShutdown => {
                info!("Shutdown requested over IPC");
                self.shutdown_requested.store(true, Ordering::SeqCst);
                Response::acknowledged()
            }
            SimplePurport::Authenticate => Response::Authentication {
                process_id: std::process::id(),
            },
            SimplePurport::Ping => Response::acknowledged(),
        }
    }

    async fn on_message(&self, message: Message) -> Response {
        match message {
            Message::Reconfiguration { url, .. } => {
                let allowed = self
                    .session
                    .configuration()
                    .map(|c| c.settings.allow_reconfiguration)
                    .unwrap_or(false);
                let accepted = allowed && self.coordinator.request_reconfiguration_lock();
                if accepted {
                    info!("Accepted reconfiguration towards {}", url);
                } else {
                    info!("Denied reconfiguration towards {}", url);
                }
                Response::Reconfiguration { accepted }
            }
            Message::PasswordReply {
                request_id,
                password,
                ..
            } => {
                if self
                    .password_replies
                    .send(PasswordReply {
                        request_id,
                        password,
                    })
                    .is_err()
                {
                    warn!("Dropped password reply {}: no controller is listening", request_id);
                }
                Response::acknowledged()
            }
            other => {
                warn!("Runtime host has no handler for {:?}", other);
                Response::unknown_message()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::{SessionConfiguration, SessionSettings};

    fn handler() -> (RuntimeHostHandler, mpsc::UnboundedReceiver<PasswordReply>, Uuid) {
        let token = Uuid::new_v4();
        let (handler, replies) = RuntimeHostHandler::new(
            Arc::new(SessionContext::new()),
            Arc::new(Coordinator::new()),
            token,
        );
        (handler, replies, token)
    }

    #[tokio::test]
    async fn test_connection_requires_startup_token() {
        let (handler, _replies, token) = handler();

        assert!(handler.accept_connection(Some(token)).await);
        assert!(!handler.accept_connection(Some(Uuid::new_v4())).await);
        assert!(!handler.accept_connection(None).await);
    }

    #[tokio::test]
    async fn test_client_readiness_tracks_connection() {
        let (handler, _replies, _) = handler();
        assert!(!handler.is_client_ready());

        handler
            .on_simple_message(SimplePurport::ClientIsReady)
            .await;
        assert!(handler.is_client_ready());

        handler.on_disconnected(Interlocutor::Client).await;
        assert!(!handler.is_client_ready());
    }

    #[tokio::test]
    async fn test_configuration_handout() {
        let (handler, _replies, _) = handler();

        let empty = handler
            .on_simple_message(SimplePurport::ConfigurationNeeded)
            .await;
        assert_eq!(
            empty,
            Response::Configuration {
                configuration: None
            }
        );

        let config = SessionConfiguration {
            settings: SessionSettings {
                start_url: Some("https://exam.example.org".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        handler.session.set_configuration(config.clone());

        let response = handler
            .on_simple_message(SimplePurport::ConfigurationNeeded)
            .await;
        assert_eq!(
            response,
            Response::Configuration {
                configuration: Some(config)
            }
        );
    }

    #[tokio::test]
    async fn test_reconfiguration_gated_by_settings_and_lock() {
        let (handler, _replies, _) = handler();
        let url = "https://exam.example.org/next";

        // No configuration yet: denied
        let denied = handler
            .on_message(Message::Reconfiguration {
                token: Uuid::new_v4(),
                url: url.into(),
            })
            .await;
        assert_eq!(denied, Response::Reconfiguration { accepted: false });

        handler.session.set_configuration(SessionConfiguration {
            settings: SessionSettings {
                allow_reconfiguration: true,
                ..Default::default()
            },
            ..Default::default()
        });

        let first = handler
            .on_message(Message::Reconfiguration {
                token: Uuid::new_v4(),
                url: url.into(),
            })
            .await;
        assert_eq!(first, Response::Reconfiguration { accepted: true });

        // Lock is held until the reconfiguration finishes
        let second = handler
            .on_message(Message::Reconfiguration {
                token: Uuid::new_v4(),
                url: url.into(),
            })
            .await;
        assert_eq!(second, Response::Reconfiguration { accepted: false });

        handler.finish_reconfiguration();
        let third = handler
            .on_message(Message::Reconfiguration {
                token: Uuid::new_v4(),
                url: url.into(),
            })
            .await;
        assert_eq!(third, Response::Reconfiguration { accepted: true });
    }

    #[tokio::test]
    async fn test_shutdown_request_is_latched() {
        let (handler, _replies, _) = handler();
        assert!(!handler.is_shutdown_requested());

        let response = handler
            .on_simple_message(SimplePurport::RequestShutdown)
            .await;
        assert_eq!(response, Response::acknowledged());
        assert!(handler.is_shutdown_requested());
    }

    #[tokio::test]
    async fn test_password_replies_are_correlated_by_request_id() {
        let (handler, mut replies, _) = handler();
        let request_id = Uuid::new_v4();

        let response = handler
            .on_message(Message::PasswordReply {
                token: Uuid::new_v4(),
                request_id,
                password: Some("hunter2".into()),
            })
            .await;
        assert_eq!(response, Response::acknowledged());

        let cancelled_id = Uuid::new_v4();
        handler
            .on_message(Message::PasswordReply {
                token: Uuid::new_v4(),
                request_id: cancelled_id,
                password: None,
            })
            .await;

        assert_eq!(
            replies.recv().await.unwrap(),
            PasswordReply {
                request_id,
                password: Some("hunter2".into()),
            }
        );
        assert_eq!(
            replies.recv().await.unwrap(),
            PasswordReply {
                request_id: cancelled_id,
                password: None,
            }
        );
    }

    #[tokio::test]
    async fn test_password_reply_survives_dropped_receiver() {
        let (handler, replies, _) = handler();
        drop(replies);

        let response = handler
            .on_message(Message::PasswordReply {
                token: Uuid::new_v4(),
                request_id: Uuid::new_v4(),
                password: None,
            })
            .await;
        assert_eq!(response, Response::acknowledged());
    }
}
