//! IPC message and response model.
//!
//! Every request except the initial `Connection` handshake carries the
//! communication token the host issued for that connection. Messages and
//! responses are internally tagged JSON so both ends can evolve the set
//! without breaking framing.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vigil_core::events::PasswordPurpose;
use vigil_core::SessionConfiguration;

/// The process roles that talk over Vigil IPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interlocutor {
    /// The session runtime process (orchestrator).
    Runtime,
    /// The browser client process (UI shell).
    Client,
    /// The privileged system service.
    Service,
    /// A peer that never completed authentication.
    Unknown,
}

impl std::fmt::Display for Interlocutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Interlocutor::Runtime => "runtime",
            Interlocutor::Client => "client",
            Interlocutor::Service => "service",
            Interlocutor::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// Requests that need no payload beyond the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimplePurport {
    /// Liveness probe. Answered by the host itself, never dispatched to a
    /// handler.
    Ping,
    /// The client finished initializing its UI.
    ClientIsReady,
    /// The sender needs the session configuration.
    ConfigurationNeeded,
    /// The sender asks the receiving process to shut down.
    RequestShutdown,
    /// The sender wants the host's process identity.
    Authenticate,
}

/// A request sent from a proxy to a host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Handshake. The only message valid without a token; may carry the
    /// out-of-band bootstrap secret the host was started with.
    Connection { bootstrap_token: Option<Uuid> },
    /// Orderly teardown of an authenticated connection.
    Disconnection {
        token: Uuid,
        interlocutor: Interlocutor,
    },
    /// A payload-free request.
    Simple { token: Uuid, purport: SimplePurport },
    /// Ask the receiver to replace the session configuration with the one
    /// reachable at `url`.
    Reconfiguration { token: Uuid, url: String },
    /// Instruct the receiver to start a session with the given
    /// configuration.
    SessionStart {
        token: Uuid,
        session_id: Uuid,
        configuration: SessionConfiguration,
    },
    /// Instruct the receiver to stop the identified session.
    SessionStop { token: Uuid, session_id: Uuid },
    /// Ask the receiving UI to collect a password from the user.
    PasswordRequest {
        token: Uuid,
        purpose: PasswordPurpose,
        request_id: Uuid,
    },
    /// Deliver the password collected for an earlier `PasswordRequest`.
    /// `password` is `None` when the user cancelled the prompt.
    PasswordReply {
        token: Uuid,
        request_id: Uuid,
        password: Option<String>,
    },
    /// Ask the receiving UI to show a message box.
    MessageBox {
        token: Uuid,
        title: String,
        message: String,
    },
}

impl Message {
    /// The token this message authenticates with, if it carries one.
    pub fn token(&self) -> Option<Uuid> {
        match self {
            Message::Connection { .. } => None,
            Message::Disconnection { token, .. }
            | Message::Simple { token, .. }
            | Message::Reconfiguration { token, .. }
            | Message::SessionStart { token, .. }
            | Message::SessionStop { token, .. }
            | Message::PasswordRequest { token, .. }
            | Message::PasswordReply { token, .. }
            | Message::MessageBox { token, .. } => Some(*token),
        }
    }
}

/// Outcome marker for responses that carry no payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponsePurport {
    /// The request was understood and handled.
    Acknowledged,
    /// The request carried no valid token and was not dispatched.
    Unauthorized,
    /// The host has no handler for this message.
    UnknownMessage,
}

/// A response sent from a host back to the requesting proxy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Payload-free outcome.
    Simple { purport: ResponsePurport },
    /// Handshake outcome. `token` is present iff `established`.
    Connection {
        token: Option<Uuid>,
        established: bool,
    },
    /// Teardown outcome. `terminated` is false when the token was unknown.
    Disconnection { terminated: bool },
    /// The session configuration, if the host has one.
    Configuration {
        configuration: Option<SessionConfiguration>,
    },
    /// The host's process identity.
    Authentication { process_id: u32 },
    /// Whether the receiver accepted a reconfiguration.
    Reconfiguration { accepted: bool },
    /// Whether the receiver accepted a session transition.
    Session { accepted: bool },
}

impl Response {
    pub fn acknowledged() -> Self {
        Response::Simple {
            purport: ResponsePurport::Acknowledged,
        }
    }

    pub fn unauthorized() -> Self {
        Response::Simple {
            purport: ResponsePurport::Unauthorized,
        }
    }

    pub fn unknown_message() -> Self {
        Response::Simple {
            purport: ResponsePurport::UnknownMessage,
        }
    }
}
