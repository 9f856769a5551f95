//! Communication proxy: the sending end of Vigil IPC.
//!
//! A proxy connects to a host, performs the token handshake, and exposes
//! the IPC vocabulary as typed methods. Every remote call is fallible;
//! callers handle the `Err` arm instead of assuming delivery. Without a
//! token the proxy fails fast and never touches the wire.

use crate::messages::{Interlocutor, Message, Response, ResponsePurport, SimplePurport};
use crate::protocol::{read_frame, write_frame};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vigil_core::events::PasswordPurpose;
use vigil_core::{CommConfig, Result, SessionConfiguration, VigilError};

/// Notification seam for proxy-detected transport failures.
pub trait ConnectionObserver: Send + Sync {
    /// The liveness loop gave up on the host.
    fn connection_lost(&self);
}

/// Client end of a host connection.
///
/// Shared by `Arc`; the auto-ping task holds a weak reference so dropping
/// the last user handle tears the loop down.
pub struct CommunicationProxy {
    addr: SocketAddr,
    owner: Interlocutor,
    stream: Mutex<Option<TcpStream>>,
    token: StdMutex<Option<Uuid>>,
    observers: StdMutex<Vec<Arc<dyn ConnectionObserver>>>,
    ping_task: StdMutex<Option<JoinHandle<()>>>,
}

impl CommunicationProxy {
    pub fn new(addr: SocketAddr, owner: Interlocutor) -> Self {
        Self {
            addr,
            owner,
            stream: Mutex::new(None),
            token: StdMutex::new(None),
            observers: StdMutex::new(Vec::new()),
            ping_task: StdMutex::new(None),
        }
    }

    pub fn subscribe(&self, observer: Arc<dyn ConnectionObserver>) {
        self.observers.lock().unwrap().push(observer);
    }

    /// Whether a communication token is currently held.
    pub fn is_connected(&self) -> bool {
        self.token.lock().unwrap().is_some()
    }

    /// Connect to the host and perform the token handshake.
    ///
    /// With `auto_ping`, a background task probes the host every
    /// [`CommConfig::PING_INTERVAL`] and notifies observers once
    /// [`CommConfig::MAX_PING_FAILURES`] consecutive probes fail or the
    /// transport breaks outright.
    pub async fn connect(
        self: &Arc<Self>,
        bootstrap_token: Option<Uuid>,
        auto_ping: bool,
    ) -> Result<()> {
        let stream = tokio::time::timeout(
            CommConfig::CONNECT_TIMEOUT,
            TcpStream::connect(self.addr),
        )
        .await
        .map_err(|_| VigilError::ConnectionFailed {
            addr: self.addr.to_string(),
            message: format!("no answer within {:?}", CommConfig::CONNECT_TIMEOUT),
        })?
        .map_err(|e| VigilError::ConnectionFailed {
            addr: self.addr.to_string(),
            message: e.to_string(),
        })?;

        *self.stream.lock().await = Some(stream);

        let response = self
            .round_trip(&Message::Connection { bootstrap_token })
            .await?;
        match response {
            Response::Connection {
                token: Some(token),
                established: true,
            } => {
                *self.token.lock().unwrap() = Some(token);
                info!("Connected to communication host at {}", self.addr);
                if auto_ping {
                    self.spawn_ping_task();
                }
                Ok(())
            }
            Response::Connection { .. } => {
                *self.stream.lock().await = None;
                warn!("Communication host at {} denied the connection", self.addr);
                Err(VigilError::ConnectionDenied)
            }
            _ => {
                *self.stream.lock().await = None;
                Err(VigilError::UnexpectedResponse {
                    expected: "Connection",
                })
            }
        }
    }

    /// Tear the connection down, best effort.
    ///
    /// The token and stream are always cleared locally, even when the host
    /// is unreachable or refuses the teardown. Returns whether the host
    /// confirmed the termination.
    pub async fn disconnect(&self) -> Result<bool> {
        self.stop_ping_task();

        let token = self.token.lock().unwrap().take();
        let Some(token) = token else {
            return Ok(false);
        };

        let result = self
            .round_trip(&Message::Disconnection {
                token,
                interlocutor: self.owner,
            })
            .await;
        *self.stream.lock().await = None;

        match result {
            Ok(Response::Disconnection { terminated }) => {
                info!("Disconnected from communication host at {}", self.addr);
                Ok(terminated)
            }
            Ok(other) => {
                warn!("Unexpected disconnection response: {:?}", other);
                Ok(false)
            }
            Err(e) => {
                warn!("Disconnection from {} did not complete: {}", self.addr, e);
                Ok(false)
            }
        }
    }

    /// Liveness probe.
    pub async fn ping(&self) -> Result<()> {
        self.send_simple(SimplePurport::Ping).await
    }

    /// Retrieve the host's process identity.
    pub async fn authenticate(&self) -> Result<u32> {
        let response = self.request_simple(SimplePurport::Authenticate).await?;
        match response {
            Response::Authentication { process_id } => Ok(process_id),
            other => Err(Self::unexpected(other, "Authentication")),
        }
    }

    /// Tell the runtime the client UI is fully initialized.
    pub async fn inform_client_ready(&self) -> Result<()> {
        self.send_simple(SimplePurport::ClientIsReady).await
    }

    /// Fetch the session configuration from the host, if it has one.
    pub async fn request_configuration(&self) -> Result<Option<SessionConfiguration>> {
        let response = self
            .request_simple(SimplePurport::ConfigurationNeeded)
            .await?;
        match response {
            Response::Configuration { configuration } => Ok(configuration),
            other => Err(Self::unexpected(other, "Configuration")),
        }
    }

    /// Ask the receiving process to shut down.
    pub async fn request_shutdown(&self) -> Result<()> {
        self.send_simple(SimplePurport::RequestShutdown).await
    }

    /// Ask the receiver to replace the session configuration. Returns
    /// whether the receiver accepted.
    pub async fn request_reconfiguration(&self, url: &str) -> Result<bool> {
        let token = self.current_token()?;
        let response = self
            .round_trip(&Message::Reconfiguration {
                token,
                url: url.to_string(),
            })
            .await?;
        match response {
            Response::Reconfiguration { accepted } => Ok(accepted),
            other => Err(Self::unexpected(other, "Reconfiguration")),
        }
    }

    /// Instruct the receiver to start a session. Returns whether the
    /// receiver accepted the transition.
    pub async fn start_session(
        &self,
        session_id: Uuid,
        configuration: SessionConfiguration,
    ) -> Result<bool> {
        let token = self.current_token()?;
        let response = self
            .round_trip(&Message::SessionStart {
                token,
                session_id,
                configuration,
            })
            .await?;
        match response {
            Response::Session { accepted } => Ok(accepted),
            other => Err(Self::unexpected(other, "Session")),
        }
    }

    /// Instruct the receiver to stop the identified session.
    pub async fn stop_session(&self, session_id: Uuid) -> Result<bool> {
        let token = self.current_token()?;
        let response = self
            .round_trip(&Message::SessionStop { token, session_id })
            .await?;
        match response {
            Response::Session { accepted } => Ok(accepted),
            other => Err(Self::unexpected(other, "Session")),
        }
    }

    /// Ask the receiving UI to collect a password from the user.
    pub async fn request_password(&self, purpose: PasswordPurpose, request_id: Uuid) -> Result<()> {
        let token = self.current_token()?;
        let response = self
            .round_trip(&Message::PasswordRequest {
                token,
                purpose,
                request_id,
            })
            .await?;
        Self::expect_acknowledged(response)
    }

    /// Deliver the password the user entered for an earlier
    /// [`Self::request_password`]. Pass `None` when the user cancelled.
    pub async fn submit_password(
        &self,
        request_id: Uuid,
        password: Option<String>,
    ) -> Result<()> {
        let token = self.current_token()?;
        let response = self
            .round_trip(&Message::PasswordReply {
                token,
                request_id,
                password,
            })
            .await?;
        Self::expect_acknowledged(response)
    }

    /// Ask the receiving UI to show a message box.
    pub async fn show_message_box(&self, title: &str, message: &str) -> Result<()> {
        let token = self.current_token()?;
        let response = self
            .round_trip(&Message::MessageBox {
                token,
                title: title.to_string(),
                message: message.to_string(),
            })
            .await?;
        Self::expect_acknowledged(response)
    }

    fn current_token(&self) -> Result<Uuid> {
        self.token.lock().unwrap().ok_or(VigilError::NotConnected)
    }

    async fn send_simple(&self, purport: SimplePurport) -> Result<()> {
        let response = self.request_simple(purport).await?;
        Self::expect_acknowledged(response)
    }

    async fn request_simple(&self, purport: SimplePurport) -> Result<Response> {
        let token = self.current_token()?;
        self.round_trip(&Message::Simple { token, purport }).await
    }

    async fn round_trip(&self, message: &Message) -> Result<Response> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(VigilError::NotConnected)?;

        let bytes = serde_json::to_vec(message)?;
        write_frame(stream, &bytes).await?;

        let frame = tokio::time::timeout(CommConfig::REQUEST_TIMEOUT, read_frame(stream))
            .await
            .map_err(|_| VigilError::Timeout(CommConfig::REQUEST_TIMEOUT))??;
        let payload = frame.ok_or_else(|| VigilError::ConnectionLost {
            addr: self.addr.to_string(),
        })?;

        Ok(serde_json::from_slice(&payload)?)
    }

    fn expect_acknowledged(response: Response) -> Result<()> {
        match response {
            Response::Simple {
                purport: ResponsePurport::Acknowledged,
            } => Ok(()),
            Response::Simple {
                purport: ResponsePurport::Unauthorized,
            } => Err(VigilError::Unauthorized),
            other => Err(Self::unexpected(other, "Acknowledged")),
        }
    }

    fn unexpected(response: Response, expected: &'static str) -> VigilError {
        if let Response::Simple {
            purport: ResponsePurport::Unauthorized,
        } = response
        {
            VigilError::Unauthorized
        } else {
            debug!("Unexpected IPC response: {:?}", response);
            VigilError::UnexpectedResponse { expected }
        }
    }

    fn spawn_ping_task(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(CommConfig::PING_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick fires immediately; skip it so the handshake settles.
            interval.tick().await;

            let mut failures: u32 = 0;
            loop {
                interval.tick().await;
                let Some(proxy) = weak.upgrade() else {
                    break;
                };
                match proxy.ping().await {
                    Ok(()) => failures = 0,
                    Err(e) => {
                        failures += 1;
                        warn!(
                            "Ping to {} failed ({}/{}): {}",
                            proxy.addr,
                            failures,
                            CommConfig::MAX_PING_FAILURES,
                            e
                        );
                        if e.is_connection_error() || failures >= CommConfig::MAX_PING_FAILURES {
                            error!("Connection to host at {} lost", proxy.addr);
                            proxy.handle_connection_lost().await;
                            break;
                        }
                    }
                }
            }
        });

        let mut slot = self.ping_task.lock().unwrap();
        if let Some(old) = slot.replace(task) {
            old.abort();
        }
    }

    async fn handle_connection_lost(&self) {
        *self.token.lock().unwrap() = None;
        *self.stream.lock().await = None;

        let observers: Vec<_> = self.observers.lock().unwrap().clone();
        for observer in observers {
            observer.connection_lost();
        }
    }

    fn stop_ping_task(&self) {
        if let Some(task) = self.ping_task.lock().unwrap().take() {
            task.abort();
        }
    }
}

impl Drop for CommunicationProxy {
    fn drop(&mut self) {
        self.stop_ping_task();
    }
}

impl std::fmt::Debug for CommunicationProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommunicationProxy")
            .field("addr", &self.addr)
            .field("owner", &self.owner)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_requests_fail_fast_without_token() {
        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let proxy = CommunicationProxy::new(addr, Interlocutor::Client);

        assert!(!proxy.is_connected());
        assert!(matches!(
            proxy.ping().await,
            Err(VigilError::NotConnected)
        ));
        assert!(matches!(
            proxy.inform_client_ready().await,
            Err(VigilError::NotConnected)
        ));
        assert!(matches!(
            proxy.start_session(Uuid::new_v4(), SessionConfiguration::default()).await,
            Err(VigilError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_disconnect_without_connection_is_harmless() {
        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let proxy = CommunicationProxy::new(addr, Interlocutor::Client);

        let terminated = proxy.disconnect().await.unwrap();
        assert!(!terminated);
        assert!(!proxy.is_connected());
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        // Bind and immediately drop to get a port that refuses connections
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let proxy = Arc::new(CommunicationProxy::new(addr, Interlocutor::Client));
        let result = proxy.connect(None, false).await;
        assert!(matches!(result, Err(VigilError::ConnectionFailed { .. })));
        assert!(!proxy.is_connected());
    }
}
