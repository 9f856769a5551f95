//! Communication host: the receiving end of Vigil IPC.
//!
//! A host listens on a loopback TCP port, authenticates connecting proxies
//! via the token handshake, and dispatches validated messages to its
//! [`HostHandler`]. All message processing is serialized behind a single
//! lock, so a handler never observes two requests concurrently and state
//! transitions (token issuance, session changes) cannot interleave.

use crate::messages::{Interlocutor, Message, Response, SimplePurport};
use crate::protocol::{read_frame, write_frame};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vigil_core::{CommConfig, Result, VigilError};

/// Role-specific message handling plugged into a [`CommunicationHost`].
///
/// The host has already validated the token by the time `on_simple_message`
/// or `on_message` runs, and it answers `Ping` itself; handlers only see
/// requests that are authenticated and meaningful.
#[async_trait]
pub trait HostHandler: Send + Sync + 'static {
    /// The role of the process this handler serves.
    fn owner(&self) -> Interlocutor;

    /// Decide whether to accept a new connection. `bootstrap_token` is the
    /// out-of-band secret the peer presented, if any.
    async fn accept_connection(&self, bootstrap_token: Option<Uuid>) -> bool;

    /// An authenticated interlocutor has disconnected (its token is already
    /// withdrawn).
    async fn on_disconnected(&self, interlocutor: Interlocutor);

    /// Handle a payload-free request. Never called for `Ping`.
    async fn on_simple_message(&self, purport: SimplePurport) -> Response;

    /// Handle a payload-bearing request.
    async fn on_message(&self, message: Message) -> Response;
}

struct HostLifecycle {
    shutdown_tx: oneshot::Sender<()>,
    conn_shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Listening endpoint with token-based authorization.
///
/// `capacity` bounds the number of concurrently authenticated proxies: a
/// runtime host serves the client and the service (capacity 2), client and
/// service hosts serve only the runtime (capacity 1).
pub struct CommunicationHost {
    handler: Arc<dyn HostHandler>,
    capacity: usize,
    tokens: Mutex<Vec<Uuid>>,
    lifecycle: Mutex<Option<HostLifecycle>>,
    addr: StdMutex<Option<SocketAddr>>,
    running: Arc<AtomicBool>,
}

impl CommunicationHost {
    pub fn new(handler: Arc<dyn HostHandler>, capacity: usize) -> Self {
        Self {
            handler,
            capacity,
            tokens: Mutex::new(Vec::new()),
            lifecycle: Mutex::new(None),
            addr: StdMutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Bind the loopback listener and spawn the accept loop.
    ///
    /// Returns the bound address (useful with port 0). Fails if the port is
    /// taken or the host is already running.
    pub async fn start(self: &Arc<Self>, port: u16) -> Result<SocketAddr> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.is_some() {
            return Err(VigilError::HostStartFailed {
                message: "host is already running".to_string(),
            });
        }

        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|e| VigilError::HostStartFailed {
                message: format!("could not bind 127.0.0.1:{}: {}", port, e),
            })?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (conn_shutdown_tx, conn_shutdown_rx) = watch::channel(false);

        // A fresh run starts with a fresh token set; stale tokens from a
        // previous run must not consume capacity slots.
        self.tokens.lock().await.clear();

        self.running.store(true, Ordering::SeqCst);
        *self.addr.lock().unwrap() = Some(addr);

        // The loop holds only a weak handle; dropping the host drops the
        // shutdown sender, which wakes the loop and ends it.
        let host = Arc::downgrade(self);
        let running = self.running.clone();
        let task = tokio::spawn(async move {
            Self::accept_loop(host, running, listener, shutdown_rx, conn_shutdown_rx).await;
        });

        *lifecycle = Some(HostLifecycle {
            shutdown_tx,
            conn_shutdown_tx,
            task,
        });

        info!("Communication host for {} listening on {}", self.handler.owner(), addr);
        Ok(addr)
    }

    /// Stop the host: close the listener, signal open connections, and wait
    /// up to [`CommConfig::HOST_STOP_TIMEOUT`] for the accept loop to exit.
    ///
    /// Stopping a host that is not running is a no-op.
    pub async fn stop(&self) -> Result<()> {
        let lifecycle = self.lifecycle.lock().await.take();
        let Some(lifecycle) = lifecycle else {
            return Ok(());
        };

        let _ = lifecycle.shutdown_tx.send(());
        let _ = lifecycle.conn_shutdown_tx.send(true);

        let joined = tokio::time::timeout(CommConfig::HOST_STOP_TIMEOUT, lifecycle.task).await;
        self.running.store(false, Ordering::SeqCst);
        self.tokens.lock().await.clear();

        match joined {
            Ok(Ok(())) => {
                info!("Communication host for {} stopped", self.handler.owner());
                Ok(())
            }
            Ok(Err(e)) => Err(VigilError::Other(format!("host accept loop panicked: {}", e))),
            Err(_) => Err(VigilError::HostStopTimeout(CommConfig::HOST_STOP_TIMEOUT)),
        }
    }

    /// Whether the accept loop is alive.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The bound address of the most recent `start`.
    pub fn addr(&self) -> Option<SocketAddr> {
        *self.addr.lock().unwrap()
    }

    async fn accept_loop(
        host: std::sync::Weak<Self>,
        running: Arc<AtomicBool>,
        listener: TcpListener,
        mut shutdown_rx: oneshot::Receiver<()>,
        conn_shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    debug!("Communication host shutting down");
                    break;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let Some(host) = host.upgrade() else { break };
                            debug!("Accepted IPC connection from {}", peer);
                            let conn_shutdown = conn_shutdown_rx.clone();
                            tokio::spawn(async move {
                                host.serve_connection(stream, conn_shutdown).await;
                            });
                        }
                        Err(e) => {
                            error!("Communication host accept failed: {}", e);
                            break;
                        }
                    }
                }
            }
        }
        running.store(false, Ordering::SeqCst);
    }

    async fn serve_connection(&self, mut stream: TcpStream, mut shutdown: watch::Receiver<bool>) {
        loop {
            let frame = tokio::select! {
                _ = shutdown.changed() => break,
                frame = read_frame(&mut stream) => frame,
            };

            let payload = match frame {
                Ok(Some(payload)) => payload,
                Ok(None) => break,
                Err(e) => {
                    warn!("Dropping IPC connection after read error: {}", e);
                    break;
                }
            };

            let response = match serde_json::from_slice::<Message>(&payload) {
                Ok(message) => self.process(message).await,
                Err(e) => {
                    warn!("Received unparseable IPC message: {}", e);
                    Response::unknown_message()
                }
            };

            let bytes = match serde_json::to_vec(&response) {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!("Could not serialize IPC response: {}", e);
                    break;
                }
            };
            if let Err(e) = write_frame(&mut stream, &bytes).await {
                warn!("Dropping IPC connection after write error: {}", e);
                break;
            }
        }
    }

    /// Process one message and produce the response.
    ///
    /// Holds the token lock for the full duration, which serializes every
    /// request against every other and against connection setup/teardown.
    pub async fn process(&self, message: Message) -> Response {
        let mut tokens = self.tokens.lock().await;

        match message {
            Message::Connection { bootstrap_token } => {
                // No tokens are minted while shutting down; a handshake
                // racing stop() must not survive into the next run.
                if !self.is_running() {
                    debug!("Denied IPC connection: host is not running");
                    return Response::Connection {
                        token: None,
                        established: false,
                    };
                }
                if tokens.len() >= self.capacity {
                    debug!(
                        "Denied IPC connection: all {} slots are taken",
                        self.capacity
                    );
                    return Response::Connection {
                        token: None,
                        established: false,
                    };
                }
                if self.handler.accept_connection(bootstrap_token).await {
                    let token = Uuid::new_v4();
                    tokens.push(token);
                    info!("Issued communication token to a new interlocutor");
                    Response::Connection {
                        token: Some(token),
                        established: true,
                    }
                } else {
                    warn!("Denied IPC connection: handler rejected the handshake");
                    Response::Connection {
                        token: None,
                        established: false,
                    }
                }
            }

            Message::Disconnection {
                token,
                interlocutor,
            } => {
                if let Some(position) = tokens.iter().position(|t| *t == token) {
                    tokens.remove(position);
                    info!("Interlocutor {} disconnected", interlocutor);
                    self.handler.on_disconnected(interlocutor).await;
                    Response::Disconnection { terminated: true }
                } else {
                    warn!("Ignoring disconnection with unknown token");
                    Response::Disconnection { terminated: false }
                }
            }

            Message::Simple { token, purport } => {
                if !tokens.contains(&token) {
                    debug!("Rejected {:?} message with invalid token", purport);
                    return Response::unauthorized();
                }
                if purport == SimplePurport::Ping {
                    return Response::acknowledged();
                }
                self.handler.on_simple_message(purport).await
            }

            other => match other.token() {
                Some(token) if tokens.contains(&token) => self.handler.on_message(other).await,
                _ => {
                    debug!("Rejected payload message with invalid token");
                    Response::unauthorized()
                }
            },
        }
    }
}
