//! Operations binding the IPC layer into startup sequences.
//!
//! Transport faults inside an operation are rendered as `Failed` results
//! (with the error logged), so the owning sequence rolls back instead of
//! aborting mid-flight with an unwound stack.

use crate::host::CommunicationHost;
use crate::proxy::CommunicationProxy;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, info};
use vigil_core::events::EventEmitter;
use vigil_core::operations::{Operation, OperationResult, RepeatableOperation};
use vigil_core::{Result, SessionContext};

/// Starts the process's communication host; reverting stops it.
///
/// `repeat` re-validates the host and restarts it if the accept loop died
/// since the last pass, which is what keeps a resumed session reachable.
pub struct CommunicationHostOperation {
    host: Arc<CommunicationHost>,
    port: u16,
}

impl CommunicationHostOperation {
    /// `port` 0 binds an ephemeral port; query it via [`Self::addr`] after
    /// the operation has performed.
    pub fn new(host: Arc<CommunicationHost>, port: u16) -> Self {
        Self { host, port }
    }

    pub fn addr(&self) -> Option<SocketAddr> {
        self.host.addr()
    }

    async fn start_host(&self) -> OperationResult {
        match self.host.start(self.port).await {
            Ok(addr) => {
                debug!("Communication host bound to {}", addr);
                OperationResult::Success
            }
            Err(e) => {
                error!("Could not start communication host: {}", e);
                OperationResult::Failed
            }
        }
    }
}

#[async_trait]
impl Operation for CommunicationHostOperation {
    fn name(&self) -> &str {
        "communication host"
    }

    async fn perform(&mut self, _events: &EventEmitter) -> Result<OperationResult> {
        Ok(self.start_host().await)
    }

    async fn revert(&mut self, _events: &EventEmitter) -> Result<OperationResult> {
        match self.host.stop().await {
            Ok(()) => Ok(OperationResult::Success),
            Err(e) => {
                error!("Could not stop communication host: {}", e);
                Ok(OperationResult::Failed)
            }
        }
    }
}

#[async_trait]
impl RepeatableOperation for CommunicationHostOperation {
    async fn repeat(&mut self, _events: &EventEmitter) -> Result<OperationResult> {
        if self.host.is_running() {
            debug!("Communication host is still up");
            return Ok(OperationResult::Success);
        }
        info!("Communication host is down, restarting it");
        // Clear any stale lifecycle before binding again
        if let Err(e) = self.host.stop().await {
            debug!("Stale host lifecycle cleanup reported: {}", e);
        }
        Ok(self.start_host().await)
    }
}

/// Announces client readiness to the runtime.
pub struct ClientReadinessOperation {
    proxy: Arc<CommunicationProxy>,
}

impl ClientReadinessOperation {
    pub fn new(proxy: Arc<CommunicationProxy>) -> Self {
        Self { proxy }
    }
}

#[async_trait]
impl Operation for ClientReadinessOperation {
    fn name(&self) -> &str {
        "client readiness"
    }

    async fn perform(&mut self, _events: &EventEmitter) -> Result<OperationResult> {
        match self.proxy.inform_client_ready().await {
            Ok(()) => Ok(OperationResult::Success),
            Err(e) => {
                error!("Could not announce client readiness: {}", e);
                Ok(OperationResult::Failed)
            }
        }
    }

    async fn revert(&mut self, _events: &EventEmitter) -> Result<OperationResult> {
        // Readiness is implicitly withdrawn when the connection closes
        Ok(OperationResult::Success)
    }
}

/// Fetches the session configuration from the runtime and installs it in
/// the local session context.
pub struct ConfigurationFetchOperation {
    proxy: Arc<CommunicationProxy>,
    session: Arc<SessionContext>,
}

impl ConfigurationFetchOperation {
    pub fn new(proxy: Arc<CommunicationProxy>, session: Arc<SessionContext>) -> Self {
        Self { proxy, session }
    }
}

#[async_trait]
impl Operation for ConfigurationFetchOperation {
    fn name(&self) -> &str {
        "configuration retrieval"
    }

    async fn perform(&mut self, _events: &EventEmitter) -> Result<OperationResult> {
        match self.proxy.request_configuration().await {
            Ok(Some(configuration)) => {
                self.session.set_configuration(configuration);
                Ok(OperationResult::Success)
            }
            Ok(None) => {
                error!("Host has no session configuration to hand out");
                Ok(OperationResult::Failed)
            }
            Err(e) => {
                error!("Could not retrieve session configuration: {}", e);
                Ok(OperationResult::Failed)
            }
        }
    }

    async fn revert(&mut self, _events: &EventEmitter) -> Result<OperationResult> {
        // The context reset at the end of the rollback clears the
        // configuration; nothing to undo here.
        Ok(OperationResult::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostHandler;
    use crate::messages::{Interlocutor, Message, Response, SimplePurport};
    use uuid::Uuid;

    struct AcceptAllHandler;

    #[async_trait]
    impl HostHandler for AcceptAllHandler {
        fn owner(&self) -> Interlocutor {
            Interlocutor::Runtime
        }

        async fn accept_connection(&self, _bootstrap_token: Option<Uuid>) -> bool {
            true
        }

        async fn on_disconnected(&self, _interlocutor: Interlocutor) {}

        async fn on_simple_message(&self, _purport: SimplePurport) -> Response {
            Response::acknowledged()
        }

        async fn on_message(&self, _message: Message) -> Response {
            Response::acknowledged()
        }
    }

    #[tokio::test]
    async fn test_host_operation_lifecycle() {
        let host = Arc::new(CommunicationHost::new(Arc::new(AcceptAllHandler), 1));
        let mut operation = CommunicationHostOperation::new(host.clone(), 0);
        let events = EventEmitter::new();

        let result = operation.perform(&events).await.unwrap();
        assert_eq!(result, OperationResult::Success);
        assert!(host.is_running());
        assert!(operation.addr().is_some());

        let result = operation.revert(&events).await.unwrap();
        assert_eq!(result, OperationResult::Success);
        assert!(!host.is_running());
    }

    #[tokio::test]
    async fn test_host_operation_repeat_restarts_dead_host() {
        let host = Arc::new(CommunicationHost::new(Arc::new(AcceptAllHandler), 1));
        let mut operation = CommunicationHostOperation::new(host.clone(), 0);
        let events = EventEmitter::new();

        operation.perform(&events).await.unwrap();

        // Out-of-band stop, as if the accept loop died
        host.stop().await.unwrap();
        assert!(!host.is_running());

        let result = operation.repeat(&events).await.unwrap();
        assert_eq!(result, OperationResult::Success);
        assert!(host.is_running());

        // The restarted host accepts new connections
        let proxy = Arc::new(CommunicationProxy::new(
            host.addr().unwrap(),
            Interlocutor::Client,
        ));
        proxy.connect(None, false).await.unwrap();
        proxy.ping().await.unwrap();
        proxy.disconnect().await.unwrap();

        // A healthy host is left alone
        let addr = host.addr();
        let result = operation.repeat(&events).await.unwrap();
        assert_eq!(result, OperationResult::Success);
        assert_eq!(host.addr(), addr);

        host.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_readiness_operation_fails_without_connection() {
        let addr: std::net::SocketAddr = "127.0.0.1:9".parse().unwrap();
        let proxy = Arc::new(CommunicationProxy::new(addr, Interlocutor::Client));
        let mut operation = ClientReadinessOperation::new(proxy);
        let events = EventEmitter::new();

        let result = operation.perform(&events).await.unwrap();
        assert_eq!(result, OperationResult::Failed);
    }
}
