//! Construction of hosts and proxies.
//!
//! Components depend on the factory instead of constructing endpoints
//! inline, so tests can wire hosts and proxies against ephemeral ports
//! and alternative handlers.

use crate::host::{CommunicationHost, HostHandler};
use crate::messages::Interlocutor;
use crate::proxy::CommunicationProxy;
use std::net::SocketAddr;
use std::sync::Arc;

/// Capacity of a runtime host: one slot for the client, one for the
/// service.
pub const RUNTIME_HOST_CAPACITY: usize = 2;
/// Capacity of a client or service host: the runtime only.
pub const PEER_HOST_CAPACITY: usize = 1;

#[derive(Debug, Default, Clone, Copy)]
pub struct EndpointFactory;

impl EndpointFactory {
    pub fn new() -> Self {
        Self
    }

    pub fn create_host(
        &self,
        handler: Arc<dyn HostHandler>,
        capacity: usize,
    ) -> Arc<CommunicationHost> {
        Arc::new(CommunicationHost::new(handler, capacity))
    }

    pub fn create_proxy(
        &self,
        addr: SocketAddr,
        owner: Interlocutor,
    ) -> Arc<CommunicationProxy> {
        Arc::new(CommunicationProxy::new(addr, owner))
    }
}
