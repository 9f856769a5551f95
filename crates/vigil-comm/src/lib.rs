//! Vigil Comm - Authenticated loopback IPC for the Vigil lockdown
//! environment.
//!
//! Each Vigil process (runtime, browser client, system service) runs a
//! [`CommunicationHost`] for incoming requests and holds
//! [`CommunicationProxy`] handles to its peers. Hosts issue a random
//! communication token per connection; every subsequent request must
//! carry it, and requests without a valid token are rejected before any
//! handler runs. Proxies keep connections alive with periodic pings and
//! notify observers when the peer goes away.
//!
//! Transport is loopback TCP with length-prefixed JSON frames; see
//! [`protocol`] for the framing and [`messages`] for the vocabulary.

pub mod factory;
pub mod host;
pub mod hosts;
pub mod messages;
pub mod operations;
pub mod protocol;
pub mod proxy;

// Re-export commonly used types
pub use factory::{EndpointFactory, PEER_HOST_CAPACITY, RUNTIME_HOST_CAPACITY};
pub use host::{CommunicationHost, HostHandler};
pub use hosts::{
    ClientHostEvent, ClientHostHandler, PasswordReply, RuntimeHostHandler, ServiceHostHandler,
};
pub use messages::{Interlocutor, Message, Response, ResponsePurport, SimplePurport};
pub use operations::{
    ClientReadinessOperation, CommunicationHostOperation, ConfigurationFetchOperation,
};
pub use proxy::{CommunicationProxy, ConnectionObserver};
