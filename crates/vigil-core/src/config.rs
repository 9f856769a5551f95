//! Centralized configuration for Vigil.
//!
//! Configuration constants for the communication layer and operation
//! sequencing. Values are compile-time constants; the embedding process
//! decides ports and bootstrap tokens at composition time.

use std::time::Duration;

/// Communication-layer configuration.
pub struct CommConfig;

impl CommConfig {
    /// Timeout for a proxy establishing its TCP connection.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Timeout for a single request/response round trip.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    /// How long `stop()` waits for the host's accept loop to join.
    pub const HOST_STOP_TIMEOUT: Duration = Duration::from_secs(2);

    /// Cadence of the proxy's automatic liveness check.
    pub const PING_INTERVAL: Duration = Duration::from_secs(1);

    /// Consecutive ping failures before the connection is declared lost.
    pub const MAX_PING_FAILURES: u32 = 3;

    /// Upper bound on a single IPC frame. Frames claiming more are
    /// rejected before any allocation.
    pub const MAX_MESSAGE_SIZE: usize = 1_048_576; // 1MB
}
