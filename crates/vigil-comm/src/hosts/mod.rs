//! Role-specific host handlers for the three Vigil processes.

mod client;
mod runtime;
mod service;

pub use client::{ClientHostEvent, ClientHostHandler};
pub use runtime::{PasswordReply, RuntimeHostHandler};
pub use service::ServiceHostHandler;
