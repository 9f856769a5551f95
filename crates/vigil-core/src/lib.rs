//! Vigil Core - Session lifecycle and operation sequencing for the Vigil
//! lockdown environment.
//!
//! This crate provides the transport-independent half of the Vigil
//! session core: reversible operations and their fail-safe sequencing,
//! the process-wide session context, the coordination locks guarding
//! cross-cutting transitions, and the event seams an embedding UI
//! subscribes to. The IPC layer connecting the runtime, client, and
//! service processes lives in the `vigil-comm` crate.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vigil_core::{OperationSequence, SessionContext, SessionInitializationOperation};
//!
//! #[tokio::main]
//! async fn main() {
//!     let session = Arc::new(SessionContext::new());
//!     let mut sequence = OperationSequence::new(vec![
//!         Box::new(SessionInitializationOperation::new(session.clone())),
//!         // ... host startup, configuration retrieval, lockdown toggles
//!     ]);
//!
//!     let result = sequence.try_perform().await;
//!     assert!(result.is_success());
//! }
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod operations;
pub mod session;

// Re-export commonly used types
pub use config::CommConfig;
pub use coordinator::Coordinator;
pub use error::{Result, VigilError};
pub use events::{
    ActionHandler, ActionReply, ActionRequest, EventEmitter, PasswordPurpose, ProgressUpdate,
    SequenceObserver,
};
pub use operations::{
    Operation, OperationResult, OperationSequence, RepeatableOperation,
    RepeatableOperationSequence, SessionInitializationOperation,
};
pub use session::{SessionConfiguration, SessionContext, SessionSettings};
