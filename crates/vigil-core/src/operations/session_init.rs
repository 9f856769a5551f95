//! Session initialization operation.

use super::{Operation, OperationResult, RepeatableOperation};
use crate::events::EventEmitter;
use crate::session::SessionContext;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Mints the session correlation id and flips the running flag.
///
/// Typically the first operation of a startup sequence; reverting it is
/// the last step of shutdown and clears the whole session context.
pub struct SessionInitializationOperation {
    session: Arc<SessionContext>,
}

impl SessionInitializationOperation {
    pub fn new(session: Arc<SessionContext>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Operation for SessionInitializationOperation {
    fn name(&self) -> &str {
        "session initialization"
    }

    async fn perform(&mut self, _events: &EventEmitter) -> Result<OperationResult> {
        let id = Uuid::new_v4();
        self.session.set_session_id(id);
        self.session.set_running(true);
        info!("Initialized session {}", id);
        Ok(OperationResult::Success)
    }

    async fn revert(&mut self, _events: &EventEmitter) -> Result<OperationResult> {
        if let Some(id) = self.session.session_id() {
            info!("Tearing down session {}", id);
        }
        self.session.reset();
        Ok(OperationResult::Success)
    }
}

#[async_trait]
impl RepeatableOperation for SessionInitializationOperation {
    async fn repeat(&mut self, _events: &EventEmitter) -> Result<OperationResult> {
        // Keep the existing id across a reconnect; only mint a fresh one
        // if the context was lost entirely.
        if self.session.session_id().is_none() {
            self.session.set_session_id(Uuid::new_v4());
        }
        self.session.set_running(true);
        debug!("Session context re-validated");
        Ok(OperationResult::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_perform_populates_context() {
        let session = Arc::new(SessionContext::new());
        let mut operation = SessionInitializationOperation::new(session.clone());
        let events = EventEmitter::new();

        let result = operation.perform(&events).await.unwrap();
        assert_eq!(result, OperationResult::Success);
        assert!(session.session_id().is_some());
        assert!(session.is_running());
    }

    #[tokio::test]
    async fn test_revert_resets_context() {
        let session = Arc::new(SessionContext::new());
        let mut operation = SessionInitializationOperation::new(session.clone());
        let events = EventEmitter::new();

        operation.perform(&events).await.unwrap();
        let result = operation.revert(&events).await.unwrap();

        assert_eq!(result, OperationResult::Success);
        assert!(session.session_id().is_none());
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn test_revert_without_perform_is_harmless() {
        let session = Arc::new(SessionContext::new());
        let mut operation = SessionInitializationOperation::new(session.clone());
        let events = EventEmitter::new();

        let result = operation.revert(&events).await.unwrap();
        assert_eq!(result, OperationResult::Success);
    }

    #[tokio::test]
    async fn test_repeat_keeps_existing_session_id() {
        let session = Arc::new(SessionContext::new());
        let mut operation = SessionInitializationOperation::new(session.clone());
        let events = EventEmitter::new();

        operation.perform(&events).await.unwrap();
        let original = session.session_id().unwrap();

        operation.repeat(&events).await.unwrap();
        assert_eq!(session.session_id(), Some(original));
        assert!(session.is_running());
    }
}
