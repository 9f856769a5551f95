//! Fail-safe, auto-rolling-back execution of ordered operations.
//!
//! `try_perform` runs operations in construction order and, on any
//! non-success, rolls back everything already performed in reverse order.
//! `try_revert` is the symmetric shutdown pathway. Repeatable sequences
//! additionally offer `try_repeat`, which re-applies every operation
//! forward without rollback (reconnect/resync, retried wholesale on the
//! next cycle).
//!
//! Neither entry point ever returns an `Err`: operation errors are logged
//! with the operation's identity and absorbed as `Failed`.

use super::{Operation, OperationResult, RepeatableOperation};
use crate::events::{ActionHandler, EventEmitter, ProgressUpdate, SequenceObserver};
use std::sync::Arc;
use tracing::{debug, error, info};

/// An ordered collection of operations with automatic rollback.
///
/// Created once per controller with a fixed operation list. The
/// `performed` stack only ever holds operations that either returned
/// `Success` from `perform` or errored out mid-way (and may therefore
/// have partial external state to undo).
pub struct OperationSequence {
    operations: Vec<Box<dyn Operation>>,
    performed: Vec<usize>,
    events: EventEmitter,
}

impl OperationSequence {
    pub fn new(operations: Vec<Box<dyn Operation>>) -> Self {
        Self {
            operations,
            performed: Vec::new(),
            events: EventEmitter::new(),
        }
    }

    /// The emitter shared with every contained operation.
    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    /// Register an observer for progress and status events of every
    /// contained operation.
    pub fn subscribe(&self, observer: Arc<dyn SequenceObserver>) {
        self.events.subscribe(observer);
    }

    /// Register the handler for synchronous user interaction.
    pub fn set_action_handler(&self, handler: Arc<dyn ActionHandler>) {
        self.events.set_action_handler(handler);
    }

    /// Execute all operations in order, rolling back on failure.
    ///
    /// Returns the first non-success result, or `Success` when every
    /// operation succeeded. The rollback's own outcome is logged but not
    /// surfaced.
    pub async fn try_perform(&mut self) -> OperationResult {
        let events = self.events.clone();
        events.progress(ProgressUpdate::Indeterminate(true));
        events.progress(ProgressUpdate::SetMax(self.operations.len()));

        let mut outcome = OperationResult::Success;
        for index in 0..self.operations.len() {
            // Pushed before invoking so an operation that errors out
            // mid-way is still rolled back.
            self.performed.push(index);
            let name = self.operations[index].name().to_string();
            events.status(&name);
            debug!("Performing operation '{}'", name);

            match self.operations[index].perform(&events).await {
                Ok(OperationResult::Success) => {
                    events.progress(ProgressUpdate::Advance);
                }
                Ok(result) => {
                    // Never reached Success, so there is nothing to undo.
                    self.performed.pop();
                    match result {
                        OperationResult::Aborted => info!("Operation '{}' was aborted", name),
                        _ => error!("Operation '{}' failed", name),
                    }
                    outcome = result;
                    break;
                }
                Err(e) => {
                    error!("Operation '{}' errored during perform: {}", name, e);
                    outcome = OperationResult::Failed;
                    break;
                }
            }
        }

        if !outcome.is_success() {
            let _ = self.revert_performed(&events, true).await;
        }

        events.progress(ProgressUpdate::Indeterminate(false));
        outcome
    }

    /// Revert all performed operations in reverse order.
    ///
    /// Never stops early: every tracked operation is reverted even when
    /// an earlier revert fails. Returns `Success` only if every revert
    /// succeeded.
    pub async fn try_revert(&mut self) -> OperationResult {
        let events = self.events.clone();
        events.progress(ProgressUpdate::Indeterminate(true));
        let outcome = self.revert_performed(&events, false).await;
        events.progress(ProgressUpdate::Indeterminate(false));
        outcome
    }

    async fn revert_performed(&mut self, events: &EventEmitter, regress: bool) -> OperationResult {
        let mut outcome = OperationResult::Success;
        while let Some(index) = self.performed.pop() {
            let name = self.operations[index].name().to_string();
            events.status(&name);
            debug!("Reverting operation '{}'", name);

            match self.operations[index].revert(events).await {
                Ok(OperationResult::Success) => {}
                Ok(_) => {
                    error!("Operation '{}' failed to revert", name);
                    outcome = OperationResult::Failed;
                }
                Err(e) => {
                    error!("Operation '{}' errored during revert: {}", name, e);
                    outcome = OperationResult::Failed;
                }
            }
            if regress {
                events.progress(ProgressUpdate::Regress);
            }
        }
        outcome
    }
}

/// An operation sequence whose members all support `repeat`.
///
/// Semantically identical to [`OperationSequence`] for perform/revert;
/// `try_repeat` adds the rollback-free resync pass.
pub struct RepeatableOperationSequence {
    operations: Vec<Box<dyn RepeatableOperation>>,
    performed: Vec<usize>,
    events: EventEmitter,
}

impl RepeatableOperationSequence {
    pub fn new(operations: Vec<Box<dyn RepeatableOperation>>) -> Self {
        Self {
            operations,
            performed: Vec::new(),
            events: EventEmitter::new(),
        }
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn subscribe(&self, observer: Arc<dyn SequenceObserver>) {
        self.events.subscribe(observer);
    }

    pub fn set_action_handler(&self, handler: Arc<dyn ActionHandler>) {
        self.events.set_action_handler(handler);
    }

    /// See [`OperationSequence::try_perform`].
    pub async fn try_perform(&mut self) -> OperationResult {
        let events = self.events.clone();
        events.progress(ProgressUpdate::Indeterminate(true));
        events.progress(ProgressUpdate::SetMax(self.operations.len()));

        let mut outcome = OperationResult::Success;
        for index in 0..self.operations.len() {
            self.performed.push(index);
            let name = self.operations[index].name().to_string();
            events.status(&name);
            debug!("Performing operation '{}'", name);

            match self.operations[index].perform(&events).await {
                Ok(OperationResult::Success) => {
                    events.progress(ProgressUpdate::Advance);
                }
                Ok(result) => {
                    self.performed.pop();
                    match result {
                        OperationResult::Aborted => info!("Operation '{}' was aborted", name),
                        _ => error!("Operation '{}' failed", name),
                    }
                    outcome = result;
                    break;
                }
                Err(e) => {
                    error!("Operation '{}' errored during perform: {}", name, e);
                    outcome = OperationResult::Failed;
                    break;
                }
            }
        }

        if !outcome.is_success() {
            let _ = self.revert_performed(&events, true).await;
        }

        events.progress(ProgressUpdate::Indeterminate(false));
        outcome
    }

    /// See [`OperationSequence::try_revert`].
    pub async fn try_revert(&mut self) -> OperationResult {
        let events = self.events.clone();
        events.progress(ProgressUpdate::Indeterminate(true));
        let outcome = self.revert_performed(&events, false).await;
        events.progress(ProgressUpdate::Indeterminate(false));
        outcome
    }

    /// Re-apply every operation in forward order, without rollback.
    ///
    /// Stops at the first non-success. Partial application is acceptable
    /// here: the repeat pathway is retried wholesale on the next cycle.
    pub async fn try_repeat(&mut self) -> OperationResult {
        let events = self.events.clone();
        events.progress(ProgressUpdate::Indeterminate(true));

        let mut outcome = OperationResult::Success;
        for operation in &mut self.operations {
            let name = operation.name().to_string();
            events.status(&name);
            debug!("Repeating operation '{}'", name);

            match operation.repeat(&events).await {
                Ok(OperationResult::Success) => {}
                Ok(result) => {
                    match result {
                        OperationResult::Aborted => info!("Operation '{}' was aborted", name),
                        _ => error!("Operation '{}' failed to repeat", name),
                    }
                    outcome = result;
                    break;
                }
                Err(e) => {
                    error!("Operation '{}' errored during repeat: {}", name, e);
                    outcome = OperationResult::Failed;
                    break;
                }
            }
        }

        events.progress(ProgressUpdate::Indeterminate(false));
        outcome
    }

    async fn revert_performed(&mut self, events: &EventEmitter, regress: bool) -> OperationResult {
        let mut outcome = OperationResult::Success;
        while let Some(index) = self.performed.pop() {
            let name = self.operations[index].name().to_string();
            events.status(&name);
            debug!("Reverting operation '{}'", name);

            match self.operations[index].revert(events).await {
                Ok(OperationResult::Success) => {}
                Ok(_) => {
                    error!("Operation '{}' failed to revert", name);
                    outcome = OperationResult::Failed;
                }
                Err(e) => {
                    error!("Operation '{}' errored during revert: {}", name, e);
                    outcome = OperationResult::Failed;
                }
            }
            if regress {
                events.progress(ProgressUpdate::Regress);
            }
        }
        outcome
    }
}
