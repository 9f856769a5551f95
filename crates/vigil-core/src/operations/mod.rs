//! Reversible units of startup/shutdown work and their sequencing.
//!
//! An [`Operation`] is a three-phase contract: `perform` does forward
//! work, `revert` undoes it, and (for repeatable operations) `repeat`
//! re-applies it idempotently after a reconnect. Operations report
//! expected outcomes as [`OperationResult`] values; an `Err` escaping an
//! operation is the analogue of an uncaught exception and is absorbed at
//! the sequence boundary.

mod sequence;
mod session_init;

pub use sequence::{OperationSequence, RepeatableOperationSequence};
pub use session_init::SessionInitializationOperation;

use crate::events::EventEmitter;
use crate::Result;
use async_trait::async_trait;

/// Tri-state outcome of an operation phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    /// Expected, user- or policy-driven stop. Not an error.
    Aborted,
    /// Unexpected or invalid condition.
    Failed,
    /// Proceed.
    Success,
}

impl OperationResult {
    pub fn is_success(self) -> bool {
        matches!(self, OperationResult::Success)
    }
}

/// A single reversible unit of work hosted by an operation sequence.
///
/// Implementations carry their own dependencies (session context,
/// proxies, host handles) and communicate with the user only through the
/// supplied [`EventEmitter`]. Expected failures are returned as
/// [`OperationResult::Failed`] or [`OperationResult::Aborted`]; `Err` is
/// reserved for conditions the operation cannot classify, and is treated
/// as `Failed` by the sequence.
#[async_trait]
pub trait Operation: Send + Sync {
    /// Short human-readable name, used for status events and logs.
    fn name(&self) -> &str;

    /// Execute the forward work. Called at most once per sequence run.
    async fn perform(&mut self, events: &EventEmitter) -> Result<OperationResult>;

    /// Undo the forward work.
    ///
    /// The sequence only reverts operations it tracked as performed, but
    /// implementations must still tolerate partial external state (a
    /// perform that errored midway).
    async fn revert(&mut self, events: &EventEmitter) -> Result<OperationResult>;
}

/// An operation that can be re-applied without assuming `perform` ran
/// first in this process lifetime. Used for reconnect/resync pathways.
#[async_trait]
pub trait RepeatableOperation: Operation {
    /// Re-execute idempotently (e.g. restart a communication host that
    /// silently stopped).
    async fn repeat(&mut self, events: &EventEmitter) -> Result<OperationResult>;
}
