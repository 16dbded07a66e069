// ABOUTME: Typed errors for reply routing invariants
// ABOUTME: Wiring mistakes surface as RouteError inside anyhow::Error

use thiserror::Error;

/// Errors raised when an event is asked to deliver something it has no means
/// to deliver. These indicate a wiring bug rather than a runtime condition.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("{op} called on an event with no broker attached")]
    NoBroker { op: &'static str },

    #[error("to_func is set but no reply function is attached")]
    NoReplyFunc,
}
