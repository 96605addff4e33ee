//! Round observers.
//!
//! An observer is called synchronously after every round is appended to a
//! trace. Returning an error aborts the run: the protocol records the error,
//! keeps the round that triggered it, and dispatches no further calls.

use tracing::info;

use crate::core::Message;
use crate::error::ObserverError;

use super::outcome::Speaker;

/// Callback invoked after each appended round.
///
/// Closures with the matching signature implement this trait:
///
/// ```
/// use minions_rs::core::Message;
/// use minions_rs::error::ObserverError;
/// use minions_rs::protocol::{RoundObserver, Speaker};
///
/// let reject_remote = |speaker: Speaker, _message: &Message, _is_final: bool| {
///     if speaker == Speaker::Remote {
///         Err(ObserverError::new("remote calls disabled"))
///     } else {
///         Ok(())
///     }
/// };
/// assert!(reject_remote.on_round(Speaker::Local, &Message::assistant("x"), false).is_ok());
/// ```
pub trait RoundObserver: Send + Sync {
    /// Observes one round.
    ///
    /// # Errors
    ///
    /// Any error fails the run.
    fn on_round(
        &self,
        speaker: Speaker,
        message: &Message,
        is_final: bool,
    ) -> Result<(), ObserverError>;
}

impl<F> RoundObserver for F
where
    F: Fn(Speaker, &Message, bool) -> Result<(), ObserverError> + Send + Sync,
{
    fn on_round(
        &self,
        speaker: Speaker,
        message: &Message,
        is_final: bool,
    ) -> Result<(), ObserverError> {
        self(speaker, message, is_final)
    }
}

/// Observer that logs each round at `info` level. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl RoundObserver for TracingObserver {
    fn on_round(
        &self,
        speaker: Speaker,
        message: &Message,
        is_final: bool,
    ) -> Result<(), ObserverError> {
        info!(
            %speaker,
            bytes = message.content.len(),
            is_final,
            "Round appended"
        );
        Ok(())
    }
}
