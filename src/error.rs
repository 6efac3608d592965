//! Error taxonomy for the agent core.
//!
//! Only two conditions are errors in the `Result` sense:
//!
//! * [`AgentError::InvalidInput`] — a programming error (pair count outside
//!   the game limits, a circuit that crosses the A/B partition). Fatal to the
//!   control loop.
//! * [`AgentError::Transport`] — the game server could not be reached after
//!   the retry budget was spent. Fatal when it happens during a status or
//!   graph refresh; an individual claim that fails in transit is downgraded
//!   to a failed attempt by the orchestrator.
//!
//! Everything else the game can say "no" about — admission gate rejects,
//! simulation rejects, server-side claim rejections — is ordinary control
//! flow and is represented as values, not errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    /// A caller violated a hard game constraint. Not retryable.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The game server was unreachable or returned an undecodable payload
    /// after all retries.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The agent configuration failed validation at construction time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AgentError {
    /// True for failures that terminate the control loop regardless of
    /// where they surface.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AgentError::InvalidInput(_) | AgentError::InvalidConfig(_))
    }
}
