//! Error taxonomy shared by every player backend.

/// Errors surfaced by the player, playlist and library contracts.
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    /// I/O failure talking to a backend. Recoverable: the notification
    /// stream reconnects on its own, the failing request surfaces this.
    #[error("backend transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Malformed or unexpected response token. Not retried.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Caller error, e.g. an invalid playstate token.
    #[error("invalid state: {0}")]
    State(String),

    /// Acknowledgment deadline exceeded. The backend may still apply
    /// the command later; the result is observable via events.
    #[error("timeout waiting for backend acknowledgment")]
    Timeout,

    /// The backend has no way to perform this operation.
    #[error("not supported by this backend: {0}")]
    Unsupported(&'static str),
}

/// Result alias used throughout the player contracts.
pub type Result<T> = std::result::Result<T, PlayerError>;
