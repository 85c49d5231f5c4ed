//! Error types for the live view protocol and session lifecycle.

use thiserror::Error;

/// Everything that can go wrong inside a live view session or its server.
///
/// Only `OperationNotFound` is recoverable (a view may install a fallback
/// handler, see [`crate::ops::OperationRegistry::on_unhandled`]); every other
/// variant terminates the offending session. Fault isolation is
/// per-connection: one failed session never affects another.
#[derive(Debug, Error)]
pub enum LiveError {
    /// The connect handshake referenced a path with no registered view.
    #[error("no view registered for path {0:?}")]
    UnknownPath(String),

    /// An invoke message referenced an identifier missing from the registry.
    #[error("unhandled invocation {0:?}")]
    OperationNotFound(String),

    /// A message could not be decoded. Fatal: the protocol has no
    /// resynchronization mechanism.
    #[error("malformed message: {0}")]
    Decode(#[from] serde_json::Error),

    /// A binary frame arrived where the protocol requires text.
    #[error("unexpected binary frame")]
    BinaryFrame,

    /// The peer closed the connection. Expected termination, not a fault.
    #[error("connection closed")]
    ConnectionClosed,

    #[cfg(not(target_arch = "wasm32"))]
    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),

    #[cfg(not(target_arch = "wasm32"))]
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl LiveError {
    /// Whether this error is the normal end of a connection rather than a
    /// protocol or application fault.
    pub fn is_disconnect(&self) -> bool {
        match self {
            LiveError::ConnectionClosed => true,
            #[cfg(not(target_arch = "wasm32"))]
            LiveError::Transport(
                tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed,
            ) => true,
            // A peer that vanishes without the closing handshake (a closed
            // browser tab) is still a normal disconnect.
            #[cfg(not(target_arch = "wasm32"))]
            LiveError::Transport(tungstenite::Error::Protocol(
                tungstenite::error::ProtocolError::ResetWithoutClosingHandshake,
            )) => true,
            _ => false,
        }
    }
}
