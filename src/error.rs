//! Error taxonomy for the client.
//!
//! Transport failures (spawn, broken pipe, EOF) are fatal to a session;
//! malformed frames are dropped by the reader loop and never surface here.

use thiserror::Error;

/// Errors surfaced by [`LspSession`](crate::LspSession) operations.
#[derive(Debug, Error)]
pub enum LspError {
    /// The configured server executable is not in `PATH`.
    #[error("`{0}` not found in PATH")]
    CommandNotFound(String),

    /// The server executable exists but could not be launched.
    #[error("failed to spawn `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The spawned child did not expose the expected pipe.
    #[error("child process has no {0} pipe")]
    MissingPipe(&'static str),

    /// A request or notification was issued before the handshake completed.
    /// Nothing was written to the server.
    #[error("session is not ready")]
    NotReady,

    /// The write path to the server is gone.
    #[error("transport closed")]
    TransportClosed,

    /// The server rejected the `initialize` request.
    #[error("initialize failed: {0}")]
    Initialize(String),

    /// The server answered with a JSON-RPC error object.
    #[error("server error {code}: {message}")]
    Server { code: i64, message: String },

    /// No response arrived within the request deadline. The pending entry
    /// has been removed; a late response will be discarded.
    #[error("request timed out")]
    Timeout,

    /// The session was stopped (or the server died) while the request was
    /// in flight.
    #[error("session stopped before the response arrived")]
    SessionClosed,
}
