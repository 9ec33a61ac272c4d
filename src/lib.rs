//! Embeddable LSP client core.
//!
//! Spawns a language server as a child process, speaks JSON-RPC 2.0 over its
//! stdio with `Content-Length` framing, and exposes the handful of features
//! a small editor needs: completion, hover, go-to-definition, document sync,
//! and push diagnostics for the one document a session tracks.
//!
//! The layers, bottom up:
//!
//! - [`value`]: a self-contained JSON model and codec. Integers and floats
//!   stay distinct through a round trip, and object key order is preserved.
//! - [`codec`]: the `Content-Length: N\r\n\r\n` wire framing as a streaming
//!   decoder over arbitrary read chunk boundaries.
//! - [`LspSession`]: process lifecycle, the `initialize` handshake, request
//!   correlation, and teardown. Requests are plain `async fn`s; every one
//!   resolves, even when the server dies mid-flight.
//!
//! ```no_run
//! use quill_lsp::{LspSession, ServerConfig, SessionEvent};
//!
//! # async fn example() -> Result<(), quill_lsp::LspError> {
//! let (event_tx, mut event_rx) = tokio::sync::mpsc::channel(64);
//! let config = ServerConfig::new("rust-analyzer", "rust");
//! let session = LspSession::start(&config, "/my/project".as_ref(), event_tx).await?;
//!
//! session.did_open("file:///my/project/src/main.rs", "fn main() {}").await?;
//! let items = session.completion("file:///my/project/src/main.rs", 0, 11).await?;
//! println!("{} completions", items.len());
//!
//! while let Some(event) = event_rx.recv().await {
//!     match event {
//!         SessionEvent::Diagnostics { uri, diagnostics } => {
//!             println!("{uri}: {} diagnostics", diagnostics.len());
//!         }
//!         SessionEvent::Stopped { .. } => break,
//!     }
//! }
//! session.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod value;

mod error;
mod protocol;
mod session;
mod transport;
mod types;

pub use error::LspError;
pub use protocol::{PathToUriError, file_uri_to_path, path_to_file_uri};
pub use session::LspSession;
pub use types::{
    CompletionItem, Diagnostic, DiagnosticSeverity, Location, ServerConfig, SessionEvent,
    StopReason,
};
