//! Session lifecycle and request/response correlation.
//!
//! An [`LspSession`] owns one language server process end to end: it spawns
//! the child, drives the `initialize` handshake, correlates responses to
//! requests by id, and forwards diagnostics for the one document the session
//! tracks. A background reader task owns the server's stdout; all writes go
//! through the writer task in [`crate::transport`]. Every request future is
//! guaranteed to resolve: with the result, a server error, a timeout, or
//! [`LspError::SessionClosed`] when the session dies underneath it.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::process::Child;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::codec::FrameDecoder;
use crate::error::LspError;
use crate::protocol::{self, Incoming, ResponseError};
use crate::transport::{self, WriterCommand};
use crate::types::{CompletionItem, Location, ServerConfig, SessionEvent, StopReason};
use crate::value::{Object, Value};

const INIT_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);
const READ_CHUNK_BYTES: usize = 4096;

/// Where a session is in its life. There is no "not started" state: a
/// session value exists only once the process has been spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum LifecycleState {
    /// Spawned, `initialize` in flight.
    Starting = 0,
    /// Handshake complete; requests and notifications flow.
    Ready = 1,
    /// `stop()` is running.
    Stopping = 2,
    /// The reader exited or `stop()` finished.
    Stopped = 3,
}

impl LifecycleState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Starting,
            1 => Self::Ready,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Lock-free lifecycle flag shared between the session, the reader task,
/// and `stop()`.
#[derive(Debug)]
struct StateCell(AtomicU8);

impl StateCell {
    fn new(state: LifecycleState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn get(&self) -> LifecycleState {
        LifecycleState::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn set(&self, state: LifecycleState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    fn swap(&self, state: LifecycleState) -> LifecycleState {
        LifecycleState::from_u8(self.0.swap(state as u8, Ordering::SeqCst))
    }

    /// Move `from` to `to`; false if some other transition won the race.
    fn transition(&self, from: LifecycleState, to: LifecycleState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// In-flight requests awaiting a response, keyed by request id.
///
/// Dropping a sender (by clearing the map) resolves the caller with
/// [`LspError::SessionClosed`].
type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, ResponseError>>>>>;

/// A live connection to one language server.
pub struct LspSession {
    child: Mutex<Option<Child>>,
    writer_tx: mpsc::Sender<WriterCommand>,
    next_id: AtomicU64,
    pending: Pending,
    state: Arc<StateCell>,
    /// The one document whose diagnostics are forwarded. Set by `did_open`,
    /// cleared by a matching `did_close`.
    owned_doc: Arc<Mutex<Option<String>>>,
    doc_versions: Mutex<HashMap<String, i64>>,
    language_id: String,
    reader_handle: Mutex<Option<JoinHandle<()>>>,
}

impl LspSession {
    /// Spawn the configured server and complete the `initialize` handshake.
    ///
    /// On success the session is ready for requests. On failure the child
    /// (if spawned) is killed when the partially built session drops.
    pub async fn start(
        config: &ServerConfig,
        workspace_root: &Path,
        event_tx: mpsc::Sender<SessionEvent>,
    ) -> Result<Self, LspError> {
        let root_uri = protocol::path_to_file_uri(workspace_root)
            .map_err(|err| LspError::Initialize(err.to_string()))?;
        let (child, stdin, stdout) = transport::spawn_server(config)?;
        tracing::info!("spawned `{}` for {}", config.command, config.language_id);

        let session = Self::connect(stdin, stdout, config.language_id.clone(), event_tx);
        *session.child.lock().await = Some(child);
        session.initialize(root_uri.as_str()).await?;
        Ok(session)
    }

    /// Wire a session onto an arbitrary byte stream pair.
    ///
    /// Spawns the writer and reader tasks; the caller still has to run
    /// [`initialize`](Self::initialize) before issuing requests.
    fn connect<W, R>(
        writer: W,
        reader: R,
        language_id: String,
        event_tx: mpsc::Sender<SessionEvent>,
    ) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
        R: AsyncRead + Unpin + Send + 'static,
    {
        let writer_tx = transport::spawn_writer(writer);
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let state = Arc::new(StateCell::new(LifecycleState::Starting));
        let owned_doc = Arc::new(Mutex::new(None));

        let reader_handle = tokio::spawn(Self::reader_loop(
            reader,
            Arc::clone(&pending),
            Arc::clone(&state),
            Arc::clone(&owned_doc),
            event_tx,
            writer_tx.clone(),
        ));

        Self {
            child: Mutex::new(None),
            writer_tx,
            next_id: AtomicU64::new(1),
            pending,
            state,
            owned_doc,
            doc_versions: Mutex::new(HashMap::new()),
            language_id,
            reader_handle: Mutex::new(Some(reader_handle)),
        }
    }

    /// Run the `initialize` / `initialized` handshake.
    async fn initialize(&self, root_uri: &str) -> Result<(), LspError> {
        let params = protocol::initialize_params(root_uri);
        match self
            .request_with_timeout("initialize", Some(params), INIT_TIMEOUT)
            .await
        {
            Ok(_capabilities) => {
                self.send_notification("initialized", Some(Value::Object(Object::new())))
                    .await?;
                // The reader may already have hit EOF; a dead session must
                // not report ready.
                if self
                    .state
                    .transition(LifecycleState::Starting, LifecycleState::Ready)
                {
                    tracing::info!("lsp session ready ({})", self.language_id);
                    Ok(())
                } else {
                    Err(LspError::SessionClosed)
                }
            }
            Err(LspError::Server { code, message }) => {
                Err(LspError::Initialize(format!("{code}: {message}")))
            }
            Err(err) => Err(err),
        }
    }

    /// True until the reader loop or `stop()` has torn the session down.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(
            self.state.get(),
            LifecycleState::Starting | LifecycleState::Ready
        )
    }

    /// True once the handshake has completed and until teardown begins.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state.get() == LifecycleState::Ready
    }

    /// Request completions at a zero-based position.
    pub async fn completion(
        &self,
        uri: &str,
        line: u32,
        character: u32,
    ) -> Result<Vec<CompletionItem>, LspError> {
        self.ensure_ready()?;
        let result = self
            .request_with_timeout(
                "textDocument/completion",
                Some(protocol::position_params(uri, line, character)),
                REQUEST_TIMEOUT,
            )
            .await?;
        Ok(protocol::parse_completion_result(&result))
    }

    /// Request hover text at a zero-based position. `Ok(None)` when the
    /// server has nothing to show.
    pub async fn hover(
        &self,
        uri: &str,
        line: u32,
        character: u32,
    ) -> Result<Option<String>, LspError> {
        self.ensure_ready()?;
        let result = self
            .request_with_timeout(
                "textDocument/hover",
                Some(protocol::position_params(uri, line, character)),
                REQUEST_TIMEOUT,
            )
            .await?;
        Ok(protocol::parse_hover_result(&result))
    }

    /// Resolve the definition under a zero-based position.
    pub async fn definition(
        &self,
        uri: &str,
        line: u32,
        character: u32,
    ) -> Result<Option<Location>, LspError> {
        self.ensure_ready()?;
        let result = self
            .request_with_timeout(
                "textDocument/definition",
                Some(protocol::position_params(uri, line, character)),
                REQUEST_TIMEOUT,
            )
            .await?;
        Ok(protocol::parse_definition_result(&result))
    }

    /// Open a document at version 1 and start tracking its diagnostics.
    ///
    /// The session follows one document at a time; opening another one moves
    /// the diagnostics subscription to it.
    pub async fn did_open(&self, uri: &str, text: &str) -> Result<(), LspError> {
        self.ensure_ready()?;
        self.doc_versions.lock().await.insert(uri.to_string(), 1);
        *self.owned_doc.lock().await = Some(uri.to_string());
        self.send_notification(
            "textDocument/didOpen",
            Some(protocol::did_open_params(uri, &self.language_id, 1, text)),
        )
        .await
    }

    /// Send the full new text of a document, bumping its version.
    pub async fn did_change(&self, uri: &str, text: &str) -> Result<(), LspError> {
        self.ensure_ready()?;
        let version = {
            let mut versions = self.doc_versions.lock().await;
            let version = versions.entry(uri.to_string()).or_insert(0);
            *version += 1;
            *version
        };
        self.send_notification(
            "textDocument/didChange",
            Some(protocol::did_change_params(uri, version, text)),
        )
        .await
    }

    /// Close a document; if it was the tracked one, diagnostics stop flowing.
    pub async fn did_close(&self, uri: &str) -> Result<(), LspError> {
        self.ensure_ready()?;
        self.doc_versions.lock().await.remove(uri);
        {
            let mut owned = self.owned_doc.lock().await;
            if owned.as_deref() == Some(uri) {
                *owned = None;
            }
        }
        self.send_notification(
            "textDocument/didClose",
            Some(protocol::text_document_params(uri)),
        )
        .await
    }

    /// Tell the server a document was saved to disk.
    pub async fn did_save(&self, uri: &str) -> Result<(), LspError> {
        self.ensure_ready()?;
        self.send_notification(
            "textDocument/didSave",
            Some(protocol::text_document_params(uri)),
        )
        .await
    }

    /// Shut the session down.
    ///
    /// Runs the courtesy `shutdown`/`exit` exchange when the session was
    /// ready, waits briefly for the child to exit, then kills it. Idempotent;
    /// a concurrent second call returns immediately. Requests in flight
    /// resolve with [`LspError::SessionClosed`].
    pub async fn stop(&self) {
        let previous = self.state.swap(LifecycleState::Stopping);
        if previous == LifecycleState::Stopping {
            return;
        }

        if previous == LifecycleState::Ready {
            if let Err(err) = self
                .request_with_timeout("shutdown", None, SHUTDOWN_TIMEOUT)
                .await
            {
                tracing::debug!("shutdown request failed: {err}");
            }
            let _ = self
                .writer_tx
                .send(WriterCommand::Send(protocol::notification("exit", None)))
                .await;
        }
        let _ = self.writer_tx.send(WriterCommand::Shutdown).await;

        if let Some(mut child) = self.child.lock().await.take() {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, child.wait()).await {
                Ok(Ok(status)) => tracing::debug!("lsp server exited: {status}"),
                Ok(Err(err)) => tracing::warn!("waiting for lsp server failed: {err}"),
                Err(_) => {
                    tracing::warn!("lsp server did not exit in time; killing");
                    if let Err(err) = child.kill().await {
                        tracing::warn!("failed to kill lsp server: {err}");
                    }
                }
            }
        }

        if let Some(handle) = self.reader_handle.lock().await.take() {
            let _ = handle.await;
        }
        self.pending.lock().await.clear();
        self.state.set(LifecycleState::Stopped);
    }

    fn ensure_ready(&self) -> Result<(), LspError> {
        if self.state.get() == LifecycleState::Ready {
            Ok(())
        } else {
            Err(LspError::NotReady)
        }
    }

    /// Send a request and await its response.
    ///
    /// On timeout or channel loss the pending entry is removed so a late
    /// response cannot resolve anything; it is logged and discarded.
    async fn request_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        deadline: Duration,
    ) -> Result<Value, LspError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let message = protocol::request(id, method, params);
        if self
            .writer_tx
            .send(WriterCommand::Send(message))
            .await
            .is_err()
        {
            self.pending.lock().await.remove(&id);
            return Err(LspError::TransportClosed);
        }

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(error))) => Err(LspError::Server {
                code: error.code,
                message: error.message,
            }),
            Ok(Err(_)) => Err(LspError::SessionClosed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                tracing::debug!("request `{method}` (id {id}) timed out");
                Err(LspError::Timeout)
            }
        }
    }

    async fn send_notification(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), LspError> {
        self.writer_tx
            .send(WriterCommand::Send(protocol::notification(method, params)))
            .await
            .map_err(|_| LspError::TransportClosed)
    }

    /// Drain the server's stdout until EOF or an unrecoverable error.
    ///
    /// On exit the session is marked stopped, every pending request is
    /// resolved with `SessionClosed`, and a final [`SessionEvent::Stopped`]
    /// is emitted.
    async fn reader_loop<R>(
        mut reader: R,
        pending: Pending,
        state: Arc<StateCell>,
        owned_doc: Arc<Mutex<Option<String>>>,
        event_tx: mpsc::Sender<SessionEvent>,
        writer_tx: mpsc::Sender<WriterCommand>,
    ) where
        R: AsyncRead + Unpin,
    {
        let mut decoder = FrameDecoder::new();
        let mut chunk = vec![0u8; READ_CHUNK_BYTES];
        let reason = 'read: loop {
            match reader.read(&mut chunk).await {
                Ok(0) => break 'read StopReason::Exited,
                Ok(n) => {
                    decoder.extend(&chunk[..n]);
                    loop {
                        match decoder.next_frame() {
                            Ok(Some(body)) => {
                                Self::dispatch_frame(
                                    &body, &pending, &owned_doc, &event_tx, &writer_tx,
                                )
                                .await;
                            }
                            Ok(None) => break,
                            // Framing errors desynchronize the stream; there
                            // is no way to find the next message boundary.
                            Err(err) => break 'read StopReason::Failed(err.to_string()),
                        }
                    }
                }
                Err(err) => break 'read StopReason::Failed(err.to_string()),
            }
        };

        state.set(LifecycleState::Stopped);
        pending.lock().await.clear();
        match &reason {
            StopReason::Exited => tracing::info!("lsp server closed its output"),
            StopReason::Failed(err) => tracing::warn!("lsp reader stopped: {err}"),
        }
        let _ = event_tx.send(SessionEvent::Stopped { reason }).await;
    }

    /// Route one decoded frame.
    ///
    /// Malformed bodies are logged and dropped; only framing-level failures
    /// (handled by the caller) are fatal to the session.
    async fn dispatch_frame(
        body: &[u8],
        pending: &Pending,
        owned_doc: &Arc<Mutex<Option<String>>>,
        event_tx: &mpsc::Sender<SessionEvent>,
        writer_tx: &mpsc::Sender<WriterCommand>,
    ) {
        let Ok(text) = std::str::from_utf8(body) else {
            tracing::debug!("discarding non-UTF-8 frame");
            return;
        };
        let message = match Value::parse(text) {
            Ok(message) => message,
            Err(err) => {
                tracing::debug!("discarding unparseable frame: {err}");
                return;
            }
        };

        match protocol::classify(&message) {
            Some(Incoming::Response { id, result, error }) => {
                let sender = pending.lock().await.remove(&id);
                if let Some(sender) = sender {
                    let outcome = match error {
                        Some(error) => Err(error),
                        None => Ok(result.unwrap_or(Value::Null)),
                    };
                    let _ = sender.send(outcome);
                } else {
                    // Late response after a timeout, or an id we never used.
                    tracing::trace!("response for unknown request id {id}");
                }
            }
            Some(Incoming::Request { id, method }) => {
                tracing::debug!("rejecting server-initiated request `{method}`");
                let _ = writer_tx
                    .send(WriterCommand::Send(protocol::method_not_found(&id, &method)))
                    .await;
            }
            Some(Incoming::Notification { method, params }) => {
                if method == "textDocument/publishDiagnostics" {
                    let Some((uri, diagnostics)) = params
                        .as_ref()
                        .and_then(protocol::parse_publish_diagnostics)
                    else {
                        return;
                    };
                    let tracked = owned_doc.lock().await.as_deref() == Some(uri.as_str());
                    if tracked {
                        let _ = event_tx
                            .send(SessionEvent::Diagnostics { uri, diagnostics })
                            .await;
                    } else {
                        tracing::trace!("diagnostics for untracked document {uri}");
                    }
                } else {
                    tracing::trace!("ignoring notification `{method}`");
                }
            }
            None => tracing::trace!("discarding unclassifiable message"),
        }
    }
}
