//! Child-process plumbing: spawning the server and serializing writes.
//!
//! All outbound traffic funnels through a single writer task that owns the
//! server's stdin. Callers enqueue [`WriterCommand`]s on an mpsc channel,
//! which keeps frames whole on the wire without a lock around the pipe.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;

use crate::codec::encode_frame;
use crate::error::LspError;
use crate::types::ServerConfig;
use crate::value::Value;

pub(crate) const WRITER_CHANNEL_CAPACITY: usize = 64;

/// Commands accepted by the writer task.
#[derive(Debug)]
pub(crate) enum WriterCommand {
    /// Frame and write one message.
    Send(Value),
    /// Flush nothing further and exit; stdin is dropped, closing the pipe.
    Shutdown,
}

/// Launch the configured server with piped stdin/stdout.
///
/// stderr is discarded. The child is killed on drop so an aborted session
/// cannot leak a server process.
pub(crate) fn spawn_server(
    config: &ServerConfig,
) -> Result<(Child, ChildStdin, ChildStdout), LspError> {
    let resolved = which::which(&config.command)
        .map_err(|_| LspError::CommandNotFound(config.command.clone()))?;

    let mut child = Command::new(resolved)
        .args(&config.args)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| LspError::Spawn {
            command: config.command.clone(),
            source,
        })?;

    let stdin = child.stdin.take().ok_or(LspError::MissingPipe("stdin"))?;
    let stdout = child.stdout.take().ok_or(LspError::MissingPipe("stdout"))?;
    Ok((child, stdin, stdout))
}

/// Spawn the writer task and return its command channel.
///
/// The task exits on [`WriterCommand::Shutdown`], on channel close, or on
/// the first write error; the reader loop observes the dead pipe and tears
/// the session down.
pub(crate) fn spawn_writer<W>(mut writer: W) -> mpsc::Sender<WriterCommand>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel(WRITER_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            match command {
                WriterCommand::Send(message) => {
                    let frame = encode_frame(&message.serialize());
                    if let Err(err) = write_frame(&mut writer, &frame).await {
                        tracing::warn!("lsp write failed: {err}");
                        break;
                    }
                }
                WriterCommand::Shutdown => break,
            }
        }
        // Closes the server's stdin so it sees EOF even if `exit` got lost.
        let _ = writer.shutdown().await;
    });
    tx
}

async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &[u8],
) -> std::io::Result<()> {
    writer.write_all(frame).await?;
    writer.flush().await
}
