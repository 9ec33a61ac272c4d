//! Public types consumed by the embedding editor.

use serde::Deserialize;

/// Configuration for a single language server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Executable command (e.g. "rust-analyzer", "clangd").
    pub command: String,
    /// Arguments to pass to the command.
    #[serde(default)]
    pub args: Vec<String>,
    /// LSP language identifier (e.g. "rust", "cpp").
    pub language_id: String,
}

impl ServerConfig {
    #[must_use]
    pub fn new(command: impl Into<String>, language_id: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            language_id: language_id.into(),
        }
    }
}

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagnosticSeverity {
    Error = 1,
    Warning = 2,
    Information = 3,
    Hint = 4,
}

impl DiagnosticSeverity {
    /// Convert from LSP numeric severity (1=Error, 2=Warning, 3=Info, 4=Hint).
    #[must_use]
    pub fn from_lsp(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::Error),
            2 => Some(Self::Warning),
            3 => Some(Self::Information),
            4 => Some(Self::Hint),
            _ => None,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Information => "info",
            Self::Hint => "hint",
        }
    }
}

/// A single diagnostic reported by the server.
///
/// Lines and columns are zero-based; columns are raw character counts, not
/// UTF-16 code units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub line: u32,
    pub col: u32,
    pub end_line: u32,
    pub end_col: u32,
    pub message: String,
    pub severity: DiagnosticSeverity,
}

/// One completion suggestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionItem {
    pub label: String,
    pub detail: Option<String>,
    /// Text to insert; defaults to `label` when the server omits it.
    pub insert_text: String,
    /// Raw LSP `CompletionItemKind`; 0 when the server omits it.
    pub kind: i64,
}

/// A definition target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub uri: String,
    pub line: u32,
    pub character: u32,
}

/// An event emitted by a session to its owner.
#[derive(Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// The server published diagnostics for the session's tracked document.
    Diagnostics {
        uri: String,
        diagnostics: Vec<Diagnostic>,
    },
    /// The session is gone: the server exited, the stream broke, or
    /// `stop()` ran to completion.
    Stopped { reason: StopReason },
}

/// Why a session stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The server closed its output stream.
    Exited,
    /// The reader hit an unrecoverable error (broken pipe, framing desync).
    Failed(String),
}
