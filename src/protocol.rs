//! JSON-RPC envelopes and typed extraction of LSP payloads.
//!
//! Builders produce [`Value`] messages for the writer; extractors pull the
//! few shapes this client cares about out of inbound values, tolerating the
//! variations real servers produce (completion arrays vs. `items` objects,
//! hover contents as string/object/array, definition as Location or array).

use std::path::{Path, PathBuf};

use crate::types::{CompletionItem, Diagnostic, DiagnosticSeverity, Location};
use crate::value::{Object, Value};

/// An absolute path could not be expressed as a `file://` URI.
#[derive(Debug, thiserror::Error)]
#[error("cannot convert path to file URI: {}", path.display())]
pub struct PathToUriError {
    path: PathBuf,
}

/// A decoded inbound message.
#[derive(Debug)]
pub(crate) enum Incoming {
    /// A response to one of our requests.
    Response {
        id: u64,
        result: Option<Value>,
        error: Option<ResponseError>,
    },
    /// A server-initiated request; we answer every one with MethodNotFound.
    Request { id: Value, method: String },
    /// A server notification (no id).
    Notification {
        method: String,
        params: Option<Value>,
    },
}

/// The `error` member of a JSON-RPC response.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResponseError {
    pub code: i64,
    pub message: String,
}

pub(crate) fn request(id: u64, method: &str, params: Option<Value>) -> Value {
    let mut message = Object::new();
    message.insert("jsonrpc", "2.0");
    message.insert("id", id as i64);
    message.insert("method", method);
    if let Some(params) = params {
        message.insert("params", params);
    }
    Value::Object(message)
}

pub(crate) fn notification(method: &str, params: Option<Value>) -> Value {
    let mut message = Object::new();
    message.insert("jsonrpc", "2.0");
    message.insert("method", method);
    if let Some(params) = params {
        message.insert("params", params);
    }
    Value::Object(message)
}

/// Reply for server-initiated requests we do not implement.
pub(crate) fn method_not_found(id: &Value, method: &str) -> Value {
    let mut error = Object::new();
    error.insert("code", -32601);
    error.insert("message", format!("method not found: {method}"));
    let mut message = Object::new();
    message.insert("jsonrpc", "2.0");
    message.insert("id", id.clone());
    message.insert("error", error);
    Value::Object(message)
}

pub(crate) fn initialize_params(root_uri: &str) -> Value {
    let synchronization = Value::object([
        ("dynamicRegistration", Value::Bool(false)),
        ("willSave", Value::Bool(false)),
        ("didSave", Value::Bool(true)),
        ("openClose", Value::Bool(true)),
    ]);
    let completion = Value::object([(
        "completionItem",
        Value::object([("snippetSupport", Value::Bool(false))]),
    )]);
    let text_document = Value::object([
        ("synchronization", synchronization),
        ("completion", completion),
        ("hover", Value::Object(Object::new())),
        ("definition", Value::Object(Object::new())),
        ("publishDiagnostics", Value::Object(Object::new())),
    ]);
    Value::object([
        ("processId", Value::from(i64::from(std::process::id()))),
        ("rootUri", Value::from(root_uri)),
        ("capabilities", Value::object([("textDocument", text_document)])),
    ])
}

pub(crate) fn did_open_params(uri: &str, language_id: &str, version: i64, text: &str) -> Value {
    Value::object([(
        "textDocument",
        Value::object([
            ("uri", Value::from(uri)),
            ("languageId", Value::from(language_id)),
            ("version", Value::from(version)),
            ("text", Value::from(text)),
        ]),
    )])
}

/// Whole-document sync: a single content change replacing the full text.
pub(crate) fn did_change_params(uri: &str, version: i64, text: &str) -> Value {
    Value::object([
        (
            "textDocument",
            Value::object([("uri", Value::from(uri)), ("version", Value::from(version))]),
        ),
        (
            "contentChanges",
            Value::array([Value::object([("text", Value::from(text))])]),
        ),
    ])
}

pub(crate) fn text_document_params(uri: &str) -> Value {
    Value::object([(
        "textDocument",
        Value::object([("uri", Value::from(uri))]),
    )])
}

/// Params for completion/hover/definition. Zero-based line and character;
/// character is a raw character count, not UTF-16 units.
pub(crate) fn position_params(uri: &str, line: u32, character: u32) -> Value {
    Value::object([
        (
            "textDocument",
            Value::object([("uri", Value::from(uri))]),
        ),
        (
            "position",
            Value::object([
                ("line", Value::from(line)),
                ("character", Value::from(character)),
            ]),
        ),
    ])
}

/// Split an inbound value into response / server request / notification.
///
/// Returns `None` for values that fit none of the three shapes.
pub(crate) fn classify(message: &Value) -> Option<Incoming> {
    let object = message.as_object()?;
    let id = object.get("id");
    let method = object
        .get("method")
        .and_then(Value::as_str)
        .map(String::from);
    let has_result_or_error =
        object.contains_key("result") || object.contains_key("error");

    match (id, method, has_result_or_error) {
        (Some(id), None, true) => Some(Incoming::Response {
            id: u64::try_from(id.as_int()?).ok()?,
            result: object.get("result").cloned(),
            error: object.get("error").map(parse_response_error),
        }),
        (Some(id), Some(method), _) => Some(Incoming::Request {
            id: id.clone(),
            method,
        }),
        (None, Some(method), _) => Some(Incoming::Notification {
            method,
            params: object.get("params").cloned(),
        }),
        _ => None,
    }
}

fn parse_response_error(error: &Value) -> ResponseError {
    ResponseError {
        code: error.get("code").and_then(Value::as_int).unwrap_or(0),
        message: error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string(),
    }
}

/// Extract `(uri, diagnostics)` from `textDocument/publishDiagnostics` params.
pub(crate) fn parse_publish_diagnostics(params: &Value) -> Option<(String, Vec<Diagnostic>)> {
    let uri = params.get("uri")?.as_str()?.to_string();
    let mut diagnostics = Vec::new();
    if let Some(items) = params.get("diagnostics").and_then(Value::as_array) {
        for item in items {
            if let Some(diagnostic) = parse_diagnostic(item) {
                diagnostics.push(diagnostic);
            }
        }
    }
    Some((uri, diagnostics))
}

fn parse_diagnostic(item: &Value) -> Option<Diagnostic> {
    item.as_object()?;
    let position = |v: Option<&Value>, key: &str, default: u32| {
        v.and_then(|p| p.get(key))
            .and_then(Value::as_int)
            .map_or(default, |n| n as u32)
    };
    let range = item.get("range");
    let start = range.and_then(|r| r.get("start"));
    let end = range.and_then(|r| r.get("end"));
    let line = position(start, "line", 0);
    let col = position(start, "character", 0);
    Some(Diagnostic {
        line,
        col,
        end_line: position(end, "line", line),
        end_col: position(end, "character", col),
        message: item
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        severity: item
            .get("severity")
            .and_then(Value::as_int)
            .and_then(DiagnosticSeverity::from_lsp)
            .unwrap_or(DiagnosticSeverity::Error),
    })
}

/// Extract completion items from a `textDocument/completion` result.
///
/// The result is either a bare item array or `{isIncomplete, items}`.
pub(crate) fn parse_completion_result(result: &Value) -> Vec<CompletionItem> {
    let items = match result.get("items") {
        Some(items) => items,
        None => result,
    };
    let Some(items) = items.as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            item.as_object()?;
            let label = item
                .get("label")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let insert_text = item
                .get("insertText")
                .and_then(Value::as_str)
                .map_or_else(|| label.clone(), String::from);
            Some(CompletionItem {
                detail: item
                    .get("detail")
                    .and_then(Value::as_str)
                    .map(String::from),
                insert_text,
                kind: item.get("kind").and_then(Value::as_int).unwrap_or(0),
                label,
            })
        })
        .collect()
}

/// Extract hover text from a `textDocument/hover` result.
///
/// `contents` may be a plain string, a `{value}` object (MarkedString or
/// MarkupContent), or an array of either; array entries are joined with
/// newlines. `None` when the result carries no contents.
pub(crate) fn parse_hover_result(result: &Value) -> Option<String> {
    let contents = result.get("contents")?;
    if let Some(text) = contents.as_str() {
        return Some(text.to_string());
    }
    if let Some(text) = contents.get("value").and_then(Value::as_str) {
        return Some(text.to_string());
    }
    if let Some(parts) = contents.as_array() {
        let mut out = String::new();
        for part in parts {
            let text = part
                .as_str()
                .or_else(|| part.get("value").and_then(Value::as_str));
            if let Some(text) = text {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(text);
            }
        }
        return Some(out);
    }
    None
}

/// Extract the first location from a `textDocument/definition` result.
///
/// The result is a single Location or an array of them.
pub(crate) fn parse_definition_result(result: &Value) -> Option<Location> {
    let location = match result.as_array() {
        Some(locations) => locations.first()?,
        None => result,
    };
    let uri = location.get("uri")?.as_str()?.to_string();
    let start = location.get("range").and_then(|r| r.get("start"));
    let coordinate = |key: &str| {
        start
            .and_then(|s| s.get(key))
            .and_then(Value::as_int)
            .map_or(0, |n| n as u32)
    };
    Some(Location {
        uri,
        line: coordinate("line"),
        character: coordinate("character"),
    })
}

/// Convert an absolute filesystem path to a `file://` URI.
pub fn path_to_file_uri(path: &Path) -> Result<url::Url, PathToUriError> {
    url::Url::from_file_path(path).map_err(|()| PathToUriError {
        path: path.to_path_buf(),
    })
}

/// Convert a `file://` URI (as found in [`Location`] or diagnostics) back to
/// a filesystem path. `None` for non-file or malformed URIs.
#[must_use]
pub fn file_uri_to_path(uri: &str) -> Option<PathBuf> {
    url::Url::parse(uri).ok()?.to_file_path().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_envelope() {
        let message = request(
            42,
            "initialize",
            Some(Value::object([("rootUri", Value::from("file:///ws"))])),
        );
        assert_eq!(message.get("jsonrpc").unwrap().as_str(), Some("2.0"));
        assert_eq!(message.get("id").unwrap().as_int(), Some(42));
        assert_eq!(message.get("method").unwrap().as_str(), Some("initialize"));
        assert_eq!(
            message.get("params").unwrap().get("rootUri").unwrap().as_str(),
            Some("file:///ws")
        );
    }

    #[test]
    fn request_without_params_omits_field() {
        let message = request(1, "shutdown", None);
        assert!(message.get("params").is_none());
    }

    #[test]
    fn notification_has_no_id() {
        let message = notification("exit", None);
        assert!(message.get("id").is_none());
        assert_eq!(message.get("method").unwrap().as_str(), Some("exit"));
        assert!(message.get("params").is_none());
    }

    #[test]
    fn initialize_params_capabilities() {
        let params = initialize_params("file:///workspace");
        assert_eq!(
            params.get("rootUri").unwrap().as_str(),
            Some("file:///workspace")
        );
        assert!(params.get("processId").unwrap().as_int().is_some());

        let text_document = params
            .get("capabilities")
            .unwrap()
            .get("textDocument")
            .unwrap();
        let sync = text_document.get("synchronization").unwrap();
        assert_eq!(sync.get("dynamicRegistration").unwrap().as_bool(), Some(false));
        assert_eq!(sync.get("willSave").unwrap().as_bool(), Some(false));
        assert_eq!(sync.get("didSave").unwrap().as_bool(), Some(true));
        assert_eq!(sync.get("openClose").unwrap().as_bool(), Some(true));
        assert_eq!(
            text_document
                .get("completion")
                .unwrap()
                .get("completionItem")
                .unwrap()
                .get("snippetSupport")
                .unwrap()
                .as_bool(),
            Some(false)
        );
        for capability in ["hover", "definition", "publishDiagnostics"] {
            assert!(text_document.get(capability).unwrap().as_object().is_some());
        }
    }

    #[test]
    fn did_open_and_did_change_params() {
        let open = did_open_params("file:///a.rs", "rust", 1, "fn main() {}");
        let doc = open.get("textDocument").unwrap();
        assert_eq!(doc.get("uri").unwrap().as_str(), Some("file:///a.rs"));
        assert_eq!(doc.get("languageId").unwrap().as_str(), Some("rust"));
        assert_eq!(doc.get("version").unwrap().as_int(), Some(1));

        let change = did_change_params("file:///a.rs", 2, "fn main() { 42 }");
        assert_eq!(
            change
                .get("textDocument")
                .unwrap()
                .get("version")
                .unwrap()
                .as_int(),
            Some(2)
        );
        let changes = change.get("contentChanges").unwrap().as_array().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(
            changes[0].get("text").unwrap().as_str(),
            Some("fn main() { 42 }")
        );
    }

    #[test]
    fn position_params_zero_based() {
        let params = position_params("file:///a.rs", 3, 5);
        let position = params.get("position").unwrap();
        assert_eq!(position.get("line").unwrap().as_int(), Some(3));
        assert_eq!(position.get("character").unwrap().as_int(), Some(5));
    }

    #[test]
    fn classify_response() {
        let message =
            Value::parse(r#"{"jsonrpc":"2.0","id":7,"result":{"capabilities":{}}}"#).unwrap();
        match classify(&message) {
            Some(Incoming::Response { id, result, error }) => {
                assert_eq!(id, 7);
                assert!(result.unwrap().get("capabilities").is_some());
                assert!(error.is_none());
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn classify_error_response() {
        let message = Value::parse(
            r#"{"jsonrpc":"2.0","id":3,"error":{"code":-32600,"message":"invalid request"}}"#,
        )
        .unwrap();
        match classify(&message) {
            Some(Incoming::Response { error: Some(error), .. }) => {
                assert_eq!(error.code, -32600);
                assert_eq!(error.message, "invalid request");
            }
            other => panic!("expected error response, got {other:?}"),
        }
    }

    #[test]
    fn classify_notification() {
        let message = Value::parse(
            r#"{"jsonrpc":"2.0","method":"window/logMessage","params":{"type":3}}"#,
        )
        .unwrap();
        match classify(&message) {
            Some(Incoming::Notification { method, params }) => {
                assert_eq!(method, "window/logMessage");
                assert!(params.is_some());
            }
            other => panic!("expected notification, got {other:?}"),
        }
    }

    #[test]
    fn classify_server_request() {
        let message = Value::parse(
            r#"{"jsonrpc":"2.0","id":9,"method":"client/registerCapability","params":{}}"#,
        )
        .unwrap();
        match classify(&message) {
            Some(Incoming::Request { method, .. }) => {
                assert_eq!(method, "client/registerCapability");
            }
            other => panic!("expected server request, got {other:?}"),
        }
    }

    #[test]
    fn classify_rejects_non_messages() {
        assert!(classify(&Value::parse("[]").unwrap()).is_none());
        assert!(classify(&Value::parse(r#"{"jsonrpc":"2.0"}"#).unwrap()).is_none());
    }

    #[test]
    fn method_not_found_reply() {
        let reply = method_not_found(&Value::Int(5), "workspace/configuration");
        assert_eq!(reply.get("id").unwrap().as_int(), Some(5));
        let error = reply.get("error").unwrap();
        assert_eq!(error.get("code").unwrap().as_int(), Some(-32601));
        assert!(
            error
                .get("message")
                .unwrap()
                .as_str()
                .unwrap()
                .contains("workspace/configuration")
        );
    }

    #[test]
    fn publish_diagnostics_extraction() {
        let params = Value::parse(
            r#"{"uri":"file:///a.rs","diagnostics":[{
                "range":{"start":{"line":3,"character":5},"end":{"line":3,"character":9}},
                "severity":2,
                "message":"unused variable"
            }]}"#,
        )
        .unwrap();
        let (uri, diagnostics) = parse_publish_diagnostics(&params).unwrap();
        assert_eq!(uri, "file:///a.rs");
        assert_eq!(
            diagnostics,
            vec![Diagnostic {
                line: 3,
                col: 5,
                end_line: 3,
                end_col: 9,
                message: "unused variable".to_string(),
                severity: DiagnosticSeverity::Warning,
            }]
        );
    }

    #[test]
    fn publish_diagnostics_defaults() {
        // No end position: end defaults to start. No severity: Error.
        let params = Value::parse(
            r#"{"uri":"file:///a.rs","diagnostics":[{
                "range":{"start":{"line":1,"character":2}},
                "message":"boom"
            }]}"#,
        )
        .unwrap();
        let (_, diagnostics) = parse_publish_diagnostics(&params).unwrap();
        assert_eq!(diagnostics[0].end_line, 1);
        assert_eq!(diagnostics[0].end_col, 2);
        assert_eq!(diagnostics[0].severity, DiagnosticSeverity::Error);
    }

    #[test]
    fn publish_diagnostics_empty_array() {
        let params = Value::parse(r#"{"uri":"file:///a.rs","diagnostics":[]}"#).unwrap();
        let (_, diagnostics) = parse_publish_diagnostics(&params).unwrap();
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn completion_from_items_object() {
        let result = Value::parse(
            r#"{"isIncomplete":false,"items":[
                {"label":"push","detail":"fn push(&mut self, value: T)","kind":2},
                {"label":"pop","insertText":"pop()"}
            ]}"#,
        )
        .unwrap();
        let items = parse_completion_result(&result);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].label, "push");
        assert_eq!(items[0].insert_text, "push");
        assert_eq!(items[0].kind, 2);
        assert_eq!(
            items[0].detail.as_deref(),
            Some("fn push(&mut self, value: T)")
        );
        assert_eq!(items[1].insert_text, "pop()");
        assert_eq!(items[1].kind, 0);
    }

    #[test]
    fn completion_from_bare_array() {
        let result = Value::parse(r#"[{"label":"main"}]"#).unwrap();
        let items = parse_completion_result(&result);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].insert_text, "main");
    }

    #[test]
    fn completion_from_null_result() {
        assert!(parse_completion_result(&Value::Null).is_empty());
    }

    #[test]
    fn hover_contents_variants() {
        let plain = Value::parse(r#"{"contents":"a docstring"}"#).unwrap();
        assert_eq!(parse_hover_result(&plain).as_deref(), Some("a docstring"));

        let markup =
            Value::parse(r#"{"contents":{"kind":"markdown","value":"**bold**"}}"#).unwrap();
        assert_eq!(parse_hover_result(&markup).as_deref(), Some("**bold**"));

        let mixed = Value::parse(
            r#"{"contents":["first",{"language":"rust","value":"fn f()"}]}"#,
        )
        .unwrap();
        assert_eq!(parse_hover_result(&mixed).as_deref(), Some("first\nfn f()"));
    }

    #[test]
    fn hover_without_contents_is_none() {
        assert!(parse_hover_result(&Value::parse("{}").unwrap()).is_none());
        assert!(parse_hover_result(&Value::Null).is_none());
    }

    #[test]
    fn definition_single_location() {
        let result = Value::parse(
            r#"{"uri":"file:///lib.rs","range":{"start":{"line":10,"character":4},"end":{"line":10,"character":8}}}"#,
        )
        .unwrap();
        assert_eq!(
            parse_definition_result(&result),
            Some(Location {
                uri: "file:///lib.rs".to_string(),
                line: 10,
                character: 4,
            })
        );
    }

    #[test]
    fn definition_array_takes_first() {
        let result = Value::parse(
            r#"[{"uri":"file:///a.rs","range":{"start":{"line":1,"character":0}}},
               {"uri":"file:///b.rs","range":{"start":{"line":2,"character":0}}}]"#,
        )
        .unwrap();
        assert_eq!(parse_definition_result(&result).unwrap().uri, "file:///a.rs");
    }

    #[test]
    fn definition_empty_or_null_is_none() {
        assert!(parse_definition_result(&Value::parse("[]").unwrap()).is_none());
        assert!(parse_definition_result(&Value::Null).is_none());
    }

    #[test]
    fn path_to_file_uri_round_trip() {
        let path = Path::new("/home/user/src/main.rs");
        let uri = path_to_file_uri(path).unwrap();
        assert_eq!(uri.as_str(), "file:///home/user/src/main.rs");
    }

    #[test]
    fn path_with_spaces_is_percent_encoded() {
        let uri = path_to_file_uri(Path::new("/tmp/my project/a.rs")).unwrap();
        assert_eq!(uri.as_str(), "file:///tmp/my%20project/a.rs");
        assert_eq!(
            file_uri_to_path(uri.as_str()),
            Some(PathBuf::from("/tmp/my project/a.rs"))
        );
    }

    #[test]
    fn non_file_uri_has_no_path() {
        assert!(file_uri_to_path("https://example.com/a.rs").is_none());
        assert!(file_uri_to_path("not a uri").is_none());
    }
}
