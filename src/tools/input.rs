use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::document::{open_document, Document, DocumentError, DocumentKind};
use crate::links::pattern::PatternError;
use crate::mcp::types::CallToolResult;
use crate::utils::payload::build_error_payload;

/// Request problems reported back to the caller before any processing happens.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("No document provided: pass `path` or `contentBase64`")]
    MissingDocument,
    #[error("The document is empty")]
    EmptyDocument,
    #[error("Cannot read document {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Unsupported document type for {name}; only PDF and plain text are accepted")]
    UnsupportedDocument { name: String },
    #[error("Invalid item format: {0}")]
    Pattern(#[from] PatternError),
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
    #[error("Cannot open document: {0}")]
    Document(#[from] DocumentError),
}

impl InputError {
    pub fn code(&self) -> &'static str {
        match self {
            InputError::MissingDocument | InputError::EmptyDocument | InputError::Read { .. } => {
                "ERR_INPUT_MISSING_DOCUMENT"
            }
            InputError::UnsupportedDocument { .. } => "ERR_INPUT_UNSUPPORTED_DOCUMENT",
            InputError::Pattern(_) => "ERR_INPUT_INVALID_PATTERN",
            InputError::InvalidParams(_) => "ERR_INPUT_INVALID_PARAMS",
            InputError::Document(_) => "ERR_DOCUMENT_PARSE",
        }
    }

    fn hint(&self) -> &'static str {
        match self {
            InputError::MissingDocument | InputError::EmptyDocument | InputError::Read { .. } => {
                "Provide a readable file path or the document bytes as base64."
            }
            InputError::UnsupportedDocument { .. } => "Convert the document to PDF first.",
            InputError::Pattern(_) => {
                "Use N for a digit, L for a letter and a backslash to escape a literal N, L or \\."
            }
            InputError::InvalidParams(_) => "Check the tool's input schema.",
            InputError::Document(_) => "The file may be damaged or encrypted.",
        }
    }

    pub fn into_tool_result(self) -> CallToolResult {
        warn!(target: "tools", code = self.code(), "Rejected tool input: {}", self);
        let payload = build_error_payload(
            self.code(),
            &self.to_string(),
            json!({ "hint": self.hint() }),
        );
        CallToolResult::error(payload)
    }
}

/// Deserializes tool arguments, treating absent arguments as an empty object.
pub fn parse_params<T: DeserializeOwned>(arguments: Option<Value>) -> Result<T, InputError> {
    let value = arguments.unwrap_or_else(|| json!({}));
    serde_json::from_value(value).map_err(|e| InputError::InvalidParams(e.to_string()))
}

/// The document part of a tool call: a path on disk or inline base64 content.
#[derive(Debug, Default, Deserialize)]
pub struct DocumentInput {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default, rename = "contentBase64")]
    pub content_base64: Option<String>,
    /// Name used for type detection of inline content.
    #[serde(default, rename = "fileName")]
    pub file_name: Option<String>,
}

/// Bytes of a document together with where they came from.
pub struct LoadedDocument {
    pub bytes: Vec<u8>,
    pub kind: DocumentKind,
    pub source_path: Option<PathBuf>,
    pub name: String,
}

impl LoadedDocument {
    pub fn open(&self) -> Result<Box<dyn Document>, InputError> {
        Ok(open_document(&self.bytes, self.kind)?)
    }
}

impl DocumentInput {
    pub async fn load(&self) -> Result<LoadedDocument, InputError> {
        let path = self.path.as_deref().map(str::trim).filter(|p| !p.is_empty());
        let inline = self
            .content_base64
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());

        let (bytes, source_path) = match (path, inline) {
            (Some(_), Some(_)) => {
                return Err(InputError::InvalidParams(
                    "pass either `path` or `contentBase64`, not both".to_string(),
                ))
            }
            (Some(path), None) => {
                let bytes = tokio::fs::read(path).await.map_err(|source| InputError::Read {
                    path: path.to_string(),
                    source,
                })?;
                (bytes, Some(PathBuf::from(path)))
            }
            (None, Some(content)) => (decode_base64(content)?, None),
            (None, None) => return Err(InputError::MissingDocument),
        };

        if bytes.is_empty() {
            return Err(InputError::EmptyDocument);
        }

        let name = self
            .file_name
            .clone()
            .or_else(|| {
                source_path
                    .as_deref()
                    .and_then(Path::file_name)
                    .and_then(|n| n.to_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "upload".to_string());
        let kind_hint = self.file_name.as_deref().or(path);
        let kind = DocumentKind::detect(&bytes, kind_hint)
            .ok_or_else(|| InputError::UnsupportedDocument { name: name.clone() })?;

        debug!(target: "tools", name = %name, kind = %kind, bytes = bytes.len(), "Document loaded");
        Ok(LoadedDocument {
            bytes,
            kind,
            source_path,
            name,
        })
    }
}

/// Standard base64, optionally wrapped in a `data:<mime>;base64,` prefix.
fn decode_base64(content: &str) -> Result<Vec<u8>, InputError> {
    let payload = match content.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => content,
    };
    let compact: String = payload.split_whitespace().collect();
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| InputError::InvalidParams(format!("contentBase64 is not valid base64: {}", e)))
}
