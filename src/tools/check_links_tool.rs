use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use super::input::{parse_params, DocumentInput};
use crate::check::LinkChecker;
use crate::links::extract::extract_uri_links;
use crate::mcp::types::{CallToolResult, ToolAnnotations, ToolDefinition};
use crate::utils::payload::build_error_payload;

pub static CHECK_DOCUMENT_LINKS_TOOL_DEFINITION: Lazy<ToolDefinition> = Lazy::new(|| ToolDefinition {
    name: "check-document-links".to_string(),
    description: "Extract every hyperlink embedded in a PDF or text document, check whether each \
                  one is reachable and scan reachable pages for 'out of stock' / 'discontinued' \
                  style phrases. Adds an 'ALL LINKS' row when every link looks blocked."
        .to_string(),
    input_schema: json!({
        "type": "object",
        "properties": {
            "path": {
                "type": "string",
                "description": "Path of the document on the server's file system"
            },
            "contentBase64": {
                "type": "string",
                "description": "Document bytes encoded as base64 (alternative to path)"
            },
            "fileName": {
                "type": "string",
                "description": "Original file name, used to detect the document type of inline content"
            },
            "maxConcurrency": {
                "type": "integer",
                "description": "Links checked at the same time (default: server setting)",
                "minimum": 1,
                "maximum": 64
            }
        }
    }),
    annotations: Some(ToolAnnotations {
        title: Some("Check Document Links".to_string()),
        read_only_hint: Some(true),
        open_world_hint: Some(true),
    }),
});

#[derive(Debug, Deserialize)]
struct CheckLinksParams {
    #[serde(flatten)]
    document: DocumentInput,
    #[serde(default, rename = "maxConcurrency")]
    max_concurrency: Option<usize>,
}

pub struct CheckDocumentLinksTool {
    checker: Arc<LinkChecker>,
}

impl CheckDocumentLinksTool {
    pub fn new(checker: Arc<LinkChecker>) -> Self {
        Self { checker }
    }

    pub async fn execute(&self, arguments: Option<serde_json::Value>) -> CallToolResult {
        let params = match parse_params::<CheckLinksParams>(arguments) {
            Ok(params) => params,
            Err(e) => return e.into_tool_result(),
        };
        let loaded = match params.document.load().await {
            Ok(loaded) => loaded,
            Err(e) => return e.into_tool_result(),
        };

        let links = match loaded.open() {
            Ok(doc) => extract_uri_links(doc.as_ref()),
            Err(e) => return e.into_tool_result(),
        };
        info!(
            target: "tools",
            document = %loaded.name,
            links = links.len(),
            "Checking document links"
        );

        let report = self.checker.check_links(links, params.max_concurrency).await;

        match serde_json::to_string_pretty(&report) {
            Ok(body) => CallToolResult::success(body),
            Err(e) => {
                error!(target: "tools", "Failed to serialize link report: {}", e);
                CallToolResult::error(build_error_payload(
                    "ERR_INTERNAL",
                    "Failed to serialize the link report",
                    json!({ "document": loaded.name }),
                ))
            }
        }
    }
}
