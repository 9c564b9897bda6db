use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::input::{parse_params, DocumentInput, InputError};
use crate::links::extract::{find_item_matches, ItemMatch};
use crate::links::pattern::ItemPattern;
use crate::mcp::types::{CallToolResult, ToolAnnotations, ToolDefinition};
use crate::utils::payload::build_error_payload;

pub static FIND_ITEM_NUMBERS_TOOL_DEFINITION: Lazy<ToolDefinition> = Lazy::new(|| ToolDefinition {
    name: "find-item-numbers".to_string(),
    description: "Locate item numbers in a PDF or text document using a template where N is a \
                  digit and L is a letter (e.g. 'N-NNNN-L'). Returns every match with its page, \
                  bounding box and matching strategy, without removing duplicates."
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
            "itemFormat": {
                "type": "string",
                "description": "Item template: N = digit, L = letter, \\N / \\L / \\\\ = literal character"
            }
        },
        "required": ["itemFormat"]
    }),
    annotations: Some(ToolAnnotations {
        title: Some("Find Item Numbers".to_string()),
        read_only_hint: Some(true),
        open_world_hint: Some(false),
    }),
});

#[derive(Debug, Deserialize)]
struct FindItemsParams {
    #[serde(flatten)]
    document: DocumentInput,
    #[serde(rename = "itemFormat")]
    item_format: String,
}

#[derive(Debug, Serialize)]
struct FindItemsResult<'a> {
    pattern: &'a str,
    /// No N/L placeholders: matched as a plain substring.
    literal: bool,
    pages: usize,
    matches: Vec<ItemMatch>,
}

pub struct FindItemNumbersTool;

impl FindItemNumbersTool {
    pub fn new() -> Self {
        Self
    }

    pub async fn execute(&self, arguments: Option<serde_json::Value>) -> CallToolResult {
        match self.run(arguments).await {
            Ok(result) => result,
            Err(e) => e.into_tool_result(),
        }
    }

    async fn run(&self, arguments: Option<serde_json::Value>) -> Result<CallToolResult, InputError> {
        let params = parse_params::<FindItemsParams>(arguments)?;
        let pattern = ItemPattern::compile(&params.item_format)?;
        let loaded = params.document.load().await?;

        let doc = loaded.open()?;
        let matches = find_item_matches(doc.as_ref(), &pattern);
        info!(
            target: "tools",
            document = %loaded.name,
            pattern = pattern.template(),
            matches = matches.len(),
            "Item numbers located"
        );

        let result = FindItemsResult {
            pattern: pattern.template(),
            literal: pattern.is_literal(),
            pages: doc.page_count(),
            matches,
        };
        Ok(match serde_json::to_string_pretty(&result) {
            Ok(body) => CallToolResult::success(body),
            Err(e) => CallToolResult::error(build_error_payload(
                "ERR_INTERNAL",
                "Failed to serialize item matches",
                json!({ "reason": e.to_string() }),
            )),
        })
    }
}
