use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use super::input::{parse_params, DocumentInput, InputError};
use crate::links::pattern::ItemPattern;
use crate::mcp::types::{CallToolResult, ToolAnnotations, ToolDefinition};
use crate::rewrite::engine::{rewrite, LinkRewriteSpec, RewriteError, RewriteLog, RewriteMode};
use crate::rewrite::utm::UtmParams;
use crate::utils::output::{log_path_for, modified_sibling, write_atomically};
use crate::utils::payload::build_error_payload;

pub static REWRITE_DOCUMENT_LINKS_TOOL_DEFINITION: Lazy<ToolDefinition> = Lazy::new(|| ToolDefinition {
    name: "rewrite-document-links".to_string(),
    description: "Rewrite the links of a PDF or text document. 'utm-only' appends UTM campaign \
                  parameters to every existing link; 'hyperlink-utm' finds item numbers matching \
                  a template and links each one to baseUrl + item number with UTM parameters. \
                  Writes the modified document and a JSON run log next to it."
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
            "mode": {
                "type": "string",
                "enum": ["utm-only", "hyperlink-utm"],
                "description": "Rewrite mode"
            },
            "baseUrl": {
                "type": "string",
                "description": "Prefix for generated item links (hyperlink-utm only)"
            },
            "itemFormat": {
                "type": "string",
                "description": "Item template for hyperlink-utm: N = digit, L = letter, \\N / \\L / \\\\ = literal character"
            },
            "utmSource": { "type": "string", "description": "utm_source value" },
            "utmMedium": { "type": "string", "description": "utm_medium value" },
            "utmCampaign": { "type": "string", "description": "utm_campaign value" },
            "outputPath": {
                "type": "string",
                "description": "Where to write the modified document (default: <name>_modified.<ext> next to path; inline base64 when neither is available)"
            }
        },
        "required": ["mode"]
    }),
    annotations: Some(ToolAnnotations {
        title: Some("Rewrite Document Links".to_string()),
        read_only_hint: Some(false),
        open_world_hint: Some(false),
    }),
});

#[derive(Debug, Deserialize)]
struct RewriteLinksParams {
    #[serde(flatten)]
    document: DocumentInput,
    mode: String,
    #[serde(default, rename = "baseUrl")]
    base_url: String,
    #[serde(default, rename = "itemFormat")]
    item_format: Option<String>,
    #[serde(default, rename = "utmSource")]
    utm_source: String,
    #[serde(default, rename = "utmMedium")]
    utm_medium: String,
    #[serde(default, rename = "utmCampaign")]
    utm_campaign: String,
    #[serde(default, rename = "outputPath")]
    output_path: Option<String>,
}

impl RewriteLinksParams {
    fn to_spec(&self) -> Result<LinkRewriteSpec, InputError> {
        let mode: RewriteMode = self
            .mode
            .parse()
            .map_err(|e: RewriteError| InputError::InvalidParams(e.to_string()))?;
        // utm-only never looks at item numbers
        let item_pattern = match (mode, self.item_format.as_deref()) {
            (RewriteMode::HyperlinkUtm, Some(template)) => Some(ItemPattern::compile(template)?),
            _ => None,
        };
        let spec = LinkRewriteSpec {
            mode,
            base_url: self.base_url.trim().to_string(),
            item_pattern,
            utm: UtmParams {
                source: self.utm_source.clone(),
                medium: self.utm_medium.clone(),
                campaign: self.utm_campaign.clone(),
            },
        };
        spec.validate()
            .map_err(|e| InputError::InvalidParams(e.to_string()))?;
        Ok(spec)
    }
}

pub struct RewriteDocumentLinksTool;

impl RewriteDocumentLinksTool {
    pub fn new() -> Self {
        Self
    }

    pub async fn execute(&self, arguments: Option<serde_json::Value>) -> CallToolResult {
        let params = match parse_params::<RewriteLinksParams>(arguments) {
            Ok(params) => params,
            Err(e) => return e.into_tool_result(),
        };
        let spec = match params.to_spec() {
            Ok(spec) => spec,
            Err(e) => return e.into_tool_result(),
        };
        let loaded = match params.document.load().await {
            Ok(loaded) => loaded,
            Err(e) => return e.into_tool_result(),
        };
        let mut doc = match loaded.open() {
            Ok(doc) => doc,
            Err(e) => return e.into_tool_result(),
        };

        let log = match rewrite(doc.as_mut(), &spec) {
            Ok(log) => log,
            Err(e) => return InputError::InvalidParams(e.to_string()).into_tool_result(),
        };
        let bytes = match doc.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(target: "tools", run_id = %log.run_id, "Failed to serialize rewritten document: {}", e);
                return output_error(&e.to_string(), None);
            }
        };

        let destination = params
            .output_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .or_else(|| {
                loaded
                    .source_path
                    .as_deref()
                    .map(|source| modified_sibling(source, loaded.kind.extension()))
            });

        match destination {
            Some(path) => match persist(&path, &bytes, &log) {
                Ok(log_path) => {
                    info!(
                        target: "tools",
                        run_id = %log.run_id,
                        output = %path.display(),
                        "Rewritten document saved"
                    );
                    summary(json!({
                        "output": path.display().to_string(),
                        "log": log_path.display().to_string(),
                        "summary": log,
                    }))
                }
                Err(e) => {
                    error!(target: "tools", output = %path.display(), "Failed to write output: {:#}", e);
                    output_error(&format!("{:#}", e), Some(&path))
                }
            },
            None => summary(json!({
                "fileName": format!("{}_modified.{}", stem_of(&loaded.name), loaded.kind.extension()),
                "contentBase64": STANDARD.encode(&bytes),
                "summary": log,
            })),
        }
    }
}

/// Writes the document and then its `.log.json`, returning the log's path.
fn persist(path: &Path, bytes: &[u8], log: &RewriteLog) -> anyhow::Result<PathBuf> {
    write_atomically(path, bytes)?;
    let log_path = log_path_for(path);
    let log_json = serde_json::to_vec_pretty(log)?;
    write_atomically(&log_path, &log_json)?;
    Ok(log_path)
}

fn stem_of(name: &str) -> &str {
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document")
}

fn summary(value: serde_json::Value) -> CallToolResult {
    match serde_json::to_string_pretty(&value) {
        Ok(body) => CallToolResult::success(body),
        Err(e) => CallToolResult::error(build_error_payload(
            "ERR_INTERNAL",
            "Failed to serialize the rewrite summary",
            json!({ "reason": e.to_string() }),
        )),
    }
}

fn output_error(reason: &str, path: Option<&Path>) -> CallToolResult {
    CallToolResult::error(build_error_payload(
        "ERR_OUTPUT_WRITE",
        "Failed to write the rewritten document",
        json!({
            "reason": reason,
            "path": path.map(|p| p.display().to_string()),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::payload::payload_code;
    use serde_json::Value;

    async fn run(args: Value) -> CallToolResult {
        RewriteDocumentLinksTool::new().execute(Some(args)).await
    }

    #[tokio::test]
    async fn utm_only_on_a_file_writes_sibling_and_log() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("mail.txt");
        std::fs::write(&source, "Buy at https://shop.example.com/item?ref=abc now").unwrap();

        let result = run(json!({
            "path": source.to_string_lossy(),
            "mode": "utm-only",
            "utmSource": "email",
            "utmMedium": "newsletter",
            "utmCampaign": "fall"
        }))
        .await;
        assert_eq!(result.is_error, None, "{}", result.content[0].text);

        let output = dir.path().join("mail_modified.txt");
        assert_eq!(
            std::fs::read_to_string(&output).unwrap(),
            "Buy at https://shop.example.com/item?ref=abc&utm_source=email&utm_medium=newsletter&utm_campaign=fall&utm_content=https://shop.example.com/item?ref=abc now"
        );
        let log: RewriteLog =
            serde_json::from_slice(&std::fs::read(dir.path().join("mail_modified.txt.log.json")).unwrap())
                .unwrap();
        assert_eq!(log.links_updated, 1);
        assert_eq!(log.mode, RewriteMode::UtmOnly);
        // the source is left alone
        assert!(std::fs::read_to_string(&source).unwrap().ends_with("ref=abc now"));
    }

    #[tokio::test]
    async fn inline_input_without_output_path_comes_back_as_base64() {
        let result = run(json!({
            "contentBase64": STANDARD.encode("Items 7-1234-A"),
            "fileName": "items.txt",
            "mode": "hyperlink-utm",
            "baseUrl": "https://shop.example.com/p/",
            "itemFormat": "N-NNNN-L"
        }))
        .await;
        let body: Value = serde_json::from_str(&result.content[0].text).unwrap();
        assert_eq!(body["fileName"], "items_modified.txt");
        let bytes = STANDARD.decode(body["contentBase64"].as_str().unwrap()).unwrap();
        assert_eq!(bytes, b"Items 7-1234-A");
        // text documents cannot take new link annotations; the failure is logged, not fatal
        assert_eq!(body["summary"]["matches_found"], 1);
        assert_eq!(body["summary"]["links_inserted"], 0);
        assert_eq!(body["summary"]["errors"][0]["target"], "7-1234-A");
    }

    #[tokio::test]
    async fn unknown_mode_is_rejected() {
        let result = run(json!({
            "contentBase64": STANDARD.encode("x"),
            "mode": "rewrite-everything"
        }))
        .await;
        assert_eq!(
            payload_code(&result.content[0].text).as_deref(),
            Some("ERR_INPUT_INVALID_PARAMS")
        );
    }

    #[tokio::test]
    async fn hyperlink_mode_needs_base_url() {
        let result = run(json!({
            "contentBase64": STANDARD.encode("x"),
            "mode": "hyperlink-utm",
            "itemFormat": "NN"
        }))
        .await;
        assert_eq!(
            payload_code(&result.content[0].text).as_deref(),
            Some("ERR_INPUT_INVALID_PARAMS")
        );
    }

    #[tokio::test]
    async fn empty_item_format_is_a_pattern_error() {
        let result = run(json!({
            "contentBase64": STANDARD.encode("x"),
            "mode": "hyperlink-utm",
            "baseUrl": "https://shop.example.com/p/",
            "itemFormat": ""
        }))
        .await;
        assert_eq!(
            payload_code(&result.content[0].text).as_deref(),
            Some("ERR_INPUT_INVALID_PATTERN")
        );
    }

    #[tokio::test]
    async fn unwritable_output_reports_output_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = run(json!({
            "contentBase64": STANDARD.encode("https://a.example/"),
            "fileName": "a.txt",
            "mode": "utm-only",
            "outputPath": dir.path().join("no-such-dir").join("out.txt").to_string_lossy()
        }))
        .await;
        assert_eq!(
            payload_code(&result.content[0].text).as_deref(),
            Some("ERR_OUTPUT_WRITE")
        );
    }
}
