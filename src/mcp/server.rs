use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::transport::StdioTransport;
use super::types::*;
use crate::check::LinkChecker;
use crate::tools::{
    check_links_tool::{CheckDocumentLinksTool, CHECK_DOCUMENT_LINKS_TOOL_DEFINITION},
    find_items_tool::{FindItemNumbersTool, FIND_ITEM_NUMBERS_TOOL_DEFINITION},
    rewrite_links_tool::{RewriteDocumentLinksTool, REWRITE_DOCUMENT_LINKS_TOOL_DEFINITION},
};

pub struct McpServer {
    transport: StdioTransport,
    handler: RequestHandler,
}

impl McpServer {
    pub fn new(checker: Arc<LinkChecker>) -> Self {
        Self {
            transport: StdioTransport::new(),
            handler: RequestHandler::new(checker),
        }
    }

    pub async fn start(&mut self) -> Result<()> {
        info!(target: "server", "MCP server started and listening on stdio");

        loop {
            match self.transport.read_message().await? {
                Some(McpMessage::Request(request)) => {
                    let response = self.handler.handle_request(request).await;
                    self.transport.write_response(response).await?;
                }
                Some(McpMessage::Notification(notification)) => {
                    self.handler.handle_notification(notification);
                }
                Some(McpMessage::Invalid(response)) => {
                    self.transport.write_response(response).await?;
                }
                None => {
                    info!(target: "server", "Client disconnected");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// JSON-RPC method dispatch, kept apart from stdio so it can be driven directly.
pub struct RequestHandler {
    checker: Arc<LinkChecker>,
    initialized: bool,
}

impl RequestHandler {
    pub fn new(checker: Arc<LinkChecker>) -> Self {
        Self {
            checker,
            initialized: false,
        }
    }

    pub async fn handle_request(&mut self, request: McpRequest) -> McpResponse {
        let id = Self::ensure_valid_id(request.id.clone());

        match request.method.as_str() {
            "initialize" => self.handle_initialize(id, request.params),
            "tools/list" => Self::handle_list_tools(id),
            "tools/call" => self.handle_call_tool(id, request.params).await,
            "ping" => McpResponse::success(id, serde_json::json!({})),
            other => {
                debug!(target: "server", method = other, "Unknown method");
                McpResponse::failure(id, METHOD_NOT_FOUND, "Method not found")
            }
        }
    }

    pub fn handle_notification(&mut self, notification: McpNotification) {
        debug!(target: "server", method = %notification.method, "Received notification");

        match notification.method.as_str() {
            "notifications/initialized" => {
                info!(target: "server", "Client initialization completed");
                self.initialized = true;
            }
            "notifications/cancelled" => {
                debug!(target: "server", "Request cancelled notification received");
            }
            _ => {
                warn!(target: "server", "Unknown notification method: {}", notification.method);
            }
        }
    }

    fn ensure_valid_id(id: Option<Value>) -> Value {
        match id {
            Some(Value::Null) | None => Value::String("0".to_string()),
            Some(value) => value,
        }
    }

    fn handle_initialize(&self, id: Value, params: Option<Value>) -> McpResponse {
        let Some(params) = params else {
            return McpResponse::failure(id, INVALID_PARAMS, "Missing params");
        };
        match serde_json::from_value::<InitializeParams>(params) {
            Ok(init) => {
                info!(
                    target: "server",
                    client = %init.client_info.name,
                    client_version = %init.client_info.version,
                    protocol = %init.protocol_version,
                    "Initializing session"
                );
                let result = InitializeResult {
                    protocol_version: "2024-11-05".to_string(),
                    server_info: ServerInfo {
                        name: "Document Links MCP".to_string(),
                        version: env!("CARGO_PKG_VERSION").to_string(),
                        description: Some(
                            "Checks, tags and creates hyperlinks in PDF and text documents"
                                .to_string(),
                        ),
                    },
                    capabilities: ServerCapabilities {
                        tools: Some(ToolsCapability {
                            list_changed: Some(false),
                        }),
                        logging: Some(serde_json::json!({})),
                    },
                };
                McpResponse::success(id, result)
            }
            Err(e) => McpResponse::failure(id, INVALID_PARAMS, format!("Invalid params: {}", e)),
        }
    }

    fn handle_list_tools(id: Value) -> McpResponse {
        let result = ListToolsResult {
            tools: vec![
                CHECK_DOCUMENT_LINKS_TOOL_DEFINITION.clone(),
                REWRITE_DOCUMENT_LINKS_TOOL_DEFINITION.clone(),
                FIND_ITEM_NUMBERS_TOOL_DEFINITION.clone(),
            ],
        };
        McpResponse::success(id, result)
    }

    async fn handle_call_tool(&self, id: Value, params: Option<Value>) -> McpResponse {
        let Some(params) = params else {
            return McpResponse::failure(id, INVALID_PARAMS, "Missing params");
        };
        if !self.initialized {
            debug!(target: "server", "Tool call before the client confirmed initialization");
        }
        match serde_json::from_value::<CallToolParams>(params) {
            Ok(call_params) => {
                let result = self.execute_tool(call_params).await;
                McpResponse::success(id, result)
            }
            Err(e) => McpResponse::failure(id, INVALID_PARAMS, format!("Invalid params: {}", e)),
        }
    }

    async fn execute_tool(&self, params: CallToolParams) -> CallToolResult {
        info!(target: "server", tool = %params.name, "Tool call");
        match params.name.as_str() {
            "check-document-links" => {
                let tool = CheckDocumentLinksTool::new(self.checker.clone());
                tool.execute(params.arguments).await
            }
            "rewrite-document-links" => {
                let tool = RewriteDocumentLinksTool::new();
                tool.execute(params.arguments).await
            }
            "find-item-numbers" => {
                let tool = FindItemNumbersTool::new();
                tool.execute(params.arguments).await
            }
            _ => CallToolResult::error(format!("Tool not found: {}", params.name)),
        }
    }
}
