use anyhow::Result;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::BufReader;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, error, warn};

use super::types::{
    McpMessage, McpNotification, McpRequest, McpResponse, INVALID_REQUEST, PARSE_ERROR,
};

pub struct StdioTransport {
    reader: FramedRead<BufReader<tokio::io::Stdin>, LinesCodec>,
    writer: FramedWrite<tokio::io::Stdout, LinesCodec>,
}

impl StdioTransport {
    pub fn new() -> Self {
        let stdin = tokio::io::stdin();
        let stdout = tokio::io::stdout();

        let reader = FramedRead::new(BufReader::new(stdin), LinesCodec::new());
        let writer = FramedWrite::new(stdout, LinesCodec::new());

        Self { reader, writer }
    }

    /// Next message from stdin; `None` on EOF. Blank lines are skipped.
    pub async fn read_message(&mut self) -> Result<Option<McpMessage>> {
        loop {
            match self.reader.next().await {
                Some(Ok(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    debug!(target: "transport", bytes = line.len(), "Received line");
                    return Ok(Some(parse_line(&line)));
                }
                Some(Err(e)) => {
                    error!(target: "transport", "Error reading from stdin: {}", e);
                    return Err(anyhow::anyhow!("Transport error: {}", e));
                }
                None => {
                    debug!(target: "transport", "EOF reached");
                    return Ok(None);
                }
            }
        }
    }

    pub async fn write_response(&mut self, response: McpResponse) -> Result<()> {
        let json = serde_json::to_string(&response)?;
        debug!(target: "transport", bytes = json.len(), "Sending response");

        self.writer.send(json).await?;

        Ok(())
    }
}

/// Classifies one JSON-RPC line. Objects with an `id` are requests, objects
/// without one are notifications; anything else becomes an error response.
pub fn parse_line(line: &str) -> McpMessage {
    let value = match serde_json::from_str::<Value>(line) {
        Ok(value) => value,
        Err(e) => {
            warn!(target: "transport", "Failed to parse JSON: {}", e);
            return McpMessage::Invalid(McpResponse::failure(
                Value::Null,
                PARSE_ERROR,
                format!("Parse error: {}", e),
            ));
        }
    };

    let Some(obj) = value.as_object() else {
        warn!(target: "transport", "Invalid JSON-RPC message structure");
        return McpMessage::Invalid(McpResponse::failure(
            Value::Null,
            INVALID_REQUEST,
            "Invalid Request: expected a JSON object",
        ));
    };

    if let Some(id) = obj.get("id").cloned() {
        match serde_json::from_value::<McpRequest>(value) {
            Ok(request) => McpMessage::Request(request),
            Err(e) => {
                warn!(target: "transport", "Failed to parse request: {}", e);
                McpMessage::Invalid(McpResponse::failure(
                    id,
                    INVALID_REQUEST,
                    format!("Invalid Request: {}", e),
                ))
            }
        }
    } else {
        match serde_json::from_value::<McpNotification>(value) {
            Ok(notification) => McpMessage::Notification(notification),
            Err(e) => {
                warn!(target: "transport", "Failed to parse notification: {}", e);
                McpMessage::Invalid(McpResponse::failure(
                    Value::Null,
                    INVALID_REQUEST,
                    format!("Invalid Request: {}", e),
                ))
            }
        }
    }
}
