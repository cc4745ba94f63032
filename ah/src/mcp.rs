//! MCP (Model Context Protocol) stdio server
//!
//! Exposes the rendezvous engine to agents via JSON-RPC 2.0 over
//! stdin/stdout. Each line on stdin is a JSON-RPC request; each response is
//! written as a single line on stdout.
//!
//! `tools/call` requests are dispatched onto their own task and responses
//! are funneled through a single writer, so an `ask_human` call blocking for
//! minutes never stalls the read loop. Responses therefore complete out of
//! order; callers correlate by request id.

use std::sync::Arc;

use eyre::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::engine::AskHumanEngine;
use crate::error::AskError;

// ---------------------------------------------------------------------------
// JSON-RPC 2.0 types
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Must be `"2.0"`.
    pub jsonrpc: String,
    /// The method name.
    pub method: String,
    /// Optional parameters.
    #[serde(default)]
    pub params: Option<Value>,
    /// Request ID. Absent for notifications.
    #[serde(default)]
    pub id: Option<Value>,
}

/// A JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// The result on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    /// Mirrors the request ID.
    pub id: Value,
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code (standard JSON-RPC or application-specific).
    pub code: i64,
    /// Human-readable error message.
    pub message: String,
    /// Optional structured error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

// Standard JSON-RPC error codes.
const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

// Application-specific error codes.
const TOOL_NOT_FOUND: i64 = -32000;
const ASK_FAILED: i64 = -32001;
const ASK_TIMEOUT: i64 = -32002;
const SERVER_SHUTDOWN: i64 = -32003;

// ---------------------------------------------------------------------------
// McpServer
// ---------------------------------------------------------------------------

/// MCP stdio server exposing `ask_human`, `list_pending_questions`, and
/// `get_qa_stats`.
pub struct McpServer {
    engine: Arc<AskHumanEngine>,
}

impl McpServer {
    pub fn new(engine: Arc<AskHumanEngine>) -> Self {
        Self { engine }
    }

    /// Run the server loop, reading from `stdin` and writing to `stdout`.
    ///
    /// Stops reading on stdin EOF or when `shutdown` fires; either way the
    /// engine's shutdown signal is raised so in-flight asks resolve, their
    /// responses drain, and the loop exits.
    pub async fn run(
        self,
        stdin: impl AsyncBufRead + Unpin,
        mut stdout: impl AsyncWrite + Unpin,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut lines = stdin.lines();
        // Spawned tool calls respond through this channel; direct responses
        // are written inline so the loop never waits on its own drain
        let (resp_raw_tx, mut resp_rx) = mpsc::channel::<JsonRpcResponse>(64);
        let mut resp_tx = Some(resp_raw_tx);

        info!("MCP server serving on stdio");

        loop {
            tokio::select! {
                resp = resp_rx.recv() => {
                    match resp {
                        Some(resp) => write_response(&mut stdout, &resp).await?,
                        // All senders gone: reading stopped and every
                        // dispatched call has responded
                        None => break,
                    }
                }

                line = lines.next_line(), if resp_tx.is_some() => {
                    match line {
                        Ok(Some(line)) => {
                            if let Some(tx) = &resp_tx
                                && let Some(resp) = self.handle_line(&line, tx)
                            {
                                write_response(&mut stdout, &resp).await?;
                            }
                        }
                        Ok(None) => {
                            debug!("stdin closed, shutting down");
                            self.engine.shutdown();
                            resp_tx = None;
                        }
                        Err(e) => {
                            warn!(error = %e, "stdin read failed, shutting down");
                            self.engine.shutdown();
                            resp_tx = None;
                        }
                    }
                }

                _ = shutdown.changed(), if resp_tx.is_some() => {
                    debug!("Shutdown signal received, draining in-flight calls");
                    self.engine.shutdown();
                    resp_tx = None;
                }
            }
        }

        info!("MCP server stopped");
        Ok(())
    }

    /// Parse and dispatch a single request line
    ///
    /// Returns a response to write immediately, or `None` when the request
    /// is a notification or was handed to a spawned tool-call task.
    fn handle_line(&self, line: &str, resp_tx: &mpsc::Sender<JsonRpcResponse>) -> Option<JsonRpcResponse> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(req) => req,
            // JSON parse error -- respond with null id per spec
            Err(_) => return Some(error_response(Value::Null, PARSE_ERROR, "Parse error")),
        };

        // Notifications have no id -- recognized or not, they get no response
        let id = request.id?;

        match request.method.as_str() {
            "initialize" => Some(self.handle_initialize(id)),
            "tools/list" => Some(handle_tools_list(id)),
            "tools/call" => {
                // One task per call; ask_human blocks for up to the full
                // wait timeout
                let engine = Arc::clone(&self.engine);
                let tx = resp_tx.clone();
                tokio::spawn(async move {
                    let response = handle_tools_call(engine, id, request.params).await;
                    let _ = tx.send(response).await;
                });
                None
            }
            other => Some(error_response(
                id,
                METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            )),
        }
    }

    /// Handle the `initialize` method.
    fn handle_initialize(&self, id: Value) -> JsonRpcResponse {
        JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            result: Some(serde_json::json!({
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": "askhuman",
                    "version": env!("CARGO_PKG_VERSION")
                }
            })),
            error: None,
            id,
        }
    }
}

/// Handle the `tools/list` method.
fn handle_tools_list(id: Value) -> JsonRpcResponse {
    let tools = serde_json::json!([
        {
            "name": "ask_human",
            "description": "Ask the human a question and wait for them to answer",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "question": {
                        "type": "string",
                        "description": "What you actually want to know"
                    },
                    "context": {
                        "type": "string",
                        "description": "Extra info that might help (like file paths, error messages, etc.)"
                    }
                },
                "required": ["question"]
            }
        },
        {
            "name": "list_pending_questions",
            "description": "List questions currently waiting for a human answer",
            "inputSchema": { "type": "object", "properties": {} }
        },
        {
            "name": "get_qa_stats",
            "description": "Show statistics for this Q&A session",
            "inputSchema": { "type": "object", "properties": {} }
        }
    ]);

    JsonRpcResponse {
        jsonrpc: "2.0".to_string(),
        result: Some(serde_json::json!({ "tools": tools })),
        error: None,
        id,
    }
}

/// Handle the `tools/call` method.
///
/// Params must contain `{ "name": String, "arguments": Value }`.
async fn handle_tools_call(engine: Arc<AskHumanEngine>, id: Value, params: Option<Value>) -> JsonRpcResponse {
    let Some(params) = params else {
        return error_response(id, INVALID_PARAMS, "Missing params for tools/call");
    };

    let Some(tool_name) = params.get("name").and_then(|v| v.as_str()) else {
        return error_response(id, INVALID_PARAMS, "Missing 'name' in tools/call params");
    };

    let arguments = params.get("arguments").cloned().unwrap_or(serde_json::json!({}));

    let outcome = match tool_name {
        "ask_human" => {
            let Some(question) = arguments.get("question").and_then(|v| v.as_str()) else {
                return error_response(
                    id,
                    INVALID_PARAMS,
                    "question parameter is required and must be a string",
                );
            };
            let context = arguments.get("context").and_then(|v| v.as_str()).unwrap_or("");
            engine.ask(question, context).await
        }
        "list_pending_questions" => engine.list_pending().await,
        "get_qa_stats" => Ok(engine.stats_report().await),
        other => {
            return error_response(id, TOOL_NOT_FOUND, format!("Tool not found: {}", other));
        }
    };

    match outcome {
        Ok(text) => JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            result: Some(serde_json::json!({
                "content": [{
                    "type": "text",
                    "text": text,
                }]
            })),
            error: None,
            id,
        },
        Err(e) => {
            let code = match &e {
                AskError::Timeout { .. } => ASK_TIMEOUT,
                AskError::Shutdown => SERVER_SHUTDOWN,
                _ => ASK_FAILED,
            };
            error_response(id, code, e.to_string())
        }
    }
}

fn error_response(id: Value, code: i64, message: impl Into<String>) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0".to_string(),
        result: None,
        error: Some(JsonRpcError {
            code,
            message: message.into(),
            data: None,
        }),
        id,
    }
}

/// Write a JSON-RPC response as a single line to the writer.
async fn write_response(writer: &mut (impl AsyncWrite + Unpin), response: &JsonRpcResponse) -> Result<()> {
    let mut line = serde_json::to_string(response)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
