//! MCP (Model Context Protocol) server over stdio
//!
//! Newline-delimited JSON-RPC 2.0. The server exposes one tool, `scrapekit`,
//! backed by a single [`Tool`] so the scrape cache lives for the whole session.

use scrapekit::{ScrapeError, ScrapeToolInput, ScrapeToolOutput, Tool, Valves, TOOL_DESCRIPTION};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::{self, BufRead, Write};

const TOOL_NAME: &str = "scrapekit";
const PROTOCOL_VERSION: &str = "2024-11-05";

const PARSE_ERROR: i32 = -32700;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Serialize)]
struct Response {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Value>,
    #[serde(flatten)]
    body: ResponseBody,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum ResponseBody {
    Result(Value),
    Error { code: i32, message: String },
}

impl Response {
    fn result(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            body: ResponseBody::Result(result),
        }
    }

    fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            body: ResponseBody::Error {
                code,
                message: message.into(),
            },
        }
    }
}

/// Arguments of `tools/call`
#[derive(Debug, Deserialize)]
struct CallParams {
    #[serde(default)]
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

/// Result of `tools/call`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CallResult {
    content: Vec<TextContent>,
    is_error: bool,
}

#[derive(Debug, Serialize)]
struct TextContent {
    #[serde(rename = "type")]
    kind: &'static str,
    text: String,
}

impl CallResult {
    fn text(text: impl Into<String>, is_error: bool) -> Self {
        Self {
            content: vec![TextContent {
                kind: "text",
                text: text.into(),
            }],
            is_error,
        }
    }

    /// A call is an error only when no URL produced content
    fn from_output(output: ScrapeToolOutput) -> Self {
        let is_error = !output.results.iter().any(|result| result.is_success());
        Self::text(output.text, is_error)
    }
}

struct McpServer {
    tool: Tool,
}

impl McpServer {
    fn new(valves: Valves) -> Result<Self, ScrapeError> {
        Ok(Self {
            tool: Tool::builder().valves(valves).build()?,
        })
    }

    /// Answer one request; notifications (no id) get no response
    async fn handle(&self, request: Request) -> Option<Response> {
        let Some(id) = request.id else {
            tracing::debug!(method = %request.method, "Notification");
            return None;
        };
        let id = Some(id);

        let response = match request.method.as_str() {
            "initialize" => Response::result(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": { "tools": {} },
                    "serverInfo": {
                        "name": TOOL_NAME,
                        "version": env!("CARGO_PKG_VERSION")
                    }
                }),
            ),
            "ping" => Response::result(id, json!({})),
            "tools/list" => Response::result(
                id,
                json!({
                    "tools": [{
                        "name": TOOL_NAME,
                        "description": TOOL_DESCRIPTION,
                        "inputSchema": self.tool.input_schema()
                    }]
                }),
            ),
            "tools/call" => self.call_tool(id, request.params).await,
            other => Response::error(id, METHOD_NOT_FOUND, format!("Method not found: {}", other)),
        };
        Some(response)
    }

    async fn call_tool(&self, id: Option<Value>, params: Value) -> Response {
        let params: CallParams = match serde_json::from_value(params) {
            Ok(params) => params,
            Err(e) => return Response::error(id, INVALID_PARAMS, format!("Invalid params: {}", e)),
        };
        if params.name != TOOL_NAME {
            return Response::error(id, INVALID_PARAMS, format!("Unknown tool: {}", params.name));
        }

        let input: ScrapeToolInput =
            match serde_json::from_value(params.arguments.unwrap_or_else(|| json!({}))) {
                Ok(input) => input,
                Err(e) => {
                    return Response::error(id, INVALID_PARAMS, format!("Invalid arguments: {}", e))
                }
            };

        tracing::info!(urls = input.urls.len(), "Tool call");
        let result = match self.tool.execute(input).await {
            Ok(output) => CallResult::from_output(output),
            Err(e) => CallResult::text(format!("Error: {}", e), true),
        };
        Response::result(id, serde_json::to_value(result).unwrap_or_default())
    }

    /// Process requests from `input` until EOF, one JSON frame per line
    async fn serve<R: BufRead, W: Write>(&self, input: R, mut output: W) -> io::Result<()> {
        for line in input.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<Request>(&line) {
                Ok(request) => self.handle(request).await,
                Err(e) => Some(Response::error(None, PARSE_ERROR, format!("Parse error: {}", e))),
            };

            if let Some(response) = response {
                let frame = serde_json::to_string(&response).unwrap_or_default();
                writeln!(output, "{}", frame)?;
                output.flush()?;
            }
        }
        Ok(())
    }
}

/// Run the MCP server over stdio
pub async fn run_server(valves: Valves) {
    let server = match McpServer::new(valves) {
        Ok(server) => server,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!("MCP server listening on stdio");

    if let Err(e) = server.serve(io::stdin().lock(), io::stdout()).await {
        if e.kind() != io::ErrorKind::BrokenPipe {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> McpServer {
        let mut valves = Valves::default();
        valves.deny_hosts.insert("blocked.test".to_string());
        McpServer::new(valves).unwrap()
    }

    async fn call(method: &str, params: Value) -> Value {
        let request = Request {
            id: Some(json!(1)),
            method: method.to_string(),
            params,
        };
        let response = server().handle(request).await.unwrap();
        serde_json::to_value(response).unwrap()
    }

    #[tokio::test]
    async fn test_initialize() {
        let response = call("initialize", json!({})).await;
        assert_eq!(response["jsonrpc"], "2.0");
        assert_eq!(response["id"], 1);
        assert_eq!(response["result"]["serverInfo"]["name"], "scrapekit");
        assert_eq!(response["result"]["protocolVersion"], PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn test_tools_list() {
        let response = call("tools/list", json!({})).await;
        let tool = &response["result"]["tools"][0];
        assert_eq!(tool["name"], "scrapekit");
        assert!(tool["inputSchema"]["properties"]["urls"].is_object());
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let response = call("resources/list", json!({})).await;
        assert_eq!(response["error"]["code"], METHOD_NOT_FOUND);
        assert!(response.get("result").is_none());
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let response = call("tools/call", json!({"name": "fetchall"})).await;
        assert_eq!(response["error"]["code"], INVALID_PARAMS);
        assert_eq!(response["error"]["message"], "Unknown tool: fetchall");
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let response = call(
            "tools/call",
            json!({"name": "scrapekit", "arguments": {"urls": "not-a-list"}}),
        )
        .await;
        assert!(response["error"]["message"]
            .as_str()
            .unwrap()
            .starts_with("Invalid arguments"));
    }

    #[tokio::test]
    async fn test_blocked_call_is_reported() {
        let response = call(
            "tools/call",
            json!({"name": "scrapekit", "arguments": {"urls": ["https://blocked.test/"]}}),
        )
        .await;
        let result = &response["result"];
        assert_eq!(result["isError"], true);
        assert_eq!(result["content"][0]["type"], "text");
        assert!(result["content"][0]["text"]
            .as_str()
            .unwrap()
            .starts_with("Blocked: host 'blocked.test'"));
    }

    #[tokio::test]
    async fn test_empty_urls_is_tool_error() {
        let response = call(
            "tools/call",
            json!({"name": "scrapekit", "arguments": {"urls": []}}),
        )
        .await;
        assert_eq!(response["result"]["isError"], true);
        assert_eq!(
            response["result"]["content"][0]["text"],
            "Error: Missing required parameter: url"
        );
    }

    #[tokio::test]
    async fn test_notification_gets_no_response() {
        let request = Request {
            id: None,
            method: "notifications/initialized".to_string(),
            params: Value::Null,
        };
        assert!(server().handle(request).await.is_none());
    }

    #[tokio::test]
    async fn test_serve_writes_one_frame_per_request() {
        let input = concat!(
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n",
            "\n",
            "{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n",
            "not json\n",
        );
        let mut output = Vec::new();
        server().serve(input.as_bytes(), &mut output).await.unwrap();

        let frames: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0]["id"], 1);
        assert_eq!(frames[0]["result"], json!({}));
        assert_eq!(frames[1]["error"]["code"], PARSE_ERROR);
    }
}
