//! In-process LSP client
//!
//! Runs the backend on a pair of in-memory pipes and speaks framed JSON-RPC
//! to it. Server-to-client requests are answered with `null`; notifications
//! are buffered until a test asks for them.

use std::collections::VecDeque;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{duplex, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tower_lsp::lsp_types::Url;
use tower_lsp::{LspService, Server};

use angelscript_language_server::config::ServerConfig;
use angelscript_language_server::lsp::{AngelscriptBackend, GET_TYPE_HIERARCHY, GET_TYPE_MEMBERS, SEARCH_SYMBOLS};

const PIPE_CAPACITY: usize = 1 << 16;
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct LspClient {
    writer: DuplexStream,
    reader: BufReader<DuplexStream>,
    next_id: u64,
    notifications: VecDeque<Value>,
}

impl LspClient {
    /// Starts a backend with the engine link disabled
    pub fn start() -> Self {
        let mut config = ServerConfig::default();
        config.engine.enabled = false;

        let (service, socket) = LspService::build(|client| AngelscriptBackend::new(client, config.clone()))
            .custom_method(GET_TYPE_HIERARCHY, AngelscriptBackend::get_type_hierarchy)
            .custom_method(GET_TYPE_MEMBERS, AngelscriptBackend::get_type_members)
            .custom_method(SEARCH_SYMBOLS, AngelscriptBackend::search_symbols)
            .finish();

        let (writer, server_in) = duplex(PIPE_CAPACITY);
        let (server_out, reader) = duplex(PIPE_CAPACITY);
        tokio::spawn(Server::new(server_in, server_out, socket).serve(service));

        Self { writer, reader: BufReader::new(reader), next_id: 1, notifications: VecDeque::new() }
    }

    async fn write_message(&mut self, message: &Value) {
        let body = serde_json::to_string(message).unwrap();
        let frame = format!("Content-Length: {}\r\n\r\n{}", body.len(), body);
        self.writer.write_all(frame.as_bytes()).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn read_message(&mut self) -> Value {
        let mut content_length = None;
        loop {
            let mut line = String::new();
            let read = self.reader.read_line(&mut line).await.unwrap();
            assert!(read > 0, "server closed the stream");
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some(value) = line.strip_prefix("Content-Length:") {
                content_length = Some(value.trim().parse::<usize>().unwrap());
            }
        }
        let mut body = vec![0; content_length.expect("missing Content-Length header")];
        self.reader.read_exact(&mut body).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    /// Reads one message, answering server requests and buffering
    /// notifications. Returns responses to our own requests.
    async fn dispatch_next(&mut self) -> Option<Value> {
        let message = self.read_message().await;
        match (message.get("id"), message.get("method")) {
            (Some(id), Some(_)) => {
                let reply = json!({ "jsonrpc": "2.0", "id": id, "result": null });
                self.write_message(&reply).await;
                None
            }
            (None, Some(_)) => {
                self.notifications.push_back(message);
                None
            }
            _ => Some(message),
        }
    }

    pub async fn send_notification(&mut self, method: &str, params: Value) {
        let mut message = json!({ "jsonrpc": "2.0", "method": method });
        if !params.is_null() {
            message["params"] = params;
        }
        self.write_message(&message).await;
    }

    /// Sends a request and waits for its response object
    pub async fn send_request(&mut self, method: &str, params: Value) -> Value {
        let id = self.next_id;
        self.next_id += 1;
        let mut message = json!({ "jsonrpc": "2.0", "id": id, "method": method });
        if !params.is_null() {
            message["params"] = params;
        }
        self.write_message(&message).await;

        tokio::time::timeout(RESPONSE_TIMEOUT, async {
            loop {
                if let Some(response) = self.dispatch_next().await {
                    if response["id"] == json!(id) {
                        return response;
                    }
                }
            }
        })
        .await
        .unwrap_or_else(|_| panic!("no response to {}", method))
    }

    /// Waits for the next `textDocument/publishDiagnostics` for `uri`
    pub async fn await_diagnostics(&mut self, uri: &Url) -> Value {
        tokio::time::timeout(RESPONSE_TIMEOUT, async {
            loop {
                let position = self.notifications.iter().position(|n| {
                    n["method"] == "textDocument/publishDiagnostics" && n["params"]["uri"] == json!(uri.as_str())
                });
                if let Some(index) = position {
                    return self.notifications.remove(index).unwrap()["params"].clone();
                }
                let _ = self.dispatch_next().await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("no diagnostics for {}", uri))
    }

    pub async fn initialize(&mut self, root: &Url) -> Value {
        let params = json!({
            "processId": null,
            "rootUri": root.as_str(),
            "capabilities": {},
            "clientInfo": { "name": "integration-test" }
        });
        let response = self.send_request("initialize", params).await;
        self.send_notification("initialized", json!({})).await;
        response
    }

    pub async fn open_document(&mut self, uri: &Url, text: &str) {
        let params = json!({
            "textDocument": { "uri": uri.as_str(), "languageId": "angelscript", "version": 1, "text": text }
        });
        self.send_notification("textDocument/didOpen", params).await;
    }

    pub async fn shutdown(&mut self) {
        let response = self.send_request("shutdown", Value::Null).await;
        assert!(response.get("error").is_none(), "shutdown failed: {}", response);
        self.send_notification("exit", Value::Null).await;
    }
}
