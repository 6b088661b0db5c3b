//! Line-delimited JSON-RPC tool server over stdin/stdout.
//!
//! All calls lock one shared store, so mutations are applied one at a time.
//! After a successful mutation the store is written back to the data directory.

use crate::error::StoreError;
use crate::export;
use crate::integrity;
use crate::loader;
use crate::model::Node;
use crate::mcp_types::{tool_text, McpRequest, McpResponse, INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR};
use crate::persistence::DataDir;
use crate::schema::NodeKind;
use crate::store::KnowledgeStore;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

type Args = Map<String, Value>;

/// Failure of a single tool call, reported back to the client as tool output.
#[derive(Debug, thiserror::Error)]
enum ToolError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0}")]
    BadArguments(String),
    #[error("change applied in memory but could not be saved: {0:#}")]
    Save(anyhow::Error),
}

#[derive(Clone)]
pub struct ToolServer {
    store: Arc<Mutex<KnowledgeStore>>,
    data: Option<DataDir>,
}

impl ToolServer {
    /// `data` is where mutations are flushed; `None` keeps them in memory only.
    pub fn new(store: KnowledgeStore, data: Option<DataDir>) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            data,
        }
    }

    pub fn store(&self) -> Arc<Mutex<KnowledgeStore>> {
        Arc::clone(&self.store)
    }

    /// Serves requests until `reader` reaches end of input.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(response) = self.handle_line(&line).await {
                let mut out = serde_json::to_string(&response)?;
                out.push('\n');
                writer.write_all(out.as_bytes()).await?;
                writer.flush().await?;
            }
        }
        info!("stdio tool server: input closed");
        Ok(())
    }

    /// Handles one request line. Notifications get no response.
    pub async fn handle_line(&self, line: &str) -> Option<McpResponse> {
        let request: McpRequest = match serde_json::from_str(line) {
            Ok(req) => req,
            Err(e) => {
                warn!(error = %e, "unparseable request");
                return Some(McpResponse::failure(None, PARSE_ERROR, format!("Parse error: {e}")));
            }
        };
        debug!(method = %request.method, "request");

        let params = request.params.unwrap_or_default();
        match request.method.as_str() {
            "initialize" => Some(McpResponse::success(
                request.id,
                json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": { "tools": {} },
                    "serverInfo": {
                        "name": "examgraph",
                        "version": env!("CARGO_PKG_VERSION")
                    }
                }),
            )),
            "tools/list" => Some(McpResponse::success(request.id, json!({ "tools": tool_definitions() }))),
            "tools/call" => {
                let Some(name) = params.get("name").and_then(Value::as_str) else {
                    return Some(McpResponse::failure(request.id, INVALID_PARAMS, "missing tool name"));
                };
                let args = match params.get("arguments") {
                    Some(Value::Object(args)) => args.clone(),
                    _ => Args::new(),
                };
                let result = match self.call_tool(name, &args).await {
                    Some(Ok(text)) => tool_text(text, false),
                    Some(Err(e)) => tool_text(e.to_string(), true),
                    None => {
                        return Some(McpResponse::failure(
                            request.id,
                            METHOD_NOT_FOUND,
                            format!("Tool not found: {name}"),
                        ))
                    }
                };
                Some(McpResponse::success(request.id, result))
            }
            method if method.starts_with("notifications/") => None,
            _ => match request.id {
                Some(id) => Some(McpResponse::failure(Some(id), METHOD_NOT_FOUND, "Method not found")),
                None => None,
            },
        }
    }

    async fn call_tool(&self, name: &str, args: &Args) -> Option<Result<String, ToolError>> {
        let result = match name {
            "list_nodes" => self.list_nodes(args).await,
            "get_node" => self.get_node(args).await,
            "add_node" => self.add_node(args).await,
            "delete_node" => self.delete_node(args).await,
            "update_node" => self.update_node(args).await,
            "rename_node" => self.rename_node(args).await,
            "check_integrity" => self.check_integrity().await,
            _ => return None,
        };
        if let Err(e) = &result {
            debug!(tool = name, error = %e, "tool call rejected");
        }
        Some(result)
    }

    async fn list_nodes(&self, args: &Args) -> Result<String, ToolError> {
        let kind = kind_arg(args)?;
        let store = self.store.lock().await;
        let records = export::collection(&store, kind).map_err(|e| ToolError::BadArguments(e.to_string()))?;
        Ok(Value::Array(records).to_string())
    }

    async fn get_node(&self, args: &Args) -> Result<String, ToolError> {
        let id = str_arg(args, "id")?;
        let store = self.store.lock().await;
        let node = store.require(id)?;
        let record = export::record(node).map_err(|e| ToolError::BadArguments(e.to_string()))?;
        Ok(json!({ "kind": node.kind(), "record": record }).to_string())
    }

    async fn add_node(&self, args: &Args) -> Result<String, ToolError> {
        let (kind, node) = node_arg(args)?;
        let id = node.id().to_string();

        let mut store = self.store.lock().await;
        store.add(node)?;
        self.flush(&store).await?;
        info!(%id, %kind, "node added");
        Ok(format!("Added {kind} '{id}'"))
    }

    async fn delete_node(&self, args: &Args) -> Result<String, ToolError> {
        let id = str_arg(args, "id")?;
        let mut store = self.store.lock().await;
        let removed = store.delete(id)?;
        self.flush(&store).await?;
        info!(%id, kind = %removed.kind(), "node deleted");
        Ok(format!("Deleted {} '{id}'", removed.kind()))
    }

    async fn update_node(&self, args: &Args) -> Result<String, ToolError> {
        let (kind, node) = node_arg(args)?;
        let id = node.id().to_string();

        let mut store = self.store.lock().await;
        store.replace(node)?;
        self.flush(&store).await?;
        info!(%id, %kind, "node updated");
        Ok(format!("Updated {kind} '{id}'"))
    }

    async fn rename_node(&self, args: &Args) -> Result<String, ToolError> {
        let old_id = str_arg(args, "old_id")?;
        let new_id = str_arg(args, "new_id")?;
        let mut store = self.store.lock().await;
        let rewritten = store.rename_id(old_id, new_id)?;
        self.flush(&store).await?;
        info!(%old_id, %new_id, rewritten, "node renamed");
        Ok(format!("Renamed '{old_id}' to '{new_id}' ({rewritten} references updated)"))
    }

    async fn check_integrity(&self) -> Result<String, ToolError> {
        let store = self.store.lock().await;
        let broken = integrity::audit(&store);
        if broken.is_empty() {
            return Ok("No broken references found.".to_string());
        }
        Ok(broken.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n"))
    }

    /// Writes a snapshot on the blocking pool. The caller keeps the lock, so saves land in order.
    async fn flush(&self, store: &KnowledgeStore) -> Result<(), ToolError> {
        let Some(data) = self.data.clone() else {
            return Ok(());
        };
        let snapshot = store.clone();
        tokio::task::spawn_blocking(move || data.save(&snapshot))
            .await
            .map_err(|e| ToolError::Save(anyhow::anyhow!("save task failed: {e}")))?
            .map_err(ToolError::Save)
    }
}

fn str_arg<'a>(args: &'a Args, name: &str) -> Result<&'a str, ToolError> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::BadArguments(format!("missing string argument '{name}'")))
}

fn kind_arg(args: &Args) -> Result<NodeKind, ToolError> {
    str_arg(args, "kind")?
        .parse()
        .map_err(|e: crate::schema::UnknownKind| ToolError::BadArguments(e.to_string()))
}

fn node_arg(args: &Args) -> Result<(NodeKind, Node), ToolError> {
    let kind = kind_arg(args)?;
    let record = args
        .get("record")
        .ok_or_else(|| ToolError::BadArguments("missing argument 'record'".to_string()))?;
    let node = loader::node_from_record(kind, 0, record).map_err(|e| ToolError::BadArguments(e.reason))?;
    Ok((kind, node))
}

fn tool_definitions() -> Value {
    let kinds: Vec<&str> = NodeKind::ALL.iter().map(|k| k.as_str()).collect();
    json!([
        {
            "name": "list_nodes",
            "description": "List every node of one kind, ordered by ID",
            "inputSchema": {
                "type": "object",
                "properties": { "kind": { "type": "string", "enum": kinds } },
                "required": ["kind"]
            }
        },
        {
            "name": "get_node",
            "description": "Fetch a single node by ID",
            "inputSchema": {
                "type": "object",
                "properties": { "id": { "type": "string" } },
                "required": ["id"]
            }
        },
        {
            "name": "add_node",
            "description": "Add a node from a record in the persisted shape",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "kind": { "type": "string", "enum": kinds },
                    "record": { "type": "object" }
                },
                "required": ["kind", "record"]
            }
        },
        {
            "name": "update_node",
            "description": "Replace an existing node with a new record of the same kind",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "kind": { "type": "string", "enum": kinds },
                    "record": { "type": "object" }
                },
                "required": ["kind", "record"]
            }
        },
        {
            "name": "delete_node",
            "description": "Delete a node that no other node references",
            "inputSchema": {
                "type": "object",
                "properties": { "id": { "type": "string" } },
                "required": ["id"]
            }
        },
        {
            "name": "rename_node",
            "description": "Change a node's ID and rewrite every reference to it",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "old_id": { "type": "string" },
                    "new_id": { "type": "string" }
                },
                "required": ["old_id", "new_id"]
            }
        },
        {
            "name": "check_integrity",
            "description": "Report every reference that points at a missing node",
            "inputSchema": { "type": "object", "properties": {} }
        }
    ])
}

/// Runs the tool server on the process's stdin and stdout.
pub async fn run_mcp_stdio(server: ToolServer) -> anyhow::Result<()> {
    let reader = tokio::io::BufReader::new(tokio::io::stdin());
    server.serve(reader, tokio::io::stdout()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn call(server: &ToolServer, name: &str, args: Value) -> Value {
        let line = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": { "name": name, "arguments": args }
        })
        .to_string();
        let response = server.handle_line(&line).await.unwrap();
        serde_json::to_value(response).unwrap()["result"].clone()
    }

    fn text(result: &Value) -> &str {
        result["content"][0]["text"].as_str().unwrap()
    }

    #[tokio::test]
    async fn test_initialize_and_list_tools() {
        let server = ToolServer::new(KnowledgeStore::new(), None);
        let init = server
            .handle_line(r#"{"jsonrpc":"2.0","id":0,"method":"initialize"}"#)
            .await
            .unwrap();
        assert_eq!(init.result.unwrap()["serverInfo"]["name"], "examgraph");

        let tools = server
            .handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#)
            .await
            .unwrap();
        let names: Vec<String> = tools.result.unwrap()["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            [
                "list_nodes",
                "get_node",
                "add_node",
                "update_node",
                "delete_node",
                "rename_node",
                "check_integrity"
            ]
        );
    }

    #[tokio::test]
    async fn test_notifications_get_no_response() {
        let server = ToolServer::new(KnowledgeStore::new(), None);
        assert!(server
            .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_store_errors_are_tool_errors() {
        let server = ToolServer::new(KnowledgeStore::new(), None);
        let def = json!({"kind": "definition", "record": {"id": "def-a", "term": "A", "content": "..."}});
        let ok = call(&server, "add_node", def.clone()).await;
        assert_eq!(ok["isError"], false);

        let dup = call(&server, "add_node", def).await;
        assert_eq!(dup["isError"], true);
        assert_eq!(text(&dup), "node with id 'def-a' already exists");

        let missing = call(&server, "delete_node", json!({"id": "nope"})).await;
        assert_eq!(text(&missing), "node with id 'nope' not found");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_method_not_found() {
        let server = ToolServer::new(KnowledgeStore::new(), None);
        let line = r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"query_sparql"}}"#;
        let response = server.handle_line(line).await.unwrap();
        assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
    }
}
