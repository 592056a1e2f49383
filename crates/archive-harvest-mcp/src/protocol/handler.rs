//! Routes JSON-RPC messages to the handshake and the tool registry.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::context::HarvestContext;
use crate::tools::ToolRegistry;
use crate::types::*;

use super::negotiation::NegotiatedCapabilities;
use super::validator::validate_request;

pub struct ProtocolHandler {
    context: Arc<HarvestContext>,
    capabilities: Arc<Mutex<NegotiatedCapabilities>>,
}

impl ProtocolHandler {
    pub fn new(context: Arc<HarvestContext>) -> Self {
        Self {
            context,
            capabilities: Arc::new(Mutex::new(NegotiatedCapabilities::default())),
        }
    }

    /// Requests always get a reply; notifications and stray responses never do.
    pub async fn handle_message(&self, msg: JsonRpcMessage) -> Option<Value> {
        match msg {
            JsonRpcMessage::Request(req) => Some(self.handle_request(req).await),
            JsonRpcMessage::Notification(notif) => {
                self.handle_notification(notif).await;
                None
            }
            JsonRpcMessage::Response(_) | JsonRpcMessage::Error(_) => {
                tracing::warn!("ignoring response message from client");
                None
            }
        }
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> Value {
        let id = request.id.clone();
        let reply = match validate_request(&request) {
            Ok(()) => self.dispatch_request(request).await,
            Err(e) => Err(e),
        };

        match reply {
            Ok(result) => to_value(&JsonRpcResponse::new(id, result)),
            Err(e) => {
                tracing::debug!(code = e.code(), error = %e, "request failed");
                to_value(&e.to_json_rpc_error(id))
            }
        }
    }

    async fn dispatch_request(&self, request: JsonRpcRequest) -> McpResult<Value> {
        match request.method.as_str() {
            "initialize" => {
                let params: InitializeParams = required(request.params, "initialize")?;
                let result = self.capabilities.lock().await.negotiate(params);
                Ok(to_value(&result))
            }
            "tools/list" => Ok(to_value(&ToolListResult {
                tools: ToolRegistry::list_tools(),
                next_cursor: None,
            })),
            "tools/call" => {
                let params: ToolCallParams = required(request.params, "tools/call")?;
                let result = ToolRegistry::call(&params.name, params.arguments, &self.context).await?;
                Ok(to_value(&result))
            }
            "ping" => Ok(empty()),
            "shutdown" => {
                tracing::info!("shutdown requested");
                Ok(empty())
            }
            other => Err(McpError::MethodNotFound(other.to_string())),
        }
    }

    async fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            "initialized" | "notifications/initialized" => {
                self.capabilities.lock().await.mark_initialized();
            }
            "notifications/cancelled" | "$/cancelRequest" => {
                tracing::info!("cancellation requested; in-flight calls run to completion");
            }
            other => tracing::debug!(method = other, "unhandled notification"),
        }
    }

    pub async fn is_initialized(&self) -> bool {
        self.capabilities.lock().await.initialized
    }
}

fn required<T: DeserializeOwned>(params: Option<Value>, method: &str) -> McpResult<T> {
    let params = params.ok_or_else(|| McpError::InvalidParams(format!("{method} params required")))?;
    serde_json::from_value(params).map_err(|e| McpError::InvalidParams(e.to_string()))
}

fn to_value(value: &impl Serialize) -> Value {
    serde_json::to_value(value).unwrap_or_default()
}

fn empty() -> Value {
    Value::Object(serde_json::Map::new())
}
