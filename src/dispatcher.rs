//! Dispatcher (C2) — routes a single framed JSON-RPC line to a protocol
//! handler, validates `tools/call` arguments via [`crate::validator`] ahead
//! of invocation, and turns every handler outcome into a wire-shaped
//! [`JsonRpcResponse`].
//!
//! This is the crate's central invariant: a handler's [`ServerError`]
//! never becomes a JSON-RPC error object here
//! (except for the protocol-level cases — bad method, bad params shape —
//! that occur before a tool handler is ever reached). Everything else is
//! folded into a successful response whose tool-result payload carries
//! `isError: true`, via [`ToolCallResult::from_error`].

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::context::ServerContext;
use crate::error::ServerError;
use crate::protocol::{
    InitializeResult, JsonRpcRequest, JsonRpcResponse, ResourceReadParams, ResourcesListResult, ResourcesReadResult,
    ServerCapabilities, ServerInfo, ToolCallParams, ToolCallResult, ToolsCapability, ToolsListResult, PROTOCOL_VERSION,
};
use crate::{tools, validator};

/// Parse and dispatch one trimmed, non-empty input line.
///
/// Returns `None` for notifications (no `id`): they are processed for any
/// side effect but never answered.
pub async fn handle_line(ctx: &Arc<ServerContext>, line: &str) -> Option<JsonRpcResponse> {
    let line = line.strip_prefix('\u{feff}').unwrap_or(line);

    let request: JsonRpcRequest = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "malformed JSON-RPC line");
            return Some(JsonRpcResponse::error(None, ServerError::ParseError(e.to_string()).rpc_code(), format!("parse error: {e}")));
        }
    };

    let is_notification = request.id.is_none();
    let response = handle_request(ctx, request).await;

    if is_notification {
        None
    } else {
        Some(response)
    }
}

async fn handle_request(ctx: &Arc<ServerContext>, request: JsonRpcRequest) -> JsonRpcResponse {
    let id = request.id.clone();
    debug!(method = %request.method, "dispatching request");

    match request.method.as_str() {
        "initialize" => JsonRpcResponse::success(id, json_or_internal_error(&handle_initialize(ctx))),
        "ping" => JsonRpcResponse::success(id, serde_json::json!({})),
        "tools/list" => JsonRpcResponse::success(id, json_or_internal_error(&handle_tools_list(ctx))),
        "tools/call" => handle_tools_call(ctx, id, request.params).await,
        "resources/list" => JsonRpcResponse::success(id, json_or_internal_error(&handle_resources_list())),
        "resources/read" => handle_resources_read(ctx, id, request.params),
        "notifications/initialized" | "notifications/cancelled" => JsonRpcResponse::success(id, serde_json::json!({})),
        other => JsonRpcResponse::error(id, -32601, format!("method not found: {other}")),
    }
}

fn json_or_internal_error<T: serde::Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        error!(error = %e, "failed to serialize an internal response value");
        serde_json::json!({})
    })
}

fn handle_initialize(ctx: &ServerContext) -> InitializeResult {
    InitializeResult {
        protocol_version: PROTOCOL_VERSION.to_owned(),
        capabilities: ServerCapabilities {
            tools: ToolsCapability { list_changed: false },
            resources: Some(crate::protocol::ResourcesCapability { list_changed: false }),
        },
        server_info: ServerInfo {
            name: ctx.config.server_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
        },
    }
}

fn handle_tools_list(ctx: &ServerContext) -> ToolsListResult {
    ToolsListResult { tools: tools::list_tools(ctx) }
}

async fn handle_tools_call(ctx: &Arc<ServerContext>, id: Option<serde_json::Value>, params: serde_json::Value) -> JsonRpcResponse {
    let call: ToolCallParams = match serde_json::from_value(params) {
        Ok(c) => c,
        Err(e) => return JsonRpcResponse::error(id, -32602, format!("invalid params: {e}")),
    };

    if let Some(definition) = ctx.registry.get_definition(&call.name) {
        if let Err(validation_error) = validator::validate(&definition.input_schema, &call.arguments) {
            debug!(tool = %call.name, error = %validation_error, "argument validation failed");
            return JsonRpcResponse::success(id, json_or_internal_error(&ToolCallResult::from_error(&validation_error)));
        }
    }

    let result = match tools::call_tool(ctx, &call.name, call.arguments).await {
        Ok(result) => result,
        Err(ServerError::Internal(msg)) => {
            error!(tool = %call.name, error = %msg, "internal error while handling tool call");
            ToolCallResult::err("internal error: the server could not complete this tool call")
        }
        Err(e) => {
            if matches!(e, ServerError::PermissionDenied { .. }) {
                warn!(tool = %call.name, error = %e, "permission denied");
            }
            ToolCallResult::from_error(&e)
        }
    };

    JsonRpcResponse::success(id, json_or_internal_error(&result))
}

fn handle_resources_list() -> ResourcesListResult {
    ResourcesListResult { resources: vec![crate::tools::prompt::resource_descriptor()] }
}

fn handle_resources_read(ctx: &ServerContext, id: Option<serde_json::Value>, params: serde_json::Value) -> JsonRpcResponse {
    let params: ResourceReadParams = match serde_json::from_value(params) {
        Ok(p) => p,
        Err(e) => return JsonRpcResponse::error(id, -32602, format!("invalid params: {e}")),
    };

    if params.uri == crate::tools::prompt::SYSTEM_PROMPT_URI {
        let result: ResourcesReadResult = crate::tools::prompt::read_resource(ctx);
        JsonRpcResponse::success(id, json_or_internal_error(&result))
    } else {
        JsonRpcResponse::error(id, -32602, format!("unknown resource uri: {}", params.uri))
    }
}
