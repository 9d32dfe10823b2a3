//! Tool dispatch — registration and routing for every MCP tool.
//!
//! A `list_tools()` / `call_tool()` pair: tool descriptors live in
//! [`crate::registry`] (so they can be individually enabled/disabled),
//! dispatch is async (shell and background-process tools suspend on child
//! I/O), and routing takes a shared [`ServerContext`]. Invocation itself
//! stays a plain `match` over the tool name — a tagged union rather than
//! trait objects, since no `async-trait`-equivalent crate is otherwise
//! needed here.

pub mod agent;
pub mod edit;
pub mod fs;
pub mod process;
pub mod prompt;
pub mod search;
pub mod shell;

use std::sync::Arc;

use crate::context::ServerContext;
use crate::error::{ServerError, ServerResult};
use crate::protocol::{ToolCallResult, ToolDefinition};
use crate::registry::ToolCategory;

/// Register every tool descriptor into `ctx.registry`. Call once at
/// startup, before the transport loop begins accepting requests.
///
/// # Panics
///
/// Panics if two tool modules register the same name — a programming
/// error caught at startup rather than silently shadowing a handler.
pub fn register_all(ctx: &ServerContext) {
    let reg = &ctx.registry;

    reg.register(fs::read_definition(), ToolCategory::Filesystem).expect("duplicate tool name");
    reg.register(fs::write_definition(), ToolCategory::Filesystem).expect("duplicate tool name");
    reg.register(fs::list_definition(), ToolCategory::Filesystem).expect("duplicate tool name");
    reg.register(fs::tree_definition(), ToolCategory::Filesystem).expect("duplicate tool name");
    reg.register(fs::info_definition(), ToolCategory::Filesystem).expect("duplicate tool name");

    reg.register(edit::edit_definition(), ToolCategory::Edit).expect("duplicate tool name");
    reg.register(edit::multi_edit_definition(), ToolCategory::Edit).expect("duplicate tool name");

    reg.register(search::grep_definition(), ToolCategory::Search).expect("duplicate tool name");
    reg.register(search::find_definition(), ToolCategory::Search).expect("duplicate tool name");
    reg.register(search::search_definition(), ToolCategory::Search).expect("duplicate tool name");

    reg.register(shell::run_command_definition(), ToolCategory::Shell).expect("duplicate tool name");

    reg.register(process::run_background_definition(), ToolCategory::Process).expect("duplicate tool name");
    reg.register(process::list_processes_definition(), ToolCategory::Process).expect("duplicate tool name");
    reg.register(process::get_process_output_definition(), ToolCategory::Process).expect("duplicate tool name");
    reg.register(process::kill_process_definition(), ToolCategory::Process).expect("duplicate tool name");

    reg.register(tool_enable_definition(), ToolCategory::Meta).expect("duplicate tool name");
    reg.register(tool_disable_definition(), ToolCategory::Meta).expect("duplicate tool name");
    reg.register(tool_list_definition(), ToolCategory::Meta).expect("duplicate tool name");

    if ctx.config.enable_agent {
        reg.register(agent::delegate_definition(), ToolCategory::Agent).expect("duplicate tool name");
    }
}

/// Definitions for every currently enabled tool, for `tools/list`.
#[must_use]
pub fn list_tools(ctx: &ServerContext) -> Vec<ToolDefinition> {
    ctx.registry.list_enabled()
}

/// Dispatch a `tools/call` invocation by name.
///
/// # Errors
///
/// Returns [`ServerError::NotFound`] for an unknown or disabled tool name,
/// or whatever error the individual handler produces; tool-level failures
/// that are expected parts of normal operation (bad regex, ambiguous edit,
/// permission denial) are returned as `Ok` with `is_error: true` by the
/// handlers themselves rather than as `Err`.
pub async fn call_tool(ctx: &Arc<ServerContext>, name: &str, arguments: serde_json::Value) -> ServerResult<ToolCallResult> {
    if !ctx.registry.is_registered(name) {
        return Err(ServerError::NotFound(format!("unknown tool: {name}")));
    }
    if !ctx.registry.is_enabled(name) {
        return Ok(ToolCallResult::err(format!("tool `{name}` is currently disabled")));
    }

    match name {
        "read" => fs::read(ctx, arguments),
        "write" => fs::write(ctx, arguments),
        "list" => fs::list(ctx, arguments),
        "tree" => fs::tree(ctx, arguments),
        "info" => fs::info(ctx, arguments),
        "edit" => edit::edit(ctx, arguments),
        "multi_edit" => edit::multi_edit(ctx, arguments),
        "grep" => search::grep(ctx, arguments),
        "find" => search::find(ctx, arguments),
        "search" => search::search(ctx, arguments),
        "run_command" => shell::run_command(ctx, arguments).await,
        "run_background" => process::run_background(Arc::clone(ctx), arguments).await,
        "list_processes" => process::list_processes(ctx, arguments),
        "get_process_output" => process::get_process_output(ctx, arguments),
        "kill_process" => process::kill_process(ctx, arguments).await,
        "delegate" => agent::delegate(ctx, arguments),
        "tool_enable" => tool_enable(ctx, arguments),
        "tool_disable" => tool_disable(ctx, arguments),
        "tool_list" => tool_list(ctx, arguments),
        other => Err(ServerError::Internal(format!("unreachable: registered tool {other} has no dispatch arm"))),
    }
}

// ---------------------------------------------------------------------------
// Meta-tools — always enabled, operate on the registry itself.
// ---------------------------------------------------------------------------

#[derive(Debug, serde::Deserialize)]
struct ToolNameParams {
    name: String,
}

fn tool_enable_definition() -> ToolDefinition {
    ToolDefinition {
        name: "tool_enable".to_owned(),
        description: "Re-enable a previously disabled tool so it appears in tools/list again."
            .to_owned(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {"name": {"type": "string", "description": "Tool name to enable"}},
            "required": ["name"]
        }),
    }
}

fn tool_disable_definition() -> ToolDefinition {
    ToolDefinition {
        name: "tool_disable".to_owned(),
        description: "Hide a tool from tools/list and reject calls to it. tool_enable, \
            tool_disable, and tool_list themselves can never be disabled."
            .to_owned(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {"name": {"type": "string", "description": "Tool name to disable"}},
            "required": ["name"]
        }),
    }
}

fn tool_list_definition() -> ToolDefinition {
    ToolDefinition {
        name: "tool_list".to_owned(),
        description: "List every registered tool grouped by category, including disabled ones \
            and their enabled state."
            .to_owned(),
        input_schema: serde_json::json!({"type": "object", "properties": {}}),
    }
}

fn tool_enable(ctx: &ServerContext, arguments: serde_json::Value) -> ServerResult<ToolCallResult> {
    let params: ToolNameParams = serde_json::from_value(arguments)
        .map_err(|e| ServerError::Validation { field: "name".to_owned(), reason: e.to_string() })?;
    if ctx.registry.enable(&params.name) {
        Ok(ToolCallResult::ok(format!("enabled: {}", params.name)))
    } else {
        Err(ServerError::NotFound(format!("unknown tool: {}", params.name)))
    }
}

fn tool_disable(ctx: &ServerContext, arguments: serde_json::Value) -> ServerResult<ToolCallResult> {
    let params: ToolNameParams = serde_json::from_value(arguments)
        .map_err(|e| ServerError::Validation { field: "name".to_owned(), reason: e.to_string() })?;
    if crate::registry::ALWAYS_ENABLED.contains(&params.name.as_str()) {
        return Ok(ToolCallResult::err(format!("{} cannot be disabled", params.name)));
    }
    if ctx.registry.disable(&params.name) {
        Ok(ToolCallResult::ok(format!("disabled: {}", params.name)))
    } else {
        Err(ServerError::NotFound(format!("unknown tool: {}", params.name)))
    }
}

fn tool_list(ctx: &ServerContext, _arguments: serde_json::Value) -> ServerResult<ToolCallResult> {
    let mut out = String::new();
    let mut last_category = "";
    for (name, category, enabled) in ctx.registry.list_all_with_category() {
        let label = category.label();
        if label != last_category {
            out.push_str(&format!("[{label}]\n"));
            last_category = label;
        }
        out.push_str(&format!("  {name}\t{}\n", if enabled { "enabled" } else { "disabled" }));
    }
    Ok(ToolCallResult::ok(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    fn ctx_for(dir: &std::path::Path) -> Arc<ServerContext> {
        let config = ServerConfig { allowed_roots: vec![dir.canonicalize().unwrap()], ..ServerConfig::default() };
        let ctx = ServerContext::new(config);
        register_all(&ctx);
        ctx
    }

    #[test]
    fn agent_tool_absent_when_disabled_by_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = ctx_for(dir.path());
        assert!(!ctx.registry.is_registered("delegate"));
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = ctx_for(dir.path());
        let err = call_tool(&ctx, "nonexistent", serde_json::Value::Null).await.expect_err("should fail");
        assert!(matches!(err, ServerError::NotFound(_)));
    }

    #[tokio::test]
    async fn disabling_a_tool_then_calling_it_reports_tool_error_not_rust_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = ctx_for(dir.path());
        tool_disable(&ctx, serde_json::json!({"name": "run_command"})).expect("disabled");
        let result = call_tool(&ctx, "run_command", serde_json::json!({"command": "echo hi"})).await.expect("handled");
        assert!(result.is_error);
    }

    #[test]
    fn meta_tools_always_registered_and_enabled() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = ctx_for(dir.path());
        for name in crate::registry::ALWAYS_ENABLED {
            assert!(ctx.registry.is_enabled(name));
        }
    }
}
