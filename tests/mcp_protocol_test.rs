//! End-to-end protocol tests driving the server the way a real MCP host
//! would: one JSON-RPC line in, one JSON-RPC line's worth of `Value` out,
//! through `dispatcher::handle_line` exactly as `transport::run` calls it.
//!
//! Per-handler edge cases already have focused unit tests next to their
//! handlers; these exercise the full initialize → tools/list → tools/call
//! path and the cross-cutting behaviors that only show up once requests
//! flow through the dispatcher and permission layer together.

use std::sync::Arc;

use hanzo_mcp::config::ServerConfig;
use hanzo_mcp::context::ServerContext;
use hanzo_mcp::dispatcher::handle_line;
use hanzo_mcp::tools;

fn ctx_rooted_at(dir: &std::path::Path) -> Arc<ServerContext> {
    let config = ServerConfig {
        allowed_roots: vec![dir.canonicalize().expect("canonicalize tempdir")],
        ..ServerConfig::default()
    };
    let ctx = ServerContext::new(config);
    tools::register_all(&ctx);
    ctx
}

async fn call(ctx: &Arc<ServerContext>, id: i64, method: &str, params: serde_json::Value) -> serde_json::Value {
    let request = serde_json::json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
    let response = handle_line(ctx, &request.to_string()).await.expect("request has an id");
    if let Some(error) = &response.error {
        panic!("unexpected JSON-RPC error calling {method}: {error:?}");
    }
    response.result.expect("success response has a result")
}

async fn call_tool(ctx: &Arc<ServerContext>, id: i64, name: &str, arguments: serde_json::Value) -> serde_json::Value {
    call(ctx, id, "tools/call", serde_json::json!({"name": name, "arguments": arguments})).await
}

fn tool_text(result: &serde_json::Value) -> String {
    result["content"][0]["text"].as_str().expect("text content").to_owned()
}

// ---------------------------------------------------------------------------
// S1 — initialize / tools/list handshake
// ---------------------------------------------------------------------------

#[tokio::test]
async fn initialize_then_tools_list_then_resources_list() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ctx = ctx_rooted_at(dir.path());

    let init = call(&ctx, 1, "initialize", serde_json::json!({})).await;
    assert_eq!(init["protocolVersion"], serde_json::json!("2025-06-18"));
    assert_eq!(init["serverInfo"]["name"], serde_json::json!("hanzo-mcp"));

    let list = call(&ctx, 2, "tools/list", serde_json::json!({})).await;
    let names: Vec<&str> = list["tools"].as_array().expect("array").iter().map(|t| t["name"].as_str().unwrap()).collect();
    for expected in ["read", "write", "list", "tree", "info", "edit", "multi_edit", "grep", "find", "search", "run_command", "run_background", "tool_list"] {
        assert!(names.contains(&expected), "{expected} missing from tools/list: {names:?}");
    }
    // the optional agent delegator is gated behind enable_agent and off by default
    assert!(!names.contains(&"delegate"));

    let resources = call(&ctx, 3, "resources/list", serde_json::json!({})).await;
    let uris: Vec<&str> = resources["resources"].as_array().expect("array").iter().map(|r| r["uri"].as_str().unwrap()).collect();
    assert!(uris.contains(&"hanzo://system-prompt"));
}

// ---------------------------------------------------------------------------
// S2 — permission sandbox: reads outside every allowed root are denied
// ---------------------------------------------------------------------------

#[tokio::test]
async fn read_outside_allowed_root_is_permission_denied_not_an_rpc_error() {
    let allowed = tempfile::tempdir().expect("tempdir");
    let outside = tempfile::tempdir().expect("tempdir");
    let secret = outside.path().join("secret.txt");
    std::fs::write(&secret, "nope").expect("write");

    let ctx = ctx_rooted_at(allowed.path());
    let result = call_tool(&ctx, 1, "read", serde_json::json!({"path": secret.to_str()})).await;

    assert_eq!(result["isError"], serde_json::json!(true));
    let text = tool_text(&result).to_lowercase();
    assert!(text.contains("not permitted") || text.contains("denied") || text.contains("outside"));
}

#[tokio::test]
async fn write_then_read_round_trip_inside_allowed_root() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ctx = ctx_rooted_at(dir.path());
    let path = dir.path().join("notes.txt");

    let written = call_tool(&ctx, 1, "write", serde_json::json!({"path": path.to_str(), "content": "hello\nworld\n"})).await;
    assert_eq!(written["isError"], serde_json::json!(false));

    let read = call_tool(&ctx, 2, "read", serde_json::json!({"path": path.to_str()})).await;
    assert_eq!(read["isError"], serde_json::json!(false));
    let text = tool_text(&read);
    assert!(text.contains("hello"));
    assert!(text.contains("world"));
}

// ---------------------------------------------------------------------------
// S3 — unique-match edit succeeds; ambiguous edit leaves the file untouched
// ---------------------------------------------------------------------------

#[tokio::test]
async fn edit_unique_match_succeeds_and_reports_a_diff() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("greeting.txt");
    std::fs::write(&path, "hello world\n").expect("write");
    let ctx = ctx_rooted_at(dir.path());

    let result = call_tool(&ctx, 1, "edit", serde_json::json!({"path": path.to_str(), "oldText": "world", "newText": "there"})).await;
    assert_eq!(result["isError"], serde_json::json!(false));
    assert_eq!(std::fs::read_to_string(&path).expect("read"), "hello there\n");
}

#[tokio::test]
async fn edit_ambiguous_match_reports_tool_error_and_does_not_mutate_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("dup.txt");
    std::fs::write(&path, "foo foo\n").expect("write");
    let ctx = ctx_rooted_at(dir.path());

    let result = call_tool(&ctx, 1, "edit", serde_json::json!({"path": path.to_str(), "oldText": "foo", "newText": "bar"})).await;
    assert_eq!(result["isError"], serde_json::json!(true));
    assert_eq!(std::fs::read_to_string(&path).expect("read"), "foo foo\n");
}

// ---------------------------------------------------------------------------
// S4 — run_command: exit code surfaces as data, not as a tool error
// ---------------------------------------------------------------------------

#[tokio::test]
async fn run_command_nonzero_exit_is_not_a_tool_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ctx = ctx_rooted_at(dir.path());

    let result = call_tool(&ctx, 1, "run_command", serde_json::json!({"command": "exit 7"})).await;
    assert_eq!(result["isError"], serde_json::json!(false));
    assert!(tool_text(&result).contains('7'));
}

#[tokio::test]
async fn run_command_honors_a_short_timeout() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ctx = ctx_rooted_at(dir.path());

    let result = call_tool(&ctx, 1, "run_command", serde_json::json!({"command": "sleep 5", "timeoutMs": 100})).await;
    assert_eq!(result["isError"], serde_json::json!(true));
    let text = tool_text(&result).to_lowercase();
    assert!(text.contains("timeout") || text.contains("timed out"));
}

// ---------------------------------------------------------------------------
// S6 — background process lifecycle, including the kill_process →
// get_process_output not-found contract
// ---------------------------------------------------------------------------

#[tokio::test]
async fn background_process_kill_then_output_is_not_found() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ctx = ctx_rooted_at(dir.path());

    let started = call_tool(&ctx, 1, "run_background", serde_json::json!({"id": "bg1", "command": "sleep 30"})).await;
    assert_eq!(started["isError"], serde_json::json!(false));

    let listed = call_tool(&ctx, 2, "list_processes", serde_json::json!({})).await;
    assert!(tool_text(&listed).contains("sleep 30"));

    let killed = call_tool(&ctx, 3, "kill_process", serde_json::json!({"id": "bg1"})).await;
    assert_eq!(killed["isError"], serde_json::json!(false));

    let request = serde_json::json!({
        "jsonrpc": "2.0", "id": 4, "method": "tools/call",
        "params": {"name": "get_process_output", "arguments": {"id": "bg1"}}
    });
    let response = handle_line(&ctx, &request.to_string()).await.expect("has id");
    let result = response.result.expect("result");
    assert_eq!(result["isError"], serde_json::json!(true));
}

#[tokio::test]
async fn run_background_with_a_live_duplicate_id_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ctx = ctx_rooted_at(dir.path());

    let first = call_tool(&ctx, 1, "run_background", serde_json::json!({"id": "worker", "command": "sleep 30"})).await;
    assert_eq!(first["isError"], serde_json::json!(false));

    let second = call_tool(&ctx, 2, "run_background", serde_json::json!({"id": "worker", "command": "sleep 30"})).await;
    assert_eq!(second["isError"], serde_json::json!(true));

    call_tool(&ctx, 3, "kill_process", serde_json::json!({"id": "worker"})).await;
}

// ---------------------------------------------------------------------------
// Meta-tools: disabling a tool hides it from tools/list and rejects calls
// ---------------------------------------------------------------------------

#[tokio::test]
async fn tool_disable_then_tool_enable_round_trips_through_tools_list() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ctx = ctx_rooted_at(dir.path());

    let disabled = call_tool(&ctx, 1, "tool_disable", serde_json::json!({"name": "run_command"})).await;
    assert_eq!(disabled["isError"], serde_json::json!(false));

    let list = call(&ctx, 2, "tools/list", serde_json::json!({})).await;
    let names: Vec<&str> = list["tools"].as_array().expect("array").iter().map(|t| t["name"].as_str().unwrap()).collect();
    assert!(!names.contains(&"run_command"));

    let call_while_disabled = call_tool(&ctx, 3, "run_command", serde_json::json!({"command": "echo hi"})).await;
    assert_eq!(call_while_disabled["isError"], serde_json::json!(true));

    let enabled = call_tool(&ctx, 4, "tool_enable", serde_json::json!({"name": "run_command"})).await;
    assert_eq!(enabled["isError"], serde_json::json!(false));

    let list_again = call(&ctx, 5, "tools/list", serde_json::json!({})).await;
    let names_again: Vec<&str> = list_again["tools"].as_array().expect("array").iter().map(|t| t["name"].as_str().unwrap()).collect();
    assert!(names_again.contains(&"run_command"));
}

#[tokio::test]
async fn meta_tools_cannot_be_disabled() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ctx = ctx_rooted_at(dir.path());

    let result = call_tool(&ctx, 1, "tool_disable", serde_json::json!({"name": "tool_list"})).await;
    assert_eq!(result["isError"], serde_json::json!(true));

    let list = call(&ctx, 2, "tools/list", serde_json::json!({})).await;
    let names: Vec<&str> = list["tools"].as_array().expect("array").iter().map(|t| t["name"].as_str().unwrap()).collect();
    assert!(names.contains(&"tool_list"));
}

// ---------------------------------------------------------------------------
// Malformed requests never take down the rest of the session
// ---------------------------------------------------------------------------

#[tokio::test]
async fn malformed_line_is_answered_with_a_parse_error_and_session_keeps_working() {
    let dir = tempfile::tempdir().expect("tempdir");
    let ctx = ctx_rooted_at(dir.path());

    let bad = handle_line(&ctx, "not json at all").await.expect("malformed line with no id is still answered");
    assert!(bad.error.is_some());
    assert_eq!(bad.error.unwrap().code, -32700);

    let good = call(&ctx, 99, "ping", serde_json::json!({})).await;
    assert_eq!(good, serde_json::json!({}));
}
