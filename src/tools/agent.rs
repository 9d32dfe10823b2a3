//! Agent Delegator (C12, optional) — spawns a constrained sub-worker against
//! a read-only subset of the tool registry.
//!
//! No LLM provider SDK is wired in here, so the "worker" is an injectable
//! trait: [`Worker`]. The core enforces the iteration cap, the
//! total-tool-call cap, and the one-level sub-delegation limit regardless of
//! which worker implementation is plugged in. [`MechanicalWorker`] is the
//! built-in implementation — it never calls a model, it just mechanically
//! walks the constrained tool subset, which is enough to exercise the caps
//! and the registry-subsetting logic in tests. A real deployment supplies a
//! provider-backed `Worker` behind the same trait.
//!
//! Follows the handler-shape conventions (`*_definition()` / executing fn)
//! carried over from every other tool module.

use std::sync::Arc;

use serde::Deserialize;

use crate::context::ServerContext;
use crate::error::{ServerError, ServerResult};
use crate::protocol::{ToolCallResult, ToolDefinition};

/// Tools the delegator's worker is permitted to invoke.
pub const ALLOWED_WORKER_TOOLS: &[&str] = &["read", "list", "tree", "find", "grep", "search"];

const DEFAULT_MAX_ITERATIONS: u32 = 10;
const DEFAULT_MAX_TOOL_CALLS: u32 = 30;
const MAX_SUB_DELEGATION_DEPTH: u32 = 1;

/// One step a worker reports back to the delegator loop.
pub enum WorkerStep {
    /// Invoke one of [`ALLOWED_WORKER_TOOLS`] with the given arguments.
    ToolCall { name: String, arguments: serde_json::Value },
    /// The worker is done; this is its final answer.
    Finished(String),
}

/// Pluggable delegation worker. A provider-backed implementation would call
/// out to a model each `next_step`, feeding it the task description and the
/// result of the previous tool call.
pub trait Worker {
    fn next_step(&mut self, task: &str, last_tool_result: Option<&ToolCallResult>) -> WorkerStep;
}

/// Built-in worker with no model call: runs `grep` once against the task
/// description as a literal pattern, then finishes with whatever it found.
/// Exists to exercise the delegation loop's caps end-to-end without an
/// external LLM client.
pub struct MechanicalWorker {
    step: u32,
}

impl MechanicalWorker {
    #[must_use]
    pub fn new() -> Self {
        Self { step: 0 }
    }
}

impl Default for MechanicalWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl Worker for MechanicalWorker {
    fn next_step(&mut self, task: &str, last_tool_result: Option<&ToolCallResult>) -> WorkerStep {
        self.step += 1;
        match (self.step, last_tool_result) {
            (1, _) => WorkerStep::ToolCall {
                name: "grep".to_owned(),
                arguments: serde_json::json!({"pattern": regex::escape(task), "maxResults": 20}),
            },
            (_, Some(result)) => {
                let text = result
                    .content
                    .first()
                    .map(|c| match c {
                        crate::protocol::ContentItem::Text { text } => text.clone(),
                        _ => String::new(),
                    })
                    .unwrap_or_default();
                WorkerStep::Finished(text)
            }
            _ => WorkerStep::Finished(String::new()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegateParams {
    pub task: String,
    /// Accepted for forward compatibility with a provider-backed worker;
    /// the built-in mechanical worker ignores it.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub depth: u32,
}

#[must_use]
pub fn delegate_definition() -> ToolDefinition {
    ToolDefinition {
        name: "delegate".to_owned(),
        description: "Spawn a constrained sub-worker with read-only access to read/list/tree/\
            find/grep/search to investigate `task`, bounded by an iteration cap and a total \
            tool-call cap. The worker may itself delegate at most one further level."
            .to_owned(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "task": {"type": "string", "description": "Task description for the sub-worker"},
                "model": {"type": "string", "description": "Optional model identifier for a provider-backed worker"}
            },
            "required": ["task"]
        }),
    }
}

pub fn delegate(ctx: &Arc<ServerContext>, arguments: serde_json::Value) -> ServerResult<ToolCallResult> {
    if !ctx.config.enable_agent {
        return Ok(ToolCallResult::err("delegate is disabled on this server (enable with --enable-agent)"));
    }

    let params: DelegateParams = serde_json::from_value(arguments)
        .map_err(|e| ServerError::Validation { field: "arguments".to_owned(), reason: e.to_string() })?;

    if params.depth > MAX_SUB_DELEGATION_DEPTH {
        return Ok(ToolCallResult::err(format!(
            "delegation depth {} exceeds the maximum of {MAX_SUB_DELEGATION_DEPTH}",
            params.depth
        )));
    }

    let mut worker = MechanicalWorker::new();
    run_worker_loop(ctx, &mut worker, &params.task)
}

fn run_worker_loop(ctx: &Arc<ServerContext>, worker: &mut dyn Worker, task: &str) -> ServerResult<ToolCallResult> {
    let mut last_result: Option<ToolCallResult> = None;
    let mut tool_calls_used = 0u32;

    for _iteration in 0..DEFAULT_MAX_ITERATIONS {
        match worker.next_step(task, last_result.as_ref()) {
            WorkerStep::Finished(text) => return Ok(ToolCallResult::ok(text)),
            WorkerStep::ToolCall { name, arguments } => {
                if !ALLOWED_WORKER_TOOLS.contains(&name.as_str()) {
                    return Ok(ToolCallResult::err(format!("worker attempted a disallowed tool: {name}")));
                }
                if tool_calls_used >= DEFAULT_MAX_TOOL_CALLS {
                    return Ok(ToolCallResult::err(format!(
                        "worker exceeded the maximum of {DEFAULT_MAX_TOOL_CALLS} tool calls"
                    )));
                }
                tool_calls_used += 1;
                last_result = Some(invoke_constrained_tool(ctx, &name, arguments)?);
            }
        }
    }

    Ok(ToolCallResult::err(format!("worker exceeded the maximum of {DEFAULT_MAX_ITERATIONS} iterations")))
}

fn invoke_constrained_tool(ctx: &Arc<ServerContext>, name: &str, arguments: serde_json::Value) -> ServerResult<ToolCallResult> {
    match name {
        "read" => crate::tools::fs::read(ctx, arguments),
        "list" => crate::tools::fs::list(ctx, arguments),
        "tree" => crate::tools::fs::tree(ctx, arguments),
        "find" => crate::tools::search::find(ctx, arguments),
        "grep" => crate::tools::search::grep(ctx, arguments),
        "search" => crate::tools::search::search(ctx, arguments),
        other => Err(ServerError::Internal(format!("unreachable: allowed tool {other} has no handler"))),
    }
}
