//! Shell Runner (C9) — async `run_command` over `tokio::process`.
//!
//! Runs a command (`sh -c` dispatch, stdout/stderr capture, timeout-then-
//! kill) on the async runtime: `tokio::time::timeout` wraps `child.wait()`
//! rather than a blocking poll loop, output is capped at 10 MiB with a
//! truncation flag instead of being buffered unbounded, and exit code is
//! always returned as data in the result text (never as `isError`) since a
//! nonzero exit is an expected, successful tool invocation — only a
//! timeout or spawn failure is a tool error. Stdin is closed so interactive
//! commands fail fast instead of hanging the handler.

use std::process::Stdio;

use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::context::ServerContext;
use crate::error::{ServerError, ServerResult};
use crate::protocol::{ToolCallResult, ToolDefinition};

/// Hard cap on captured stdout/stderr bytes per stream; output beyond this
/// is dropped and the result is flagged truncated rather than growing the
/// response without bound.
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunCommandParams {
    pub command: String,
    #[serde(default)]
    pub cwd: Option<String>,
    /// Omitted means "use `ServerConfig::shell_timeout_ms`".
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Run through a login shell (`sh -lc`) so profile-sourced `PATH`/env
    /// changes apply, at the cost of slower startup.
    #[serde(default)]
    pub login_shell: bool,
}

#[must_use]
pub fn run_command_definition() -> ToolDefinition {
    ToolDefinition {
        name: "run_command".to_owned(),
        description: "Run a shell command to completion and return its stdout, stderr, and \
            exit code. Stdin is closed, so interactive commands fail immediately instead of \
            hanging. A nonzero exit code is reported as data, not as a tool error; only a \
            timeout or spawn failure is a tool error."
            .to_owned(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "description": "Shell command line to run"},
                "cwd": {"type": "string", "description": "Working directory (default: first allowed root)"},
                "timeoutMs": {"type": "integer", "description": "Timeout in milliseconds (default: the server's configured shell_timeout_ms)"},
                "loginShell": {"type": "boolean", "description": "Run through a login shell so profile env vars apply (default: false)", "default": false}
            },
            "required": ["command"]
        }),
    }
}

pub async fn run_command(ctx: &ServerContext, arguments: serde_json::Value) -> ServerResult<ToolCallResult> {
    let params: RunCommandParams = parse_params(arguments)?;
    let cwd = resolve_cwd(ctx, params.cwd.as_deref())?;

    if !ctx.permissions.is_command_allowed(&params.command, Some(&cwd)) {
        return Ok(ToolCallResult::err(format!("command is not permitted: {}", params.command)));
    }

    let requested_timeout_ms = params.timeout_ms.unwrap_or(ctx.config.shell_timeout_ms);
    let timeout_ms = requested_timeout_ms.min(ctx.config.max_shell_timeout_ms).max(1);

    let mut cmd = shell_command(&params.command, params.login_shell);
    cmd.current_dir(&cwd).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt as _;
        cmd.process_group(0);
    }

    let mut child = cmd.spawn().map_err(|source| ServerError::Io { path: cwd.clone(), source })?;
    let mut stdout = child.stdout.take().expect("piped stdout");
    let mut stderr = child.stderr.take().expect("piped stderr");

    let run = async {
        let mut out_buf = Vec::new();
        let mut err_buf = Vec::new();
        let (out_result, err_result, status) = tokio::join!(
            read_capped(&mut stdout, &mut out_buf, MAX_OUTPUT_BYTES),
            read_capped(&mut stderr, &mut err_buf, MAX_OUTPUT_BYTES),
            child.wait(),
        );
        (out_buf, out_result, err_buf, err_result, status)
    };

    match tokio::time::timeout(std::time::Duration::from_millis(timeout_ms), run).await {
        Ok((out_buf, out_truncated, err_buf, err_truncated, status)) => {
            let status = status.map_err(|source| ServerError::Io { path: cwd.clone(), source })?;
            let exit_code = status.code().unwrap_or(-1);
            let stdout_text = String::from_utf8_lossy(&out_buf);
            let stderr_text = String::from_utf8_lossy(&err_buf);

            let mut text = String::new();
            if !stdout_text.is_empty() {
                text.push_str(&stdout_text);
                if out_truncated {
                    text.push_str("\n... (stdout truncated at 10 MiB)\n");
                }
            }
            if !stderr_text.is_empty() {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str("STDERR:\n");
                text.push_str(&stderr_text);
                if err_truncated {
                    text.push_str("\n... (stderr truncated at 10 MiB)\n");
                }
            }
            text.push_str(&format!("\n(exit code: {exit_code})"));

            Ok(ToolCallResult::ok(text))
        }
        Err(_) => {
            kill_process_group(&mut child).await;
            Ok(ToolCallResult::err(format!("command timed out after {timeout_ms}ms: {}", params.command)))
        }
    }
}

async fn read_capped<R: tokio::io::AsyncRead + Unpin>(reader: &mut R, buf: &mut Vec<u8>, cap: usize) -> bool {
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => return false,
            Ok(n) => {
                if buf.len() + n > cap {
                    let remaining = cap.saturating_sub(buf.len());
                    buf.extend_from_slice(&chunk[..remaining]);
                    return true;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            Err(_) => return false,
        }
    }
}

/// Terminate the whole process group the command was spawned into (see
/// `process_group(0)` above), not just the immediate `sh` child — a timed
/// out command may have spawned its own children that would otherwise
/// survive. Falls back to killing just the child if the pid is unavailable
/// or the group-kill fails (e.g. on platforms without process groups).
async fn kill_process_group(child: &mut tokio::process::Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        let _ = tokio::process::Command::new("kill").arg("-KILL").arg(format!("-{pid}")).status().await;
    }
    let _ = child.start_kill();
    let _ = child.wait().await;
}

fn shell_command(command: &str, login_shell: bool) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command);
        c
    } else if login_shell {
        let mut c = Command::new("/bin/sh");
        c.arg("-lc").arg(command);
        c
    } else {
        let mut c = Command::new("/bin/sh");
        c.arg("-c").arg(command);
        c
    }
}

fn resolve_cwd(ctx: &ServerContext, cwd: Option<&str>) -> ServerResult<std::path::PathBuf> {
    match cwd {
        Some(p) => ctx.permissions.resolve(p),
        None => ctx
            .permissions
            .allowed_roots()
            .first()
            .cloned()
            .ok_or_else(|| ServerError::Internal("no allowed roots configured".to_owned())),
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(arguments: serde_json::Value) -> ServerResult<T> {
    serde_json::from_value(arguments).map_err(|e| ServerError::Validation { field: "arguments".to_owned(), reason: e.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    fn ctx_for(dir: &std::path::Path) -> ServerContext {
        let config = ServerConfig { allowed_roots: vec![dir.canonicalize().expect("canon")], ..ServerConfig::default() };
        ServerContext {
            permissions: crate::permissions::PermissionManager::new(config.allowed_roots.clone()),
            registry: crate::registry::ToolRegistry::new(),
            processes: crate::tools::process::ProcessSupervisor::new(),
            search_backend: crate::tools::search::BackendCache::detect(),
            config,
        }
    }

    #[tokio::test]
    async fn successful_command_reports_exit_code_zero_without_tool_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = ctx_for(dir.path());
        let result = run_command(&ctx, serde_json::json!({"command": "echo hi"})).await.expect("ran");
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn nonzero_exit_is_not_a_tool_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = ctx_for(dir.path());
        let result = run_command(&ctx, serde_json::json!({"command": "exit 7"})).await.expect("ran");
        assert!(!result.is_error);
        let text = match &result.content[0] {
            crate::protocol::ContentItem::Text { text } => text.clone(),
            _ => String::new(),
        };
        assert!(text.contains("exit code: 7"));
    }

    #[tokio::test]
    async fn timeout_is_reported_as_tool_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = ctx_for(dir.path());
        let result = run_command(&ctx, serde_json::json!({"command": "sleep 5", "timeoutMs": 50})).await.expect("ran");
        assert!(result.is_error);
    }
}
