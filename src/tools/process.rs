//! Background Process Supervisor (C10).
//!
//! Launches detached child processes, tracks their lifecycle in a
//! `DashMap`-backed table (the concurrent-map pattern grounded in
//! Only1MCP's `transport::stdio` connection/process tables), and exposes
//! bounded circular buffers of stdout/stderr so long-running commands don't
//! grow the server's memory without bound.

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::context::ServerContext;
use crate::error::{ServerError, ServerResult};
use crate::protocol::{ToolCallResult, ToolDefinition};

/// Lifecycle states a background process can be in. Terminal states
/// (`Exited`, `Killed`) are never left for a running state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Starting,
    Running,
    Exited,
    Killed,
}

/// A bounded FIFO byte buffer; once full, the oldest bytes are dropped to
/// make room for new output, so a chatty long-lived process can't exhaust
/// server memory.
struct RingBuffer {
    capacity: usize,
    data: VecDeque<u8>,
    truncated: bool,
}

impl RingBuffer {
    fn new(capacity: usize) -> Self {
        Self { capacity, data: VecDeque::with_capacity(capacity.min(4096)), truncated: false }
    }

    fn push_line(&mut self, line: &str) {
        let bytes = line.as_bytes();
        if bytes.len() + 1 > self.capacity {
            self.truncated = true;
            return;
        }
        while self.data.len() + bytes.len() + 1 > self.capacity {
            let drop_count = self.data.len().min(self.capacity / 4).max(1);
            for _ in 0..drop_count {
                self.data.pop_front();
            }
            self.truncated = true;
        }
        self.data.extend(bytes.iter().copied());
        self.data.push_back(b'\n');
    }

    fn as_string(&self) -> String {
        let bytes: Vec<u8> = self.data.iter().copied().collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// How long `kill_process` waits for a voluntary exit before escalating to
/// a forced kill.
const KILL_GRACE_PERIOD: std::time::Duration = std::time::Duration::from_secs(2);

struct ProcessHandle {
    command: String,
    started_at: chrono::DateTime<chrono::Utc>,
    state: Mutex<ProcessState>,
    exit_code: Mutex<Option<i32>>,
    stdout: Mutex<RingBuffer>,
    stderr: Mutex<RingBuffer>,
    child_pid: Mutex<Option<u32>>,
    kill_tx: Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
    /// Signaled by the supervisor task once the child has fully reached a
    /// terminal state (`Exited` or `Killed`), so `kill_process` can wait for
    /// the grace-period/escalation dance to finish before removing the
    /// record: `kill_process` must remove the record once the process is
    /// actually gone, and removing it before termination would race a
    /// concurrent `get_process_output` into seeing a live process vanish
    /// early.
    done_rx: Mutex<Option<tokio::sync::oneshot::Receiver<()>>>,
}

/// Process-wide table of background processes, keyed by the user-supplied
/// identifier passed to `run_background`. Unique within the live registry:
/// a second `run_background` call with an id already present is rejected.
pub struct ProcessSupervisor {
    table: DashMap<String, Arc<ProcessHandle>>,
}

impl ProcessSupervisor {
    #[must_use]
    pub fn new() -> Self {
        Self { table: DashMap::new() }
    }
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// run_background
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunBackgroundParams {
    pub id: String,
    pub command: String,
    #[serde(default)]
    pub cwd: Option<String>,
}

#[must_use]
pub fn run_background_definition() -> ToolDefinition {
    ToolDefinition {
        name: "run_background".to_owned(),
        description: "Start a shell command as a detached background process under a \
            caller-chosen id, without waiting for it to finish. The id must not already be in \
            use by a live process. Use list_processes, get_process_output, and kill_process \
            (all keyed by that same id) to manage it afterward."
            .to_owned(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "id": {"type": "string", "description": "Caller-chosen identifier for this process, unique among live background processes"},
                "command": {"type": "string", "description": "Shell command line to run"},
                "cwd": {"type": "string", "description": "Working directory (default: first allowed root)"}
            },
            "required": ["id", "command"]
        }),
    }
}

pub async fn run_background(ctx: Arc<ServerContext>, arguments: serde_json::Value) -> ServerResult<ToolCallResult> {
    let params: RunBackgroundParams = parse_params(arguments)?;
    let cwd = resolve_cwd(&ctx, params.cwd.as_deref())?;

    if !ctx.permissions.is_command_allowed(&params.command, Some(&cwd)) {
        return Ok(ToolCallResult::err(format!("command is not permitted: {}", params.command)));
    }

    let (done_tx, done_rx) = tokio::sync::oneshot::channel();
    let handle = Arc::new(ProcessHandle {
        command: params.command.clone(),
        started_at: chrono::Utc::now(),
        state: Mutex::new(ProcessState::Starting),
        exit_code: Mutex::new(None),
        stdout: Mutex::new(RingBuffer::new(ctx.config.background_buffer_bytes)),
        stderr: Mutex::new(RingBuffer::new(ctx.config.background_buffer_bytes)),
        child_pid: Mutex::new(None),
        kill_tx: Mutex::new(None),
        done_rx: Mutex::new(Some(done_rx)),
    });

    match ctx.processes.table.entry(params.id.clone()) {
        Entry::Occupied(_) => {
            return Ok(ToolCallResult::err(format!("a background process with id `{}` is already running", params.id)));
        }
        Entry::Vacant(v) => {
            v.insert(Arc::clone(&handle));
        }
    }

    let mut cmd = shell_command(&params.command, &cwd);
    // kill_on_drop stays false (the default): background processes must
    // survive the server's own shutdown per §5, so dropping the wait task
    // that owns `child` must not SIGKILL a still-running process.
    cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(source) => {
            ctx.processes.table.remove(&params.id);
            return Err(ServerError::Io { path: cwd.clone(), source });
        }
    };
    *handle.child_pid.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = child.id();
    *handle.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = ProcessState::Running;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (kill_tx, kill_rx) = tokio::sync::oneshot::channel();
    *handle.kill_tx.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(kill_tx);

    let out_handle = Arc::clone(&handle);
    if let Some(stdout) = stdout {
        tokio::spawn(pump_lines(stdout, out_handle, OutputStream::Stdout));
    }
    let err_handle = Arc::clone(&handle);
    if let Some(stderr) = stderr {
        tokio::spawn(pump_lines(stderr, err_handle, OutputStream::Stderr));
    }

    let wait_handle = Arc::clone(&handle);
    tokio::spawn(async move {
        tokio::select! {
            status = child.wait() => {
                let code = status.ok().and_then(|s| s.code()).unwrap_or(-1);
                *wait_handle.exit_code.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(code);
                *wait_handle.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = ProcessState::Exited;
            }
            _ = kill_rx => {
                // Grace period before escalating: give the child a chance to
                // exit on its own (e.g. in response to its own signal
                // handling) before forcing termination.
                let graceful = tokio::time::timeout(KILL_GRACE_PERIOD, child.wait()).await;
                if graceful.is_err() {
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                }
                *wait_handle.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = ProcessState::Killed;
            }
        }
        let _ = done_tx.send(());
    });

    Ok(ToolCallResult::ok(format!("Started background process {}: {}", params.id, params.command)))
}

#[derive(Clone, Copy)]
enum OutputStream {
    Stdout,
    Stderr,
}

async fn pump_lines<R: tokio::io::AsyncRead + Unpin>(reader: R, handle: Arc<ProcessHandle>, which: OutputStream) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let buf = match which {
            OutputStream::Stdout => &handle.stdout,
            OutputStream::Stderr => &handle.stderr,
        };
        buf.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push_line(&line);
    }
}

// ---------------------------------------------------------------------------
// list_processes
// ---------------------------------------------------------------------------

#[must_use]
pub fn list_processes_definition() -> ToolDefinition {
    ToolDefinition {
        name: "list_processes".to_owned(),
        description: "List all background processes started this session, with their current \
            state and exit code if finished."
            .to_owned(),
        input_schema: serde_json::json!({"type": "object", "properties": {}}),
    }
}

pub fn list_processes(ctx: &ServerContext, _arguments: serde_json::Value) -> ServerResult<ToolCallResult> {
    if ctx.processes.table.is_empty() {
        return Ok(ToolCallResult::ok("(no background processes)"));
    }

    let mut rows: Vec<(String, String)> = ctx
        .processes
        .table
        .iter()
        .map(|entry| {
            let id = entry.key().clone();
            let handle = entry.value();
            let state = *handle.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let exit = *handle.exit_code.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let exit_str = exit.map_or_else(|| "-".to_owned(), |c| c.to_string());
            let started = handle.started_at.to_rfc3339();
            let line = format!("{id}\t{state:?}\texit={exit_str}\tstarted={started}\t{}", handle.command);
            (id, line)
        })
        .collect();
    rows.sort_by(|(a, _), (b, _)| a.cmp(b));

    let text = rows.into_iter().map(|(_, line)| line).collect::<Vec<_>>().join("\n");
    Ok(ToolCallResult::ok(format!("id\tstate\texit\tstarted\tcommand\n{text}")))
}

// ---------------------------------------------------------------------------
// get_process_output
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessIdParams {
    pub id: String,
    /// If set, only the last `tail` lines of each stream are returned.
    #[serde(default)]
    pub tail: Option<usize>,
}

#[must_use]
pub fn get_process_output_definition() -> ToolDefinition {
    ToolDefinition {
        name: "get_process_output".to_owned(),
        description: "Fetch buffered stdout/stderr for a background process (up to the \
            configured per-stream buffer size; older output is dropped once the buffer fills). \
            Pass tail to return only the most recent N lines of each stream."
            .to_owned(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "id": {"type": "string", "description": "Process id passed to run_background"},
                "tail": {"type": "integer", "description": "Return only the last N lines of each stream"}
            },
            "required": ["id"]
        }),
    }
}

pub fn get_process_output(ctx: &ServerContext, arguments: serde_json::Value) -> ServerResult<ToolCallResult> {
    let params: ProcessIdParams = parse_params(arguments)?;
    let handle = ctx
        .processes
        .table
        .get(&params.id)
        .ok_or_else(|| ServerError::NotFound(format!("no background process with id {}", params.id)))?;

    let state = *handle.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    let stdout = handle.stdout.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    let stderr = handle.stderr.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

    let mut out = format!("state: {state:?}\nstarted: {}\n", handle.started_at.to_rfc3339());
    if stdout.truncated || stderr.truncated {
        out.push_str("(output truncated: buffer limit reached)\n");
    }
    out.push_str(&format!(
        "--- stdout ---\n{}\n--- stderr ---\n{}\n",
        apply_tail(&stdout.as_string(), params.tail),
        apply_tail(&stderr.as_string(), params.tail),
    ));

    Ok(ToolCallResult::ok(out))
}

fn apply_tail(text: &str, tail: Option<usize>) -> String {
    match tail {
        Some(n) => {
            let lines: Vec<&str> = text.lines().collect();
            let start = lines.len().saturating_sub(n);
            lines[start..].join("\n")
        }
        None => text.to_owned(),
    }
}

// ---------------------------------------------------------------------------
// kill_process
// ---------------------------------------------------------------------------

#[must_use]
pub fn kill_process_definition() -> ToolDefinition {
    ToolDefinition {
        name: "kill_process".to_owned(),
        description: "Terminate a running background process.".to_owned(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {"id": {"type": "string", "description": "Process id passed to run_background"}},
            "required": ["id"]
        }),
    }
}

/// Upper bound on how long `kill_process` itself waits for the supervisor
/// task's grace-period-then-escalate dance before removing the record
/// unconditionally; keeps a stuck child from hanging this handler forever.
const KILL_WAIT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Terminates a background process: sends a terminate signal, waits a grace
/// period, escalates to a kill signal if still alive, then removes the
/// record. A subsequent `get_process_output` for this id always fails with
/// not-found once this returns.
pub async fn kill_process(ctx: &ServerContext, arguments: serde_json::Value) -> ServerResult<ToolCallResult> {
    let params: ProcessIdParams = parse_params(arguments)?;
    let handle = ctx
        .processes
        .table
        .get(&params.id)
        .map(|entry| Arc::clone(entry.value()))
        .ok_or_else(|| ServerError::NotFound(format!("no background process with id {}", params.id)))?;

    let state = *handle.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    if matches!(state, ProcessState::Exited | ProcessState::Killed) {
        ctx.processes.table.remove(&params.id);
        return Ok(ToolCallResult::ok(format!("process {} already finished ({state:?})", params.id)));
    }

    let sender = handle.kill_tx.lock().unwrap_or_else(std::sync::PoisonError::into_inner).take();
    if let Some(tx) = sender {
        let _ = tx.send(());
    }

    let done_rx = handle.done_rx.lock().unwrap_or_else(std::sync::PoisonError::into_inner).take();
    if let Some(done_rx) = done_rx {
        let _ = tokio::time::timeout(KILL_WAIT_TIMEOUT, done_rx).await;
    }

    ctx.processes.table.remove(&params.id);
    Ok(ToolCallResult::ok(format!("killed process {}", params.id)))
}

// ---------------------------------------------------------------------------

fn shell_command(command: &str, cwd: &std::path::Path) -> Command {
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command);
        c
    } else {
        let mut c = Command::new("/bin/sh");
        c.arg("-c").arg(command);
        c
    };
    cmd.current_dir(cwd);
    cmd
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

    #[test]
    fn ring_buffer_truncates_when_full() {
        let mut buf = RingBuffer::new(16);
        buf.push_line("0123456789");
        buf.push_line("abcdefghij");
        assert!(buf.truncated);
        assert!(buf.as_string().len() <= 16);
    }

    #[test]
    fn ring_buffer_keeps_small_lines_intact() {
        let mut buf = RingBuffer::new(1024);
        buf.push_line("hello");
        assert_eq!(buf.as_string().trim(), "hello");
        assert!(!buf.truncated);
    }

    #[tokio::test]
    async fn run_background_and_list_and_kill_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = crate::config::ServerConfig { allowed_roots: vec![dir.path().canonicalize().unwrap()], ..crate::config::ServerConfig::default() };
        let ctx = crate::context::ServerContext::new(config);

        let started = run_background(Arc::clone(&ctx), serde_json::json!({"id": "s", "command": "sleep 30"})).await.expect("started");
        assert!(!started.is_error);

        let listed = list_processes(&ctx, serde_json::Value::Null).expect("listed");
        let text = match &listed.content[0] {
            crate::protocol::ContentItem::Text { text } => text.clone(),
            _ => String::new(),
        };
        assert!(text.contains("sleep 30"));

        let killed = kill_process(&ctx, serde_json::json!({"id": "s"})).await.expect("killed");
        assert!(!killed.is_error);

        let after = get_process_output(&ctx, serde_json::json!({"id": "s"}));
        assert!(matches!(after, Err(ServerError::NotFound(_))));
    }

    #[tokio::test]
    async fn run_background_rejects_duplicate_id_while_live() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = crate::config::ServerConfig { allowed_roots: vec![dir.path().canonicalize().unwrap()], ..crate::config::ServerConfig::default() };
        let ctx = crate::context::ServerContext::new(config);

        let first = run_background(Arc::clone(&ctx), serde_json::json!({"id": "dup", "command": "sleep 30"})).await.expect("started");
        assert!(!first.is_error);

        let second = run_background(Arc::clone(&ctx), serde_json::json!({"id": "dup", "command": "sleep 30"})).await.expect("handled");
        assert!(second.is_error);

        kill_process(&ctx, serde_json::json!({"id": "dup"})).await.expect("killed");
    }
}
