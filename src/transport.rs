//! Stdio Transport (C1) — async line-delimited JSON-RPC framing.
//!
//! A read loop parses one NDJSON line per request and hands each to the
//! dispatcher (C2) as a spawned task, so multiple tool calls can run
//! concurrently, bounded by a fixed-size permit pool; every task's computed
//! response is sent over an `mpsc` channel to a single dedicated writer
//! task that owns stdout exclusively, which is what guarantees responses
//! never interleave without any per-write locking. Partial reads are
//! handled across `fill_buf`/`consume` with an overlong-line discard, built
//! on `tokio::io::AsyncBufReadExt`.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::context::ServerContext;
use crate::dispatcher;
use crate::protocol::JsonRpcResponse;

/// A 10 MiB line cap, generous enough for any realistic tool-call payload
/// while bounding a single malformed/malicious line's memory cost.
const MAX_LINE_BYTES: usize = 10 * 1024 * 1024;

/// Upper bound on concurrently in-flight tool calls: one per available CPU
/// core, so a burst of requests can't spawn unbounded concurrent work.
fn concurrency_cap() -> usize {
    std::thread::available_parallelism().map(std::num::NonZeroUsize::get).unwrap_or(4)
}

/// How long the dispatcher waits for in-flight handlers to finish after
/// stdin reaches EOF, before forcing shutdown.
const SHUTDOWN_GRACE_PERIOD: std::time::Duration = std::time::Duration::from_secs(5);

/// Run the MCP server loop to completion. Returns once stdin is closed and
/// every in-flight handler has finished or the grace period has elapsed.
///
/// # Errors
///
/// Returns an error only for a fatal stdout write failure; malformed input
/// lines are reported to the client as JSON-RPC errors, not propagated here.
pub async fn run(ctx: Arc<ServerContext>) -> anyhow::Result<()> {
    info!(server = %ctx.config.server_name, roots = ?ctx.permissions.allowed_roots(), "starting MCP server");

    let (tx, mut rx) = mpsc::channel::<JsonRpcResponse>(256);

    let writer_task = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(response) = rx.recv().await {
            if let Err(e) = write_response(&mut stdout, &response).await {
                warn!(error = %e, "failed to write response, stopping writer");
                break;
            }
        }
    });

    let semaphore = Arc::new(Semaphore::new(concurrency_cap()));
    let mut in_flight: JoinSet<()> = JoinSet::new();

    let stdin = tokio::io::stdin();
    let mut reader = BufReader::new(stdin);
    let mut line_buf = String::new();

    loop {
        line_buf.clear();
        let outcome = read_line_limited(&mut reader, &mut line_buf, MAX_LINE_BYTES).await?;

        let bytes_read = match outcome {
            LineOutcome::Eof => {
                info!("stdin closed, draining in-flight requests");
                break;
            }
            LineOutcome::Overlong { bytes } => {
                let response = JsonRpcResponse::error(None, -32700, format!("parse error: line exceeded the {MAX_LINE_BYTES}-byte maximum ({bytes} bytes) and was discarded"));
                let _ = tx.send(response).await;
                continue;
            }
            LineOutcome::Read(n) => n,
        };

        if bytes_read == 0 {
            continue;
        }

        let trimmed = line_buf.trim().trim_start_matches('\u{feff}');
        if trimmed.is_empty() {
            continue;
        }

        debug!(raw = trimmed, "received request line");

        let permit = Arc::clone(&semaphore).acquire_owned().await.expect("semaphore never closed");
        let ctx = Arc::clone(&ctx);
        let tx = tx.clone();
        let line = trimmed.to_owned();

        in_flight.spawn(async move {
            let _permit = permit;
            if let Some(response) = dispatcher::handle_line(&ctx, &line).await {
                let _ = tx.send(response).await;
            }
        });
    }

    drop(tx);

    let drained = tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, async {
        while in_flight.join_next().await.is_some() {}
    })
    .await;

    if drained.is_err() {
        warn!("shutdown grace period elapsed with handlers still in flight; forcing exit");
        in_flight.abort_all();
    }

    let _ = writer_task.await;
    info!("MCP server stopped");
    Ok(())
}

async fn write_response(out: &mut (impl tokio::io::AsyncWrite + Unpin), resp: &JsonRpcResponse) -> anyhow::Result<()> {
    let json = serde_json::to_string(resp)?;
    debug!(response = json, "sending response");
    out.write_all(json.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await?;
    Ok(())
}

/// Outcome of one [`read_line_limited`] call.
enum LineOutcome {
    /// Stdin is closed; no more lines will ever arrive.
    Eof,
    /// A line exceeding `max_bytes` was discarded up to its terminating LF;
    /// `bytes` is the total discarded size, for the parse-error diagnostic.
    Overlong { bytes: usize },
    /// `buf` holds a (possibly non-UTF-8-sanitized-to-empty) line; `buf`'s
    /// byte length is returned for the caller's own bookkeeping.
    Read(usize),
}

/// Read a line from `reader` into `buf`, stopping at newline or `max_bytes`.
///
/// A line exceeding `max_bytes` is discarded up to the next newline rather
/// than erroring the whole connection; the caller answers it with a single
/// parse-error response instead of treating it as a silent no-op.
async fn read_line_limited(reader: &mut (impl AsyncBufReadExt + Unpin), buf: &mut String, max_bytes: usize) -> anyhow::Result<LineOutcome> {
    let mut total = 0usize;
    let mut overlong = false;

    loop {
        let mut chunk = Vec::new();
        let n = reader.read_until(b'\n', &mut chunk).await?;
        if n == 0 {
            return Ok(if total == 0 { LineOutcome::Eof } else if overlong { LineOutcome::Overlong { bytes: total } } else { LineOutcome::Read(total) });
        }

        let found_newline = chunk.last() == Some(&b'\n');

        if total + chunk.len() > max_bytes || overlong {
            overlong = true;
            total += chunk.len();
            if found_newline {
                warn!(bytes = total, "discarding line exceeding maximum size");
                buf.clear();
                return Ok(LineOutcome::Overlong { bytes: total });
            }
            continue;
        }

        match std::str::from_utf8(&chunk) {
            Ok(text) => buf.push_str(text),
            Err(_) => {
                warn!("discarding non-UTF-8 line");
                buf.clear();
                return Ok(LineOutcome::Read(chunk.len()));
            }
        }
        total += chunk.len();
        return Ok(LineOutcome::Read(total));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_single_line() {
        let data = b"hello\n".to_vec();
        let mut reader = std::io::Cursor::new(data);
        let mut buf = String::new();
        let outcome = read_line_limited(&mut reader, &mut buf, 1024).await.expect("ok");
        assert!(matches!(outcome, LineOutcome::Read(6)));
        assert_eq!(buf.trim(), "hello");
    }

    #[tokio::test]
    async fn reports_eof() {
        let data: Vec<u8> = Vec::new();
        let mut reader = std::io::Cursor::new(data);
        let mut buf = String::new();
        let outcome = read_line_limited(&mut reader, &mut buf, 1024).await.expect("ok");
        assert!(matches!(outcome, LineOutcome::Eof));
    }

    #[tokio::test]
    async fn reports_overlong_line_distinctly_from_eof_or_a_normal_read() {
        let mut data = vec![b'a'; 32];
        data.push(b'\n');
        let mut reader = std::io::Cursor::new(data);
        let mut buf = String::new();
        let outcome = read_line_limited(&mut reader, &mut buf, 8).await.expect("ok");
        assert!(matches!(outcome, LineOutcome::Overlong { bytes: 33 }));
    }
}
