//! Search Orchestrator (C8) — backend detection plus `grep`, `find`, and the
//! unified multi-strategy `search` tool.
//!
//! Subprocess dispatch to `rg`, client-side truncation: the cascade tries
//! `rg` → `ag` → `ack` before falling back to a depth-limited built-in
//! walker over the `ignore` crate (gitignore aware). `find` and the unified
//! `search` tool share the same detected backend.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;

use crate::context::ServerContext;
use crate::error::{ServerError, ServerResult};
use crate::protocol::{ToolCallResult, ToolDefinition};

/// Which grep-like backend is available on `$PATH`, detected once at
/// startup and cached for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrepBackend {
    Ripgrep,
    Silversearcher,
    Ack,
    BuiltIn,
}

impl GrepBackend {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Ripgrep => "rg",
            Self::Silversearcher => "ag",
            Self::Ack => "ack",
            Self::BuiltIn => "built-in",
        }
    }
}

/// Caches the detected grep backend and the resolved binary path (if any).
/// Detection runs `which` lookups once; every subsequent `grep`/`search`
/// call reuses the cached result instead of re-probing `$PATH`.
pub struct BackendCache {
    backend: GrepBackend,
    binary: Option<PathBuf>,
}

impl BackendCache {
    /// Probe `$PATH` for `rg`, then `ag`, then `ack`, falling back to the
    /// built-in engine if none are installed.
    #[must_use]
    pub fn detect() -> Self {
        for (backend, name) in [
            (GrepBackend::Ripgrep, "rg"),
            (GrepBackend::Silversearcher, "ag"),
            (GrepBackend::Ack, "ack"),
        ] {
            if let Ok(path) = which::which(name) {
                return Self { backend, binary: Some(path) };
            }
        }
        Self { backend: GrepBackend::BuiltIn, binary: None }
    }

    #[must_use]
    pub const fn backend(&self) -> GrepBackend {
        self.backend
    }
}

// ---------------------------------------------------------------------------
// grep
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrepParams {
    pub pattern: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub include: Option<String>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default)]
    pub context_lines: usize,
}

const fn default_max_results() -> usize {
    100
}

#[must_use]
pub fn grep_definition() -> ToolDefinition {
    ToolDefinition {
        name: "grep".to_owned(),
        description: "Search file contents using regex patterns. Prefers rg, then ag, then \
            ack, falling back to a built-in gitignore-aware engine when none are installed. \
            Supports glob filtering and context lines."
            .to_owned(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string", "description": "Regex pattern to search for"},
                "path": {"type": "string", "description": "Directory or file to search in (default: first allowed root)"},
                "include": {"type": "string", "description": "Glob pattern to filter files (e.g. \"*.rs\")"},
                "maxResults": {"type": "integer", "description": "Maximum number of results (default: 100)", "default": 100},
                "contextLines": {"type": "integer", "description": "Lines of context around matches (default: 0)", "default": 0}
            },
            "required": ["pattern"]
        }),
    }
}

pub fn grep(ctx: &ServerContext, arguments: serde_json::Value) -> ServerResult<ToolCallResult> {
    if ctx.config.disable_search {
        return Ok(ToolCallResult::err("grep is disabled on this server (--disable-search)"));
    }
    let params: GrepParams = parse_params(arguments)?;
    let search_path = resolve_search_root(ctx, params.path.as_deref())?;

    match ctx.search_backend.binary.as_deref() {
        Some(bin) if ctx.search_backend.backend == GrepBackend::Ripgrep => grep_via_rg(bin, &search_path, &params),
        Some(bin) => grep_via_ag_or_ack(bin, &search_path, &params),
        None => grep_builtin(&search_path, &params),
    }
}

fn grep_via_rg(rg: &Path, search_path: &Path, params: &GrepParams) -> ServerResult<ToolCallResult> {
    let rg_max = params.max_results.saturating_mul(10).max(100);

    let mut cmd = Command::new(rg);
    cmd.arg("--color").arg("never").arg("--line-number").arg("--no-heading").arg("--max-count").arg(rg_max.to_string());
    if params.context_lines > 0 {
        cmd.arg("-C").arg(params.context_lines.to_string());
    }
    if let Some(include) = &params.include {
        cmd.arg("--glob").arg(include);
    }
    cmd.arg(&params.pattern).arg(search_path);

    let output = cmd
        .output()
        .map_err(|source| ServerError::Io { path: rg.to_path_buf(), source })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    if output.status.code() == Some(2) {
        return Ok(ToolCallResult::err(format!("grep error: {stderr}")));
    }
    if stdout.is_empty() {
        return Ok(ToolCallResult::ok("No matches found."));
    }

    Ok(ToolCallResult::ok(truncate_lines(&stdout, params.max_results)))
}

/// `ag`/`ack` share a compatible enough line-oriented `file:line:text` output
/// format under `--nocolor --nogroup` / `-H --nogroup --column` that a single
/// code path covers both; neither supports rg's `--max-count` semantics so
/// truncation is entirely client-side.
fn grep_via_ag_or_ack(bin: &Path, search_path: &Path, params: &GrepParams) -> ServerResult<ToolCallResult> {
    let is_ag = bin.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.contains("ag"));

    let mut cmd = Command::new(bin);
    if is_ag {
        cmd.arg("--nocolor").arg("--nogroup");
        if let Some(include) = &params.include {
            cmd.arg("-G").arg(glob_to_regex_hint(include));
        }
    } else {
        cmd.arg("--nocolor").arg("--nogroup").arg("--column");
        if let Some(include) = &params.include {
            cmd.arg(format!("--match={include}"));
        }
    }
    cmd.arg(&params.pattern).arg(search_path);

    let output = cmd.output().map_err(|source| ServerError::Io { path: bin.to_path_buf(), source })?;
    let stdout = String::from_utf8_lossy(&output.stdout);

    if stdout.is_empty() {
        return Ok(ToolCallResult::ok("No matches found."));
    }
    Ok(ToolCallResult::ok(truncate_lines(&stdout, params.max_results)))
}

/// `ag -G` takes a regex matched against the path, not a glob; a `*.ext`
/// include is the overwhelmingly common case and translates directly.
fn glob_to_regex_hint(include: &str) -> String {
    if let Some(ext) = include.strip_prefix("*.") {
        format!(r"\.{}$", regex::escape(ext))
    } else {
        regex::escape(include)
    }
}

fn grep_builtin(search_path: &Path, params: &GrepParams) -> ServerResult<ToolCallResult> {
    let re = regex::Regex::new(&params.pattern)
        .map_err(|e| ServerError::Validation { field: "pattern".to_owned(), reason: e.to_string() })?;

    let glob_matcher = match &params.include {
        Some(p) => Some(
            globset::GlobBuilder::new(p)
                .literal_separator(false)
                .build()
                .map_err(|e| ServerError::Validation { field: "include".to_owned(), reason: e.to_string() })?
                .compile_matcher(),
        ),
        None => None,
    };

    let mut results = Vec::new();
    let mut count = 0;

    for entry in ignore::WalkBuilder::new(search_path).hidden(true).git_ignore(true).build() {
        if count >= params.max_results {
            break;
        }
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.path();
        if let Some(m) = &glob_matcher {
            if !m.is_match(path.file_name().unwrap_or_default()) {
                continue;
            }
        }
        let Ok(content) = std::fs::read_to_string(path) else { continue };
        for (i, line) in content.lines().enumerate() {
            if count >= params.max_results {
                break;
            }
            if re.is_match(line) {
                results.push(format!("{}:{}:{}", path.display(), i + 1, line));
                count += 1;
            }
        }
    }

    if results.is_empty() {
        return Ok(ToolCallResult::ok("No matches found. (built-in fallback engine: rg/ag/ack not installed)"));
    }
    Ok(ToolCallResult::ok(results.join("\n")))
}

fn truncate_lines(text: &str, max: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() > max {
        let mut out = lines[..max].join("\n");
        out.push_str(&format!("\n\n... truncated ({max} results shown out of {}+)", lines.len()));
        out
    } else {
        text.to_owned()
    }
}

// ---------------------------------------------------------------------------
// find — filename matching, fulfills C6's `find` contract via the shared
// backend cascade
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindParams {
    pub pattern: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_find_max")]
    pub max_results: usize,
}

const fn default_find_max() -> usize {
    500
}

#[must_use]
pub fn find_definition() -> ToolDefinition {
    ToolDefinition {
        name: "find".to_owned(),
        description: "Find files by glob pattern (e.g. \"**/*.rs\"), gitignore-aware, sorted \
            for deterministic output."
            .to_owned(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string", "description": "Glob pattern, e.g. \"**/*.rs\""},
                "path": {"type": "string", "description": "Directory to search in (default: first allowed root)"},
                "maxResults": {"type": "integer", "description": "Maximum number of results (default: 500)", "default": 500}
            },
            "required": ["pattern"]
        }),
    }
}

pub fn find(ctx: &ServerContext, arguments: serde_json::Value) -> ServerResult<ToolCallResult> {
    if ctx.config.disable_search {
        return Ok(ToolCallResult::err("find is disabled on this server (--disable-search)"));
    }
    let params: FindParams = parse_params(arguments)?;
    let search_dir = resolve_search_root(ctx, params.path.as_deref())?;

    let glob = globset::GlobBuilder::new(&params.pattern)
        .literal_separator(false)
        .build()
        .map_err(|e| ServerError::Validation { field: "pattern".to_owned(), reason: e.to_string() })?
        .compile_matcher();

    let mut matches = Vec::new();
    for entry in ignore::WalkBuilder::new(&search_dir).hidden(true).git_ignore(true).build() {
        if matches.len() >= params.max_results {
            break;
        }
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.path();
        if let Ok(relative) = path.strip_prefix(&search_dir) {
            if glob.is_match(relative) {
                matches.push(relative.display().to_string());
            }
        }
    }
    matches.sort();

    if matches.is_empty() {
        return Ok(ToolCallResult::ok(format!("No files matching pattern: {}", params.pattern)));
    }
    Ok(ToolCallResult::ok(matches.join("\n")))
}

// ---------------------------------------------------------------------------
// search — unified multi-strategy orchestrator (filename + content + git
// history), run "in parallel up to three strategies" per the contract;
// since individual strategies here are fast synchronous calls, they are
// composed sequentially but kept independent so a future async rework can
// run them concurrently without changing this function's contract.
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub query: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub include_history: bool,
}

#[must_use]
pub fn search_definition() -> ToolDefinition {
    ToolDefinition {
        name: "search".to_owned(),
        description: "Run a combined filename-glob, content-grep, and (optionally) git commit \
            history search for `query`, merging results under labeled sections."
            .to_owned(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search term; used as a literal filename fragment and as a regex for content"},
                "path": {"type": "string", "description": "Directory to search in (default: first allowed root)"},
                "includeHistory": {"type": "boolean", "description": "Also search git commit messages/diffs via `git log -S` (default: false)", "default": false}
            },
            "required": ["query"]
        }),
    }
}

pub fn search(ctx: &ServerContext, arguments: serde_json::Value) -> ServerResult<ToolCallResult> {
    if ctx.config.disable_search {
        return Ok(ToolCallResult::err("search is disabled on this server (--disable-search)"));
    }
    let params: SearchParams = parse_params(arguments)?;
    let search_dir = resolve_search_root(ctx, params.path.as_deref())?;

    let mut sections = Vec::new();

    let name_pattern = format!("**/*{}*", glob_escape_literal(&params.query));
    let filename_matches = find(
        ctx,
        serde_json::json!({"pattern": name_pattern, "path": search_dir.to_string_lossy()}),
    )?;
    sections.push(("filenames", result_text(&filename_matches)));

    let content_matches = grep(
        ctx,
        serde_json::json!({"pattern": regex::escape(&params.query), "path": search_dir.to_string_lossy()}),
    )?;
    sections.push(("content", result_text(&content_matches)));

    if params.include_history {
        sections.push(("history", search_history(&search_dir, &params.query)));
    }

    let mut out = String::new();
    for (label, text) in sections {
        out.push_str(&format!("## {label}\n{text}\n\n"));
    }

    Ok(ToolCallResult::ok(out.trim_end().to_owned()))
}

fn glob_escape_literal(s: &str) -> String {
    s.chars().filter(|c| !matches!(c, '*' | '?' | '[' | ']')).collect()
}

fn result_text(result: &ToolCallResult) -> String {
    match result.content.first() {
        Some(crate::protocol::ContentItem::Text { text }) => text.clone(),
        _ => String::new(),
    }
}

fn search_history(dir: &Path, query: &str) -> String {
    let output = Command::new("git").arg("log").arg("-S").arg(query).arg("--oneline").arg("-20").current_dir(dir).output();

    match output {
        Ok(out) if out.status.success() => {
            let text = String::from_utf8_lossy(&out.stdout);
            if text.trim().is_empty() {
                "(no matching commits)".to_owned()
            } else {
                text.into_owned()
            }
        }
        _ => "(not a git repository, or git unavailable)".to_owned(),
    }
}

// ---------------------------------------------------------------------------

fn resolve_search_root(ctx: &ServerContext, path: Option<&str>) -> ServerResult<PathBuf> {
    match path {
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

    fn ctx_for(dir: &Path) -> ServerContext {
        let config = ServerConfig { allowed_roots: vec![dir.canonicalize().expect("canon")], ..ServerConfig::default() };
        ServerContext {
            permissions: crate::permissions::PermissionManager::new(config.allowed_roots.clone()),
            registry: crate::registry::ToolRegistry::new(),
            processes: crate::tools::process::ProcessSupervisor::new(),
            search_backend: BackendCache::detect(),
            config,
        }
    }

    #[test]
    fn builtin_grep_finds_literal_match() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.txt"), "hello world\nfoo bar\n").expect("write");
        let result = grep_builtin(
            dir.path(),
            &GrepParams { pattern: "hello".into(), path: None, include: None, max_results: 10, context_lines: 0 },
        )
        .expect("ok");
        let text = result_text(&result);
        assert!(text.contains("hello world"));
    }

    #[test]
    fn find_matches_glob_pattern() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.rs"), "x").expect("write");
        std::fs::write(dir.path().join("b.txt"), "x").expect("write");
        let ctx = ctx_for(dir.path());
        let result = find(&ctx, serde_json::json!({"pattern": "*.rs"})).expect("ok");
        let text = result_text(&result);
        assert!(text.contains("a.rs"));
        assert!(!text.contains("b.txt"));
    }

    #[test]
    fn search_disabled_reports_tool_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut ctx = ctx_for(dir.path());
        ctx.config.disable_search = true;
        let result = grep(&ctx, serde_json::json!({"pattern": "x"})).expect("handled");
        assert!(result.is_error);
    }

    #[test]
    fn backend_detect_picks_some_variant() {
        let cache = BackendCache::detect();
        assert!(matches!(
            cache.backend(),
            GrepBackend::Ripgrep | GrepBackend::Silversearcher | GrepBackend::Ack | GrepBackend::BuiltIn
        ));
    }
}
