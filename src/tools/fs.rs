//! Filesystem Tools (C6) — read, write, list, tree, info.
//!
//! `read` and `write` do binary sniffing, an atomic write, and parent
//! directory creation; `list`, `tree`, and `info` share the same
//! permission-check-then-walk shape. `find` lives in
//! [`crate::tools::search`] alongside `grep`, since both share the
//! rg/ag/ack backend cascade (C8).

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::context::ServerContext;
use crate::error::{ServerError, ServerResult};
use crate::protocol::{ToolCallResult, ToolDefinition};
use crate::util::atomic::atomic_write;
use crate::util::encoding::{decode_text, looks_binary, BINARY_CHECK_BYTES};

const MAX_LINE_LENGTH: usize = 2000;
/// Directories the `tree` tool filters out unless `include_filtered` is set.
const NOISE_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    "__pycache__",
    "target",
    ".venv",
    "venv",
    "dist",
    "build",
    ".next",
];

// ---------------------------------------------------------------------------
// read
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadParams {
    pub path: String,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_read_limit")]
    pub limit: usize,
}

const fn default_read_limit() -> usize {
    2000
}

#[must_use]
pub fn read_definition() -> ToolDefinition {
    ToolDefinition {
        name: "read".to_owned(),
        description: "Read a file's content with line numbers, offset/limit pagination, \
            and automatic UTF-8/UTF-16/Latin-1 encoding detection. Binary files return a \
            descriptive placeholder instead of raw bytes."
            .to_owned(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Absolute path to the file to read"},
                "offset": {"type": "integer", "description": "0-based starting line index (default: 0)", "default": 0},
                "limit": {"type": "integer", "description": "Maximum number of lines to return (default: 2000)", "default": 2000}
            },
            "required": ["path"]
        }),
    }
}

pub fn read(ctx: &ServerContext, arguments: serde_json::Value) -> ServerResult<ToolCallResult> {
    let params: ReadParams = parse_params(arguments)?;
    let path = ctx.permissions.resolve(&params.path)?;

    if !path.exists() {
        return Err(ServerError::NotFound(format!("file not found: {}", path.display())));
    }

    let raw = std::fs::read(&path).map_err(|source| ServerError::Io { path: path.clone(), source })?;

    if looks_binary(&raw[..raw.len().min(BINARY_CHECK_BYTES)]) {
        return Ok(ToolCallResult::err(format!(
            "Binary file detected: {} ({} bytes)",
            path.display(),
            raw.len()
        )));
    }

    let decoded = decode_text(&raw);
    let lines: Vec<&str> = decoded.text.lines().collect();
    let total_lines = lines.len();

    let start = params.offset.min(total_lines);
    let end = (start + params.limit).min(total_lines);

    let mut output = String::new();
    let width = end.to_string().len();
    for (i, line) in lines[start..end].iter().enumerate() {
        let line_no = start + i + 1;
        let truncated = truncate_at_char_boundary(line, MAX_LINE_LENGTH);
        output.push_str(&format!("{line_no:>width$}\t{truncated}\n"));
    }

    let has_more = end < total_lines;
    if has_more {
        output.push_str(&format!("\n... ({} more lines, {} total, encoding={})\n", total_lines - end, total_lines, decoded.encoding));
    }

    Ok(ToolCallResult::ok(output))
}

fn truncate_at_char_boundary(line: &str, max: usize) -> &str {
    if line.len() <= max {
        return line;
    }
    let mut end = max;
    while end > 0 && !line.is_char_boundary(end) {
        end -= 1;
    }
    &line[..end]
}

// ---------------------------------------------------------------------------
// write
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteParams {
    pub path: String,
    pub content: String,
}

#[must_use]
pub fn write_definition() -> ToolDefinition {
    ToolDefinition {
        name: "write".to_owned(),
        description: "Create or overwrite a file with the given UTF-8 content. Missing parent \
            directories are created automatically as long as they remain inside an allowed root. \
            Writes are atomic (write-to-temp then rename)."
            .to_owned(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Absolute path to the file to write"},
                "content": {"type": "string", "description": "UTF-8 content to write"}
            },
            "required": ["path", "content"]
        }),
    }
}

pub fn write(ctx: &ServerContext, arguments: serde_json::Value) -> ServerResult<ToolCallResult> {
    if ctx.config.disable_writes {
        return Ok(ToolCallResult::err("write is disabled on this server (--disable-writes)"));
    }
    let params: WriteParams = parse_params(arguments)?;
    let path = ctx.permissions.resolve_for_write(&params.path)?;

    let existed = path.exists();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ServerError::Io { path: parent.to_path_buf(), source })?;
    }
    atomic_write(&path, &params.content).map_err(|e| ServerError::Internal(e.to_string()))?;

    let verb = if existed { "Updated" } else { "Created" };
    let lines = params.content.lines().count();
    Ok(ToolCallResult::ok(format!("{verb} {} ({lines} lines)", path.display())))
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub path: String,
    #[serde(default)]
    pub glob: Option<String>,
}

#[must_use]
pub fn list_definition() -> ToolDefinition {
    ToolDefinition {
        name: "list".to_owned(),
        description: "List directory entries (names plus file/directory markers), optionally \
            filtered by a glob pattern."
            .to_owned(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Directory to list"},
                "glob": {"type": "string", "description": "Optional glob filter, e.g. \"*.rs\""}
            },
            "required": ["path"]
        }),
    }
}

pub fn list(ctx: &ServerContext, arguments: serde_json::Value) -> ServerResult<ToolCallResult> {
    let params: ListParams = parse_params(arguments)?;
    let dir = ctx.permissions.resolve(&params.path)?;

    if !dir.is_dir() {
        return Err(ServerError::NotFound(format!("{} is not a directory", dir.display())));
    }

    let matcher = match &params.glob {
        Some(pattern) => Some(
            globset::GlobBuilder::new(pattern)
                .literal_separator(false)
                .build()
                .map_err(|e| ServerError::Validation { field: "glob".to_owned(), reason: e.to_string() })?
                .compile_matcher(),
        ),
        None => None,
    };

    let mut entries: Vec<(String, bool)> = Vec::new();
    for entry in std::fs::read_dir(&dir).map_err(|source| ServerError::Io { path: dir.clone(), source })? {
        let entry = entry.map_err(|source| ServerError::Io { path: dir.clone(), source })?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(m) = &matcher {
            if !m.is_match(&name) {
                continue;
            }
        }
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        entries.push((name, is_dir));
    }
    entries.sort();

    let text = entries
        .iter()
        .map(|(name, is_dir)| format!("{}{}", name, if *is_dir { "/" } else { "" }))
        .collect::<Vec<_>>()
        .join("\n");

    Ok(ToolCallResult::ok(if text.is_empty() { "(empty directory)".to_owned() } else { text }))
}

// ---------------------------------------------------------------------------
// tree
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeParams {
    pub path: String,
    #[serde(default = "default_tree_depth")]
    pub depth: usize,
    #[serde(default)]
    pub show_hidden: bool,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub dirs_only: bool,
    #[serde(default)]
    pub include_filtered: bool,
    #[serde(default)]
    pub show_size: bool,
}

const fn default_tree_depth() -> usize {
    4
}

#[must_use]
pub fn tree_definition() -> ToolDefinition {
    ToolDefinition {
        name: "tree".to_owned(),
        description: "Render a directory as a textual tree, filtering well-known noise \
            directories (node_modules, .git, __pycache__, target, ...) unless includeFiltered is set."
            .to_owned(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Root directory to render"},
                "depth": {"type": "integer", "description": "Maximum recursion depth (default: 4)", "default": 4},
                "showHidden": {"type": "boolean", "description": "Include dotfiles (default: false)", "default": false},
                "pattern": {"type": "string", "description": "Only include entries matching this glob"},
                "dirsOnly": {"type": "boolean", "description": "Only show directories (default: false)", "default": false},
                "includeFiltered": {"type": "boolean", "description": "Do not skip noise directories (default: false)", "default": false},
                "showSize": {"type": "boolean", "description": "Show each entry's size in bytes (default: false)", "default": false}
            },
            "required": ["path"]
        }),
    }
}

pub fn tree(ctx: &ServerContext, arguments: serde_json::Value) -> ServerResult<ToolCallResult> {
    let params: TreeParams = parse_params(arguments)?;
    let root = ctx.permissions.resolve(&params.path)?;

    if !root.is_dir() {
        return Err(ServerError::NotFound(format!("{} is not a directory", root.display())));
    }

    let matcher = match &params.pattern {
        Some(p) => Some(
            globset::GlobBuilder::new(p)
                .literal_separator(false)
                .build()
                .map_err(|e| ServerError::Validation { field: "pattern".to_owned(), reason: e.to_string() })?
                .compile_matcher(),
        ),
        None => None,
    };

    let mut out = String::new();
    out.push_str(&format!("{}\n", root.display()));
    render_tree(&root, "", params.depth, &params, matcher.as_ref(), &mut out);

    Ok(ToolCallResult::ok(out))
}

fn render_tree(
    dir: &Path,
    prefix: &str,
    depth_remaining: usize,
    params: &TreeParams,
    matcher: Option<&globset::GlobMatcher>,
    out: &mut String,
) {
    if depth_remaining == 0 {
        return;
    }
    let Ok(read_dir) = std::fs::read_dir(dir) else { return };
    let mut entries: Vec<_> = read_dir.flatten().collect();
    entries.sort_by_key(std::fs::DirEntry::file_name);

    let mut filtered = Vec::new();
    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !params.show_hidden && name.starts_with('.') {
            continue;
        }
        if !params.include_filtered && NOISE_DIRS.contains(&name.as_str()) {
            continue;
        }
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if params.dirs_only && !is_dir {
            continue;
        }
        if let Some(m) = matcher {
            if !is_dir && !m.is_match(&name) {
                continue;
            }
        }
        let size = params.show_size.then(|| entry.metadata().map(|m| m.len()).unwrap_or(0));
        filtered.push((name, is_dir, entry.path(), size));
    }

    let count = filtered.len();
    for (i, (name, is_dir, path, size)) in filtered.into_iter().enumerate() {
        let is_last = i + 1 == count;
        let connector = if is_last { "└── " } else { "├── " };
        let size_suffix = size.map_or_else(String::new, |bytes| format!("  ({bytes} bytes)"));
        out.push_str(&format!("{prefix}{connector}{name}{}{size_suffix}\n", if is_dir { "/" } else { "" }));
        if is_dir {
            let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
            render_tree(&path, &child_prefix, depth_remaining - 1, params, matcher, out);
        }
    }
}

// ---------------------------------------------------------------------------
// info
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoParams {
    pub path: String,
}

#[must_use]
pub fn info_definition() -> ToolDefinition {
    ToolDefinition {
        name: "info".to_owned(),
        description: "Return size, kind, modification time, mode bits, and symlink target \
            (if any) for a path."
            .to_owned(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path to inspect"}
            },
            "required": ["path"]
        }),
    }
}

pub fn info(ctx: &ServerContext, arguments: serde_json::Value) -> ServerResult<ToolCallResult> {
    let params: InfoParams = parse_params(arguments)?;
    let path = ctx.permissions.resolve(&params.path)?;

    let metadata = std::fs::symlink_metadata(&path).map_err(|_| ServerError::NotFound(format!("{} not found", path.display())))?;

    let kind = if metadata.is_symlink() {
        "symlink"
    } else if metadata.is_dir() {
        "directory"
    } else {
        "file"
    };

    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let mut text = format!(
        "path: {}\nkind: {kind}\nsize: {} bytes\nmtime: {mtime} (unix)\n",
        path.display(),
        metadata.len(),
    );

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        text.push_str(&format!("mode: {:o}\n", metadata.permissions().mode() & 0o7777));
    }

    if metadata.is_symlink() {
        if let Ok(target) = std::fs::read_link(&path) {
            text.push_str(&format!("symlink_target: {}\n", target.display()));
        }
    }

    Ok(ToolCallResult::ok(text))
}

fn parse_params<T: serde::de::DeserializeOwned>(arguments: serde_json::Value) -> ServerResult<T> {
    serde_json::from_value(arguments).map_err(|e| ServerError::Validation {
        field: "arguments".to_owned(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    fn ctx_for(dir: &Path) -> ServerContext {
        let config = ServerConfig {
            allowed_roots: vec![dir.canonicalize().expect("canon")],
            ..ServerConfig::default()
        };
        ServerContext {
            permissions: crate::permissions::PermissionManager::new(config.allowed_roots.clone()),
            registry: crate::registry::ToolRegistry::new(),
            processes: crate::tools::process::ProcessSupervisor::new(),
            search_backend: crate::tools::search::BackendCache::detect(),
            config,
        }
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = ctx_for(dir.path());
        let path = dir.path().join("a.txt");

        let w = write(&ctx, serde_json::json!({"path": path.to_str(), "content": "line1\nline2\n"})).expect("write ok");
        assert!(!w.is_error);

        let r = read(&ctx, serde_json::json!({"path": path.to_str()})).expect("read ok");
        assert!(!r.is_error);
    }

    #[test]
    fn read_missing_file_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = ctx_for(dir.path());
        let err = read(&ctx, serde_json::json!({"path": dir.path().join("missing.txt").to_str()})).expect_err("should fail");
        assert!(matches!(err, ServerError::NotFound(_)));
    }

    #[test]
    fn read_binary_file_is_reported_as_error_result() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = ctx_for(dir.path());
        let path = dir.path().join("bin.dat");
        std::fs::write(&path, [0u8, 1, 2, 3]).expect("write");
        let result = read(&ctx, serde_json::json!({"path": path.to_str()})).expect("handled");
        assert!(result.is_error);
    }

    #[test]
    fn list_respects_glob_filter() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.rs"), "x").expect("write");
        std::fs::write(dir.path().join("b.txt"), "x").expect("write");
        let ctx = ctx_for(dir.path());
        let result = list(&ctx, serde_json::json!({"path": dir.path().to_str(), "glob": "*.rs"})).expect("ok");
        let text = match &result.content[0] {
            crate::protocol::ContentItem::Text { text } => text.clone(),
            _ => String::new(),
        };
        assert!(text.contains("a.rs"));
        assert!(!text.contains("b.txt"));
    }

    #[test]
    fn tree_filters_noise_directories_by_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("node_modules")).expect("mkdir");
        std::fs::create_dir_all(dir.path().join("src")).expect("mkdir");
        let ctx = ctx_for(dir.path());
        let result = tree(&ctx, serde_json::json!({"path": dir.path().to_str()})).expect("ok");
        let text = match &result.content[0] {
            crate::protocol::ContentItem::Text { text } => text.clone(),
            _ => String::new(),
        };
        assert!(!text.contains("node_modules"));
        assert!(text.contains("src"));
    }

    #[test]
    fn write_disabled_is_reported_as_tool_error_not_rust_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut ctx = ctx_for(dir.path());
        ctx.config.disable_writes = true;
        let result = write(&ctx, serde_json::json!({"path": dir.path().join("x.txt").to_str(), "content": "x"})).expect("handled");
        assert!(result.is_error);
    }
}
