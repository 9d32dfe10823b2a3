//! Edit tool (part of C6/C7) — literal, uniqueness-checked replacement.
//!
//! Follows the usual shape — permission check, read, delegate to the
//! matching engine, diff, atomic write — using the literal engine in
//! [`crate::edit`], plus `multi_edit` for applying several edits to one
//! file as a single atomic write.

use serde::Deserialize;

use crate::context::ServerContext;
use crate::edit::{apply_multi_edit, apply_single_edit, EditOp};
use crate::error::{ServerError, ServerResult};
use crate::protocol::{ToolCallResult, ToolDefinition};
use crate::util::atomic::atomic_write;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditParams {
    pub path: String,
    pub old_text: String,
    pub new_text: String,
    #[serde(default)]
    pub replace_all: bool,
}

#[must_use]
pub fn edit_definition() -> ToolDefinition {
    ToolDefinition {
        name: "edit".to_owned(),
        description: "Replace oldText with newText in a file. oldText must occur exactly once \
            unless replaceAll is set, otherwise the edit is rejected and the file is left \
            untouched. An empty oldText creates a new file with newText as its content."
            .to_owned(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path to the file to edit"},
                "oldText": {"type": "string", "description": "Text to find (empty = create new file)"},
                "newText": {"type": "string", "description": "Replacement text"},
                "replaceAll": {"type": "boolean", "description": "Replace every occurrence instead of requiring exactly one (default: false)", "default": false}
            },
            "required": ["path", "oldText", "newText"]
        }),
    }
}

pub fn edit(ctx: &ServerContext, arguments: serde_json::Value) -> ServerResult<ToolCallResult> {
    if ctx.config.disable_writes {
        return Ok(ToolCallResult::err("edit is disabled on this server (--disable-writes)"));
    }
    let params: EditParams = parse_params(arguments)?;
    let path = ctx.permissions.resolve_for_write(&params.path)?;

    if params.old_text.is_empty() {
        if path.exists() {
            return Ok(ToolCallResult::err(format!(
                "oldText cannot be empty for existing file {}; provide text to replace, or delete the file first",
                path.display()
            )));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ServerError::Io { path: parent.to_path_buf(), source })?;
        }
        atomic_write(&path, &params.new_text).map_err(|e| ServerError::Internal(e.to_string()))?;
        return Ok(ToolCallResult::ok(format!("Created new file: {}", path.display())));
    }

    if !path.exists() {
        return Err(ServerError::NotFound(format!("file not found: {}", path.display())));
    }

    let original = std::fs::read_to_string(&path).map_err(|source| ServerError::Io { path: path.clone(), source })?;

    let (new_content, count) = apply_single_edit(&original, &params.old_text, &params.new_text, params.replace_all)?;

    let diff = crate::edit::diff::unified_diff(&path.display().to_string(), &original, &new_content);
    atomic_write(&path, &new_content).map_err(|e| ServerError::Internal(e.to_string()))?;

    Ok(ToolCallResult::ok(format!("{diff}\n({count} replacement(s))")))
}

// ---------------------------------------------------------------------------
// multi_edit
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiEditOp {
    pub old_text: String,
    pub new_text: String,
    #[serde(default)]
    pub replace_all: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiEditParams {
    pub path: String,
    pub edits: Vec<MultiEditOp>,
}

#[must_use]
pub fn multi_edit_definition() -> ToolDefinition {
    ToolDefinition {
        name: "multi_edit".to_owned(),
        description: "Apply an ordered sequence of literal oldText/newText edits to a single \
            file as one atomic write. Each edit is checked against the result of the previous \
            one; if any edit fails, the whole batch is aborted and the file is left unmodified."
            .to_owned(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path to the file to edit"},
                "edits": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "oldText": {"type": "string"},
                            "newText": {"type": "string"},
                            "replaceAll": {"type": "boolean", "default": false}
                        },
                        "required": ["oldText", "newText"]
                    }
                }
            },
            "required": ["path", "edits"]
        }),
    }
}

pub fn multi_edit(ctx: &ServerContext, arguments: serde_json::Value) -> ServerResult<ToolCallResult> {
    if ctx.config.disable_writes {
        return Ok(ToolCallResult::err("multi_edit is disabled on this server (--disable-writes)"));
    }
    let params: MultiEditParams = parse_params(arguments)?;
    if params.edits.is_empty() {
        return Err(ServerError::Validation { field: "edits".to_owned(), reason: "must contain at least one edit".to_owned() });
    }
    let path = ctx.permissions.resolve_for_write(&params.path)?;

    if !path.exists() {
        return Err(ServerError::NotFound(format!("file not found: {}", path.display())));
    }
    let original = std::fs::read_to_string(&path).map_err(|source| ServerError::Io { path: path.clone(), source })?;

    let ops: Vec<EditOp> = params
        .edits
        .into_iter()
        .map(|e| EditOp { old_text: e.old_text, new_text: e.new_text, replace_all: e.replace_all })
        .collect();

    let (new_content, counts) = apply_multi_edit(&original, &ops)?;

    let diff = crate::edit::diff::unified_diff(&path.display().to_string(), &original, &new_content);
    atomic_write(&path, &new_content).map_err(|e| ServerError::Internal(e.to_string()))?;

    Ok(ToolCallResult::ok(format!("{diff}\n(replacements per edit: {counts:?})")))
}

fn parse_params<T: serde::de::DeserializeOwned>(arguments: serde_json::Value) -> ServerResult<T> {
    serde_json::from_value(arguments).map_err(|e| ServerError::Validation { field: "arguments".to_owned(), reason: e.to_string() })
}
