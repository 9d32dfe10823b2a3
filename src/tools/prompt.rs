//! System Prompt Assembler (C11) — a pure function over current filesystem
//! and registry state, re-evaluated on every read.
//!
//! Reports the working directory, OS, detected project type, git status,
//! and the currently enabled tool inventory, structured the way every
//! other tool module separates a `*_definition()` constructor from the
//! executing function.

use std::path::Path;
use std::process::Command;

use crate::context::ServerContext;
use crate::protocol::{ResourceDescriptor, ResourcesReadResult, ToolDefinition};

pub const SYSTEM_PROMPT_URI: &str = "hanzo://system-prompt";

#[must_use]
pub fn resource_descriptor() -> ResourceDescriptor {
    ResourceDescriptor {
        uri: SYSTEM_PROMPT_URI.to_owned(),
        name: "system-prompt".to_owned(),
        mime_type: "text/plain".to_owned(),
    }
}

/// Known project-marker files, checked in the order listed; the first match
/// determines the reported project type.
const PROJECT_MARKERS: &[(&str, &str)] = &[
    ("Cargo.toml", "rust"),
    ("package.json", "node"),
    ("pyproject.toml", "python"),
    ("go.mod", "go"),
    ("pom.xml", "java (maven)"),
    ("build.gradle", "java/kotlin (gradle)"),
];

#[must_use]
pub fn assemble(ctx: &ServerContext) -> String {
    let root = ctx.permissions.allowed_roots().first().cloned().unwrap_or_else(|| std::path::PathBuf::from("."));

    let mut out = String::new();
    out.push_str(&format!("timestamp: {}\n", chrono::Utc::now().to_rfc3339()));
    out.push_str(&format!("operating_system: {}\n", std::env::consts::OS));
    out.push_str(&format!("working_directory: {}\n", root.display()));
    out.push_str(&format!("project_type: {}\n", detect_project_type(&root)));

    if let Some(git_info) = git_status(&root) {
        out.push_str(&git_info);
    } else {
        out.push_str("git: not a repository\n");
    }

    out.push_str("\ntools (enabled, by category):\n");
    let mut last_category = "";
    for (name, category, enabled) in ctx.registry.list_all_with_category() {
        if !enabled {
            continue;
        }
        let label = category.label();
        if label != last_category {
            out.push_str(&format!("  [{label}]\n"));
            last_category = label;
        }
        out.push_str(&format!("    - {name}\n"));
    }

    out.push_str(
        "\nUsage guidance: prefer `read`/`list`/`tree`/`find`/`grep` for exploration before \
        editing; use `edit`/`multi_edit` for literal, uniqueness-checked changes rather than \
        rewriting whole files with `write`; use `run_background` for long-lived processes and \
        `run_command` only for commands expected to finish within the timeout.\n",
    );

    out
}

pub fn read_resource(ctx: &ServerContext) -> ResourcesReadResult {
    ResourcesReadResult {
        contents: vec![crate::protocol::ResourceContents {
            uri: SYSTEM_PROMPT_URI.to_owned(),
            mime_type: "text/plain".to_owned(),
            text: assemble(ctx),
        }],
    }
}

fn detect_project_type(root: &Path) -> &'static str {
    for (marker, label) in PROJECT_MARKERS {
        if root.join(marker).exists() {
            return label;
        }
    }
    "unknown"
}

fn git_status(root: &Path) -> Option<String> {
    if !root.join(".git").exists() {
        return None;
    }

    let branch = Command::new("git")
        .arg("rev-parse")
        .arg("--abbrev-ref")
        .arg("HEAD")
        .current_dir(root)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_owned())
        .unwrap_or_else(|| "unknown".to_owned());

    let dirty = Command::new("git")
        .arg("status")
        .arg("--porcelain")
        .current_dir(root)
        .output()
        .ok()
        .map(|o| !o.stdout.is_empty())
        .unwrap_or(false);

    let remote = Command::new("git")
        .arg("remote")
        .arg("get-url")
        .arg("origin")
        .current_dir(root)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_owned());

    let mut text = format!("git_branch: {branch}\ngit_dirty: {dirty}\n");
    if let Some(remote) = remote {
        text.push_str(&format!("git_remote: {remote}\n"));
    }
    Some(text)
}

// This tool has no input/output shape of its own beyond the resource read;
// it is not registered in the tool registry, only exposed as a resource
// that's re-evaluated each time it's read. Kept as a `ToolDefinition`
// helper so `list-tools` can mention it alongside real tools.
#[must_use]
pub fn documentation_entry() -> ToolDefinition {
    ToolDefinition {
        name: "system-prompt (resource)".to_owned(),
        description: "Read via resources/read at hanzo://system-prompt, not tools/call.".to_owned(),
        input_schema: serde_json::json!({}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    #[test]
    fn assemble_includes_working_directory_and_os() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("Cargo.toml"), "[package]\nname=\"x\"").expect("write");
        let config = ServerConfig { allowed_roots: vec![dir.path().canonicalize().unwrap()], ..ServerConfig::default() };
        let ctx = ServerContext {
            permissions: crate::permissions::PermissionManager::new(config.allowed_roots.clone()),
            registry: crate::registry::ToolRegistry::new(),
            processes: crate::tools::process::ProcessSupervisor::new(),
            search_backend: crate::tools::search::BackendCache::detect(),
            config,
        };
        let text = assemble(&ctx);
        assert!(text.contains("working_directory:"));
        assert!(text.contains("project_type: rust"));
    }

    #[test]
    fn git_status_is_none_outside_a_repository() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(git_status(dir.path()).is_none());
    }
}
