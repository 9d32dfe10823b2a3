//! Server configuration, assembled once at startup from CLI flags (parsed by
//! the binary at `src/bin/hanzo-mcp.rs`) overlaid with environment variables.
//!
//! Immutable for the lifetime of the process — nothing in this crate ever
//! mutates a `ServerConfig` after [`ServerConfig::build`] returns.

use std::path::PathBuf;

/// Environment variable carrying comma-separated allowed-path roots.
/// CLI-supplied roots take precedence when both are present.
pub const ALLOWED_PATHS_ENV: &str = "HANZO_ALLOWED_PATHS";

const DEFAULT_SHELL_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_MAX_SHELL_TIMEOUT_MS: u64 = 10 * 60 * 1000;
const DEFAULT_BACKGROUND_BUFFER_BYTES: usize = 64 * 1024;
const DEFAULT_SERVER_NAME: &str = "hanzo-mcp";

/// Immutable, process-wide server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Absolute, canonicalized directory roots filesystem/shell/search tools
    /// are permitted to touch.
    pub allowed_roots: Vec<PathBuf>,
    /// Display name reported in `initialize`'s `serverInfo.name`.
    pub server_name: String,
    /// Disables write/edit/multi_edit (and, by extension, anything that
    /// mutates the filesystem) when true.
    pub disable_writes: bool,
    /// Disables grep/find/search_code when true.
    pub disable_search: bool,
    /// Registers the agent delegator tool when true.
    pub enable_agent: bool,
    /// Default shell command timeout, in milliseconds.
    pub shell_timeout_ms: u64,
    /// Upper bound a caller's `timeout` argument may request.
    pub max_shell_timeout_ms: u64,
    /// Minimum size of each background process's circular output buffer.
    pub background_buffer_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            allowed_roots: vec![PathBuf::from(".")],
            server_name: DEFAULT_SERVER_NAME.to_owned(),
            disable_writes: false,
            disable_search: false,
            enable_agent: false,
            shell_timeout_ms: DEFAULT_SHELL_TIMEOUT_MS,
            max_shell_timeout_ms: DEFAULT_MAX_SHELL_TIMEOUT_MS,
            background_buffer_bytes: DEFAULT_BACKGROUND_BUFFER_BYTES,
        }
    }
}

impl ServerConfig {
    /// Build a config from explicit CLI-parsed roots plus the ambient
    /// environment. `cli_roots` wins over `HANZO_ALLOWED_PATHS` when non-empty.
    ///
    /// # Errors
    ///
    /// Returns an error if a root cannot be canonicalized (it must exist).
    pub fn build(
        cli_roots: Vec<PathBuf>,
        server_name: Option<String>,
        disable_writes: bool,
        disable_search: bool,
        enable_agent: bool,
    ) -> anyhow::Result<Self> {
        let raw_roots = if cli_roots.is_empty() {
            std::env::var(ALLOWED_PATHS_ENV)
                .ok()
                .map(|v| v.split(',').map(PathBuf::from).collect::<Vec<_>>())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| vec![PathBuf::from(".")])
        } else {
            cli_roots
        };

        let mut allowed_roots = Vec::with_capacity(raw_roots.len());
        for root in raw_roots {
            let canonical = root
                .canonicalize()
                .map_err(|e| anyhow::anyhow!("allowed root {} is invalid: {e}", root.display()))?;
            allowed_roots.push(canonical);
        }

        Ok(Self {
            allowed_roots,
            server_name: server_name.unwrap_or_else(|| DEFAULT_SERVER_NAME.to_owned()),
            disable_writes,
            disable_search,
            enable_agent,
            ..Self::default()
        })
    }
}
