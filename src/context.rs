//! Shared, `Arc`-wrapped server state handed to every tool handler.
//!
//! Bundles the process-wide shared resources every handler needs: the
//! immutable permission policy, the tool registry (its enabled/disabled
//! state is the only mutable part, guarded internally), the background
//! process table, and the once-initialized search backend cache.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::permissions::PermissionManager;
use crate::registry::ToolRegistry;
use crate::tools::process::ProcessSupervisor;
use crate::tools::search::BackendCache;

pub struct ServerContext {
    pub config: ServerConfig,
    pub permissions: PermissionManager,
    pub registry: ToolRegistry,
    pub processes: ProcessSupervisor,
    pub search_backend: BackendCache,
}

impl ServerContext {
    #[must_use]
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let permissions = PermissionManager::new(config.allowed_roots.clone());
        let search_backend = BackendCache::detect();
        Arc::new(Self {
            config,
            permissions,
            registry: ToolRegistry::new(),
            processes: ProcessSupervisor::new(),
            search_backend,
        })
    }
}
