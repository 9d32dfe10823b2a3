//! Tool Registry (C4) — holds descriptors keyed by name, with a runtime
//! enabled/disabled flag per tool. Invocation itself stays a plain match
//! over the tool name in [`crate::dispatcher`] (a tagged union over trait
//! objects); this module owns only the descriptor bookkeeping and the
//! enable/disable state duplicate-name rejection needs.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::protocol::ToolDefinition;

/// Tool category, used only for the system-prompt assembler's grouped
/// inventory and for documentation purposes in `list-tools`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCategory {
    Filesystem,
    Edit,
    Search,
    Shell,
    Process,
    Meta,
    Agent,
}

impl ToolCategory {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Filesystem => "filesystem",
            Self::Edit => "edit",
            Self::Search => "search",
            Self::Shell => "shell",
            Self::Process => "process",
            Self::Meta => "meta",
            Self::Agent => "agent",
        }
    }
}

/// Names of the three always-enabled meta-tools. Registered by the
/// dispatcher at startup and exempt from `tool_disable`.
pub const ALWAYS_ENABLED: &[&str] = &["tool_enable", "tool_disable", "tool_list"];

struct Descriptor {
    definition: ToolDefinition,
    category: ToolCategory,
    enabled: bool,
}

/// Registry of tool descriptors. Enable/disable state is guarded by a single
/// `RwLock`; definitions themselves are immutable once registered.
pub struct ToolRegistry {
    descriptors: RwLock<HashMap<String, Descriptor>>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            descriptors: RwLock::new(HashMap::new()),
        }
    }

    /// Register a tool descriptor. Duplicate names are rejected.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned (a prior panic elsewhere
    /// while holding the lock) — this only happens after a bug has already
    /// corrupted process state, so it is preferable to crashing the whole
    /// server over serving a torn registry.
    pub fn register(&self, definition: ToolDefinition, category: ToolCategory) -> Result<(), String> {
        let mut guard = self.descriptors.write().expect("registry lock poisoned");
        if guard.contains_key(&definition.name) {
            return Err(format!("duplicate tool name: {}", definition.name));
        }
        guard.insert(
            definition.name.clone(),
            Descriptor {
                definition,
                category,
                enabled: true,
            },
        );
        Ok(())
    }

    /// Definitions for every *enabled* tool, for `tools/list`.
    #[must_use]
    pub fn list_enabled(&self) -> Vec<ToolDefinition> {
        let guard = self.descriptors.read().expect("registry lock poisoned");
        let mut out: Vec<_> = guard
            .values()
            .filter(|d| d.enabled)
            .map(|d| d.definition.clone())
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// All descriptors grouped by category, including disabled ones, with
    /// their enabled state — used by the system prompt assembler.
    #[must_use]
    pub fn list_all_with_category(&self) -> Vec<(String, ToolCategory, bool)> {
        let guard = self.descriptors.read().expect("registry lock poisoned");
        let mut out: Vec<_> = guard
            .values()
            .map(|d| (d.definition.name.clone(), d.category, d.enabled))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.descriptors.read().expect("registry lock poisoned").contains_key(name)
    }

    /// Fetch a single tool's definition, regardless of enabled state, for
    /// argument-schema validation ahead of dispatch.
    #[must_use]
    pub fn get_definition(&self, name: &str) -> Option<ToolDefinition> {
        self.descriptors.read().expect("registry lock poisoned").get(name).map(|d| d.definition.clone())
    }

    #[must_use]
    pub fn is_enabled(&self, name: &str) -> bool {
        self.descriptors
            .read()
            .expect("registry lock poisoned")
            .get(name)
            .is_some_and(|d| d.enabled)
    }

    /// Enable a tool by name. Returns `false` if unknown.
    pub fn enable(&self, name: &str) -> bool {
        self.set_enabled(name, true)
    }

    /// Disable a tool by name. Always-enabled meta-tools refuse to be
    /// disabled. Returns `false` if unknown or protected.
    pub fn disable(&self, name: &str) -> bool {
        if ALWAYS_ENABLED.contains(&name) {
            return false;
        }
        self.set_enabled(name, false)
    }

    fn set_enabled(&self, name: &str, value: bool) -> bool {
        let mut guard = self.descriptors.write().expect("registry lock poisoned");
        match guard.get_mut(name) {
            Some(d) => {
                d.enabled = value;
                true
            }
            None => false,
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.to_owned(),
            description: "test tool".to_owned(),
            input_schema: serde_json::json!({"type": "object"}),
        }
    }

    #[test]
    fn rejects_duplicate_names() {
        let reg = ToolRegistry::new();
        assert!(reg.register(def("read"), ToolCategory::Filesystem).is_ok());
        assert!(reg.register(def("read"), ToolCategory::Filesystem).is_err());
    }

    #[test]
    fn disable_hides_from_list_enabled() {
        let reg = ToolRegistry::new();
        reg.register(def("bash"), ToolCategory::Shell).expect("register");
        assert!(reg.disable("bash"));
        assert!(reg.list_enabled().is_empty());
        assert!(reg.enable("bash"));
        assert_eq!(reg.list_enabled().len(), 1);
    }

    #[test]
    fn meta_tools_cannot_be_disabled() {
        let reg = ToolRegistry::new();
        reg.register(def("tool_list"), ToolCategory::Meta).expect("register");
        assert!(!reg.disable("tool_list"));
        assert!(reg.is_enabled("tool_list"));
    }
}
