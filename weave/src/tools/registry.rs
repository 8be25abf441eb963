//! Tool Registry (§4.2): a read-only-after-construction map from name to tool.
//!
//! Grounded on a registry-by-name-map convention; backed by `dashmap` for
//! concurrent read-mostly lookup rather than a `RwLock<HashMap>`, since the
//! registry is never mutated for the lifetime of the process (§4.2, §5 "The
//! Tool Registry is read-only after construction").

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use crate::tools::{Tool, ToolOutcome, ToolSourceError, ToolSpec};

/// A read-only-after-construction map from tool name to tool instance.
pub struct ToolRegistry {
    tools: DashMap<String, Arc<dyn Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: DashMap::new() }
    }

    /// Registers a tool, overwriting any prior registration under the same
    /// name. Intended to be called only during startup construction.
    pub fn register(&self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Renders every registered tool's spec, for the Reason prompt builder
    /// (§4.5.2 "the tool registry rendering").
    pub fn list(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|entry| entry.value().spec()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Looks up and executes a named tool, synthesizing `NotFound` as a
    /// `ToolOutcome::Failure` rather than a hard error (§4.3 "Unknown tool →
    /// synthetic failure").
    pub async fn call(&self, name: &str, args: Value) -> Result<ToolOutcome, ToolSourceError> {
        match self.get(name) {
            Some(tool) => tool.execute(args).await,
            None => Err(ToolSourceError::NotFound(name.to_string())),
        }
    }
}
