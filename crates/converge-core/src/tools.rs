//! Tool protocol and registry
//!
//! Agents emit `InvokeTool` decisions; the executor looks the tool up by
//! name and runs it off the loop thread.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};

use converge_types::Result;

/// An executable tool
pub trait Tool: Send + Sync {
    /// Name used in `InvokeTool.tool_name`
    fn name(&self) -> &str;

    /// Run the tool with the given parameters
    fn run(&self, params: Map<String, Value>) -> Result<Value>;
}

/// Registry mapping tool names to tool instances
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its own name
    pub fn register(&self, tool: Arc<dyn Tool>) {
        self.tools.write().insert(tool.name().to_string(), tool);
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().get(name).cloned()
    }

    /// All registered tool names
    pub fn list_names(&self) -> Vec<String> {
        self.tools.read().keys().cloned().collect()
    }
}
