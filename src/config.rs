use serde::{Deserialize, Serialize};

/// Safety ceilings for one run. Each embedding picks its own; nothing here is
/// process-global.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Deepest allowed nesting of calls to functions declared in the program.
    pub max_call_stack_depth: usize,
    /// Ceiling on the cumulative statement-execution cost of a run.
    pub max_execution_cost: u64,
}

impl RunConfig {
    pub const DEFAULT_MAX_CALL_STACK_DEPTH: usize = 100;
    pub const DEFAULT_MAX_EXECUTION_COST: u64 = 4000;

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_max_call_stack_depth(mut self, depth: usize) -> Self {
        self.max_call_stack_depth = depth;
        self
    }

    pub fn with_max_execution_cost(mut self, cost: u64) -> Self {
        self.max_execution_cost = cost;
        self
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            max_call_stack_depth: Self::DEFAULT_MAX_CALL_STACK_DEPTH,
            max_execution_cost: Self::DEFAULT_MAX_EXECUTION_COST,
        }
    }
}
