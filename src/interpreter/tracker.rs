//! Append-only execution history, indexed by step number, for line
//! highlighting and "program state as of step K" queries.

use std::collections::{BTreeMap, HashMap};

use indexmap::IndexMap;
use serde::Serialize;

use crate::ast::NodeId;

/// Which output commands each line produced, and which nodes produced each
/// command.
#[derive(Debug, Default)]
pub struct CommandTracker {
    ids_by_line: BTreeMap<u32, Vec<String>>,
    nodes_by_id: HashMap<String, Vec<NodeId>>,
}

impl CommandTracker {
    pub fn new() -> Self {
        CommandTracker::default()
    }

    pub fn add_command(&mut self, line: u32, node: NodeId, id: &str) {
        self.ids_by_line.entry(line).or_default().push(id.to_string());
        let nodes = self.nodes_by_id.entry(id.to_string()).or_default();
        if !nodes.contains(&node) {
            nodes.push(node);
        }
    }

    pub fn get_highlight_ids_by_line(&self, line: u32) -> &[String] {
        self.ids_by_line.get(&line).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get_highlight_nodes_by_id(&self, id: &str) -> &[NodeId] {
        self.nodes_by_id.get(id).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScopeEvent {
    Enter { step: usize, node: NodeId, name: String, position: usize },
    Assignment { step: usize, node: NodeId, position: usize, name: String, value: String },
    Return { step: usize, node: NodeId },
}

impl ScopeEvent {
    pub fn step(&self) -> usize {
        match self {
            ScopeEvent::Enter { step, .. } | ScopeEvent::Assignment { step, .. } | ScopeEvent::Return { step, .. } => *step,
        }
    }
}

/// A variable as shown in a replayed frame. `id` is `"<position>-<name>"`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedVar {
    pub id: String,
    pub name: String,
    pub value: String,
}

/// One call frame of a replayed state. `id` is the frame's position, the
/// order in which calls were entered over the whole run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub id: String,
    pub name: String,
    pub vars: IndexMap<String, TrackedVar>,
}

impl Frame {
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(|v| v.value.as_str())
    }
}

#[derive(Debug, Default)]
pub struct ScopeTracker {
    /// Per frame position: name -> nodes that assigned it.
    scopes: Vec<HashMap<String, Vec<NodeId>>>,
    lines: BTreeMap<u32, Vec<String>>,
    calls: Vec<ScopeEvent>,
    /// Positions of the frames currently live while recording.
    live: Vec<usize>,
}

impl ScopeTracker {
    pub fn new() -> Self {
        ScopeTracker::default()
    }

    /// A call was entered. `vars` are the frame's initial bindings, already
    /// stringified; they are only made highlightable when `highlight` is set,
    /// which callers clear for the outermost frame.
    pub fn log_enter(
        &mut self,
        step: usize,
        node: NodeId,
        line: u32,
        name: &str,
        vars: Vec<(String, String)>,
        highlight: bool,
    ) {
        self.scopes.push(HashMap::new());
        let position = self.scopes.len() - 1;
        self.live.push(position);
        self.calls.push(ScopeEvent::Enter { step, node, name: name.to_string(), position });
        for (var, value) in vars {
            self.add_assignment(step, node, line, position, &var, value, highlight);
        }
    }

    /// An assignment to `name`; `global` selects frame 0 instead of the
    /// innermost live frame.
    pub fn log_assignment(&mut self, step: usize, node: NodeId, line: u32, global: bool, name: &str, value: String) {
        let position = if global { 0 } else { self.live.last().copied().unwrap_or(0) };
        if self.scopes.is_empty() {
            return;
        }
        self.add_assignment(step, node, line, position, name, value, true);
    }

    pub fn log_return(&mut self, step: usize, node: NodeId) {
        self.live.pop();
        self.calls.push(ScopeEvent::Return { step, node });
    }

    /// Number of frames currently live while recording.
    pub fn live_depth(&self) -> usize {
        self.live.len()
    }

    /// Forget frames a faulted run left open, keeping the outer `depth`. No
    /// return events are logged, so replays still show the faulting stack.
    pub fn unwind(&mut self, depth: usize) {
        self.live.truncate(depth);
    }

    /// Replay every event recorded at or before `step` into a call stack.
    pub fn get_state(&self, step: usize) -> Vec<Frame> {
        let mut stack: Vec<Frame> = Vec::new();
        for call in &self.calls {
            if call.step() > step {
                break;
            }
            match call {
                ScopeEvent::Enter { name, position, .. } => {
                    stack.push(Frame { id: position.to_string(), name: name.clone(), vars: IndexMap::new() });
                }
                ScopeEvent::Assignment { position, name, value, .. } => {
                    let frame = if *position == 0 { stack.first_mut() } else { stack.last_mut() };
                    if let Some(frame) = frame {
                        frame
                            .vars
                            .entry(name.clone())
                            .or_insert_with(|| TrackedVar {
                                id: format!("{position}-{name}"),
                                name: name.clone(),
                                value: String::new(),
                            })
                            .value = value.clone();
                    }
                }
                ScopeEvent::Return { .. } => {
                    stack.pop();
                }
            }
        }
        stack
    }

    pub fn get_highlight_nodes_by_id(&self, id: &str) -> &[NodeId] {
        let Some((position, name)) = id.split_once('-') else {
            return &[];
        };
        let Ok(position) = position.parse::<usize>() else {
            return &[];
        };
        self.scopes
            .get(position)
            .and_then(|scope| scope.get(name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn get_highlight_ids_by_line(&self, line: u32) -> &[String] {
        self.lines.get(&line).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn events(&self) -> &[ScopeEvent] {
        &self.calls
    }

    #[allow(clippy::too_many_arguments)]
    fn add_assignment(
        &mut self,
        step: usize,
        node: NodeId,
        line: u32,
        position: usize,
        name: &str,
        value: String,
        highlight: bool,
    ) {
        if highlight {
            if let Some(scope) = self.scopes.get_mut(position) {
                let nodes = scope.entry(name.to_string()).or_default();
                if !nodes.contains(&node) {
                    nodes.push(node);
                }
            }
            self.lines.entry(line).or_default().push(format!("{position}-{name}"));
        }
        self.calls.push(ScopeEvent::Assignment { step, node, position, name: name.to_string(), value });
    }
}
