use std::collections::BTreeMap;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, trace, warn};

use crate::ast::{NodeId, Tree};
use crate::config::RunConfig;
use crate::lower::CompiledProgram;
use super::error::{ErrorKind, ExecResult, HostFault, Interrupt, RuntimeError};
use super::scope::Scope;
use super::semantics;
use super::tracker::{CommandTracker, ScopeTracker};
use super::value::{Binding, Function, HostFunction, HostObject, HostVariable, Value};

/// Presentation hooks invoked at fixed points of a run. Every method has an
/// empty default so sinks only implement what they render.
pub trait OutputSink {
    /// Before a program run, to wipe what a previous run left behind.
    fn output_clear(&self, _ctx: &RunContext) {}
    fn output_start_run(&self, _ctx: &RunContext) {}
    /// The run faulted; the error (if it is a program fault) is already
    /// available through [`RunContext::get_error`].
    fn output_error(&self, _ctx: &RunContext) {}
    fn output_end_run(&self, _ctx: &RunContext) {}
    /// A content-defined event, see [`RunContext::emit_output`].
    fn output_event(&self, _ctx: &RunContext, _event: &str, _data: &serde_json::Value) {}
}

/// A global handed to the program by the embedder.
pub enum HostBinding {
    Function(HostFunction),
    Variable(HostVariable),
    Object(HostObject),
    Value(String, Value),
}

impl HostBinding {
    fn into_entry(self) -> (String, Binding) {
        match self {
            HostBinding::Function(f) => (f.name.clone(), Binding::Value(Value::Function(Function::Host(Rc::new(f))))),
            HostBinding::Variable(v) => (v.name.clone(), Binding::Host(Rc::new(v))),
            HostBinding::Object(o) => (o.name.clone(), Binding::Value(Value::Object(Rc::new(o)))),
            HostBinding::Value(name, value) => (name, Binding::Value(value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Faulted,
}

/// Everything one execution of a program owns. Create one per run.
pub struct RunContext {
    program: Rc<CompiledProgram>,
    config: RunConfig,
    global: Rc<Scope>,
    scope: Rc<Scope>,
    outputs: Vec<Rc<dyn OutputSink>>,
    state: RunState,
    execution_counter: u64,
    steps: Vec<Vec<serde_json::Value>>,
    /// Call sites of the program's own functions, innermost last. Replaced
    /// rather than mutated while a snapshot is held elsewhere.
    call_stack: Rc<Vec<NodeId>>,
    call_lines_by_line: BTreeMap<u32, Vec<u32>>,
    command_tracker: CommandTracker,
    scope_tracker: ScopeTracker,
    output_states: IndexMap<String, serde_json::Value>,
    output_calls: IndexMap<String, Vec<serde_json::Value>>,
    called_functions: Vec<String>,
    call_node: Option<NodeId>,
    error: Option<RuntimeError>,
}

impl RunContext {
    pub fn new(
        program: Rc<CompiledProgram>,
        config: RunConfig,
        globals: Vec<HostBinding>,
        outputs: Vec<Rc<dyn OutputSink>>,
    ) -> Self {
        let global = Scope::global(globals.into_iter().map(HostBinding::into_entry));
        RunContext {
            program,
            config,
            scope: Rc::clone(&global),
            global,
            outputs,
            state: RunState::Idle,
            execution_counter: 0,
            steps: Vec::new(),
            call_stack: Rc::new(Vec::new()),
            call_lines_by_line: BTreeMap::new(),
            command_tracker: CommandTracker::new(),
            scope_tracker: ScopeTracker::new(),
            output_states: IndexMap::new(),
            output_calls: IndexMap::new(),
            called_functions: Vec::new(),
            call_node: None,
            error: None,
        }
    }

    // ── Running ────────────────────────────────────────────────────────

    /// Run the whole program. A program fault is captured and exposed through
    /// [`RunContext::get_error`]; only a fault inside host code comes back as
    /// `Err`.
    pub fn run_program(&mut self) -> Result<(), HostFault> {
        self.call_outputs(|sink, ctx| sink.output_clear(ctx));
        let main = Rc::clone(&self.program.main);
        self.run_function(|ctx| main(ctx)).map(|_| ())
    }

    /// Only register the top-level function declarations, so that single
    /// functions can then be called with [`RunContext::call_function`].
    pub fn declare_functions(&mut self) -> Result<(), HostFault> {
        let functions = Rc::clone(&self.program.functions);
        self.run_function(|ctx| functions(ctx)).map(|_| ())
    }

    /// Call a global function by name. `Ok(None)` means the call faulted and
    /// the fault is available through [`RunContext::get_error`].
    pub fn call_function(&mut self, name: &str, args: Vec<Value>) -> Result<Option<Value>, HostFault> {
        let root = self.program.tree.root;
        let name = name.to_string();
        self.run_function(move |ctx| {
            let Some(binding) = ctx.global.lookup(&name) else {
                return Err(RuntimeError::new(
                    ctx.tree(),
                    root,
                    ErrorKind::UnknownVariable,
                    format!("Function {name} could not be found"),
                )
                .into());
            };
            let function = match semantics::get_value(ctx, root, &binding)? {
                Value::Function(f) => f,
                other => {
                    return Err(RuntimeError::new(
                        ctx.tree(),
                        root,
                        ErrorKind::NotAFunction,
                        format!("Variable {name} is not a function but {}", other.stringify()),
                    )
                    .into());
                }
            };
            semantics::invoke(ctx, root, &function, args)
        })
    }

    /// Run `f` with terminal-error capture: the first program fault ends the
    /// run and is stored; host faults are handed back to the caller.
    pub fn run_function<T>(&mut self, f: impl FnOnce(&mut RunContext) -> ExecResult<T>) -> Result<Option<T>, HostFault> {
        self.error = None;
        self.state = RunState::Running;
        self.reset_stack();
        let live = self.scope_tracker.live_depth();
        debug!(nodes = self.program.tree.nodes.len(), "run started");
        self.call_outputs(|sink, ctx| sink.output_start_run(ctx));

        let result = match f(self) {
            Ok(value) => {
                self.state = RunState::Completed;
                Ok(Some(value))
            }
            Err(Interrupt::Fault(error)) => {
                debug!(kind = %error.kind, line = error.loc.line, "run faulted: {}", error.message);
                self.state = RunState::Faulted;
                self.error = Some(error);
                self.reset_stack();
                self.scope_tracker.unwind(live);
                self.call_outputs(|sink, ctx| sink.output_error(ctx));
                Ok(None)
            }
            Err(Interrupt::Internal(fault)) => {
                warn!("host fault aborted the run: {fault}");
                self.state = RunState::Faulted;
                self.reset_stack();
                self.scope_tracker.unwind(live);
                self.call_outputs(|sink, ctx| sink.output_error(ctx));
                Err(fault)
            }
        };

        self.call_outputs(|sink, ctx| sink.output_end_run(ctx));
        debug!(steps = self.steps.len(), cost = self.execution_counter, state = ?self.state, "run ended");
        result
    }

    /// Drop whatever a faulted run left on the call stack.
    fn reset_stack(&mut self) {
        self.call_stack = Rc::new(Vec::new());
        self.scope = Rc::clone(&self.global);
        self.call_node = None;
    }

    fn call_outputs(&self, f: impl Fn(&dyn OutputSink, &RunContext)) {
        for sink in &self.outputs {
            f(sink.as_ref(), self);
        }
    }

    /// Forward a content-defined event to every output sink.
    pub fn emit_output(&self, event: &str, data: &serde_json::Value) {
        self.call_outputs(|sink, ctx| sink.output_event(ctx, event, data));
    }

    // ── Scopes ─────────────────────────────────────────────────────────

    pub fn tree(&self) -> &Tree {
        &self.program.tree
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn scope(&self) -> &Rc<Scope> {
        &self.scope
    }

    pub fn global_scope(&self) -> &Rc<Scope> {
        &self.global
    }

    /// Make `scope` current and return the previous one.
    pub fn swap_scope(&mut self, scope: Rc<Scope>) -> Rc<Scope> {
        std::mem::replace(&mut self.scope, scope)
    }

    // ── Limits ─────────────────────────────────────────────────────────

    /// A call to one of the program's own functions is about to start at
    /// `node`.
    pub fn enter_call(&mut self, node: NodeId) -> ExecResult<()> {
        Rc::make_mut(&mut self.call_stack).push(node);
        trace!(node, depth = self.call_stack.len(), "enter call");
        if self.call_stack.len() > self.config.max_call_stack_depth {
            debug!(limit = self.config.max_call_stack_depth, "call depth ceiling hit");
            return Err(RuntimeError::new(
                self.tree(),
                node,
                ErrorKind::StackOverflow,
                "Too many nested function calls have been made already, perhaps there is infinite recursion somewhere",
            )
            .into());
        }
        Ok(())
    }

    pub fn leave_call(&mut self) {
        Rc::make_mut(&mut self.call_stack).pop();
    }

    /// The current call stack. The returned snapshot never changes, however
    /// the run continues.
    pub fn call_stack(&self) -> Rc<Vec<NodeId>> {
        Rc::clone(&self.call_stack)
    }

    pub fn increase_execution_counter(&mut self, node: NodeId, amount: u64) -> ExecResult<()> {
        self.execution_counter += amount;
        if self.execution_counter > self.config.max_execution_cost {
            debug!(limit = self.config.max_execution_cost, "execution cost ceiling hit");
            return Err(RuntimeError::new(self.tree(), node, ErrorKind::ExecutionLimit, "Program takes too long to run").into());
        }
        Ok(())
    }

    pub fn execution_counter(&self) -> u64 {
        self.execution_counter
    }

    // ── Host calls and steps ───────────────────────────────────────────

    /// Bracket a host function call: it starts a new step, and every call
    /// site on the stack is linked to the line of this call.
    pub fn enter_external_call(&mut self, node: NodeId, function: &HostFunction) {
        self.new_step(Vec::new());
        self.call_node = Some(node);
        self.add_called_function(&function.name);

        let line = self.tree().loc(node).line;
        for site in self.call_stack.iter() {
            let site_line = self.program.tree.loc(*site).line;
            let lines = self.call_lines_by_line.entry(site_line).or_default();
            if !lines.contains(&line) {
                lines.push(line);
            }
        }
        trace!(node, function = %function.name, step = self.steps.len(), "enter host call");
    }

    pub fn leave_external_call(&mut self, node: NodeId) {
        trace!(node, "leave host call");
        self.call_node = None;
    }

    pub fn new_step(&mut self, records: Vec<serde_json::Value>) {
        self.steps.push(records);
    }

    /// Append a record to the current step, opening the first step if none
    /// exists yet.
    pub fn add_to_step(&mut self, record: serde_json::Value) {
        match self.steps.last_mut() {
            Some(step) => step.push(record),
            None => self.steps.push(vec![record]),
        }
    }

    pub fn step_num(&self) -> usize {
        self.steps.len()
    }

    pub fn steps(&self) -> &[Vec<serde_json::Value>] {
        &self.steps
    }

    /// The host call currently in progress, if any.
    pub fn get_call_node(&self) -> Option<NodeId> {
        self.call_node
    }

    pub fn add_called_function(&mut self, name: &str) {
        self.called_functions.push(name.to_string());
    }

    pub fn called_functions(&self) -> &[String] {
        &self.called_functions
    }

    /// Register a content sink's state; resets the calls recorded for it.
    pub fn add_output_state(&mut self, output: &str, state: serde_json::Value) {
        self.output_states.insert(output.to_string(), state);
        self.output_calls.insert(output.to_string(), Vec::new());
    }

    pub fn output_state(&self, output: &str) -> Option<&serde_json::Value> {
        self.output_states.get(output)
    }

    pub fn record_output_call(&mut self, output: &str, call: serde_json::Value) {
        self.output_calls.entry(output.to_string()).or_default().push(call);
    }

    pub fn output_calls(&self, output: &str) -> &[serde_json::Value] {
        self.output_calls.get(output).map(Vec::as_slice).unwrap_or(&[])
    }

    // ── History ────────────────────────────────────────────────────────

    pub fn add_command(&mut self, node: NodeId, id: &str) {
        let line = self.tree().loc(node).line;
        self.command_tracker.add_command(line, node, id);
    }

    /// Record entering the outermost frame.
    pub fn enter_program(&mut self, node: NodeId) {
        let vars = summarize(node, &self.global.entries());
        let line = self.tree().loc(node).line;
        self.scope_tracker.log_enter(self.steps.len(), node, line, "global", vars, false);
    }

    /// Record entering a declared function whose fresh scope is `scope`.
    pub fn enter_function(&mut self, node: NodeId, name: &str, scope: &Scope) {
        let vars = summarize(node, &scope.entries());
        let line = self.tree().loc(node).line;
        self.scope_tracker.log_enter(self.steps.len(), node, line, name, vars, true);
    }

    pub fn leave_function(&mut self, node: NodeId) {
        self.scope_tracker.log_return(self.steps.len(), node);
    }

    /// Record that `name` now holds `value`. Names not declared in the
    /// current function are attributed to the global frame.
    pub fn log_assignment(&mut self, node: NodeId, name: &str, value: &Value) {
        let global = self.scope.level() == 0 || !self.scope.contains_local(name);
        let line = self.tree().loc(node).line;
        self.scope_tracker.log_assignment(self.steps.len(), node, line, global, name, value.stringify());
    }

    /// Deduplicated lines of host calls reached from call sites on lines
    /// `line1..=line2`.
    pub fn get_call_lines_by_range(&self, line1: u32, line2: u32) -> Vec<u32> {
        let mut lines = Vec::new();
        for called in self.call_lines_by_line.range(line1..=line2).flat_map(|(_, v)| v) {
            if !lines.contains(called) {
                lines.push(*called);
            }
        }
        lines
    }

    pub fn command_tracker(&self) -> &CommandTracker {
        &self.command_tracker
    }

    pub fn scope_tracker(&self) -> &ScopeTracker {
        &self.scope_tracker
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn get_error(&self) -> Option<&RuntimeError> {
        self.error.as_ref()
    }
}

/// Stringify bindings for the history. Host variables are read; one that
/// cannot be read shows as `[variable]`.
fn summarize(node: NodeId, entries: &[(String, Binding)]) -> Vec<(String, String)> {
    entries
        .iter()
        .map(|(name, binding)| {
            let shown = match binding {
                Binding::Value(v) => v.stringify(),
                Binding::Local(cell) => cell.borrow().stringify(),
                Binding::Host(var) => var.get(node).map(|v| v.stringify()).unwrap_or_else(|_| "[variable]".to_string()),
            };
            (name.clone(), shown)
        })
        .collect()
}
