pub mod context;
pub mod error;
pub mod scope;
pub mod semantics;
pub mod tracker;
pub mod value;

pub use context::{HostBinding, OutputSink, RunContext, RunState};
pub use error::{ErrorKind, ExecResult, HostError, HostFault, Interrupt, RuntimeError};
pub use scope::Scope;
pub use tracker::{CommandTracker, Frame, ScopeEvent, ScopeTracker, TrackedVar};
pub use value::{Binding, Function, HostFunction, HostObject, HostVariable, Value};

use std::rc::Rc;

use crate::ast::Tree;
use crate::config::RunConfig;
use crate::lower::{CompileError, Hooks, compile};

/// Lower `tree` and run it once with the given globals and output sinks.
pub fn run(
    tree: Tree,
    config: RunConfig,
    globals: Vec<HostBinding>,
    outputs: Vec<Rc<dyn OutputSink>>,
) -> Result<RunContext, RunFailure> {
    let program = compile(Rc::new(tree), &Hooks::new())?;
    let mut ctx = RunContext::new(Rc::new(program), config, globals, outputs);
    ctx.run_program()?;
    Ok(ctx)
}

/// Why [`run`] produced no context to inspect. A program fault is not one of
/// these: it is recorded on the returned context.
#[derive(Debug, thiserror::Error)]
pub enum RunFailure {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Host(#[from] HostFault),
}
