//! jsmm: a sandboxed interpreter for a small, strict subset of JavaScript,
//! with the execution history a time-travel debugger needs.
//!
//! A parser hands over an [`ast::Tree`]; [`lower::compile`] turns it into a
//! closure tree once; [`interpreter::RunContext`] runs it under the limits of
//! a [`config::RunConfig`] and records steps, scope snapshots and the first
//! [`interpreter::RuntimeError`].

pub mod ast;
pub mod config;
pub mod diagnostic;
pub mod host;
pub mod interpreter;
pub mod lower;
