//! A reference host binding: a `console` object whose output is collected in
//! memory and grouped into the run's steps.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::json;

use crate::interpreter::{HostBinding, HostError, HostFunction, HostObject, OutputSink, RunContext, Value};

pub const CONSOLE: &str = "console";

#[derive(Debug, Default)]
pub struct Console {
    lines: RefCell<Vec<String>>,
}

impl Console {
    pub fn new() -> Rc<Console> {
        Rc::new(Console::default())
    }

    /// The `console` global, with `log` and `clear` writing into this console.
    pub fn binding(self: &Rc<Self>) -> HostBinding {
        let log = Rc::clone(self);
        let clear = Rc::clone(self);
        HostBinding::Object(
            HostObject::new(CONSOLE)
                .with_function(HostFunction::new("log", move |ctx, _, args| log.log(ctx, args)))
                .with_function(HostFunction::new("clear", move |ctx, _, _| clear.clear(ctx))),
        )
    }

    /// Register this console's state on a context before the run.
    pub fn attach(&self, ctx: &mut RunContext) {
        ctx.add_output_state(CONSOLE, json!({ "lines": self.lines.borrow().len() }));
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }

    pub fn text(&self) -> String {
        self.lines.borrow().iter().map(|l| format!("{l}\n")).collect()
    }

    fn log(&self, ctx: &mut RunContext, args: &[Value]) -> Result<Value, HostError> {
        if let Some(Value::Function(f)) = args.iter().find(|a| matches!(a, Value::Function(_))) {
            return Err(format!("console.log cannot print function {}", f.name()).into());
        }
        let text = args.iter().map(Value::to_string).collect::<Vec<_>>().join(" ");
        let record = json!({ "type": "log", "text": text });

        let id = format!("{CONSOLE}-{}", ctx.step_num());
        if let Some(node) = ctx.get_call_node() {
            ctx.add_command(node, &id);
        }
        ctx.add_to_step(record.clone());
        ctx.record_output_call(CONSOLE, record.clone());
        ctx.emit_output("console.log", &record);

        self.lines.borrow_mut().push(text);
        Ok(Value::Undefined)
    }

    fn clear(&self, ctx: &mut RunContext) -> Result<Value, HostError> {
        let record = json!({ "type": "clear" });
        ctx.add_to_step(record.clone());
        ctx.record_output_call(CONSOLE, record);
        self.lines.borrow_mut().clear();
        Ok(Value::Undefined)
    }
}

impl OutputSink for Console {
    fn output_clear(&self, _ctx: &RunContext) {
        self.lines.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::TreeBuilder;
    use crate::config::RunConfig;
    use crate::lower::{Hooks, compile};

    fn console_log(b: &mut TreeBuilder, line: u32, args: Vec<usize>) -> usize {
        let console = b.name(line, CONSOLE);
        let log = b.property(line, console, "log");
        b.call(line, log, args)
    }

    #[test]
    fn log_collects_lines_steps_and_commands() {
        let mut b = TreeBuilder::new();
        let hi = b.string(1, "hi");
        let n = b.number(1, 2.0);
        let first = console_log(&mut b, 1, vec![hi, n]);
        let bye = b.string(2, "bye");
        let second = console_log(&mut b, 2, vec![bye]);
        let tree = b.program(vec![first, second]);

        let console = Console::new();
        let program = compile(Rc::new(tree), &Hooks::new()).unwrap();
        let outputs: Vec<Rc<dyn OutputSink>> = vec![console.clone() as Rc<dyn OutputSink>];
        let mut ctx = RunContext::new(Rc::new(program), RunConfig::default(), vec![console.binding()], outputs);
        console.attach(&mut ctx);
        ctx.run_program().unwrap();

        assert!(!ctx.has_error());
        assert_eq!(console.lines(), vec!["hi 2", "bye"]);
        assert_eq!(console.text(), "hi 2\nbye\n");
        assert_eq!(ctx.step_num(), 2);
        assert_eq!(ctx.steps()[0], vec![json!({ "type": "log", "text": "hi 2" })]);
        assert_eq!(ctx.command_tracker().get_highlight_ids_by_line(2), ["console-2"]);
        assert_eq!(ctx.command_tracker().get_highlight_nodes_by_id("console-1"), [first]);
        assert_eq!(ctx.output_calls(CONSOLE).len(), 2);
        assert_eq!(ctx.called_functions(), ["log", "log"]);
        assert_eq!(ctx.get_call_node(), None);
    }

    #[test]
    fn printing_a_function_is_a_located_error() {
        let mut b = TreeBuilder::new();
        let console = b.name(4, CONSOLE);
        let clear = b.property(4, console, "clear");
        let call = console_log(&mut b, 4, vec![clear]);
        let tree = b.program(vec![call]);

        let console = Console::new();
        let program = compile(Rc::new(tree), &Hooks::new()).unwrap();
        let mut ctx = RunContext::new(Rc::new(program), RunConfig::default(), vec![console.binding()], vec![]);
        ctx.run_program().unwrap();

        let error = ctx.get_error().unwrap();
        assert_eq!(error.kind, crate::interpreter::ErrorKind::Runtime);
        assert_eq!(error.node, call);
        assert_eq!(error.loc.line, 4);
        assert!(error.message.contains("cannot print function clear"));
    }
}
