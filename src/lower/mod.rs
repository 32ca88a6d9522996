//! Lowering: one pass over the tree that turns every statement and
//! expression into a native closure. Control flow becomes Rust control flow
//! around the lowered test and body, function declarations become closures
//! that capture their declaring scope, and instrumentation hooks are wrapped
//! around exactly the nodes that have them.

use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use crate::ast::{Node, NodeId, NodeKind, Tree, TreeError};
use crate::interpreter::context::RunContext;
use crate::interpreter::error::ExecResult;
use crate::interpreter::semantics;
use crate::interpreter::value::{Binding, InternalFunction, Value};

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("malformed tree: {0}")]
    Tree(#[from] TreeError),
    #[error("node {0} does not exist")]
    Missing(NodeId),
    #[error("node {node} is a {found} where {expected} was expected")]
    Unexpected { node: NodeId, found: &'static str, expected: &'static str },
}

/// Instrumentation callback, run with the context and the node it is
/// attached to.
pub type Hook = Rc<dyn Fn(&mut RunContext, NodeId)>;

/// Hooks to fire before and after given nodes. Attached at lowering time;
/// nodes without hooks pay nothing.
#[derive(Default, Clone)]
pub struct Hooks {
    before: HashMap<NodeId, Vec<Hook>>,
    after: HashMap<NodeId, Vec<Hook>>,
}

impl Hooks {
    pub fn new() -> Self {
        Hooks::default()
    }

    pub fn before(&mut self, node: NodeId, hook: impl Fn(&mut RunContext, NodeId) + 'static) -> &mut Self {
        self.before.entry(node).or_default().push(Rc::new(hook));
        self
    }

    pub fn after(&mut self, node: NodeId, hook: impl Fn(&mut RunContext, NodeId) + 'static) -> &mut Self {
        self.after.entry(node).or_default().push(Rc::new(hook));
        self
    }

    fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty()
    }
}

/// How a statement finished.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal,
    Return(Value),
}

type Code<T> = Rc<dyn Fn(&mut RunContext) -> ExecResult<T>>;
type Expr = Code<Binding>;
type Stmt = Code<Flow>;

/// A program lowered once, ready to be run by any number of contexts.
pub struct CompiledProgram {
    pub tree: Rc<Tree>,
    /// The whole program.
    pub(crate) main: Code<()>,
    /// Only the top-level function declarations.
    pub(crate) functions: Code<()>,
}

pub fn compile(tree: Rc<Tree>, hooks: &Hooks) -> Result<CompiledProgram, CompileError> {
    tree.validate()?;
    let lowerer = Lowerer { tree: &tree, hooks };
    let (main, functions) = lowerer.program()?;
    debug!(nodes = tree.nodes.len(), hooked = !hooks.is_empty(), "lowered program");
    Ok(CompiledProgram { tree: Rc::clone(&tree), main, functions })
}

struct Lowerer<'a> {
    tree: &'a Tree,
    hooks: &'a Hooks,
}

impl Lowerer<'_> {
    fn node(&self, id: NodeId) -> Result<&Node, CompileError> {
        self.tree.node(id).ok_or(CompileError::Missing(id))
    }

    fn unexpected(&self, node: &Node, expected: &'static str) -> CompileError {
        CompileError::Unexpected { node: node.id, found: node.kind.name(), expected }
    }

    /// Fire the node's hooks around `code`, if it has any.
    fn hooked<T: 'static>(&self, id: NodeId, code: Code<T>) -> Code<T> {
        let before = self.hooks.before.get(&id).cloned().unwrap_or_default();
        let after = self.hooks.after.get(&id).cloned().unwrap_or_default();
        if before.is_empty() && after.is_empty() {
            return code;
        }
        Rc::new(move |ctx| {
            for hook in &before {
                hook(ctx, id);
            }
            let out = code(ctx)?;
            for hook in &after {
                hook(ctx, id);
            }
            Ok(out)
        })
    }

    fn program(&self) -> Result<(Code<()>, Code<()>), CompileError> {
        let root = self.node(self.tree.root)?;
        let NodeKind::Program { body } = &root.kind else {
            return Err(self.unexpected(root, "Program"));
        };
        let (root, body) = (root.id, *body);

        let statements = self.stmt_list(body)?;
        let main: Code<()> = Rc::new(move |ctx| {
            ctx.enter_program(root);
            // A top-level return ends the program.
            statements(ctx)?;
            Ok(())
        });
        let main = self.hooked(root, main);

        let NodeKind::StatementList { statements } = &self.node(body)?.kind else {
            return Err(self.unexpected(self.node(body)?, "StatementList"));
        };
        let mut declarations = Vec::new();
        for id in statements {
            if let NodeKind::FunctionDeclaration { .. } = self.node(*id)?.kind {
                declarations.push(self.stmt(*id)?);
            }
        }
        let functions: Code<()> = Rc::new(move |ctx| {
            ctx.enter_program(root);
            for declaration in &declarations {
                declaration(ctx)?;
            }
            Ok(())
        });

        Ok((main, functions))
    }

    // ── Statements ─────────────────────────────────────────────────────

    fn stmt_list(&self, id: NodeId) -> Result<Stmt, CompileError> {
        let node = self.node(id)?;
        let NodeKind::StatementList { statements } = &node.kind else {
            return Err(self.unexpected(node, "StatementList"));
        };
        let statements = statements.iter().map(|s| self.stmt(*s)).collect::<Result<Vec<_>, _>>()?;
        let cost = statements.len() as u64 + 1;
        let code: Stmt = Rc::new(move |ctx| {
            ctx.increase_execution_counter(id, cost)?;
            for statement in &statements {
                if let Flow::Return(value) = statement(ctx)? {
                    return Ok(Flow::Return(value));
                }
            }
            Ok(Flow::Normal)
        });
        Ok(self.hooked(id, code))
    }

    fn stmt(&self, id: NodeId) -> Result<Stmt, CompileError> {
        let node = self.node(id)?;
        let code: Stmt = match &node.kind {
            NodeKind::PostfixStatement { target, op } => {
                let (target_id, op) = (*target, *op);
                let target = self.expr(target_id)?;
                let name = self.plain_name(target_id);
                Rc::new(move |ctx| {
                    let binding = target(ctx)?;
                    let value = semantics::postfix(ctx, id, target_id, &binding, op)?;
                    if let Some(name) = &name {
                        ctx.log_assignment(id, name, &value);
                    }
                    Ok(Flow::Normal)
                })
            }
            NodeKind::AssignmentStatement { .. } => {
                let assignment = self.assignment(id)?;
                Rc::new(move |ctx| {
                    assignment(ctx)?;
                    Ok(Flow::Normal)
                })
            }
            NodeKind::VarStatement { items } => {
                let items = items.iter().map(|item| self.var_item(*item)).collect::<Result<Vec<_>, _>>()?;
                Rc::new(move |ctx| {
                    for item in &items {
                        item(ctx)?;
                    }
                    Ok(Flow::Normal)
                })
            }
            NodeKind::ReturnStatement { value } => {
                let value = match value {
                    Some(v) => Some((*v, self.expr(*v)?)),
                    None => None,
                };
                Rc::new(move |ctx| {
                    let result = match &value {
                        Some((value_id, expr)) => {
                            let binding = expr(ctx)?;
                            semantics::get_value(ctx, *value_id, &binding)?
                        }
                        None => Value::Undefined,
                    };
                    Ok(Flow::Return(result))
                })
            }
            NodeKind::IfBlock { test, body, otherwise } => {
                let test_id = *test;
                let test = self.expr(test_id)?;
                let body = self.stmt_list(*body)?;
                let otherwise = match otherwise {
                    Some(o) => Some(self.else_branch(*o)?),
                    None => None,
                };
                Rc::new(move |ctx| {
                    let binding = test(ctx)?;
                    if semantics::condition(ctx, id, "if", test_id, &binding)? {
                        body(ctx)
                    } else if let Some(otherwise) = &otherwise {
                        otherwise(ctx)
                    } else {
                        Ok(Flow::Normal)
                    }
                })
            }
            NodeKind::WhileBlock { test, body } => {
                let test_id = *test;
                let test = self.expr(test_id)?;
                let body = self.stmt_list(*body)?;
                Rc::new(move |ctx| {
                    loop {
                        let binding = test(ctx)?;
                        if !semantics::condition(ctx, id, "while", test_id, &binding)? {
                            return Ok(Flow::Normal);
                        }
                        if let Flow::Return(value) = body(ctx)? {
                            return Ok(Flow::Return(value));
                        }
                    }
                })
            }
            NodeKind::ForBlock { init, test, update, body } => {
                let test_id = *test;
                let init = self.stmt(*init)?;
                let test = self.expr(test_id)?;
                let update = self.stmt(*update)?;
                let body = self.stmt_list(*body)?;
                Rc::new(move |ctx| {
                    init(ctx)?;
                    loop {
                        let binding = test(ctx)?;
                        if !semantics::condition(ctx, id, "for", test_id, &binding)? {
                            return Ok(Flow::Normal);
                        }
                        if let Flow::Return(value) = body(ctx)? {
                            return Ok(Flow::Return(value));
                        }
                        update(ctx)?;
                    }
                })
            }
            NodeKind::FunctionDeclaration { name, params, body } => self.function(id, name, params, *body)?,
            kind if is_expression(kind) => {
                let expr = self.expr(id)?;
                Rc::new(move |ctx| {
                    expr(ctx)?;
                    Ok(Flow::Normal)
                })
            }
            _ => return Err(self.unexpected(node, "statement")),
        };
        Ok(self.hooked(id, code))
    }

    fn else_branch(&self, id: NodeId) -> Result<Stmt, CompileError> {
        let node = self.node(id)?;
        let code = match &node.kind {
            NodeKind::ElseIfBlock { if_block } => match self.node(*if_block)?.kind {
                NodeKind::IfBlock { .. } => self.stmt(*if_block)?,
                _ => return Err(self.unexpected(self.node(*if_block)?, "IfBlock")),
            },
            NodeKind::ElseBlock { body } => self.stmt_list(*body)?,
            _ => return Err(self.unexpected(node, "ElseIfBlock or ElseBlock")),
        };
        Ok(self.hooked(id, code))
    }

    /// An assignment statement, shared by plain statements and `var`
    /// initialisers.
    fn assignment(&self, id: NodeId) -> Result<Code<()>, CompileError> {
        let node = self.node(id)?;
        let NodeKind::AssignmentStatement { target, op, value } = &node.kind else {
            return Err(self.unexpected(node, "AssignmentStatement"));
        };
        let (target_id, op, value_id) = (*target, *op, *value);
        let target = self.expr(target_id)?;
        let value = self.expr(value_id)?;
        let name = self.plain_name(target_id);
        Ok(Rc::new(move |ctx| {
            let binding = target(ctx)?;
            let rhs = value(ctx)?;
            let result = semantics::assign(ctx, id, target_id, &binding, op, value_id, &rhs)?;
            if let Some(name) = &name {
                ctx.log_assignment(id, name, &result);
            }
            Ok(())
        }))
    }

    fn var_item(&self, id: NodeId) -> Result<Code<()>, CompileError> {
        let node = self.node(id)?;
        let NodeKind::VarItem { name, assignment } = &node.kind else {
            return Err(self.unexpected(node, "VarItem"));
        };
        let name = name.clone();
        let assignment = match assignment {
            Some(a) => Some(self.assignment(*a)?),
            None => None,
        };
        let code: Code<()> = Rc::new(move |ctx| {
            semantics::declare_var(ctx, id, &name)?;
            match &assignment {
                Some(assignment) => assignment(ctx),
                None => {
                    ctx.log_assignment(id, &name, &Value::Undefined);
                    Ok(())
                }
            }
        });
        Ok(self.hooked(id, code))
    }

    fn function(&self, id: NodeId, name: &str, params: &[String], body: NodeId) -> Result<Stmt, CompileError> {
        let body = self.stmt_list(body)?;
        let params: Rc<[String]> = params.into();
        let name: Rc<str> = name.into();
        Ok(Rc::new(move |ctx| {
            // Held weakly: the declaring scope owns the function in turn.
            let declared_in = Rc::downgrade(ctx.scope());
            let (body, params, fname) = (Rc::clone(&body), Rc::clone(&params), Rc::clone(&name));
            let function = InternalFunction::new(&*name, id, move |ctx, args| {
                let parent = declared_in.upgrade().unwrap_or_else(|| Rc::clone(ctx.global_scope()));
                let scope = semantics::enter_function(ctx.tree(), id, &params, &parent, args)?;
                ctx.enter_function(id, &fname, &scope);
                let saved = ctx.swap_scope(scope);
                let flow = body(ctx);
                ctx.swap_scope(saved);
                let value = match flow? {
                    Flow::Return(value) => value,
                    Flow::Normal => Value::Undefined,
                };
                ctx.leave_function(id);
                Ok(value)
            });
            semantics::declare_function(ctx, id, function)?;
            Ok(Flow::Normal)
        }))
    }

    // ── Expressions ────────────────────────────────────────────────────

    fn expr(&self, id: NodeId) -> Result<Expr, CompileError> {
        let node = self.node(id)?;
        let code: Expr = match &node.kind {
            NodeKind::NumberLiteral { value } => constant(Value::Number(*value)),
            NodeKind::StringLiteral { value } => constant(Value::Text(value.clone())),
            NodeKind::BooleanLiteral { value } => constant(Value::Bool(*value)),
            NodeKind::ArrayLiteral { items } => {
                let items = items
                    .iter()
                    .map(|item| Ok((*item, self.expr(*item)?)))
                    .collect::<Result<Vec<_>, CompileError>>()?;
                Rc::new(move |ctx| {
                    let mut values = Vec::with_capacity(items.len());
                    for (item_id, item) in &items {
                        let binding = item(ctx)?;
                        values.push(semantics::get_value(ctx, *item_id, &binding)?);
                    }
                    Ok(Binding::Value(Value::array(values)))
                })
            }
            NodeKind::NameIdentifier { name } => {
                let name = name.clone();
                Rc::new(move |ctx| semantics::lookup(ctx, id, &name))
            }
            NodeKind::ObjectIdentifier { object, property } => {
                let (object_id, property) = (*object, property.clone());
                let object = self.expr(object_id)?;
                Rc::new(move |ctx| {
                    let binding = object(ctx)?;
                    let base = semantics::get_value(ctx, object_id, &binding)?;
                    semantics::property(ctx.tree(), id, object_id, base, &property)
                })
            }
            NodeKind::ArrayIdentifier { array, index } => {
                let (array_id, index_id) = (*array, *index);
                let array = self.expr(array_id)?;
                let index = self.expr(index_id)?;
                Rc::new(move |ctx| {
                    let base = array(ctx)?;
                    let at = index(ctx)?;
                    let base = semantics::get_value(ctx, array_id, &base)?;
                    let at = semantics::get_value(ctx, index_id, &at)?;
                    Ok(Binding::Value(semantics::index(ctx.tree(), id, array_id, index_id, base, at)?))
                })
            }
            NodeKind::FunctionCall { callee, args } => {
                let callee_id = *callee;
                let callee = self.expr(callee_id)?;
                let args = args
                    .iter()
                    .map(|arg| Ok((*arg, self.expr(*arg)?)))
                    .collect::<Result<Vec<_>, CompileError>>()?;
                Rc::new(move |ctx| {
                    let function = callee(ctx)?;
                    let mut bindings = Vec::with_capacity(args.len());
                    for (arg_id, arg) in &args {
                        bindings.push((*arg_id, arg(ctx)?));
                    }
                    Ok(Binding::Value(semantics::call(ctx, id, callee_id, &function, bindings)?))
                })
            }
            NodeKind::BinaryExpression { left, op, right } => {
                let (left_id, op, right_id) = (*left, *op, *right);
                let left = self.expr(left_id)?;
                let right = self.expr(right_id)?;
                Rc::new(move |ctx| {
                    let l = left(ctx)?;
                    let r = right(ctx)?;
                    let l = semantics::get_value(ctx, left_id, &l)?;
                    let r = semantics::get_value(ctx, right_id, &r)?;
                    Ok(Binding::Value(semantics::binary(ctx.tree(), id, op, op.symbol(), l, r)?))
                })
            }
            NodeKind::UnaryExpression { op, operand } => {
                let (op, operand_id) = (*op, *operand);
                let operand = self.expr(operand_id)?;
                Rc::new(move |ctx| {
                    let binding = operand(ctx)?;
                    let value = semantics::get_value(ctx, operand_id, &binding)?;
                    Ok(Binding::Value(semantics::unary(ctx.tree(), id, op, value)?))
                })
            }
            NodeKind::ParenExpression { inner } => self.expr(*inner)?,
            _ => return Err(self.unexpected(node, "expression")),
        };
        Ok(self.hooked(id, code))
    }

    /// The variable name an assignment target writes to, for the history.
    fn plain_name(&self, target: NodeId) -> Option<String> {
        match &self.tree.node(target)?.kind {
            NodeKind::NameIdentifier { name } => Some(name.clone()),
            _ => None,
        }
    }
}

fn constant(value: Value) -> Expr {
    Rc::new(move |_| Ok(Binding::Value(value.clone())))
}

fn is_expression(kind: &NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::BinaryExpression { .. }
            | NodeKind::UnaryExpression { .. }
            | NodeKind::ParenExpression { .. }
            | NodeKind::NumberLiteral { .. }
            | NodeKind::StringLiteral { .. }
            | NodeKind::BooleanLiteral { .. }
            | NodeKind::ArrayLiteral { .. }
            | NodeKind::NameIdentifier { .. }
            | NodeKind::ObjectIdentifier { .. }
            | NodeKind::ArrayIdentifier { .. }
            | NodeKind::FunctionCall { .. }
    )
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::ast::{BinaryOp, Loc, TreeBuilder};
    use crate::config::RunConfig;

    fn run(tree: Tree, hooks: &Hooks) -> RunContext {
        let program = compile(Rc::new(tree), hooks).unwrap();
        let mut ctx = RunContext::new(Rc::new(program), RunConfig::default(), vec![], vec![]);
        ctx.run_program().unwrap();
        ctx
    }

    #[test]
    fn rejects_non_program_root() {
        let mut b = TreeBuilder::new();
        let n = b.number(1, 1.0);
        let tree = b.finish(n);
        assert!(matches!(
            compile(Rc::new(tree), &Hooks::new()),
            Err(CompileError::Tree(TreeError::RootNotProgram(0)))
        ));
    }

    #[test]
    fn rejects_self_nested_expression() {
        let mut b = TreeBuilder::new();
        let paren = b.push(Loc::line(1), NodeKind::ParenExpression { inner: 0 });
        let ret = b.ret(1, Some(paren));
        let tree = b.program(vec![ret]);
        assert!(matches!(
            compile(Rc::new(tree), &Hooks::new()),
            Err(CompileError::Tree(TreeError::Cycle { parent: 0, child: 0 }))
        ));
    }

    #[test]
    fn rejects_misplaced_nodes() {
        let mut b = TreeBuilder::new();
        let item = b.var_item(1, "x", None);
        let tree = b.program(vec![item]);
        match compile(Rc::new(tree), &Hooks::new()) {
            Err(CompileError::Unexpected { node, found, expected }) => {
                assert_eq!(node, item);
                assert_eq!(found, "VarItem");
                assert_eq!(expected, "statement");
            }
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("expected a compile error"),
        }
    }

    #[test]
    fn rejects_statement_in_expression_position() {
        let mut b = TreeBuilder::new();
        let body = b.block(1, vec![]);
        let bad = b.push(Loc::line(1), NodeKind::ElseBlock { body });
        let one = b.number(1, 1.0);
        let sum = b.binary(1, bad, BinaryOp::Add, one);
        let tree = b.program(vec![sum]);
        assert!(matches!(
            compile(Rc::new(tree), &Hooks::new()),
            Err(CompileError::Unexpected { found: "ElseBlock", expected: "expression", .. })
        ));
    }

    #[test]
    fn hooks_fire_around_their_node_only() {
        let mut b = TreeBuilder::new();
        let one = b.number(1, 1.0);
        let first = b.var(1, "x", Some(one));
        let two = b.number(2, 2.0);
        let second = b.var(2, "y", Some(two));
        let tree = b.program(vec![first, second]);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut hooks = Hooks::new();
        let log = Rc::clone(&seen);
        hooks.before(second, move |ctx, node| {
            let x = ctx.scope().lookup("x").map(|b| format!("{b:?}"));
            log.borrow_mut().push(format!("before {node} {x:?}"));
        });
        let log = Rc::clone(&seen);
        hooks.after(second, move |_, node| log.borrow_mut().push(format!("after {node}")));

        let ctx = run(tree, &hooks);
        assert!(!ctx.has_error());
        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].starts_with(&format!("before {second}")));
        assert!(seen[0].contains("Number(1.0)"));
        assert_eq!(seen[1], format!("after {second}"));
    }

    #[test]
    fn statement_list_cost_counts_entries_plus_one() {
        let mut b = TreeBuilder::new();
        let one = b.number(1, 1.0);
        let a = b.var(1, "a", Some(one));
        let two = b.number(2, 2.0);
        let c = b.var(2, "c", Some(two));
        let tree = b.program(vec![a, c]);
        let ctx = run(tree, &Hooks::new());
        assert_eq!(ctx.execution_counter(), 3);
    }

    #[test]
    fn top_level_return_ends_program() {
        let mut b = TreeBuilder::new();
        let ret = b.ret(1, None);
        let one = b.number(2, 1.0);
        let after = b.var(2, "x", Some(one));
        let tree = b.program(vec![ret, after]);
        let ctx = run(tree, &Hooks::new());
        assert!(!ctx.has_error());
        assert!(ctx.global_scope().lookup("x").is_none());
    }
}
