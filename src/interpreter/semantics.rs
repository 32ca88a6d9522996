//! Evaluation rules, one per node kind. The lowered program calls into these
//! with already-evaluated operands; every fault they raise is located at the
//! node passed in.

use std::rc::Rc;

use crate::ast::fmt::fmt_num;
use crate::ast::{AssignOp, BinaryOp, NodeId, PostfixOp, Tree, UnaryOp};
use super::context::RunContext;
use super::error::{ErrorKind, ExecResult, Interrupt, RuntimeError};
use super::scope::{Occupant, Scope};
use super::value::{Binding, Function, InternalFunction, Value};

fn fault(tree: &Tree, node: NodeId, kind: ErrorKind, message: String) -> Interrupt {
    Interrupt::Fault(RuntimeError::new(tree, node, kind, message))
}

// ── Bindings ─────────────────────────────────────────────────────────

/// Resolve a binding to the value it holds at `node`, the expression that
/// produced it. Undefined, null and non-finite values fault here, at the
/// point of use.
pub fn get_value(ctx: &RunContext, node: NodeId, binding: &Binding) -> ExecResult<Value> {
    let tree = ctx.tree();
    let value = match binding {
        Binding::Value(v) => v.clone(),
        Binding::Local(cell) => cell.borrow().clone(),
        Binding::Host(var) => var.get(node).map_err(|e| Interrupt::from_host(tree, node, e))?,
    };
    match value {
        Value::Undefined => Err(fault(tree, node, ErrorKind::UndefinedValue, format!("{} is undefined", tree.code(node)))),
        Value::Null => Err(fault(tree, node, ErrorKind::NullValue, format!("{} is null", tree.code(node)))),
        Value::Number(n) if !n.is_finite() => {
            Err(fault(tree, node, ErrorKind::NotANumber, format!("{} is not a valid number", tree.code(node))))
        }
        value => Ok(value),
    }
}

/// Write through a binding. `target` is the node the binding came from.
pub fn set_variable(ctx: &RunContext, node: NodeId, target: NodeId, binding: &Binding, value: Value) -> ExecResult<()> {
    let tree = ctx.tree();
    match binding {
        Binding::Local(cell) => {
            *cell.borrow_mut() = value;
            Ok(())
        }
        Binding::Host(var) => var.set(node, value).map_err(|e| Interrupt::from_host(tree, node, e)),
        Binding::Value(_) => Err(fault(
            tree,
            node,
            ErrorKind::InvalidAssignment,
            format!("Cannot assign {} to {}", value.stringify(), tree.code(target)),
        )),
    }
}

pub fn lookup(ctx: &RunContext, node: NodeId, name: &str) -> ExecResult<Binding> {
    ctx.scope().lookup(name).ok_or_else(|| {
        fault(ctx.tree(), node, ErrorKind::UnknownVariable, format!("Variable {name} could not be found"))
    })
}

// ── Operators ────────────────────────────────────────────────────────

fn not_a_number(tree: &Tree, node: NodeId, symbol: &str, v: &Value) -> Interrupt {
    fault(tree, node, ErrorKind::NotANumber, format!("{symbol} not possible since {} is not a number", v.stringify()))
}

/// A binary operator on resolved operands. `symbol` is how the operator was
/// written (`+` or `+=`), for messages.
pub fn binary(tree: &Tree, node: NodeId, op: BinaryOp, symbol: &str, left: Value, right: Value) -> ExecResult<Value> {
    match op {
        BinaryOp::Add => match (left, right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            (l @ (Value::Number(_) | Value::Text(_)), r @ (Value::Number(_) | Value::Text(_))) => {
                Ok(Value::Text(format!("{l}{r}")))
            }
            (l, r) => {
                let bad = if matches!(l, Value::Number(_) | Value::Text(_)) { r } else { l };
                Err(fault(
                    tree,
                    node,
                    ErrorKind::NotANumber,
                    format!("{symbol} not possible since {} is not a number or string", bad.stringify()),
                ))
            }
        },
        BinaryOp::And | BinaryOp::Or => match (left, right) {
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(if op == BinaryOp::And { a && b } else { a || b })),
            (l, r) => {
                let bad = if matches!(l, Value::Bool(_)) { r } else { l };
                Err(fault(
                    tree,
                    node,
                    ErrorKind::NotABoolean,
                    format!("{symbol} not possible since {} is not a boolean", bad.stringify()),
                ))
            }
        },
        BinaryOp::Equals => Ok(Value::Bool(left.loose_equals(&right))),
        BinaryOp::NotEquals => Ok(Value::Bool(!left.loose_equals(&right))),
        _ => {
            let a = match left {
                Value::Number(a) if a.is_finite() => a,
                other => return Err(not_a_number(tree, node, symbol, &other)),
            };
            let b = match right {
                Value::Number(b) if b.is_finite() => b,
                other => return Err(not_a_number(tree, node, symbol, &other)),
            };
            if matches!(op, BinaryOp::Divide | BinaryOp::Remainder) && b == 0.0 {
                return Err(fault(
                    tree,
                    node,
                    ErrorKind::DivisionByZero,
                    format!("{symbol} not possible since it is a division by zero"),
                ));
            }
            Ok(match op {
                BinaryOp::Subtract => Value::Number(a - b),
                BinaryOp::Multiply => Value::Number(a * b),
                BinaryOp::Divide => Value::Number(a / b),
                BinaryOp::Remainder => Value::Number(a % b),
                BinaryOp::GreaterThan => Value::Bool(a > b),
                BinaryOp::GreaterOrEqual => Value::Bool(a >= b),
                BinaryOp::LessThan => Value::Bool(a < b),
                // LessOrEqual
                _ => Value::Bool(a <= b),
            })
        }
    }
}

pub fn unary(tree: &Tree, node: NodeId, op: UnaryOp, value: Value) -> ExecResult<Value> {
    match (op, value) {
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Not, other) => Err(fault(
            tree,
            node,
            ErrorKind::NotABoolean,
            format!("! not possible since {} is not a boolean", other.stringify()),
        )),
        (UnaryOp::Plus, Value::Number(n)) => Ok(Value::Number(n)),
        (UnaryOp::Minus, Value::Number(n)) => Ok(Value::Number(-n)),
        (op, other) => Err(not_a_number(tree, node, op.symbol(), &other)),
    }
}

/// `target++` / `target--`; returns the value written back.
pub fn postfix(ctx: &RunContext, node: NodeId, target: NodeId, binding: &Binding, op: PostfixOp) -> ExecResult<Value> {
    let value = match get_value(ctx, target, binding)? {
        Value::Number(n) => Value::Number(if op == PostfixOp::Increment { n + 1.0 } else { n - 1.0 }),
        other => return Err(not_a_number(ctx.tree(), node, op.symbol(), &other)),
    };
    set_variable(ctx, node, target, binding, value.clone())?;
    Ok(value)
}

/// `target op= value`; returns the value written back.
pub fn assign(
    ctx: &RunContext,
    node: NodeId,
    target: NodeId,
    binding: &Binding,
    op: AssignOp,
    value_node: NodeId,
    value: &Binding,
) -> ExecResult<Value> {
    let result = match op.binary() {
        None => get_value(ctx, value_node, value)?,
        Some(bin) => {
            let current = get_value(ctx, target, binding)?;
            let rhs = get_value(ctx, value_node, value)?;
            binary(ctx.tree(), node, bin, op.symbol(), current, rhs)?
        }
    };
    set_variable(ctx, node, target, binding, result.clone())?;
    Ok(result)
}

// ── Access ───────────────────────────────────────────────────────────

/// `object.property`. Host objects expose their members; arrays and strings
/// expose `length`.
pub fn property(tree: &Tree, node: NodeId, object: NodeId, base: Value, name: &str) -> ExecResult<Binding> {
    let found = match (&base, name) {
        (Value::Object(obj), _) => obj.get(name).cloned(),
        (Value::Array(items), "length") => Some(Binding::Value(Value::Number(items.len() as f64))),
        (Value::Text(s), "length") => Some(Binding::Value(Value::Number(s.encode_utf16().count() as f64))),
        _ => None,
    };
    found.ok_or_else(|| {
        fault(
            tree,
            node,
            ErrorKind::MissingProperty,
            format!("Variable {} does not have property {name}", tree.code(object)),
        )
    })
}

/// `array[index]`, bounds-checked against the array's length.
pub fn index(tree: &Tree, node: NodeId, array: NodeId, index: NodeId, base: Value, at: Value) -> ExecResult<Value> {
    let Value::Number(i) = at else {
        return Err(fault(tree, node, ErrorKind::Index, format!("Index {} is not an integer", tree.code(index))));
    };
    if i.fract() != 0.0 {
        return Err(fault(tree, node, ErrorKind::Index, format!("Index {} is not an integer", tree.code(index))));
    }
    let Value::Array(items) = base else {
        return Err(fault(tree, node, ErrorKind::Index, format!("Variable {} is not an array", tree.code(array))));
    };
    let item = if i >= 0.0 { items.get(i as usize) } else { None };
    match item {
        Some(v) if !matches!(v, Value::Undefined) => Ok(v.clone()),
        _ => Err(fault(
            tree,
            node,
            ErrorKind::Index,
            format!("Array {} has no index {}", tree.code(array), fmt_num(i)),
        )),
    }
}

/// The test of an `if`, `while` or `for` must be a boolean.
pub fn condition(ctx: &RunContext, node: NodeId, construct: &str, test: NodeId, binding: &Binding) -> ExecResult<bool> {
    match get_value(ctx, test, binding)? {
        Value::Bool(b) => Ok(b),
        other => Err(fault(
            ctx.tree(),
            node,
            ErrorKind::NotABoolean,
            format!("{construct} is not possible since {} is not a boolean", other.stringify()),
        )),
    }
}

// ── Calls ────────────────────────────────────────────────────────────

/// `callee(args)`. Arguments are resolved left to right before the call; a
/// `null` result reads as `undefined`.
pub fn call(ctx: &mut RunContext, node: NodeId, callee: NodeId, function: &Binding, args: Vec<(NodeId, Binding)>) -> ExecResult<Value> {
    let function = get_value(ctx, callee, function)?;
    let mut values = Vec::with_capacity(args.len());
    for (arg, binding) in &args {
        values.push(get_value(ctx, *arg, binding)?);
    }
    match function {
        Value::Function(f) => invoke(ctx, node, &f, values),
        _ => Err(fault(
            ctx.tree(),
            node,
            ErrorKind::NotAFunction,
            format!("Variable {} is not a function", ctx.tree().code(callee)),
        )),
    }
}

/// Invoke a function value from call site `node`. Host functions are
/// bracketed for bookkeeping; declared functions go on the call stack.
pub fn invoke(ctx: &mut RunContext, node: NodeId, function: &Function, args: Vec<Value>) -> ExecResult<Value> {
    let result = match function {
        Function::Host(f) => {
            ctx.enter_external_call(node, f);
            let result = f.call(ctx, &args).map_err(|e| Interrupt::from_host(ctx.tree(), node, e))?;
            ctx.leave_external_call(node);
            result
        }
        Function::Internal(f) => {
            ctx.enter_call(node)?;
            let result = f.invoke(ctx, args)?;
            ctx.leave_call();
            result
        }
    };
    Ok(match result {
        Value::Null => Value::Undefined,
        other => other,
    })
}

// ── Declarations ─────────────────────────────────────────────────────

fn conflict(tree: &Tree, node: NodeId, what: &str, name: &str, occupant: Occupant) -> Interrupt {
    let existing = match occupant {
        Occupant::Function => "function",
        Occupant::Variable => "variable",
    };
    fault(
        tree,
        node,
        ErrorKind::DuplicateDeclaration,
        format!("{what} {name} cannot be declared since there already is a {existing} with that name"),
    )
}

/// `var name`: a fresh undefined binding in the innermost scope.
pub fn declare_var(ctx: &RunContext, node: NodeId, name: &str) -> ExecResult<Binding> {
    ctx.scope().declare(name, node).map_err(|o| conflict(ctx.tree(), node, "Variable", name, o))
}

/// Register a declared function in the innermost scope.
pub fn declare_function(ctx: &RunContext, node: NodeId, function: InternalFunction) -> ExecResult<()> {
    let name = function.name.clone();
    let binding = Binding::Value(Value::Function(Function::Internal(Rc::new(function))));
    ctx.scope().define(&name, binding, node).map_err(|o| conflict(ctx.tree(), node, "Function", &name, o))
}

/// Entering a declared function: check the arguments and build its scope,
/// a child of `parent` with every parameter bound locally. Extra arguments
/// are ignored.
pub fn enter_function(tree: &Tree, node: NodeId, params: &[String], parent: &Rc<Scope>, args: Vec<Value>) -> ExecResult<Rc<Scope>> {
    if args.len() < params.len() {
        return Err(fault(
            tree,
            node,
            ErrorKind::Arity,
            format!("Function expects {} arguments, but got only {}", params.len(), args.len()),
        ));
    }
    let mut vars = Vec::with_capacity(params.len());
    for (param, arg) in params.iter().zip(args) {
        match arg {
            Value::Undefined => {
                return Err(fault(tree, node, ErrorKind::UndefinedValue, format!("Variable {param} is undefined")));
            }
            Value::Null => return Err(fault(tree, node, ErrorKind::NullValue, format!("Variable {param} is null"))),
            arg => vars.push((param.clone(), Binding::local(arg))),
        }
    }
    Ok(Scope::child(parent, vars))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::TreeBuilder;

    fn tree() -> Tree {
        let mut b = TreeBuilder::new();
        let x = b.name(3, "x");
        let zero = b.number(3, 0.0);
        let e = b.binary(3, x, BinaryOp::Divide, zero);
        b.program(vec![e])
    }

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    fn kind(r: ExecResult<Value>) -> ErrorKind {
        match r {
            Err(Interrupt::Fault(e)) => e.kind,
            other => panic!("expected fault, got {other:?}"),
        }
    }

    #[test]
    fn arithmetic_and_comparison() {
        let t = tree();
        assert_eq!(binary(&t, 2, BinaryOp::Subtract, "-", num(5.0), num(2.0)).unwrap(), num(3.0));
        assert_eq!(binary(&t, 2, BinaryOp::Remainder, "%", num(7.0), num(4.0)).unwrap(), num(3.0));
        assert_eq!(binary(&t, 2, BinaryOp::LessOrEqual, "<=", num(2.0), num(2.0)).unwrap(), Value::Bool(true));
    }

    #[test]
    fn division_by_zero_faults() {
        let t = tree();
        assert_eq!(kind(binary(&t, 2, BinaryOp::Divide, "/", num(5.0), num(0.0))), ErrorKind::DivisionByZero);
        assert_eq!(kind(binary(&t, 2, BinaryOp::Remainder, "%", num(5.0), num(0.0))), ErrorKind::DivisionByZero);
        assert_eq!(kind(binary(&t, 2, BinaryOp::Divide, "/=", num(5.0), num(-0.0))), ErrorKind::DivisionByZero);
    }

    #[test]
    fn plus_concatenates_numbers_and_strings_only() {
        let t = tree();
        assert_eq!(binary(&t, 2, BinaryOp::Add, "+", num(1.0), Value::text("a")).unwrap(), Value::text("1a"));
        assert_eq!(binary(&t, 2, BinaryOp::Add, "+", Value::text("a"), Value::text("b")).unwrap(), Value::text("ab"));
        assert_eq!(binary(&t, 2, BinaryOp::Add, "+", Value::text(""), num(1e21)).unwrap(), Value::text("1e+21"));
        assert_eq!(binary(&t, 2, BinaryOp::Add, "+", num(1e-7), Value::text("")).unwrap(), Value::text("1e-7"));
        assert_eq!(kind(binary(&t, 2, BinaryOp::Add, "+", Value::Bool(true), num(1.0))), ErrorKind::NotANumber);
        assert_eq!(
            kind(binary(&t, 2, BinaryOp::Add, "+", num(1.0), Value::array(vec![]))),
            ErrorKind::NotANumber
        );
    }

    #[test]
    fn logic_requires_booleans_on_both_sides() {
        let t = tree();
        assert_eq!(binary(&t, 2, BinaryOp::Or, "||", Value::Bool(false), Value::Bool(true)).unwrap(), Value::Bool(true));
        assert_eq!(kind(binary(&t, 2, BinaryOp::And, "&&", Value::Bool(false), num(1.0))), ErrorKind::NotABoolean);
    }

    #[test]
    fn equality_is_loose_and_unchecked() {
        let t = tree();
        assert_eq!(binary(&t, 2, BinaryOp::Equals, "==", num(1.0), Value::text("1")).unwrap(), Value::Bool(true));
        assert_eq!(
            binary(&t, 2, BinaryOp::NotEquals, "!=", Value::Bool(true), Value::array(vec![])).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn comparison_rejects_strings() {
        let t = tree();
        match binary(&t, 2, BinaryOp::GreaterThan, ">", Value::text("b"), num(1.0)) {
            Err(Interrupt::Fault(e)) => {
                assert_eq!(e.kind, ErrorKind::NotANumber);
                assert_eq!(e.message, r#"> not possible since "b" is not a number"#);
                assert_eq!(e.loc.line, 3);
            }
            other => panic!("expected fault, got {other:?}"),
        }
    }

    #[test]
    fn unary_rules() {
        let t = tree();
        assert_eq!(unary(&t, 2, UnaryOp::Not, Value::Bool(true)).unwrap(), Value::Bool(false));
        assert_eq!(unary(&t, 2, UnaryOp::Minus, num(4.0)).unwrap(), num(-4.0));
        assert_eq!(kind(unary(&t, 2, UnaryOp::Not, num(1.0))), ErrorKind::NotABoolean);
        assert_eq!(kind(unary(&t, 2, UnaryOp::Plus, Value::text("1"))), ErrorKind::NotANumber);
    }

    #[test]
    fn index_checks_type_kind_and_bounds() {
        let t = tree();
        let arr = || Value::array(vec![num(1.0), num(2.0)]);
        assert_eq!(index(&t, 2, 0, 1, arr(), num(1.0)).unwrap(), num(2.0));
        assert_eq!(kind(index(&t, 2, 0, 1, arr(), num(5.0))), ErrorKind::Index);
        assert_eq!(kind(index(&t, 2, 0, 1, arr(), num(-1.0))), ErrorKind::Index);
        assert_eq!(kind(index(&t, 2, 0, 1, arr(), num(0.5))), ErrorKind::Index);
        assert_eq!(kind(index(&t, 2, 0, 1, arr(), Value::text("0"))), ErrorKind::Index);
        assert_eq!(kind(index(&t, 2, 0, 1, num(3.0), num(0.0))), ErrorKind::Index);
    }

    #[test]
    fn length_property_on_arrays_and_strings() {
        let t = tree();
        let len = |v: Value| match property(&t, 2, 0, v, "length").unwrap() {
            Binding::Value(v) => v,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(len(Value::array(vec![num(1.0)])), num(1.0));
        assert_eq!(len(Value::text("abc")), num(3.0));
        assert!(matches!(
            property(&t, 2, 0, num(1.0), "length"),
            Err(Interrupt::Fault(RuntimeError { kind: ErrorKind::MissingProperty, .. }))
        ));
    }

    #[test]
    fn entering_checks_arity_and_arguments() {
        let t = tree();
        let global = Scope::global([]);
        let params = vec!["a".to_string(), "b".to_string()];

        let err = enter_function(&t, 2, &params, &global, vec![num(1.0)]).unwrap_err();
        assert!(matches!(err, Interrupt::Fault(RuntimeError { kind: ErrorKind::Arity, .. })));

        let err = enter_function(&t, 2, &params, &global, vec![num(1.0), Value::Null]).unwrap_err();
        assert!(matches!(err, Interrupt::Fault(RuntimeError { kind: ErrorKind::NullValue, .. })));

        let scope = enter_function(&t, 2, &params, &global, vec![num(1.0), num(2.0), num(3.0)]).unwrap();
        assert_eq!(scope.level(), 1);
        assert_eq!(scope.entries().len(), 2);
    }
}
