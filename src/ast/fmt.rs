//! Canonical re-print of a node, used when the parser did not hand over the
//! source text.

use super::*;

const INDENT: &str = "  ";

pub fn code(tree: &Tree, id: NodeId) -> String {
    let mut out = String::new();
    fmt_node(&mut out, tree, id, 0);
    out
}

/// JavaScript-style number rendering: integers without a fraction, and
/// exponent form outside `1e-6 <= |n| < 1e21`.
pub fn fmt_num(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let magnitude = n.abs();
    if (1e-6..1e21).contains(&magnitude) {
        return format!("{n}");
    }
    let exp = format!("{n:e}");
    match exp.split_once('e') {
        Some((mantissa, power)) if !power.starts_with('-') => format!("{mantissa}e+{power}"),
        _ => exp,
    }
}

fn fmt_node(out: &mut String, tree: &Tree, id: NodeId, depth: usize) {
    let Some(node) = tree.node(id) else {
        out.push('?');
        return;
    };
    match &node.kind {
        NodeKind::Program { body } => fmt_statements(out, tree, *body, depth),
        NodeKind::StatementList { .. } => fmt_statements(out, tree, id, depth),
        NodeKind::PostfixStatement { target, op } => {
            fmt_node(out, tree, *target, depth);
            out.push_str(op.symbol());
        }
        NodeKind::AssignmentStatement { target, op, value } => {
            fmt_node(out, tree, *target, depth);
            out.push(' ');
            out.push_str(op.symbol());
            out.push(' ');
            fmt_node(out, tree, *value, depth);
        }
        NodeKind::VarStatement { items } => {
            out.push_str("var ");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                fmt_node(out, tree, *item, depth);
            }
        }
        NodeKind::VarItem { name, assignment } => match assignment {
            Some(assignment) => fmt_node(out, tree, *assignment, depth),
            None => out.push_str(name),
        },
        NodeKind::ReturnStatement { value } => {
            out.push_str("return");
            if let Some(value) = value {
                out.push(' ');
                fmt_node(out, tree, *value, depth);
            }
        }
        NodeKind::BinaryExpression { left, op, right } => {
            fmt_node(out, tree, *left, depth);
            out.push(' ');
            out.push_str(op.symbol());
            out.push(' ');
            fmt_node(out, tree, *right, depth);
        }
        NodeKind::UnaryExpression { op, operand } => {
            out.push_str(op.symbol());
            fmt_node(out, tree, *operand, depth);
        }
        NodeKind::ParenExpression { inner } => {
            out.push('(');
            fmt_node(out, tree, *inner, depth);
            out.push(')');
        }
        NodeKind::NumberLiteral { value } => out.push_str(&fmt_num(*value)),
        NodeKind::StringLiteral { value } => {
            out.push_str(&serde_json::Value::String(value.clone()).to_string());
        }
        NodeKind::BooleanLiteral { value } => out.push_str(if *value { "true" } else { "false" }),
        NodeKind::ArrayLiteral { items } => {
            out.push('[');
            fmt_list(out, tree, items, depth);
            out.push(']');
        }
        NodeKind::NameIdentifier { name } => out.push_str(name),
        NodeKind::ObjectIdentifier { object, property } => {
            fmt_node(out, tree, *object, depth);
            out.push('.');
            out.push_str(property);
        }
        NodeKind::ArrayIdentifier { array, index } => {
            fmt_node(out, tree, *array, depth);
            out.push('[');
            fmt_node(out, tree, *index, depth);
            out.push(']');
        }
        NodeKind::FunctionCall { callee, args } => {
            fmt_node(out, tree, *callee, depth);
            out.push('(');
            fmt_list(out, tree, args, depth);
            out.push(')');
        }
        NodeKind::IfBlock { test, body, otherwise } => {
            out.push_str("if (");
            fmt_node(out, tree, *test, depth);
            out.push_str(") ");
            fmt_block(out, tree, *body, depth);
            if let Some(otherwise) = otherwise {
                out.push(' ');
                fmt_node(out, tree, *otherwise, depth);
            }
        }
        NodeKind::ElseIfBlock { if_block } => {
            out.push_str("else ");
            fmt_node(out, tree, *if_block, depth);
        }
        NodeKind::ElseBlock { body } => {
            out.push_str("else ");
            fmt_block(out, tree, *body, depth);
        }
        NodeKind::WhileBlock { test, body } => {
            out.push_str("while (");
            fmt_node(out, tree, *test, depth);
            out.push_str(") ");
            fmt_block(out, tree, *body, depth);
        }
        NodeKind::ForBlock { init, test, update, body } => {
            out.push_str("for (");
            fmt_node(out, tree, *init, depth);
            out.push_str("; ");
            fmt_node(out, tree, *test, depth);
            out.push_str("; ");
            fmt_node(out, tree, *update, depth);
            out.push_str(") ");
            fmt_block(out, tree, *body, depth);
        }
        NodeKind::FunctionDeclaration { name, params, body } => {
            out.push_str("function ");
            out.push_str(name);
            out.push('(');
            out.push_str(&params.join(", "));
            out.push_str(") ");
            fmt_block(out, tree, *body, depth);
        }
    }
}

fn fmt_list(out: &mut String, tree: &Tree, items: &[NodeId], depth: usize) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        fmt_node(out, tree, *item, depth);
    }
}

fn fmt_block(out: &mut String, tree: &Tree, list: NodeId, depth: usize) {
    out.push_str("{\n");
    fmt_statements(out, tree, list, depth + 1);
    out.push_str(&INDENT.repeat(depth));
    out.push('}');
}

fn fmt_statements(out: &mut String, tree: &Tree, list: NodeId, depth: usize) {
    let Some(NodeKind::StatementList { statements }) = tree.node(list).map(|n| &n.kind) else {
        return;
    };
    for stmt in statements {
        out.push_str(&INDENT.repeat(depth));
        fmt_node(out, tree, *stmt, depth);
        let is_block = matches!(
            tree.node(*stmt).map(|n| &n.kind),
            Some(
                NodeKind::IfBlock { .. }
                    | NodeKind::WhileBlock { .. }
                    | NodeKind::ForBlock { .. }
                    | NodeKind::FunctionDeclaration { .. }
            )
        );
        if !is_block {
            out.push(';');
        }
        out.push('\n');
    }
}
