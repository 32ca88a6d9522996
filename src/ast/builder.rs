use super::*;

/// Assigns ids while a tree is being put together. Used by parsers that
/// produce the tree in-process, and by tests.
///
/// The convenience constructors take only a line number; nodes built that way
/// carry [`Loc::line`] locations.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    nodes: Vec<Node>,
    source: Option<String>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        TreeBuilder::default()
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn push(&mut self, loc: Loc, kind: NodeKind) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node { id, loc, kind });
        id
    }

    /// Wraps `statements` in a statement list and a program node.
    pub fn program(mut self, statements: Vec<NodeId>) -> Tree {
        let line = statements.first().map(|s| self.nodes[*s].loc.line).unwrap_or(1);
        let body = self.push(Loc::line(line), NodeKind::StatementList { statements });
        let root = self.push(Loc::line(line), NodeKind::Program { body });
        Tree::new(self.nodes, root, self.source)
    }

    pub fn finish(self, root: NodeId) -> Tree {
        Tree::new(self.nodes, root, self.source)
    }

    // ── Expressions ──────────────────────────────────────

    pub fn number(&mut self, line: u32, value: f64) -> NodeId {
        self.push(Loc::line(line), NodeKind::NumberLiteral { value })
    }

    pub fn string(&mut self, line: u32, value: &str) -> NodeId {
        self.push(Loc::line(line), NodeKind::StringLiteral { value: value.to_string() })
    }

    pub fn boolean(&mut self, line: u32, value: bool) -> NodeId {
        self.push(Loc::line(line), NodeKind::BooleanLiteral { value })
    }

    pub fn array(&mut self, line: u32, items: Vec<NodeId>) -> NodeId {
        self.push(Loc::line(line), NodeKind::ArrayLiteral { items })
    }

    pub fn name(&mut self, line: u32, name: &str) -> NodeId {
        self.push(Loc::line(line), NodeKind::NameIdentifier { name: name.to_string() })
    }

    pub fn property(&mut self, line: u32, object: NodeId, property: &str) -> NodeId {
        self.push(Loc::line(line), NodeKind::ObjectIdentifier { object, property: property.to_string() })
    }

    pub fn index(&mut self, line: u32, array: NodeId, index: NodeId) -> NodeId {
        self.push(Loc::line(line), NodeKind::ArrayIdentifier { array, index })
    }

    pub fn binary(&mut self, line: u32, left: NodeId, op: BinaryOp, right: NodeId) -> NodeId {
        self.push(Loc::line(line), NodeKind::BinaryExpression { left, op, right })
    }

    pub fn unary(&mut self, line: u32, op: UnaryOp, operand: NodeId) -> NodeId {
        self.push(Loc::line(line), NodeKind::UnaryExpression { op, operand })
    }

    pub fn paren(&mut self, line: u32, inner: NodeId) -> NodeId {
        self.push(Loc::line(line), NodeKind::ParenExpression { inner })
    }

    pub fn call(&mut self, line: u32, callee: NodeId, args: Vec<NodeId>) -> NodeId {
        self.push(Loc::line(line), NodeKind::FunctionCall { callee, args })
    }

    /// `name(args)` with a plain name as callee.
    pub fn call_named(&mut self, line: u32, name: &str, args: Vec<NodeId>) -> NodeId {
        let callee = self.name(line, name);
        self.call(line, callee, args)
    }

    // ── Statements ──────────────────────────────────────

    /// `var name` or `var name = value` with a single item.
    pub fn var(&mut self, line: u32, name: &str, value: Option<NodeId>) -> NodeId {
        let item = self.var_item(line, name, value);
        self.push(Loc::line(line), NodeKind::VarStatement { items: vec![item] })
    }

    pub fn var_item(&mut self, line: u32, name: &str, value: Option<NodeId>) -> NodeId {
        let assignment = value.map(|value| {
            let target = self.name(line, name);
            self.push(Loc::line(line), NodeKind::AssignmentStatement { target, op: AssignOp::Assign, value })
        });
        self.push(Loc::line(line), NodeKind::VarItem { name: name.to_string(), assignment })
    }

    pub fn var_items(&mut self, line: u32, items: Vec<NodeId>) -> NodeId {
        self.push(Loc::line(line), NodeKind::VarStatement { items })
    }

    pub fn assign(&mut self, line: u32, target: NodeId, op: AssignOp, value: NodeId) -> NodeId {
        self.push(Loc::line(line), NodeKind::AssignmentStatement { target, op, value })
    }

    /// `name = value` with a plain name as target.
    pub fn assign_named(&mut self, line: u32, name: &str, value: NodeId) -> NodeId {
        let target = self.name(line, name);
        self.assign(line, target, AssignOp::Assign, value)
    }

    pub fn postfix(&mut self, line: u32, target: NodeId, op: PostfixOp) -> NodeId {
        self.push(Loc::line(line), NodeKind::PostfixStatement { target, op })
    }

    pub fn ret(&mut self, line: u32, value: Option<NodeId>) -> NodeId {
        self.push(Loc::line(line), NodeKind::ReturnStatement { value })
    }

    pub fn block(&mut self, line: u32, statements: Vec<NodeId>) -> NodeId {
        self.push(Loc::line(line), NodeKind::StatementList { statements })
    }

    pub fn if_block(&mut self, line: u32, test: NodeId, body: Vec<NodeId>, otherwise: Option<NodeId>) -> NodeId {
        let body = self.block(line, body);
        self.push(Loc::line(line), NodeKind::IfBlock { test, body, otherwise })
    }

    pub fn else_if(&mut self, line: u32, if_block: NodeId) -> NodeId {
        self.push(Loc::line(line), NodeKind::ElseIfBlock { if_block })
    }

    pub fn else_block(&mut self, line: u32, body: Vec<NodeId>) -> NodeId {
        let body = self.block(line, body);
        self.push(Loc::line(line), NodeKind::ElseBlock { body })
    }

    pub fn while_block(&mut self, line: u32, test: NodeId, body: Vec<NodeId>) -> NodeId {
        let body = self.block(line, body);
        self.push(Loc::line(line), NodeKind::WhileBlock { test, body })
    }

    pub fn for_block(&mut self, line: u32, init: NodeId, test: NodeId, update: NodeId, body: Vec<NodeId>) -> NodeId {
        let body = self.block(line, body);
        self.push(Loc::line(line), NodeKind::ForBlock { init, test, update, body })
    }

    pub fn function(&mut self, line: u32, name: &str, params: &[&str], body: Vec<NodeId>) -> NodeId {
        let body = self.block(line, body);
        self.push(
            Loc::line(line),
            NodeKind::FunctionDeclaration {
                name: name.to_string(),
                params: params.iter().map(|p| p.to_string()).collect(),
                body,
            },
        )
    }
}
