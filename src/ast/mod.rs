use std::cell::OnceCell;

use serde::{Deserialize, Serialize};

pub mod builder;
pub mod fmt;
pub mod source_map;
pub use builder::TreeBuilder;
pub use source_map::SourceMap;

// ── Location infrastructure ──────────────────────────────────────

/// Stable per-node id handed out by the parser. Equal to the node's index in
/// [`Tree::nodes`], and the join key between execution history and source.
pub type NodeId = usize;

/// Line/column range within source text. Lines and columns are 1-based,
/// the end position is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Loc {
    pub line: u32,
    pub column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl Loc {
    pub const UNKNOWN: Loc = Loc { line: 0, column: 0, end_line: 0, end_column: 0 };

    pub fn new(line: u32, column: u32, end_line: u32, end_column: u32) -> Self {
        Loc { line, column, end_line, end_column }
    }

    /// A location covering a whole line, for trees built without column info.
    pub fn line(line: u32) -> Self {
        Loc { line, column: 1, end_line: line, end_column: 1 }
    }

    pub fn is_unknown(&self) -> bool {
        self.line == 0
    }
}

// ── Operators ──────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Subtract,
    #[serde(rename = "*")]
    Multiply,
    #[serde(rename = "/")]
    Divide,
    #[serde(rename = "%")]
    Remainder,
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = "&&")]
    And,
    #[serde(rename = "||")]
    Or,
    #[serde(rename = "==")]
    Equals,
    #[serde(rename = "!=")]
    NotEquals,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Remainder => "%",
            BinaryOp::GreaterThan => ">",
            BinaryOp::GreaterOrEqual => ">=",
            BinaryOp::LessThan => "<",
            BinaryOp::LessOrEqual => "<=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Equals => "==",
            BinaryOp::NotEquals => "!=",
        }
    }
}

/// `=` and the compound assignment forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    #[serde(rename = "=")]
    Assign,
    #[serde(rename = "+=")]
    Add,
    #[serde(rename = "-=")]
    Subtract,
    #[serde(rename = "*=")]
    Multiply,
    #[serde(rename = "/=")]
    Divide,
    #[serde(rename = "%=")]
    Remainder,
}

impl AssignOp {
    pub fn symbol(self) -> &'static str {
        match self {
            AssignOp::Assign => "=",
            AssignOp::Add => "+=",
            AssignOp::Subtract => "-=",
            AssignOp::Multiply => "*=",
            AssignOp::Divide => "/=",
            AssignOp::Remainder => "%=",
        }
    }

    /// The arithmetic a compound assignment performs, `None` for plain `=`.
    pub fn binary(self) -> Option<BinaryOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::Add => Some(BinaryOp::Add),
            AssignOp::Subtract => Some(BinaryOp::Subtract),
            AssignOp::Multiply => Some(BinaryOp::Multiply),
            AssignOp::Divide => Some(BinaryOp::Divide),
            AssignOp::Remainder => Some(BinaryOp::Remainder),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    #[serde(rename = "!")]
    Not,
    #[serde(rename = "+")]
    Plus,
    #[serde(rename = "-")]
    Minus,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Not => "!",
            UnaryOp::Plus => "+",
            UnaryOp::Minus => "-",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostfixOp {
    #[serde(rename = "++")]
    Increment,
    #[serde(rename = "--")]
    Decrement,
}

impl PostfixOp {
    pub fn symbol(self) -> &'static str {
        match self {
            PostfixOp::Increment => "++",
            PostfixOp::Decrement => "--",
        }
    }
}

// ── Nodes ──────────────────────────────────────

/// Node kinds, tagged by `type` in the JSON interchange format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NodeKind {
    Program { body: NodeId },
    StatementList { statements: Vec<NodeId> },

    /// `x++` / `x--`
    PostfixStatement { target: NodeId, op: PostfixOp },
    /// `x = e`, `x += e`, ...
    AssignmentStatement { target: NodeId, op: AssignOp, value: NodeId },
    /// `var a, b = e`
    VarStatement { items: Vec<NodeId> },
    /// A single declared name; `assignment` is an `AssignmentStatement` node.
    VarItem { name: String, assignment: Option<NodeId> },
    ReturnStatement { value: Option<NodeId> },

    BinaryExpression { left: NodeId, op: BinaryOp, right: NodeId },
    UnaryExpression { op: UnaryOp, operand: NodeId },
    ParenExpression { inner: NodeId },
    NumberLiteral { value: f64 },
    StringLiteral { value: String },
    BooleanLiteral { value: bool },
    ArrayLiteral { items: Vec<NodeId> },

    NameIdentifier { name: String },
    /// `object.property`
    ObjectIdentifier { object: NodeId, property: String },
    /// `array[index]`
    ArrayIdentifier { array: NodeId, index: NodeId },
    FunctionCall { callee: NodeId, args: Vec<NodeId> },

    /// `otherwise` is an `ElseIfBlock` or `ElseBlock` node.
    IfBlock { test: NodeId, body: NodeId, otherwise: Option<NodeId> },
    ElseIfBlock { if_block: NodeId },
    ElseBlock { body: NodeId },
    WhileBlock { test: NodeId, body: NodeId },
    ForBlock { init: NodeId, test: NodeId, update: NodeId, body: NodeId },
    FunctionDeclaration { name: String, params: Vec<String>, body: NodeId },
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Program { .. } => "Program",
            NodeKind::StatementList { .. } => "StatementList",
            NodeKind::PostfixStatement { .. } => "PostfixStatement",
            NodeKind::AssignmentStatement { .. } => "AssignmentStatement",
            NodeKind::VarStatement { .. } => "VarStatement",
            NodeKind::VarItem { .. } => "VarItem",
            NodeKind::ReturnStatement { .. } => "ReturnStatement",
            NodeKind::BinaryExpression { .. } => "BinaryExpression",
            NodeKind::UnaryExpression { .. } => "UnaryExpression",
            NodeKind::ParenExpression { .. } => "ParenExpression",
            NodeKind::NumberLiteral { .. } => "NumberLiteral",
            NodeKind::StringLiteral { .. } => "StringLiteral",
            NodeKind::BooleanLiteral { .. } => "BooleanLiteral",
            NodeKind::ArrayLiteral { .. } => "ArrayLiteral",
            NodeKind::NameIdentifier { .. } => "NameIdentifier",
            NodeKind::ObjectIdentifier { .. } => "ObjectIdentifier",
            NodeKind::ArrayIdentifier { .. } => "ArrayIdentifier",
            NodeKind::FunctionCall { .. } => "FunctionCall",
            NodeKind::IfBlock { .. } => "IfBlock",
            NodeKind::ElseIfBlock { .. } => "ElseIfBlock",
            NodeKind::ElseBlock { .. } => "ElseBlock",
            NodeKind::WhileBlock { .. } => "WhileBlock",
            NodeKind::ForBlock { .. } => "ForBlock",
            NodeKind::FunctionDeclaration { .. } => "FunctionDeclaration",
        }
    }

    /// Direct children, in evaluation order.
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            NodeKind::Program { body } => vec![*body],
            NodeKind::StatementList { statements } => statements.clone(),
            NodeKind::PostfixStatement { target, .. } => vec![*target],
            NodeKind::AssignmentStatement { target, value, .. } => vec![*target, *value],
            NodeKind::VarStatement { items } => items.clone(),
            NodeKind::VarItem { assignment, .. } => assignment.iter().copied().collect(),
            NodeKind::ReturnStatement { value } => value.iter().copied().collect(),
            NodeKind::BinaryExpression { left, right, .. } => vec![*left, *right],
            NodeKind::UnaryExpression { operand, .. } => vec![*operand],
            NodeKind::ParenExpression { inner } => vec![*inner],
            NodeKind::NumberLiteral { .. }
            | NodeKind::StringLiteral { .. }
            | NodeKind::BooleanLiteral { .. }
            | NodeKind::NameIdentifier { .. } => vec![],
            NodeKind::ArrayLiteral { items } => items.clone(),
            NodeKind::ObjectIdentifier { object, .. } => vec![*object],
            NodeKind::ArrayIdentifier { array, index } => vec![*array, *index],
            NodeKind::FunctionCall { callee, args } => {
                let mut out = vec![*callee];
                out.extend(args.iter().copied());
                out
            }
            NodeKind::IfBlock { test, body, otherwise } => {
                let mut out = vec![*test, *body];
                out.extend(otherwise.iter().copied());
                out
            }
            NodeKind::ElseIfBlock { if_block } => vec![*if_block],
            NodeKind::ElseBlock { body } => vec![*body],
            NodeKind::WhileBlock { test, body } => vec![*test, *body],
            NodeKind::ForBlock { init, test, update, body } => vec![*init, *test, *update, *body],
            NodeKind::FunctionDeclaration { body, .. } => vec![*body],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub loc: Loc,
    #[serde(flatten)]
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TreeError {
    #[error("node at index {index} carries id {id}")]
    IdMismatch { index: usize, id: NodeId },
    #[error("node {parent} refers to missing node {child}")]
    DanglingChild { parent: NodeId, child: NodeId },
    #[error("root node {0} does not exist")]
    MissingRoot(NodeId),
    #[error("root node {0} is not a Program")]
    RootNotProgram(NodeId),
    #[error("node {child} is its own ancestor (reached again from node {parent})")]
    Cycle { parent: NodeId, child: NodeId },
}

/// The immutable program tree produced by the parser. The interpreter never
/// mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
    pub root: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip)]
    source_map: OnceCell<SourceMap>,
}

impl Tree {
    pub fn new(nodes: Vec<Node>, root: NodeId, source: Option<String>) -> Self {
        Tree { nodes, root, source, source_map: OnceCell::new() }
    }

    pub fn from_json(json: &str) -> Result<Tree, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn loc(&self, id: NodeId) -> Loc {
        self.node(id).map(|n| n.loc).unwrap_or(Loc::UNKNOWN)
    }

    /// Check the id invariants the interpreter relies on.
    pub fn validate(&self) -> Result<(), TreeError> {
        for (index, node) in self.nodes.iter().enumerate() {
            if node.id != index {
                return Err(TreeError::IdMismatch { index, id: node.id });
            }
            for child in node.kind.children() {
                if child >= self.nodes.len() {
                    return Err(TreeError::DanglingChild { parent: node.id, child });
                }
            }
        }
        match self.node(self.root) {
            None => Err(TreeError::MissingRoot(self.root)),
            Some(Node { kind: NodeKind::Program { .. }, .. }) => self.check_acyclic(),
            Some(_) => Err(TreeError::RootNotProgram(self.root)),
        }
    }

    /// Depth-first walk from the root; a child that is still open on the
    /// walk is an ancestor of its parent. Assumes every child id exists.
    fn check_acyclic(&self) -> Result<(), TreeError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unseen,
            Open,
            Done,
        }

        let mut marks = vec![Mark::Unseen; self.nodes.len()];
        marks[self.root] = Mark::Open;
        let mut stack = vec![(self.root, self.nodes[self.root].kind.children().into_iter())];
        while let Some((parent, children)) = stack.last_mut() {
            let parent = *parent;
            match children.next() {
                Some(child) => match marks[child] {
                    Mark::Unseen => {
                        marks[child] = Mark::Open;
                        stack.push((child, self.nodes[child].kind.children().into_iter()));
                    }
                    Mark::Open => return Err(TreeError::Cycle { parent, child }),
                    Mark::Done => {}
                },
                None => {
                    marks[parent] = Mark::Done;
                    stack.pop();
                }
            }
        }
        Ok(())
    }

    /// Source text of a node: the original slice when the parser handed over
    /// the source, a canonical re-print otherwise.
    pub fn code(&self, id: NodeId) -> String {
        if let (Some(source), Some(node)) = (self.source.as_deref(), self.node(id)) {
            let map = self.source_map.get_or_init(|| SourceMap::new(source));
            if let Some(text) = map.slice(source, node.loc) {
                return text.to_string();
            }
        }
        fmt::code(self, id)
    }

    pub fn source_map(&self) -> Option<&SourceMap> {
        let source = self.source.as_deref()?;
        Some(self.source_map.get_or_init(|| SourceMap::new(source)))
    }
}
