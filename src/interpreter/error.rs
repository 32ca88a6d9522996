use serde::Serialize;

use crate::ast::{Loc, NodeId, Tree};

/// The kinds of program fault. Every one is terminal to the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    UndefinedValue,
    NullValue,
    NotANumber,
    NotAFunction,
    NotABoolean,
    DivisionByZero,
    MissingProperty,
    Index,
    Arity,
    DuplicateDeclaration,
    StackOverflow,
    ExecutionLimit,
    /// A host binding raised a plain message.
    Runtime,
    UnknownVariable,
    InvalidAssignment,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 15] = [
        ErrorKind::UndefinedValue,
        ErrorKind::NullValue,
        ErrorKind::NotANumber,
        ErrorKind::NotAFunction,
        ErrorKind::NotABoolean,
        ErrorKind::DivisionByZero,
        ErrorKind::MissingProperty,
        ErrorKind::Index,
        ErrorKind::Arity,
        ErrorKind::DuplicateDeclaration,
        ErrorKind::StackOverflow,
        ErrorKind::ExecutionLimit,
        ErrorKind::Runtime,
        ErrorKind::UnknownVariable,
        ErrorKind::InvalidAssignment,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::UndefinedValue => "UndefinedValueError",
            ErrorKind::NullValue => "NullValueError",
            ErrorKind::NotANumber => "NotANumberError",
            ErrorKind::NotAFunction => "NotAFunctionError",
            ErrorKind::NotABoolean => "NotABooleanError",
            ErrorKind::DivisionByZero => "DivisionByZeroError",
            ErrorKind::MissingProperty => "MissingPropertyError",
            ErrorKind::Index => "IndexError",
            ErrorKind::Arity => "ArityError",
            ErrorKind::DuplicateDeclaration => "DuplicateDeclarationError",
            ErrorKind::StackOverflow => "StackOverflowError",
            ErrorKind::ExecutionLimit => "ExecutionLimitError",
            ErrorKind::Runtime => "RuntimeError",
            ErrorKind::UnknownVariable => "UnknownVariableError",
            ErrorKind::InvalidAssignment => "InvalidAssignmentError",
        }
    }

    /// Stable code, explained in [`crate::diagnostic::registry`].
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::UndefinedValue => "JSMM-R001",
            ErrorKind::NullValue => "JSMM-R002",
            ErrorKind::NotANumber => "JSMM-R003",
            ErrorKind::NotAFunction => "JSMM-R004",
            ErrorKind::NotABoolean => "JSMM-R005",
            ErrorKind::DivisionByZero => "JSMM-R006",
            ErrorKind::MissingProperty => "JSMM-R007",
            ErrorKind::Index => "JSMM-R008",
            ErrorKind::Arity => "JSMM-R009",
            ErrorKind::DuplicateDeclaration => "JSMM-R010",
            ErrorKind::StackOverflow => "JSMM-R011",
            ErrorKind::ExecutionLimit => "JSMM-R012",
            ErrorKind::Runtime => "JSMM-R013",
            ErrorKind::UnknownVariable => "JSMM-R014",
            ErrorKind::InvalidAssignment => "JSMM-R015",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A source-located program fault.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("{kind} at line {line}: {message}", line = .loc.line)]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub node: NodeId,
    pub loc: Loc,
    pub message: String,
}

impl RuntimeError {
    pub fn new(tree: &Tree, node: NodeId, kind: ErrorKind, message: impl Into<String>) -> Self {
        RuntimeError { kind, node, loc: tree.loc(node), message: message.into() }
    }
}

/// What host bindings raise.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// A descriptive message meant for the learner; wrapped into a
    /// [`ErrorKind::Runtime`] fault at the node that reached the host.
    #[error("{0}")]
    Message(String),
    /// A bug in the host. Never becomes the run's error; it aborts the run and
    /// is handed back to the embedder unwrapped.
    #[error("{0}")]
    Internal(Box<dyn std::error::Error>),
}

impl From<String> for HostError {
    fn from(message: String) -> Self {
        HostError::Message(message)
    }
}

impl From<&str> for HostError {
    fn from(message: &str) -> Self {
        HostError::Message(message.to_string())
    }
}

/// An interpreter-internal failure raised by host code.
#[derive(Debug, thiserror::Error)]
#[error("host binding failed: {0}")]
pub struct HostFault(pub Box<dyn std::error::Error>);

/// Why evaluation stopped early.
#[derive(Debug, thiserror::Error)]
pub enum Interrupt {
    #[error(transparent)]
    Fault(#[from] RuntimeError),
    #[error(transparent)]
    Internal(#[from] HostFault),
}

impl Interrupt {
    /// Attach a host failure to the node whose evaluation reached the host.
    pub fn from_host(tree: &Tree, node: NodeId, error: HostError) -> Self {
        match error {
            HostError::Message(message) => {
                Interrupt::Fault(RuntimeError::new(tree, node, ErrorKind::Runtime, message))
            }
            HostError::Internal(inner) => Interrupt::Internal(HostFault(inner)),
        }
    }
}

pub type ExecResult<T> = std::result::Result<T, Interrupt>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::TreeBuilder;

    fn tree() -> Tree {
        let mut b = TreeBuilder::new();
        let n = b.number(7, 1.0);
        b.program(vec![n])
    }

    #[test]
    fn codes_and_names_are_unique() {
        let mut codes: Vec<&str> = ErrorKind::ALL.iter().map(|k| k.code()).collect();
        let mut names: Vec<&str> = ErrorKind::ALL.iter().map(|k| k.name()).collect();
        codes.sort_unstable();
        names.sort_unstable();
        codes.dedup();
        names.dedup();
        assert_eq!(codes.len(), ErrorKind::ALL.len());
        assert_eq!(names.len(), ErrorKind::ALL.len());
    }

    #[test]
    fn runtime_error_takes_location_from_node() {
        let t = tree();
        let e = RuntimeError::new(&t, 0, ErrorKind::DivisionByZero, "nope");
        assert_eq!(e.loc.line, 7);
        assert_eq!(e.to_string(), "DivisionByZeroError at line 7: nope");
    }

    #[test]
    fn host_message_becomes_located_fault() {
        let t = tree();
        match Interrupt::from_host(&t, 0, "robot hit a wall".into()) {
            Interrupt::Fault(e) => {
                assert_eq!(e.kind, ErrorKind::Runtime);
                assert_eq!(e.node, 0);
                assert_eq!(e.message, "robot hit a wall");
            }
            other => panic!("expected fault, got {other:?}"),
        }
    }

    #[test]
    fn host_internal_stays_unwrapped() {
        let t = tree();
        let inner: Box<dyn std::error::Error> = "broken canvas".into();
        let interrupt = Interrupt::from_host(&t, 0, HostError::Internal(inner));
        assert!(matches!(interrupt, Interrupt::Internal(_)));
        assert!(interrupt.to_string().contains("broken canvas"));
    }
}
