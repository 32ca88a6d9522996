pub mod ansi;
pub mod json;
pub mod registry;

use crate::ast::Loc;
use crate::interpreter::{ErrorKind, RuntimeError};
use crate::lower::CompileError;

#[derive(Debug, Clone)]
pub struct Label {
    pub loc: Loc,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<&'static str>,
    pub message: String,
    pub labels: Vec<Label>,
    pub notes: Vec<String>,
    pub suggestion: Option<String>,
    pub source: Option<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            code: None,
            message: message.into(),
            labels: Vec::new(),
            notes: Vec::new(),
            suggestion: None,
            source: None,
        }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_loc(mut self, loc: Loc, label: impl Into<String>) -> Self {
        self.labels.push(Label { loc, message: label.into() });
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

fn hint(kind: ErrorKind) -> Option<&'static str> {
    match kind {
        ErrorKind::StackOverflow => Some("make sure every recursive function has a case that does not call itself"),
        ErrorKind::ExecutionLimit => Some("look for a loop whose condition never becomes false"),
        ErrorKind::UndefinedValue => Some("give the variable a value before using it"),
        ErrorKind::Arity => Some("pass a value for every parameter"),
        _ => None,
    }
}

// ── From impls for error types ─────────────────────────────────────────

impl From<&RuntimeError> for Diagnostic {
    fn from(e: &RuntimeError) -> Self {
        let mut d = Diagnostic::error(&e.message).with_code(e.kind.code()).with_loc(e.loc, e.kind.name());
        if let Some(h) = hint(e.kind) {
            d = d.with_suggestion(h);
        }
        d
    }
}

impl From<&CompileError> for Diagnostic {
    fn from(e: &CompileError) -> Self {
        Diagnostic::error(e.to_string())
            .with_code("JSMM-C001")
            .with_note("the program tree handed over by the parser is malformed")
    }
}
