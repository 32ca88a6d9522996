use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::NodeId;
use super::value::{Binding, Value};

/// What already occupies a name when a declaration conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occupant {
    Function,
    Variable,
}

/// One level of the lexical scope chain: an ordered name -> binding map and a
/// read-only link to the enclosing scope.
#[derive(Debug)]
pub struct Scope {
    vars: RefCell<IndexMap<String, Binding>>,
    /// Declaration node that created each name, for names created by the
    /// program rather than by the host.
    declared_by: RefCell<HashMap<String, NodeId>>,
    parent: Option<Rc<Scope>>,
    level: usize,
}

impl Scope {
    /// The outermost scope.
    pub fn global(vars: impl IntoIterator<Item = (String, Binding)>) -> Rc<Scope> {
        Rc::new(Scope {
            vars: RefCell::new(vars.into_iter().collect()),
            declared_by: RefCell::new(HashMap::new()),
            parent: None,
            level: 0,
        })
    }

    pub fn child(parent: &Rc<Scope>, vars: impl IntoIterator<Item = (String, Binding)>) -> Rc<Scope> {
        Rc::new(Scope {
            vars: RefCell::new(vars.into_iter().collect()),
            declared_by: RefCell::new(HashMap::new()),
            parent: Some(Rc::clone(parent)),
            level: parent.level + 1,
        })
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn parent(&self) -> Option<&Rc<Scope>> {
        self.parent.as_ref()
    }

    /// Walk the chain outward.
    pub fn lookup(&self, name: &str) -> Option<Binding> {
        let mut scope = Some(self);
        while let Some(s) = scope {
            if let Some(binding) = s.vars.borrow().get(name) {
                return Some(binding.clone());
            }
            scope = s.parent.as_deref();
        }
        None
    }

    /// Only this scope, never its ancestors.
    pub fn get_local(&self, name: &str) -> Option<Binding> {
        self.vars.borrow().get(name).cloned()
    }

    pub fn contains_local(&self, name: &str) -> bool {
        self.vars.borrow().contains_key(name)
    }

    /// Create a fresh undefined local binding in this scope.
    ///
    /// A name already present here is a conflict, unless it was created by the
    /// same declaration node: re-running a declaration (a `var` inside a loop
    /// body) starts over with a fresh binding.
    pub fn declare(&self, name: &str, by: NodeId) -> Result<Binding, Occupant> {
        let binding = Binding::local(Value::Undefined);
        self.define(name, binding.clone(), by)?;
        Ok(binding)
    }

    /// Bind `name` in this scope, with the same conflict rule as [`Scope::declare`].
    pub fn define(&self, name: &str, binding: Binding, by: NodeId) -> Result<(), Occupant> {
        if let Some(existing) = self.vars.borrow().get(name) {
            if self.declared_by.borrow().get(name) != Some(&by) {
                return Err(if existing.is_function() { Occupant::Function } else { Occupant::Variable });
            }
        }
        self.vars.borrow_mut().insert(name.to_string(), binding);
        self.declared_by.borrow_mut().insert(name.to_string(), by);
        Ok(())
    }

    /// Snapshot of this scope's own entries, in declaration order.
    pub fn entries(&self) -> Vec<(String, Binding)> {
        self.vars.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}
