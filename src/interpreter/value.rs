use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::NodeId;
use crate::ast::fmt::fmt_num;
use super::context::RunContext;
use super::error::{ExecResult, HostError};

/// A plain value, as read out of a binding.
#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Number(f64),
    Text(String),
    Bool(bool),
    Array(Rc<Vec<Value>>),
    Object(Rc<HostObject>),
    Function(Function),
}

#[derive(Clone)]
pub enum Function {
    Host(Rc<HostFunction>),
    Internal(Rc<InternalFunction>),
}

/// A named slot as seen by the program. Evaluating an identifier yields one
/// of these; it is resolved to a [`Value`] at the point of use.
#[derive(Clone)]
pub enum Binding {
    /// A temporary, or a function registered by a declaration. Not assignable.
    Value(Value),
    /// A plain mutable slot created by a variable declaration.
    Local(Rc<RefCell<Value>>),
    /// Storage owned by the host; every read and write round-trips to it.
    Host(Rc<HostVariable>),
}

impl Binding {
    pub fn local(value: Value) -> Self {
        Binding::Local(Rc::new(RefCell::new(value)))
    }

    pub fn is_function(&self) -> bool {
        match self {
            Binding::Value(v) => matches!(v, Value::Function(_)),
            Binding::Local(cell) => matches!(&*cell.borrow(), Value::Function(_)),
            Binding::Host(_) => false,
        }
    }
}

pub type HostFn = dyn Fn(&mut RunContext, &str, &[Value]) -> Result<Value, HostError>;
pub type GetFn = dyn Fn(NodeId, &str) -> Result<Value, HostError>;
pub type SetFn = dyn Fn(NodeId, &str, Value) -> Result<(), HostError>;

/// A callable implemented by the host, invoked as `func(context, name, args)`.
pub struct HostFunction {
    pub name: String,
    func: Box<HostFn>,
}

impl HostFunction {
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(&mut RunContext, &str, &[Value]) -> Result<Value, HostError> + 'static,
    ) -> Self {
        HostFunction { name: name.into(), func: Box::new(func) }
    }

    pub fn call(&self, ctx: &mut RunContext, args: &[Value]) -> Result<Value, HostError> {
        (self.func)(ctx, &self.name, args)
    }
}

/// A variable whose storage lives in the host (e.g. a simulated robot's
/// position).
pub struct HostVariable {
    pub name: String,
    get: Box<GetFn>,
    set: Box<SetFn>,
}

impl HostVariable {
    pub fn new(
        name: impl Into<String>,
        get: impl Fn(NodeId, &str) -> Result<Value, HostError> + 'static,
        set: impl Fn(NodeId, &str, Value) -> Result<(), HostError> + 'static,
    ) -> Self {
        HostVariable { name: name.into(), get: Box::new(get), set: Box::new(set) }
    }

    pub fn get(&self, node: NodeId) -> Result<Value, HostError> {
        (self.get)(node, &self.name)
    }

    pub fn set(&self, node: NodeId, value: Value) -> Result<(), HostError> {
        (self.set)(node, &self.name, value)
    }
}

/// A host-provided object such as `console`, whose properties are bindings.
pub struct HostObject {
    pub name: String,
    props: IndexMap<String, Binding>,
}

impl HostObject {
    pub fn new(name: impl Into<String>) -> Self {
        HostObject { name: name.into(), props: IndexMap::new() }
    }

    pub fn with_function(mut self, function: HostFunction) -> Self {
        let name = function.name.clone();
        self.props.insert(name, Binding::Value(Value::Function(Function::Host(Rc::new(function)))));
        self
    }

    pub fn with_variable(mut self, variable: HostVariable) -> Self {
        let name = variable.name.clone();
        self.props.insert(name, Binding::Host(Rc::new(variable)));
        self
    }

    pub fn with_value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.props.insert(name.into(), Binding::Value(value));
        self
    }

    pub fn get(&self, property: &str) -> Option<&Binding> {
        self.props.get(property)
    }
}

type InvokeFn = dyn Fn(&mut RunContext, Vec<Value>) -> ExecResult<Value>;

/// A function declared by the program, lowered to a native closure over
/// `(context, args)` that captured its declaring scope.
pub struct InternalFunction {
    pub name: String,
    pub decl: NodeId,
    invoke: Box<InvokeFn>,
}

impl InternalFunction {
    pub(crate) fn new(
        name: impl Into<String>,
        decl: NodeId,
        invoke: impl Fn(&mut RunContext, Vec<Value>) -> ExecResult<Value> + 'static,
    ) -> Self {
        InternalFunction { name: name.into(), decl, invoke: Box::new(invoke) }
    }

    pub fn invoke(&self, ctx: &mut RunContext, args: Vec<Value>) -> ExecResult<Value> {
        (self.invoke)(ctx, args)
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Number(_) => "number",
            Value::Text(_) => "string",
            Value::Bool(_) => "boolean",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
        }
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(items))
    }

    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    /// Short rendering used in history records and messages: functions,
    /// arrays and objects are summarised, everything else is JSON.
    pub fn stringify(&self) -> String {
        match self {
            Value::Function(_) => "[function]".to_string(),
            Value::Array(_) => "[array]".to_string(),
            Value::Object(_) => "[object]".to_string(),
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Number(n) => fmt_num(*n),
            Value::Bool(b) => b.to_string(),
            Value::Text(s) => serde_json::Value::String(s.clone()).to_string(),
        }
    }

    /// Numeric coercion used by loose equality.
    fn to_number(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Null => 0.0,
            Value::Text(s) => {
                let t = s.trim();
                if t.is_empty() { 0.0 } else { t.parse().unwrap_or(f64::NAN) }
            }
            _ => f64::NAN,
        }
    }

    /// `==` without any type restriction, following JavaScript's loose
    /// equality for the value kinds the language has.
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
            (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => a.same(b),
            (Value::Bool(_), _) => Value::Number(self.to_number()).loose_equals(other),
            (_, Value::Bool(_)) => self.loose_equals(&Value::Number(other.to_number())),
            (Value::Number(a), Value::Text(_)) => *a == other.to_number(),
            (Value::Text(_), Value::Number(b)) => self.to_number() == *b,
            (Value::Array(_) | Value::Object(_), Value::Number(_) | Value::Text(_)) => {
                Value::Text(self.to_string()).loose_equals(other)
            }
            (Value::Number(_) | Value::Text(_), Value::Array(_) | Value::Object(_)) => {
                self.loose_equals(&Value::Text(other.to_string()))
            }
            _ => false,
        }
    }
}

impl Function {
    pub fn name(&self) -> &str {
        match self {
            Function::Host(f) => &f.name,
            Function::Internal(f) => &f.name,
        }
    }

    fn same(&self, other: &Function) -> bool {
        match (self, other) {
            (Function::Host(a), Function::Host(b)) => Rc::ptr_eq(a, b),
            (Function::Internal(a), Function::Internal(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// JavaScript string conversion, as used by `+` concatenation.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Number(n) => write!(f, "{}", fmt_num(*n)),
            Value::Text(s) => write!(f, "{}", s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    match item {
                        Value::Undefined | Value::Null => {}
                        other => write!(f, "{}", other)?,
                    }
                }
                Ok(())
            }
            Value::Object(_) => write!(f, "[object Object]"),
            Value::Function(func) => write!(f, "function {}() {{ [code] }}", func.name()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "Undefined"),
            Value::Null => write!(f, "Null"),
            Value::Number(n) => write!(f, "Number({n:?})"),
            Value::Text(s) => write!(f, "Text({s:?})"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Array(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Object(o) => write!(f, "Object({})", o.name),
            Value::Function(func) => write!(f, "Function({})", func.name()),
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Value(v) => write!(f, "Value({v:?})"),
            Binding::Local(cell) => write!(f, "Local({:?})", cell.borrow()),
            Binding::Host(var) => write!(f, "Host({})", var.name),
        }
    }
}

/// Structural equality for primitives and arrays, identity for host objects
/// and functions.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => a.same(b),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    #[test]
    fn stringify_summarises_compound_values() {
        assert_eq!(Value::array(vec![num(1.0)]).stringify(), "[array]");
        assert_eq!(Value::Object(Rc::new(HostObject::new("console"))).stringify(), "[object]");
        assert_eq!(Value::Undefined.stringify(), "undefined");
        assert_eq!(Value::text("hi").stringify(), r#""hi""#);
        assert_eq!(num(10.0).stringify(), "10");
        assert_eq!(num(0.5).stringify(), "0.5");
        assert_eq!(Value::Bool(true).stringify(), "true");
    }

    #[test]
    fn display_matches_string_conversion() {
        assert_eq!(num(1.0).to_string(), "1");
        assert_eq!(Value::array(vec![num(1.0), Value::Undefined, Value::text("a")]).to_string(), "1,,a");
        assert_eq!(Value::Null.to_string(), "null");
    }

    #[test]
    fn loose_equality_coerces() {
        assert!(num(1.0).loose_equals(&Value::text("1")));
        assert!(Value::text(" 2 ").loose_equals(&num(2.0)));
        assert!(Value::Bool(true).loose_equals(&num(1.0)));
        assert!(Value::Null.loose_equals(&Value::Undefined));
        assert!(!Value::Null.loose_equals(&num(0.0)));
        assert!(!Value::Undefined.loose_equals(&Value::Bool(false)));
        assert!(Value::text("").loose_equals(&num(0.0)));
        assert!(!Value::text("a").loose_equals(&num(0.0)));
    }

    #[test]
    fn arrays_compare_by_identity_under_loose_equality() {
        let a = Value::array(vec![num(1.0)]);
        let b = Value::array(vec![num(1.0)]);
        assert!(a.loose_equals(&a.clone()));
        assert!(!a.loose_equals(&b));
        assert!(a.loose_equals(&Value::text("1")));
    }

    #[test]
    fn binding_detects_functions() {
        let f = Value::Function(Function::Host(Rc::new(HostFunction::new("f", |_, _, _| Ok(Value::Undefined)))));
        assert!(Binding::Value(f.clone()).is_function());
        assert!(Binding::local(f).is_function());
        assert!(!Binding::local(num(1.0)).is_function());
    }

    #[test]
    fn host_object_exposes_members() {
        let obj = HostObject::new("robot")
            .with_value("speed", num(3.0))
            .with_variable(HostVariable::new("x", |_, _| Ok(Value::Number(4.0)), |_, _, _| Ok(())));
        assert!(matches!(obj.get("speed"), Some(Binding::Value(Value::Number(n))) if *n == 3.0));
        match obj.get("x") {
            Some(Binding::Host(var)) => assert_eq!(var.get(0).unwrap(), num(4.0)),
            other => panic!("expected host variable, got {other:?}"),
        }
        assert!(obj.get("y").is_none());
    }
}
