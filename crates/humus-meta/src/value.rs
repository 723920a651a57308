//! Humus runtime values
//!
//! Data values (numbers, symbols, pairs, ...) compare structurally. Values
//! that carry code (closures, native functions, blocks) compare by identity.

use crate::{Env, Expr, Pattern, Stmt};
use humus_core::ActorId;
use std::fmt;
use std::mem;
use std::rc::Rc;

/// A Humus value
#[derive(Clone, Default)]
pub enum Value {
    /// `?`, the answer to anything that has no answer
    #[default]
    Undefined,
    /// `NIL`
    Nil,
    /// `TRUE` / `FALSE`
    Bool(bool),
    /// Integer
    Number(i64),
    /// `#name`
    Symbol(Rc<str>),
    /// Cons cell; tuples nest to the right
    Pair(Rc<Pair>),
    /// Actor address
    Actor(ActorId),
    /// Lambda abstraction closed over its environment
    Closure(Rc<Closure>),
    /// Host function
    Native(Rc<NativeFn>),
    /// Unexecuted statement block
    Block(Rc<Block>),
}

/// Immutable cons cell
pub struct Pair {
    pub head: Value,
    pub tail: Value,
}

// Unlink uniquely owned tails in a loop so long lists drop in constant stack.
impl Drop for Pair {
    fn drop(&mut self) {
        let mut tail = mem::take(&mut self.tail);
        while let Value::Pair(pair) = tail {
            match Rc::try_unwrap(pair) {
                Ok(mut cell) => tail = mem::take(&mut cell.tail),
                Err(_) => break,
            }
        }
    }
}

/// Closure produced by an abstraction expression
pub struct Closure {
    pub ptrn: Rc<Pattern>,
    pub body: Rc<Expr>,
    pub env: Env,
}

/// Block value produced by a block expression
///
/// `vars` are declared as unbound slots each time the block executes.
pub struct Block {
    pub vars: Rc<[Rc<str>]>,
    pub stmt: Rc<Stmt>,
    pub env: Env,
}

/// A function implemented by the host
pub struct NativeFn {
    name: Rc<str>,
    func: Box<dyn Fn(&Value) -> Value>,
}

impl NativeFn {
    /// Wrap a host function
    pub fn new(name: impl Into<Rc<str>>, func: impl Fn(&Value) -> Value + 'static) -> Self {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }

    /// Debug name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Apply to an argument
    pub fn call(&self, arg: &Value) -> Value {
        (self.func)(arg)
    }
}

impl Value {
    /// `TRUE`
    pub const TRUE: Value = Value::Bool(true);
    /// `FALSE`
    pub const FALSE: Value = Value::Bool(false);

    /// Create a symbol
    pub fn symbol(name: &str) -> Self {
        Value::Symbol(Rc::from(name))
    }

    /// Create a pair
    pub fn pair(head: impl Into<Value>, tail: impl Into<Value>) -> Self {
        Value::Pair(Rc::new(Pair {
            head: head.into(),
            tail: tail.into(),
        }))
    }

    /// Create a tuple `(a, b, c)`, which is `(a, (b, c))`
    ///
    /// An empty tuple is `NIL`; a one-element tuple is the element itself.
    pub fn tuple(items: impl IntoIterator<Item = Value>) -> Self {
        let mut items: Vec<Value> = items.into_iter().collect();
        let Some(mut acc) = items.pop() else {
            return Value::Nil;
        };
        while let Some(item) = items.pop() {
            acc = Value::pair(item, acc);
        }
        acc
    }

    /// Create a `NIL`-terminated list `(a, b, c, NIL)`
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        let mut items: Vec<Value> = items.into_iter().collect();
        let mut acc = Value::Nil;
        while let Some(item) = items.pop() {
            acc = Value::pair(item, acc);
        }
        acc
    }

    /// Create a native function value
    pub fn native(name: &str, func: impl Fn(&Value) -> Value + 'static) -> Self {
        Value::Native(Rc::new(NativeFn::new(name, func)))
    }

    /// Check for `?`
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Get as a number
    pub fn as_number(&self) -> Option<i64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as a symbol name
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    /// Get as an actor address
    pub fn as_actor(&self) -> Option<ActorId> {
        match self {
            Value::Actor(id) => Some(*id),
            _ => None,
        }
    }

    /// Get as `(head, tail)`
    pub fn as_pair(&self) -> Option<(&Value, &Value)> {
        match self {
            Value::Pair(p) => Some((&p.head, &p.tail)),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        let (mut a, mut b) = (self, other);
        // walk tails iteratively so long lists don't recurse
        loop {
            match (a, b) {
                (Value::Pair(x), Value::Pair(y)) => {
                    if Rc::ptr_eq(x, y) {
                        return true;
                    }
                    if x.head != y.head {
                        return false;
                    }
                    a = &x.tail;
                    b = &y.tail;
                }
                (Value::Undefined, Value::Undefined) => return true,
                (Value::Nil, Value::Nil) => return true,
                (Value::Bool(x), Value::Bool(y)) => return x == y,
                (Value::Number(x), Value::Number(y)) => return x == y,
                (Value::Symbol(x), Value::Symbol(y)) => return x == y,
                (Value::Actor(x), Value::Actor(y)) => return x == y,
                (Value::Closure(x), Value::Closure(y)) => return Rc::ptr_eq(x, y),
                (Value::Native(x), Value::Native(y)) => return Rc::ptr_eq(x, y),
                (Value::Block(x), Value::Block(y)) => return Rc::ptr_eq(x, y),
                _ => return false,
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut value = self;
        loop {
            match value {
                Value::Pair(p) => {
                    if matches!(p.head, Value::Pair(_)) {
                        write!(f, "({}), ", p.head)?;
                    } else {
                        write!(f, "{}, ", p.head)?;
                    }
                    value = &p.tail;
                }
                Value::Undefined => return f.write_str("?"),
                Value::Nil => return f.write_str("NIL"),
                Value::Bool(true) => return f.write_str("TRUE"),
                Value::Bool(false) => return f.write_str("FALSE"),
                Value::Number(n) => return write!(f, "{}", n),
                Value::Symbol(s) => return write!(f, "#{}", s),
                Value::Actor(id) => return write!(f, "@{}", id.raw()),
                Value::Closure(_) => return f.write_str("\\closure"),
                Value::Native(native) => return write!(f, "\\{}", native.name()),
                Value::Block(_) => return f.write_str("[block]"),
            }
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(i64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<ActorId> for Value {
    fn from(id: ActorId) -> Self {
        Value::Actor(id)
    }
}
