//! Dynamically typed values exchanged with the scripting host.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use l5_mb::MemBuf;

use crate::fs::Dir;

/// Shared handle to a scratch buffer owned by the host.
pub type BufferRef = Rc<RefCell<MemBuf>>;

/// Shared handle to an open directory stream.
pub type DirRef = Rc<RefCell<Dir>>;

#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    /// Byte string; not necessarily UTF-8.
    Str(Vec<u8>),
    List(Vec<Value>),
    Buffer(BufferRef),
    Dir(DirRef),
}

impl Value {
    pub fn str(bytes: impl Into<Vec<u8>>) -> Self {
        Value::Str(bytes.into())
    }

    pub fn buffer(mb: MemBuf) -> Self {
        Value::Buffer(Rc::new(RefCell::new(mb)))
    }

    pub fn dir(dir: Dir) -> Self {
        Value::Dir(Rc::new(RefCell::new(dir)))
    }

    /// Only `Nil` and `Bool(false)` are false.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Buffer(_) => "buffer",
            Value::Dir(_) => "dir",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// Handles compare by identity, everything else by value.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Buffer(a), Value::Buffer(b)) => Rc::ptr_eq(a, b),
            (Value::Dir(a), Value::Dir(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(s: Vec<u8>) -> Self {
        Value::Str(s)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Str(s) => {
                for b in s.iter().flat_map(|b| std::ascii::escape_default(*b)) {
                    write!(f, "{}", b as char)?;
                }
                Ok(())
            }
            Value::List(items) => {
                write!(f, "{{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "}}")
            }
            Value::Buffer(mb) => write!(f, "buffer({})", mb.borrow().len()),
            Value::Dir(dir) => {
                let state = if dir.borrow().is_closed() { "closed" } else { "open" };
                write!(f, "dir({})", state)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Int(0).is_truthy());
        assert!(Value::str("").is_truthy());
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Nil.to_string(), "nil");
        assert_eq!(Value::Int(-3).to_string(), "-3");
        assert_eq!(Value::str(&b"a\x00b"[..]).to_string(), "a\\x00b");
        let list = Value::List(vec![Value::Int(1), Value::from("x")]);
        assert_eq!(list.to_string(), "{1, x}");
        let mb = Value::buffer(MemBuf::new(16).unwrap());
        assert_eq!(mb.to_string(), "buffer(16)");
    }

    #[test]
    fn test_handle_identity() {
        let a = Value::buffer(MemBuf::new(8).unwrap());
        let b = Value::buffer(MemBuf::new(8).unwrap());
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }
}
