//! Checked access to positional host arguments.
//!
//! Positions are 1-based in error messages, as the host sees them.

use std::ffi::CString;

use super::value::{BufferRef, DirRef, Value};
use super::CallError;

pub(crate) struct Args<'a> {
    func: &'static str,
    values: &'a [Value],
}

impl<'a> Args<'a> {
    pub(crate) fn new(func: &'static str, values: &'a [Value]) -> Self {
        Self { func, values }
    }

    fn get(&self, i: usize) -> &Value {
        self.values.get(i).unwrap_or(&Value::Nil)
    }

    fn bad(&self, i: usize, expected: &'static str) -> CallError {
        CallError::BadArgument {
            func: self.func,
            position: i + 1,
            expected,
            got: self.get(i).type_name(),
        }
    }

    pub(crate) fn is_nil(&self, i: usize) -> bool {
        matches!(self.get(i), Value::Nil)
    }

    pub(crate) fn int(&self, i: usize) -> Result<i64, CallError> {
        self.get(i).as_int().ok_or_else(|| self.bad(i, "integer"))
    }

    pub(crate) fn opt_int(&self, i: usize, default: i64) -> Result<i64, CallError> {
        if self.is_nil(i) {
            return Ok(default);
        }
        self.int(i)
    }

    /// Integer that must fit a C `int`.
    pub(crate) fn i32(&self, i: usize) -> Result<i32, CallError> {
        i32::try_from(self.int(i)?).map_err(|_| self.bad(i, "32-bit integer"))
    }

    pub(crate) fn opt_i32(&self, i: usize, default: i32) -> Result<i32, CallError> {
        if self.is_nil(i) {
            return Ok(default);
        }
        self.i32(i)
    }

    /// Non-negative integer used as a size or offset.
    pub(crate) fn usize(&self, i: usize) -> Result<usize, CallError> {
        usize::try_from(self.int(i)?).map_err(|_| self.bad(i, "non-negative integer"))
    }

    pub(crate) fn opt_usize(&self, i: usize, default: usize) -> Result<usize, CallError> {
        if self.is_nil(i) {
            return Ok(default);
        }
        self.usize(i)
    }

    pub(crate) fn bytes(&self, i: usize) -> Result<&'a [u8], CallError> {
        match self.values.get(i) {
            Some(Value::Str(s)) => Ok(s),
            _ => Err(self.bad(i, "string")),
        }
    }

    pub(crate) fn opt_bytes(&self, i: usize) -> Result<Option<&'a [u8]>, CallError> {
        if self.is_nil(i) {
            return Ok(None);
        }
        self.bytes(i).map(Some)
    }

    /// String argument passed to the kernel as a C string.
    pub(crate) fn cstr(&self, i: usize) -> Result<CString, CallError> {
        CString::new(self.bytes(i)?).map_err(|_| self.bad(i, "string without NUL"))
    }

    pub(crate) fn truthy(&self, i: usize) -> bool {
        self.get(i).is_truthy()
    }

    pub(crate) fn buffer(&self, i: usize) -> Result<BufferRef, CallError> {
        match self.get(i) {
            Value::Buffer(mb) => Ok(mb.clone()),
            _ => Err(self.bad(i, "buffer")),
        }
    }

    pub(crate) fn dir(&self, i: usize) -> Result<DirRef, CallError> {
        match self.get(i) {
            Value::Dir(dir) => Ok(dir.clone()),
            _ => Err(self.bad(i, "dir")),
        }
    }

    /// List of strings, as used for `argv` / `envp`.
    pub(crate) fn cstr_list(&self, i: usize) -> Result<Vec<CString>, CallError> {
        let Value::List(items) = self.get(i) else {
            return Err(self.bad(i, "list of strings"));
        };
        items
            .iter()
            .map(|item| match item {
                Value::Str(s) => CString::new(s.as_slice()).ok(),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| self.bad(i, "list of strings"))
    }

    pub(crate) fn value(&self, i: usize) -> &Value {
        self.get(i)
    }
}
