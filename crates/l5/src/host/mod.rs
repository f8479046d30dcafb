//! # host
//!
//! The flat function table handed to a scripting host.
//!
//! Every entry takes and returns [`Value`]s. Results follow two shapes:
//!
//! - success: one or more values (`[Bool(true)]` when there is nothing
//!   else to say)
//! - syscall failure: `[Nil, Int(code)]`, where `code` is the raw errno or
//!   `EAI_*` value
//!
//! Programmer errors (unknown function, wrong argument type, buffer range
//! or alignment violations) are raised as [`CallError`] instead.

mod args;
mod table;
mod value;

use std::collections::BTreeMap;

use l5_mb::BufferError;
use thiserror::Error;
use tracing::{debug, trace};

use crate::config::Config;

pub use value::{BufferRef, DirRef, Value};

pub(crate) use args::Args;

/// Library version string, exported to the host as `VERSION`.
pub const VERSION: &str = "L5-0.1";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("{func}: bad argument #{position} ({expected} expected, got {got})")]
    BadArgument {
        func: &'static str,
        position: usize,
        expected: &'static str,
        got: &'static str,
    },

    #[error("{func}: {source}")]
    Buffer {
        func: &'static str,
        #[source]
        source: BufferError,
    },

    #[error("{func}: {what} too large ({len} > {max})")]
    TooLarge {
        func: &'static str,
        what: &'static str,
        len: usize,
        max: usize,
    },
}

impl CallError {
    pub(crate) fn buffer(func: &'static str) -> impl FnOnce(BufferError) -> Self {
        move |source| CallError::Buffer { func, source }
    }
}

pub type CallResult = Result<Vec<Value>, CallError>;

type HostFn = fn(&Config, &Args<'_>) -> CallResult;

/// The binding table: function name to implementation, plus the buffer
/// methods.
pub struct Library {
    config: Config,
    functions: BTreeMap<&'static str, HostFn>,
    methods: BTreeMap<&'static str, HostFn>,
}

impl Library {
    pub fn new(config: Config) -> Self {
        let functions: BTreeMap<_, _> = table::FUNCTIONS.iter().copied().collect();
        let methods: BTreeMap<_, _> = table::BUFFER_METHODS.iter().copied().collect();
        debug!(
            functions = functions.len(),
            methods = methods.len(),
            "Registered host table"
        );
        Self {
            config,
            functions,
            methods,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Function names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.functions.keys().copied()
    }

    /// Buffer method names, sorted.
    pub fn method_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.methods.keys().copied()
    }

    /// Non-function fields of the table.
    pub fn field(&self, name: &str) -> Option<Value> {
        match name {
            "VERSION" => Some(Value::from(VERSION)),
            _ => None,
        }
    }

    pub fn call(&self, name: &str, args: &[Value]) -> CallResult {
        let (&name, func) = self
            .functions
            .get_key_value(name)
            .ok_or_else(|| CallError::UnknownFunction(name.to_string()))?;
        trace!(name, nargs = args.len(), "call");
        func(&self.config, &Args::new(name, args))
    }

    /// Call a buffer method (`mb:get(...)` and friends) with `mb` as the
    /// receiver.
    pub fn call_method(&self, mb: &BufferRef, name: &str, args: &[Value]) -> CallResult {
        let (&name, func) = self
            .methods
            .get_key_value(name)
            .ok_or_else(|| CallError::UnknownFunction(name.to_string()))?;
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(Value::Buffer(mb.clone()));
        full.extend_from_slice(args);
        trace!(name, nargs = args.len(), "method call");
        func(&self.config, &Args::new(name, &full))
    }
}

impl Default for Library {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
