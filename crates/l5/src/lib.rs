//! # l5
//!
//! Low-level Linux bindings for a scripting host.
//!
//! Two layers:
//!
//! - typed wrappers (`process`, `env`, `io`, `fs`, `mount`, `ioctl`,
//!   `poll`, `net`), each forwarding to exactly one system call or libc
//!   routine and returning [`SysResult`]
//! - the [`host::Library`] table, which exposes those wrappers by name over
//!   dynamically typed [`host::Value`]s
//!
//! Data moves in and out of the kernel through [`MemBuf`], a fixed-size
//! zeroed scratch buffer re-exported from `l5-mb`.
//!
//! ```no_run
//! use l5::host::{Library, Value};
//!
//! let lib = Library::default();
//! let out = lib.call("chdir", &[Value::from("/nonexistent")]).unwrap();
//! assert_eq!(out[0], Value::Nil);
//! ```

pub mod config;
pub mod env;
pub mod error;
pub mod fs;
pub mod host;
pub mod io;
pub mod ioctl;
pub mod mount;
pub mod net;
pub mod poll;
pub mod process;

pub use config::{Config, ConfigError};
pub use error::{SysError, SysResult};
pub use host::{CallError, Library, Value, VERSION};
pub use l5_mb::{BufferError, MemBuf};

/// Serializes tests that mutate or read the process environment through
/// libc (`setenv`, `getaddrinfo`), which glibc does not lock.
#[cfg(test)]
pub(crate) fn env_lock() -> std::sync::MutexGuard<'static, ()> {
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}
