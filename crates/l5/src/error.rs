//! Tagged result type shared by every syscall wrapper.

use nix::errno::{Errno, ErrnoSentinel};
use thiserror::Error;

/// Failure half of a syscall result: the raw OS code, untranslated.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysError {
    /// errno set by a failing system call.
    #[error("{0}")]
    Os(Errno),

    /// errno value this platform table does not name; kept as-is.
    #[error("unknown errno {code}")]
    Unknown { code: i32 },

    /// `EAI_*` code from `getaddrinfo` / `getnameinfo`.
    #[error("resolver error {code}: {}", gai_message(*.code))]
    Resolver { code: i32 },
}

impl SysError {
    /// Integer code handed back to the host.
    pub fn code(&self) -> i32 {
        match self {
            SysError::Os(errno) => *errno as i32,
            SysError::Unknown { code } | SysError::Resolver { code } => *code,
        }
    }

    /// Error for a raw errno value.
    pub fn from_raw(code: i32) -> Self {
        match Errno::from_raw(code) {
            Errno::UnknownErrno if code != 0 => SysError::Unknown { code },
            errno => SysError::Os(errno),
        }
    }

    /// Error for the current value of `errno`.
    pub fn last() -> Self {
        Self::from_raw(Errno::last_raw())
    }
}

impl From<Errno> for SysError {
    fn from(errno: Errno) -> Self {
        SysError::Os(errno)
    }
}

pub type SysResult<T> = std::result::Result<T, SysError>;

/// Convert a `-1`-on-error return into a `SysResult`.
#[inline]
pub(crate) fn cvt<T: ErrnoSentinel + PartialEq<T>>(ret: T) -> SysResult<T> {
    if ret == T::sentinel() {
        Err(SysError::last())
    } else {
        Ok(ret)
    }
}

fn gai_message(code: i32) -> String {
    // SAFETY: gai_strerror returns a pointer to a static string.
    unsafe {
        let msg = libc::gai_strerror(code);
        if msg.is_null() {
            return "unknown".to_string();
        }
        std::ffi::CStr::from_ptr(msg).to_string_lossy().into_owned()
    }
}
