//! Working directory and environment variables.

use std::ffi::{CStr, CString};

use crate::error::{cvt, SysError, SysResult};

/// Current working directory as raw bytes.
///
/// `bufsize` bounds the path length; longer paths fail with `ERANGE`.
pub fn getcwd(bufsize: usize) -> SysResult<Vec<u8>> {
    let mut buf = vec![0u8; bufsize.max(1)];
    // SAFETY: buf is writable for buf.len() bytes.
    let p = unsafe { libc::getcwd(buf.as_mut_ptr().cast(), buf.len()) };
    if p.is_null() {
        return Err(SysError::last());
    }
    // SAFETY: on success getcwd wrote a NUL-terminated string into buf.
    let cwd = unsafe { CStr::from_ptr(p) };
    Ok(cwd.to_bytes().to_vec())
}

pub fn chdir(path: &CStr) -> SysResult<()> {
    // SAFETY: path is NUL-terminated.
    cvt(unsafe { libc::chdir(path.as_ptr()) })?;
    Ok(())
}

/// Set (and overwrite) an environment variable.
pub fn setenv(name: &CStr, value: &CStr) -> SysResult<()> {
    // SAFETY: both strings are NUL-terminated. The caller owns the
    // single-threaded host, so no concurrent environment readers exist.
    cvt(unsafe { libc::setenv(name.as_ptr(), value.as_ptr(), 1) })?;
    Ok(())
}

pub fn unsetenv(name: &CStr) -> SysResult<()> {
    // SAFETY: see `setenv`.
    cvt(unsafe { libc::unsetenv(name.as_ptr()) })?;
    Ok(())
}

/// Snapshot of the process environment as `name=value` strings.
pub fn environ() -> Vec<CString> {
    extern "C" {
        static environ: *const *const libc::c_char;
    }
    let mut out = Vec::new();
    // SAFETY: environ is a null-terminated array of C strings owned by libc.
    unsafe {
        let mut p = environ;
        if p.is_null() {
            return out;
        }
        while !(*p).is_null() {
            out.push(CStr::from_ptr(*p).to_owned());
            p = p.add(1);
        }
    }
    out
}
