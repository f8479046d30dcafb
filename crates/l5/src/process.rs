//! Process identity and control.

use std::ffi::{CStr, CString};
use std::ptr;

use tracing::trace;

use crate::error::{cvt, SysError, SysResult};

pub fn getpid() -> i32 {
    // SAFETY: getpid cannot fail.
    unsafe { libc::getpid() }
}

pub fn getppid() -> i32 {
    // SAFETY: getppid cannot fail.
    unsafe { libc::getppid() }
}

pub fn geteuid() -> u32 {
    // SAFETY: geteuid cannot fail.
    unsafe { libc::geteuid() }
}

pub fn getegid() -> u32 {
    // SAFETY: getegid cannot fail.
    unsafe { libc::getegid() }
}

/// Current value of the thread's `errno`.
pub fn errno() -> i32 {
    // SAFETY: __errno_location returns the calling thread's errno slot.
    unsafe { *libc::__errno_location() }
}

/// Overwrite the thread's `errno` (mostly `set_errno(0)`).
pub fn set_errno(value: i32) {
    // SAFETY: see `errno`.
    unsafe { *libc::__errno_location() = value }
}

/// Suspend the calling thread for `ms` milliseconds.
pub fn msleep(ms: u64) -> SysResult<()> {
    let req = libc::timespec {
        tv_sec: (ms / 1000) as libc::time_t,
        tv_nsec: ((ms % 1000) * 1_000_000) as libc::c_long,
    };
    // SAFETY: req is a valid timespec; the remainder pointer may be null.
    cvt(unsafe { libc::nanosleep(&req, ptr::null_mut()) })?;
    Ok(())
}

/// fork(2). Returns the child pid in the parent and 0 in the child.
pub fn fork() -> SysResult<i32> {
    // SAFETY: the caller is responsible for what runs in the child; this
    // crate keeps no locks or threads of its own.
    let pid = cvt(unsafe { libc::fork() })?;
    trace!(pid, "fork");
    Ok(pid)
}

/// Wait for a state change in a child.
///
/// `pid = -1` waits for any child, `0` for any child in the process group.
/// Returns `(pid, raw_status)`; decode with [`exit_status`], [`term_signal`]
/// and [`core_dumped`].
pub fn waitpid(pid: i32, options: i32) -> SysResult<(i32, i32)> {
    let mut status = 0;
    // SAFETY: status points to a live i32.
    let pid = cvt(unsafe { libc::waitpid(pid, &mut status, options) })?;
    Ok((pid, status))
}

/// Exit code of a child that exited normally.
pub fn exit_status(status: i32) -> i32 {
    (status & 0xff00) >> 8
}

/// Signal that terminated the child, 0 if none.
pub fn term_signal(status: i32) -> i32 {
    status & 0x7f
}

pub fn core_dumped(status: i32) -> bool {
    status & 0x80 != 0
}

pub fn kill(pid: i32, sig: i32) -> SysResult<()> {
    // SAFETY: kill takes plain integers.
    cvt(unsafe { libc::kill(pid, sig) })?;
    Ok(())
}

/// Replace the process image. Only returns on failure.
///
/// `envp` entries have the form `name=value`.
pub fn execve(path: &CStr, argv: &[CString], envp: &[CString]) -> SysError {
    let argv_ptrs = null_terminated(argv);
    let envp_ptrs = null_terminated(envp);
    trace!(path = ?path, argc = argv.len(), "execve");
    // SAFETY: both arrays are null-terminated and borrow from argv/envp,
    // which outlive the call.
    unsafe { libc::execve(path.as_ptr(), argv_ptrs.as_ptr(), envp_ptrs.as_ptr()) };
    SysError::last()
}

fn null_terminated(strings: &[CString]) -> Vec<*const libc::c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(ptr::null()))
        .collect()
}
