//! mount(2) / umount(2) passthroughs.

use std::ffi::CStr;

use tracing::debug;

use crate::error::{cvt, SysResult};

/// Attach the filesystem `src` of type `fstype` at `dest`.
///
/// `data` is the filesystem-specific option string (may be empty).
pub fn mount(src: &CStr, dest: &CStr, fstype: &CStr, flags: u64, data: &CStr) -> SysResult<()> {
    debug!(src = ?src, dest = ?dest, fstype = ?fstype, flags, "mount");
    // SAFETY: all strings are NUL-terminated; data is read as a C string
    // by every filesystem that takes options.
    cvt(unsafe {
        libc::mount(
            src.as_ptr(),
            dest.as_ptr(),
            fstype.as_ptr(),
            flags as libc::c_ulong,
            data.as_ptr().cast(),
        )
    })?;
    Ok(())
}

pub fn umount(dest: &CStr) -> SysResult<()> {
    debug!(dest = ?dest, "umount");
    // SAFETY: dest is NUL-terminated.
    cvt(unsafe { libc::umount(dest.as_ptr()) })?;
    Ok(())
}
