//! ioctl(2) passthroughs.
//!
//! Structured arguments travel through a [`MemBuf`] so the kernel always
//! sees 8-byte aligned memory, whether the caller staged the argument in
//! its own buffer or handed over a byte string.

use std::os::unix::io::RawFd;

use l5_mb::{BufferError, MemBuf};
use tracing::trace;

use crate::error::{cvt, SysResult};

/// Default size of the scratch area used for byte-string ioctl arguments.
pub const IOCTL_BUFLEN: usize = 1024;

/// ioctl with the buffer passed in place as the argument pointer.
///
/// The kernel reads and writes the buffer directly; the return value is
/// the raw ioctl result.
pub fn ioctl_buf(fd: RawFd, request: u64, buf: &mut MemBuf) -> SysResult<i32> {
    trace!(fd, request, len = buf.len(), "ioctl");
    // SAFETY: buf is writable for buf.len() bytes; the caller sizes it for
    // the request's argument structure.
    cvt(unsafe { libc::ioctl(fd, request as _, buf.as_mut_ptr()) })
}

/// ioctl with a byte-string argument staged in a scratch area of `buflen`
/// bytes (rounded up to a multiple of 8).
///
/// The outer result rejects an `arg` or `argout_len` that does not fit the
/// scratch area. On success, the first `argout_len` bytes of the scratch
/// area are returned when `argout_len > 0`.
pub fn ioctl_bytes(
    fd: RawFd,
    request: u64,
    arg: &[u8],
    argout_len: usize,
    buflen: usize,
) -> Result<SysResult<Option<Vec<u8>>>, BufferError> {
    let size = buflen.max(1).div_ceil(l5_mb::INT_SIZE) * l5_mb::INT_SIZE;
    let mut scratch = MemBuf::new(size)?;
    scratch.set(0, arg)?;
    scratch.get(0, argout_len)?;
    let ret = ioctl_buf(fd, request, &mut scratch)
        .map(|_| (argout_len > 0).then(|| scratch.as_bytes()[..argout_len].to_vec()));
    Ok(ret)
}

/// ioctl with a plain integer argument.
pub fn ioctl_int(fd: RawFd, request: u64, arg: i64) -> SysResult<i32> {
    trace!(fd, request, arg, "ioctl");
    // SAFETY: the argument is passed by value.
    cvt(unsafe { libc::ioctl(fd, request as _, arg as libc::c_long) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SysError;
    use crate::io;
    use nix::errno::Errno;

    #[test]
    fn test_fionread_through_buffer() {
        let (r, w) = io::pipe().unwrap();
        io::write(w, b"12345").unwrap();

        let mut mb = MemBuf::new(8).unwrap();
        ioctl_buf(r, libc::FIONREAD as u64, &mut mb).unwrap();
        let pending = i32::from_ne_bytes(mb.get(0, 4).unwrap().try_into().unwrap());
        assert_eq!(pending, 5);

        io::close(r).unwrap();
        io::close(w).unwrap();
    }

    #[test]
    fn test_fionread_through_bytes() {
        let (r, w) = io::pipe().unwrap();
        io::write(w, b"abc").unwrap();

        let out = ioctl_bytes(r, libc::FIONREAD as u64, &[0u8; 4], 4, IOCTL_BUFLEN)
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(i32::from_ne_bytes(out[..].try_into().unwrap()), 3);

        let none = ioctl_bytes(r, libc::FIONREAD as u64, b"", 0, IOCTL_BUFLEN)
            .unwrap()
            .unwrap();
        assert!(none.is_none());

        io::close(r).unwrap();
        io::close(w).unwrap();
    }

    #[test]
    fn test_ioctl_bytes_too_large() {
        let arg = vec![0u8; IOCTL_BUFLEN + 1];
        assert!(matches!(
            ioctl_bytes(0, libc::FIONREAD as u64, &arg, 0, IOCTL_BUFLEN),
            Err(BufferError::OutOfRange { .. })
        ));
        assert!(matches!(
            ioctl_bytes(0, libc::FIONREAD as u64, b"", IOCTL_BUFLEN + 8, IOCTL_BUFLEN),
            Err(BufferError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_ioctl_bad_fd() {
        assert_eq!(
            ioctl_int(-1, libc::FIONBIO as u64, 1),
            Err(SysError::Os(Errno::EBADF))
        );
    }
}
