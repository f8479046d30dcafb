//! Basic file descriptor I/O.

use std::ffi::CStr;
use std::os::unix::io::RawFd;

use tracing::trace;

use crate::error::{cvt, SysResult};

/// Size of the fixed read performed by [`read4k`].
pub const READ4K_SIZE: usize = 4096;

pub fn open(path: &CStr, flags: i32, mode: u32) -> SysResult<RawFd> {
    // SAFETY: path is NUL-terminated; mode is passed as the variadic arg.
    let fd = cvt(unsafe { libc::open(path.as_ptr(), flags, mode as libc::c_uint) })?;
    trace!(path = ?path, flags, fd, "open");
    Ok(fd)
}

pub fn close(fd: RawFd) -> SysResult<()> {
    // SAFETY: closing an arbitrary integer fd is memory safe.
    cvt(unsafe { libc::close(fd) })?;
    Ok(())
}

/// Read up to `buf.len()` bytes into `buf`. Returns the byte count.
pub fn read(fd: RawFd, buf: &mut [u8]) -> SysResult<usize> {
    // SAFETY: buf is writable for buf.len() bytes.
    let n = cvt(unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) })?;
    Ok(n as usize)
}

/// Read up to 4096 bytes and return them.
pub fn read4k(fd: RawFd) -> SysResult<Vec<u8>> {
    let mut buf = vec![0u8; READ4K_SIZE];
    let n = read(fd, &mut buf)?;
    buf.truncate(n);
    Ok(buf)
}

/// Write `data`. Returns the number of bytes actually written.
pub fn write(fd: RawFd, data: &[u8]) -> SysResult<usize> {
    // SAFETY: data is readable for data.len() bytes.
    let n = cvt(unsafe { libc::write(fd, data.as_ptr().cast(), data.len()) })?;
    Ok(n as usize)
}

/// `dup2(old, new)`, or `dup(old)` when `new` is `None`.
pub fn dup2(oldfd: RawFd, newfd: Option<RawFd>) -> SysResult<RawFd> {
    // SAFETY: integer-only arguments.
    let fd = match newfd {
        Some(newfd) => cvt(unsafe { libc::dup2(oldfd, newfd) })?,
        None => cvt(unsafe { libc::dup(oldfd) })?,
    };
    Ok(fd)
}

/// Create a pipe, returning `(read_end, write_end)`.
pub fn pipe() -> SysResult<(RawFd, RawFd)> {
    let mut fds = [0 as libc::c_int; 2];
    // SAFETY: fds has room for the two descriptors.
    cvt(unsafe { libc::pipe(fds.as_mut_ptr()) })?;
    Ok((fds[0], fds[1]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SysError;
    use nix::errno::Errno;
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;
    use tempfile::TempDir;

    fn cpath(p: &std::path::Path) -> CString {
        CString::new(p.as_os_str().as_bytes()).unwrap()
    }

    #[test]
    fn test_open_write_read() {
        let temp = TempDir::new().unwrap();
        let path = cpath(&temp.path().join("data.bin"));

        let fd = open(&path, libc::O_CREAT | libc::O_WRONLY, 0o644).unwrap();
        assert_eq!(write(fd, b"hello l5").unwrap(), 8);
        close(fd).unwrap();

        let fd = open(&path, libc::O_RDONLY, 0).unwrap();
        let mut buf = [0u8; 16];
        let n = read(fd, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello l5");
        close(fd).unwrap();
    }

    #[test]
    fn test_read4k_short_file() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("short.txt");
        std::fs::write(&file, b"abc").unwrap();
        let fd = open(&cpath(&file), libc::O_RDONLY, 0).unwrap();
        assert_eq!(read4k(fd).unwrap(), b"abc");
        assert_eq!(read4k(fd).unwrap(), b"");
        close(fd).unwrap();
    }

    #[test]
    fn test_open_missing() {
        let path = CString::new("/nonexistent/l5-test-file").unwrap();
        assert_eq!(open(&path, libc::O_RDONLY, 0), Err(SysError::Os(Errno::ENOENT)));
    }

    #[test]
    fn test_close_bad_fd() {
        assert_eq!(close(-1), Err(SysError::Os(Errno::EBADF)));
    }

    #[test]
    fn test_dup_and_dup2() {
        let (r, w) = pipe().unwrap();
        let w2 = dup2(w, None).unwrap();
        assert_ne!(w2, w);
        write(w2, b"x").unwrap();

        let (r3, w3) = pipe().unwrap();
        assert_eq!(dup2(r, Some(r3)).unwrap(), r3);
        let mut buf = [0u8; 1];
        assert_eq!(read(r3, &mut buf).unwrap(), 1);
        assert_eq!(&buf, b"x");

        for fd in [r, w, w2, r3, w3] {
            close(fd).unwrap();
        }
    }
}
