//! poll(2) over a pollset staged in a scratch buffer.

use std::os::unix::io::RawFd;

use l5_mb::{BufferError, MemBuf};

use crate::error::{cvt, SysResult};

/// Default poll timeout, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: i32 = 10_000;

/// Size of one `struct pollfd` entry in a pollset buffer.
pub const POLLFD_SIZE: usize = std::mem::size_of::<libc::pollfd>();

/// Byte offset of field `field` in the entry at index `slot`.
fn slot_offset(
    buf: &MemBuf,
    slot: usize,
    field: usize,
    len: usize,
) -> Result<usize, BufferError> {
    slot.checked_mul(POLLFD_SIZE)
        .and_then(|base| base.checked_add(field))
        .ok_or(BufferError::OutOfRange {
            offset: usize::MAX,
            len,
            size: buf.len(),
        })
}

/// Write a `struct pollfd` entry at index `slot` of a pollset buffer.
pub fn set_pollfd(
    buf: &mut MemBuf,
    slot: usize,
    fd: RawFd,
    events: i16,
) -> Result<(), BufferError> {
    let entry = libc::pollfd {
        fd,
        events,
        revents: 0,
    };
    let offset = slot_offset(buf, slot, 0, POLLFD_SIZE)?;
    buf.set(offset, &pollfd_bytes(&entry))
}

/// `revents` of the entry at index `slot`.
pub fn revents(buf: &MemBuf, slot: usize) -> Result<i16, BufferError> {
    let offset = slot_offset(buf, slot, 6, 2)?;
    let bytes = buf.get(offset, 2)?;
    Ok(i16::from_ne_bytes([bytes[0], bytes[1]]))
}

fn pollfd_bytes(entry: &libc::pollfd) -> [u8; POLLFD_SIZE] {
    let mut out = [0u8; POLLFD_SIZE];
    out[0..4].copy_from_slice(&entry.fd.to_ne_bytes());
    out[4..6].copy_from_slice(&entry.events.to_ne_bytes());
    out[6..8].copy_from_slice(&entry.revents.to_ne_bytes());
    out
}

/// Check that `nfds` pollfd entries fit in `buf`.
pub fn check_pollset(buf: &MemBuf, nfds: usize) -> Result<(), BufferError> {
    buf.get(0, nfds.saturating_mul(POLLFD_SIZE)).map(|_| ())
}

/// Poll the first `nfds` entries of the pollset in `buf`.
///
/// The outer result rejects a pollset that does not fit in `buf`; the
/// inner one carries the syscall outcome: the number of ready
/// descriptors, 0 on timeout.
pub fn poll(
    buf: &mut MemBuf,
    nfds: usize,
    timeout_ms: i32,
) -> Result<SysResult<usize>, BufferError> {
    check_pollset(buf, nfds)?;
    // SAFETY: buf holds at least nfds pollfd entries and its storage is
    // 8-byte aligned, which satisfies pollfd alignment.
    let ret = cvt(unsafe {
        libc::poll(
            buf.as_mut_ptr().cast::<libc::pollfd>(),
            nfds as libc::nfds_t,
            timeout_ms,
        )
    });
    Ok(ret.map(|n| n as usize))
}

/// Wait for input on a single descriptor. Returns 1 if readable, 0 on timeout.
pub fn pollin(fd: RawFd, timeout_ms: i32) -> SysResult<usize> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    // SAFETY: pfd is a single valid pollfd.
    let n = cvt(unsafe { libc::poll(&mut pfd, 1, timeout_ms) })?;
    Ok(n as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io;

    #[test]
    fn test_pollfd_layout() {
        assert_eq!(POLLFD_SIZE, 8);
    }

    #[test]
    fn test_pollin_timeout_then_ready() {
        let (r, w) = io::pipe().unwrap();
        assert_eq!(pollin(r, 0).unwrap(), 0);
        io::write(w, b"x").unwrap();
        assert_eq!(pollin(r, 1000).unwrap(), 1);
        io::close(r).unwrap();
        io::close(w).unwrap();
    }

    #[test]
    fn test_poll_pollset_buffer() {
        let (r1, w1) = io::pipe().unwrap();
        let (r2, w2) = io::pipe().unwrap();
        io::write(w2, b"ready").unwrap();

        let mut mb = MemBuf::new(16).unwrap();
        set_pollfd(&mut mb, 0, r1, libc::POLLIN).unwrap();
        set_pollfd(&mut mb, 1, r2, libc::POLLIN).unwrap();
        check_pollset(&mb, 2).unwrap();

        assert_eq!(poll(&mut mb, 2, 1000).unwrap().unwrap(), 1);
        assert_eq!(revents(&mb, 0).unwrap(), 0);
        assert_eq!(revents(&mb, 1).unwrap() & libc::POLLIN, libc::POLLIN);

        for fd in [r1, w1, r2, w2] {
            io::close(fd).unwrap();
        }
    }

    #[test]
    fn test_pollfd_slot_overflow() {
        let mut mb = MemBuf::new(16).unwrap();
        for slot in [2, usize::MAX / 4, usize::MAX] {
            assert!(matches!(
                set_pollfd(&mut mb, slot, 0, libc::POLLIN),
                Err(BufferError::OutOfRange { .. })
            ));
            assert!(matches!(revents(&mb, slot), Err(BufferError::OutOfRange { .. })));
        }
        // nothing was written
        assert_eq!(mb.get(0, 16).unwrap(), &[0u8; 16]);
    }

    #[test]
    fn test_pollset_too_small() {
        let mut mb = MemBuf::new(16).unwrap();
        assert!(check_pollset(&mb, 2).is_ok());
        assert!(matches!(
            poll(&mut mb, 3, 0),
            Err(BufferError::OutOfRange { .. })
        ));
    }
}
