//! Socket calls and address resolution.
//!
//! Socket addresses cross this API as raw `struct sockaddr` bytes, exactly
//! as the kernel reads and writes them. They are copied into a
//! `sockaddr_storage` before each call, so callers never need to care about
//! alignment.

use std::ffi::{CStr, CString};
use std::mem::{self, MaybeUninit};
use std::net::SocketAddrV4;
use std::os::unix::io::RawFd;
use std::ptr;

use nix::errno::Errno;
use tracing::trace;

use crate::error::{cvt, SysError, SysResult};

/// Default `listen` backlog.
pub const BACKLOG: i32 = 32;

/// Default datagram buffer size for [`recv1`] / [`send1`]: room for a
/// 1024-byte payload plus envelope.
pub const BUFSIZE1: usize = 1280;

/// Extra flag for [`recv1`] / [`send1`]: the socket is connected, no peer
/// address is used or returned. Stripped before the flags reach the kernel.
pub const IGNORE_SA: i32 = 0x0100_0000;

const STORAGE_LEN: usize = mem::size_of::<libc::sockaddr_storage>();

fn storage_from_bytes(addr: &[u8]) -> SysResult<(libc::sockaddr_storage, libc::socklen_t)> {
    if addr.len() > STORAGE_LEN {
        return Err(SysError::Os(Errno::EINVAL));
    }
    // SAFETY: sockaddr_storage is plain old data; all-zero is valid.
    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
    // SAFETY: addr.len() <= size of storage, regions do not overlap.
    unsafe {
        ptr::copy_nonoverlapping(
            addr.as_ptr(),
            (&mut storage as *mut libc::sockaddr_storage).cast::<u8>(),
            addr.len(),
        )
    };
    Ok((storage, addr.len() as libc::socklen_t))
}

fn storage_to_bytes(storage: &libc::sockaddr_storage, len: libc::socklen_t) -> Vec<u8> {
    let len = (len as usize).min(STORAGE_LEN);
    // SAFETY: storage is readable for STORAGE_LEN bytes and len is clamped.
    unsafe {
        std::slice::from_raw_parts((storage as *const libc::sockaddr_storage).cast::<u8>(), len)
    }
    .to_vec()
}

/// Run a call that fills in a socket address, returning its raw bytes.
fn with_sockaddr_out<F>(f: F) -> SysResult<(libc::c_int, Vec<u8>)>
where
    F: FnOnce(*mut libc::sockaddr, *mut libc::socklen_t) -> libc::c_int,
{
    // SAFETY: zeroed sockaddr_storage is valid.
    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = STORAGE_LEN as libc::socklen_t;
    let ret = cvt(f(
        (&mut storage as *mut libc::sockaddr_storage).cast(),
        &mut len,
    ))?;
    Ok((ret, storage_to_bytes(&storage, len)))
}

pub fn socket(domain: i32, ty: i32, protocol: i32) -> SysResult<RawFd> {
    // SAFETY: integer-only arguments.
    let fd = cvt(unsafe { libc::socket(domain, ty, protocol) })?;
    trace!(domain, ty, protocol, fd, "socket");
    Ok(fd)
}

/// setsockopt with an `int` option value.
pub fn setsockopt_int(fd: RawFd, level: i32, optname: i32, value: i32) -> SysResult<()> {
    // SAFETY: value lives across the call and its size is passed.
    cvt(unsafe {
        libc::setsockopt(
            fd,
            level,
            optname,
            (&value as *const i32).cast(),
            mem::size_of::<i32>() as libc::socklen_t,
        )
    })?;
    Ok(())
}

pub fn bind(fd: RawFd, addr: &[u8]) -> SysResult<()> {
    let (storage, len) = storage_from_bytes(addr)?;
    // SAFETY: storage holds len valid address bytes.
    cvt(unsafe { libc::bind(fd, (&storage as *const libc::sockaddr_storage).cast(), len) })?;
    Ok(())
}

pub fn listen(fd: RawFd, backlog: i32) -> SysResult<()> {
    // SAFETY: integer-only arguments.
    cvt(unsafe { libc::listen(fd, backlog) })?;
    Ok(())
}

/// Accept a connection, returning the connected socket.
pub fn accept(fd: RawFd) -> SysResult<RawFd> {
    // SAFETY: the closure receives valid storage/len pointers.
    let (cfd, _peer) = with_sockaddr_out(|sa, len| unsafe { libc::accept(fd, sa, len) })?;
    Ok(cfd)
}

pub fn connect(fd: RawFd, addr: &[u8]) -> SysResult<()> {
    let (storage, len) = storage_from_bytes(addr)?;
    // SAFETY: storage holds len valid address bytes.
    cvt(unsafe { libc::connect(fd, (&storage as *const libc::sockaddr_storage).cast(), len) })?;
    Ok(())
}

/// Receive into `buf`. Returns the byte count and the sender address.
pub fn recvfrom(fd: RawFd, buf: &mut [u8], flags: i32) -> SysResult<(usize, Vec<u8>)> {
    // SAFETY: zeroed sockaddr_storage is valid.
    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = STORAGE_LEN as libc::socklen_t;
    // SAFETY: buf is writable for buf.len() bytes, storage/len are valid.
    let n = cvt(unsafe {
        libc::recvfrom(
            fd,
            buf.as_mut_ptr().cast(),
            buf.len(),
            flags,
            (&mut storage as *mut libc::sockaddr_storage).cast(),
            &mut len,
        )
    })?;
    Ok((n as usize, storage_to_bytes(&storage, len)))
}

/// Send `data` to `addr`. Returns the number of bytes sent.
pub fn sendto(fd: RawFd, data: &[u8], flags: i32, addr: &[u8]) -> SysResult<usize> {
    let (storage, len) = storage_from_bytes(addr)?;
    // SAFETY: data is readable for data.len() bytes; storage holds len bytes.
    let n = cvt(unsafe {
        libc::sendto(
            fd,
            data.as_ptr().cast(),
            data.len(),
            flags,
            (&storage as *const libc::sockaddr_storage).cast(),
            len,
        )
    })?;
    Ok(n as usize)
}

/// Receive one small datagram of at most `bufsize` bytes.
///
/// With [`IGNORE_SA`] in `flags`, plain `recv` is used and no address is
/// returned.
pub fn recv1(fd: RawFd, flags: i32, bufsize: usize) -> SysResult<(Vec<u8>, Option<Vec<u8>>)> {
    let mut buf = vec![0u8; bufsize];
    if flags & IGNORE_SA != 0 {
        // SAFETY: buf is writable for buf.len() bytes.
        let n = cvt(unsafe {
            libc::recv(fd, buf.as_mut_ptr().cast(), buf.len(), flags & !IGNORE_SA)
        })?;
        buf.truncate(n as usize);
        return Ok((buf, None));
    }
    let (n, addr) = recvfrom(fd, &mut buf, flags)?;
    buf.truncate(n);
    Ok((buf, Some(addr)))
}

/// Send one small datagram.
///
/// With [`IGNORE_SA`] in `flags` (or no address), the socket must be
/// connected and plain `send` is used.
pub fn send1(fd: RawFd, data: &[u8], flags: i32, addr: Option<&[u8]>) -> SysResult<usize> {
    match addr {
        Some(addr) if flags & IGNORE_SA == 0 => sendto(fd, data, flags, addr),
        _ => {
            // SAFETY: data is readable for data.len() bytes.
            let n = cvt(unsafe {
                libc::send(fd, data.as_ptr().cast(), data.len(), flags & !IGNORE_SA)
            })?;
            Ok(n as usize)
        }
    }
}

/// Local address the socket is bound to.
pub fn getsockname(fd: RawFd) -> SysResult<Vec<u8>> {
    // SAFETY: the closure receives valid storage/len pointers.
    let (_, addr) = with_sockaddr_out(|sa, len| unsafe { libc::getsockname(fd, sa, len) })?;
    Ok(addr)
}

/// Address of the connected peer.
pub fn getpeername(fd: RawFd) -> SysResult<Vec<u8>> {
    // SAFETY: the closure receives valid storage/len pointers.
    let (_, addr) = with_sockaddr_out(|sa, len| unsafe { libc::getpeername(fd, sa, len) })?;
    Ok(addr)
}

/// Resolve `host`/`service` into raw socket addresses (IPv4 and IPv6).
///
/// Failures carry the `EAI_*` code as [`SysError::Resolver`].
pub fn getaddrinfo(host: &CStr, service: &CStr, flags: i32) -> SysResult<Vec<Vec<u8>>> {
    // SAFETY: zeroed addrinfo is a valid "no hints" value.
    let mut hints: libc::addrinfo = unsafe { mem::zeroed() };
    hints.ai_flags = flags;
    hints.ai_family = libc::AF_UNSPEC;

    let mut result = MaybeUninit::<*mut libc::addrinfo>::uninit();
    // SAFETY: host/service are NUL-terminated; result receives the list.
    let code =
        unsafe { libc::getaddrinfo(host.as_ptr(), service.as_ptr(), &hints, result.as_mut_ptr()) };
    if code != 0 {
        return Err(SysError::Resolver { code });
    }

    let mut addrs = Vec::new();
    // SAFETY: on success result points to a linked list owned by libc,
    // released below with freeaddrinfo.
    unsafe {
        let head = result.assume_init();
        let mut rp = head;
        while !rp.is_null() {
            let ai = &*rp;
            if !ai.ai_addr.is_null() {
                let bytes =
                    std::slice::from_raw_parts(ai.ai_addr.cast::<u8>(), ai.ai_addrlen as usize);
                addrs.push(bytes.to_vec());
            }
            rp = ai.ai_next;
        }
        libc::freeaddrinfo(head);
    }
    Ok(addrs)
}

/// Convert a raw socket address into `(host, port)` strings.
///
/// With `numeric`, the host is returned in numeric form. The port is always
/// numeric.
pub fn getnameinfo(addr: &[u8], numeric: bool) -> SysResult<(String, String)> {
    let (storage, len) = storage_from_bytes(addr)?;
    let mut host = [0 as libc::c_char; 512];
    let mut serv = [0 as libc::c_char; 16];
    let flags = if numeric { libc::NI_NUMERICHOST } else { 0 } | libc::NI_NUMERICSERV;
    // SAFETY: output buffers and their sizes are passed together.
    let code = unsafe {
        libc::getnameinfo(
            (&storage as *const libc::sockaddr_storage).cast(),
            len,
            host.as_mut_ptr(),
            host.len() as libc::socklen_t,
            serv.as_mut_ptr(),
            serv.len() as libc::socklen_t,
            flags,
        )
    };
    if code != 0 {
        return Err(SysError::Resolver { code });
    }
    // SAFETY: getnameinfo NUL-terminates both buffers on success.
    let (host, serv) = unsafe {
        (
            CStr::from_ptr(host.as_ptr()).to_string_lossy().into_owned(),
            CStr::from_ptr(serv.as_ptr()).to_string_lossy().into_owned(),
        )
    };
    Ok((host, serv))
}

/// Raw `struct sockaddr_in` bytes for an IPv4 socket address.
pub fn sockaddr_v4(addr: SocketAddrV4) -> Vec<u8> {
    // SAFETY: zeroed sockaddr_in is valid.
    let mut sin: libc::sockaddr_in = unsafe { mem::zeroed() };
    sin.sin_family = libc::AF_INET as libc::sa_family_t;
    sin.sin_port = addr.port().to_be();
    sin.sin_addr = libc::in_addr {
        s_addr: u32::from_ne_bytes(addr.ip().octets()),
    };
    // SAFETY: sockaddr_in is plain old data.
    unsafe {
        std::slice::from_raw_parts(
            (&sin as *const libc::sockaddr_in).cast::<u8>(),
            mem::size_of::<libc::sockaddr_in>(),
        )
    }
    .to_vec()
}

/// Resolve with numeric host and service only; never touches DNS.
pub fn resolve_numeric(host: &str, port: u16) -> SysResult<Vec<Vec<u8>>> {
    let host = CString::new(host).map_err(|_| SysError::Os(Errno::EINVAL))?;
    let service = CString::new(port.to_string()).map_err(|_| SysError::Os(Errno::EINVAL))?;
    getaddrinfo(&host, &service, libc::AI_NUMERICHOST | libc::AI_NUMERICSERV)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io;
    use std::net::Ipv4Addr;

    fn loopback_any() -> Vec<u8> {
        sockaddr_v4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))
    }

    #[test]
    fn test_udp_send1_recv1() {
        let server = socket(libc::AF_INET, libc::SOCK_DGRAM, 0).unwrap();
        bind(server, &loopback_any()).unwrap();
        let server_addr = getsockname(server).unwrap();

        // bound explicitly so getsockname reports 127.0.0.1, not 0.0.0.0
        let client = socket(libc::AF_INET, libc::SOCK_DGRAM, 0).unwrap();
        bind(client, &loopback_any()).unwrap();
        assert_eq!(send1(client, b"ping", 0, Some(&server_addr)).unwrap(), 4);

        let (data, from) = recv1(server, 0, BUFSIZE1).unwrap();
        assert_eq!(data, b"ping");
        let from = from.unwrap();
        assert_eq!(from, getsockname(client).unwrap());

        // connected reply path
        connect(server, &from).unwrap();
        assert_eq!(send1(server, b"pong", IGNORE_SA, None).unwrap(), 4);
        let (data, from) = recv1(client, IGNORE_SA, BUFSIZE1).unwrap();
        assert_eq!(data, b"pong");
        assert!(from.is_none());

        io::close(server).unwrap();
        io::close(client).unwrap();
    }

    #[test]
    fn test_tcp_accept_peername() {
        let listener = socket(libc::AF_INET, libc::SOCK_STREAM, 0).unwrap();
        setsockopt_int(listener, libc::SOL_SOCKET, libc::SO_REUSEADDR, 1).unwrap();
        bind(listener, &loopback_any()).unwrap();
        listen(listener, BACKLOG).unwrap();
        let addr = getsockname(listener).unwrap();

        let client = socket(libc::AF_INET, libc::SOCK_STREAM, 0).unwrap();
        connect(client, &addr).unwrap();
        let conn = accept(listener).unwrap();

        assert_eq!(getpeername(conn).unwrap(), getsockname(client).unwrap());
        assert_eq!(getpeername(client).unwrap(), addr);

        io::write(client, b"hello").unwrap();
        let mut buf = [0u8; 8];
        let (n, _) = recvfrom(conn, &mut buf, 0).unwrap();
        assert_eq!(&buf[..n], b"hello");

        for fd in [conn, client, listener] {
            io::close(fd).unwrap();
        }
    }

    #[test]
    fn test_getaddrinfo_getnameinfo_numeric() {
        let _env = crate::env_lock();
        let addrs = resolve_numeric("127.0.0.1", 8080).unwrap();
        assert!(!addrs.is_empty());
        assert!(addrs.contains(&sockaddr_v4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 8080))));

        let (host, port) = getnameinfo(&addrs[0], true).unwrap();
        assert_eq!(host, "127.0.0.1");
        assert_eq!(port, "8080");
    }

    #[test]
    fn test_getaddrinfo_resolver_error() {
        let _env = crate::env_lock();
        let err = resolve_numeric("not-an-address", 80).unwrap_err();
        assert_eq!(err, SysError::Resolver { code: libc::EAI_NONAME });
    }

    #[test]
    fn test_oversized_sockaddr() {
        let fd = socket(libc::AF_INET, libc::SOCK_DGRAM, 0).unwrap();
        let huge = vec![0u8; STORAGE_LEN + 1];
        assert_eq!(bind(fd, &huge), Err(SysError::Os(Errno::EINVAL)));
        io::close(fd).unwrap();
    }

    #[test]
    fn test_socket_bad_domain() {
        assert_eq!(
            socket(-1, libc::SOCK_STREAM, 0),
            Err(SysError::Os(Errno::EAFNOSUPPORT))
        );
    }
}
