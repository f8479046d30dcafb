//! Host function implementations.
//!
//! Each entry unpacks its arguments, calls one typed wrapper and packs the
//! outcome. Optional arguments fall back to the [`Config`] defaults.

use l5_mb::{BufferError, MemBuf};
use tracing::trace;

use super::{Args, CallError, CallResult, HostFn, Value};
use crate::config::Config;
use crate::error::SysResult;
use crate::fs::{self, Dir};
use crate::{env, io, ioctl, mount, net, poll, process};

pub(super) const FUNCTIONS: &[(&str, HostFn)] = &[
    ("mbnew", mbnew),
    // process, environment
    ("getpid", getpid),
    ("getppid", getppid),
    ("geteuid", geteuid),
    ("getegid", getegid),
    ("errno", errno),
    ("chdir", chdir),
    ("getcwd", getcwd),
    ("setenv", setenv),
    ("unsetenv", unsetenv),
    ("environ", environ),
    ("msleep", msleep),
    ("fork", fork),
    ("waitpid", waitpid),
    ("kill", kill),
    ("execve", execve),
    // basic I/O
    ("open", open),
    ("close", close),
    ("read", read),
    ("read4k", read4k),
    ("write", write),
    ("dup2", dup2),
    // directories, filesystem
    ("opendir", opendir),
    ("readdir", readdir),
    ("closedir", closedir),
    ("readlink", readlink),
    ("lstat3", lstat3),
    ("lstat", lstat),
    ("symlink", symlink),
    ("mkdir", mkdir),
    ("rmdir", rmdir),
    ("mount", mount),
    ("umount", umount),
    // ioctl, poll
    ("ioctl", ioctl),
    ("ioctl_int", ioctl_int),
    ("poll", poll),
    ("pollin", pollin),
    // sockets
    ("socket", socket),
    ("setsockopt", setsockopt),
    ("bind", bind),
    ("listen", listen),
    ("accept", accept),
    ("connect", connect),
    ("recvfrom", recvfrom),
    ("sendto", sendto),
    ("recv1", recv1),
    ("send1", send1),
    ("getsockname", getsockname),
    ("getpeername", getpeername),
    ("getaddrinfo", getaddrinfo),
    ("getnameinfo", getnameinfo),
];

pub(super) const BUFFER_METHODS: &[(&str, HostFn)] = &[
    ("get", mb_get),
    ("set", mb_set),
    ("geti", mb_geti),
    ("seti", mb_seti),
    ("zero", mb_zero),
];

// ============================================================================
// Result packing
// ============================================================================

fn sys<T>(res: SysResult<T>, ok: impl FnOnce(T) -> Vec<Value>) -> CallResult {
    Ok(match res {
        Ok(v) => ok(v),
        Err(e) => {
            trace!(code = e.code(), error = %e, "syscall failed");
            vec![Value::Nil, Value::Int(i64::from(e.code()))]
        }
    })
}

fn done(res: SysResult<()>) -> CallResult {
    sys(res, |()| vec![Value::Bool(true)])
}

fn int<T: Into<i64>>(res: SysResult<T>) -> CallResult {
    sys(res, |v| vec![Value::Int(v.into())])
}

fn bytes(res: SysResult<Vec<u8>>) -> CallResult {
    sys(res, |b| vec![Value::Str(b)])
}

// ============================================================================
// Scratch buffer
// ============================================================================

fn mbnew(_: &Config, a: &Args<'_>) -> CallResult {
    let mb = MemBuf::new(a.usize(0)?).map_err(CallError::buffer("mbnew"))?;
    Ok(vec![Value::buffer(mb)])
}

fn mb_get(_: &Config, a: &Args<'_>) -> CallResult {
    let mb = a.buffer(0)?;
    let mb = mb.borrow();
    let idx = a.opt_usize(1, 0)?;
    let len = a.opt_usize(2, mb.len().saturating_sub(idx))?;
    let data = mb.get(idx, len).map_err(CallError::buffer("get"))?;
    Ok(vec![Value::str(data)])
}

fn mb_set(_: &Config, a: &Args<'_>) -> CallResult {
    let mb = a.buffer(0)?;
    let idx = a.usize(1)?;
    let data = a.bytes(2)?;
    mb.borrow_mut()
        .set(idx, data)
        .map_err(CallError::buffer("set"))?;
    Ok(vec![Value::Bool(true)])
}

fn mb_geti(_: &Config, a: &Args<'_>) -> CallResult {
    let mb = a.buffer(0)?;
    let idx = a.usize(1)?;
    let v = mb.borrow().geti(idx).map_err(CallError::buffer("geti"))?;
    Ok(vec![Value::Int(v)])
}

fn mb_seti(_: &Config, a: &Args<'_>) -> CallResult {
    let mb = a.buffer(0)?;
    let idx = a.usize(1)?;
    let v = a.int(2)?;
    mb.borrow_mut()
        .seti(idx, v)
        .map_err(CallError::buffer("seti"))?;
    Ok(vec![Value::Bool(true)])
}

fn mb_zero(_: &Config, a: &Args<'_>) -> CallResult {
    a.buffer(0)?.borrow_mut().zero();
    Ok(vec![Value::Bool(true)])
}

// ============================================================================
// Process, environment
// ============================================================================

fn getpid(_: &Config, _: &Args<'_>) -> CallResult {
    Ok(vec![Value::Int(process::getpid().into())])
}

fn getppid(_: &Config, _: &Args<'_>) -> CallResult {
    Ok(vec![Value::Int(process::getppid().into())])
}

fn geteuid(_: &Config, _: &Args<'_>) -> CallResult {
    Ok(vec![Value::Int(process::geteuid().into())])
}

fn getegid(_: &Config, _: &Args<'_>) -> CallResult {
    Ok(vec![Value::Int(process::getegid().into())])
}

/// `errno()` reads errno; `errno(n)` sets it first.
fn errno(_: &Config, a: &Args<'_>) -> CallResult {
    let value = a.opt_i32(0, -1)?;
    if value != -1 {
        process::set_errno(value);
    }
    Ok(vec![Value::Int(process::errno().into())])
}

fn chdir(_: &Config, a: &Args<'_>) -> CallResult {
    done(env::chdir(&a.cstr(0)?))
}

fn getcwd(cfg: &Config, _: &Args<'_>) -> CallResult {
    bytes(env::getcwd(cfg.path_bufsize))
}

fn setenv(_: &Config, a: &Args<'_>) -> CallResult {
    done(env::setenv(&a.cstr(0)?, &a.cstr(1)?))
}

fn unsetenv(_: &Config, a: &Args<'_>) -> CallResult {
    done(env::unsetenv(&a.cstr(0)?))
}

fn environ(_: &Config, _: &Args<'_>) -> CallResult {
    let vars = env::environ()
        .into_iter()
        .map(|var| Value::Str(var.into_bytes()))
        .collect();
    Ok(vec![Value::List(vars)])
}

fn msleep(_: &Config, a: &Args<'_>) -> CallResult {
    done(process::msleep(a.usize(0)? as u64))
}

fn fork(_: &Config, _: &Args<'_>) -> CallResult {
    int(process::fork())
}

fn waitpid(_: &Config, a: &Args<'_>) -> CallResult {
    let pid = a.opt_i32(0, -1)?;
    let options = a.opt_i32(1, 0)?;
    sys(process::waitpid(pid, options), |(pid, status)| {
        vec![Value::Int(pid.into()), Value::Int(status.into())]
    })
}

fn kill(_: &Config, a: &Args<'_>) -> CallResult {
    done(process::kill(a.i32(0)?, a.i32(1)?))
}

/// Returns only on failure.
fn execve(_: &Config, a: &Args<'_>) -> CallResult {
    let path = a.cstr(0)?;
    let argv = a.cstr_list(1)?;
    let envp = a.cstr_list(2)?;
    let err = process::execve(&path, &argv, &envp);
    sys::<()>(Err(err), |()| Vec::new())
}

// ============================================================================
// Basic I/O
// ============================================================================

fn open(_: &Config, a: &Args<'_>) -> CallResult {
    let path = a.cstr(0)?;
    let flags = a.i32(1)?;
    let mode = a.opt_usize(2, 0)? as u32;
    int(io::open(&path, flags, mode))
}

fn close(_: &Config, a: &Args<'_>) -> CallResult {
    done(io::close(a.i32(0)?))
}

/// `read(fd, mb, count [, offset])`: read into the buffer at `offset`.
fn read(_: &Config, a: &Args<'_>) -> CallResult {
    let fd = a.i32(0)?;
    let mb = a.buffer(1)?;
    let count = a.usize(2)?;
    let offset = a.opt_usize(3, 0)?;
    let mut mb = mb.borrow_mut();
    let window = mb
        .slice_mut(offset, count)
        .map_err(CallError::buffer("read"))?;
    sys(io::read(fd, window), |n| vec![Value::Int(n as i64)])
}

fn read4k(_: &Config, a: &Args<'_>) -> CallResult {
    bytes(io::read4k(a.i32(0)?))
}

/// `write(fd, str [, idx [, count]])`: write `count` bytes of `str`
/// starting at 0-based `idx`.
fn write(_: &Config, a: &Args<'_>) -> CallResult {
    let fd = a.i32(0)?;
    let data = a.bytes(1)?;
    let idx = a.opt_usize(2, 0)?;
    let count = a.opt_usize(3, data.len().saturating_sub(idx))?;
    let chunk = idx
        .checked_add(count)
        .and_then(|end| data.get(idx..end))
        .ok_or(CallError::Buffer {
            func: "write",
            source: BufferError::OutOfRange {
                offset: idx,
                len: count,
                size: data.len(),
            },
        })?;
    sys(io::write(fd, chunk), |n| vec![Value::Int(n as i64)])
}

/// `dup2(old [, new])`: plain `dup` when `new` is absent or -1.
fn dup2(_: &Config, a: &Args<'_>) -> CallResult {
    let old = a.i32(0)?;
    let new = Some(a.opt_i32(1, -1)?).filter(|&fd| fd != -1);
    int(io::dup2(old, new))
}

// ============================================================================
// Directories, filesystem
// ============================================================================

fn opendir(_: &Config, a: &Args<'_>) -> CallResult {
    sys(Dir::open(&a.cstr(0)?), |dir| vec![Value::dir(dir)])
}

/// `[name, d_type]`, or `[nil, 0]` at the end of the directory.
fn readdir(_: &Config, a: &Args<'_>) -> CallResult {
    let dir = a.dir(0)?;
    let entry = dir.borrow_mut().read_entry();
    sys(entry, |entry| match entry {
        Some((name, d_type)) => vec![Value::Str(name), Value::Int(d_type.into())],
        None => vec![Value::Nil, Value::Int(0)],
    })
}

fn closedir(_: &Config, a: &Args<'_>) -> CallResult {
    let dir = a.dir(0)?;
    let res = dir.borrow_mut().close();
    done(res)
}

fn readlink(cfg: &Config, a: &Args<'_>) -> CallResult {
    bytes(fs::readlink(&a.cstr(0)?, cfg.path_bufsize))
}

/// `lstat3(path [, statflag])`: `[mode, size, mtime]`. A non-zero
/// `statflag` follows symlinks.
fn lstat3(_: &Config, a: &Args<'_>) -> CallResult {
    let path = a.cstr(0)?;
    let follow = a.opt_int(1, 0)? != 0;
    sys(fs::lstat3(&path, follow), |(mode, size, mtime)| {
        vec![
            Value::Int(mode.into()),
            Value::Int(size),
            Value::Int(mtime),
        ]
    })
}

/// `lstat(path [, tbl] [, statflag])`: all 13 stat fields as a list, in
/// `struct stat` order.
fn lstat(_: &Config, a: &Args<'_>) -> CallResult {
    let path = a.cstr(0)?;
    let flag_pos = if matches!(a.value(1), Value::List(_)) { 2 } else { 1 };
    let follow = a.opt_int(flag_pos, 0)? != 0;
    sys(fs::stat(&path, follow), |st| {
        let fields = st.to_array().into_iter().map(Value::Int).collect();
        vec![Value::List(fields)]
    })
}

fn symlink(_: &Config, a: &Args<'_>) -> CallResult {
    done(fs::symlink(&a.cstr(0)?, &a.cstr(1)?))
}

fn mkdir(_: &Config, a: &Args<'_>) -> CallResult {
    let path = a.cstr(0)?;
    let mode = a.opt_usize(1, 0)? as u32;
    done(fs::mkdir(&path, mode))
}

fn rmdir(_: &Config, a: &Args<'_>) -> CallResult {
    done(fs::rmdir(&a.cstr(0)?))
}

fn mount(_: &Config, a: &Args<'_>) -> CallResult {
    let src = a.cstr(0)?;
    let dest = a.cstr(1)?;
    let fstype = a.cstr(2)?;
    let flags = a.opt_int(3, 0)? as u64;
    let data = match a.opt_bytes(4)? {
        Some(_) => a.cstr(4)?,
        None => Default::default(),
    };
    done(mount::mount(&src, &dest, &fstype, flags, &data))
}

fn umount(_: &Config, a: &Args<'_>) -> CallResult {
    done(mount::umount(&a.cstr(0)?))
}

// ============================================================================
// ioctl, poll
// ============================================================================

/// `ioctl(fd, cmd, arg [, argoutlen])`.
///
/// A buffer `arg` is passed in place and the raw result is returned. A
/// string `arg` is staged in a scratch area; the call returns the first
/// `argoutlen` bytes of that area, or `true` when `argoutlen` is 0.
fn ioctl(cfg: &Config, a: &Args<'_>) -> CallResult {
    let fd = a.i32(0)?;
    let request = a.int(1)? as u64;
    if let Value::Buffer(mb) = a.value(2) {
        let res = ioctl::ioctl_buf(fd, request, &mut mb.borrow_mut());
        return int(res);
    }
    let arg = a.bytes(2)?;
    let argout_len = a.opt_usize(3, 0)?;
    let max = cfg.ioctl_buflen;
    if arg.len() > max {
        return Err(CallError::TooLarge {
            func: "ioctl",
            what: "arg",
            len: arg.len(),
            max,
        });
    }
    if argout_len > max {
        return Err(CallError::TooLarge {
            func: "ioctl",
            what: "argoutlen",
            len: argout_len,
            max,
        });
    }
    let res = ioctl::ioctl_bytes(fd, request, arg, argout_len, max)
        .map_err(CallError::buffer("ioctl"))?;
    sys(res, |out| match out {
        Some(out) => vec![Value::Str(out)],
        None => vec![Value::Bool(true)],
    })
}

fn ioctl_int(_: &Config, a: &Args<'_>) -> CallResult {
    int(ioctl::ioctl_int(a.i32(0)?, a.int(1)? as u64, a.int(2)?))
}

/// `poll(pollset_mb, nfds [, timeout])`.
fn poll(cfg: &Config, a: &Args<'_>) -> CallResult {
    let mb = a.buffer(0)?;
    let nfds = a.usize(1)?;
    let timeout = a.opt_i32(2, cfg.poll_timeout_ms)?;
    let res = poll::poll(&mut mb.borrow_mut(), nfds, timeout).map_err(CallError::buffer("poll"))?;
    sys(res, |n| vec![Value::Int(n as i64)])
}

fn pollin(cfg: &Config, a: &Args<'_>) -> CallResult {
    let fd = a.i32(0)?;
    let timeout = a.opt_i32(1, cfg.poll_timeout_ms)?;
    sys(poll::pollin(fd, timeout), |n| vec![Value::Int(n as i64)])
}

// ============================================================================
// Sockets
// ============================================================================

fn socket(_: &Config, a: &Args<'_>) -> CallResult {
    int(net::socket(a.i32(0)?, a.i32(1)?, a.opt_i32(2, 0)?))
}

fn setsockopt(_: &Config, a: &Args<'_>) -> CallResult {
    done(net::setsockopt_int(a.i32(0)?, a.i32(1)?, a.i32(2)?, a.i32(3)?))
}

fn bind(_: &Config, a: &Args<'_>) -> CallResult {
    done(net::bind(a.i32(0)?, a.bytes(1)?))
}

fn listen(cfg: &Config, a: &Args<'_>) -> CallResult {
    done(net::listen(a.i32(0)?, a.opt_i32(1, cfg.backlog)?))
}

fn accept(_: &Config, a: &Args<'_>) -> CallResult {
    int(net::accept(a.i32(0)?))
}

fn connect(_: &Config, a: &Args<'_>) -> CallResult {
    done(net::connect(a.i32(0)?, a.bytes(1)?))
}

/// `recvfrom(fd, mb, count [, flags])`: `[n, sockaddr]`.
fn recvfrom(_: &Config, a: &Args<'_>) -> CallResult {
    let fd = a.i32(0)?;
    let mb = a.buffer(1)?;
    let count = a.usize(2)?;
    let flags = a.opt_i32(3, 0)?;
    let mut mb = mb.borrow_mut();
    let window = mb
        .slice_mut(0, count)
        .map_err(CallError::buffer("recvfrom"))?;
    sys(net::recvfrom(fd, window, flags), |(n, addr)| {
        vec![Value::Int(n as i64), Value::Str(addr)]
    })
}

/// `sendto(fd, str, flags, sockaddr)`.
fn sendto(_: &Config, a: &Args<'_>) -> CallResult {
    let fd = a.i32(0)?;
    let data = a.bytes(1)?;
    let flags = a.i32(2)?;
    let addr = a.bytes(3)?;
    sys(net::sendto(fd, data, flags, addr), |n| {
        vec![Value::Int(n as i64)]
    })
}

/// `recv1(fd [, flags])`: `[bytes, sockaddr]`, or `[bytes]` with
/// `IGNORE_SA`.
fn recv1(cfg: &Config, a: &Args<'_>) -> CallResult {
    let fd = a.i32(0)?;
    let flags = a.opt_i32(1, 0)?;
    sys(net::recv1(fd, flags, cfg.dgram_bufsize), |(data, addr)| {
        let mut out = vec![Value::Str(data)];
        out.extend(addr.map(Value::Str));
        out
    })
}

/// `send1(fd, str [, flags [, sockaddr]])`. The address is required unless
/// `IGNORE_SA` is set.
fn send1(cfg: &Config, a: &Args<'_>) -> CallResult {
    let fd = a.i32(0)?;
    let data = a.bytes(1)?;
    if data.len() > cfg.dgram_bufsize {
        return Err(CallError::TooLarge {
            func: "send1",
            what: "datagram",
            len: data.len(),
            max: cfg.dgram_bufsize,
        });
    }
    let flags = a.opt_i32(2, 0)?;
    let addr = if flags & net::IGNORE_SA != 0 {
        None
    } else {
        Some(a.bytes(3)?)
    };
    sys(net::send1(fd, data, flags, addr), |n| {
        vec![Value::Int(n as i64)]
    })
}

fn getsockname(_: &Config, a: &Args<'_>) -> CallResult {
    bytes(net::getsockname(a.i32(0)?))
}

fn getpeername(_: &Config, a: &Args<'_>) -> CallResult {
    bytes(net::getpeername(a.i32(0)?))
}

/// `getaddrinfo(host, service [, flags])`: list of raw sockaddrs, or
/// `[nil, EAI_*]`.
fn getaddrinfo(_: &Config, a: &Args<'_>) -> CallResult {
    let host = a.cstr(0)?;
    let service = a.cstr(1)?;
    let flags = a.opt_i32(2, 0)?;
    sys(net::getaddrinfo(&host, &service, flags), |addrs| {
        vec![Value::List(addrs.into_iter().map(Value::Str).collect())]
    })
}

/// `getnameinfo(sockaddr [, numeric])`: `[host, port]`.
fn getnameinfo(_: &Config, a: &Args<'_>) -> CallResult {
    let addr = a.bytes(0)?;
    let numeric = a.truthy(1);
    sys(net::getnameinfo(addr, numeric), |(host, port)| {
        vec![Value::from(host.as_str()), Value::from(port.as_str())]
    })
}
