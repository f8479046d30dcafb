//! Directories and filesystem metadata.

use std::ffi::CStr;
use std::mem::MaybeUninit;
use std::ptr::NonNull;

use tracing::trace;

use crate::error::{cvt, SysError, SysResult};
use crate::process::set_errno;

/// `d_type` value for a directory entry (`DT_DIR`).
pub const DT_DIR: u8 = libc::DT_DIR;
/// `d_type` value for a regular file (`DT_REG`).
pub const DT_REG: u8 = libc::DT_REG;
/// `d_type` value for a symbolic link (`DT_LNK`).
pub const DT_LNK: u8 = libc::DT_LNK;

/// Open directory stream.
///
/// Closed by [`Dir::close`] or on drop, whichever comes first.
#[derive(Debug)]
pub struct Dir {
    stream: Option<NonNull<libc::DIR>>,
}

impl Dir {
    pub fn open(path: &CStr) -> SysResult<Self> {
        // SAFETY: path is NUL-terminated.
        let dp = unsafe { libc::opendir(path.as_ptr()) };
        match NonNull::new(dp) {
            Some(stream) => {
                trace!(path = ?path, "opendir");
                Ok(Self {
                    stream: Some(stream),
                })
            }
            None => Err(SysError::last()),
        }
    }

    /// Next entry as `(name, d_type)`, or `None` at the end of the directory.
    ///
    /// Reading from a closed stream fails with `EBADF`.
    pub fn read_entry(&mut self) -> SysResult<Option<(Vec<u8>, u8)>> {
        let stream = self.stream.ok_or(SysError::Os(nix::errno::Errno::EBADF))?;
        // readdir signals errors only through errno, so clear it first.
        set_errno(0);
        // SAFETY: stream is an open DIR* owned by self.
        let entry = unsafe { libc::readdir(stream.as_ptr()) };
        if entry.is_null() {
            return match crate::process::errno() {
                0 => Ok(None),
                _ => Err(SysError::last()),
            };
        }
        // SAFETY: readdir returned a valid dirent whose d_name is
        // NUL-terminated; we copy it before the next readdir call.
        let (name, d_type) = unsafe {
            let entry = &*entry;
            (
                CStr::from_ptr(entry.d_name.as_ptr()).to_bytes().to_vec(),
                entry.d_type,
            )
        };
        Ok(Some((name, d_type)))
    }

    /// Close the stream. Closing twice fails with `EBADF`.
    pub fn close(&mut self) -> SysResult<()> {
        let stream = self
            .stream
            .take()
            .ok_or(SysError::Os(nix::errno::Errno::EBADF))?;
        // SAFETY: stream was returned by opendir and is closed exactly once.
        cvt(unsafe { libc::closedir(stream.as_ptr()) })?;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }
}

impl Drop for Dir {
    fn drop(&mut self) {
        if self.stream.is_some() {
            let _ = self.close();
        }
    }
}

/// Target of a symbolic link, as raw bytes.
pub fn readlink(path: &CStr, bufsize: usize) -> SysResult<Vec<u8>> {
    let mut buf = vec![0u8; bufsize.max(1)];
    // SAFETY: buf is writable for buf.len() bytes.
    let n = cvt(unsafe { libc::readlink(path.as_ptr(), buf.as_mut_ptr().cast(), buf.len()) })?;
    buf.truncate(n as usize);
    Ok(buf)
}

/// Fields of `struct stat`, times in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileStat {
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub size: i64,
    pub blksize: i64,
    pub blocks: i64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

impl FileStat {
    /// Values in `struct stat` order, as handed to the host.
    pub fn to_array(&self) -> [i64; 13] {
        [
            self.dev as i64,
            self.ino as i64,
            self.mode as i64,
            self.nlink as i64,
            self.uid as i64,
            self.gid as i64,
            self.rdev as i64,
            self.size,
            self.blksize,
            self.blocks,
            self.atime,
            self.mtime,
            self.ctime,
        ]
    }

    pub fn file_type(&self) -> u32 {
        self.mode & libc::S_IFMT
    }

    pub fn is_dir(&self) -> bool {
        self.file_type() == libc::S_IFDIR
    }

    pub fn is_symlink(&self) -> bool {
        self.file_type() == libc::S_IFLNK
    }
}

impl From<&libc::stat> for FileStat {
    fn from(st: &libc::stat) -> Self {
        Self {
            dev: st.st_dev as u64,
            ino: st.st_ino as u64,
            mode: st.st_mode as u32,
            nlink: st.st_nlink as u64,
            uid: st.st_uid as u32,
            gid: st.st_gid as u32,
            rdev: st.st_rdev as u64,
            size: st.st_size as i64,
            blksize: st.st_blksize as i64,
            blocks: st.st_blocks as i64,
            atime: st.st_atime as i64,
            mtime: st.st_mtime as i64,
            ctime: st.st_ctime as i64,
        }
    }
}

/// `lstat(2)`, or `stat(2)` when `follow` is set.
pub fn stat(path: &CStr, follow: bool) -> SysResult<FileStat> {
    let mut st = MaybeUninit::<libc::stat>::uninit();
    // SAFETY: st is a writable stat buffer; it is initialized on success.
    let st = unsafe {
        if follow {
            cvt(libc::stat(path.as_ptr(), st.as_mut_ptr()))?;
        } else {
            cvt(libc::lstat(path.as_ptr(), st.as_mut_ptr()))?;
        }
        st.assume_init()
    };
    Ok(FileStat::from(&st))
}

/// Short form of [`stat`]: `(mode, size, mtime)`.
pub fn lstat3(path: &CStr, follow: bool) -> SysResult<(u32, i64, i64)> {
    let st = stat(path, follow)?;
    Ok((st.mode, st.size, st.mtime))
}

pub fn symlink(target: &CStr, linkpath: &CStr) -> SysResult<()> {
    // SAFETY: both paths are NUL-terminated.
    cvt(unsafe { libc::symlink(target.as_ptr(), linkpath.as_ptr()) })?;
    Ok(())
}

pub fn mkdir(path: &CStr, mode: u32) -> SysResult<()> {
    // SAFETY: path is NUL-terminated.
    cvt(unsafe { libc::mkdir(path.as_ptr(), mode as libc::mode_t) })?;
    Ok(())
}

pub fn rmdir(path: &CStr) -> SysResult<()> {
    // SAFETY: path is NUL-terminated.
    cvt(unsafe { libc::rmdir(path.as_ptr()) })?;
    Ok(())
}
