//! # l5-mb
//!
//! Scratch memory buffer for marshalling data into and out of system calls.
//!
//! A [`MemBuf`] is a fixed-size, zero-initialized block whose size is a
//! multiple of 8. Bytes are addressed from offset 0. The block can also be
//! viewed as an array of native-endian `i64` values, one every 8 bytes.
//!
//! ## Layout
//!
//! ```text
//! offset:  0        8        16       24
//!          ├────────┼────────┼────────┤
//!          │ i64 #0 │ i64 #1 │ i64 #2 │   geti(0), geti(8), geti(16)
//!          └────────┴────────┴────────┘
//! ```
//!
//! The backing storage is 8-byte aligned, so the block can be handed to the
//! kernel as an array of C structures (`struct pollfd`, ioctl arguments).

use std::fmt;

use thiserror::Error;

/// Width of the integer view, in bytes.
pub const INT_SIZE: usize = std::mem::size_of::<i64>();

/// Errors raised by buffer accessors.
///
/// These are programming errors on the caller side, never OS failures.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    #[error("buffer size must be a positive multiple of 8 (got {size})")]
    InvalidSize { size: usize },

    #[error("out of range: [{offset}, {offset}+{len}) exceeds buffer size {size}")]
    OutOfRange {
        offset: usize,
        len: usize,
        size: usize,
    },

    #[error("unaligned access at offset {offset}")]
    Unaligned { offset: usize },
}

pub type Result<T> = std::result::Result<T, BufferError>;

/// Fixed-size zeroed scratch buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct MemBuf {
    words: Box<[u64]>,
}

impl MemBuf {
    /// Allocate a zeroed buffer of exactly `size` bytes.
    ///
    /// `size` must be a positive multiple of 8.
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 || size % INT_SIZE != 0 {
            return Err(BufferError::InvalidSize { size });
        }
        Ok(Self {
            words: vec![0u64; size / INT_SIZE].into_boxed_slice(),
        })
    }

    /// Buffer size in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.words.len() * INT_SIZE
    }

    /// Always false: a buffer holds at least 8 bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// The whole block as bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: u64 storage reinterpreted as bytes, same allocation and
        // total length; u8 has no invalid bit patterns and weaker alignment.
        unsafe { std::slice::from_raw_parts(self.words.as_ptr().cast::<u8>(), self.len()) }
    }

    /// The whole block as mutable bytes.
    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        let len = self.len();
        // SAFETY: see `as_bytes`; the exclusive borrow of `self` covers the
        // returned slice.
        unsafe { std::slice::from_raw_parts_mut(self.words.as_mut_ptr().cast::<u8>(), len) }
    }

    /// Raw pointer to the first byte, for passing the block to a syscall.
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.words.as_mut_ptr().cast::<u8>()
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<()> {
        let size = self.len();
        match offset.checked_add(len) {
            Some(end) if end <= size => Ok(()),
            _ => Err(BufferError::OutOfRange { offset, len, size }),
        }
    }

    fn check_int(&self, offset: usize) -> Result<()> {
        if offset % INT_SIZE != 0 {
            return Err(BufferError::Unaligned { offset });
        }
        self.check_range(offset, INT_SIZE)
    }

    /// Return `len` bytes starting at `offset`.
    pub fn get(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.check_range(offset, len)?;
        Ok(&self.as_bytes()[offset..offset + len])
    }

    /// Checked mutable window of `len` bytes at `offset`.
    ///
    /// Used to hand part of the buffer to `read`, `recvfrom` and friends.
    pub fn slice_mut(&mut self, offset: usize, len: usize) -> Result<&mut [u8]> {
        self.check_range(offset, len)?;
        Ok(&mut self.as_bytes_mut()[offset..offset + len])
    }

    /// Copy `data` into the buffer at `offset`.
    pub fn set(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        self.slice_mut(offset, data.len())?.copy_from_slice(data);
        Ok(())
    }

    /// Read the native-endian `i64` stored at `offset`.
    ///
    /// `offset` must be 8-byte aligned and inside the buffer.
    pub fn geti(&self, offset: usize) -> Result<i64> {
        self.check_int(offset)?;
        Ok(self.words[offset / INT_SIZE] as i64)
    }

    /// Store `value` as a native-endian `i64` at `offset`.
    pub fn seti(&mut self, offset: usize, value: i64) -> Result<()> {
        self.check_int(offset)?;
        self.words[offset / INT_SIZE] = value as u64;
        Ok(())
    }

    /// Fill the whole buffer with zero bytes.
    pub fn zero(&mut self) {
        self.words.fill(0);
    }
}

impl fmt::Debug for MemBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemBuf").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_new_is_zeroed() {
        for size in [8, 16, 64, 4096] {
            let mb = MemBuf::new(size).unwrap();
            assert_eq!(mb.len(), size);
            assert!(mb.get(0, size).unwrap().iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn test_invalid_size() {
        for size in [0, 1, 7, 9, 1001] {
            assert_eq!(
                MemBuf::new(size).unwrap_err(),
                BufferError::InvalidSize { size }
            );
        }
    }

    #[test]
    fn test_set_get_roundtrip() {
        let mut mb = MemBuf::new(32).unwrap();
        mb.set(3, b"hello").unwrap();
        assert_eq!(mb.get(3, 5).unwrap(), b"hello");
        assert_eq!(mb.get(0, 3).unwrap(), &[0u8, 0, 0]);
        // write ending exactly at the last byte
        mb.set(29, b"end").unwrap();
        assert_eq!(mb.get(29, 3).unwrap(), b"end");
    }

    #[test]
    fn test_out_of_range() {
        let mut mb = MemBuf::new(16).unwrap();
        assert!(matches!(
            mb.get(10, 7),
            Err(BufferError::OutOfRange { offset: 10, len: 7, size: 16 })
        ));
        assert!(matches!(mb.set(15, b"ab"), Err(BufferError::OutOfRange { .. })));
        assert!(matches!(mb.get(usize::MAX, 2), Err(BufferError::OutOfRange { .. })));
        // zero-length read at the end is fine
        assert_eq!(mb.get(16, 0).unwrap(), b"");
    }

    #[test]
    fn test_int_access() {
        let mut mb = MemBuf::new(24).unwrap();
        mb.seti(8, -42).unwrap();
        mb.seti(16, i64::MAX).unwrap();
        assert_eq!(mb.geti(0).unwrap(), 0);
        assert_eq!(mb.geti(8).unwrap(), -42);
        assert_eq!(mb.geti(16).unwrap(), i64::MAX);
        assert_eq!(mb.get(8, 8).unwrap(), &(-42i64).to_ne_bytes());
    }

    #[test]
    fn test_int_unaligned() {
        let mut mb = MemBuf::new(64).unwrap();
        for offset in [1, 3, 7, 9, 63, 1001] {
            assert_eq!(mb.geti(offset), Err(BufferError::Unaligned { offset }));
            assert_eq!(mb.seti(offset, 1), Err(BufferError::Unaligned { offset }));
        }
    }

    #[test]
    fn test_int_out_of_range() {
        let mut mb = MemBuf::new(16).unwrap();
        assert!(matches!(mb.geti(16), Err(BufferError::OutOfRange { .. })));
        assert!(matches!(mb.seti(64, 1), Err(BufferError::OutOfRange { .. })));
    }

    #[test]
    fn test_zero() {
        let mut mb = MemBuf::new(16).unwrap();
        mb.set(0, &[0xff; 16]).unwrap();
        mb.zero();
        assert_eq!(mb.get(0, 16).unwrap(), &[0u8; 16]);
    }

    #[test]
    fn test_storage_aligned() {
        let mut mb = MemBuf::new(8).unwrap();
        assert_eq!(mb.as_mut_ptr() as usize % INT_SIZE, 0);
    }

    proptest! {
        #[test]
        fn prop_set_get_in_range_roundtrip(
            words in 1usize..32,
            offset in 0usize..300,
            data in proptest::collection::vec(any::<u8>(), 0..300),
        ) {
            let size = words * INT_SIZE;
            let len = data.len();
            let mut mb = MemBuf::new(size).unwrap();
            if offset + len <= size {
                mb.set(offset, &data).unwrap();
                prop_assert_eq!(mb.get(offset, len).unwrap(), &data[..]);
            } else {
                let err = BufferError::OutOfRange { offset, len, size };
                prop_assert_eq!(mb.set(offset, &data), Err(err));
                prop_assert_eq!(mb.get(offset, len), Err(err));
                // a rejected write leaves the buffer untouched
                prop_assert!(mb.as_bytes().iter().all(|&b| b == 0));
            }
        }

        #[test]
        fn prop_int_access(
            words in 1usize..32,
            offset in 0usize..300,
            value in any::<i64>(),
        ) {
            let size = words * INT_SIZE;
            let mut mb = MemBuf::new(size).unwrap();
            if offset % INT_SIZE != 0 {
                prop_assert_eq!(mb.seti(offset, value), Err(BufferError::Unaligned { offset }));
                prop_assert_eq!(mb.geti(offset), Err(BufferError::Unaligned { offset }));
            } else if offset + INT_SIZE > size {
                let err = BufferError::OutOfRange { offset, len: INT_SIZE, size };
                prop_assert_eq!(mb.seti(offset, value), Err(err));
                prop_assert_eq!(mb.geti(offset), Err(err));
            } else {
                mb.seti(offset, value).unwrap();
                prop_assert_eq!(mb.geti(offset).unwrap(), value);
                prop_assert_eq!(mb.get(offset, INT_SIZE).unwrap(), &value.to_ne_bytes()[..]);
            }
        }

        #[test]
        fn prop_zero_clears_everything(
            words in 1usize..32,
            fill in any::<u8>(),
        ) {
            let size = words * INT_SIZE;
            let mut mb = MemBuf::new(size).unwrap();
            mb.set(0, &vec![fill; size]).unwrap();
            mb.zero();
            prop_assert_eq!(mb.get(0, size).unwrap(), &vec![0u8; size][..]);
        }
    }
}
