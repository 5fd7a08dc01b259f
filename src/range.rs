use std::io;

use futures::future::BoxFuture;

use crate::uri::BlobLocation;

/// Byte range of a remote object.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ObjectRange {
    pub offset: usize,
    pub length: usize,
}

impl ObjectRange {
    pub fn new(offset: usize, length: usize) -> Self {
        Self { offset, length }
    }
}

pub trait BlobTransfer: Send + Sync + 'static {
    /// Load up to `buf.len()` bytes of the object at `location` starting from `offset` into `buf`.
    ///
    /// Resolves to the number of bytes actually written. Anything short of `buf.len()` is
    /// treated as a failed transfer by the caller.
    fn read_range<'a>(
        &'a self,
        location: &'a BlobLocation,
        offset: u64,
        buf: &'a mut [u8],
    ) -> BoxFuture<'a, io::Result<usize>>;
}
