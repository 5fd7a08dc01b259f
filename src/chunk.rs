use std::{ptr::NonNull, slice};

use crate::range::ObjectRange;

/// Sub range of one request, `offset` is absolute within the object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkRange {
    pub offset: usize,
    pub length: usize,
}

///
/// Splits `range` into chunks of `chunk_size` bytes.
///
/// There are `max(1, range.length / chunk_size)` chunks and the last one absorbs
/// the remainder, so it may be up to almost twice `chunk_size` long. For example
/// 10 bytes with a chunk size of 4 gives `[4, 6]`, not `[4, 4, 2]`.
///
/// `range.offset + range.length` must not overflow.
pub fn chunk_ranges(range: ObjectRange, chunk_size: usize) -> Vec<ChunkRange> {
    assert!(chunk_size > 0, "chunk size must be positive");

    let count = usize::max(1, range.length / chunk_size);
    let mut chunks = Vec::with_capacity(count);

    let mut offset = range.offset;
    let mut remaining = range.length;

    for i in 0..count {
        let length = if i == count - 1 { remaining } else { chunk_size };
        chunks.push(ChunkRange { offset, length });

        if i + 1 < count {
            offset += length;
            remaining -= length;
        }
    }

    chunks
}

///
/// Caller owned memory that receives one request.
///
/// Only ever handed out as disjoint [`ChunkBuffer`]s through [`partition`].
pub struct DestinationBuffer {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the buffer is exclusively owned by the request for its lifetime
unsafe impl Send for DestinationBuffer {}

impl DestinationBuffer {
    ///
    /// # Safety
    /// - `ptr` must be valid for writes of `len` bytes until the request it is
    ///   submitted with reports its terminal completion (or its session is removed).
    /// - Nothing else may read or write that memory in the meantime.
    ///
    /// Returns `None` for a null pointer with a non zero length.
    pub unsafe fn from_raw_parts(ptr: *mut u8, len: usize) -> Option<Self> {
        let ptr = match NonNull::new(ptr) {
            Some(ptr) => ptr,
            None if len == 0 => NonNull::dangling(),
            None => return None,
        };

        Some(Self { ptr, len })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn split_at(self, mid: usize) -> (Self, Self) {
        assert!(mid <= self.len);

        // SAFETY: mid is within the allocation
        let tail = unsafe { NonNull::new_unchecked(self.ptr.as_ptr().add(mid)) };

        (
            Self {
                ptr: self.ptr,
                len: mid,
            },
            Self {
                ptr: tail,
                len: self.len - mid,
            },
        )
    }
}

/// Exclusive slice of a [`DestinationBuffer`] for one chunk.
pub struct ChunkBuffer(DestinationBuffer);

impl ChunkBuffer {
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.len == 0
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: chunk buffers never overlap and the owner guaranteed validity
        unsafe { slice::from_raw_parts_mut(self.0.ptr.as_ptr(), self.0.len) }
    }
}

pub struct Chunk {
    pub index: usize,
    pub range: ChunkRange,
    pub buf: ChunkBuffer,
}

///
/// Splits `buffer` along [`chunk_ranges`] of `range`.
///
/// The resulting slices are disjoint and cover the buffer exactly once.
pub fn partition(range: ObjectRange, chunk_size: usize, buffer: DestinationBuffer) -> Vec<Chunk> {
    assert_eq!(
        buffer.len(),
        range.length,
        "destination buffer must cover the whole range"
    );

    let ranges = chunk_ranges(range, chunk_size);
    let mut chunks = Vec::with_capacity(ranges.len());
    let mut rest = buffer;

    for (index, range) in ranges.into_iter().enumerate() {
        let (head, tail) = rest.split_at(range.length);
        rest = tail;

        chunks.push(Chunk {
            index,
            range,
            buf: ChunkBuffer(head),
        });
    }

    chunks
}
