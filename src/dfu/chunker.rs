//! Object and write-chunk planning for the firmware image.
//!
//! The image is sent as a sequence of data objects no larger than a flash
//! page. Each object is streamed to the packet characteristic in chunks no
//! larger than the link's write limit.

use std::ops::Range;

/// Layout of the next data object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    /// Absolute offset of the object within the image.
    pub offset: usize,
    pub object_size: usize,
    /// No bytes remain after this object.
    pub is_final_object: bool,
    pub full_chunk_count: usize,
    /// Size of the trailing short chunk, zero if the object divides evenly.
    pub trailing_partial_bytes: usize,
    pub chunk_size: usize,
}

/// Plan the object starting at `bytes_written`.
///
/// Returns `None` once the image is exhausted, or if either size is zero.
pub fn plan_object(
    total_len: usize,
    bytes_written: usize,
    page_size: usize,
    chunk_size: usize,
) -> Option<ChunkPlan> {
    if page_size == 0 || chunk_size == 0 {
        return None;
    }
    let remaining = total_len.checked_sub(bytes_written)?;
    if remaining == 0 {
        return None;
    }

    let object_size = remaining.min(page_size);

    Some(ChunkPlan {
        offset: bytes_written,
        object_size,
        is_final_object: remaining <= page_size,
        full_chunk_count: object_size / chunk_size,
        trailing_partial_bytes: object_size % chunk_size,
        chunk_size,
    })
}

impl ChunkPlan {
    /// Offset one past the object's last byte.
    pub fn end(&self) -> usize {
        self.offset + self.object_size
    }

    /// Number of packet writes needed for this object.
    pub fn chunk_count(&self) -> usize {
        self.full_chunk_count + usize::from(self.trailing_partial_bytes != 0)
    }

    /// Absolute byte ranges of each write, in order.
    pub fn chunks(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        let full = (0..self.full_chunk_count).map(move |index| {
            let start = self.offset + index * self.chunk_size;
            start..start + self.chunk_size
        });
        let trailing = (self.trailing_partial_bytes != 0).then(|| {
            let start = self.offset + self.full_chunk_count * self.chunk_size;
            start..start + self.trailing_partial_bytes
        });
        full.chain(trailing)
    }
}
