//! CRC-32 checksum engine.
//!
//! Standard reflected CRC-32 (ISO-HDLC: polynomial 0x04C11DB7, init and
//! final XOR 0xFFFFFFFF), the value the Secure DFU bootloader reports for
//! an object.

use crc::{Crc, Digest, CRC_32_ISO_HDLC};

static CRC_32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Calculate the CRC-32 of `data`.
///
/// Use a sub-slice (`&buffer[..length]`) to checksum a prefix.
pub fn crc32(data: &[u8]) -> u32 {
    CRC_32.checksum(data)
}

/// Incremental CRC-32 hasher.
///
/// Feeding the same bytes in any split yields the same value as [`crc32`].
#[derive(Clone)]
pub struct Crc32 {
    digest: Digest<'static, u32>,
}

impl Crc32 {
    pub fn new() -> Self {
        Self {
            digest: CRC_32.digest(),
        }
    }

    /// Feed more bytes into the running checksum.
    pub fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    /// Checksum of everything fed so far. Does not reset the hasher.
    pub fn finalize(&self) -> u32 {
        self.digest.clone().finalize()
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Crc32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crc32")
            .field("value", &self.finalize())
            .finish()
    }
}
