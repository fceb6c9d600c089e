use core::fmt;

use crc::{CRC_32_ISO_HDLC, Crc, Digest};

static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Running CRC-32 over any number of non-contiguous byte slices.
pub(crate) struct Crc32Accumulator {
    digest: Digest<'static, u32>,
}

impl Crc32Accumulator {
    pub(crate) fn new() -> Self {
        Self {
            digest: CRC32.digest(),
        }
    }

    pub(crate) fn update(&mut self, bytes: &[u8]) {
        self.digest.update(bytes);
    }

    pub(crate) fn finalize(self) -> u32 {
        self.digest.finalize()
    }
}

impl fmt::Debug for Crc32Accumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Crc32Accumulator").finish_non_exhaustive()
    }
}
