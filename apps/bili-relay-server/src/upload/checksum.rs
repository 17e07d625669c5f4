//! Chunk integrity tokens
//!
//! The platform expects three tokens per chunk and per file: an MD5 digest,
//! a CRC-32 (IEEE) checksum as 8 lowercase hex digits, and a "hash" that is
//! the MD5 digest again. The relay forwards client-computed tokens untouched;
//! these helpers are for uploads the relay drives itself.

use crc::{Crc, Digest as CrcDigest, CRC_32_ISO_HDLC};
use md5::{Digest, Md5};

/// CRC-32/ISO-HDLC, the zlib/IEEE polynomial
static CRC32_IEEE: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Integrity tokens for one byte range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityTokens {
    pub md5: String,
    pub crc32: String,
    pub hash: String,
}

/// Compute the tokens for a single chunk
pub fn chunk_tokens(data: &[u8]) -> IntegrityTokens {
    let md5 = hex::encode(Md5::digest(data));
    IntegrityTokens {
        crc32: format_crc32(CRC32_IEEE.checksum(data)),
        hash: md5.clone(),
        md5,
    }
}

/// CRC-32 of `data` as the platform formats it
pub fn crc32_hex(data: &[u8]) -> String {
    format_crc32(CRC32_IEEE.checksum(data))
}

fn format_crc32(crc: u32) -> String {
    format!("{:08x}", crc)
}

/// Running whole-file digest, fed chunk by chunk
pub struct FileDigest {
    md5: Md5,
    crc: CrcDigest<'static, u32>,
    bytes: u64,
}

impl FileDigest {
    pub fn new() -> Self {
        Self {
            md5: Md5::new(),
            crc: CRC32_IEEE.digest(),
            bytes: 0,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.md5.update(data);
        self.crc.update(data);
        self.bytes += data.len() as u64;
    }

    /// Bytes fed so far
    pub fn len(&self) -> u64 {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes == 0
    }

    pub fn finalize(self) -> IntegrityTokens {
        let md5 = hex::encode(self.md5.finalize());
        IntegrityTokens {
            crc32: format_crc32(self.crc.finalize()),
            hash: md5.clone(),
            md5,
        }
    }
}

impl Default for FileDigest {
    fn default() -> Self {
        Self::new()
    }
}
