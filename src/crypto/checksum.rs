//! CRC32C transit checksums for remote crypto calls.

use crc::{CRC_32_ISCSI, Crc};

const CASTAGNOLI: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// CRC32C (Castagnoli) of a payload, widened the way the KMS wire format
/// carries it.
pub fn crc32c(data: &[u8]) -> u64 {
    CASTAGNOLI.checksum(data) as u64
}

/// Whether `data` matches a checksum returned by the authority.
pub fn matches(data: &[u8], expected: u64) -> bool {
    crc32c(data) == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32c_known_vector() {
        // RFC 3720 check value for "123456789".
        assert_eq!(crc32c(b"123456789"), 0xE306_9283);
    }

    #[test]
    fn test_matches_detects_corruption() {
        let sum = crc32c(b"payload");
        assert!(matches(b"payload", sum));
        assert!(!matches(b"paylaod", sum));
    }
}
