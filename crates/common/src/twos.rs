//! Two's-complement byte codec for arbitrary-precision integers.
//!
//! Signed values cross the host/guest boundary as minimal big-endian two's
//! complement: zero is the empty sequence, positive values carry a leading
//! 0x00 only when their top bit would otherwise read as a sign bit, and
//! negative values are the shortest sequence whose leading bit is set.

use num_bigint::{BigInt, Sign};

/// Encodes `value` as minimal big-endian two's complement.
pub fn to_bytes(value: &BigInt) -> Vec<u8> {
    if value.sign() == Sign::NoSign {
        return Vec::new();
    }
    value.to_signed_bytes_be()
}

/// Decodes a big-endian two's-complement byte sequence. An empty slice
/// decodes to zero.
pub fn set_bytes(bytes: &[u8]) -> BigInt {
    if bytes.is_empty() {
        return BigInt::from(0);
    }
    BigInt::from_signed_bytes_be(bytes)
}
