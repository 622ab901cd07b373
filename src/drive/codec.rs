// Byte-level helpers for the Open Interface wire format
//
// Multi-byte fields travel big-endian (high byte first). Signed fields are
// 16-bit two's complement.

use crate::error::{Error, Result};

/// Join a high and low byte into one word
pub fn merge_bytes16(high: u8, low: u8) -> u16 {
    low as u16 | ((high as u16) << 8)
}

/// Split a word into (high, low)
pub fn split_bytes16(word: u16) -> (u8, u8) {
    ((word >> 8) as u8, (word & 0xFF) as u8)
}

/// Encode a signed value as a 16-bit two's complement word.
/// Values outside [-32768, 32767] are rejected instead of wrapped.
pub fn to_twos_complement16(value: i32) -> Result<u16> {
    if value < i16::MIN as i32 || value > i16::MAX as i32 {
        return Err(Error::FieldOverflow(value));
    }
    if value < 0 {
        Ok((value + 0x1_0000) as u16)
    } else {
        Ok(value as u16)
    }
}

/// Decode a 16-bit two's complement word
pub fn from_twos_complement16(word: u16) -> i16 {
    if word > 0x7FFF {
        (word as i32 - 0x1_0000) as i16
    } else {
        word as i16
    }
}

/// Signed change between two readings of a 16-bit counter, across wraparound
pub fn rollover_delta(current: i16, previous: i16) -> i32 {
    let delta = current as i32 - previous as i32;
    if delta > 0x8000 {
        delta - 0x1_0000
    } else if delta < -0x8000 {
        delta + 0x1_0000
    } else {
        delta
    }
}

/// Encode a signed field straight to (high, low)
pub fn encode_i16(value: i32) -> Result<[u8; 2]> {
    let (high, low) = split_bytes16(to_twos_complement16(value)?);
    Ok([high, low])
}

/// Decode a big-endian signed field
pub fn decode_i16(high: u8, low: u8) -> i16 {
    from_twos_complement16(merge_bytes16(high, low))
}
