//! Serial frame codec for Neewer panels.
//!
//! Every command the panel understands is a fixed 8-byte frame:
//!
//! ```text
//! [0x3A, 0x02, 0x03, POWER, BRIGHTNESS, TEMP_BYTE, 0x00, CHECKSUM]
//! ```
//!
//! The panel echoes the same layout back when its state changes, so the
//! codec is used in both directions.

use crate::error::{NeewerError, Result};

// =============================================================================
// Constants
// =============================================================================

/// Length of every frame on the wire.
pub const FRAME_LEN: usize = 8;

/// Sync byte that starts every frame.
pub const SYNC: u8 = 0x3A;

/// Device class byte.
pub const CLASS: u8 = 0x02;

/// "Set light" command byte.
pub const CMD_SET_LIGHT: u8 = 0x03;

/// Leading bytes shared by every valid frame.
pub const FRAME_HEADER: [u8; 3] = [SYNC, CLASS, CMD_SET_LIGHT];

/// Reserved byte at offset 6. Always zero and not part of the checksum.
pub const RESERVED: u8 = 0x00;

/// Number of leading bytes summed into the checksum (SYNC through TEMP_BYTE).
pub const CHECKSUM_SPAN: usize = 6;

/// Wake probe written right after the port is opened.
pub const WAKE_PROBE: [u8; 4] = [0x00, 0x00, 0x00, 0x00];

/// Brightness range in percent.
pub const MIN_BRIGHTNESS: u8 = 0;
pub const MAX_BRIGHTNESS: u8 = 100;

/// Colour temperature range in Kelvin.
pub const MIN_KELVIN: u16 = 2900;
pub const MAX_KELVIN: u16 = 7000;

/// Encoded temperature byte range.
pub const MIN_TEMP_BYTE: u8 = 1;
pub const MAX_TEMP_BYTE: u8 = 41;

/// Upper bound (exclusive) on `|byte_to_kelvin(kelvin_to_byte(k)) - k|`.
///
/// 40 steps over 4100 K gives 102.5 K per step, so the decoded value is at
/// most 102 K below the requested one.
pub const KELVIN_ROUND_TRIP_ERROR: u16 = 103;

const KELVIN_SPAN: i32 = (MAX_KELVIN - MIN_KELVIN) as i32;
const TEMP_STEPS: i32 = (MAX_TEMP_BYTE - MIN_TEMP_BYTE) as i32;

// Offsets inside a frame.
const OFFSET_POWER: usize = 3;
const OFFSET_BRIGHTNESS: usize = 4;
const OFFSET_TEMP: usize = 5;
const OFFSET_RESERVED: usize = 6;
const OFFSET_CHECKSUM: usize = 7;

/// A complete 8-byte frame.
pub type Frame = [u8; FRAME_LEN];

// =============================================================================
// Decoded Fields
// =============================================================================

/// Semantic content of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFields {
    /// Panel on/off.
    pub power: bool,
    /// Brightness percentage (0-100).
    pub brightness: u8,
    /// Quantized colour temperature (1-41).
    pub temp_byte: u8,
}

impl FrameFields {
    /// Colour temperature in Kelvin, as far as the quantized byte allows.
    pub fn kelvin(&self) -> u16 {
        byte_to_kelvin(self.temp_byte)
    }
}

// =============================================================================
// Scaling
// =============================================================================

/// Clamp a requested brightness into 0-100.
pub fn clamp_brightness(brightness: i32) -> u8 {
    brightness.clamp(MIN_BRIGHTNESS as i32, MAX_BRIGHTNESS as i32) as u8
}

/// Clamp a requested colour temperature into 2900-7000 K.
pub fn clamp_kelvin(kelvin: i32) -> u16 {
    kelvin.clamp(MIN_KELVIN as i32, MAX_KELVIN as i32) as u16
}

/// Convert Kelvin to the 1-41 temperature byte.
///
/// The input is clamped first and the division truncates toward zero, so the
/// mapping is many-to-one. See [`KELVIN_ROUND_TRIP_ERROR`].
pub fn kelvin_to_byte(kelvin: i32) -> u8 {
    let k = clamp_kelvin(kelvin) as i32;
    (((k - MIN_KELVIN as i32) * TEMP_STEPS / KELVIN_SPAN) + MIN_TEMP_BYTE as i32) as u8
}

/// Convert a temperature byte back to Kelvin.
///
/// Approximate inverse of [`kelvin_to_byte`]; out-of-range bytes are clamped
/// into 1-41. Rounds up to the lowest Kelvin that encodes to `byte`, so
/// `kelvin_to_byte(byte_to_kelvin(b)) == b` while `k -> byte -> k` stays lossy.
pub fn byte_to_kelvin(byte: u8) -> u16 {
    let b = byte.clamp(MIN_TEMP_BYTE, MAX_TEMP_BYTE) as i32;
    let offset = (b - MIN_TEMP_BYTE as i32) * KELVIN_SPAN;
    (MIN_KELVIN as i32 + (offset + TEMP_STEPS - 1) / TEMP_STEPS) as u16
}

// =============================================================================
// Encoding / Decoding
// =============================================================================

/// Low byte of the sum of SYNC through TEMP_BYTE.
///
/// Only the first [`CHECKSUM_SPAN`] bytes of `bytes` are summed.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes
        .iter()
        .take(CHECKSUM_SPAN)
        .fold(0u8, |sum, &b| sum.wrapping_add(b))
}

/// Build a frame. Brightness and Kelvin are clamped; this never fails.
pub fn encode_frame(power: bool, brightness: i32, kelvin: i32) -> Frame {
    let mut frame = [0u8; FRAME_LEN];
    frame[..3].copy_from_slice(&FRAME_HEADER);
    frame[OFFSET_POWER] = u8::from(power);
    frame[OFFSET_BRIGHTNESS] = clamp_brightness(brightness);
    frame[OFFSET_TEMP] = kelvin_to_byte(kelvin);
    frame[OFFSET_RESERVED] = RESERVED;
    frame[OFFSET_CHECKSUM] = checksum(&frame);
    frame
}

/// Decode a frame reported by the panel.
///
/// Only the length and header are checked. The panel is a trusted wire
/// partner, so its checksum is not verified; use [`decode_frame_checked`] for
/// bytes that come from anywhere else.
///
/// # Errors
/// Returns `MalformedFrame` if the length is not 8 or the header is wrong.
pub fn decode_frame(bytes: &[u8]) -> Result<FrameFields> {
    if bytes.len() != FRAME_LEN {
        return Err(NeewerError::MalformedFrame {
            message: format!("expected {} bytes, got {}", FRAME_LEN, bytes.len()),
        });
    }

    if bytes[..3] != FRAME_HEADER {
        return Err(NeewerError::MalformedFrame {
            message: format!(
                "unexpected header [{:#04x}, {:#04x}, {:#04x}]",
                bytes[0], bytes[1], bytes[2]
            ),
        });
    }

    Ok(FrameFields {
        power: bytes[OFFSET_POWER] != 0,
        brightness: bytes[OFFSET_BRIGHTNESS].min(MAX_BRIGHTNESS),
        temp_byte: bytes[OFFSET_TEMP].clamp(MIN_TEMP_BYTE, MAX_TEMP_BYTE),
    })
}

/// Decode a frame from an untrusted source and verify its checksum.
///
/// The reserved byte is outside the checksum, so it is required to be zero
/// here instead.
///
/// # Errors
/// Returns `MalformedFrame` on a bad length, header, reserved byte or checksum.
pub fn decode_frame_checked(bytes: &[u8]) -> Result<FrameFields> {
    let fields = decode_frame(bytes)?;

    if bytes[OFFSET_RESERVED] != RESERVED {
        return Err(NeewerError::MalformedFrame {
            message: format!("reserved byte is {:#04x}", bytes[OFFSET_RESERVED]),
        });
    }

    let expected = checksum(bytes);
    if bytes[OFFSET_CHECKSUM] != expected {
        return Err(NeewerError::MalformedFrame {
            message: format!(
                "checksum mismatch: got {:#04x}, expected {:#04x}",
                bytes[OFFSET_CHECKSUM], expected
            ),
        });
    }

    Ok(fields)
}

/// Render bytes as space-separated hex for logs.
pub fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_encode_known_frame() {
        let frame = encode_frame(true, 80, 4500);
        let sum = (0x3Au32 + 0x02 + 0x03 + 0x01 + 0x50 + 0x10) & 0xFF;
        assert_eq!(
            frame,
            [0x3A, 0x02, 0x03, 0x01, 0x50, 0x10, 0x00, sum as u8]
        );
        assert_eq!(frame[7], 0xA0);
    }

    #[test]
    fn test_kelvin_to_byte_bounds() {
        assert_eq!(kelvin_to_byte(2900), 1);
        assert_eq!(kelvin_to_byte(7000), 41);
        assert_eq!(kelvin_to_byte(4500), 16);
        // Clamped
        assert_eq!(kelvin_to_byte(1000), 1);
        assert_eq!(kelvin_to_byte(10_000), 41);
        assert_eq!(kelvin_to_byte(-5), 1);
    }

    #[test]
    fn test_byte_to_kelvin_bounds() {
        assert_eq!(byte_to_kelvin(1), 2900);
        assert_eq!(byte_to_kelvin(41), 7000);
        assert_eq!(byte_to_kelvin(0), 2900);
        assert_eq!(byte_to_kelvin(200), 7000);
    }

    #[test]
    fn test_kelvin_round_trip_is_lossy_but_bounded() {
        let mut max_delta = 0;
        for k in MIN_KELVIN..=MAX_KELVIN {
            let back = byte_to_kelvin(kelvin_to_byte(k as i32));
            assert!(back <= k, "{} decoded above input as {}", k, back);
            max_delta = max_delta.max(k - back);
        }
        assert!(max_delta < KELVIN_ROUND_TRIP_ERROR);
        assert!(max_delta > 0);
    }

    #[test]
    fn test_byte_round_trip_is_exact() {
        for b in MIN_TEMP_BYTE..=MAX_TEMP_BYTE {
            assert_eq!(kelvin_to_byte(byte_to_kelvin(b) as i32), b);
        }
    }

    #[test]
    fn test_decode_recovers_fields() {
        for &(power, b, k) in &[(true, 80, 4500), (false, 0, 2900), (true, 150, 9000)] {
            let fields = decode_frame(&encode_frame(power, b, k)).unwrap();
            assert_eq!(fields.power, power);
            assert_eq!(fields.brightness, clamp_brightness(b));
            assert_eq!(fields.kelvin(), byte_to_kelvin(kelvin_to_byte(k)));
        }
    }

    #[test]
    fn test_decode_rejects_bad_length_and_header() {
        assert!(decode_frame(&[0x3A, 0x02, 0x03]).is_err());
        assert!(decode_frame(&[0u8; 9]).is_err());

        let mut frame = encode_frame(true, 50, 5600);
        frame[1] = 0x05;
        assert!(matches!(
            decode_frame(&frame),
            Err(NeewerError::MalformedFrame { .. })
        ));
    }

    #[test]
    fn test_decode_ignores_checksum_for_device_frames() {
        let mut frame = encode_frame(true, 50, 5600);
        frame[7] = frame[7].wrapping_add(1);
        assert!(decode_frame(&frame).is_ok());
        assert!(decode_frame_checked(&frame).is_err());
    }

    #[test]
    fn test_checked_decode_detects_single_byte_corruption() {
        let frame = encode_frame(true, 42, 3400);
        assert!(decode_frame_checked(&frame).is_ok());

        for idx in 0..FRAME_LEN {
            let mut corrupted = frame;
            corrupted[idx] ^= 0x01;
            assert!(
                decode_frame_checked(&corrupted).is_err(),
                "corruption at {} went unnoticed",
                idx
            );
        }
    }

    #[test]
    fn test_reserved_byte_not_summed() {
        let frame = encode_frame(false, 10, 6000);
        assert_eq!(frame[6], RESERVED);
        assert_eq!(checksum(&frame), frame[7]);
        let sum: u32 = frame[..6].iter().map(|&b| b as u32).sum();
        assert_eq!(frame[7], (sum & 0xFF) as u8);
    }

    #[test]
    fn test_identical_fields_identical_bytes() {
        // 5000K and 5010K quantize to the same byte.
        assert_eq!(encode_frame(true, 16, 5000), encode_frame(true, 16, 5010));
    }

    #[test]
    fn test_hex() {
        assert_eq!(hex(&[0x3A, 0x02, 0xFF]), "3A 02 FF");
    }
}
