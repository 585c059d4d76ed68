//! Client ↔ daemon socket protocol.
//!
//! Every request is exactly 8 bytes. Two reserved patterns select control
//! operations; anything else must be a valid device frame and is forwarded to
//! the panel verbatim.
//!
//! | Request        | Bytes                     | Reply                           |
//! |----------------|---------------------------|---------------------------------|
//! | stop daemon    | `FF FF FF FF FF FF FF FF` | `01`                            |
//! | get state      | `FF 00 00 00 00 00 00 00` | `[power, brightness, temp_byte]`|
//! | set (frame)    | `3A 02 03 ...`            | `01`                            |

use crate::error::{NeewerError, Result};
use crate::protocol::frame::{
    FRAME_LEN, Frame, FrameFields, MAX_BRIGHTNESS, MAX_TEMP_BYTE, MIN_TEMP_BYTE,
    decode_frame_checked, hex,
};
use crate::protocol::state::DeviceState;

// =============================================================================
// Constants
// =============================================================================

/// Length of every socket request.
pub const REQUEST_LEN: usize = FRAME_LEN;

/// Stop the daemon.
pub const STOP_MAGIC: [u8; REQUEST_LEN] = [0xFF; REQUEST_LEN];

/// Ask for the mirrored device state.
pub const GET_STATE_MAGIC: [u8; REQUEST_LEN] = [0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];

/// Single-byte acknowledgement for set and stop.
pub const ACK: u8 = 0x01;

/// Length of a get-state reply.
pub const STATE_REPLY_LEN: usize = 3;

// =============================================================================
// Requests
// =============================================================================

/// A classified socket request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Tear the daemon down.
    Stop,
    /// Reply with the mirrored state.
    GetState,
    /// Forward this frame to the panel.
    Set(Frame),
}

impl Request {
    /// Classify 8 raw request bytes.
    ///
    /// Set requests come from arbitrary local processes, so the frame
    /// checksum is verified here before anything reaches the serial port.
    ///
    /// # Errors
    /// Returns `MalformedFrame` if the bytes are neither a magic nor a valid
    /// frame.
    pub fn classify(bytes: &[u8; REQUEST_LEN]) -> Result<Self> {
        if *bytes == STOP_MAGIC {
            return Ok(Request::Stop);
        }
        if *bytes == GET_STATE_MAGIC {
            return Ok(Request::GetState);
        }

        decode_frame_checked(bytes).map_err(|e| match e {
            NeewerError::MalformedFrame { message } => NeewerError::MalformedFrame {
                message: format!("{} in request [{}]", message, hex(bytes)),
            },
            other => other,
        })?;

        Ok(Request::Set(*bytes))
    }

    /// Wire bytes for this request.
    pub fn to_bytes(&self) -> [u8; REQUEST_LEN] {
        match self {
            Request::Stop => STOP_MAGIC,
            Request::GetState => GET_STATE_MAGIC,
            Request::Set(frame) => *frame,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Request::Stop => "stop",
            Request::GetState => "get-state",
            Request::Set(_) => "set",
        }
    }
}

// =============================================================================
// State Reply
// =============================================================================

/// Encode a get-state reply: `[power, brightness, temp_byte]`.
pub fn encode_state_reply(state: &DeviceState) -> [u8; STATE_REPLY_LEN] {
    [
        u8::from(state.power),
        state.brightness.min(MAX_BRIGHTNESS),
        state.temp_byte(),
    ]
}

/// Decode a get-state reply.
///
/// The daemon does not know the port label, so the caller supplies it.
///
/// # Errors
/// Returns `InvalidResponse` on a short reply or out-of-range values.
pub fn decode_state_reply(bytes: &[u8], port: &str) -> Result<DeviceState> {
    if bytes.len() != STATE_REPLY_LEN {
        return Err(NeewerError::InvalidResponse {
            message: format!(
                "state reply has {} bytes, expected {}",
                bytes.len(),
                STATE_REPLY_LEN
            ),
        });
    }

    let power = match bytes[0] {
        0 => false,
        1 => true,
        other => {
            return Err(NeewerError::InvalidResponse {
                message: format!("power byte {:#04x} is not 0 or 1", other),
            });
        }
    };

    if bytes[1] > MAX_BRIGHTNESS {
        return Err(NeewerError::InvalidResponse {
            message: format!("brightness {} out of range", bytes[1]),
        });
    }

    if !(MIN_TEMP_BYTE..=MAX_TEMP_BYTE).contains(&bytes[2]) {
        return Err(NeewerError::InvalidResponse {
            message: format!("temperature byte {} out of range", bytes[2]),
        });
    }

    Ok(DeviceState::from_fields(
        port,
        FrameFields {
            power,
            brightness: bytes[1],
            temp_byte: bytes[2],
        },
    ))
}
