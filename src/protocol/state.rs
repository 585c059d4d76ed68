//! Light state as seen by clients, the daemon mirror and the state file.

use serde::{Deserialize, Serialize};

use crate::protocol::frame::{
    Frame, FrameFields, MAX_BRIGHTNESS, MAX_KELVIN, byte_to_kelvin, clamp_brightness,
    clamp_kelvin, encode_frame, kelvin_to_byte,
};

/// Default brightness when nothing has been saved yet.
pub const DEFAULT_BRIGHTNESS: u8 = MAX_BRIGHTNESS;

/// Default colour temperature when nothing has been saved yet.
pub const DEFAULT_TEMPERATURE: u16 = MAX_KELVIN;

/// Power, brightness and colour temperature of one panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    /// Serial port the panel is attached to.
    #[serde(default)]
    pub port: String,
    /// Panel on/off.
    pub power: bool,
    /// Brightness percentage (0-100).
    pub brightness: u8,
    /// Colour temperature in Kelvin (2900-7000).
    pub temperature: u16,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            port: String::new(),
            power: false,
            brightness: DEFAULT_BRIGHTNESS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl DeviceState {
    /// Build a state, clamping brightness and Kelvin into range.
    pub fn new(port: impl Into<String>, power: bool, brightness: i32, kelvin: i32) -> Self {
        Self {
            port: port.into(),
            power,
            brightness: clamp_brightness(brightness),
            temperature: clamp_kelvin(kelvin),
        }
    }

    /// Build a state from decoded frame fields.
    pub fn from_fields(port: impl Into<String>, fields: FrameFields) -> Self {
        Self {
            port: port.into(),
            power: fields.power,
            brightness: fields.brightness.min(MAX_BRIGHTNESS),
            temperature: fields.kelvin(),
        }
    }

    /// Overwrite power, brightness and temperature from a device report.
    /// The port label is kept.
    pub fn apply(&mut self, fields: FrameFields) {
        self.power = fields.power;
        self.brightness = fields.brightness.min(MAX_BRIGHTNESS);
        self.temperature = fields.kelvin();
    }

    /// Same state with brightness and temperature forced into range.
    pub fn clamped(mut self) -> Self {
        self.brightness = clamp_brightness(self.brightness as i32);
        self.temperature = clamp_kelvin(self.temperature as i32);
        self
    }

    /// Quantized temperature byte as sent on the wire.
    pub fn temp_byte(&self) -> u8 {
        kelvin_to_byte(self.temperature as i32)
    }

    /// Temperature after a trip through the wire encoding.
    pub fn quantized_temperature(&self) -> u16 {
        byte_to_kelvin(self.temp_byte())
    }

    /// Encode this state as a device frame.
    pub fn to_frame(&self) -> Frame {
        encode_frame(self.power, self.brightness as i32, self.temperature as i32)
    }
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let port = if self.port.is_empty() {
            "-"
        } else {
            self.port.as_str()
        };
        writeln!(f, "+-----------------------------------+")?;
        writeln!(f, "|        Neewer Panel Status        |")?;
        writeln!(f, "+-----------------------------------+")?;
        writeln!(f, "|  Port:        {:<20}|", port)?;
        writeln!(
            f,
            "|  Power:       {:<20}|",
            if self.power { "On" } else { "Off" }
        )?;
        writeln!(f, "|  Brightness:  {:>3}%                |", self.brightness)?;
        writeln!(f, "|  Temperature: {:>4} K              |", self.temperature)?;
        writeln!(f, "+-----------------------------------+")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::decode_frame;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_state() {
        let state = DeviceState::default();
        assert_eq!(state.port, "");
        assert!(!state.power);
        assert_eq!(state.brightness, 100);
        assert_eq!(state.temperature, 7000);
    }

    #[test]
    fn test_new_clamps() {
        let state = DeviceState::new("/dev/ttyUSB0", true, 180, 1200);
        assert_eq!(state.brightness, 100);
        assert_eq!(state.temperature, 2900);

        let state = DeviceState::new("", true, -3, 9000);
        assert_eq!(state.brightness, 0);
        assert_eq!(state.temperature, 7000);
    }

    #[test]
    fn test_clamped_fixes_out_of_range_fields() {
        let raw = DeviceState {
            port: String::new(),
            power: true,
            brightness: 250,
            temperature: 100,
        };
        let fixed = raw.clamped();
        assert_eq!(fixed.brightness, 100);
        assert_eq!(fixed.temperature, 2900);
    }

    #[test]
    fn test_apply_keeps_port() {
        let mut state = DeviceState::new("/dev/ttyUSB1", false, 10, 3000);
        let fields = decode_frame(&encode_frame(true, 55, 5600)).unwrap();
        state.apply(fields);
        assert_eq!(state.port, "/dev/ttyUSB1");
        assert!(state.power);
        assert_eq!(state.brightness, 55);
        assert_eq!(state.temperature, byte_to_kelvin(kelvin_to_byte(5600)));
    }

    #[test]
    fn test_json_shape() {
        let state = DeviceState::new("/dev/ttyUSB0", true, 80, 4500);
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "port": "/dev/ttyUSB0",
                "power": true,
                "brightness": 80,
                "temperature": 4500
            })
        );
    }

    #[test]
    fn test_display_mentions_fields() {
        let text = DeviceState::new("/dev/ttyUSB0", true, 80, 4500).to_string();
        assert!(text.contains("On"));
        assert!(text.contains("80%"));
        assert!(text.contains("4500 K"));
    }
}
