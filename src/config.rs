//! Light profiles and serial timing for Neewer panels.
//!
//! Provides the pre-defined lighting presets and the hardware timing the
//! serial session must respect.

use std::time::Duration;

// =============================================================================
// Light Profiles
// =============================================================================

/// Pre-defined lighting preset.
#[derive(Debug, Clone, PartialEq)]
pub enum LightProfile {
    /// Full brightness, coldest white.
    Cold,
    /// Daylight balanced.
    Sunlight,
    /// Dimmer, slightly warmer.
    Afternoon,
    /// Warm and dim.
    Sunset,
    /// Warmest preset.
    Candle,
    /// User-defined preset from the config file.
    Custom {
        name: String,
        brightness: u8,
        temperature: u16,
    },
}

impl LightProfile {
    /// Built-in presets, in display order.
    pub const BUILTIN: [LightProfile; 5] = [
        LightProfile::Cold,
        LightProfile::Sunlight,
        LightProfile::Afternoon,
        LightProfile::Sunset,
        LightProfile::Candle,
    ];

    /// Brightness percentage for this preset.
    pub fn brightness(&self) -> u8 {
        match self {
            LightProfile::Cold => 100,
            LightProfile::Sunlight => 28,
            LightProfile::Afternoon => 16,
            LightProfile::Sunset => 16,
            LightProfile::Candle => 28,
            LightProfile::Custom { brightness, .. } => *brightness,
        }
    }

    /// Colour temperature in Kelvin for this preset.
    pub fn temperature(&self) -> u16 {
        match self {
            LightProfile::Cold => 7000,
            LightProfile::Sunlight => 5600,
            LightProfile::Afternoon => 5000,
            LightProfile::Sunset => 4500,
            LightProfile::Candle => 3400,
            LightProfile::Custom { temperature, .. } => *temperature,
        }
    }

    /// Profile name as typed on the command line.
    pub fn name(&self) -> &str {
        match self {
            LightProfile::Cold => "cold",
            LightProfile::Sunlight => "sunlight",
            LightProfile::Afternoon => "afternoon",
            LightProfile::Sunset => "sunset",
            LightProfile::Candle => "candle",
            LightProfile::Custom { name, .. } => name,
        }
    }

    /// Look up a built-in preset by name (case-insensitive).
    pub fn builtin(name: &str) -> Option<Self> {
        let search = name.to_lowercase();
        Self::BUILTIN.into_iter().find(|p| p.name() == search)
    }
}

impl std::fmt::Display for LightProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}%, {}K)",
            self.name(),
            self.brightness(),
            self.temperature()
        )
    }
}

// =============================================================================
// Serial Timing
// =============================================================================

/// Serial link parameters.
///
/// The pacing and settle delays are hardware constraints: the panel drops
/// frames that arrive back-to-back and ignores writes right after the wake
/// probe.
#[derive(Debug, Clone, PartialEq)]
pub struct SerialSettings {
    pub baud_rate: u32,
    /// Sleep before every frame write.
    pub write_pacing: Duration,
    /// Sleep after the wake probe.
    pub settle: Duration,
    /// Upper bound on a single blocking read.
    pub read_timeout: Duration,
}

impl SerialSettings {
    pub const PANEL: Self = Self {
        baud_rate: 115_200,
        write_pacing: Duration::from_millis(60),
        settle: Duration::from_millis(80),
        read_timeout: Duration::from_millis(100),
    };
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self::PANEL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        assert_eq!(LightProfile::builtin("Sunset"), Some(LightProfile::Sunset));
        assert_eq!(LightProfile::builtin("candle"), Some(LightProfile::Candle));
        assert_eq!(LightProfile::builtin("disco"), None);
    }

    #[test]
    fn test_builtin_values() {
        assert_eq!(LightProfile::Cold.temperature(), 7000);
        assert_eq!(LightProfile::Cold.brightness(), 100);
        assert_eq!(LightProfile::Sunlight.temperature(), 5600);
        assert_eq!(LightProfile::Candle.brightness(), 28);
    }

    #[test]
    fn test_display() {
        assert_eq!(LightProfile::Sunset.to_string(), "sunset (16%, 4500K)");
    }

    #[test]
    fn test_panel_timing() {
        let s = SerialSettings::default();
        assert_eq!(s.baud_rate, 115_200);
        assert!(s.write_pacing >= Duration::from_millis(60));
        assert!(s.settle >= Duration::from_millis(80));
    }
}
