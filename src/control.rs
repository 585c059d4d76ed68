//! High-level light commands built on the daemon client.
//!
//! Every command sends one frame through the daemon and then records the
//! *requested* state in the [`StateStore`], so later commands can start from
//! exact values instead of the quantized ones the panel reports.

use tracing::info;

use crate::client::DaemonClient;
use crate::config::LightProfile;
use crate::error::Result;
use crate::protocol::{DeviceState, encode_frame};
use crate::storage::StateStore;

/// Sends light commands and remembers what was asked for.
#[derive(Debug, Clone)]
pub struct LightController {
    client: DaemonClient,
    store: StateStore,
}

impl LightController {
    pub fn new(client: DaemonClient, store: StateStore) -> Self {
        Self { client, store }
    }

    pub fn client(&self) -> &DaemonClient {
        &self.client
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Set all three fields at once.
    ///
    /// Out-of-range values are clamped. The returned state is what was
    /// requested and saved.
    ///
    /// # Errors
    /// Returns the daemon error if the command fails. If the panel accepted
    /// the command but the state could not be saved, returns
    /// `PersistenceFailure`; the light has already changed in that case.
    pub fn set(
        &self,
        power: bool,
        brightness: i32,
        kelvin: i32,
        port: &str,
    ) -> Result<DeviceState> {
        let requested = DeviceState::new(port, power, brightness, kelvin);
        let frame = encode_frame(
            requested.power,
            i32::from(requested.brightness),
            i32::from(requested.temperature),
        );

        self.client.send_command(&frame)?;
        info!(
            power = requested.power,
            brightness = requested.brightness,
            temperature = requested.temperature,
            "Light updated"
        );

        self.store.save(&requested)?;
        Ok(requested)
    }

    /// Switch on with a profile's brightness and temperature.
    pub fn apply_profile(&self, profile: &LightProfile, port: &str) -> Result<DeviceState> {
        info!(profile = %profile, "Applying profile");
        self.set(
            true,
            i32::from(profile.brightness()),
            i32::from(profile.temperature()),
            port,
        )
    }

    /// Switch on, restoring the brightness and temperature the panel last
    /// reported.
    pub fn power_on(&self, port: &str) -> Result<DeviceState> {
        self.set_power(true, port)
    }

    /// Switch off, keeping the current brightness and temperature.
    pub fn power_off(&self, port: &str) -> Result<DeviceState> {
        self.set_power(false, port)
    }

    fn set_power(&self, power: bool, port: &str) -> Result<DeviceState> {
        let current = self.client.get_state(port)?;
        self.set(
            power,
            i32::from(current.brightness),
            i32::from(current.temperature),
            port,
        )
    }

    /// Change brightness and/or temperature, starting from the saved state,
    /// and switch on.
    pub fn adjust(
        &self,
        port: &str,
        brightness: Option<i32>,
        kelvin: Option<i32>,
    ) -> Result<DeviceState> {
        let saved = self.store.load()?;
        let brightness = brightness.unwrap_or(i32::from(saved.brightness));
        let kelvin = kelvin.unwrap_or(i32::from(saved.temperature));
        self.set(true, brightness, kelvin, port)
    }
}
