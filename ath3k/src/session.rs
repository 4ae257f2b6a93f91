use firmware::FirmwareImage;

use crate::{
    Claim, UploadError,
    config::{Policy, UploadConfig},
    handshake, resolver, transfer,
    usb::{OpenDevice, UsbDevice},
};

/// Successful end of a [Session]
pub enum UploadOutcome<H: OpenDevice> {
    /// Firmware loaded. The controller re-enumerates under a new identity,
    /// the old handle has been closed.
    DeviceReset,
    /// Firmware deliberately not loaded; the device stays open for as long
    /// as the claim is held.
    Masked(Claim<H>),
}

impl<H: OpenDevice> UploadOutcome<H> {
    /// Whether the caller should keep exclusive ownership of the device
    pub fn retains_device(&self) -> bool {
        matches!(self, UploadOutcome::Masked(_))
    }
}

impl<H: OpenDevice> std::fmt::Debug for UploadOutcome<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadOutcome::DeviceReset => write!(f, "DeviceReset"),
            UploadOutcome::Masked(_) => write!(f, "Masked"),
        }
    }
}

/// One firmware upload to one device
///
/// Runs open → configure → resolve → handshake → transfer → teardown. Every
/// handle is owned by a [Claim], so each error path closes exactly what was
/// opened, interface before device.
pub struct Session<'a, D: UsbDevice> {
    device: D,
    config: &'a UploadConfig,
    firmware: &'a FirmwareImage,
}

impl<'a, D: UsbDevice> Session<'a, D> {
    pub fn new(
        device: D,
        config: &'a UploadConfig,
        firmware: &'a FirmwareImage,
    ) -> Self {
        Session {
            device,
            config,
            firmware,
        }
    }

    pub fn run(mut self) -> Result<UploadOutcome<D::Handle>, UploadError> {
        let result = self.upload();
        match &result {
            Ok(UploadOutcome::DeviceReset) => {
                log::info!("Firmware loaded successfully")
            }
            Ok(UploadOutcome::Masked(_)) => {
                log::info!("Firmware not loaded, holding device")
            }
            Err(err) => log::error!("{} failed: {err}", err.stage()),
        }
        result
    }

    fn upload(&mut self) -> Result<UploadOutcome<D::Handle>, UploadError> {
        let device = self.open_device()?;
        if self.config.policy == Policy::Mask {
            return Ok(UploadOutcome::Masked(device.hold()));
        }

        load_firmware(&*device, self.config, self.firmware)?;

        log::debug!("Closing device");
        device.release();
        Ok(UploadOutcome::DeviceReset)
    }

    fn open_device(&mut self) -> Result<Claim<D::Handle>, UploadError> {
        match self.device.reset() {
            Ok(()) => log::debug!("Device reset"),
            Err(err) => log::warn!("Failed to reset the device: {err}"),
        }

        let num_configs = self.device.num_configurations();
        if num_configs < 1 {
            return Err(UploadError::NoConfigurations);
        }
        log::debug!("Num configurations {num_configs}");

        let config = self
            .device
            .configuration(0)
            .ok_or(UploadError::MissingConfigDescriptor)?;

        let mut device =
            Claim::new(self.device.open().map_err(UploadError::DeviceBusy)?);
        device
            .set_configuration(config.value)
            .map_err(UploadError::ConfigurationRejected)?;

        let status = device
            .status()
            .map_err(UploadError::DeviceStatusUnavailable)?;
        log::debug!("Device status {status:#06x}");

        Ok(device)
    }
}

fn load_firmware<H: OpenDevice>(
    device: &H,
    config: &UploadConfig,
    firmware: &FirmwareImage,
) -> Result<(), UploadError> {
    let (mut interface, pipe) = resolver::resolve(device, config)?;

    handshake::send_header(device, firmware.header(), config.attempts())?;
    transfer::send_payload(&mut *interface, &pipe, firmware, config.write_length)?;

    // The controller normally drops off the bus once it boots the new
    // firmware, so this is expected to fail.
    match device.status() {
        Err(err) => log::debug!("No device status after upload: {err}"),
        Ok(status) => log::info!("Device status {status:#06x} after upload"),
    }

    log::debug!("Closing interface");
    interface.release();
    Ok(())
}
