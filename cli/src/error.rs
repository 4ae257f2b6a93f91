use ath3k::{ConfigError, UploadError, UsbError};
use firmware::FirmwareError;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("USB error: {0}")]
    Usb(#[from] UsbError),
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Firmware(#[from] FirmwareError),
    #[error("{stage} failed: {0}", stage = .0.stage())]
    Upload(#[from] UploadError),
    #[error("No bootloader-mode device")]
    NoDevice,
    #[error("More than one bootloader-mode device")]
    ManyDevices,
    #[error("No firmware image given")]
    NoFirmware,
    #[error("No personality for {0:04x}:{1:04x}")]
    NoPersonality(u16, u16),
}
