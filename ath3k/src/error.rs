use std::fmt;

use crate::usb::Direction;

/// Status reported by the USB backend for a failed request
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum UsbError {
    #[error("resource busy")]
    Busy,
    #[error("endpoint stalled")]
    Stall,
    #[error("timeout")]
    Timeout,
    #[error("device disconnected")]
    Disconnected,
    #[error("transfer cancelled")]
    Cancelled,
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    Other(String),
}

impl From<nusb::Error> for UsbError {
    fn from(err: nusb::Error) -> Self {
        UsbError::Other(err.to_string())
    }
}

impl From<nusb::transfer::TransferError> for UsbError {
    fn from(err: nusb::transfer::TransferError) -> Self {
        use nusb::transfer::TransferError;
        match err {
            TransferError::Cancelled => UsbError::Cancelled,
            TransferError::Stall => UsbError::Stall,
            TransferError::Disconnected => UsbError::Disconnected,
            other => UsbError::Other(other.to_string()),
        }
    }
}

/// Pipeline stage an [UploadError] was raised in
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Session,
    Resolver,
    Handshake,
    Transfer,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Session => "device session",
            Stage::Resolver => "interface resolution",
            Stage::Handshake => "control handshake",
            Stage::Transfer => "bulk transfer",
        };
        f.write_str(name)
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    #[error("no composite configurations")]
    NoConfigurations,
    #[error("no config descriptor")]
    MissingConfigDescriptor,
    #[error("unable to open device: {0}")]
    DeviceBusy(UsbError),
    #[error("unable to set the configuration: {0}")]
    ConfigurationRejected(UsbError),
    #[error("unable to get device status: {0}")]
    DeviceStatusUnavailable(UsbError),
    #[error("unable to find interface")]
    InterfaceNotFound,
    #[error("unable to open interface: {0}")]
    InterfaceBusy(UsbError),
    #[error("failed to get endpoint {number} ({direction}) properties: {status}")]
    EndpointPropertyQueryFailed {
        number: u8,
        direction: Direction,
        status: UsbError,
    },
    #[error("pipe number not specified")]
    PipeIndexMissing,
    #[error("failed to find bulk out pipe {0}")]
    PipeNotFound(u8),
    #[error("failed to initiate firmware transfer: {0}")]
    ControlHandshakeFailed(UsbError),
    #[error("failed to prepare transfer buffer: {0}")]
    BufferPreparationFailed(UsbError),
    #[error("failed to write firmware to bulk pipe (block {chunk}): {status}")]
    BulkWriteFailed { chunk: usize, status: UsbError },
    #[error("failed to complete transfer: {0}")]
    TransferCompletionFailed(UsbError),
}

impl UploadError {
    pub fn stage(&self) -> Stage {
        match self {
            UploadError::NoConfigurations
            | UploadError::MissingConfigDescriptor
            | UploadError::DeviceBusy(_)
            | UploadError::ConfigurationRejected(_)
            | UploadError::DeviceStatusUnavailable(_) => Stage::Session,
            UploadError::InterfaceNotFound
            | UploadError::InterfaceBusy(_)
            | UploadError::EndpointPropertyQueryFailed { .. }
            | UploadError::PipeIndexMissing
            | UploadError::PipeNotFound(_) => Stage::Resolver,
            UploadError::ControlHandshakeFailed(_) => Stage::Handshake,
            UploadError::BufferPreparationFailed(_)
            | UploadError::BulkWriteFailed { .. }
            | UploadError::TransferCompletionFailed(_) => Stage::Transfer,
        }
    }
}

/// Errors loading the device registry
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid personality table: {0}")]
    Parse(#[from] toml::de::Error),
}
