//! Backend seam between the upload pipeline and a USB stack
//!
//! The pipeline only talks to these traits. [crate::device] implements them
//! on top of `nusb`; the test suite implements them in memory.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::UsbError;

/// Transfer direction, from the host's point of view
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Out,
    In,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Out => "out",
            Direction::In => "in",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferType {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestKind {
    Standard,
    Class,
    Vendor,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recipient {
    Device,
    Interface,
    Endpoint,
    Other,
}

/// Host-to-device control request (`bmRequestType` direction is always OUT)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ControlRequest {
    pub kind: RequestKind,
    pub recipient: Recipient,
    pub request: u8,
    pub value: u16,
    pub index: u16,
}

impl ControlRequest {
    /// Raw `bmRequestType` byte
    #[doc(alias = "bmRequestType")]
    pub fn request_type(&self) -> u8 {
        let kind = match self.kind {
            RequestKind::Standard => 0,
            RequestKind::Class => 1,
            RequestKind::Vendor => 2,
        };
        let recipient = match self.recipient {
            Recipient::Device => 0,
            Recipient::Interface => 1,
            Recipient::Endpoint => 2,
            Recipient::Other => 3,
        };
        (kind << 5) | recipient
    }
}

/// Configuration descriptor summary
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConfigurationInfo {
    /// `bConfigurationValue`, the value passed to SET_CONFIGURATION
    pub value: u8,
    pub num_interfaces: u8,
}

/// Interface search filter. `None` fields match anything.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InterfaceRequest {
    pub class: Option<u8>,
    pub subclass: Option<u8>,
    pub protocol: Option<u8>,
    pub alt_setting: Option<u8>,
}

impl InterfaceRequest {
    /// Matches the first interface present
    pub fn any() -> Self {
        Self::default()
    }

    pub fn matches(&self, intf: &InterfaceInfo) -> bool {
        self.class.is_none_or(|c| c == intf.class)
            && self.subclass.is_none_or(|c| c == intf.subclass)
            && self.protocol.is_none_or(|p| p == intf.protocol)
            && self.alt_setting.is_none_or(|a| a == intf.alt_setting)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub number: u8,
    pub alt_setting: u8,
    pub class: u8,
    pub subclass: u8,
    pub protocol: u8,
}

/// Declared endpoint properties
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EndpointProperties {
    pub transfer_type: TransferType,
    pub max_packet_size: u16,
    pub interval: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EndpointInfo {
    /// `bEndpointAddress`, direction bit included
    pub address: u8,
    pub properties: EndpointProperties,
}

impl EndpointInfo {
    pub fn number(&self) -> u8 {
        self.address & 0x0F
    }

    pub fn direction(&self) -> Direction {
        if self.address & 0x80 != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }

    pub fn is_bulk_out(&self) -> bool {
        self.properties.transfer_type == TransferType::Bulk
            && self.direction() == Direction::Out
    }
}

/// Bulk OUT endpoint of an open interface
///
/// Does not own anything: writes go through [OpenInterface::prepare_transfer],
/// which borrows the interface it was resolved from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipeHandle {
    pub index: u8,
    pub endpoint: EndpointInfo,
}

impl PipeHandle {
    pub fn address(&self) -> u8 {
        self.endpoint.address
    }

    pub fn max_packet_size(&self) -> u16 {
        self.endpoint.properties.max_packet_size
    }
}

/// Handles that must be given back exactly once
pub trait Close {
    fn close(&mut self);
}

/// A matched device before the loader has opened it
pub trait UsbDevice {
    type Handle: OpenDevice;

    fn reset(&mut self) -> Result<(), UsbError>;
    fn num_configurations(&mut self) -> usize;
    fn configuration(&mut self, index: usize) -> Option<ConfigurationInfo>;
    /// Open the device for exclusive use
    fn open(&mut self) -> Result<Self::Handle, UsbError>;
}

/// Exclusively opened device
pub trait OpenDevice: Close {
    type Interface<'a>: OpenInterface
    where
        Self: 'a;

    fn set_configuration(&mut self, value: u8) -> Result<(), UsbError>;
    /// Standard GET_STATUS on the device
    fn status(&self) -> Result<u16, UsbError>;
    fn find_interface(&self, request: &InterfaceRequest) -> Option<InterfaceInfo>;
    fn open_interface(&self, intf: &InterfaceInfo) -> Result<Self::Interface<'_>, UsbError>;
    /// Synchronous control transfer on the default pipe
    fn control_out(&self, request: &ControlRequest, data: &[u8]) -> Result<(), UsbError>;
}

/// Exclusively opened interface
pub trait OpenInterface: Close {
    type Transfer<'a>: BulkTransfer
    where
        Self: 'a;

    fn endpoints(&self) -> &[EndpointInfo];

    /// Declared properties of endpoint `number` in `direction`
    fn endpoint_properties(
        &self,
        number: u8,
        direction: Direction,
    ) -> Result<EndpointProperties, UsbError> {
        self.endpoints()
            .iter()
            .find(|ep| ep.number() == number && ep.direction() == direction)
            .map(|ep| ep.properties)
            .ok_or(UsbError::NotFound)
    }

    /// Pipe at position `index` of the endpoint list
    fn pipe(&self, index: u8) -> Option<PipeHandle> {
        let endpoint = *self.endpoints().get(index as usize)?;
        Some(PipeHandle { index, endpoint })
    }

    /// Set up transfer memory of `capacity` bytes for `pipe`
    fn prepare_transfer(
        &mut self,
        pipe: &PipeHandle,
        capacity: usize,
    ) -> Result<Self::Transfer<'_>, UsbError>;
}

/// Prepared bulk OUT transfer
///
/// Dropping it without calling [BulkTransfer::complete] must undo the
/// preparation.
pub trait BulkTransfer {
    /// Synchronous write of `data`
    fn write(&mut self, data: &[u8]) -> Result<(), UsbError>;
    fn complete(self) -> Result<(), UsbError>;
}
