//! `nusb` implementation of the backend traits

use std::{
    marker::PhantomData,
    sync::{Mutex, MutexGuard},
    thread,
    time::{Duration, Instant},
};

use nusb::{
    self, Endpoint, MaybeFuture,
    descriptors::TransferType as NusbTransferType,
    transfer::{Buffer, Bulk, ControlIn, ControlOut, ControlType, Out},
};

use crate::{DEFAULT_TIMEOUT, UsbError, usb::*};

const USB_REQ_GET_STATUS: u8 = 0x00;

/// Devices currently opened by this process
static CLAIMED: Mutex<Vec<nusb::DeviceId>> = Mutex::new(Vec::new());

fn claimed() -> MutexGuard<'static, Vec<nusb::DeviceId>> {
    CLAIMED.lock().unwrap_or_else(|e| e.into_inner())
}

/// USB device found on the bus, not yet opened by the loader
pub struct NusbDevice {
    info: nusb::DeviceInfo,
    device: Option<nusb::Device>,
}

impl NusbDevice {
    pub fn new(info: nusb::DeviceInfo) -> Self {
        NusbDevice { info, device: None }
    }

    pub fn device_info(&self) -> &nusb::DeviceInfo {
        &self.info
    }

    pub fn bus_id(&self) -> &str {
        self.info.bus_id()
    }

    pub fn device_address(&self) -> u8 {
        self.info.device_address()
    }

    pub fn vendor_id(&self) -> u16 {
        self.info.vendor_id()
    }

    pub fn product_id(&self) -> u16 {
        self.info.product_id()
    }

    pub fn product_string(&self) -> Option<&str> {
        self.info.product_string()
    }

    fn device(&mut self) -> Result<nusb::Device, UsbError> {
        if let Some(dev) = &self.device {
            return Ok(dev.clone());
        }
        let dev = self.info.open().wait()?;
        self.device = Some(dev.clone());
        Ok(dev)
    }

    /// Find the device again after a reset made it re-enumerate.
    fn rediscover(&mut self) -> Result<(), UsbError> {
        let location = DeviceLocation::of(&self.info);
        let start = Instant::now();
        loop {
            let found = nusb::list_devices()
                .wait()?
                .map(|info| (DeviceLocation::of(&info), info));
            if let Some(info) = location.select(found)? {
                self.info = info;
                return Ok(());
            }
            if start.elapsed() >= DEFAULT_TIMEOUT {
                return Err(UsbError::Timeout);
            }
            thread::sleep(Duration::from_millis(100));
        }
    }
}

/// Physical position and ids of a device, stable across a reset
#[derive(Clone, Debug, PartialEq, Eq)]
struct DeviceLocation {
    bus_id: String,
    port_chain: Vec<u8>,
    vendor_id: u16,
    product_id: u16,
}

impl DeviceLocation {
    fn of(info: &nusb::DeviceInfo) -> Self {
        DeviceLocation {
            bus_id: info.bus_id().to_owned(),
            port_chain: info.port_chain().to_vec(),
            vendor_id: info.vendor_id(),
            product_id: info.product_id(),
        }
    }

    /// Pick the one candidate at this location. More than one is an error.
    fn select<T>(
        &self,
        candidates: impl IntoIterator<Item = (DeviceLocation, T)>,
    ) -> Result<Option<T>, UsbError> {
        let mut matching = candidates
            .into_iter()
            .filter(|(location, _)| location == self)
            .map(|(_, item)| item);
        let first = matching.next();
        if first.is_some() && matching.next().is_some() {
            return Err(UsbError::Other(format!(
                "more than one {:04x}:{:04x} at bus {} port {:?}",
                self.vendor_id, self.product_id, self.bus_id, self.port_chain
            )));
        }
        Ok(first)
    }
}

impl UsbDevice for NusbDevice {
    type Handle = NusbHandle;

    fn reset(&mut self) -> Result<(), UsbError> {
        let dev = self.device()?;
        // the handle is unusable after a reset
        self.device = None;
        dev.reset().wait()?;
        drop(dev);
        self.rediscover()
    }

    fn num_configurations(&mut self) -> usize {
        match self.device() {
            Ok(dev) => dev.configurations().count(),
            Err(err) => {
                log::debug!("Unable to read descriptors: {err}");
                0
            }
        }
    }

    fn configuration(&mut self, index: usize) -> Option<ConfigurationInfo> {
        let dev = self.device().ok()?;
        let config = dev.configurations().nth(index)?;
        let num_interfaces = config
            .interface_alt_settings()
            .filter(|alt| alt.alternate_setting() == 0)
            .count();
        Some(ConfigurationInfo {
            value: config.configuration_value(),
            num_interfaces: num_interfaces as u8,
        })
    }

    fn open(&mut self) -> Result<NusbHandle, UsbError> {
        let id = self.info.id();
        let mut claimed = claimed();
        if claimed.contains(&id) {
            return Err(UsbError::Busy);
        }
        let device = self.device()?;
        claimed.push(id);
        log::debug!(
            "Opened {:04x}:{:04x} (bus {} addr {})",
            self.vendor_id(),
            self.product_id(),
            self.bus_id(),
            self.device_address()
        );
        Ok(NusbHandle {
            id,
            device: Some(device),
        })
    }
}

/// Exclusively opened device
pub struct NusbHandle {
    id: nusb::DeviceId,
    device: Option<nusb::Device>,
}

impl NusbHandle {
    fn dev(&self) -> Result<&nusb::Device, UsbError> {
        self.device.as_ref().ok_or(UsbError::Disconnected)
    }

    fn alt_setting_endpoints(&self, intf: &InterfaceInfo) -> Vec<EndpointInfo> {
        let Ok(dev) = self.dev() else {
            return Vec::new();
        };
        let Ok(config) = dev.active_configuration() else {
            return Vec::new();
        };
        config
            .interface_alt_settings()
            .find(|alt| {
                alt.interface_number() == intf.number
                    && alt.alternate_setting() == intf.alt_setting
            })
            .map(|alt| {
                alt.endpoints()
                    .map(|ep| EndpointInfo {
                        address: ep.address(),
                        properties: EndpointProperties {
                            transfer_type: match ep.transfer_type() {
                                NusbTransferType::Control => TransferType::Control,
                                NusbTransferType::Isochronous => {
                                    TransferType::Isochronous
                                }
                                NusbTransferType::Bulk => TransferType::Bulk,
                                NusbTransferType::Interrupt => {
                                    TransferType::Interrupt
                                }
                            },
                            max_packet_size: ep.max_packet_size() as u16,
                            interval: ep.interval(),
                        },
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Close for NusbHandle {
    fn close(&mut self) {
        if self.device.take().is_some() {
            claimed().retain(|id| *id != self.id);
            log::debug!("Device closed");
        }
    }
}

impl OpenDevice for NusbHandle {
    type Interface<'a>
        = NusbInterface<'a>
    where
        Self: 'a;

    fn set_configuration(&mut self, value: u8) -> Result<(), UsbError> {
        Ok(self.dev()?.set_configuration(value).wait()?)
    }

    fn status(&self) -> Result<u16, UsbError> {
        let data = self
            .dev()?
            .control_in(
                ControlIn {
                    control_type: ControlType::Standard,
                    recipient: nusb::transfer::Recipient::Device,
                    request: USB_REQ_GET_STATUS,
                    value: 0,
                    index: 0,
                    length: 2,
                },
                DEFAULT_TIMEOUT,
            )
            .wait()?;
        match data.as_slice() {
            [lo, hi, ..] => Ok(u16::from_le_bytes([*lo, *hi])),
            _ => Err(UsbError::Other("short status response".into())),
        }
    }

    fn find_interface(&self, request: &InterfaceRequest) -> Option<InterfaceInfo> {
        let config = self.dev().ok()?.active_configuration().ok()?;
        config
            .interface_alt_settings()
            .map(|alt| InterfaceInfo {
                number: alt.interface_number(),
                alt_setting: alt.alternate_setting(),
                class: alt.class(),
                subclass: alt.subclass(),
                protocol: alt.protocol(),
            })
            .find(|intf| request.matches(intf))
    }

    fn open_interface(&self, intf: &InterfaceInfo) -> Result<NusbInterface<'_>, UsbError> {
        let interface = self.dev()?.claim_interface(intf.number).wait()?;
        if intf.alt_setting != 0 {
            interface.set_alt_setting(intf.alt_setting).wait()?;
        }
        Ok(NusbInterface {
            interface: Some(interface),
            endpoints: self.alt_setting_endpoints(intf),
            _device: PhantomData,
        })
    }

    fn control_out(&self, request: &ControlRequest, data: &[u8]) -> Result<(), UsbError> {
        Ok(self
            .dev()?
            .control_out(
                ControlOut {
                    control_type: match request.kind {
                        RequestKind::Standard => ControlType::Standard,
                        RequestKind::Class => ControlType::Class,
                        RequestKind::Vendor => ControlType::Vendor,
                    },
                    recipient: match request.recipient {
                        Recipient::Device => nusb::transfer::Recipient::Device,
                        Recipient::Interface => nusb::transfer::Recipient::Interface,
                        Recipient::Endpoint => nusb::transfer::Recipient::Endpoint,
                        Recipient::Other => nusb::transfer::Recipient::Other,
                    },
                    request: request.request,
                    value: request.value,
                    index: request.index,
                    data,
                },
                DEFAULT_TIMEOUT,
            )
            .wait()?)
    }
}

/// Claimed interface of a [NusbHandle]
pub struct NusbInterface<'a> {
    interface: Option<nusb::Interface>,
    endpoints: Vec<EndpointInfo>,
    _device: PhantomData<&'a NusbHandle>,
}

impl Close for NusbInterface<'_> {
    fn close(&mut self) {
        if self.interface.take().is_some() {
            log::debug!("Interface released");
        }
    }
}

impl OpenInterface for NusbInterface<'_> {
    type Transfer<'t>
        = NusbTransfer<'t>
    where
        Self: 't;

    fn endpoints(&self) -> &[EndpointInfo] {
        &self.endpoints
    }

    fn prepare_transfer(
        &mut self,
        pipe: &PipeHandle,
        capacity: usize,
    ) -> Result<NusbTransfer<'_>, UsbError> {
        let interface = self.interface.as_ref().ok_or(UsbError::Disconnected)?;
        let endpoint = interface.endpoint::<Bulk, Out>(pipe.address())?;
        // zero-copy where the platform supports it
        let buffer = endpoint.allocate(capacity);
        Ok(NusbTransfer {
            endpoint,
            buffer: Some(buffer),
            _interface: PhantomData,
        })
    }
}

/// Bulk OUT endpoint with its reusable transfer buffer
pub struct NusbTransfer<'a> {
    endpoint: Endpoint<Bulk, Out>,
    buffer: Option<Buffer>,
    _interface: PhantomData<&'a mut ()>,
}

impl BulkTransfer for NusbTransfer<'_> {
    fn write(&mut self, data: &[u8]) -> Result<(), UsbError> {
        let mut buffer = match self.buffer.take() {
            Some(buffer) if buffer.capacity() >= data.len() => buffer,
            _ => self.endpoint.allocate(data.len()),
        };
        buffer.clear();
        buffer.extend_from_slice(data);
        self.endpoint.submit(buffer);

        let Some(completion) = self.endpoint.wait_next_complete(DEFAULT_TIMEOUT) else {
            self.endpoint.cancel_all();
            if let Some(cancelled) = self.endpoint.wait_next_complete(DEFAULT_TIMEOUT) {
                self.buffer = Some(cancelled.buffer);
            }
            return Err(UsbError::Timeout);
        };
        self.buffer = Some(completion.buffer);
        Ok(completion.status?)
    }

    fn complete(self) -> Result<(), UsbError> {
        if self.endpoint.pending() > 0 {
            return Err(UsbError::Busy);
        }
        Ok(())
    }
}

impl Drop for NusbTransfer<'_> {
    fn drop(&mut self) {
        if self.endpoint.pending() > 0 {
            self.endpoint.cancel_all();
        }
    }
}

/// List devices by vendor / product id
pub fn find_devices(
    vid: Option<u16>,
    pid: Option<u16>,
) -> Result<Vec<NusbDevice>, UsbError> {
    Ok(nusb::list_devices()
        .wait()?
        .filter(|dev| {
            vid.is_none_or(|id| dev.vendor_id() == id)
                && pid.is_none_or(|id| dev.product_id() == id)
        })
        .map(NusbDevice::new)
        .collect())
}

/// Find the device at `address` on bus `bus_id`
pub fn find_device(bus_id: &str, address: u8) -> Result<Option<NusbDevice>, UsbError> {
    Ok(nusb::list_devices()
        .wait()?
        .find(|dev| dev.bus_id() == bus_id && dev.device_address() == address)
        .map(NusbDevice::new))
}
