//! In-memory backend that journals every call

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use crate::{UsbError, usb::*};

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Event {
    Reset,
    Open,
    SetConfiguration(u8),
    Status,
    OpenInterface(u8),
    Control {
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: Vec<u8>,
    },
    Prepare(u8, usize),
    Write(Vec<u8>),
    Complete,
    Unprepare,
    CloseInterface,
    CloseDevice,
}

/// Failures to inject
#[derive(Clone, Debug, Default)]
pub(crate) struct Faults {
    pub reset: bool,
    pub no_configurations: bool,
    pub no_config_descriptor: bool,
    pub open: bool,
    pub set_configuration: bool,
    pub status: bool,
    pub no_interface: bool,
    pub open_interface: bool,
    /// Number of leading control transfers that fail
    pub control_failures: u8,
    pub prepare: bool,
    /// Zero-based write that fails
    pub write_at: Option<usize>,
    pub complete: bool,
}

struct Inner {
    journal: RefCell<Vec<Event>>,
    faults: Faults,
    endpoints: Vec<EndpointInfo>,
    control_failures_left: Cell<u8>,
    writes: Cell<usize>,
}

impl Inner {
    fn push(&self, event: Event) {
        self.journal.borrow_mut().push(event);
    }
}

/// Shared view on the journal
#[derive(Clone)]
pub(crate) struct Journal(Rc<Inner>);

impl Journal {
    pub fn events(&self) -> Vec<Event> {
        self.0.journal.borrow().clone()
    }

    pub fn count(&self, f: impl Fn(&Event) -> bool) -> usize {
        self.0.journal.borrow().iter().filter(|e| f(e)).count()
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.0
            .journal
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Event::Write(data) => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn controls(&self) -> usize {
        self.count(|e| matches!(e, Event::Control { .. }))
    }

    pub fn device_closes(&self) -> usize {
        self.count(|e| *e == Event::CloseDevice)
    }

    pub fn interface_closes(&self) -> usize {
        self.count(|e| *e == Event::CloseInterface)
    }

    pub fn opened_interface(&self) -> bool {
        self.count(|e| matches!(e, Event::OpenInterface(_))) > 0
    }
}

/// Endpoints of an AR3011 in bootloader mode
pub(crate) fn ath3k_endpoints() -> Vec<EndpointInfo> {
    let ep = |address, transfer_type, max_packet_size, interval| EndpointInfo {
        address,
        properties: EndpointProperties {
            transfer_type,
            max_packet_size,
            interval,
        },
    };
    vec![
        ep(0x81, TransferType::Interrupt, 16, 1),
        ep(0x82, TransferType::Bulk, 64, 0),
        ep(0x02, TransferType::Bulk, 64, 0),
    ]
}

pub(crate) struct MockDevice(Rc<Inner>);

pub(crate) fn mock_device(faults: Faults) -> (MockDevice, Journal) {
    let inner = Rc::new(Inner {
        journal: RefCell::new(Vec::new()),
        control_failures_left: Cell::new(faults.control_failures),
        faults,
        endpoints: ath3k_endpoints(),
        writes: Cell::new(0),
    });
    (MockDevice(inner.clone()), Journal(inner))
}

impl UsbDevice for MockDevice {
    type Handle = MockHandle;

    fn reset(&mut self) -> Result<(), UsbError> {
        self.0.push(Event::Reset);
        if self.0.faults.reset {
            Err(UsbError::Disconnected)
        } else {
            Ok(())
        }
    }

    fn num_configurations(&mut self) -> usize {
        if self.0.faults.no_configurations { 0 } else { 1 }
    }

    fn configuration(&mut self, index: usize) -> Option<ConfigurationInfo> {
        if index != 0 || self.0.faults.no_config_descriptor {
            return None;
        }
        Some(ConfigurationInfo {
            value: 1,
            num_interfaces: 1,
        })
    }

    fn open(&mut self) -> Result<MockHandle, UsbError> {
        if self.0.faults.open {
            return Err(UsbError::Busy);
        }
        self.0.push(Event::Open);
        Ok(MockHandle(self.0.clone()))
    }
}

pub(crate) struct MockHandle(Rc<Inner>);

impl Close for MockHandle {
    fn close(&mut self) {
        self.0.push(Event::CloseDevice);
    }
}

impl OpenDevice for MockHandle {
    type Interface<'a>
        = MockInterface<'a>
    where
        Self: 'a;

    fn set_configuration(&mut self, value: u8) -> Result<(), UsbError> {
        self.0.push(Event::SetConfiguration(value));
        if self.0.faults.set_configuration {
            Err(UsbError::Stall)
        } else {
            Ok(())
        }
    }

    fn status(&self) -> Result<u16, UsbError> {
        self.0.push(Event::Status);
        if self.0.faults.status {
            Err(UsbError::Stall)
        } else {
            Ok(0)
        }
    }

    fn find_interface(&self, request: &InterfaceRequest) -> Option<InterfaceInfo> {
        if self.0.faults.no_interface {
            return None;
        }
        Some(InterfaceInfo {
            number: 0,
            alt_setting: 0,
            class: 0xE0,
            subclass: 1,
            protocol: 1,
        })
        .filter(|intf| request.matches(intf))
    }

    fn open_interface(&self, intf: &InterfaceInfo) -> Result<MockInterface<'_>, UsbError> {
        if self.0.faults.open_interface {
            return Err(UsbError::Busy);
        }
        self.0.push(Event::OpenInterface(intf.number));
        Ok(MockInterface { inner: &self.0 })
    }

    fn control_out(&self, request: &ControlRequest, data: &[u8]) -> Result<(), UsbError> {
        self.0.push(Event::Control {
            request_type: request.request_type(),
            request: request.request,
            value: request.value,
            index: request.index,
            data: data.to_vec(),
        });
        let left = self.0.control_failures_left.get();
        if left > 0 {
            self.0.control_failures_left.set(left - 1);
            return Err(UsbError::Timeout);
        }
        Ok(())
    }
}

pub(crate) struct MockInterface<'a> {
    inner: &'a Inner,
}

impl Close for MockInterface<'_> {
    fn close(&mut self) {
        self.inner.push(Event::CloseInterface);
    }
}

impl OpenInterface for MockInterface<'_> {
    type Transfer<'t>
        = MockTransfer<'t>
    where
        Self: 't;

    fn endpoints(&self) -> &[EndpointInfo] {
        &self.inner.endpoints
    }

    fn prepare_transfer(
        &mut self,
        pipe: &PipeHandle,
        capacity: usize,
    ) -> Result<MockTransfer<'_>, UsbError> {
        if self.inner.faults.prepare {
            return Err(UsbError::Other("no memory".into()));
        }
        self.inner.push(Event::Prepare(pipe.address(), capacity));
        Ok(MockTransfer {
            inner: self.inner,
            completed: false,
        })
    }
}

pub(crate) struct MockTransfer<'a> {
    inner: &'a Inner,
    completed: bool,
}

impl BulkTransfer for MockTransfer<'_> {
    fn write(&mut self, data: &[u8]) -> Result<(), UsbError> {
        let n = self.inner.writes.get();
        self.inner.writes.set(n + 1);
        self.inner.push(Event::Write(data.to_vec()));
        if self.inner.faults.write_at == Some(n) {
            return Err(UsbError::Stall);
        }
        Ok(())
    }

    fn complete(mut self) -> Result<(), UsbError> {
        if self.inner.faults.complete {
            return Err(UsbError::Other("complete failed".into()));
        }
        self.inner.push(Event::Complete);
        self.completed = true;
        Ok(())
    }
}

impl Drop for MockTransfer<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.inner.push(Event::Unprepare);
        }
    }
}
