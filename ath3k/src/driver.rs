//! Lifecycle adapter for host driver frameworks
//!
//! A host framework matches a device against the registration table, then
//! drives a [FirmwareDriver] through probe → attach → start → … → stop →
//! detach. Only `start` does real work: it runs one upload [Session] and
//! tells the framework whether to keep the device.

use firmware::FirmwareImage;

use crate::{
    Claim, Personality, Session, UploadOutcome,
    usb::UsbDevice,
};

/// Notifications a host framework forwards to the driver
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverMessage {
    ServiceIsTerminated,
    ServiceIsSuspended,
    ServiceIsResumed,
    ServiceIsRequestingClose,
    ServiceWasClosed,
    ServiceBusyStateChange,
}

impl DriverMessage {
    pub fn from_raw(kind: u32) -> Option<Self> {
        Some(match kind {
            0 => DriverMessage::ServiceIsTerminated,
            1 => DriverMessage::ServiceIsSuspended,
            2 => DriverMessage::ServiceIsResumed,
            3 => DriverMessage::ServiceIsRequestingClose,
            4 => DriverMessage::ServiceWasClosed,
            5 => DriverMessage::ServiceBusyStateChange,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Attached,
    /// Device held open after a masked start
    Retaining,
    /// Start finished without keeping the device
    Released,
    Stopped,
}

pub struct FirmwareDriver<D: UsbDevice> {
    personality: Personality,
    firmware: FirmwareImage,
    state: DriverState,
    claim: Option<Claim<D::Handle>>,
}

impl<D: UsbDevice> FirmwareDriver<D> {
    pub fn new(personality: Personality, firmware: FirmwareImage) -> Self {
        log::info!(
            "{}: firmware loader ready ({} byte image)",
            personality.name,
            firmware.len()
        );
        FirmwareDriver {
            personality,
            firmware,
            state: DriverState::Idle,
            claim: None,
        }
    }

    pub fn personality(&self) -> &Personality {
        &self.personality
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn is_retaining(&self) -> bool {
        self.claim.is_some()
    }

    pub fn probe(&self, vid: u16, pid: u16) -> bool {
        log::debug!("{}: probe {vid:04x}:{pid:04x}", self.personality.name);
        self.personality.matches(vid, pid)
    }

    pub fn attach(&mut self) {
        log::debug!("{}: attach", self.personality.name);
        if self.state == DriverState::Idle {
            self.state = DriverState::Attached;
        }
    }

    /// Run the upload on `device`.
    ///
    /// Returns `true` when the driver keeps exclusive ownership of the device
    /// (mask policy), `false` to let another driver bind to it.
    pub fn start(&mut self, device: D) -> bool {
        log::info!("{}: starting", self.personality.name);
        if let Some(claim) = self.claim.take() {
            log::warn!("{}: restarted, closing held device", self.personality.name);
            claim.release();
        }
        let session = Session::new(device, &self.personality.upload, &self.firmware);
        match session.run() {
            Ok(UploadOutcome::Masked(claim)) => {
                self.claim = Some(claim);
                self.state = DriverState::Retaining;
                true
            }
            Ok(UploadOutcome::DeviceReset) | Err(_) => {
                self.state = DriverState::Released;
                false
            }
        }
    }

    pub fn message(&mut self, message: DriverMessage) {
        log::debug!("{}: message {message:?}", self.personality.name);
        if message == DriverMessage::ServiceIsTerminated && self.is_retaining() {
            log::info!(
                "{}: service is terminated, device still held",
                self.personality.name
            );
        }
    }

    /// Give back a device held since [FirmwareDriver::start].
    pub fn stop(&mut self) {
        log::debug!("{}: stop", self.personality.name);
        if let Some(claim) = self.claim.take() {
            log::info!("{}: closing held device", self.personality.name);
            claim.release();
        }
        self.state = DriverState::Stopped;
    }

    pub fn detach(&mut self) {
        log::debug!("{}: detach", self.personality.name);
    }
}
