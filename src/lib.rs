//! Main crate

#[cxx::bridge]
mod ffi {

    struct DeviceMatch {
        vendor_id: u16,
        product_id: u16,
        name: String,
    }

    extern "Rust" {
        type Ath3kRegistry;

        #[Self = "Ath3kRegistry"]
        fn builtin_registry() -> Result<Box<Ath3kRegistry>>;
        #[Self = "Ath3kRegistry"]
        fn load_registry(path: &str) -> Result<Box<Ath3kRegistry>>;

        fn matches(&self, vid: u16, pid: u16) -> bool;
        fn personalities(&self) -> Vec<DeviceMatch>;
        fn create_driver(
            &self,
            vid: u16,
            pid: u16,
            firmware: &[u8],
        ) -> Result<Box<Ath3kDriver>>;
    }

    extern "Rust" {
        type Ath3kDriver;

        fn name(&self) -> String;
        fn probe(&self, vid: u16, pid: u16) -> bool;
        fn start(&mut self, bus_id: &str, address: u8) -> Result<bool>;
        fn message(&mut self, kind: u32);
        fn stop(&mut self);
        fn is_retaining(&self) -> bool;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("{0}")]
    Config(#[from] ath3k::ConfigError),
    #[error("{0}")]
    Firmware(#[from] firmware::FirmwareError),
    #[error("{0}")]
    Usb(#[from] ath3k::UsbError),
    #[error("No personality for {0:04x}:{1:04x}")]
    NoPersonality(u16, u16),
}

pub struct Ath3kRegistry {
    inner: ath3k::Registry,
}

pub struct Ath3kDriver {
    inner: ath3k::FirmwareDriver<ath3k::NusbDevice>,
}

impl Ath3kRegistry {
    fn builtin_registry() -> Result<Box<Ath3kRegistry>, BridgeError> {
        Ok(Box::new(Ath3kRegistry {
            inner: ath3k::Registry::builtin()?,
        }))
    }

    fn load_registry(path: &str) -> Result<Box<Ath3kRegistry>, BridgeError> {
        Ok(Box::new(Ath3kRegistry {
            inner: ath3k::Registry::load(path)?,
        }))
    }

    fn matches(&self, vid: u16, pid: u16) -> bool {
        self.inner.lookup(vid, pid).is_some()
    }

    fn personalities(&self) -> Vec<ffi::DeviceMatch> {
        self.inner
            .personalities()
            .iter()
            .map(|p| ffi::DeviceMatch {
                vendor_id: p.vendor_id,
                product_id: p.product_id,
                name: p.name.clone(),
            })
            .collect()
    }

    fn create_driver(
        &self,
        vid: u16,
        pid: u16,
        firmware: &[u8],
    ) -> Result<Box<Ath3kDriver>, BridgeError> {
        let personality = self
            .inner
            .lookup(vid, pid)
            .cloned()
            .ok_or(BridgeError::NoPersonality(vid, pid))?;
        let firmware = firmware::FirmwareImage::from_vec(firmware.to_vec())?;
        Ok(Box::new(Ath3kDriver {
            inner: ath3k::FirmwareDriver::new(personality, firmware),
        }))
    }
}

impl Ath3kDriver {
    fn name(&self) -> String {
        self.inner.personality().name.clone()
    }

    fn probe(&self, vid: u16, pid: u16) -> bool {
        self.inner.probe(vid, pid)
    }

    /// Attach to the device at `address` on `bus_id` and load it.
    fn start(&mut self, bus_id: &str, address: u8) -> Result<bool, BridgeError> {
        let device = ath3k::find_device(bus_id, address)?
            .ok_or(ath3k::UsbError::NotFound)?;
        self.inner.attach();
        Ok(self.inner.start(device))
    }

    fn message(&mut self, kind: u32) {
        match ath3k::DriverMessage::from_raw(kind) {
            Some(message) => self.inner.message(message),
            None => log::debug!("Ignoring unknown driver message {kind}"),
        }
    }

    fn stop(&mut self) {
        self.inner.stop();
        self.inner.detach();
    }

    fn is_retaining(&self) -> bool {
        self.inner.is_retaining()
    }
}
