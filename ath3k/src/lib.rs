//! Firmware loader for Atheros AR3011 Bluetooth controllers
//!
//! In bootloader mode these controllers expose a single vendor interface and
//! wait for their firmware. Loading it takes one vendor control request
//! carrying the first 20 bytes of the image, followed by the rest of the
//! image in 1 KiB bulk writes. The controller then re-enumerates with its
//! operational ids.
//!
//! The upload itself ([Session]) runs against the backend traits in [usb],
//! so it can be driven by the bundled [`nusb`] backend ([NusbDevice]) or by
//! any other USB stack. [FirmwareDriver] adapts it to host frameworks that
//! deliver probe / start / stop callbacks.
//!
//! # Example
//!
//! ```no_run
//! use ath3k::{Registry, Session, find_devices};
//! use firmware::FirmwareImage;
//!
//! let registry = Registry::builtin().unwrap();
//! let firmware = FirmwareImage::load("ath3k-1.fw").unwrap();
//! for device in find_devices(None, None).unwrap() {
//!     if let Some(p) = registry.lookup(device.vendor_id(), device.product_id()) {
//!         match Session::new(device, &p.upload, &firmware).run() {
//!             Ok(outcome) => println!("{}: {outcome:?}", p.name),
//!             Err(e) => println!("{}: {e}", p.name),
//!         }
//!     }
//! }
//! ```
//!
//! [`nusb`]: https://docs.rs/nusb

pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000u64);

mod claim;
pub mod config;
mod device;
pub mod driver;
mod error;
mod handshake;
mod resolver;
mod session;
mod transfer;
pub mod usb;

#[cfg(test)]
mod mock;

use std::time::Duration;

// Re-exports
pub use claim::Claim;
pub use config::{Personality, Policy, Registry, UploadConfig, WriteLength};
pub use device::{NusbDevice, NusbHandle, find_device, find_devices};
pub use driver::{DriverMessage, FirmwareDriver};
pub use error::{ConfigError, Stage, UploadError, UsbError};
pub use session::{Session, UploadOutcome};
pub use transfer::{BULK_SIZE, TransferBuffer};
