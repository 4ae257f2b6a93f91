//! Firmware images for bootloader-mode ath3k controllers
//!
//! An image is an opaque byte blob. The loader only cares about one split:
//! the first [`HEADER_LEN`] bytes are sent with the download request on the
//! control endpoint, everything after that is streamed over the bulk pipe.

pub use iter::*;

mod iter;

use std::{borrow::Cow, fs, io, path::Path};

/// Bytes consumed by the download request.
pub const HEADER_LEN: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum FirmwareError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("firmware image too short ({0} bytes, need at least {HEADER_LEN})")]
    TooShort(usize),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FirmwareImage {
    bytes: Cow<'static, [u8]>,
}

impl FirmwareImage {
    pub fn from_static(bytes: &'static [u8]) -> Result<Self, FirmwareError> {
        Self::new(Cow::Borrowed(bytes))
    }

    pub fn from_vec(bytes: Vec<u8>) -> Result<Self, FirmwareError> {
        Self::new(Cow::Owned(bytes))
    }

    /// Read an image from disk (ex: `ath3k-1.fw`).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FirmwareError> {
        Self::from_vec(fs::read(path)?)
    }

    /// Image compiled in from `ATH3K_FIRMWARE_PATH` at build time.
    #[cfg(feature = "embedded")]
    pub fn embedded() -> Result<Self, FirmwareError> {
        static IMAGE: &[u8] = include_bytes!(env!("ATH3K_FIRMWARE_PATH"));
        Self::from_static(IMAGE)
    }

    fn new(bytes: Cow<'static, [u8]>) -> Result<Self, FirmwareError> {
        if bytes.len() < HEADER_LEN {
            return Err(FirmwareError::TooShort(bytes.len()));
        }
        Ok(FirmwareImage { bytes })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Download request payload
    pub fn header(&self) -> &[u8] {
        &self.bytes[..HEADER_LEN]
    }

    /// Everything after the header
    pub fn payload(&self) -> &[u8] {
        &self.bytes[HEADER_LEN..]
    }

    /// Iterate over the payload in blocks of at most `block_size` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `block_size` is 0.
    pub fn blocks(&self, block_size: usize) -> PayloadBlocks<'_> {
        assert!(block_size > 0, "block size must be non-zero");
        PayloadBlocks::new(self.payload(), block_size)
    }

    /// Number of blocks [FirmwareImage::blocks] yields for `block_size`.
    ///
    /// # Panics
    ///
    /// Panics if `block_size` is 0.
    pub fn block_count(&self, block_size: usize) -> usize {
        assert!(block_size > 0, "block size must be non-zero");
        self.payload().len().div_ceil(block_size)
    }
}
