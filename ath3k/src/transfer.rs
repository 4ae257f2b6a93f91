use firmware::FirmwareImage;

use crate::{
    UploadError,
    config::WriteLength,
    usb::{BulkTransfer, OpenInterface, PipeHandle},
};

/// Bulk block size. Larger blocks are not reliably accepted by the
/// bootloader.
pub const BULK_SIZE: usize = 1024;

/// Scratch block reused for every bulk write
pub struct TransferBuffer {
    data: Box<[u8; BULK_SIZE]>,
}

impl Default for TransferBuffer {
    fn default() -> Self {
        TransferBuffer {
            data: Box::new([0; BULK_SIZE]),
        }
    }
}

impl TransferBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the whole buffer with `block`, zero-filling past its end.
    /// Returns the number of bytes taken from `block`.
    pub fn load(&mut self, block: &[u8]) -> usize {
        let len = block.len().min(BULK_SIZE);
        self.data[..len].copy_from_slice(&block[..len]);
        self.data[len..].fill(0);
        len
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[..]
    }

    pub fn len(&self) -> usize {
        BULK_SIZE
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Stream the firmware payload to `pipe`, one [BULK_SIZE] block per write.
///
/// Returns the number of blocks written.
pub(crate) fn send_payload<I: OpenInterface>(
    interface: &mut I,
    pipe: &PipeHandle,
    firmware: &FirmwareImage,
    write_length: WriteLength,
) -> Result<usize, UploadError> {
    let mut transfer = interface
        .prepare_transfer(pipe, BULK_SIZE)
        .map_err(UploadError::BufferPreparationFailed)?;
    let mut buffer = TransferBuffer::new();

    let blocks = firmware.blocks(BULK_SIZE);
    let total = blocks.len();
    for block in blocks {
        let to_send = buffer.load(block.data);
        let data = match write_length {
            WriteLength::Buffer => buffer.as_slice(),
            WriteLength::Chunk => &buffer.as_slice()[..to_send],
        };
        transfer
            .write(data)
            .map_err(|status| UploadError::BulkWriteFailed {
                chunk: block.index,
                status,
            })?;
        log::trace!(
            "Block {}/{} sent ({to_send} bytes, advertised {})",
            block.index + 1,
            total,
            data.len()
        );
    }

    log::info!(
        "Firmware was sent to bulk pipe ({} bytes in {total} blocks)",
        firmware.payload().len()
    );
    transfer
        .complete()
        .map_err(UploadError::TransferCompletionFailed)?;
    Ok(total)
}
