use crate::{
    UploadError,
    usb::{ControlRequest, OpenDevice, Recipient, RequestKind},
};

/// Vendor request that switches the bootloader into download mode
const DFU_CMD_DOWNLOAD: u8 = 1;

pub(crate) fn download_request() -> ControlRequest {
    ControlRequest {
        kind: RequestKind::Vendor,
        recipient: Recipient::Device,
        request: DFU_CMD_DOWNLOAD,
        value: 0,
        index: 0,
    }
}

/// Send the firmware header on the control pipe.
///
/// Tried at most `attempts` times; the last failure is returned.
pub(crate) fn send_header<H: OpenDevice>(
    device: &H,
    header: &[u8],
    attempts: u8,
) -> Result<(), UploadError> {
    let request = download_request();
    let mut attempt = 1;
    loop {
        match device.control_out(&request, header) {
            Ok(()) => {
                log::debug!("Download request accepted ({} bytes)", header.len());
                return Ok(());
            }
            Err(err) if attempt < attempts => {
                log::warn!(
                    "Failed to initiate firmware transfer ({err}), retrying ({attempt})"
                );
                attempt += 1;
            }
            Err(err) => return Err(UploadError::ControlHandshakeFailed(err)),
        }
    }
}
