use ath3k::{
    NusbDevice, Personality, Policy, Session, UploadConfig, UploadOutcome, WriteLength,
    config::EndpointCheck,
};
use firmware::FirmwareImage;

use crate::CliError;

/// Command line overrides for a personality's upload settings
#[derive(Debug, Default)]
pub(crate) struct Overrides {
    pub pipe_index: Option<u8>,
    pub check_endpoints: Vec<EndpointCheck>,
    pub attempts: Option<u8>,
    pub exact_length: bool,
    pub mask: bool,
}

impl Overrides {
    pub(crate) fn apply(&self, upload: &mut UploadConfig) {
        if let Some(index) = self.pipe_index {
            upload.pipe_index = Some(index);
        }
        if !self.check_endpoints.is_empty() {
            upload.check_endpoints = self.check_endpoints.clone();
        }
        if let Some(attempts) = self.attempts {
            upload.handshake_attempts = attempts;
        }
        if self.exact_length {
            upload.write_length = WriteLength::Chunk;
        }
        if self.mask {
            upload.policy = Policy::Mask;
        }
    }
}

pub(crate) fn load_firmware(
    device: NusbDevice,
    personality: &Personality,
    firmware: &FirmwareImage,
    overrides: &Overrides,
) -> Result<(), CliError> {
    let mut upload = personality.upload.clone();
    overrides.apply(&mut upload);
    log::debug!("{}: {upload:?}", personality.name);

    println!(
        "{}: bus {} device {:03}, {} byte image",
        personality.name,
        device.bus_id(),
        device.device_address(),
        firmware.len()
    );

    match Session::new(device, &upload, firmware).run()? {
        UploadOutcome::DeviceReset => {
            println!("Firmware loaded, device will re-enumerate");
        }
        UploadOutcome::Masked(claim) => {
            println!("Device masked, firmware not loaded");
            claim.release();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use ath3k::usb::Direction;

    use super::*;

    #[test]
    fn test_overrides() {
        let mut upload = UploadConfig {
            pipe_index: Some(2),
            ..Default::default()
        };
        Overrides::default().apply(&mut upload);
        assert_eq!(upload.pipe_index, Some(2));
        assert_eq!(upload.write_length, WriteLength::Buffer);

        let overrides = Overrides {
            pipe_index: Some(1),
            check_endpoints: vec![EndpointCheck {
                number: 2,
                direction: Direction::Out,
            }],
            attempts: Some(3),
            exact_length: true,
            mask: true,
        };
        overrides.apply(&mut upload);
        assert_eq!(upload.pipe_index, Some(1));
        assert_eq!(upload.check_endpoints.len(), 1);
        assert_eq!(upload.handshake_attempts, 3);
        assert_eq!(upload.write_length, WriteLength::Chunk);
        assert_eq!(upload.policy, Policy::Mask);
    }
}
