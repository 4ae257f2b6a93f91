use ath3k::{NusbDevice, Registry, find_devices};

use crate::CliError;

pub(crate) fn list_devices(
    registry: &Registry,
    vid: Option<u16>,
    pid: Option<u16>,
) -> Result<(), CliError> {
    let devices = matching_devices(registry, vid, pid)?;
    if devices.is_empty() {
        println!("No bootloader-mode device found");
    } else {
        print_devices(registry, &devices);
    }
    Ok(())
}

/// Attached devices with a personality in `registry`
pub(crate) fn matching_devices(
    registry: &Registry,
    vid: Option<u16>,
    pid: Option<u16>,
) -> Result<Vec<NusbDevice>, CliError> {
    Ok(find_devices(vid, pid)?
        .into_iter()
        .filter(|dev| registry.lookup(dev.vendor_id(), dev.product_id()).is_some())
        .collect())
}

fn print_devices(registry: &Registry, devices: &[NusbDevice]) {
    for device in devices {
        let name = registry
            .lookup(device.vendor_id(), device.product_id())
            .map(|p| p.name.as_str())
            .unwrap_or_default();
        println!(
            "Bus {} Device {:03}: ID {:04x}:{:04x} {} [{}]",
            device.bus_id(),
            device.device_address(),
            device.vendor_id(),
            device.product_id(),
            device.product_string().unwrap_or(""),
            name,
        );
    }
}

pub(crate) fn print_personalities(registry: &Registry) {
    for p in registry.personalities() {
        let pipe = p
            .upload
            .pipe_index
            .map(|i| i.to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "{:04x}:{:04x}  pipe {:>2}  {:?}  {}",
            p.vendor_id, p.product_id, pipe, p.upload.policy, p.name
        );
        for check in &p.upload.check_endpoints {
            println!("             check EP{} {}", check.number, check.direction);
        }
    }
}
