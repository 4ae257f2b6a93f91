use crate::{
    Claim, UploadError,
    config::{EndpointCheck, UploadConfig},
    usb::{InterfaceRequest, OpenDevice, OpenInterface, PipeHandle},
};

/// Open the first interface of `device` and resolve the configured bulk OUT
/// pipe on it.
///
/// The returned interface claim borrows `device`. Once the interface has been
/// opened, it is closed again on every error path.
pub(crate) fn resolve<'d, H: OpenDevice>(
    device: &'d H,
    config: &UploadConfig,
) -> Result<(Claim<H::Interface<'d>>, PipeHandle), UploadError> {
    let info = device
        .find_interface(&InterfaceRequest::any())
        .ok_or(UploadError::InterfaceNotFound)?;

    let interface = Claim::new(
        device
            .open_interface(&info)
            .map_err(UploadError::InterfaceBusy)?,
    );
    log::debug!(
        "Interface {} (class {:#04x}) has {} endpoints",
        info.number,
        info.class,
        interface.endpoints().len()
    );

    check_endpoints(&*interface, &config.check_endpoints)?;

    let index = config.pipe_index.ok_or(UploadError::PipeIndexMissing)?;
    let pipe = interface
        .pipe(index)
        .filter(|pipe| pipe.endpoint.is_bulk_out())
        .ok_or(UploadError::PipeNotFound(index))?;
    log::debug!(
        "Using pipe {} (EP {:#04x}, max packet {})",
        index,
        pipe.address(),
        pipe.max_packet_size()
    );

    Ok((interface, pipe))
}

/// Pre-flight check of the declared endpoint properties. Any endpoint that
/// cannot be resolved aborts the upload.
fn check_endpoints<I: OpenInterface>(
    interface: &I,
    checks: &[EndpointCheck],
) -> Result<(), UploadError> {
    for check in checks {
        let props = interface
            .endpoint_properties(check.number, check.direction)
            .map_err(|status| UploadError::EndpointPropertyQueryFailed {
                number: check.number,
                direction: check.direction,
                status,
            })?;
        log::debug!(
            "EP{} {}: {:?} max packet {} interval {}",
            check.number,
            check.direction,
            props.transfer_type,
            props.max_packet_size,
            props.interval
        );
    }
    Ok(())
}
