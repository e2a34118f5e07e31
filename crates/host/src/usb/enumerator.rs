//! Device enumeration
//!
//! Lists Android phones for the user to pick from and opens the
//! accessory-mode device a session runs on.

use crate::compress::FrameCompressor;
use crate::config::StreamSettings;
use crate::session::{Endpoints, Session};
use crate::usb::transport::{UsbTransport, libusb_status};
use common::{DeviceDescription, DeviceIdentity, Error, Result, matches_filter};
use rusb::{Context, Device, DeviceDescriptor, DeviceHandle, Direction, TransferType, UsbContext};
use std::sync::Arc;
use tracing::{debug, info};

/// The interface carrying the accessory bulk endpoints
pub const ACCESSORY_INTERFACE: u8 = 0;

/// List attached Android devices with their manufacturer and product strings
///
/// Best effort: devices that cannot be opened or whose strings cannot be read
/// are skipped. `filters` adds devices beyond the known Android vendors.
pub fn list_android_devices(usb: &Context, filters: &[String]) -> Result<Vec<DeviceDescription>> {
    let devices = usb.devices().map_err(|e| Error::Transport {
        status: libusb_status(e),
    })?;

    let mut found = Vec::new();
    for device in devices.iter() {
        let Ok(descriptor) = device.device_descriptor() else {
            continue;
        };
        let identity = DeviceIdentity::new(descriptor.vendor_id(), descriptor.product_id());
        if !identity.is_android()
            && !matches_filter(identity.vendor_id, identity.product_id, filters)
        {
            continue;
        }

        match describe(&device, &descriptor) {
            Ok(description) => found.push(description),
            Err(e) => debug!("Skipping {}: {}", identity, e),
        }
    }

    debug!("Found {} Android device(s)", found.len());
    Ok(found)
}

fn describe(device: &Device<Context>, descriptor: &DeviceDescriptor) -> rusb::Result<DeviceDescription> {
    let handle = device.open()?;
    read_description(&handle, descriptor)
}

fn read_description(
    handle: &DeviceHandle<Context>,
    descriptor: &DeviceDescriptor,
) -> rusb::Result<DeviceDescription> {
    Ok(DeviceDescription {
        identity: DeviceIdentity::new(descriptor.vendor_id(), descriptor.product_id()),
        manufacturer: handle.read_manufacturer_string_ascii(descriptor)?,
        product: handle.read_product_string_ascii(descriptor)?,
    })
}

/// Open the first of `candidates` that is attached
pub fn open_device(
    usb: &Context,
    candidates: &[DeviceIdentity],
) -> Result<(DeviceHandle<Context>, DeviceIdentity)> {
    candidates
        .iter()
        .find_map(|id| {
            usb.open_device_with_vid_pid(id.vendor_id, id.product_id)
                .map(|handle| (handle, *id))
        })
        .ok_or(Error::NotFound)
}

/// Open the first attached candidate, locate its bulk endpoint pair and
/// claim the accessory interface
pub fn open_and_claim(
    usb: &Context,
    candidates: &[DeviceIdentity],
    compressor: Arc<dyn FrameCompressor>,
    settings: StreamSettings,
) -> Result<Session> {
    let (handle, identity) = open_device(usb, candidates)?;
    let device = handle.device();

    let descriptor = device.device_descriptor().map_err(descriptor_error)?;
    let description = read_description(&handle, &descriptor).map_err(descriptor_error)?;

    let config = device.active_config_descriptor().map_err(descriptor_error)?;
    let endpoints = config
        .interfaces()
        .next()
        .and_then(|interface| interface.descriptors().next())
        .and_then(|alt| {
            find_bulk_endpoints(
                alt.endpoint_descriptors()
                    .map(|ep| (ep.address(), ep.transfer_type(), ep.direction())),
            )
        })
        .ok_or_else(|| {
            Error::Descriptor(format!("{} has no bulk IN/OUT endpoint pair", identity))
        })?;

    let transport = UsbTransport::claim(handle, ACCESSORY_INTERFACE)?;
    info!("Opened {}", description);

    Ok(Session::from_transport(
        Arc::new(transport),
        endpoints,
        description,
        compressor,
        settings,
    ))
}

/// First bulk IN and first bulk OUT endpoint, if both exist
pub fn find_bulk_endpoints(
    endpoints: impl IntoIterator<Item = (u8, TransferType, Direction)>,
) -> Option<Endpoints> {
    let mut input = None;
    let mut output = None;

    for (address, transfer_type, direction) in endpoints {
        if transfer_type != TransferType::Bulk {
            continue;
        }
        match direction {
            Direction::In => {
                input.get_or_insert(address);
            }
            Direction::Out => {
                output.get_or_insert(address);
            }
        }
    }

    Some(Endpoints {
        input: input?,
        output: output?,
    })
}

fn descriptor_error(err: rusb::Error) -> Error {
    Error::Descriptor(err.to_string())
}
