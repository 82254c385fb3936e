use std::error::Error;

use udev::Enumerator;

use crate::drivers::cando::driver::{PID, VID};

/// A discovered Cando touchscreen hidraw node.
#[derive(Debug, Clone, Default)]
pub struct DeviceInfo {
    pub devnode: String,
    pub sysname: String,
    pub syspath: String,
    pub serial: Option<String>,
}

/// Enumerate hidraw devices whose USB ancestor matches the Cando
/// vendor/product pair.
pub fn discover() -> Result<Vec<DeviceInfo>, Box<dyn Error + Send + Sync>> {
    let mut enumerator = Enumerator::new()?;
    enumerator.match_subsystem("hidraw")?;

    let mut found = Vec::new();
    for device in enumerator.scan_devices()? {
        let Some(usb_device) = device.parent_with_subsystem_devtype("usb", "usb_device")? else {
            continue;
        };
        if attribute(&usb_device, "idVendor") != Some(format!("{VID:04x}"))
            || attribute(&usb_device, "idProduct") != Some(format!("{PID:04x}"))
        {
            continue;
        }
        let Some(devnode) = device.devnode() else {
            continue;
        };

        let info = DeviceInfo {
            devnode: devnode.to_string_lossy().to_string(),
            sysname: device.sysname().to_string_lossy().to_string(),
            syspath: device.syspath().to_string_lossy().to_string(),
            serial: attribute(&usb_device, "serial"),
        };
        log::debug!("Found Cando touchscreen at {}", info.devnode);
        found.push(info);
    }

    Ok(found)
}

/// Build a [DeviceInfo] for an explicitly given hidraw device node.
pub fn from_devnode(devnode: &str) -> Result<DeviceInfo, Box<dyn Error + Send + Sync>> {
    let sysname = devnode.trim_start_matches("/dev/").to_string();
    let device = udev::Device::from_subsystem_sysname("hidraw".to_string(), sysname.clone())?;
    let serial = device
        .parent_with_subsystem_devtype("usb", "usb_device")?
        .and_then(|usb_device| attribute(&usb_device, "serial"));

    Ok(DeviceInfo {
        devnode: devnode.to_string(),
        sysname,
        syspath: device.syspath().to_string_lossy().to_string(),
        serial,
    })
}

fn attribute(device: &udev::Device, name: &str) -> Option<String> {
    device
        .attribute_value(name)
        .map(|value| value.to_string_lossy().trim().to_string())
}
